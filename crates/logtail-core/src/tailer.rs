// ── Session coordinator ──
//
// `Tailer` owns one streaming run: authorize, build and start the
// transport, spawn the dispatcher, wait for a reason to stop, then shut
// everything down in order. A run is consumed by `run()`, so there is at
// most one transport per tailer.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logtail_api::StreamState;

use crate::config::TailerConfig;
use crate::dispatch::Dispatcher;
use crate::error::CoreError;
use crate::output::OutputSink;
use crate::session::{Authorizer, Transport, TransportFactory, TransportOptions, WebSocketFactory};
use crate::signal::InterruptSignals;
use crate::status::{LineStatus, StatusIndicator};

/// Capacity of the transport → dispatcher channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on draining the dispatcher after the transport stopped.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const GETTING_READY: &str = "Getting ready...";

/// Printed once the stream is up.
pub const READY_MESSAGE: &str =
    "Ready! You're now waiting to receive API request logs (^C to quit)";

// ── Run state ────────────────────────────────────────────────────────

/// Lifecycle of a [`Tailer`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Idle,
    Authorizing,
    Streaming,
    ShuttingDown,
    Stopped,
}

// ── Shutdown handle ──────────────────────────────────────────────────

/// Requests a graceful end to a running [`Tailer`]. Cloneable and
/// idempotent.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Why the streaming wait ended.
enum Wake {
    Signal(&'static str),
    Requested,
    StreamStopped,
    DispatcherExited(Result<usize, JoinError>),
}

// ── Tailer ───────────────────────────────────────────────────────────

/// Coordinates one request-log streaming session.
pub struct Tailer<A, F = WebSocketFactory> {
    config: TailerConfig,
    authorizer: A,
    factory: F,
    output: OutputSink,
    status: Option<Box<dyn StatusIndicator>>,
    state: watch::Sender<RunState>,
    shutdown: CancellationToken,
    handle_signals: bool,
}

impl<A: Authorizer> Tailer<A> {
    /// A tailer writing to stdout and streaming over websockets.
    pub fn new(config: TailerConfig, authorizer: A) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            config,
            authorizer,
            factory: WebSocketFactory,
            output: OutputSink::stdout(),
            status: None,
            state,
            shutdown: CancellationToken::new(),
            handle_signals: true,
        }
    }
}

impl<A: Authorizer, F: TransportFactory> Tailer<A, F> {
    /// Replace the transport factory.
    pub fn with_factory<G: TransportFactory>(self, factory: G) -> Tailer<A, G> {
        Tailer {
            config: self.config,
            authorizer: self.authorizer,
            factory,
            output: self.output,
            status: self.status,
            state: self.state,
            shutdown: self.shutdown,
            handle_signals: self.handle_signals,
        }
    }

    /// Write rendered events (and default status lines) to `output`.
    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }

    /// Report setup progress through `status` instead of plain lines.
    pub fn with_status(mut self, status: impl StatusIndicator + 'static) -> Self {
        self.status = Some(Box::new(status));
        self
    }

    /// Whether `run` listens for SIGINT/SIGTERM. On by default.
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// A handle that ends the run gracefully from anywhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    /// Subscribe to run state changes.
    pub fn run_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: RunState) {
        debug!(state = %next, "tailer state changed");
        self.state.send_replace(next);
    }

    /// Run the session until interrupted, shut down, or the stream ends.
    ///
    /// Returns `Ok(())` after a signal or [`ShutdownHandle::shutdown`].
    pub async fn run(mut self) -> Result<(), CoreError> {
        let mut status = self
            .status
            .take()
            .unwrap_or_else(|| -> Box<dyn StatusIndicator> {
                Box::new(LineStatus::new(self.output.clone()))
            });
        status.begin(GETTING_READY);

        let mut signals = if self.handle_signals {
            match InterruptSignals::register() {
                Ok(signals) => Some(signals),
                Err(e) => {
                    status.fail("Failed to install signal handlers");
                    self.set_state(RunState::Stopped);
                    return Err(CoreError::Signal(e));
                }
            }
        } else {
            None
        };

        // ── Authorize ────────────────────────────────────────────────
        self.set_state(RunState::Authorizing);
        let session = match self
            .authorizer
            .authorize(&self.config.device_name, &self.config.feature)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "error while authenticating with the API");
                status.fail("Authorization failed");
                self.set_state(RunState::Stopped);
                return Err(match e {
                    CoreError::Authorization { .. } => e,
                    other => CoreError::Authorization {
                        message: other.to_string(),
                    },
                });
            }
        };
        debug!(
            session_id = %session.session_id,
            endpoint = %session.endpoint,
            reconnect_delay_secs = session.reconnect_delay.as_secs(),
            "session authorized"
        );

        // ── Start streaming ──────────────────────────────────────────
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let options = TransportOptions {
            allow_unencrypted: self.config.allow_unencrypted,
            reconnect_interval: session.reconnect_delay,
        };
        let transport = self.factory.build(&session, options, events_tx);

        let dispatcher = Dispatcher::new(self.config.output, self.config.color, self.output.clone());
        let mut dispatch_task = tokio::spawn(dispatcher.run(events_rx));

        let mut stream_state = transport.state();
        transport.start();
        status.finish(READY_MESSAGE);
        self.set_state(RunState::Streaming);
        info!(
            feature = %session.authorized_feature,
            output = %self.config.output,
            "streaming request logs"
        );

        // ── Wait ─────────────────────────────────────────────────────
        let shutdown = self.shutdown.clone();
        let wake = tokio::select! {
            biased;
            name = next_signal(signals.as_mut()) => Wake::Signal(name),
            () = shutdown.cancelled() => Wake::Requested,
            () = stopped(&mut stream_state) => Wake::StreamStopped,
            joined = &mut dispatch_task => Wake::DispatcherExited(joined),
        };

        // ── Shut down ────────────────────────────────────────────────
        self.set_state(RunState::ShuttingDown);
        transport.stop().await;
        drop(transport);

        let outcome = match wake {
            Wake::Signal(name) => {
                debug!(signal = name, "received interrupt, cleaning up");
                drain(dispatch_task).await;
                Ok(())
            }
            Wake::Requested => {
                debug!("shutdown requested, cleaning up");
                drain(dispatch_task).await;
                Ok(())
            }
            Wake::StreamStopped => {
                error!("request log stream stopped unexpectedly");
                drain(dispatch_task).await;
                Err(CoreError::StreamTerminated)
            }
            Wake::DispatcherExited(joined) => {
                let reason = match joined {
                    Ok(handled) => format!("exited after {handled} events"),
                    Err(e) => e.to_string(),
                };
                error!(%reason, "event dispatcher stopped unexpectedly");
                Err(CoreError::DispatcherFailed { reason })
            }
        };

        self.set_state(RunState::Stopped);
        debug!("Bye!");
        outcome
    }
}

/// Next interrupt signal, or never when signal handling is off.
async fn next_signal(signals: Option<&mut InterruptSignals>) -> &'static str {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

/// Resolves once the transport reports `Stopped` or its state sender is
/// gone.
async fn stopped(state: &mut watch::Receiver<StreamState>) {
    loop {
        let current = *state.borrow_and_update();
        if current.is_stopped() {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

/// Let the dispatcher render what was already delivered.
async fn drain(mut task: tokio::task::JoinHandle<usize>) {
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(handled)) => debug!(handled, "dispatcher drained"),
        Ok(Err(e)) => warn!(error = %e, "dispatcher task failed"),
        Err(_) => {
            warn!("dispatcher did not drain in time, aborting");
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use logtail_api::{IncomingMessage, RequestLogEvent, SessionDescriptor};
    use secrecy::SecretString;
    use url::Url;

    use super::*;
    use crate::output::SharedBuffer;

    // ── Fakes ────────────────────────────────────────────────────────

    fn descriptor() -> SessionDescriptor {
        SessionDescriptor {
            endpoint: Url::parse("wss://stream.example.test/subscribe").unwrap(),
            session_id: "cliws_1".into(),
            authorized_feature: "request_logs".into(),
            reconnect_delay: Duration::from_secs(1),
        }
    }

    struct FakeAuthorizer {
        reject: bool,
        calls: AtomicUsize,
    }

    impl FakeAuthorizer {
        fn accepting() -> Self {
            Self {
                reject: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn rejecting() -> Self {
            Self {
                reject: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Authorizer for FakeAuthorizer {
        async fn authorize(
            &self,
            device_name: &str,
            feature: &str,
        ) -> Result<SessionDescriptor, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(device_name, "test-device");
            assert_eq!(feature, "request_logs");
            if self.reject {
                Err(CoreError::Authorization {
                    message: "invalid api key".into(),
                })
            } else {
                Ok(descriptor())
            }
        }
    }

    #[derive(Default)]
    struct Counters {
        builds: AtomicUsize,
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    /// Sends a scripted batch of messages on start, then optionally
    /// reports `Stopped` on its own.
    struct FakeTransport {
        script: Vec<IncomingMessage>,
        end_after_script: bool,
        events: Mutex<Option<mpsc::Sender<IncomingMessage>>>,
        state: Arc<watch::Sender<StreamState>>,
        counters: Arc<Counters>,
    }

    impl Transport for FakeTransport {
        fn start(&self) {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            let Some(events) = self.events.lock().unwrap().clone() else {
                return;
            };
            let script = self.script.clone();
            let end = self.end_after_script;
            let state = Arc::clone(&self.state);
            self.state.send_replace(StreamState::Streaming);
            tokio::spawn(async move {
                for message in script {
                    if events.send(message).await.is_err() {
                        return;
                    }
                }
                if end {
                    state.send_replace(StreamState::Stopped);
                }
            });
        }

        async fn stop(&self) {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().take();
            self.state.send_replace(StreamState::Stopped);
        }

        fn state(&self) -> watch::Receiver<StreamState> {
            self.state.subscribe()
        }
    }

    struct FakeFactory {
        script: Vec<IncomingMessage>,
        end_after_script: bool,
        counters: Arc<Counters>,
    }

    impl FakeFactory {
        fn new(script: Vec<IncomingMessage>) -> Self {
            Self {
                script,
                end_after_script: false,
                counters: Arc::default(),
            }
        }
    }

    impl TransportFactory for FakeFactory {
        type Transport = FakeTransport;

        fn build(
            &self,
            session: &SessionDescriptor,
            options: TransportOptions,
            events: mpsc::Sender<IncomingMessage>,
        ) -> FakeTransport {
            self.counters.builds.fetch_add(1, Ordering::SeqCst);
            assert_eq!(session.session_id, "cliws_1");
            assert_eq!(options.reconnect_interval, Duration::from_secs(1));
            FakeTransport {
                script: self.script.clone(),
                end_after_script: self.end_after_script,
                events: Mutex::new(Some(events)),
                state: Arc::new(watch::channel(StreamState::Idle).0),
                counters: Arc::clone(&self.counters),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingStatus(Arc<Mutex<Vec<String>>>);

    impl StatusIndicator for RecordingStatus {
        fn begin(&mut self, message: &str) {
            self.0.lock().unwrap().push(format!("begin: {message}"));
        }

        fn finish(&mut self, message: &str) {
            self.0.lock().unwrap().push(format!("finish: {message}"));
        }

        fn fail(&mut self, message: &str) {
            self.0.lock().unwrap().push(format!("fail: {message}"));
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn request_log(n: u32, status: i64) -> IncomingMessage {
        IncomingMessage::RequestLog(RequestLogEvent {
            event_payload: format!(
                r#"{{"created_at":"t{n}","status":{status},"method":"GET","url":"/v1/items","request_id":"req_{n}"}}"#
            ),
            request_log_id: format!("resp_{n}"),
            kind: "request_log_event".into(),
        })
    }

    fn config() -> TailerConfig {
        TailerConfig::new(
            Url::parse("https://api.example.test").unwrap(),
            "test-device",
            SecretString::from("sk_test"),
        )
    }

    fn tailer<A: Authorizer>(
        authorizer: A,
        factory: FakeFactory,
    ) -> (Tailer<A, FakeFactory>, SharedBuffer, RecordingStatus) {
        let (sink, buffer) = OutputSink::buffer();
        let status = RecordingStatus::default();
        let tailer = Tailer::new(config(), authorizer)
            .with_factory(factory)
            .with_output(sink)
            .with_status(status.clone())
            .with_signal_handling(false);
        (tailer, buffer, status)
    }

    async fn wait_for_lines(buffer: &SharedBuffer, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while buffer.lines().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for output");
    }

    // ── Tests ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn authorization_failure_never_builds_transport() {
        let factory = FakeFactory::new(vec![request_log(1, 200)]);
        let counters = Arc::clone(&factory.counters);
        let (tailer, buffer, status) = tailer(FakeAuthorizer::rejecting(), factory);
        let state = tailer.run_state();

        let err = tailer.run().await.unwrap_err();

        assert!(err.is_authorization(), "got {err:?}");
        assert_eq!(counters.builds.load(Ordering::SeqCst), 0);
        assert_eq!(*state.borrow(), RunState::Stopped);
        assert!(buffer.contents().is_empty());
        assert_eq!(
            *status.0.lock().unwrap(),
            ["begin: Getting ready...", "fail: Authorization failed"]
        );
    }

    #[tokio::test]
    async fn shutdown_while_streaming_stops_transport_once() {
        let factory = FakeFactory::new((1..=3).map(|n| request_log(n, 200)).collect());
        let counters = Arc::clone(&factory.counters);
        let (tailer, buffer, status) = tailer(FakeAuthorizer::accepting(), factory);
        let handle = tailer.shutdown_handle();
        let mut state = tailer.run_state();

        let (result, ()) = tokio::join!(tailer.run(), async {
            state
                .wait_for(|s| *s == RunState::Streaming)
                .await
                .unwrap();
            wait_for_lines(&buffer, 3).await;
            handle.shutdown();
            handle.shutdown();
        });

        assert!(result.is_ok(), "got {result:?}");
        assert_eq!(counters.builds.load(Ordering::SeqCst), 1);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert_eq!(
            buffer.lines(),
            [
                "t1 [200] GET /v1/items req_1",
                "t2 [200] GET /v1/items req_2",
                "t3 [200] GET /v1/items req_3",
            ]
        );
        assert_eq!(
            *status.0.lock().unwrap(),
            [
                "begin: Getting ready...".to_owned(),
                format!("finish: {READY_MESSAGE}"),
            ]
        );
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn run_state_walks_through_lifecycle() {
        let (tailer, _buffer, _status) =
            tailer(FakeAuthorizer::accepting(), FakeFactory::new(Vec::new()));
        let handle = tailer.shutdown_handle();
        let mut state = tailer.run_state();
        assert_eq!(*state.borrow(), RunState::Idle);

        let (result, seen) = tokio::join!(tailer.run(), async {
            let mut seen = Vec::new();
            loop {
                let current = *state.borrow_and_update();
                if seen.last() != Some(&current) {
                    seen.push(current);
                }
                if current == RunState::Streaming {
                    handle.shutdown();
                }
                if current == RunState::Stopped || state.changed().await.is_err() {
                    break;
                }
            }
            seen
        });

        assert!(result.is_ok());
        assert!(seen.contains(&RunState::Streaming));
        assert_eq!(seen.last(), Some(&RunState::Stopped));
    }

    #[tokio::test]
    async fn transport_ending_on_its_own_is_an_error() {
        let mut factory = FakeFactory::new(vec![request_log(1, 500), request_log(2, 404)]);
        factory.end_after_script = true;
        let counters = Arc::clone(&factory.counters);
        let (tailer, buffer, _status) = tailer(FakeAuthorizer::accepting(), factory);

        let err = tailer.run().await.unwrap_err();

        assert!(matches!(err, CoreError::StreamTerminated), "got {err:?}");
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        // Everything delivered before the end is still rendered.
        assert_eq!(buffer.lines().len(), 2);
    }

    #[tokio::test]
    async fn malformed_payload_does_not_end_the_run() {
        let script = vec![
            request_log(1, 200),
            IncomingMessage::RequestLog(RequestLogEvent {
                event_payload: "{ not json".into(),
                request_log_id: "resp_bad".into(),
                kind: "request_log_event".into(),
            }),
            IncomingMessage::Other {
                kind: "webhook_event".into(),
            },
            request_log(3, 503),
        ];
        let (tailer, buffer, _status) =
            tailer(FakeAuthorizer::accepting(), FakeFactory::new(script));
        let handle = tailer.shutdown_handle();

        let (result, ()) = tokio::join!(tailer.run(), async {
            wait_for_lines(&buffer, 3).await;
            handle.shutdown();
        });

        assert!(result.is_ok());
        let lines = buffer.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], " [0]   ");
        assert_eq!(lines[2], "t3 [503] GET /v1/items req_3");
    }

    #[tokio::test]
    async fn non_authorization_errors_are_reported_as_authorization() {
        struct Unreachable;

        impl Authorizer for Unreachable {
            async fn authorize(&self, _: &str, _: &str) -> Result<SessionDescriptor, CoreError> {
                Err(CoreError::ConnectionFailed {
                    url: "https://api.example.test".into(),
                    reason: "connection refused".into(),
                })
            }
        }

        let (tailer, _buffer, _status) = tailer(Unreachable, FakeFactory::new(Vec::new()));
        let err = tailer.run().await.unwrap_err();
        assert!(err.is_authorization());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn run_state_display_is_snake_case() {
        assert_eq!(RunState::ShuttingDown.to_string(), "shutting_down");
    }
}
