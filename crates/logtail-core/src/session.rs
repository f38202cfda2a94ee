// ── Session collaborators ──
//
// The tailer talks to its authorizer and transport through these traits.
// The production implementations wrap `logtail_api::SessionClient` and
// `logtail_api::WebSocketClient`; tests substitute in-memory fakes.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use logtail_api::transport::TransportConfig;
use logtail_api::{
    IncomingMessage, SessionClient, SessionDescriptor, StreamState, WebSocketClient,
    WebSocketConfig,
};

use crate::config::TailerConfig;
use crate::error::CoreError;

// ── Authorizer ───────────────────────────────────────────────────────

/// Obtains a session descriptor for one streaming run.
pub trait Authorizer: Send + Sync {
    fn authorize(
        &self,
        device_name: &str,
        feature: &str,
    ) -> impl Future<Output = Result<SessionDescriptor, CoreError>> + Send;
}

impl Authorizer for SessionClient {
    async fn authorize(
        &self,
        device_name: &str,
        feature: &str,
    ) -> Result<SessionDescriptor, CoreError> {
        Ok(SessionClient::authorize(self, device_name, feature).await?)
    }
}

/// Build the HTTP session client for `config`.
///
/// `timeout` bounds the authorization request; `None` waits indefinitely.
pub fn session_client(
    config: &TailerConfig,
    timeout: Option<Duration>,
) -> Result<SessionClient, CoreError> {
    let transport = TransportConfig { timeout };
    Ok(SessionClient::new(
        config.api_base.clone(),
        config.api_key.clone(),
        &transport,
    )?)
}

// ── Transport ────────────────────────────────────────────────────────

/// A background event stream feeding the dispatcher channel.
pub trait Transport: Send + Sync {
    /// Begin streaming in the background. Returns immediately.
    fn start(&self);

    /// Stop streaming and wait for the background work to finish.
    fn stop(&self) -> impl Future<Output = ()> + Send;

    /// Subscribe to connection state changes.
    fn state(&self) -> watch::Receiver<StreamState>;
}

impl Transport for WebSocketClient {
    fn start(&self) {
        WebSocketClient::start(self);
    }

    async fn stop(&self) {
        WebSocketClient::stop(self).await;
    }

    fn state(&self) -> watch::Receiver<StreamState> {
        WebSocketClient::state(self)
    }
}

/// Transport settings derived from the tailer config and the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub allow_unencrypted: bool,
    pub reconnect_interval: Duration,
}

/// Builds the transport once a session is authorized.
pub trait TransportFactory: Send + Sync {
    type Transport: Transport;

    fn build(
        &self,
        session: &SessionDescriptor,
        options: TransportOptions,
        events: mpsc::Sender<IncomingMessage>,
    ) -> Self::Transport;
}

/// Builds [`WebSocketClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

impl TransportFactory for WebSocketFactory {
    type Transport = WebSocketClient;

    fn build(
        &self,
        session: &SessionDescriptor,
        options: TransportOptions,
        events: mpsc::Sender<IncomingMessage>,
    ) -> WebSocketClient {
        let config = WebSocketConfig {
            allow_unencrypted: options.allow_unencrypted,
            reconnect_interval: options.reconnect_interval,
            ..WebSocketConfig::default()
        };
        WebSocketClient::new(
            session.endpoint.clone(),
            session.session_id.clone(),
            &session.authorized_feature,
            config,
            events,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use url::Url;

    use super::*;

    fn descriptor() -> SessionDescriptor {
        SessionDescriptor {
            endpoint: Url::parse("wss://stream.example.test/subscribe").unwrap(),
            session_id: "cliws_1".into(),
            authorized_feature: "request_logs".into(),
            reconnect_delay: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn factory_applies_feature_and_scheme() {
        let (tx, _rx) = mpsc::channel(1);
        let options = TransportOptions {
            allow_unencrypted: true,
            reconnect_interval: Duration::from_secs(1),
        };
        let client = WebSocketFactory.build(&descriptor(), options, tx);
        assert_eq!(
            client.url().as_str(),
            "ws://stream.example.test/subscribe?websocket_feature=request_logs"
        );
        assert_eq!(client.current_state(), StreamState::Idle);
    }

    #[test]
    fn session_client_uses_config_base() {
        let config = TailerConfig::new(
            Url::parse("https://api.example.test").unwrap(),
            "laptop",
            SecretString::from("sk_test"),
        );
        let client = session_client(&config, Some(Duration::from_secs(3))).unwrap();
        assert_eq!(client.base_url().as_str(), "https://api.example.test/");
    }
}
