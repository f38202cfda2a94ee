// ── Event dispatcher ──
//
// Consumes inbound messages from the transport channel and renders each
// request-log event as one record on the output sink. Runs on its own
// task, so a slow terminal never stalls the socket reader beyond the
// channel's capacity.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use logtail_api::{IncomingMessage, RequestLogEvent};

use crate::config::OutputFormat;
use crate::output::OutputSink;
use crate::render::{self, EventPayload};

/// Renders request-log events to an [`OutputSink`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    format: OutputFormat,
    color: bool,
    sink: OutputSink,
}

impl Dispatcher {
    pub fn new(format: OutputFormat, color: bool, sink: OutputSink) -> Self {
        Self {
            format,
            color,
            sink,
        }
    }

    /// Handle one inbound message.
    ///
    /// Anything other than a request-log event is logged and skipped.
    /// Write failures are logged, never returned.
    pub fn handle(&self, message: &IncomingMessage) {
        let Some(event) = message.as_request_log() else {
            warn!(
                kind = message.kind(),
                "received a non request log event on the request log stream"
            );
            return;
        };

        debug!(request_log_id = %event.request_log_id, "processing request log event");
        let record = self.render(event);
        if let Err(e) = self.sink.write_line(&record) {
            warn!(error = %e, "failed to write request log");
        }
    }

    /// Render one event according to the output format.
    pub fn render(&self, event: &RequestLogEvent) -> String {
        let raw = event.event_payload.as_str();
        match self.format {
            OutputFormat::Json => render::pretty_json(raw, self.color).unwrap_or_else(|e| {
                warn!(error = %e, "request log payload is not JSON, printing it verbatim");
                raw.to_owned()
            }),
            OutputFormat::Human => {
                let payload = EventPayload::parse(raw).unwrap_or_else(|e| {
                    warn!(error = %e, "received malformed payload");
                    EventPayload::salvage(raw)
                });
                render::human_line(&payload, self.color)
            }
        }
    }

    /// Drain `events` until every sender is gone. Returns the number of
    /// messages handled.
    pub async fn run(self, mut events: mpsc::Receiver<IncomingMessage>) -> usize {
        let mut handled = 0usize;
        while let Some(message) = events.recv().await {
            self.handle(&message);
            handled += 1;
        }
        debug!(handled, "event channel closed, dispatcher exiting");
        handled
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::output::SharedBuffer;

    fn request_log(id: &str, payload: &str) -> IncomingMessage {
        IncomingMessage::RequestLog(RequestLogEvent {
            event_payload: payload.to_owned(),
            request_log_id: id.to_owned(),
            kind: logtail_api::message::REQUEST_LOG_EVENT.to_owned(),
        })
    }

    fn dispatcher(format: OutputFormat) -> (Dispatcher, SharedBuffer) {
        let (sink, buffer) = OutputSink::buffer();
        (Dispatcher::new(format, false, sink), buffer)
    }

    #[test]
    fn human_mode_writes_one_line_per_event() {
        let (dispatcher, buffer) = dispatcher(OutputFormat::Human);
        dispatcher.handle(&request_log(
            "resp_1",
            r#"{"created_at":"12:00:00","status":200,"method":"GET","url":"/v1/balance","request_id":"req_1"}"#,
        ));
        assert_eq!(buffer.lines(), ["12:00:00 [200] GET /v1/balance req_1"]);
    }

    #[test]
    fn other_messages_produce_no_output() {
        let (dispatcher, buffer) = dispatcher(OutputFormat::Human);
        dispatcher.handle(&IncomingMessage::Other {
            kind: "webhook_event".into(),
        });
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn malformed_payload_does_not_stop_later_events() {
        let (dispatcher, buffer) = dispatcher(OutputFormat::Human);
        dispatcher.handle(&request_log("resp_1", r#"{"status":"oops","method":"GET"}"#));
        dispatcher.handle(&request_log("resp_2", "garbage"));
        dispatcher.handle(&request_log(
            "resp_3",
            r#"{"created_at":"t","status":404,"method":"DELETE","url":"/x","request_id":"req_3"}"#,
        ));

        let lines = buffer.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], " [0] GET  ");
        assert_eq!(lines[1], " [0]   ");
        assert_eq!(lines[2], "t [404] DELETE /x req_3");
    }

    #[test]
    fn json_mode_pretty_prints_payload() {
        let (dispatcher, buffer) = dispatcher(OutputFormat::Json);
        dispatcher.handle(&request_log("resp_1", r#"{"status":200}"#));
        assert_eq!(buffer.contents(), "{\n  \"status\": 200\n}\n");
    }

    #[test]
    fn json_mode_prints_non_json_verbatim() {
        let (dispatcher, buffer) = dispatcher(OutputFormat::Json);
        dispatcher.handle(&request_log("resp_1", "not { json"));
        assert_eq!(buffer.contents(), "not { json\n");
    }

    #[tokio::test]
    async fn run_drains_channel_in_order() {
        let (dispatcher, buffer) = dispatcher(OutputFormat::Human);
        let (tx, rx) = mpsc::channel(8);
        for i in 1..=5 {
            tx.send(request_log(
                &format!("resp_{i}"),
                &format!(r#"{{"status":200,"request_id":"req_{i}"}}"#),
            ))
            .await
            .unwrap();
        }
        drop(tx);

        let handled = dispatcher.run(rx).await;
        assert_eq!(handled, 5);
        let ids: Vec<String> = buffer
            .lines()
            .iter()
            .map(|l| l.rsplit(' ').next().unwrap().to_owned())
            .collect();
        assert_eq!(ids, ["req_1", "req_2", "req_3", "req_4", "req_5"]);
    }
}
