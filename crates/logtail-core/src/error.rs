// ── Core error types ──
//
// User-facing errors from logtail-core. Callers never see reqwest or
// tungstenite errors directly: the `From<logtail_api::Error>` impl folds
// transport-layer failures into the variants below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Authorization failed: {message}")]
    Authorization { message: String },

    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Request log stream terminated unexpectedly")]
    StreamTerminated,

    #[error("Event dispatcher stopped: {reason}")]
    DispatcherFailed { reason: String },

    // ── Process errors ───────────────────────────────────────────────
    #[error("Failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Returns `true` for failures of the session authorization step.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<logtail_api::Error> for CoreError {
    fn from(err: logtail_api::Error) -> Self {
        match err {
            logtail_api::Error::Authentication { message } => CoreError::Authorization { message },
            logtail_api::Error::Transport(ref e) => {
                if e.is_connect() || e.is_timeout() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            logtail_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            logtail_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            logtail_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            logtail_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            logtail_api::Error::Deserialization { message, body: _ } => CoreError::Api {
                message: format!("Unexpected response: {message}"),
                status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_maps_to_authorization() {
        let err: CoreError = logtail_api::Error::Authentication {
            message: "invalid api key".into(),
        }
        .into();
        assert!(err.is_authorization());
        assert_eq!(err.to_string(), "Authorization failed: invalid api key");
    }

    #[test]
    fn api_error_keeps_status() {
        let err: CoreError = logtail_api::Error::Api {
            status: 503,
            message: "unavailable".into(),
        }
        .into();
        assert!(matches!(
            err,
            CoreError::Api {
                status: Some(503),
                ..
            }
        ));
    }

    #[test]
    fn websocket_failure_is_connection_failure() {
        let err: CoreError = logtail_api::Error::WebSocketConnect("refused".into()).into();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
        assert!(!err.is_authorization());
    }
}
