// Shared HTTP transport configuration.
//
// The session client builds its `reqwest::Client` from this module so the
// timeout and user-agent settings live in one place.

use std::time::Duration;

use crate::error::Error;

/// User agent sent on both the HTTP session request and the websocket upgrade.
pub const USER_AGENT: &str = concat!("logtail/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_timeout() {
        let config = TransportConfig::default();
        assert!(config.timeout.is_none());
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn client_builds_with_timeout() {
        let config = TransportConfig {
            timeout: Some(Duration::from_secs(3)),
        };
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn user_agent_carries_version() {
        assert!(USER_AGENT.starts_with("logtail/"));
    }
}
