// Session authorization client
//
// Exchanges an API key, device name, and feature for a short-lived
// websocket session. The response carries everything the transport needs
// to open a feature-scoped connection.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Path of the session endpoint, relative to the API base.
const SESSIONS_PATH: &str = "v1/cli/sessions";

/// Reconnect delay used when the server does not provide one.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Addressing and credentials for one streaming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    /// Websocket endpoint to connect to.
    pub endpoint: Url,
    /// Opaque session identifier presented on the upgrade request.
    pub session_id: String,
    /// Feature the server authorized for this session.
    pub authorized_feature: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

/// Raw session response body.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    websocket_url: String,
    websocket_id: String,
    websocket_authorized_feature: String,
    #[serde(default)]
    reconnect_delay: u64,
}

impl TryFrom<SessionResponse> for SessionDescriptor {
    type Error = Error;

    fn try_from(resp: SessionResponse) -> Result<Self, Error> {
        let reconnect_delay = if resp.reconnect_delay == 0 {
            DEFAULT_RECONNECT_DELAY
        } else {
            Duration::from_secs(resp.reconnect_delay)
        };

        Ok(Self {
            endpoint: Url::parse(&resp.websocket_url)?,
            session_id: resp.websocket_id,
            authorized_feature: resp.websocket_authorized_feature,
            reconnect_delay,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// HTTP client for the session authorization endpoint.
///
/// Makes exactly one request per [`authorize`](Self::authorize) call and
/// never retries.
pub struct SessionClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

impl SessionClient {
    /// Create a session client from a `TransportConfig`.
    pub fn new(
        base_url: Url,
        api_key: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, api_key))
    }

    /// Create a session client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, api_key: SecretString) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full URL of the session endpoint.
    fn sessions_url(&self) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{SESSIONS_PATH}"))?)
    }

    /// Request a websocket session for `feature` on behalf of `device_name`.
    pub async fn authorize(
        &self,
        device_name: &str,
        feature: &str,
    ) -> Result<SessionDescriptor, Error> {
        let url = self.sessions_url()?;
        debug!(%url, device_name, feature, "requesting websocket session");

        let resp = self
            .http
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .form(&[("device_name", device_name), ("websocket_features[]", feature)])
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication {
                message: error_message(&body)
                    .unwrap_or_else(|| format!("API key rejected (HTTP {status})")),
            });
        }

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or(body),
            });
        }

        let session: SessionResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        let descriptor = SessionDescriptor::try_from(session)?;
        debug!(
            endpoint = %descriptor.endpoint,
            feature = %descriptor.authorized_feature,
            reconnect_delay_secs = descriptor.reconnect_delay.as_secs(),
            "session authorized"
        );
        Ok(descriptor)
    }
}

/// Pull `error.message` out of an error body, if it has one.
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> SessionClient {
        SessionClient::with_client(
            reqwest::Client::new(),
            Url::parse(base).unwrap(),
            SecretString::from("sk_test_123".to_string()),
        )
    }

    #[test]
    fn sessions_url_handles_trailing_slash() {
        let with = client("https://api.example.com/").sessions_url().unwrap();
        let without = client("https://api.example.com").sessions_url().unwrap();
        assert_eq!(with.as_str(), "https://api.example.com/v1/cli/sessions");
        assert_eq!(with, without);
    }

    #[test]
    fn zero_reconnect_delay_falls_back_to_default() {
        let resp = SessionResponse {
            websocket_url: "wss://stream.example.com/subscribe".into(),
            websocket_id: "ws_1".into(),
            websocket_authorized_feature: "request_logs".into(),
            reconnect_delay: 0,
        };
        let descriptor = SessionDescriptor::try_from(resp).unwrap();
        assert_eq!(descriptor.reconnect_delay, DEFAULT_RECONNECT_DELAY);
    }

    #[test]
    fn invalid_websocket_url_is_rejected() {
        let resp = SessionResponse {
            websocket_url: "not a url".into(),
            websocket_id: "ws_1".into(),
            websocket_authorized_feature: "request_logs".into(),
            reconnect_delay: 3,
        };
        let err = SessionDescriptor::try_from(resp).unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn error_message_reads_nested_field() {
        let body = r#"{"error": {"message": "Invalid API Key provided"}}"#;
        assert_eq!(error_message(body).as_deref(), Some("Invalid API Key provided"));
        assert_eq!(error_message("<html>"), None);
    }
}
