// ── Runtime tailer configuration ──
//
// Describes *what* to stream and *how* to render it. Carries the API key
// but never touches disk: logtail-config resolves profiles and the CLI
// hands the finished `TailerConfig` in.

use secrecy::SecretString;
use url::Url;

/// API base used when neither a profile nor a flag overrides it.
pub const DEFAULT_API_BASE: &str = "https://api.logtail.dev";

/// Feature requested from the session endpoint by default.
pub const DEFAULT_FEATURE: &str = "request_logs";

/// How request-log events are rendered.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// One summary line per request.
    #[default]
    Human,
    /// The raw payload, pretty-printed.
    Json,
}

/// Everything a [`Tailer`](crate::Tailer) needs for one run.
///
/// Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// Base URL of the API hosting the session endpoint.
    pub api_base: Url,
    /// Name reported to the session endpoint for this machine.
    pub device_name: String,
    pub api_key: SecretString,
    pub output: OutputFormat,
    /// Rewrite `wss://` session endpoints to `ws://`.
    pub allow_unencrypted: bool,
    /// Feature to request when authorizing the session.
    pub feature: String,
    /// Emit ANSI colors in rendered output.
    pub color: bool,
}

impl TailerConfig {
    /// A config with default feature, human output, and no colors.
    pub fn new(api_base: Url, device_name: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            api_base,
            device_name: device_name.into(),
            api_key,
            output: OutputFormat::default(),
            allow_unencrypted: false,
            feature: DEFAULT_FEATURE.to_owned(),
            color: false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parses_lowercase() {
        assert_eq!("json".parse::<OutputFormat>().ok(), Some(OutputFormat::Json));
        assert_eq!("human".parse::<OutputFormat>().ok(), Some(OutputFormat::Human));
        assert!("yaml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn new_applies_defaults() {
        let base = Url::parse(DEFAULT_API_BASE).unwrap();
        let config = TailerConfig::new(base, "laptop", SecretString::from("sk_test"));
        assert_eq!(config.feature, DEFAULT_FEATURE);
        assert_eq!(config.output, OutputFormat::Human);
        assert!(!config.allow_unencrypted);
        assert!(!config.color);
    }
}
