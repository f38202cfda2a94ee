//! Configuration for the logtail CLI.
//!
//! TOML profiles, API key resolution (env + keyring + plaintext), and
//! translation to `logtail_core::TailerConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use logtail_core::{DEFAULT_API_BASE, DEFAULT_FEATURE, OutputFormat, TailerConfig};

/// Keyring service name for stored API keys.
pub const KEYRING_SERVICE: &str = "logtail";

/// Prefix for environment overrides, e.g. `LOGTAIL_DEFAULTS__OUTPUT=json`.
const ENV_PREFIX: &str = "LOGTAIL_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: the flag, else the configured default,
    /// else `"default"`.
    pub fn active_profile_name(&self, flag: Option<&str>) -> String {
        flag.map(String::from)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    /// Request timeout for `profile`, falling back to the global default.
    /// `None` means no timeout.
    pub fn timeout(&self, profile: Option<&Profile>) -> Option<Duration> {
        profile
            .and_then(|p| p.timeout)
            .or(self.defaults.timeout)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub output: OutputFormat,

    /// `auto`, `always`, or `never`.
    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_feature")]
    pub feature: String,

    /// Session request timeout in seconds. Unset waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: OutputFormat::default(),
            color: default_color(),
            feature: default_feature(),
            timeout: None,
        }
    }
}

fn default_color() -> String {
    "auto".into()
}
fn default_feature() -> String {
    DEFAULT_FEATURE.into()
}

/// A named profile. Every field is optional and falls back to
/// [`Defaults`] or a built-in value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL (e.g., "https://api.logtail.dev").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// API key (plaintext, prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Device name reported to the session endpoint. Defaults to the hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputFormat>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,

    /// Rewrite `wss://` session endpoints to `ws://`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_unencrypted: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "logtail", "logtail").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("logtail");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` + environment. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key"))
}

/// Resolve an API key from the credential chain (no CLI flag step).
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's api_key_env → env var lookup
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
        debug!(env_name, "api_key_env is set but the variable is missing");
    }

    // 2. System keyring
    match keyring_entry(profile_name).and_then(|entry| entry.get_password()) {
        Ok(secret) => return Ok(SecretString::from(secret)),
        Err(e) => debug!(profile = profile_name, error = %e, "no API key in keyring"),
    }

    // 3. Plaintext in config
    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store `api_key` in the system keyring for `profile_name`.
pub fn store_api_key(profile_name: &str, api_key: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(api_key)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Parse and check an API base URL.
pub fn parse_api_base(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Validation {
        field: "api_base".into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Validation {
            field: "api_base".into(),
            reason: format!("expected an http or https URL, got scheme '{other}'"),
        }),
    }
}

/// The machine's hostname, or `"unknown"` if it cannot be read.
pub fn default_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".into())
}

/// Build a `TailerConfig` from a profile.
///
/// `api_key`, when given, is used as-is instead of walking the credential
/// chain. Colors are left off; the caller decides based on the terminal.
pub fn profile_to_tailer_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    api_key: Option<SecretString>,
) -> Result<TailerConfig, ConfigError> {
    let api_base = parse_api_base(profile.api_base.as_deref().unwrap_or(DEFAULT_API_BASE))?;
    let api_key = match api_key {
        Some(key) => key,
        None => resolve_api_key(profile, profile_name)?,
    };
    let device_name = profile
        .device_name
        .clone()
        .unwrap_or_else(default_device_name);

    let mut config = TailerConfig::new(api_base, device_name, api_key);
    config.output = profile.output.unwrap_or(defaults.output);
    config.feature = profile
        .feature
        .clone()
        .unwrap_or_else(|| defaults.feature.clone());
    config.allow_unencrypted = profile.allow_unencrypted.unwrap_or(false);
    Ok(config)
}
