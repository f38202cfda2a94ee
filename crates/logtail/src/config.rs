//! CLI configuration: thin wrapper around `logtail_config`.
//!
//! Adds resolution that respects `GlobalOpts` and `tail` flag overrides
//! (--api-base, --api-key, --format, ...).

use std::time::Duration;

use secrecy::SecretString;

use logtail_core::{OutputFormat, TailerConfig};

use crate::cli::{self, GlobalOpts, TailArgs};
use crate::error::CliError;
use crate::output;

// ── Re-exports from shared crate ────────────────────────────────────

pub use logtail_config::{Config, Defaults, Profile, config_path, load_config, save_config};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.active_profile_name(global.profile.as_deref())
}

/// Comma-separated profile names, for error help text.
pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

impl From<cli::OutputFormat> for OutputFormat {
    fn from(format: cli::OutputFormat) -> Self {
        match format {
            cli::OutputFormat::Human => Self::Human,
            cli::OutputFormat::Json => Self::Json,
        }
    }
}

/// Everything `tail` needs: the tailer config and the session timeout.
#[derive(Debug)]
pub struct ResolvedTail {
    pub tailer: TailerConfig,
    pub timeout: Option<Duration>,
}

/// Merge config file, profile, and flags into a runnable tail config.
///
/// Flags beat environment, which beats the profile, which beats defaults.
/// An explicitly requested profile must exist; the implicit default may be
/// absent, in which case flags and env alone must supply a key.
pub fn resolve_tail(
    global: &GlobalOpts,
    args: &TailArgs,
    config: &Config,
) -> Result<ResolvedTail, CliError> {
    let profile_name = active_profile_name(global, config);
    let stored = config.profiles.get(&profile_name);

    if stored.is_none() && global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(config),
        });
    }

    let mut profile = stored.cloned().unwrap_or_default();
    if let Some(ref api_base) = global.api_base {
        profile.api_base = Some(api_base.clone());
    }
    if let Some(ref device_name) = args.device_name {
        profile.device_name = Some(device_name.clone());
    }
    if let Some(ref feature) = args.feature {
        profile.feature = Some(feature.clone());
    }
    if let Some(format) = args.format {
        profile.output = Some(format.into());
    }
    if args.no_wss {
        profile.allow_unencrypted = Some(true);
    }

    let api_key = global.api_key.clone().map(SecretString::from);
    let mut tailer =
        logtail_config::profile_to_tailer_config(&profile, &profile_name, &config.defaults, api_key)?;
    tailer.color = output::should_color(global.color);

    let timeout = global
        .timeout
        .map(Duration::from_secs)
        .or_else(|| config.timeout(stored));

    Ok(ResolvedTail { tailer, timeout })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn parse(args: &[&str]) -> (GlobalOpts, TailArgs) {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Tail(tail) => (cli.global, tail),
            other => panic!("expected tail, got {other:?}"),
        }
    }

    fn config_with_profile() -> Config {
        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                api_base: Some("https://profile.example.test".into()),
                api_key: Some("sk_profile".into()),
                device_name: Some("from-profile".into()),
                timeout: Some(20),
                ..Profile::default()
            },
        );
        config
    }

    #[test]
    fn flags_override_profile() {
        let (global, args) = parse(&[
            "logtail",
            "--api-base",
            "https://flag.example.test",
            "--api-key",
            "sk_flag",
            "--timeout",
            "3",
            "--color",
            "never",
            "tail",
            "--format",
            "json",
            "--device-name",
            "from-flag",
            "--no-wss",
        ]);
        let resolved = resolve_tail(&global, &args, &config_with_profile()).unwrap();

        assert_eq!(resolved.tailer.api_base.as_str(), "https://flag.example.test/");
        assert_eq!(resolved.tailer.device_name, "from-flag");
        assert_eq!(resolved.tailer.output, OutputFormat::Json);
        assert!(resolved.tailer.allow_unencrypted);
        assert!(!resolved.tailer.color);
        assert_eq!(resolved.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn profile_fills_unset_flags() {
        let (global, args) = parse(&["logtail", "--api-key", "sk_flag", "tail"]);
        let resolved = resolve_tail(&global, &args, &config_with_profile()).unwrap();

        assert_eq!(resolved.tailer.api_base.as_str(), "https://profile.example.test/");
        assert_eq!(resolved.tailer.device_name, "from-profile");
        assert_eq!(resolved.tailer.output, OutputFormat::Human);
        assert_eq!(resolved.tailer.feature, "request_logs");
        assert_eq!(resolved.timeout, Some(Duration::from_secs(20)));
    }

    #[test]
    fn missing_explicit_profile_is_an_error() {
        let (global, args) = parse(&["logtail", "-p", "staging", "tail"]);
        let err = resolve_tail(&global, &args, &config_with_profile()).unwrap_err();
        assert!(
            matches!(err, CliError::ProfileNotFound { ref available, .. } if available == "default")
        );
    }
}
