//! Config subcommand handlers.

use std::fmt::Write as _;

use dialoguer::{Input, Select};

use logtail_core::{DEFAULT_API_BASE, OutputFormat};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;

/// Keys accepted by `config set`.
const SETTABLE_KEYS: &str =
    "api_base, api_key, api_key_env, device_name, output, feature, allow_unencrypted, timeout";

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking the plaintext API key.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "feature = \"{}\"", cfg.defaults.feature);
    if let Some(timeout) = cfg.defaults.timeout {
        let _ = writeln!(out, "timeout = {timeout}");
    }

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        if let Some(ref base) = p.api_base {
            let _ = writeln!(out, "api_base = \"{base}\"");
        }
        if p.api_key.is_some() {
            let _ = writeln!(out, "api_key = \"****\"");
        }
        if let Some(ref env) = p.api_key_env {
            let _ = writeln!(out, "api_key_env = \"{env}\"");
        }
        if let Some(ref device) = p.device_name {
            let _ = writeln!(out, "device_name = \"{device}\"");
        }
        if let Some(output) = p.output {
            let _ = writeln!(out, "output = \"{output}\"");
        }
        if let Some(ref feature) = p.feature {
            let _ = writeln!(out, "feature = \"{feature}\"");
        }
        if let Some(allow) = p.allow_unencrypted {
            let _ = writeln!(out, "allow_unencrypted = {allow}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
    }

    out
}

fn save(cfg: &Config) -> Result<(), CliError> {
    config::save_config(cfg)?;
    Ok(())
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn prompt_api_key() -> Result<String, CliError> {
    let key = rpassword::prompt_password("API key: ").map_err(prompt_err)?;
    if key.trim().is_empty() {
        return Err(CliError::Validation {
            field: "api_key".into(),
            reason: "API key cannot be empty".into(),
        });
    }
    Ok(key.trim().to_owned())
}

/// Offer to store the key in the system keyring or return it for plaintext config.
///
/// Returns `Some(key)` if the user chose plaintext, `None` if stored in keyring.
fn prompt_key_storage(key: &str, profile_name: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the API key?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        logtail_config::store_api_key(profile_name, key)?;
        eprintln!("   ✓ API key stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(key.to_owned()))
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: "must be 'true' or 'false'".into(),
    })
}

/// Apply `key = value` to a profile.
fn set_profile_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "api_base" | "api-base" => {
            logtail_config::parse_api_base(&value)?;
            profile.api_base = Some(value);
        }
        "api_key" | "api-key" => profile.api_key = Some(value),
        "api_key_env" | "api-key-env" => profile.api_key_env = Some(value),
        "device_name" | "device-name" => profile.device_name = Some(value),
        "output" => {
            let format: OutputFormat = value.parse().map_err(|_| CliError::Validation {
                field: "output".into(),
                reason: "must be 'human' or 'json'".into(),
            })?;
            profile.output = Some(format);
        }
        "feature" => profile.feature = Some(value),
        "allow_unencrypted" | "allow-unencrypted" => {
            profile.allow_unencrypted = Some(parse_bool("allow_unencrypted", &value)?);
        }
        "timeout" => {
            profile.timeout = Some(value.parse().map_err(|_| CliError::Validation {
                field: "timeout".into(),
                reason: "must be a number (seconds)".into(),
            })?);
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!("unknown config key '{other}'. Valid keys: {SETTABLE_KEYS}"),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("logtail configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            let api_base: String = Input::new()
                .with_prompt("API base URL")
                .default(DEFAULT_API_BASE.into())
                .interact_text()
                .map_err(prompt_err)?;
            logtail_config::parse_api_base(&api_base)?;

            let key = prompt_api_key()?;
            let api_key = prompt_key_storage(&key, &profile_name)?;

            let device_name: String = Input::new()
                .with_prompt("Device name")
                .default(logtail_config::default_device_name())
                .interact_text()
                .map_err(prompt_err)?;

            let formats = &["human", "json"];
            let output = match Select::new()
                .with_prompt("Output format")
                .items(formats)
                .default(0)
                .interact()
                .map_err(prompt_err)?
            {
                0 => OutputFormat::Human,
                _ => OutputFormat::Json,
            };

            let mut cfg = config::load_config().unwrap_or_default();
            cfg.profiles.insert(
                profile_name.clone(),
                Profile {
                    api_base: Some(api_base),
                    api_key,
                    device_name: Some(device_name),
                    output: Some(output),
                    ..Profile::default()
                },
            );
            cfg.default_profile = Some(profile_name.clone());
            save(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Active profile: {profile_name}");
            eprintln!("\n  Try it: logtail tail");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            if !global.quiet {
                print!("{}", format_config_redacted(&cfg));
            }
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config()?;
            let profile_name = config::active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();

            set_profile_key(profile, &key, value)?;
            save(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: logtail config init");
            } else {
                for name in cfg.profiles.keys() {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;

            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }

            cfg.default_profile = Some(name.clone());
            save(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        // ── SetKey ──────────────────────────────────────────────────
        ConfigCommand::SetKey => {
            let mut cfg = config::load_config()?;
            let profile_name = config::active_profile_name(global, &cfg);

            let key = prompt_api_key()?;
            logtail_config::store_api_key(&profile_name, &key)?;

            // Make sure the profile exists so `tail` picks it up.
            if !cfg.profiles.contains_key(&profile_name) {
                cfg.profiles.insert(profile_name.clone(), Profile::default());
                save(&cfg)?;
            }

            eprintln!("✓ API key for profile '{profile_name}' stored in system keyring");
            Ok(())
        }
    }
}
