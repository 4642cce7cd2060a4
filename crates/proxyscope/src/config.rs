//! CLI configuration: thin wrapper around `proxyscope_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api, --access-key, --insecure, --timeout).

use std::time::Duration;

use secrecy::SecretString;

use proxyscope_config::{Config, Profile};
use proxyscope_core::{TelemetryConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use proxyscope_config::{config_path, load_config_or_default};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `TelemetryConfig` from the config file, profile, and CLI overrides.
pub fn build_telemetry_config(global: &GlobalOpts) -> Result<TelemetryConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, &cfg, global);
    }

    // An explicitly named profile that doesn't exist is an error even when
    // --api would be enough on its own.
    if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(&cfg),
        });
    }

    // No profile: build from CLI flags / env vars alone
    let url_str = global.api.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let api = proxyscope_config::parse_api_url(url_str)?;

    let mut config = TelemetryConfig::new(api);
    config.access_key = global.access_key.clone().map(SecretString::from);
    config.tls = if global.insecure || cfg.defaults.insecure {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::SystemDefaults
    };
    config.timeout = Duration::from_secs(global.timeout.unwrap_or(cfg.defaults.timeout));
    config.refresh_interval = Duration::from_millis(cfg.defaults.refresh_interval_ms);
    Ok(config)
}

/// Translate a `Profile` + global flags into a `TelemetryConfig`.
///
/// CLI flag overrides take priority over profile values.
fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<TelemetryConfig, CliError> {
    let mut config =
        proxyscope_config::profile_to_telemetry_config(profile, profile_name, &cfg.defaults)?;

    if let Some(ref url_str) = global.api {
        config.api = proxyscope_config::parse_api_url(url_str)?;
    }
    if let Some(ref key) = global.access_key {
        config.access_key = Some(SecretString::from(key.clone()));
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}
