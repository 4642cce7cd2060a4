//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use proxyscope_config::ConfigError;
use proxyscope_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(dead_code, unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the control plane at {url}")]
    #[diagnostic(
        code(proxyscope::connection_failed),
        help(
            "Check that the proxy is running and its API is reachable.\n\
             Reason: {reason}\n\
             Try: proxyscope snapshot --api http://127.0.0.1:9090"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Access key rejected for profile '{profile}'")]
    #[diagnostic(
        code(proxyscope::auth_failed),
        help(
            "Verify the access key configured on the control plane.\n\
             Pass it with --access-key or set PROXYSCOPE_ACCESS_KEY."
        )
    )]
    AuthFailed { profile: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error: {message}")]
    #[diagnostic(code(proxyscope::api_error))]
    Api {
        message: String,
        status: Option<u16>,
    },

    #[error("The control plane returned a malformed connections payload")]
    #[diagnostic(
        code(proxyscope::malformed),
        help("The API responded, but not with a connections snapshot. Check the --api URL.")
    )]
    Malformed,

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(proxyscope::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(proxyscope::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No control plane configured")]
    #[diagnostic(
        code(proxyscope::no_config),
        help(
            "Pass --api <URL> or set PROXYSCOPE_API, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(proxyscope::config))]
    Config { message: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(proxyscope::timeout),
        help("Increase timeout with --timeout or check control-plane responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(proxyscope::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::ProfileNotFound { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url: if url.is_empty() {
                    "(unknown)".into()
                } else {
                    url
                },
                reason,
            },
            CoreError::AuthenticationFailed { message: _ } => CliError::AuthFailed {
                profile: "current".into(),
            },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::MalformedSnapshot => CliError::Malformed,
            CoreError::Api { message, status } => CliError::Api { message, status },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Inactive => CliError::Api {
                message: "telemetry session is not running".into(),
                status: None,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let auth = CliError::from(CoreError::AuthenticationFailed {
            message: "nope".into(),
        });
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let timeout = CliError::from(CoreError::Timeout { timeout_secs: 5 });
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);

        let conn = CliError::from(CoreError::ConnectionFailed {
            url: String::new(),
            reason: "refused".into(),
        });
        assert_eq!(conn.exit_code(), exit_code::CONNECTION);

        let missing = CliError::NoConfig {
            path: "/nowhere".into(),
        };
        assert_eq!(missing.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn malformed_payload_is_general_failure() {
        let err = CliError::from(CoreError::MalformedSnapshot);
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
