// ── Core error types ──
//
// Only the facade's explicit operations (one-shot fetch, close) return
// these. The live session never surfaces errors: it logs them and moves
// the stream status instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach control plane at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Control plane request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Malformed connections payload")]
    MalformedSnapshot,

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Telemetry is not active")]
    Inactive,
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<proxyscope_api::Error> for CoreError {
    fn from(err: proxyscope_api::Error) -> Self {
        use proxyscope_api::Error as Api;

        match err {
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            Api::Unauthorized { status } => CoreError::AuthenticationFailed {
                message: format!("access key rejected (HTTP {status})"),
            },
            Api::Http { status, body } => CoreError::Api {
                message: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                },
                status: Some(status),
            },
            Api::Stream(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("event stream failed: {reason}"),
            },
            Api::Deserialization { message, body: _ } => CoreError::Api {
                message: format!("Deserialization error: {message}"),
                status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_auth_failure() {
        let err = CoreError::from(proxyscope_api::Error::Unauthorized { status: 403 });
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    }

    #[test]
    fn http_error_keeps_status() {
        let err = CoreError::from(proxyscope_api::Error::Http {
            status: 502,
            body: String::new(),
        });
        match err {
            CoreError::Api { message, status } => {
                assert_eq!(status, Some(502));
                assert_eq!(message, "HTTP 502");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
