use thiserror::Error;

/// Top-level error type for the `proxyscope-api` crate.
///
/// Covers every failure mode of the control-plane surface: transport,
/// HTTP status, push stream, and payload decoding. `proxyscope-core`
/// maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Control plane ───────────────────────────────────────────────
    /// The control plane rejected the access key (HTTP 401/403).
    #[error("Unauthorized (HTTP {status}) -- check the access key")]
    Unauthorized { status: u16 },

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ── Push stream ─────────────────────────────────────────────────
    /// Event stream failed or was refused.
    #[error("Event stream error: {0}")]
    Stream(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the control plane rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Self::Timeout { .. } | Self::Stream(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Http {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());

        let err = Error::Http {
            status: 404,
            body: String::new(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn unauthorized_is_auth_and_not_transient() {
        let err = Error::Unauthorized { status: 401 };
        assert!(err.is_auth());
        assert!(!err.is_transient());
    }
}
