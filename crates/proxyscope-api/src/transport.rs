// Shared transport configuration for building reqwest::Client instances.
//
// The request/response client and the long-lived event stream client share
// TLS and user-agent settings through this module. Credentials are applied
// per request by a `RequestDecorator`, never baked into the client.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

const USER_AGENT: &str = concat!("proxyscope/", env!("CARGO_PKG_VERSION"));

/// Query parameter carrying the access key on transports that cannot
/// set custom headers.
pub const ACCESS_KEY_PARAM: &str = "access_key";

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed control planes).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Whole-request timeout for request/response calls.
    pub timeout: Duration,
    /// Connect timeout, also applied to the event stream (which has no
    /// whole-request timeout).
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` for request/response calls.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.builder()?
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Build a `reqwest::Client` for the push stream.
    ///
    /// No whole-request timeout: the response body is open-ended.
    pub fn build_stream_client(&self) -> Result<reqwest::Client, Error> {
        self.builder()?
            .build()
            .map_err(|e| Error::Tls(format!("failed to build stream client: {e}")))
    }

    fn builder(&self) -> Result<reqwest::ClientBuilder, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        Ok(builder)
    }
}

// ── Request decoration ───────────────────────────────────────────────

/// Adds credentials to outgoing calls.
///
/// Request/response calls go through [`decorate`](Self::decorate) (header
/// auth). The push stream goes through [`decorate_url`](Self::decorate_url),
/// mirroring clients that cannot attach headers to an event source.
pub trait RequestDecorator: Send + Sync + fmt::Debug {
    fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder;

    fn decorate_url(&self, url: &mut Url);
}

/// No credentials; requests pass through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl RequestDecorator for Anonymous {
    fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
    }

    fn decorate_url(&self, _url: &mut Url) {}
}

/// Bearer access key, or `?access_key=` on the stream URL.
pub struct AccessKey(SecretString);

impl AccessKey {
    pub fn new(key: SecretString) -> Self {
        Self(key)
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessKey(***)")
    }
}

impl RequestDecorator for AccessKey {
    fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(self.0.expose_secret())
    }

    fn decorate_url(&self, url: &mut Url) {
        url.query_pairs_mut()
            .append_pair(ACCESS_KEY_PARAM, self.0.expose_secret());
    }
}

/// Pick a decorator for an optional access key.
pub fn decorator_for(access_key: Option<SecretString>) -> Arc<dyn RequestDecorator> {
    match access_key {
        Some(key) if !key.expose_secret().is_empty() => Arc::new(AccessKey::new(key)),
        _ => Arc::new(Anonymous),
    }
}
