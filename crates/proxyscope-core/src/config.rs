// ── Runtime telemetry configuration ──
//
// Describes how to reach the control plane and how to pace a session.
// Never touches disk: the CLI builds a `TelemetryConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use proxyscope_api::{TlsMode, TransportConfig};

use crate::frame::{HIDDEN_FLUSH_DELAY, SHORT_FLUSH_DELAY};
use crate::window::{DEFAULT_CAPACITY, DEFAULT_WINDOW};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh intervals below this are raised to it.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Floor of the staleness threshold.
pub const MIN_STALE_AFTER: Duration = Duration::from_millis(4000);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Configuration for one control plane.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// API base URL (e.g. `http://127.0.0.1:9090`).
    pub api: Url,
    /// Optional access key; absent for unauthenticated control planes.
    pub access_key: Option<SecretString>,
    pub tls: TlsVerification,
    /// Per-request timeout for fetch and close.
    pub timeout: Duration,
    /// Push cadence hint, also the base of the staleness threshold.
    pub refresh_interval: Duration,
    /// Age bound of the traffic series.
    pub traffic_window: Duration,
    /// Count bound of the traffic series (plus one).
    pub traffic_points: usize,
    /// Consumer frame cadence; `None` falls back to `short_flush_delay`.
    pub frame_interval: Option<Duration>,
    pub short_flush_delay: Duration,
    pub hidden_flush_delay: Duration,
}

impl TelemetryConfig {
    pub fn new(api: Url) -> Self {
        Self {
            api,
            access_key: None,
            tls: TlsVerification::default(),
            timeout: DEFAULT_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            traffic_window: DEFAULT_WINDOW,
            traffic_points: DEFAULT_CAPACITY,
            frame_interval: Some(SHORT_FLUSH_DELAY),
            short_flush_delay: SHORT_FLUSH_DELAY,
            hidden_flush_delay: HIDDEN_FLUSH_DELAY,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }

    /// Watchdog period and staleness threshold for this refresh interval.
    pub fn stale_after(&self) -> Duration {
        stale_after(self.refresh_interval)
    }
}

/// `max(refresh × 4, 4000ms)`.
pub fn stale_after(refresh_interval: Duration) -> Duration {
    refresh_interval.saturating_mul(4).max(MIN_STALE_AFTER)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stale_threshold_has_floor() {
        assert_eq!(stale_after(Duration::from_millis(1000)), MIN_STALE_AFTER);
        assert_eq!(stale_after(Duration::from_millis(200)), MIN_STALE_AFTER);
        assert_eq!(
            stale_after(Duration::from_millis(2500)),
            Duration::from_millis(10_000)
        );
    }

    #[test]
    fn tls_maps_to_transport_mode() {
        let mut config = TelemetryConfig::new(Url::parse("http://127.0.0.1:9090").unwrap());
        config.tls = TlsVerification::DangerAcceptInvalid;
        assert!(matches!(config.transport().tls, TlsMode::DangerAcceptInvalid));
        assert_eq!(config.transport().timeout, DEFAULT_TIMEOUT);
    }
}
