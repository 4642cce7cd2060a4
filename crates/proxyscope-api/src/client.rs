// Control-plane HTTP client for the connections endpoints.
//
// Wraps `reqwest::Client` with base-URL joining, credential decoration, and
// status mapping. Payloads are returned as raw text: validation and shaping
// belong to the caller's normalizer, which must be able to reject a bad
// tick without side effects.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::{RequestDecorator, TransportConfig};

/// Longest body excerpt carried in an [`Error::Http`].
const BODY_PREVIEW: usize = 200;

#[derive(Debug, Serialize)]
struct CloseRequest<'a> {
    ids: &'a [u64],
}

/// Client for `GET /connections`, `GET /connections/stream` and
/// `POST /connections/close`.
///
/// Cheap to clone: both inner `reqwest::Client`s and the decorator are
/// reference counted.
#[derive(Debug, Clone)]
pub struct ConnectionsClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    base_url: Url,
    decorator: Arc<dyn RequestDecorator>,
}

impl ConnectionsClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the control-plane API root, e.g. `http://127.0.0.1:9090/api`.
    pub fn new(
        base_url: Url,
        transport: &TransportConfig,
        decorator: Arc<dyn RequestDecorator>,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            stream_http: transport.build_stream_client()?,
            base_url,
            decorator,
        })
    }

    /// Create a client around a pre-built `reqwest::Client` (used for both paths).
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        decorator: Arc<dyn RequestDecorator>,
    ) -> Self {
        Self {
            stream_http: http.clone(),
            http,
            base_url,
            decorator,
        }
    }

    /// The control-plane base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn stream_http(&self) -> &reqwest::Client {
        &self.stream_http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/{path}`, tolerant of a trailing slash on the base.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// Push-stream URL with the cadence hint and query-parameter credentials.
    pub fn stream_url(&self, interval: Duration) -> Result<Url, Error> {
        let mut url = self.api_url("connections/stream")?;
        url.query_pairs_mut()
            .append_pair("interval", &interval.as_millis().to_string());
        self.decorator.decorate_url(&mut url);
        Ok(url)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET {base}/connections`: the raw snapshot body.
    pub async fn fetch_connections(&self) -> Result<String, Error> {
        let url = self.api_url("connections")?;
        debug!("GET {}", url);

        let request = self.decorator.decorate(self.http.get(url));
        let resp = request.send().await?;
        let resp = check_status(resp).await?;
        let body = resp.text().await?;
        trace!(bytes = body.len(), "connections body received");
        Ok(body)
    }

    /// `POST {base}/connections/close` with `{ids: [...]}`. Best effort on
    /// the control plane's side; a 2xx only means the request was accepted.
    pub async fn close_connections(&self, ids: &[u64]) -> Result<(), Error> {
        let url = self.api_url("connections/close")?;
        debug!(count = ids.len(), "POST {}", url);

        let request = self
            .decorator
            .decorate(self.http.post(url).json(&CloseRequest { ids }));
        let resp = request.send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

/// Map non-success statuses to typed errors, passing 2xx through.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Unauthorized {
            status: status.as_u16(),
        });
    }

    let body = resp.text().await.unwrap_or_default();
    let preview: String = body.chars().take(BODY_PREVIEW).collect();
    Err(Error::Http {
        status: status.as_u16(),
        body: preview,
    })
}
