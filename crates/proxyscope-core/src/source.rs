// ── Snapshot sources ──
//
// The seam between the session loop and the control plane. The real
// implementation is `ConnectionsClient`; tests drive the loop with a
// channel-backed fake.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use proxyscope_api::{ConnectionsClient, EventStreamHandle, ReconnectConfig};

pub trait SnapshotSource: Send + Sync + 'static {
    /// One fallback fetch, returning the raw payload text.
    fn fetch(&self) -> impl Future<Output = Result<String, proxyscope_api::Error>> + Send;

    /// Open the push stream. The returned handle reconnects on its own
    /// and is torn down when `cancel` fires or the handle is dropped.
    fn subscribe(&self, interval: Duration, cancel: CancellationToken) -> EventStreamHandle;

    /// Best-effort close of specific flows.
    fn close(&self, ids: &[u64]) -> impl Future<Output = Result<(), proxyscope_api::Error>> + Send;
}

impl SnapshotSource for ConnectionsClient {
    fn fetch(&self) -> impl Future<Output = Result<String, proxyscope_api::Error>> + Send {
        self.fetch_connections()
    }

    fn subscribe(&self, interval: Duration, cancel: CancellationToken) -> EventStreamHandle {
        EventStreamHandle::connect(self, interval, ReconnectConfig::default(), cancel)
    }

    fn close(&self, ids: &[u64]) -> impl Future<Output = Result<(), proxyscope_api::Error>> + Send {
        self.close_connections(ids)
    }
}
