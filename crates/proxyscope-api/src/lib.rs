// proxyscope-api: Async Rust client for the proxy control-plane connections API (HTTP + SSE)

pub mod client;
pub mod error;
pub mod sse;
pub mod transport;

pub use client::ConnectionsClient;
pub use error::Error;
pub use sse::{EventStreamHandle, ReconnectConfig, StreamEvent};
pub use transport::{AccessKey, Anonymous, RequestDecorator, TlsMode, TransportConfig, decorator_for};
