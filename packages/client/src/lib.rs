//! Client side of the real job backend.
//!
//! This crate provides the two channels the dashboard keeps to a backend:
//!
//! - `RequestClient` - request/response calls with bounded exponential backoff
//! - `ConnectionManager` - one push channel with automatic reconnection
//! - `RemoteJobService` - both of the above behind the `JobService` seam
//!
//! Transports are traits so tests can script the network.

mod config;
mod connection;
mod remote;
mod request;
mod websocket;

pub use config::{ConfigError, DEFAULT_API_BASE_URL, DEFAULT_PUSH_URL, DataSource, ServiceConfig};
pub use connection::{
    ConnectionError, ConnectionManager, ConnectionMessage, ConnectionTracker, EventStream,
    OpenFuture, PushTransport, ReconnectPlan,
};
pub use remote::RemoteJobService;
pub use request::{
    FailureCause, HttpTransport, Method, RawResponse, ReqwestTransport, RequestClient,
    RequestError, TransportFuture,
};
pub use websocket::WebSocketTransport;
