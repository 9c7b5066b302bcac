//! Core domain types for the job dashboard.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and the lifecycle state machine
//! - ProgressUpdate events and the hub record codec
//! - ConnectionState and the shared backoff policy
//! - Filtering, sorting and status counts for the job table
//! - The `JobService` seam implemented by the real and simulated sources

mod connection;
mod events;
mod hub;
mod job;
mod request;
mod retry;
mod service;
mod view;

pub use connection::{ConnectionPhase, ConnectionState};
pub use events::{
    HANDSHAKE_FRAME, HubMessage, PING_FRAME, ProgressUpdate, RECORD_SEPARATOR,
    UPDATE_PROGRESS_TARGET, decode_frame, decode_message,
};
pub use hub::{EventHandler, EventHub, Subscription};
pub use job::{
    Job, JobId, JobStatus, Priority, StatusDisplay, StatusTone, TransitionError, UnknownValue,
    now_millis,
};
pub use request::{ApiResponse, CreateJobRequest, MIN_NAME_LENGTH, ValidationError};
pub use retry::RetryConfig;
pub use service::{JobService, ServiceError, ServiceFuture};
pub use view::{JobFilter, JobSort, SortDirection, SortField, StatusCounts, visible_jobs};
