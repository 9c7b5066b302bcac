//! The seam between the job store and whichever data source backs it.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::watch;

use crate::{
    ApiResponse, ConnectionState, CreateJobRequest, EventHandler, Job, JobId, JobStatus,
    Subscription, TransitionError,
};

/// Errors reported by a data source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Request failed after {attempts} attempts: {cause}")]
    Request { attempts: u32, cause: String },

    #[error("{0}")]
    Rejected(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

/// Future type for async data-source calls.
pub type ServiceFuture<T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send>>;

/// A source of job records, commands and progress events.
///
/// Implemented by the real backend client and by the in-process simulator so
/// the store never knows which one it talks to.
pub trait JobService: Send + Sync + 'static {
    /// Fetch the full job collection.
    fn get_jobs(&self) -> ServiceFuture<Vec<Job>>;

    /// Create a job and return the record the source assigned.
    fn create_job(&self, request: CreateJobRequest) -> ServiceFuture<Job>;

    fn stop_job(&self, job_id: JobId) -> ServiceFuture<ApiResponse>;

    fn restart_job(&self, job_id: JobId) -> ServiceFuture<ApiResponse>;

    fn delete_job(&self, job_id: JobId) -> ServiceFuture<()>;

    fn delete_jobs_by_status(&self, status: JobStatus) -> ServiceFuture<()>;

    /// Register for progress events.
    fn subscribe(&self, handler: EventHandler) -> Subscription;

    /// Watch the push-channel state.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;

    /// (Re)establish the event channel. Also the manual recovery path.
    fn connect(&self) -> ServiceFuture<()>;

    /// Tear down timers, channels and subscribers. Idempotent.
    fn shutdown(&self) -> ServiceFuture<()>;
}
