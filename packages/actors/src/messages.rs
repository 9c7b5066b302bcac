//! Message types for actor communication.

use jobs_core::{
    ApiResponse, ConnectionState, CreateJobRequest, Job, JobFilter, JobId, JobSort, JobStatus,
    ProgressUpdate,
};
use ractor::RpcReplyPort;

use crate::notifications::{Command, Notification, NotificationId, NotificationKind};
use crate::simulation::Stage;

/// Messages for the SimulatorActor.
#[derive(Debug)]
pub enum SimulatorMessage {
    /// Get a copy of every job.
    GetJobs { reply: RpcReplyPort<Vec<Job>> },

    /// Create a pending job and schedule its progression.
    Create {
        request: CreateJobRequest,
        reply: RpcReplyPort<Job>,
    },

    /// Stop a running or queued job.
    Stop {
        job_id: JobId,
        reply: RpcReplyPort<ApiResponse>,
    },

    /// Restart a failed or stopped job.
    Restart {
        job_id: JobId,
        reply: RpcReplyPort<ApiResponse>,
    },

    /// Delete one job. Replies whether it existed.
    Delete {
        job_id: JobId,
        reply: RpcReplyPort<bool>,
    },

    /// Delete every job with a status. Replies how many were removed.
    DeleteByStatus {
        status: JobStatus,
        reply: RpcReplyPort<usize>,
    },

    /// Periodic progress tick.
    ProgressTick,

    /// Periodic queue-promotion tick.
    QueueTick,

    /// A scheduled progression stage is due.
    Advance {
        job_id: JobId,
        stage: Stage,
        token: u64,
    },
}

/// Messages for the StoreActor.
#[derive(Debug)]
pub enum StoreMessage {
    /// Replace the collection with a fresh load.
    Replace {
        jobs: Vec<Job>,
        reply: RpcReplyPort<()>,
    },

    /// Insert a job the data source confirmed.
    Insert { job: Job, reply: RpcReplyPort<()> },

    /// Mirror a confirmed stop.
    Stopped {
        job_id: JobId,
        reply: RpcReplyPort<()>,
    },

    /// Mirror a confirmed restart.
    Restarted {
        job_id: JobId,
        reply: RpcReplyPort<()>,
    },

    /// Mirror a confirmed delete.
    Removed {
        job_id: JobId,
        reply: RpcReplyPort<()>,
    },

    /// Mirror a confirmed delete-by-status.
    RemovedStatus {
        status: JobStatus,
        reply: RpcReplyPort<()>,
    },

    /// A progress event from the data source.
    Event(ProgressUpdate),

    /// The data source's connection state changed.
    ConnectionChanged(ConnectionState),

    /// A full load was requested from the data source.
    LoadStarted,

    /// A load failed; the collection is left as it was.
    LoadFailed,

    SetFilter { filter: JobFilter },

    SetStatusFilter(Option<JobStatus>),

    SetSearchTerm(String),

    SetSort { sort: JobSort },

    /// Raise a notification.
    Notify {
        kind: NotificationKind,
        message: String,
        retry: Option<Command>,
        reply: RpcReplyPort<NotificationId>,
    },

    /// Remove a notification, e.g. when its timer fires.
    Dismiss { id: NotificationId },

    /// Remove a notification and return it.
    TakeNotification {
        id: NotificationId,
        reply: RpcReplyPort<Option<Notification>>,
    },

    ClearNotifications,
}
