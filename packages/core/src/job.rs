//! Job domain types and the lifecycle state machine.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

/// Current wall-clock time as epoch milliseconds, the unit of every job timestamp.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Opaque identifier for a job, stable for the job's lifetime.
///
/// The backend owns the format; locally generated IDs are ULIDs so they
/// sort chronologically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wire value that does not map to any variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

/// Execution priority. Serialized as its integer code.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    #[default]
    Regular = 0,
    High = 1,
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = UnknownValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::Regular),
            1 => Ok(Priority::High),
            other => Err(UnknownValue {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Regular => write!(f, "regular"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Lifecycle status of a job. Serialized as its integer code (0..=5).
///
/// ```text
/// Pending -> InQueue -> Running -> Completed | Failed
/// InQueue | Running -> Stopped
/// Failed | Stopped -> Pending   (explicit restart only)
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum JobStatus {
    #[default]
    Pending = 0,
    InQueue = 1,
    Running = 2,
    Completed = 3,
    Failed = 4,
    Stopped = 5,
}

/// Attempted lifecycle move that is not in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition from {from} to {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Visual weight of a status, for whatever renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusTone {
    Neutral,
    Info,
    Active,
    Success,
    Danger,
    Muted,
}

/// Presentation hints for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDisplay {
    /// Stable key used for styling and translation lookups.
    pub key: &'static str,
    /// Default English label.
    pub label: &'static str,
    pub tone: StatusTone,
}

impl JobStatus {
    /// Every status, in wire order.
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::InQueue,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Stopped,
    ];

    /// Check if a stop command is legal from this status.
    pub fn can_stop(self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::InQueue)
    }

    /// Check if a restart command is legal from this status.
    pub fn can_restart(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Stopped)
    }

    /// Check whether `next` is a legal successor of this status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, InQueue)
                | (InQueue, Running)
                | (InQueue, Stopped)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Stopped)
                | (Failed, Pending)
                | (Stopped, Pending)
        )
    }

    /// Move to `next`, rejecting anything outside the transition table.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    /// Get a simple status string for display.
    pub fn as_str(self) -> &'static str {
        self.display().key
    }

    /// Presentation hints. Adding a status fails to compile until this is updated.
    pub fn display(self) -> StatusDisplay {
        let (key, label, tone) = match self {
            JobStatus::Pending => ("pending", "Pending", StatusTone::Neutral),
            JobStatus::InQueue => ("inQueue", "In Queue", StatusTone::Info),
            JobStatus::Running => ("running", "Running", StatusTone::Active),
            JobStatus::Completed => ("completed", "Completed", StatusTone::Success),
            JobStatus::Failed => ("failed", "Failed", StatusTone::Danger),
            JobStatus::Stopped => ("stopped", "Stopped", StatusTone::Muted),
        };
        StatusDisplay { key, label, tone }
    }
}

impl From<JobStatus> for u8 {
    fn from(status: JobStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for JobStatus {
    type Error = UnknownValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        JobStatus::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(UnknownValue {
                kind: "status",
                value: value.to_string(),
            })
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accept integer or fractional progress from the wire, clamped to 0..=100.
pub(crate) fn deserialize_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.clamp(0.0, 100.0).floor() as u8)
}

/// A trackable unit of backend work.
///
/// Timestamps are epoch milliseconds with `0` meaning unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(rename = "jobID")]
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(deserialize_with = "deserialize_progress")]
    pub progress: u8,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub started_at: i64,
    #[serde(default)]
    pub completed_at: i64,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Job {
    /// Create a new pending job stamped with the current time.
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            status: JobStatus::Pending,
            priority,
            progress: 0,
            created_at: now_millis(),
            started_at: 0,
            completed_at: 0,
            error_message: None,
        }
    }

    /// Set the ID for this job.
    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the status and progress for this job without touching timestamps.
    pub fn with_progress(mut self, status: JobStatus, progress: u8) -> Self {
        self.status = status;
        self.progress = progress.min(100);
        self
    }

    /// Put the job back to a fresh pending state, as a restart does.
    pub fn reset_for_restart(&mut self) {
        self.status = JobStatus::Pending;
        self.progress = 0;
        self.started_at = 0;
        self.completed_at = 0;
        self.error_message = None;
    }

    /// Check the field invariants that hold for a job at rest.
    pub fn is_consistent(&self) -> bool {
        let started_ok = match self.status {
            JobStatus::Pending | JobStatus::InQueue => self.started_at == 0,
            _ => true,
        };
        let completed_ok = matches!(self.status, JobStatus::Completed | JobStatus::Failed)
            || self.completed_at == 0;
        let progress_ok = self.status != JobStatus::Completed || self.progress == 100;
        let error_ok = self.error_message.is_some() == (self.status == JobStatus::Failed);
        started_ok && completed_ok && progress_ok && error_ok && self.progress <= 100
    }
}
