//! User-facing error notifications with optional retry actions.

use std::time::Duration;

use jobs_core::{CreateJobRequest, JobId, JobStatus, ServiceError, now_millis};
use serde::Serialize;

/// Non-connection notifications disappear after this long.
pub const AUTO_DISMISS_AFTER: Duration = Duration::from_secs(10);

pub type NotificationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// The backend answered but refused or failed the command.
    Api,
    /// The push channel is down.
    Connection,
    /// The backend could not be reached.
    Network,
}

impl NotificationKind {
    /// Classify a data-source failure.
    pub fn of(error: &ServiceError) -> Self {
        match error {
            ServiceError::Request { .. } => NotificationKind::Network,
            _ => NotificationKind::Api,
        }
    }

    pub fn auto_dismiss_after(self) -> Option<Duration> {
        match self {
            NotificationKind::Connection => None,
            NotificationKind::Api | NotificationKind::Network => Some(AUTO_DISMISS_AFTER),
        }
    }
}

/// A store operation that can be replayed from a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Refresh,
    Create { request: CreateJobRequest },
    Stop { job_id: JobId },
    Restart { job_id: JobId },
    Delete { job_id: JobId },
    DeleteByStatus { status: JobStatus },
    Reconnect,
}

impl Command {
    pub fn describe(&self) -> String {
        match self {
            Command::Refresh => "load jobs".to_string(),
            Command::Create { request } => format!("create job \"{}\"", request.name),
            Command::Stop { job_id } => format!("stop job {}", job_id),
            Command::Restart { job_id } => format!("restart job {}", job_id),
            Command::Delete { job_id } => format!("delete job {}", job_id),
            Command::DeleteByStatus { status } => format!("delete {} jobs", status),
            Command::Reconnect => "reconnect".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: i64,
    pub retry: Option<Command>,
}

impl Notification {
    pub fn is_retryable(&self) -> bool {
        self.retry.is_some()
    }
}

/// Ordered list of live notifications, oldest first.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    next_id: NotificationId,
    items: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notification and return its id.
    pub fn push(
        &mut self,
        kind: NotificationKind,
        message: impl Into<String>,
        retry: Option<Command>,
    ) -> NotificationId {
        self.next_id += 1;
        let id = self.next_id;
        self.items.push(Notification {
            id,
            kind,
            message: message.into(),
            timestamp: now_millis(),
            retry,
        });
        id
    }

    /// Show at most one connection notification, replacing any previous one.
    pub fn set_connection(&mut self, message: impl Into<String>) -> NotificationId {
        self.clear_kind(NotificationKind::Connection);
        self.push(
            NotificationKind::Connection,
            message,
            Some(Command::Reconnect),
        )
    }

    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        self.take(id).is_some()
    }

    /// Remove a notification and hand it back.
    pub fn take(&mut self, id: NotificationId) -> Option<Notification> {
        let index = self.items.iter().position(|n| n.id == id)?;
        Some(self.items.remove(index))
    }

    /// Remove every notification of `kind`; returns the removed ids.
    pub fn clear_kind(&mut self, kind: NotificationKind) -> Vec<NotificationId> {
        let removed = self
            .items
            .iter()
            .filter(|n| n.kind == kind)
            .map(|n| n.id)
            .collect();
        self.items.retain(|n| n.kind != kind);
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
