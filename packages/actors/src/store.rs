//! The job store: the single owner of the dashboard's job collection.
//!
//! `JobStore` wires a [`JobService`] into the [`StoreActor`]: progress events
//! and connection changes are forwarded as messages, commands go to the
//! service first and are mirrored into the collection only once confirmed.
//! Every change is published as a [`StoreSnapshot`] on a `watch` channel.

use std::sync::{Arc, Mutex, PoisonError};

use jobs_core::{
    ApiResponse, ConnectionState, CreateJobRequest, Job, JobFilter, JobId, JobService, JobSort,
    JobStatus, ProgressUpdate, ServiceError, StatusCounts, Subscription, ValidationError,
};
use ractor::{Actor, ActorRef, RpcReplyPort};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::messages::StoreMessage;
use crate::notifications::{Command, Notification, NotificationId, NotificationKind};
use crate::store_actor::{StoreActor, StoreArgs};

/// Everything the rendering side needs, as of the last change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub jobs: Vec<Job>,
    /// Filtered and sorted view of `jobs`.
    pub visible: Vec<Job>,
    /// Totals over the unfiltered collection.
    pub counts: StatusCounts,
    pub filter: JobFilter,
    pub sort: JobSort,
    pub has_active_filters: bool,
    pub connection: ConnectionState,
    pub notifications: Vec<Notification>,
    pub loading: bool,
}

impl StoreSnapshot {
    pub fn job(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == job_id)
    }
}

/// Errors returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Notification not found: {0}")]
    UnknownNotification(NotificationId),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),
}

fn accepted(response: ApiResponse) -> Result<ApiResponse, ServiceError> {
    if response.is_success {
        Ok(response)
    } else {
        Err(ServiceError::Rejected(response.message))
    }
}

/// Handle to a running job store.
pub struct JobStore {
    actor: ActorRef<StoreMessage>,
    service: Arc<dyn JobService>,
    snapshot_rx: watch::Receiver<StoreSnapshot>,
    subscription: Mutex<Option<Subscription>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl JobStore {
    /// Start the store over `service`, connect it and load the collection.
    ///
    /// A failed connect or initial load is not fatal: it surfaces as a
    /// notification and can be retried from there.
    pub async fn start(service: Arc<dyn JobService>) -> Result<Self, StoreError> {
        let store = Self::spawn(service).await?;

        if let Err(e) = store.service.connect().await {
            tracing::warn!("Failed to connect data source: {}", e);
        }
        if let Err(e) = store.refresh().await {
            tracing::warn!("Initial job load failed: {}", e);
        }

        Ok(store)
    }

    async fn spawn(service: Arc<dyn JobService>) -> Result<Self, StoreError> {
        let (snapshot_tx, snapshot_rx) = watch::channel(StoreSnapshot::default());
        let (actor, join) = Actor::spawn(None, StoreActor, StoreArgs { snapshot_tx })
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to spawn store: {}", e)))?;

        let events = actor.clone();
        let subscription = service.subscribe(Arc::new(move |update: &ProgressUpdate| {
            let _ = events.send_message(StoreMessage::Event(update.clone()));
        }));

        let mut connection = service.connection_state();
        let forward = actor.clone();
        let watcher = tokio::spawn(async move {
            let initial = connection.borrow_and_update().clone();
            if forward
                .send_message(StoreMessage::ConnectionChanged(initial))
                .is_err()
            {
                return;
            }
            while connection.changed().await.is_ok() {
                let state = connection.borrow_and_update().clone();
                if forward
                    .send_message(StoreMessage::ConnectionChanged(state))
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(Self {
            actor,
            service,
            snapshot_rx,
            subscription: Mutex::new(Some(subscription)),
            watcher: Mutex::new(Some(watcher)),
            join: Mutex::new(Some(join)),
        })
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that wakes on every published snapshot.
    pub fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Reload the full collection from the data source.
    ///
    /// Events that arrive while the load is in flight are replayed over the
    /// loaded collection, so they are never lost to an older snapshot.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        self.tell(StoreMessage::LoadStarted)?;
        match self.service.get_jobs().await {
            Ok(jobs) => self.ask(|reply| StoreMessage::Replace { jobs, reply }).await,
            Err(e) => {
                self.tell(StoreMessage::LoadFailed)?;
                Err(self.fail(e, Command::Refresh).await)
            }
        }
    }

    /// Validate and create a job. It joins the collection once confirmed.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<Job, StoreError> {
        let request = request.validated()?;
        match self.service.create_job(request.clone()).await {
            Ok(job) => {
                tracing::info!("Created job {} ({})", job.name, job.id);
                let created = job.clone();
                self.ask(|reply| StoreMessage::Insert { job, reply }).await?;
                Ok(created)
            }
            Err(e) => Err(self.fail(e, Command::Create { request }).await),
        }
    }

    pub async fn stop_job(&self, job_id: JobId) -> Result<ApiResponse, StoreError> {
        let outcome = self.service.stop_job(job_id.clone()).await.and_then(accepted);
        match outcome {
            Ok(response) => {
                self.ask(|reply| StoreMessage::Stopped {
                    job_id: job_id.clone(),
                    reply,
                })
                .await?;
                Ok(response)
            }
            Err(e) => Err(self.fail(e, Command::Stop { job_id }).await),
        }
    }

    pub async fn restart_job(&self, job_id: JobId) -> Result<ApiResponse, StoreError> {
        let outcome = self
            .service
            .restart_job(job_id.clone())
            .await
            .and_then(accepted);
        match outcome {
            Ok(response) => {
                self.ask(|reply| StoreMessage::Restarted {
                    job_id: job_id.clone(),
                    reply,
                })
                .await?;
                Ok(response)
            }
            Err(e) => Err(self.fail(e, Command::Restart { job_id }).await),
        }
    }

    pub async fn delete_job(&self, job_id: JobId) -> Result<(), StoreError> {
        match self.service.delete_job(job_id.clone()).await {
            Ok(()) => {
                self.ask(|reply| StoreMessage::Removed {
                    job_id: job_id.clone(),
                    reply,
                })
                .await
            }
            Err(e) => Err(self.fail(e, Command::Delete { job_id }).await),
        }
    }

    pub async fn delete_jobs_by_status(&self, status: JobStatus) -> Result<(), StoreError> {
        match self.service.delete_jobs_by_status(status).await {
            Ok(()) => {
                self.ask(|reply| StoreMessage::RemovedStatus { status, reply })
                    .await
            }
            Err(e) => Err(self.fail(e, Command::DeleteByStatus { status }).await),
        }
    }

    pub fn set_filter(&self, filter: JobFilter) -> Result<(), StoreError> {
        self.tell(StoreMessage::SetFilter { filter })
    }

    pub fn set_status_filter(&self, status: Option<JobStatus>) -> Result<(), StoreError> {
        self.tell(StoreMessage::SetStatusFilter(status))
    }

    pub fn set_search_term(&self, term: impl Into<String>) -> Result<(), StoreError> {
        self.tell(StoreMessage::SetSearchTerm(term.into()))
    }

    pub fn clear_filters(&self) -> Result<(), StoreError> {
        self.set_filter(JobFilter::default())
    }

    pub fn set_sort(&self, sort: JobSort) -> Result<(), StoreError> {
        self.tell(StoreMessage::SetSort { sort })
    }

    pub fn dismiss_notification(&self, id: NotificationId) -> Result<(), StoreError> {
        self.tell(StoreMessage::Dismiss { id })
    }

    pub fn clear_notifications(&self) -> Result<(), StoreError> {
        self.tell(StoreMessage::ClearNotifications)
    }

    /// Remove a notification and run the command it carries.
    pub async fn retry_notification(&self, id: NotificationId) -> Result<(), StoreError> {
        let notification = self
            .ask(|reply| StoreMessage::TakeNotification { id, reply })
            .await?
            .ok_or(StoreError::UnknownNotification(id))?;

        let Some(command) = notification.retry else {
            return Ok(());
        };
        tracing::info!("Retrying: {}", command.describe());
        self.run(command).await
    }

    /// Ask the data source to reconnect its push channel.
    pub async fn retry_connection(&self) -> Result<(), StoreError> {
        self.service.connect().await?;
        Ok(())
    }

    async fn run(&self, command: Command) -> Result<(), StoreError> {
        match command {
            Command::Refresh => self.refresh().await,
            Command::Create { request } => self.create_job(request).await.map(|_| ()),
            Command::Stop { job_id } => self.stop_job(job_id).await.map(|_| ()),
            Command::Restart { job_id } => self.restart_job(job_id).await.map(|_| ()),
            Command::Delete { job_id } => self.delete_job(job_id).await,
            Command::DeleteByStatus { status } => self.delete_jobs_by_status(status).await,
            Command::Reconnect => self.retry_connection().await,
        }
    }

    /// Stop the store and the data source behind it. Idempotent.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let join = self
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(join) = join else {
            return Ok(());
        };

        if let Some(subscription) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            subscription.unsubscribe();
        }
        if let Some(watcher) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.abort();
        }

        let result = self.service.shutdown().await;
        self.actor.stop(None);
        let _ = join.await;
        tracing::info!("Job store shut down");
        result.map_err(StoreError::from)
    }

    /// Raise a retryable notification for a failed command.
    async fn fail(&self, error: ServiceError, command: Command) -> StoreError {
        let kind = NotificationKind::of(&error);
        let message = format!("Failed to {}: {}", command.describe(), error);
        let notified = self
            .ask(|reply| StoreMessage::Notify {
                kind,
                message,
                retry: Some(command),
                reply,
            })
            .await;
        if let Err(e) = notified {
            tracing::warn!("Failed to raise notification: {}", e);
        }
        StoreError::Service(error)
    }

    fn tell(&self, message: StoreMessage) -> Result<(), StoreError> {
        self.actor
            .send_message(message)
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn ask<T: Send + 'static>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> StoreMessage,
    ) -> Result<T, StoreError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.tell(build(tx.into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("store stopped".into()))
    }
}
