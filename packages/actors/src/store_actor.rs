//! Store actor: owns the job collection, view settings and notifications.

use std::collections::HashMap;

use jobs_core::{ConnectionPhase, ConnectionState, JobFilter, JobSort, ProgressUpdate};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::collection::JobCollection;
use crate::messages::StoreMessage;
use crate::notifications::{NotificationCenter, NotificationId, NotificationKind};
use crate::store::StoreSnapshot;

/// Arguments for the store actor.
pub struct StoreArgs {
    pub snapshot_tx: watch::Sender<StoreSnapshot>,
}

/// State for the store actor.
pub struct StoreState {
    jobs: JobCollection,
    filter: JobFilter,
    sort: JobSort,
    connection: ConnectionState,
    notifications: NotificationCenter,
    loading: bool,
    loads_in_flight: usize,
    /// Events seen while a load is in flight, replayed over its result.
    load_buffer: Vec<ProgressUpdate>,
    snapshot_tx: watch::Sender<StoreSnapshot>,
    dismiss_timers: HashMap<NotificationId, JoinHandle<()>>,
}

impl StoreState {
    fn new(snapshot_tx: watch::Sender<StoreSnapshot>) -> Self {
        Self {
            jobs: JobCollection::default(),
            filter: JobFilter::default(),
            sort: JobSort::default(),
            connection: ConnectionState::default(),
            notifications: NotificationCenter::new(),
            loading: false,
            loads_in_flight: 0,
            load_buffer: Vec::new(),
            snapshot_tx,
            dismiss_timers: HashMap::new(),
        }
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            jobs: self.jobs.jobs().to_vec(),
            visible: self.jobs.visible(&self.filter, &self.sort),
            counts: self.jobs.counts(),
            filter: self.filter.clone(),
            sort: self.sort,
            has_active_filters: self.filter.is_active(),
            connection: self.connection.clone(),
            notifications: self.notifications.items().to_vec(),
            loading: self.loading,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn load_started(&mut self) {
        self.loads_in_flight += 1;
        self.loading = true;
    }

    fn load_finished(&mut self) {
        self.loads_in_flight = self.loads_in_flight.saturating_sub(1);
        if self.loads_in_flight == 0 {
            self.load_buffer.clear();
            self.loading = false;
        }
    }

    fn start_dismiss_timer(
        &mut self,
        myself: ActorRef<StoreMessage>,
        id: NotificationId,
        kind: NotificationKind,
    ) {
        let Some(after) = kind.auto_dismiss_after() else {
            return;
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = myself.send_message(StoreMessage::Dismiss { id });
        });
        self.dismiss_timers.insert(id, handle);
    }

    fn forget(&mut self, id: NotificationId) {
        if let Some(timer) = self.dismiss_timers.remove(&id) {
            timer.abort();
        }
    }

    fn connection_changed(&mut self, next: ConnectionState) {
        let previous = std::mem::replace(&mut self.connection, next);
        let current = &self.connection;

        match current.phase() {
            ConnectionPhase::Connected => {
                for id in self.notifications.clear_kind(NotificationKind::Connection) {
                    self.forget(id);
                }
                if previous.phase() != ConnectionPhase::Connected {
                    tracing::info!("Push channel connected");
                }
            }
            ConnectionPhase::Reconnecting => {
                if previous.phase() != ConnectionPhase::Reconnecting {
                    let reason = current.last_error.as_deref().unwrap_or("unknown error");
                    tracing::warn!("Push channel lost: {}", reason);
                    let message = format!("Connection lost, reconnecting: {}", reason);
                    self.notifications.set_connection(message);
                }
            }
            ConnectionPhase::Idle => {
                if current.is_terminally_disconnected() && previous != *current {
                    let message = current
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "Disconnected".to_string());
                    tracing::warn!("Push channel down: {}", message);
                    self.notifications.set_connection(message);
                }
            }
        }
    }
}

/// Actor that reconciles loads, confirmations and events into one view.
pub struct StoreActor;

impl Actor for StoreActor {
    type Msg = StoreMessage;
    type State = StoreState;
    type Arguments = StoreArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job store");
        Ok(StoreState::new(args.snapshot_tx))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            StoreMessage::Replace { jobs, reply } => {
                tracing::debug!(
                    "Loaded {} jobs, replaying {} events",
                    jobs.len(),
                    state.load_buffer.len()
                );
                state.jobs.replace(jobs);
                for update in &state.load_buffer {
                    state.jobs.apply(update);
                }
                state.load_finished();
                state.publish();
                let _ = reply.send(());
            }

            StoreMessage::Insert { job, reply } => {
                state.jobs.insert(job);
                state.publish();
                let _ = reply.send(());
            }

            StoreMessage::Stopped { job_id, reply } => {
                if state.jobs.mark_stopped(&job_id) {
                    state.publish();
                }
                let _ = reply.send(());
            }

            StoreMessage::Restarted { job_id, reply } => {
                if state.jobs.mark_restarted(&job_id) {
                    state.publish();
                }
                let _ = reply.send(());
            }

            StoreMessage::Removed { job_id, reply } => {
                if state.jobs.remove(&job_id) {
                    state.publish();
                }
                let _ = reply.send(());
            }

            StoreMessage::RemovedStatus { status, reply } => {
                if state.jobs.remove_status(status) > 0 {
                    state.publish();
                }
                let _ = reply.send(());
            }

            StoreMessage::Event(update) => {
                let changed = state.jobs.apply(&update);
                if state.loads_in_flight > 0 {
                    state.load_buffer.push(update);
                }
                if changed {
                    state.publish();
                }
            }

            StoreMessage::ConnectionChanged(connection) => {
                state.connection_changed(connection);
                state.publish();
            }

            StoreMessage::LoadStarted => {
                state.load_started();
                state.publish();
            }

            StoreMessage::LoadFailed => {
                state.load_finished();
                state.publish();
            }

            StoreMessage::SetFilter { filter } => {
                state.filter = filter;
                state.publish();
            }

            StoreMessage::SetStatusFilter(status) => {
                state.filter.status = status;
                state.publish();
            }

            StoreMessage::SetSearchTerm(term) => {
                state.filter.search_term = Some(term).filter(|term| !term.is_empty());
                state.publish();
            }

            StoreMessage::SetSort { sort } => {
                state.sort = sort;
                state.publish();
            }

            StoreMessage::Notify {
                kind,
                message,
                retry,
                reply,
            } => {
                tracing::warn!("{}", message);
                let id = match kind {
                    NotificationKind::Connection => state.notifications.set_connection(message),
                    _ => state.notifications.push(kind, message, retry),
                };
                state.start_dismiss_timer(myself, id, kind);
                state.publish();
                let _ = reply.send(id);
            }

            StoreMessage::Dismiss { id } => {
                state.forget(id);
                if state.notifications.dismiss(id) {
                    state.publish();
                }
            }

            StoreMessage::TakeNotification { id, reply } => {
                state.forget(id);
                let taken = state.notifications.take(id);
                if taken.is_some() {
                    state.publish();
                }
                let _ = reply.send(taken);
            }

            StoreMessage::ClearNotifications => {
                for (_, timer) in state.dismiss_timers.drain() {
                    timer.abort();
                }
                state.notifications.clear();
                state.publish();
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for (_, timer) in state.dismiss_timers.drain() {
            timer.abort();
        }
        tracing::info!("Job store stopped");
        Ok(())
    }
}
