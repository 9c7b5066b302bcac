//! Push-channel connection manager.
//!
//! A `ConnectionActor` owns the single logical channel: it starts attempts,
//! tracks [`ConnectionState`], and schedules reconnects with the shared
//! backoff policy. Each open channel is pumped by its own task which
//! publishes events to the [`EventHub`] in arrival order.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use jobs_core::{ConnectionState, EventHandler, EventHub, ProgressUpdate, RetryConfig, Subscription};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Errors on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to open push channel: {0}")]
    Open(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Push channel protocol error: {0}")]
    Protocol(String),

    #[error("Max reconnection attempts reached ({attempts})")]
    RetriesExhausted { attempts: u32 },

    #[error("Connection manager unavailable: {0}")]
    Unavailable(String),
}

/// Incoming updates of one open channel. An `Err` item ends the channel.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProgressUpdate, ConnectionError>> + Send>>;

/// Future type for opening a channel.
pub type OpenFuture = Pin<Box<dyn Future<Output = Result<EventStream, ConnectionError>> + Send>>;

/// Something that can open a push channel to the configured endpoint.
pub trait PushTransport: Send + Sync + 'static {
    fn open(&self) -> OpenFuture;
}

/// What to do after the channel went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPlan {
    /// Try again after `delay`; this is retry number `attempt`.
    Retry { delay: Duration, attempt: u32 },
    /// Budget spent; only a manual connect recovers.
    GiveUp,
}

/// Connection-state bookkeeping, free of any I/O.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    retry: RetryConfig,
    state: ConnectionState,
}

impl ConnectionTracker {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            retry,
            state: ConnectionState::default(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// A manual connect restarts the retry budget.
    pub fn on_manual_connect(&mut self) {
        self.state.retry_count = 0;
    }

    pub fn on_opened(&mut self) {
        self.state = ConnectionState::connected();
    }

    /// Record a failed attempt or an unexpected closure and decide what comes next.
    pub fn on_down(&mut self, error: &ConnectionError) -> ReconnectPlan {
        let retry_count = self.state.retry_count;
        if !self.retry.allows(retry_count) {
            let exhausted = ConnectionError::RetriesExhausted {
                attempts: retry_count,
            };
            self.state = ConnectionState::idle(retry_count, Some(exhausted.to_string()));
            return ReconnectPlan::GiveUp;
        }

        let delay = self.retry.delay_for(retry_count);
        self.state = ConnectionState::reconnecting(retry_count + 1, error.to_string());
        ReconnectPlan::Retry {
            delay,
            attempt: retry_count + 1,
        }
    }

    /// A deliberate disconnect is not an error state.
    pub fn on_disconnect(&mut self) {
        self.state = ConnectionState::idle(self.state.retry_count, None);
    }
}

/// Messages for the ConnectionActor.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Open the channel unless it is already up.
    Connect {
        reply: RpcReplyPort<Result<(), ConnectionError>>,
    },

    /// Tear the channel down and cancel any pending reconnect.
    Disconnect { reply: RpcReplyPort<()> },

    /// Attempt `generation` opened its channel.
    Opened { generation: u64 },

    /// Attempt `generation` failed to open, or its channel closed.
    Down {
        generation: u64,
        error: ConnectionError,
    },

    /// Reconnect timer for `generation` fired.
    Reconnect { generation: u64 },

    /// Get the current state.
    GetState { reply: RpcReplyPort<ConnectionState> },
}

/// Arguments for the connection actor.
pub struct ConnectionArgs {
    pub transport: Arc<dyn PushTransport>,
    pub retry: RetryConfig,
    pub hub: Arc<EventHub>,
    pub state_tx: watch::Sender<ConnectionState>,
}

/// State for the connection actor.
pub struct ConnectionActorState {
    transport: Arc<dyn PushTransport>,
    hub: Arc<EventHub>,
    tracker: ConnectionTracker,
    state_tx: watch::Sender<ConnectionState>,
    /// Bumped for every attempt and every teardown; stale messages are dropped.
    generation: u64,
    channel_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    pending_connect: Option<RpcReplyPort<Result<(), ConnectionError>>>,
}

impl ConnectionActorState {
    fn publish_state(&self) {
        self.state_tx.send_replace(self.tracker.state().clone());
    }

    fn cancel_tasks(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(task) = self.channel_task.take() {
            task.abort();
        }
    }

    fn start_attempt(&mut self, myself: ActorRef<ConnectionMessage>) {
        self.cancel_tasks();
        self.generation += 1;
        let generation = self.generation;
        let transport = self.transport.clone();
        let hub = self.hub.clone();

        self.channel_task = Some(tokio::spawn(async move {
            let mut stream = match transport.open().await {
                Ok(stream) => stream,
                Err(error) => {
                    let _ = myself.send_message(ConnectionMessage::Down { generation, error });
                    return;
                }
            };
            let _ = myself.send_message(ConnectionMessage::Opened { generation });

            let error = loop {
                match stream.next().await {
                    Some(Ok(update)) => {
                        hub.publish(&update);
                    }
                    Some(Err(error)) => break error,
                    None => break ConnectionError::Closed("stream ended".into()),
                }
            };
            let _ = myself.send_message(ConnectionMessage::Down { generation, error });
        }));
    }

    fn schedule_reconnect(&mut self, myself: ActorRef<ConnectionMessage>, delay: Duration) {
        let generation = self.generation;
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = myself.send_message(ConnectionMessage::Reconnect { generation });
        }));
    }
}

/// Actor that owns the push channel.
pub struct ConnectionActor;

impl Actor for ConnectionActor {
    type Msg = ConnectionMessage;
    type State = ConnectionActorState;
    type Arguments = ConnectionArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting connection manager");
        Ok(ConnectionActorState {
            transport: args.transport,
            hub: args.hub,
            tracker: ConnectionTracker::new(args.retry),
            state_tx: args.state_tx,
            generation: 0,
            channel_task: None,
            reconnect_timer: None,
            pending_connect: None,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ConnectionMessage::Connect { reply } => {
                if state.tracker.state().is_connected {
                    let _ = reply.send(Ok(()));
                    return Ok(());
                }
                if let Some(previous) = state.pending_connect.take() {
                    let _ = previous.send(Err(ConnectionError::Closed(
                        "superseded by a new connect".into(),
                    )));
                }

                state.tracker.on_manual_connect();
                state.pending_connect = Some(reply);
                state.start_attempt(myself);
            }

            ConnectionMessage::Disconnect { reply } => {
                state.cancel_tasks();
                state.generation += 1;
                state.tracker.on_disconnect();
                state.publish_state();
                if let Some(pending) = state.pending_connect.take() {
                    let _ = pending.send(Err(ConnectionError::Closed("disconnected".into())));
                }
                tracing::info!("Push channel disconnected");
                let _ = reply.send(());
            }

            ConnectionMessage::Opened { generation } => {
                if generation != state.generation {
                    return Ok(());
                }
                state.tracker.on_opened();
                state.publish_state();
                tracing::info!("Push channel connected");
                if let Some(pending) = state.pending_connect.take() {
                    let _ = pending.send(Ok(()));
                }
            }

            ConnectionMessage::Down { generation, error } => {
                if generation != state.generation {
                    return Ok(());
                }
                state.channel_task = None;

                match state.tracker.on_down(&error) {
                    ReconnectPlan::Retry { delay, attempt } => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Push channel down, reconnect scheduled: {}",
                            error
                        );
                        state.schedule_reconnect(myself, delay);
                    }
                    ReconnectPlan::GiveUp => {
                        tracing::error!("Push channel down, giving up: {}", error);
                    }
                }
                state.publish_state();

                if let Some(pending) = state.pending_connect.take() {
                    let _ = pending.send(Err(error));
                }
            }

            ConnectionMessage::Reconnect { generation } => {
                if generation != state.generation {
                    return Ok(());
                }
                state.reconnect_timer = None;
                tracing::info!(
                    retry = state.tracker.state().retry_count,
                    "Reconnecting push channel"
                );
                state.start_attempt(myself);
            }

            ConnectionMessage::GetState { reply } => {
                let _ = reply.send(state.tracker.state().clone());
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.cancel_tasks();
        tracing::info!("Connection manager stopped");
        Ok(())
    }
}

/// Handle to the push channel: connect, disconnect, subscribe, observe.
#[derive(Clone)]
pub struct ConnectionManager {
    actor: ActorRef<ConnectionMessage>,
    hub: Arc<EventHub>,
    state_rx: watch::Receiver<ConnectionState>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionManager {
    /// Spawn the connection actor. Nothing is opened until [`connect`](Self::connect).
    pub async fn start(
        transport: Arc<dyn PushTransport>,
        retry: RetryConfig,
    ) -> Result<Self, ConnectionError> {
        let hub = EventHub::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let args = ConnectionArgs {
            transport,
            retry,
            hub: hub.clone(),
            state_tx,
        };

        let (actor, join) = Actor::spawn(None, ConnectionActor, args)
            .await
            .map_err(|e| ConnectionError::Unavailable(format!("Failed to spawn: {}", e)))?;

        Ok(Self {
            actor,
            hub,
            state_rx,
            join: Arc::new(Mutex::new(Some(join))),
        })
    }

    async fn call<T: Send + 'static>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> ConnectionMessage,
    ) -> Result<T, ConnectionError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(build(tx.into()))
            .map_err(|e| ConnectionError::Unavailable(e.to_string()))?;
        rx.await
            .map_err(|_| ConnectionError::Unavailable("connection actor stopped".into()))
    }

    /// Open the channel. Resolves when the first attempt succeeds or fails;
    /// a failure still schedules automatic reconnects.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.call(|reply| ConnectionMessage::Connect { reply }).await?
    }

    /// Tear down the channel and cancel pending reconnects. Idempotent.
    pub async fn disconnect(&self) {
        if self
            .call(|reply| ConnectionMessage::Disconnect { reply })
            .await
            .is_err()
        {
            tracing::debug!("Disconnect on a stopped connection manager");
        }
    }

    pub fn subscribe(&self, handler: EventHandler) -> Subscription {
        self.hub.subscribe(handler)
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Disconnect, drop every subscriber, and stop the actor.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        self.hub.clear();
        self.actor.stop(None);

        let join = self
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(max_retries: u32) -> ConnectionTracker {
        ConnectionTracker::new(RetryConfig::new(max_retries, Duration::from_millis(1000), 2))
    }

    #[test]
    fn reconnect_delays_follow_backoff_then_give_up() {
        let mut tracker = tracker(6);
        let error = ConnectionError::Closed("reset".into());

        let mut delays = Vec::new();
        while let ReconnectPlan::Retry { delay, attempt } = tracker.on_down(&error) {
            assert_eq!(tracker.state().retry_count, attempt);
            assert!(tracker.state().is_reconnecting);
            assert!(!tracker.state().is_connected);
            delays.push(delay.as_millis());
        }

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000]);
        assert!(tracker.state().is_terminally_disconnected());
        assert_eq!(
            tracker.state().last_error.as_deref(),
            Some("Max reconnection attempts reached (6)")
        );
    }

    #[test]
    fn success_resets_the_counter() {
        let mut tracker = tracker(5);
        let error = ConnectionError::Open("refused".into());
        tracker.on_down(&error);
        tracker.on_down(&error);
        assert_eq!(tracker.state().retry_count, 2);

        tracker.on_opened();
        assert_eq!(tracker.state(), &ConnectionState::connected());
    }

    #[test]
    fn manual_connect_restarts_the_budget() {
        let mut tracker = tracker(1);
        let error = ConnectionError::Open("refused".into());
        assert!(matches!(tracker.on_down(&error), ReconnectPlan::Retry { .. }));
        assert_eq!(tracker.on_down(&error), ReconnectPlan::GiveUp);

        tracker.on_manual_connect();
        assert!(matches!(tracker.on_down(&error), ReconnectPlan::Retry { .. }));
    }

    #[test]
    fn disconnect_clears_reconnecting() {
        let mut tracker = tracker(5);
        tracker.on_down(&ConnectionError::Closed("reset".into()));
        tracker.on_disconnect();
        assert!(!tracker.state().is_reconnecting);
        assert!(!tracker.state().is_connected);
        assert_eq!(tracker.state().last_error, None);
        assert!(!tracker.state().is_terminally_disconnected());
    }

    #[test]
    fn disconnect_after_giving_up_clears_the_error() {
        let mut tracker = tracker(0);
        assert_eq!(
            tracker.on_down(&ConnectionError::Open("refused".into())),
            ReconnectPlan::GiveUp
        );
        assert!(tracker.state().is_terminally_disconnected());

        tracker.on_disconnect();
        assert_eq!(tracker.state(), &ConnectionState::idle(0, None));
    }
}
