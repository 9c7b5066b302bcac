//! The simulator behind the `JobService` seam.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use jobs_core::{
    ApiResponse, ConnectionState, CreateJobRequest, EventHandler, EventHub, Job, JobId,
    JobService, JobStatus, ServiceError, ServiceFuture, Subscription,
};
use rand::Rng;
use ractor::{Actor, ActorRef, RpcReplyPort};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::messages::SimulatorMessage;
use crate::simulation::SimulationConfig;
use crate::simulator::{SimulatorActor, SimulatorArgs};

/// Simulated round-trip times, in milliseconds.
const FETCH_LATENCY: RangeInclusive<u64> = 300..=500;
const CREATE_LATENCY: RangeInclusive<u64> = 200..=300;
const COMMAND_LATENCY: RangeInclusive<u64> = 150..=250;
const DELETE_LATENCY: RangeInclusive<u64> = 100..=150;
const BULK_DELETE_LATENCY: RangeInclusive<u64> = 200..=300;

/// Handle to a running simulator. Always reports a live connection.
#[derive(Clone)]
pub struct SimulatedJobService {
    actor: ActorRef<SimulatorMessage>,
    hub: Arc<EventHub>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    simulate_latency: bool,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SimulatedJobService {
    /// Start a simulator with a generated population.
    pub async fn start(config: SimulationConfig) -> Result<Self, ServiceError> {
        Self::spawn(config, None).await
    }

    /// Start a simulator over a fixed job set.
    pub async fn with_jobs(config: SimulationConfig, jobs: Vec<Job>) -> Result<Self, ServiceError> {
        Self::spawn(config, Some(jobs)).await
    }

    async fn spawn(config: SimulationConfig, jobs: Option<Vec<Job>>) -> Result<Self, ServiceError> {
        let hub = EventHub::new();
        let simulate_latency = config.simulate_latency;
        let args = SimulatorArgs {
            config,
            hub: hub.clone(),
            jobs,
        };

        let (actor, join) = Actor::spawn(None, SimulatorActor, args)
            .await
            .map_err(|e| ServiceError::Unavailable(format!("Failed to spawn simulator: {}", e)))?;
        let (state_tx, _) = watch::channel(ConnectionState::connected());

        Ok(Self {
            actor,
            hub,
            state_tx: Arc::new(state_tx),
            simulate_latency,
            join: Arc::new(Mutex::new(Some(join))),
        })
    }

    fn is_stopped(&self) -> bool {
        self.join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    async fn call<T: Send + 'static>(
        &self,
        latency: RangeInclusive<u64>,
        build: impl FnOnce(RpcReplyPort<T>) -> SimulatorMessage,
    ) -> Result<T, ServiceError> {
        if self.simulate_latency {
            let delay = Duration::from_millis(rand::thread_rng().gen_range(latency));
            tokio::time::sleep(delay).await;
        }

        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(build(tx.into()))
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        rx.await
            .map_err(|_| ServiceError::Unavailable("simulator stopped".into()))
    }
}

impl JobService for SimulatedJobService {
    fn get_jobs(&self) -> ServiceFuture<Vec<Job>> {
        let this = self.clone();
        Box::pin(async move {
            this.call(FETCH_LATENCY, |reply| SimulatorMessage::GetJobs { reply })
                .await
        })
    }

    fn create_job(&self, request: CreateJobRequest) -> ServiceFuture<Job> {
        let this = self.clone();
        Box::pin(async move {
            this.call(CREATE_LATENCY, |reply| SimulatorMessage::Create { request, reply })
                .await
        })
    }

    fn stop_job(&self, job_id: JobId) -> ServiceFuture<ApiResponse> {
        let this = self.clone();
        Box::pin(async move {
            this.call(COMMAND_LATENCY, |reply| SimulatorMessage::Stop { job_id, reply })
                .await
        })
    }

    fn restart_job(&self, job_id: JobId) -> ServiceFuture<ApiResponse> {
        let this = self.clone();
        Box::pin(async move {
            this.call(COMMAND_LATENCY, |reply| SimulatorMessage::Restart { job_id, reply })
                .await
        })
    }

    fn delete_job(&self, job_id: JobId) -> ServiceFuture<()> {
        let this = self.clone();
        Box::pin(async move {
            let existed = this
                .call(DELETE_LATENCY, |reply| SimulatorMessage::Delete { job_id, reply })
                .await?;
            if !existed {
                tracing::debug!("Delete of an unknown simulated job");
            }
            Ok(())
        })
    }

    fn delete_jobs_by_status(&self, status: JobStatus) -> ServiceFuture<()> {
        let this = self.clone();
        Box::pin(async move {
            this.call(BULK_DELETE_LATENCY, |reply| SimulatorMessage::DeleteByStatus {
                status,
                reply,
            })
            .await
            .map(|_| ())
        })
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        self.hub.subscribe(handler)
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn connect(&self) -> ServiceFuture<()> {
        let this = self.clone();
        Box::pin(async move {
            if this.is_stopped() {
                return Err(ServiceError::Unavailable("simulator stopped".into()));
            }
            Ok(())
        })
    }

    fn shutdown(&self) -> ServiceFuture<()> {
        let this = self.clone();
        Box::pin(async move {
            let join = this
                .join
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let Some(join) = join else {
                return Ok(());
            };

            this.actor.stop(None);
            let _ = join.await;
            this.hub.clear();
            this.state_tx.send_replace(ConnectionState::default());
            Ok(())
        })
    }
}
