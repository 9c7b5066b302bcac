//! Simulator actor: the in-process stand-in for a job backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jobs_core::{ApiResponse, EventHub, JobId, ProgressUpdate, now_millis};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use crate::messages::SimulatorMessage;
use crate::simulation::{SimulationConfig, SimulationState, Stage};

/// Arguments for the simulator actor.
pub struct SimulatorArgs {
    pub config: SimulationConfig,
    pub hub: Arc<EventHub>,
    /// Start from these jobs instead of a generated population.
    pub jobs: Option<Vec<jobs_core::Job>>,
}

/// State for the simulator actor.
pub struct SimulatorState {
    sim: SimulationState,
    hub: Arc<EventHub>,
    tickers: Vec<JoinHandle<()>>,
    /// One pending progression per job, tagged so a cancelled stage that
    /// already fired is recognised as stale.
    progressions: HashMap<JobId, (u64, JoinHandle<()>)>,
    next_token: u64,
}

impl SimulatorState {
    fn publish(&self, updates: &[ProgressUpdate]) {
        for update in updates {
            tracing::debug!("{}", update.description());
            self.hub.publish(update);
        }
    }

    fn schedule(&mut self, myself: ActorRef<SimulatorMessage>, job_id: JobId, stage: Stage) {
        self.cancel(&job_id);
        self.next_token += 1;
        let token = self.next_token;
        let delay = self.sim.stage_delay(stage);

        let target = job_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = myself.send_message(SimulatorMessage::Advance {
                job_id: target,
                stage,
                token,
            });
        });
        self.progressions.insert(job_id, (token, handle));
    }

    fn cancel(&mut self, job_id: &JobId) {
        if let Some((_, handle)) = self.progressions.remove(job_id) {
            handle.abort();
        }
    }
}

fn spawn_ticker(
    myself: ActorRef<SimulatorMessage>,
    period: Duration,
    message: fn() -> SimulatorMessage,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        loop {
            interval.tick().await;
            if myself.send_message(message()).is_err() {
                break;
            }
        }
    })
}

/// Actor that owns the simulated job set.
pub struct SimulatorActor;

impl Actor for SimulatorActor {
    type Msg = SimulatorMessage;
    type State = SimulatorState;
    type Arguments = SimulatorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let sim = match args.jobs {
            Some(jobs) => SimulationState::with_jobs(args.config, jobs),
            None => SimulationState::new(args.config, now_millis()),
        };
        tracing::info!(jobs = sim.jobs().len(), "Starting job simulator");

        let config = sim.config();
        let tickers = vec![
            spawn_ticker(myself.clone(), config.progress_interval, || {
                SimulatorMessage::ProgressTick
            }),
            spawn_ticker(myself.clone(), config.queue_interval, || {
                SimulatorMessage::QueueTick
            }),
        ];

        Ok(SimulatorState {
            sim,
            hub: args.hub,
            tickers,
            progressions: HashMap::new(),
            next_token: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SimulatorMessage::GetJobs { reply } => {
                let _ = reply.send(state.sim.jobs().to_vec());
            }

            SimulatorMessage::Create { request, reply } => {
                let job = state.sim.create(request, now_millis());
                tracing::info!("Simulated job created: {} ({})", job.name, job.id);
                state.schedule(myself, job.id.clone(), Stage::Queue);
                let _ = reply.send(job);
            }

            SimulatorMessage::Stop { job_id, reply } => match state.sim.stop(&job_id) {
                Ok(update) => {
                    state.cancel(&job_id);
                    state.publish(&[update]);
                    let _ = reply.send(ApiResponse::success("Job stopped successfully"));
                }
                Err(response) => {
                    let _ = reply.send(response);
                }
            },

            SimulatorMessage::Restart { job_id, reply } => match state.sim.restart(&job_id) {
                Ok(update) => {
                    state.publish(&[update]);
                    state.schedule(myself, job_id, Stage::Queue);
                    let _ = reply.send(ApiResponse::success("Job restarted successfully"));
                }
                Err(response) => {
                    let _ = reply.send(response);
                }
            },

            SimulatorMessage::Delete { job_id, reply } => {
                state.cancel(&job_id);
                let _ = reply.send(state.sim.delete(&job_id));
            }

            SimulatorMessage::DeleteByStatus { status, reply } => {
                let removed = state.sim.delete_by_status(status);
                for job_id in &removed {
                    state.cancel(job_id);
                }
                tracing::info!("Deleted {} simulated {} jobs", removed.len(), status);
                let _ = reply.send(removed.len());
            }

            SimulatorMessage::ProgressTick => {
                let updates = state.sim.progress_tick(now_millis());
                state.publish(&updates);
            }

            SimulatorMessage::QueueTick => {
                let updates = state.sim.queue_tick(now_millis());
                state.publish(&updates);
            }

            SimulatorMessage::Advance {
                job_id,
                stage,
                token,
            } => {
                let current = state.progressions.get(&job_id).map(|(t, _)| *t);
                if current != Some(token) {
                    return Ok(());
                }
                state.progressions.remove(&job_id);

                if let Some(update) = state.sim.advance(&job_id, stage, now_millis()) {
                    state.publish(&[update]);
                    if stage == Stage::Queue {
                        state.schedule(myself, job_id, Stage::Run);
                    }
                }
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for ticker in state.tickers.drain(..) {
            ticker.abort();
        }
        for (_, (_, handle)) in state.progressions.drain() {
            handle.abort();
        }
        state.hub.clear();
        tracing::info!("Job simulator stopped");
        Ok(())
    }
}
