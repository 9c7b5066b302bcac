//! In-memory job population advanced by timer ticks.
//!
//! `SimulationState` is the synchronous core of the simulator: it owns the
//! jobs and a seeded RNG and returns the events each step produces. The
//! actor in `simulator` drives it from timers and commands.

use std::time::Duration;

use jobs_core::{ApiResponse, CreateJobRequest, Job, JobId, JobStatus, ProgressUpdate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::generator::{generate_jobs, random_error_message};

pub const JOB_NOT_FOUND: &str = "Job not found";
pub const CANNOT_STOP: &str = "Job cannot be stopped in current state";
pub const CANNOT_RESTART: &str = "Job cannot be restarted in current state";

/// Tuning for the simulated backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Jobs generated at startup.
    pub initial_jobs: usize,
    /// Period of the progress tick.
    pub progress_interval: Duration,
    /// Period of the queue-promotion tick.
    pub queue_interval: Duration,
    /// Chance that a job reaching 100% fails instead of completing.
    pub failure_rate: f64,
    pub promote_pending_chance: f64,
    pub promote_queued_chance: f64,
    /// Sleep a per-operation network latency before answering.
    pub simulate_latency: bool,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_jobs: 40,
            progress_interval: Duration::from_secs(2),
            queue_interval: Duration::from_secs(3),
            failure_rate: 0.1,
            promote_pending_chance: 0.3,
            promote_queued_chance: 0.4,
            simulate_latency: true,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn with_initial_jobs(mut self, count: usize) -> Self {
        self.initial_jobs = count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set both promotion chances.
    pub fn with_promotion_chances(mut self, pending: f64, queued: f64) -> Self {
        self.promote_pending_chance = pending.clamp(0.0, 1.0);
        self.promote_queued_chance = queued.clamp(0.0, 1.0);
        self
    }

    pub fn without_latency(mut self) -> Self {
        self.simulate_latency = false;
        self
    }
}

/// Step of the one-off progression scheduled after create or restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Pending -> InQueue, 2-5 s after scheduling.
    Queue,
    /// InQueue -> Running, 3-7 s after the previous stage.
    Run,
}

impl Stage {
    fn statuses(self) -> (JobStatus, JobStatus) {
        match self {
            Stage::Queue => (JobStatus::Pending, JobStatus::InQueue),
            Stage::Run => (JobStatus::InQueue, JobStatus::Running),
        }
    }

    fn delay_range_ms(self) -> std::ops::RangeInclusive<u64> {
        match self {
            Stage::Queue => 2_000..=5_000,
            Stage::Run => 3_000..=7_000,
        }
    }
}

/// The simulated backend's job set.
pub struct SimulationState {
    config: SimulationConfig,
    rng: StdRng,
    /// Newest first.
    jobs: Vec<Job>,
}

impl SimulationState {
    /// Seed a population of `config.initial_jobs`.
    pub fn new(config: SimulationConfig, now: i64) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let jobs = generate_jobs(&mut rng, config.initial_jobs, now);
        Self { config, rng, jobs }
    }

    /// Start from an explicit job set.
    pub fn with_jobs(config: SimulationConfig, jobs: Vec<Job>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng, jobs }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == job_id)
    }

    fn get_mut(&mut self, job_id: &JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| &job.id == job_id)
    }

    /// Advance every running job by 1-5 points; a job reaching 100 completes
    /// or, at the failure rate, fails with its progress snapped into 70-90.
    ///
    /// One event per mutated job, carrying its final state.
    pub fn progress_tick(&mut self, now: i64) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        for job in self
            .jobs
            .iter_mut()
            .filter(|job| job.status == JobStatus::Running && job.progress < 100)
        {
            let increment: u8 = self.rng.gen_range(1..=5);
            job.progress = job.progress.saturating_add(increment).min(100);

            if job.progress >= 100 {
                job.completed_at = now;
                if self.rng.gen_bool(self.config.failure_rate) {
                    job.status = JobStatus::Failed;
                    job.progress = self.rng.gen_range(70..=90);
                    job.error_message = Some(random_error_message(&mut self.rng));
                } else {
                    job.status = JobStatus::Completed;
                }
            }
            updates.push(ProgressUpdate::of(job));
        }
        updates
    }

    /// Maybe promote the oldest pending job to the queue and the oldest
    /// queued job to running.
    ///
    /// Candidates are picked before either promotion, so one job never
    /// moves two steps in a single tick.
    pub fn queue_tick(&mut self, now: i64) -> Vec<ProgressUpdate> {
        let pending = self.oldest(JobStatus::Pending);
        let queued = self.oldest(JobStatus::InQueue);
        let mut updates = Vec::new();

        if let Some(job_id) = pending
            && self.rng.gen_bool(self.config.promote_pending_chance)
            && let Some(update) = self.advance(&job_id, Stage::Queue, now)
        {
            updates.push(update);
        }
        if let Some(job_id) = queued
            && self.rng.gen_bool(self.config.promote_queued_chance)
            && let Some(update) = self.advance(&job_id, Stage::Run, now)
        {
            updates.push(update);
        }
        updates
    }

    fn oldest(&self, status: JobStatus) -> Option<JobId> {
        self.jobs
            .iter()
            .filter(|job| job.status == status)
            .min_by_key(|job| job.created_at)
            .map(|job| job.id.clone())
    }

    /// Apply one progression stage if the job is still where the stage starts.
    pub fn advance(&mut self, job_id: &JobId, stage: Stage, now: i64) -> Option<ProgressUpdate> {
        let (from, to) = stage.statuses();
        let job = self.get_mut(job_id)?;
        if job.status != from {
            return None;
        }
        job.status = job.status.transition(to).ok()?;
        if to == JobStatus::Running {
            job.started_at = now;
        }
        Some(ProgressUpdate::of(job))
    }

    /// Random delay before `stage` runs.
    pub fn stage_delay(&mut self, stage: Stage) -> Duration {
        Duration::from_millis(self.rng.gen_range(stage.delay_range_ms()))
    }

    /// Insert a fresh pending job at the front.
    pub fn create(&mut self, request: CreateJobRequest, now: i64) -> Job {
        let mut job = Job::new(request.name, request.priority);
        job.created_at = now;
        self.jobs.insert(0, job.clone());
        job
    }

    /// Stop a running or queued job.
    pub fn stop(&mut self, job_id: &JobId) -> Result<ProgressUpdate, ApiResponse> {
        let job = self
            .get_mut(job_id)
            .ok_or_else(|| ApiResponse::failure(JOB_NOT_FOUND))?;
        if !job.status.can_stop() {
            return Err(ApiResponse::failure(CANNOT_STOP));
        }
        job.status = JobStatus::Stopped;
        Ok(ProgressUpdate::of(job))
    }

    /// Put a failed or stopped job back to pending.
    pub fn restart(&mut self, job_id: &JobId) -> Result<ProgressUpdate, ApiResponse> {
        let job = self
            .get_mut(job_id)
            .ok_or_else(|| ApiResponse::failure(JOB_NOT_FOUND))?;
        if !job.status.can_restart() {
            return Err(ApiResponse::failure(CANNOT_RESTART));
        }
        job.reset_for_restart();
        Ok(ProgressUpdate::of(job))
    }

    /// Remove one job; returns whether it existed.
    pub fn delete(&mut self, job_id: &JobId) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|job| &job.id != job_id);
        self.jobs.len() != before
    }

    /// Remove every job with `status`; returns the removed ids.
    pub fn delete_by_status(&mut self, status: JobStatus) -> Vec<JobId> {
        let (removed, kept): (Vec<Job>, Vec<Job>) = std::mem::take(&mut self.jobs)
            .into_iter()
            .partition(|job| job.status == status);
        self.jobs = kept;
        removed.into_iter().map(|job| job.id).collect()
    }
}
