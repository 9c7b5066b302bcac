//! The store's authoritative job collection.

use jobs_core::{Job, JobFilter, JobId, JobSort, JobStatus, ProgressUpdate, StatusCounts, visible_jobs};

/// Jobs mirrored from the data source, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobCollection {
    jobs: Vec<Job>,
}

impl JobCollection {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == job_id)
    }

    fn get_mut(&mut self, job_id: &JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| &job.id == job_id)
    }

    /// Replace everything with a freshly loaded set.
    pub fn replace(&mut self, jobs: Vec<Job>) {
        self.jobs = jobs;
    }

    /// Merge an event's status and progress into its job.
    ///
    /// Events for unknown jobs are dropped; returns whether anything changed.
    pub fn apply(&mut self, update: &ProgressUpdate) -> bool {
        let Some(job) = self.get_mut(&update.job_id) else {
            return false;
        };
        if job.status == update.status && job.progress == update.progress {
            return false;
        }
        job.status = update.status;
        job.progress = update.progress;
        true
    }

    /// Add a confirmed job at the front, replacing a record with the same id.
    pub fn insert(&mut self, job: Job) {
        self.jobs.retain(|existing| existing.id != job.id);
        self.jobs.insert(0, job);
    }

    /// Mirror a confirmed stop.
    pub fn mark_stopped(&mut self, job_id: &JobId) -> bool {
        match self.get_mut(job_id) {
            Some(job) => {
                job.status = JobStatus::Stopped;
                true
            }
            None => false,
        }
    }

    /// Mirror a confirmed restart.
    pub fn mark_restarted(&mut self, job_id: &JobId) -> bool {
        match self.get_mut(job_id) {
            Some(job) => {
                job.reset_for_restart();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, job_id: &JobId) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|job| &job.id != job_id);
        self.jobs.len() != before
    }

    /// Remove every job with `status`; returns how many went.
    pub fn remove_status(&mut self, status: JobStatus) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.status != status);
        before - self.jobs.len()
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts::tally(&self.jobs)
    }

    pub fn visible(&self, filter: &JobFilter, sort: &JobSort) -> Vec<Job> {
        visible_jobs(&self.jobs, filter, sort)
    }
}
