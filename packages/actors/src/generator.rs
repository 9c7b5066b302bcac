//! Plausible demo jobs for the simulator.

use jobs_core::{Job, JobStatus, Priority};
use rand::Rng;

const JOB_NAMES: [&str; 15] = [
    "Data Processing Pipeline",
    "Image Optimization Batch",
    "Email Marketing Campaign",
    "Database Backup",
    "Video Transcoding Task",
    "Report Generation",
    "User Analytics Export",
    "File Compression Job",
    "API Data Sync",
    "Cache Warm-up Process",
    "Log Analysis Task",
    "Security Scan",
    "Performance Test Suite",
    "Data Migration Job",
    "Notification Dispatcher",
];

const ERROR_MESSAGES: [&str; 10] = [
    "Connection timeout to external service",
    "Insufficient memory to complete operation",
    "Invalid input data format detected",
    "External API rate limit exceeded",
    "Database connection lost during processing",
    "File not found at specified location",
    "Permission denied accessing required resource",
    "Network connectivity issues detected",
    "Unexpected data validation error",
    "Service temporarily unavailable",
];

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const HOUR_MS: i64 = 60 * 60 * 1000;

/// Share of the population per status, for populations of six or more.
const DISTRIBUTION: [(JobStatus, f64, bool); 6] = [
    (JobStatus::Pending, 0.1, true),
    (JobStatus::InQueue, 0.1, true),
    (JobStatus::Running, 0.4, false),
    (JobStatus::Completed, 0.2, false),
    (JobStatus::Failed, 0.1, true),
    (JobStatus::Stopped, 0.1, true),
];

/// A random failure reason.
pub fn random_error_message(rng: &mut impl Rng) -> String {
    ERROR_MESSAGES[rng.gen_range(0..ERROR_MESSAGES.len())].to_string()
}

fn random_name(rng: &mut impl Rng) -> String {
    let base = JOB_NAMES[rng.gen_range(0..JOB_NAMES.len())];
    format!("{} {}", base, rng.gen_range(0..1000))
}

/// Generate one job created within the day before `now`.
///
/// Timestamps, progress and error are consistent with the status; a
/// random status is picked when none is given.
pub fn generate_job(rng: &mut impl Rng, status: Option<JobStatus>, now: i64) -> Job {
    let status = status.unwrap_or_else(|| JobStatus::ALL[rng.gen_range(0..JobStatus::ALL.len())]);
    let priority = if rng.gen_bool(0.3) {
        Priority::High
    } else {
        Priority::Regular
    };

    let mut job = Job::new(random_name(rng), priority);
    job.status = status;
    job.created_at = now - rng.gen_range(0..DAY_MS);

    let started_at = (job.created_at + rng.gen_range(0..HOUR_MS)).min(now);
    let completed_at = (started_at + rng.gen_range(0..2 * HOUR_MS)).min(now);

    match status {
        JobStatus::Pending | JobStatus::InQueue => {}
        JobStatus::Running => {
            job.started_at = started_at;
            job.progress = rng.gen_range(0..100);
        }
        JobStatus::Completed => {
            job.started_at = started_at;
            job.completed_at = completed_at;
            job.progress = 100;
        }
        JobStatus::Failed => {
            job.started_at = started_at;
            job.completed_at = completed_at;
            job.progress = rng.gen_range(10..90);
            job.error_message = Some(random_error_message(rng));
        }
        JobStatus::Stopped => {
            // Stopped jobs never get a completion time.
            job.started_at = started_at;
            job.progress = rng.gen_range(10..80);
        }
    }

    job
}

/// Generate a population, newest first.
///
/// Six or more jobs follow a 10/10/40/20/10/10 status split with at least
/// one Pending, InQueue, Failed and Stopped job; smaller populations get
/// one job per status in lifecycle order.
pub fn generate_jobs(rng: &mut impl Rng, count: usize, now: i64) -> Vec<Job> {
    let mut jobs = Vec::with_capacity(count);

    if count < JobStatus::ALL.len() {
        for status in JobStatus::ALL.iter().take(count) {
            jobs.push(generate_job(rng, Some(*status), now));
        }
    } else {
        for (status, share, at_least_one) in DISTRIBUTION {
            let mut quota = (count as f64 * share).floor() as usize;
            if at_least_one {
                quota = quota.max(1);
            }
            for _ in 0..quota {
                jobs.push(generate_job(rng, Some(status), now));
            }
        }
    }

    while jobs.len() < count {
        jobs.push(generate_job(rng, None, now));
    }

    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    jobs
}
