//! Derived views over the job collection: filtering, sorting, counts.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{Job, JobStatus};

/// Filter options for the job table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub search_term: Option<String>,
}

impl JobFilter {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            search_term: None,
        }
    }

    /// Set the name search term.
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// True when a status is selected or the trimmed search term is non-empty.
    pub fn is_active(&self) -> bool {
        self.status.is_some()
            || self
                .search_term
                .as_deref()
                .is_some_and(|term| !term.trim().is_empty())
    }

    /// Status equality and case-insensitive substring match on the name.
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status
            && job.status != status
        {
            return false;
        }
        match self.search_term.as_deref() {
            Some(term) if !term.is_empty() => {
                job.name.to_lowercase().contains(&term.to_lowercase())
            }
            _ => true,
        }
    }
}

/// Column the job table is sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Name,
    Priority,
    Status,
    Progress,
    #[default]
    CreatedAt,
    StartedAt,
    CompletedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Sort selection; defaults to newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl JobSort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn compare(&self, a: &Job, b: &Job) -> Ordering {
        let ordering = sort_value(a, self.field).cmp(&sort_value(b, self.field));
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Unset values order as the empty string, i.e. before everything else.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue<'a> {
    Unset,
    Number(i64),
    Text(&'a str),
}

fn timestamp(value: i64) -> SortValue<'static> {
    if value == 0 {
        SortValue::Unset
    } else {
        SortValue::Number(value)
    }
}

fn sort_value(job: &Job, field: SortField) -> SortValue<'_> {
    match field {
        SortField::Name => SortValue::Text(&job.name),
        SortField::Priority => SortValue::Number(i64::from(u8::from(job.priority))),
        SortField::Status => SortValue::Number(i64::from(u8::from(job.status))),
        SortField::Progress => SortValue::Number(i64::from(job.progress)),
        SortField::CreatedAt => timestamp(job.created_at),
        SortField::StartedAt => timestamp(job.started_at),
        SortField::CompletedAt => timestamp(job.completed_at),
    }
}

/// Filter, then stable-sort a copy of `jobs`.
pub fn visible_jobs(jobs: &[Job], filter: &JobFilter, sort: &JobSort) -> Vec<Job> {
    let mut visible: Vec<Job> = jobs.iter().filter(|job| filter.matches(job)).cloned().collect();
    visible.sort_by(|a, b| sort.compare(a, b));
    visible
}

/// Per-status totals over the whole collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub in_queue: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub stopped: usize,
}

impl StatusCounts {
    pub fn tally<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut counts = Self::default();
        for job in jobs {
            *counts.slot(job.status) += 1;
        }
        counts
    }

    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::InQueue => self.in_queue,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Stopped => self.stopped,
        }
    }

    pub fn total(&self) -> usize {
        JobStatus::ALL.iter().map(|status| self.get(*status)).sum()
    }

    fn slot(&mut self, status: JobStatus) -> &mut usize {
        match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::InQueue => &mut self.in_queue,
            JobStatus::Running => &mut self.running,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Stopped => &mut self.stopped,
        }
    }
}
