//! Sequential download queue: job lifecycle and cursor sequencing
//!
//! A strict FIFO of jobs with a single cursor; at most one job is ever
//! downloading. All mutation happens on the owner task (the backend actor),
//! so this is a plain synchronous structure; worker contexts only emit
//! events, they never touch queue state directly.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of a single job. Transitions are one-directional;
/// no job re-enters Pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// One retrieval-and-process unit
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Immutable after creation; unique within the queue (exact match)
    pub url: String,
    pub state: JobState,
    /// Only meaningful while downloading; monotonic within a run
    pub progress_percent: u8,
    /// Latest human-readable status, always overwritten
    pub status_text: String,
    /// Non-empty iff the job failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    fn new(url: String) -> Self {
        Self {
            url,
            state: JobState::Pending,
            progress_percent: 0,
            status_text: String::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Aggregate queue statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub current_index: usize,
}

/// Ordered collection of jobs plus the cursor of the one eligible to run
#[derive(Debug, Default)]
pub struct QueueManager {
    items: Vec<Job>,
    current_index: usize,
    paused: bool,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new pending job. Rejects exact-duplicate URLs; no
    /// normalization is applied. URL validation is the caller's job,
    /// performed before submission.
    pub fn add_url(&mut self, url: &str) -> bool {
        let url = url.trim();
        if self.items.iter().any(|item| item.url == url) {
            return false;
        }
        self.items.push(Job::new(url.to_string()));
        true
    }

    /// Add several URLs; returns how many were actually added
    /// (duplicates skipped silently).
    pub fn add_urls<I, S>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter()
            .filter(|url| self.add_url(url.as_ref()))
            .count()
    }

    /// Bounds-checked removal. Removing an item below the cursor shifts
    /// the cursor down so it keeps pointing at the same job; afterwards
    /// the cursor is clamped into range.
    pub fn remove_item(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.items.remove(index);
        if index < self.current_index {
            self.current_index -= 1;
        }
        if self.current_index >= self.items.len() {
            self.current_index = self.items.len().saturating_sub(1);
        }
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.current_index = 0;
    }

    /// The job at the cursor, or none when the cursor ran past the end
    pub fn get_current(&self) -> Option<&Job> {
        self.items.get(self.current_index)
    }

    /// Advance the cursor and return the new current job.
    /// The cursor never runs further than one past the last item.
    pub fn next(&mut self) -> Option<&Job> {
        self.current_index = (self.current_index + 1).min(self.items.len());
        self.get_current()
    }

    /// Forward progress onto the current job. The first update after
    /// creation transitions it to downloading and stamps `started_at`
    /// exactly once.
    pub fn update_current(&mut self, percent: u8, status: &str) {
        if let Some(item) = self.items.get_mut(self.current_index) {
            if item.state.is_terminal() {
                return;
            }
            item.progress_percent = percent;
            item.status_text = status.to_string();
            if item.state == JobState::Pending {
                item.state = JobState::Downloading;
                item.started_at = Some(Utc::now());
            }
        }
    }

    pub fn mark_current_completed(&mut self) {
        if let Some(item) = self.items.get_mut(self.current_index) {
            if item.state.is_terminal() {
                return;
            }
            item.state = JobState::Completed;
            item.completed_at = Some(Utc::now());
        }
    }

    pub fn mark_current_failed(&mut self, error: &str) {
        if let Some(item) = self.items.get_mut(self.current_index) {
            if item.state.is_terminal() {
                return;
            }
            item.state = JobState::Failed;
            item.error = Some(error.to_string());
            item.completed_at = Some(Utc::now());
        }
    }

    /// Mark the current job cancelled. Stopping the underlying worker is
    /// the caller's responsibility.
    pub fn cancel_current(&mut self) {
        if let Some(item) = self.items.get_mut(self.current_index) {
            if item.state.is_terminal() {
                return;
            }
            item.state = JobState::Cancelled;
            item.completed_at = Some(Utc::now());
        }
    }

    /// Halt cursor advancement. Does not abort an in-flight job.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn get_stats(&self) -> QueueStats {
        QueueStats {
            total: self.items.len(),
            completed: self
                .items
                .iter()
                .filter(|i| i.state == JobState::Completed)
                .count(),
            failed: self
                .items
                .iter()
                .filter(|i| i.state == JobState::Failed)
                .count(),
            pending: self
                .items
                .iter()
                .filter(|i| i.state == JobState::Pending)
                .count(),
            current_index: self.current_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.current_index + 1 < self.items.len()
    }

    pub fn items(&self) -> &[Job] {
        &self.items
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }
}
