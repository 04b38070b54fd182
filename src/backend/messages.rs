use crate::queue::QueueStats;
use tokio::sync::oneshot;

/// Commands sent from a front end to the backend
#[derive(Debug)]
pub enum BackendCommand {
    /// Validate and enqueue one URL
    AddUrl(String),
    /// Validate and enqueue a batch; invalid and duplicate URLs are skipped
    AddUrls(Vec<String>),
    RemoveItem(usize),
    ClearQueue,
    Pause,
    Resume,
    /// Abort the in-flight job (or mark a waiting current job cancelled)
    CancelCurrent,
    /// Reply with aggregate statistics
    GetStats(oneshot::Sender<QueueStats>),
    Shutdown,
}

/// Events sent from the backend to a front end
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// A URL was accepted into the queue
    Enqueued { url: String },
    /// Submission rejected before a job was created
    Rejected { url: String, reason: String },
    /// Throttled progress for the in-flight job. Percent 0 with text means
    /// busy (initial or processing stage), not "0% done".
    Progress { url: String, percent: u8, text: String },
    /// Terminal result for one job: the final path on success, a cleaned
    /// error description on failure
    Finished {
        url: String,
        success: bool,
        message: String,
    },
    /// The job was cancelled before a terminal result
    Cancelled { url: String },
    /// The cursor ran past the last job; nothing is left to run
    Idle,
}
