//! Vidloader library
//!
//! A sequential media download queue built around two external engines:
//! yt-dlp for retrieval and ffmpeg for optional re-encoding. The crate owns
//! the job lifecycle, progress translation, and queue sequencing; the
//! engines are consumed as opaque subordinate processes.

pub mod backend;
pub mod fetcher;
pub mod queue;
pub mod runner;
pub mod transcode;
pub mod utils;

// Re-export main types for easier use
pub use backend::{BackendActor, BackendCommand, BackendEvent};
pub use fetcher::{FetchEvent, Fetcher, Quality, YtDlpFetcher};
pub use queue::{Job, JobState, QueueManager, QueueStats};
pub use runner::{JobOutcome, JobRunner, ProgressUpdate};
pub use transcode::{FinalizeOutcome, TranscodePolicy, Transcoder};
pub use utils::{Settings, SettingsStore, VidloaderError};
