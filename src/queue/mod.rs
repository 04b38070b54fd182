pub mod manager;

pub use manager::{Job, JobState, QueueManager, QueueStats};
