//! Error handling for vidloader

use thiserror::Error;

/// Main error type for vidloader
#[derive(Debug, Error)]
pub enum VidloaderError {
    #[error("yt-dlp not found. Please install yt-dlp")]
    FetcherNotFound,

    #[error("ffmpeg not found. Please install ffmpeg")]
    TranscoderNotFound,

    #[error("Fetch failed: {0}")]
    FetchError(String),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("Transcode failed: {0}")]
    TranscodeError(String),

    #[error("Codec probe failed: {0}")]
    ProbeError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Output path escapes the download directory: {0}")]
    UnsafePath(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}
