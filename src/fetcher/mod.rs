//! Retrieval-engine boundary
//!
//! The actual media retrieval is delegated to an external engine (yt-dlp).
//! This module defines the narrow contract the rest of the crate consumes:
//! a [`Fetcher`] trait that streams structured [`FetchEvent`]s while it
//! works, plus the quality-to-format-expression mapping.

pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use ytdlp::YtDlpFetcher;

/// Quality selector mapped onto the retrieval engine's format language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Auto,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    Audio,
}

impl Quality {
    /// Parse a selector string; unknown selectors fall back to `Auto`.
    pub fn from_selector(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "1080p" => Quality::P1080,
            "720p" => Quality::P720,
            "audio" => Quality::Audio,
            _ => Quality::Auto,
        }
    }

    /// Format-selection expression understood by yt-dlp.
    ///
    /// `auto` prefers a single best combined stream; the height-bounded
    /// selectors prefer best-video-at-or-below plus best-audio with a
    /// fallback to best available; `audio` requests the best audio-only
    /// stream.
    pub fn format_expression(&self) -> &'static str {
        match self {
            Quality::Auto => "best[ext=mp4]/best",
            Quality::P1080 => "bestvideo[height<=1080][ext=mp4]+bestaudio/best",
            Quality::P720 => "bestvideo[height<=720][ext=mp4]+bestaudio/best",
            Quality::Audio => "bestaudio/best",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Auto => "auto",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::Audio => "audio",
        }
    }
}

/// Raw progress event emitted by the retrieval engine
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// Bytes are flowing; `total_bytes` is unknown for some sources
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        eta_secs: Option<u64>,
    },
    /// The engine finished writing one file to disk
    Finished { filename: PathBuf },
}

/// Core trait for retrieval engines
///
/// Implementations stream zero or more [`FetchEvent`]s through `events`
/// while fetching, and return the produced file path (when one was
/// discoverable) on success. Cancellation is requested through the token;
/// implementations must stop the underlying process promptly.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        format_expression: &str,
        output_template: &Path,
        events: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Option<PathBuf>>;
}
