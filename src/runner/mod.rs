//! Single-job execution: fetch, translate progress, conditionally
//! transcode, finalize
//!
//! A [`JobRunner`] drives exactly one download end-to-end. Raw engine
//! events are translated into a throttled, caller-facing progress stream:
//! an update is emitted only when the computed percent changes, so the
//! caller is never flooded with near-duplicate events. The terminal result
//! is the return value of [`JobRunner::execute`], delivered exactly once.

use crate::fetcher::{FetchEvent, Fetcher, Quality};
use crate::transcode::{finalize_replace, Transcoder};
use crate::utils::error::VidloaderError;
use crate::utils::sanitize::{is_safe_path, sanitize_filename, strip_control_sequences};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Throttled, UI-facing progress signal.
///
/// Percent 0 with a status text means "busy, not idle": it marks the
/// processing stage between fetch and finalize, not a regression to 0%.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub text: String,
}

/// Terminal result of one job run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The produced file, or the output directory for a degenerate success
    Completed(PathBuf),
    /// Cleaned (control-character-free) error description
    Failed(String),
    Cancelled,
}

/// Executes one download job end-to-end
pub struct JobRunner {
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<Transcoder>,
}

impl JobRunner {
    pub fn new(fetcher: Arc<dyn Fetcher>, transcoder: Arc<Transcoder>) -> Self {
        Self {
            fetcher,
            transcoder,
        }
    }

    /// Run the full job: fetch, then conditionally transcode and finalize.
    ///
    /// Streams progress through `progress`; cancellation is requested
    /// through `cancel` and aborts the external process promptly.
    pub async fn execute(
        &self,
        url: &str,
        output_dir: &Path,
        quality: Quality,
        progress: mpsc::Sender<ProgressUpdate>,
        cancel: CancellationToken,
    ) -> JobOutcome {
        // The engine substitutes the title itself; the placeholder is
        // sanitized so the expansion cannot introduce path components.
        let title = sanitize_filename("%(title)s", 255);
        let template = output_dir.join(format!("{}.%(ext)s", title));
        if !is_safe_path(output_dir, &template) {
            return JobOutcome::Failed(
                VidloaderError::UnsafePath(template.display().to_string()).to_string(),
            );
        }

        let format_expression = quality.format_expression();
        info!(
            "Starting download: {} (quality: {})",
            url,
            quality.as_str()
        );

        let (raw_tx, mut raw_rx) = mpsc::channel::<FetchEvent>(64);
        let fetch_handle = tokio::spawn({
            let fetcher = Arc::clone(&self.fetcher);
            let url = url.to_string();
            let template = template.clone();
            let cancel = cancel.clone();
            async move {
                fetcher
                    .fetch(&url, format_expression, &template, raw_tx, cancel)
                    .await
            }
        });

        // Translate raw engine events into the throttled progress stream
        let mut last_percent: u8 = 0;
        let mut reported_file: Option<PathBuf> = None;
        while let Some(event) = raw_rx.recv().await {
            match event {
                FetchEvent::Downloading {
                    downloaded_bytes,
                    total_bytes,
                    eta_secs,
                } => {
                    let percent = compute_percent(downloaded_bytes, total_bytes);
                    if percent != last_percent {
                        last_percent = percent;
                        let text = match eta_secs {
                            Some(eta) => format!("Downloading... {}% (ETA: {}s)", percent, eta),
                            None => format!("Downloading... {}%", percent),
                        };
                        let _ = progress.send(ProgressUpdate { percent, text }).await;
                    }
                }
                FetchEvent::Finished { filename } => {
                    // The stage is not truly finished until post-processing
                    // completes, so no caller-visible update here
                    debug!("Engine reported file: {}", filename.display());
                    reported_file = Some(filename);
                }
            }
        }

        let fetch_result = match fetch_handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Fetch task panicked: {}", e);
                return JobOutcome::Failed("internal fetch task failure".to_string());
            }
        };

        if cancel.is_cancelled() {
            info!("Download cancelled: {}", url);
            return JobOutcome::Cancelled;
        }

        let produced = match fetch_result {
            Ok(path) => path.or(reported_file),
            Err(e) => {
                let message = clean_fetch_error(&e.to_string(), url);
                error!("Download failed: {}", message);
                return JobOutcome::Failed(message);
            }
        };

        // No discoverable file path is a degenerate success, not an error
        let src = match produced {
            Some(path) => resolve_under(output_dir, &path),
            None => {
                warn!("Fetch succeeded but reported no file path");
                return JobOutcome::Completed(output_dir.to_path_buf());
            }
        };

        if !src.exists() {
            return JobOutcome::Failed(format!("Downloaded file missing: {}", src.display()));
        }

        if cancel.is_cancelled() {
            return JobOutcome::Cancelled;
        }

        let final_path = if self.transcoder.should_transcode(&src).await {
            match self.post_process(&src, &progress, &cancel).await {
                Some(path) => path,
                None => {
                    info!("Cancelled during processing: {}", url);
                    return JobOutcome::Cancelled;
                }
            }
        } else {
            src
        };

        info!("Download complete: {}", final_path.display());
        JobOutcome::Completed(final_path)
    }

    /// Re-encode `src` into a temporary sibling and swap it into place.
    /// Returns `None` when cancelled mid-encode.
    ///
    /// A failed enhancement never regresses a successful retrieval: on any
    /// transcode error the original file is the result.
    async fn post_process(
        &self,
        src: &Path,
        progress: &mpsc::Sender<ProgressUpdate>,
        cancel: &CancellationToken,
    ) -> Option<PathBuf> {
        let _ = progress
            .send(ProgressUpdate {
                percent: 0,
                text: "Processing, please wait...".to_string(),
            })
            .await;

        let temp = src.with_extension("tmp.mp4");
        // Dropping the transcode future drops the child, which is spawned
        // with kill_on_drop, so the encoder dies with the select branch
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Cancellation requested, abandoning transcode");
                if temp.exists() {
                    let _ = tokio::fs::remove_file(&temp).await;
                }
                return None;
            }
            result = self.transcoder.transcode(src, &temp) => result,
        };

        match result {
            Ok(()) => {
                let (final_path, outcome) = finalize_replace(&temp, src).await;
                debug!("Finalized via {:?}: {}", outcome, final_path.display());
                Some(final_path)
            }
            Err(e) => {
                warn!("Transcode failed, keeping original file: {}", e);
                if temp.exists() {
                    let _ = tokio::fs::remove_file(&temp).await;
                }
                Some(src.to_path_buf())
            }
        }
    }
}

/// Percent is floor(downloaded * 100 / total) when the total is known,
/// else 0, clamped to 100.
fn compute_percent(downloaded: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => ((downloaded.saturating_mul(100)) / total).min(100) as u8,
        _ => 0,
    }
}

/// Engines may return paths relative to their working directory
fn resolve_under(output_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match path.file_name() {
        Some(name) => output_dir.join(name),
        None => output_dir.to_path_buf(),
    }
}

/// Strip control sequences from engine error text and pattern-match the
/// unsupported-source case for friendlier reporting.
fn clean_fetch_error(raw: &str, url: &str) -> String {
    let cleaned = strip_control_sequences(raw);
    if cleaned.to_lowercase().contains("unsupported url") {
        return VidloaderError::UnsupportedSource(url.to_string()).to_string();
    }
    if cleaned.is_empty() {
        return "Download failed".to_string();
    }
    cleaned
}
