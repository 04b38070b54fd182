//! yt-dlp backed retrieval engine
//!
//! Invokes the external yt-dlp binary with a machine-readable progress
//! template and translates its output lines into [`FetchEvent`]s. Supports
//! both system-installed yt-dlp and common install locations.

use crate::fetcher::{FetchEvent, Fetcher};
use crate::utils::error::VidloaderError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One line per progress tick, `|`-separated, numeric fields may be `NA`.
const PROGRESS_TEMPLATE: &str = "download:PROGRESS|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.eta)s";

/// How long to wait for the child to die after a kill before treating it
/// as stopped anyway.
const KILL_WAIT: Duration = Duration::from_secs(1);

/// Retrieval engine backed by the yt-dlp binary
pub struct YtDlpFetcher {
    ytdlp_path: PathBuf,
}

impl YtDlpFetcher {
    /// Locate yt-dlp and build a fetcher, or fail if it is not installed
    pub fn new() -> Result<Self> {
        let ytdlp_path = match find_ytdlp() {
            Some(path) => {
                info!("Found yt-dlp at: {}", path.display());
                path
            }
            None => {
                error!("yt-dlp not found anywhere");
                return Err(VidloaderError::FetcherNotFound.into());
            }
        };
        Ok(Self { ytdlp_path })
    }

    /// Use an explicit binary path (tests, bundled installs)
    pub fn with_path(ytdlp_path: PathBuf) -> Self {
        Self { ytdlp_path }
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        url: &str,
        format_expression: &str,
        output_template: &Path,
        events: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) -> Result<Option<PathBuf>> {
        debug!("Invoking yt-dlp for {} (format: {})", url, format_expression);

        let mut child = Command::new(&self.ytdlp_path)
            .arg("--newline")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--no-simulate")
            .arg("-f")
            .arg(format_expression)
            .arg("-o")
            .arg(output_template)
            .arg("--progress-template")
            .arg(PROGRESS_TEMPLATE)
            .arg("--print")
            .arg("after_move:filepath")
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VidloaderError::OperationFailed("yt-dlp stdout not captured".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| VidloaderError::OperationFailed("yt-dlp stderr not captured".into()))?;

        // Drain stderr concurrently so the child never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut produced: Option<PathBuf> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Cancellation requested, killing yt-dlp");
                    let _ = child.start_kill();
                    let _ = tokio::time::timeout(KILL_WAIT, child.wait()).await;
                    stderr_task.abort();
                    return Err(VidloaderError::OperationFailed("fetch cancelled".into()).into());
                }
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if let Some(event) = parse_progress_line(&line) {
                                // Best-effort delivery; a slow consumer must
                                // not stall the child process
                                let _ = events.try_send(event);
                            } else if let Some(path) = parse_filepath_line(&line) {
                                let _ = events
                                    .try_send(FetchEvent::Finished { filename: path.clone() });
                                produced = Some(path);
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = tokio::time::timeout(KILL_WAIT, child.wait()).await;
                stderr_task.abort();
                return Err(VidloaderError::OperationFailed("fetch cancelled".into()).into());
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            let stderr_text = stderr_task.await.unwrap_or_default();
            error!("yt-dlp exited with {}: {}", status, stderr_text.trim());
            return Err(VidloaderError::FetchError(stderr_text).into());
        }

        debug!("yt-dlp finished, produced: {:?}", produced);
        Ok(produced)
    }
}

/// Parse one `--progress-template` line into a downloading event.
///
/// Returns `None` for anything that is not a well-formed progress line.
pub(crate) fn parse_progress_line(line: &str) -> Option<FetchEvent> {
    let rest = line.trim().strip_prefix("PROGRESS|")?;
    let mut parts = rest.split('|');
    let status = parts.next()?;
    if status != "downloading" {
        return None;
    }
    let downloaded_bytes = parse_numeric(parts.next()?)?;
    let total_bytes = parse_numeric(parts.next().unwrap_or("NA"));
    let total_estimate = parse_numeric(parts.next().unwrap_or("NA"));
    let eta_secs = parse_numeric(parts.next().unwrap_or("NA"));

    Some(FetchEvent::Downloading {
        downloaded_bytes,
        total_bytes: total_bytes.or(total_estimate),
        eta_secs,
    })
}

/// yt-dlp prints `NA` for unknown fields and sometimes formats byte counts
/// as floats.
fn parse_numeric(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "NA" {
        return None;
    }
    trimmed
        .parse::<u64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(|f| f.max(0.0) as u64))
}

/// A stdout line that is neither a progress line nor engine chatter is the
/// printed final file path.
fn parse_filepath_line(line: &str) -> Option<PathBuf> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('[') || trimmed.starts_with("PROGRESS|") {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

/// Find the yt-dlp binary: system PATH first, then common install paths
pub fn find_ytdlp() -> Option<PathBuf> {
    if let Ok(path) = which::which("yt-dlp") {
        if path.exists() {
            return Some(path);
        }
    }

    let common_paths = [
        "/opt/homebrew/bin/yt-dlp",
        "/usr/local/bin/yt-dlp",
        "/usr/bin/yt-dlp",
        "~/.local/bin/yt-dlp",
    ];
    for path_str in common_paths {
        let expanded = match path_str.strip_prefix("~/") {
            Some(rest) => match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => continue,
            },
            None => PathBuf::from(path_str),
        };
        if expanded.exists() {
            return Some(expanded);
        }
    }

    warn!("yt-dlp not found in PATH or common locations");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_downloading_line() {
        let event = parse_progress_line("PROGRESS|downloading|512|1024|NA|7").unwrap();
        assert_eq!(
            event,
            FetchEvent::Downloading {
                downloaded_bytes: 512,
                total_bytes: Some(1024),
                eta_secs: Some(7),
            }
        );
    }

    #[test]
    fn test_parse_uses_estimate_when_total_unknown() {
        let event = parse_progress_line("PROGRESS|downloading|100|NA|2000|NA").unwrap();
        assert_eq!(
            event,
            FetchEvent::Downloading {
                downloaded_bytes: 100,
                total_bytes: Some(2000),
                eta_secs: None,
            }
        );
    }

    #[test]
    fn test_parse_float_byte_counts() {
        let event = parse_progress_line("PROGRESS|downloading|1024.0|4096.5|NA|NA").unwrap();
        match event {
            FetchEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                ..
            } => {
                assert_eq!(downloaded_bytes, 1024);
                assert_eq!(total_bytes, Some(4096));
            }
            _ => panic!("expected downloading event"),
        }
    }

    #[test]
    fn test_parse_rejects_non_progress_lines() {
        assert!(parse_progress_line("[download] Destination: x.mp4").is_none());
        assert!(parse_progress_line("PROGRESS|finished|NA|NA|NA|NA").is_none());
        assert!(parse_progress_line("").is_none());
    }

    #[test]
    fn test_filepath_line_detection() {
        assert_eq!(
            parse_filepath_line("/downloads/video.mp4"),
            Some(PathBuf::from("/downloads/video.mp4"))
        );
        assert!(parse_filepath_line("[youtube] extracting").is_none());
        assert!(parse_filepath_line("PROGRESS|downloading|1|2|NA|NA").is_none());
        assert!(parse_filepath_line("   ").is_none());
    }

    #[test]
    fn test_find_ytdlp_does_not_panic() {
        // yt-dlp may or may not be installed where tests run
        let _ = find_ytdlp();
    }
}
