//! Transcoding-engine boundary
//!
//! Post-processing is delegated to the external ffmpeg binary: re-encode to
//! the widely-supported h264/aac pair, with an ffprobe codec check deciding
//! whether the work is needed at all. Also owns the finalize step that swaps
//! the processed file in place of the original.

use crate::utils::error::VidloaderError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Codec markers that trigger a re-encode under the probe policy.
/// Case-insensitive substring match against the probe output.
const INCOMPATIBLE_CODECS: &[&str] = &["vp9", "av01", "av1", "opus", "vorbis", "hevc"];

/// Diagnostic subprocesses must never hang a job
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// When the post-process stage runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TranscodePolicy {
    /// Re-encode every download for maximum compatibility
    Always,
    /// Probe the file first and transcode only when an incompatible codec
    /// is detected, leaving already-compatible files untouched
    #[default]
    ProbeIncompatible,
}

/// How the processed file ended up as the final output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Atomic rename over the original
    Replaced,
    /// Rename failed; contents copied over the original, temp removed
    CopiedOver,
    /// Both replace strategies failed; the temp file is the final output
    KeptTemp,
}

/// External ffmpeg/ffprobe wrapper
pub struct Transcoder {
    ffmpeg_path: PathBuf,
    ffprobe_path: Option<PathBuf>,
    policy: TranscodePolicy,
}

impl Transcoder {
    /// Locate ffmpeg (required) and ffprobe (optional; without it the probe
    /// policy degrades to "no transcode needed").
    pub fn new(policy: TranscodePolicy) -> Result<Self> {
        let ffmpeg_path = which::which("ffmpeg").map_err(|_| VidloaderError::TranscoderNotFound)?;
        let ffprobe_path = which::which("ffprobe").ok();
        info!(
            "Using ffmpeg at {} (ffprobe: {:?})",
            ffmpeg_path.display(),
            ffprobe_path
        );
        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
            policy,
        })
    }

    /// Build with explicit binary paths (used by tests)
    pub fn with_programs(
        ffmpeg_path: PathBuf,
        ffprobe_path: Option<PathBuf>,
        policy: TranscodePolicy,
    ) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            policy,
        }
    }

    pub fn policy(&self) -> TranscodePolicy {
        self.policy
    }

    /// Decide whether `input` warrants a re-encode.
    ///
    /// Probe failure or timeout degrades to `false`; a broken diagnostic
    /// step must not fail the job.
    pub async fn should_transcode(&self, input: &Path) -> bool {
        match self.policy {
            TranscodePolicy::Always => true,
            TranscodePolicy::ProbeIncompatible => match self.probe_codecs(input).await {
                Ok(diagnostic) => {
                    let lower = diagnostic.to_lowercase();
                    let incompatible = INCOMPATIBLE_CODECS.iter().any(|c| lower.contains(c));
                    debug!(
                        "Probe of {}: {:?} (incompatible: {})",
                        input.display(),
                        diagnostic.trim(),
                        incompatible
                    );
                    incompatible
                }
                Err(e) => {
                    warn!("Codec probe failed, skipping transcode: {}", e);
                    false
                }
            },
        }
    }

    /// Run ffprobe and return its raw diagnostic text (one codec name per
    /// line), bounded by [`PROBE_TIMEOUT`].
    pub async fn probe_codecs(&self, input: &Path) -> Result<String> {
        let ffprobe = self
            .ffprobe_path
            .as_ref()
            .ok_or_else(|| VidloaderError::ProbeError("ffprobe not available".into()))?;

        let mut probe = Command::new(ffprobe);
        probe
            .arg("-v")
            .arg("quiet")
            .arg("-show_entries")
            .arg("stream=codec_name")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(PROBE_TIMEOUT, probe.output())
            .await
            .map_err(|_| VidloaderError::ProbeError("probe timed out".into()))??;

        if !output.status.success() {
            return Err(VidloaderError::ProbeError(format!(
                "ffprobe exited with {}",
                output.status
            ))
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Re-encode `input` into `output` (h264 video, aac audio).
    /// All engine output is suppressed.
    pub async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        info!("Transcoding {} -> {}", input.display(), output.display());

        let status = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg("fast")
            .arg("-c:a")
            .arg("aac")
            .arg("-b:a")
            .arg("192k")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;

        if !status.success() {
            return Err(
                VidloaderError::TranscodeError(format!("ffmpeg exited with {}", status)).into(),
            );
        }
        Ok(())
    }
}

/// Swap the processed temp file in place of the original.
///
/// Strategies are tried in order: atomic rename, then copy-and-remove, and
/// as a last resort the temp file itself becomes the final output. The
/// original is never deleted before a replacement exists, and successfully
/// produced output is never lost.
pub async fn finalize_replace(temp: &Path, original: &Path) -> (PathBuf, FinalizeOutcome) {
    match tokio::fs::rename(temp, original).await {
        Ok(()) => return (original.to_path_buf(), FinalizeOutcome::Replaced),
        Err(e) => warn!("Atomic rename failed, trying copy: {}", e),
    }

    match tokio::fs::copy(temp, original).await {
        Ok(_) => {
            if let Err(e) = tokio::fs::remove_file(temp).await {
                warn!("Could not remove temp file {}: {}", temp.display(), e);
            }
            (original.to_path_buf(), FinalizeOutcome::CopiedOver)
        }
        Err(e) => {
            warn!(
                "Could not replace original, keeping temp file {}: {}",
                temp.display(),
                e
            );
            (temp.to_path_buf(), FinalizeOutcome::KeptTemp)
        }
    }
}
