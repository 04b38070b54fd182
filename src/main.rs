//! Vidloader - sequential media download queue
//!
//! Headless CLI driver: enqueue one or more URLs, watch throttled progress,
//! and exit once the queue drains. Retrieval is delegated to yt-dlp and
//! optional re-encoding to ffmpeg.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use vidloader::backend::{BackendActor, BackendCommand, BackendEvent};
use vidloader::fetcher::{Quality, YtDlpFetcher};
use vidloader::runner::JobRunner;
use vidloader::transcode::{TranscodePolicy, Transcoder};
use vidloader::utils::SettingsStore;

#[derive(Parser)]
#[command(about = "Download media URLs through a sequential queue")]
struct Args {
    /// URLs to download
    urls: Vec<String>,

    /// Output directory (defaults to the saved preference)
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Quality selector: auto, 1080p, 720p, audio
    #[arg(long, short = 'q')]
    quality: Option<String>,

    /// Re-encode every download instead of probing codecs first
    #[arg(long)]
    always_transcode: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    if args.urls.is_empty() {
        eprintln!("No URLs given. Try: vidloader <url>...");
        return Ok(());
    }

    // Seed defaults from the persisted settings document
    let store = SettingsStore::new();
    let settings = store.load();

    let output_dir = args.output_dir.unwrap_or(settings.downloads_dir.clone());
    tokio::fs::create_dir_all(&output_dir).await?;

    let quality = match &args.quality {
        Some(selector) => {
            let quality = Quality::from_selector(selector);
            // Remember the choice, like any other preference
            let _ = store.set(|s| s.quality = quality);
            quality
        }
        None => settings.quality,
    };
    let policy = if args.always_transcode {
        TranscodePolicy::Always
    } else {
        settings.transcode_policy
    };

    let fetcher = Arc::new(YtDlpFetcher::new()?);
    let transcoder = Arc::new(Transcoder::new(policy)?);
    let runner = Arc::new(JobRunner::new(fetcher, transcoder));

    let (cmd_tx, cmd_rx) = mpsc::channel::<BackendCommand>(32);
    let (event_tx, mut event_rx) = mpsc::channel::<BackendEvent>(64);
    let actor = BackendActor::new(runner, output_dir, quality, cmd_rx, event_tx);
    let actor_handle = tokio::spawn(actor.run());

    cmd_tx.send(BackendCommand::AddUrls(args.urls)).await?;

    while let Some(event) = event_rx.recv().await {
        match event {
            BackendEvent::Enqueued { url } => println!("Queued {}", url),
            BackendEvent::Rejected { url, reason } => {
                eprintln!("Rejected {}: {}", url, reason);
            }
            BackendEvent::Progress { percent, text, .. } => {
                if percent == 0 {
                    println!("{}", text);
                } else {
                    println!("[{:>3}%] {}", percent, text);
                }
            }
            BackendEvent::Finished {
                url,
                success,
                message,
            } => {
                if success {
                    println!("Done: {} -> {}", url, message);
                } else {
                    eprintln!("Failed: {} ({})", url, message);
                }
            }
            BackendEvent::Cancelled { url } => {
                println!("Cancelled: {}", url);
            }
            // The queue ran dry (or nothing was accepted)
            BackendEvent::Idle => break,
        }
    }

    cmd_tx.send(BackendCommand::Shutdown).await?;
    let _ = actor_handle.await;
    Ok(())
}
