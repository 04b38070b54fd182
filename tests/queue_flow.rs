//! Integration-style tests driving the backend actor end-to-end with a
//! scripted retrieval engine, without touching the network or external
//! binaries.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use vidloader::backend::{BackendActor, BackendCommand, BackendEvent};
use vidloader::fetcher::{FetchEvent, Fetcher, Quality};
use vidloader::runner::JobRunner;
use vidloader::transcode::{TranscodePolicy, Transcoder};

/// Replays a fixed event script per fetch and records the format
/// expression it was handed.
struct ScriptedFetcher {
    events: Vec<FetchEvent>,
    result: Result<Option<PathBuf>, String>,
    seen_expressions: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn succeeding(events: Vec<FetchEvent>, path: Option<PathBuf>) -> Self {
        Self {
            events,
            result: Ok(path),
            seen_expressions: Mutex::new(Vec::new()),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            events: Vec::new(),
            result: Err(message.to_string()),
            seen_expressions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _url: &str,
        format_expression: &str,
        _output_template: &Path,
        events: mpsc::Sender<FetchEvent>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Option<PathBuf>> {
        self.seen_expressions
            .lock()
            .unwrap()
            .push(format_expression.to_string());
        for event in &self.events {
            let _ = events.send(event.clone()).await;
        }
        match &self.result {
            Ok(path) => Ok(path.clone()),
            Err(message) => Err(anyhow::anyhow!(message.clone())),
        }
    }
}

/// Fetcher that blocks until cancelled, for cancellation-path tests
struct HangingFetcher;

#[async_trait]
impl Fetcher for HangingFetcher {
    async fn fetch(
        &self,
        _url: &str,
        _format_expression: &str,
        _output_template: &Path,
        _events: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Option<PathBuf>> {
        cancel.cancelled().await;
        Err(anyhow::anyhow!("killed"))
    }
}

fn passthrough_transcoder() -> Arc<Transcoder> {
    // No ffprobe available, so the probe policy always decides "no work"
    Arc::new(Transcoder::with_programs(
        PathBuf::from("/bin/true"),
        None,
        TranscodePolicy::ProbeIncompatible,
    ))
}

fn downloading(downloaded: u64, total: u64) -> FetchEvent {
    FetchEvent::Downloading {
        downloaded_bytes: downloaded,
        total_bytes: Some(total),
        eta_secs: None,
    }
}

fn spawn_actor(
    fetcher: Arc<dyn Fetcher>,
    output_dir: PathBuf,
    quality: Quality,
) -> (mpsc::Sender<BackendCommand>, mpsc::Receiver<BackendEvent>) {
    let runner = Arc::new(JobRunner::new(fetcher, passthrough_transcoder()));
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(64);
    let actor = BackendActor::new(runner, output_dir, quality, cmd_rx, event_tx);
    tokio::spawn(actor.run());
    (cmd_tx, event_rx)
}

async fn recv(event_rx: &mut mpsc::Receiver<BackendEvent>) -> BackendEvent {
    tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
        .await
        .expect("timed out waiting for backend event")
        .expect("event channel closed")
}

#[tokio::test]
async fn audio_download_end_to_end() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("v.mp4");
    std::fs::write(&file, b"media").unwrap();

    let fetcher = Arc::new(ScriptedFetcher::succeeding(
        vec![
            downloading(50, 100),
            downloading(100, 100),
            downloading(100, 100),
            FetchEvent::Finished {
                filename: file.clone(),
            },
        ],
        Some(file.clone()),
    ));
    let (cmd_tx, mut event_rx) =
        spawn_actor(fetcher.clone(), temp.path().to_path_buf(), Quality::Audio);

    cmd_tx
        .send(BackendCommand::AddUrl("https://example.com/v".to_string()))
        .await
        .unwrap();

    assert_eq!(
        recv(&mut event_rx).await,
        BackendEvent::Enqueued {
            url: "https://example.com/v".to_string()
        }
    );

    // Throttled progress: one event per distinct percent, no duplicate 100
    match recv(&mut event_rx).await {
        BackendEvent::Progress { percent: 50, .. } => {}
        other => panic!("expected 50% progress, got {:?}", other),
    }
    match recv(&mut event_rx).await {
        BackendEvent::Progress { percent: 100, .. } => {}
        other => panic!("expected 100% progress, got {:?}", other),
    }
    match recv(&mut event_rx).await {
        BackendEvent::Finished {
            success, message, ..
        } => {
            assert!(success);
            assert_eq!(message, file.display().to_string());
        }
        other => panic!("expected finished, got {:?}", other),
    }
    assert_eq!(recv(&mut event_rx).await, BackendEvent::Idle);

    // Audio quality resolved to the audio-only format expression
    let expressions = fetcher.seen_expressions.lock().unwrap().clone();
    assert_eq!(expressions, vec!["bestaudio/best".to_string()]);
}

#[tokio::test]
async fn duplicate_and_invalid_submissions_are_rejected() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(HangingFetcher);
    let (cmd_tx, mut event_rx) = spawn_actor(fetcher, temp.path().to_path_buf(), Quality::Auto);

    cmd_tx
        .send(BackendCommand::AddUrl("not-a-url".to_string()))
        .await
        .unwrap();
    match recv(&mut event_rx).await {
        BackendEvent::Rejected { url, .. } => assert_eq!(url, "not-a-url"),
        other => panic!("expected rejection, got {:?}", other),
    }
    // Nothing was enqueued, so the queue reports idle right away
    assert_eq!(recv(&mut event_rx).await, BackendEvent::Idle);

    cmd_tx
        .send(BackendCommand::AddUrl("https://example.com/v".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        recv(&mut event_rx).await,
        BackendEvent::Enqueued { .. }
    ));

    cmd_tx
        .send(BackendCommand::AddUrl("https://example.com/v".to_string()))
        .await
        .unwrap();
    match recv(&mut event_rx).await {
        BackendEvent::Rejected { reason, .. } => {
            assert!(reason.contains("already in the queue"));
        }
        other => panic!("expected duplicate rejection, got {:?}", other),
    }

    // Exactly one job exists despite two submissions of the same URL
    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(BackendCommand::GetStats(reply_tx))
        .await
        .unwrap();
    let stats = reply_rx.await.unwrap();
    assert_eq!(stats.total, 1);
}

#[tokio::test]
async fn failed_fetch_reports_clean_error_and_queue_advances() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::failing(
        "\u{1b}[31mERROR:\u{1b}[0m fetch blew up",
    ));
    let (cmd_tx, mut event_rx) = spawn_actor(fetcher, temp.path().to_path_buf(), Quality::Auto);

    cmd_tx
        .send(BackendCommand::AddUrl("https://example.com/bad".to_string()))
        .await
        .unwrap();

    assert!(matches!(
        recv(&mut event_rx).await,
        BackendEvent::Enqueued { .. }
    ));
    match recv(&mut event_rx).await {
        BackendEvent::Finished {
            success, message, ..
        } => {
            assert!(!success);
            assert_eq!(message, "ERROR: fetch blew up");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(recv(&mut event_rx).await, BackendEvent::Idle);

    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(BackendCommand::GetStats(reply_tx))
        .await
        .unwrap();
    let stats = reply_rx.await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.current_index, 1);
}

#[tokio::test]
async fn sequential_queue_runs_jobs_in_order() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("v.mp4");
    std::fs::write(&file, b"media").unwrap();

    let fetcher = Arc::new(ScriptedFetcher::succeeding(
        vec![downloading(100, 100)],
        Some(file.clone()),
    ));
    let (cmd_tx, mut event_rx) =
        spawn_actor(fetcher.clone(), temp.path().to_path_buf(), Quality::Auto);

    cmd_tx
        .send(BackendCommand::AddUrls(vec![
            "https://example.com/1".to_string(),
            "https://example.com/2".to_string(),
        ]))
        .await
        .unwrap();

    let mut finished_urls = Vec::new();
    loop {
        match recv(&mut event_rx).await {
            BackendEvent::Finished { url, success, .. } => {
                assert!(success);
                finished_urls.push(url);
            }
            BackendEvent::Idle => break,
            _ => {}
        }
    }
    assert_eq!(
        finished_urls,
        vec![
            "https://example.com/1".to_string(),
            "https://example.com/2".to_string()
        ]
    );

    // One fetch per job, strictly sequential
    assert_eq!(fetcher.seen_expressions.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn paused_queue_does_not_start_jobs() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("v.mp4");
    std::fs::write(&file, b"media").unwrap();

    let fetcher = Arc::new(ScriptedFetcher::succeeding(
        vec![downloading(100, 100)],
        Some(file.clone()),
    ));
    let (cmd_tx, mut event_rx) = spawn_actor(fetcher, temp.path().to_path_buf(), Quality::Auto);

    cmd_tx.send(BackendCommand::Pause).await.unwrap();
    cmd_tx
        .send(BackendCommand::AddUrl("https://example.com/v".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        recv(&mut event_rx).await,
        BackendEvent::Enqueued { .. }
    ));

    // Nothing should run while paused
    let quiet = tokio::time::timeout(Duration::from_millis(200), event_rx.recv()).await;
    assert!(quiet.is_err(), "no events expected while paused");

    cmd_tx.send(BackendCommand::Resume).await.unwrap();
    match recv(&mut event_rx).await {
        BackendEvent::Progress { .. } | BackendEvent::Finished { .. } => {}
        other => panic!("expected the job to run after resume, got {:?}", other),
    }
}

#[tokio::test]
async fn cancel_aborts_in_flight_job() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(HangingFetcher);
    let (cmd_tx, mut event_rx) = spawn_actor(fetcher, temp.path().to_path_buf(), Quality::Auto);

    cmd_tx
        .send(BackendCommand::AddUrl("https://example.com/v".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        recv(&mut event_rx).await,
        BackendEvent::Enqueued { .. }
    ));

    cmd_tx.send(BackendCommand::CancelCurrent).await.unwrap();
    assert_eq!(
        recv(&mut event_rx).await,
        BackendEvent::Cancelled {
            url: "https://example.com/v".to_string()
        }
    );
    assert_eq!(recv(&mut event_rx).await, BackendEvent::Idle);

    // A second cancel after the terminal result is a no-op
    cmd_tx.send(BackendCommand::CancelCurrent).await.unwrap();
    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(BackendCommand::GetStats(reply_tx))
        .await
        .unwrap();
    let stats = reply_rx.await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.current_index, 1);
}
