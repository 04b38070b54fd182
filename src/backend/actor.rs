//! Backend actor: owns all queue state and sequences job execution
//!
//! A single-consumer loop in the spirit of a command/event bridge: front
//! ends send [`BackendCommand`]s in, the actor owns the [`QueueManager`]
//! and at most one in-flight [`JobRunner`] task, and caller-facing
//! [`BackendEvent`]s flow out. Worker tasks never mutate queue state;
//! their progress and terminal results are marshaled onto this loop.

use super::messages::{BackendCommand, BackendEvent};
use crate::fetcher::Quality;
use crate::queue::{JobState, QueueManager};
use crate::runner::{JobOutcome, JobRunner, ProgressUpdate};
use crate::utils::error::VidloaderError;
use crate::utils::sanitize::validate_url;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Events marshaled from the worker task onto the actor loop
#[derive(Debug)]
enum WorkerEvent {
    Progress(ProgressUpdate),
    Done(JobOutcome),
}

/// What the actor loop selected on this iteration
enum Step {
    Command(Option<BackendCommand>),
    Worker(WorkerEvent),
}

/// Handle to the single in-flight job
struct ActiveJob {
    url: String,
    cancel: CancellationToken,
    events: mpsc::Receiver<WorkerEvent>,
}

pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    sender: mpsc::Sender<BackendEvent>,
    runner: Arc<JobRunner>,
    output_dir: PathBuf,
    quality: Quality,
    queue: QueueManager,
    active: Option<ActiveJob>,
}

impl BackendActor {
    pub fn new(
        runner: Arc<JobRunner>,
        output_dir: PathBuf,
        quality: Quality,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Self {
        Self {
            receiver,
            sender,
            runner,
            output_dir,
            quality,
            queue: QueueManager::new(),
            active: None,
        }
    }

    pub async fn run(mut self) {
        info!("Backend actor started");
        loop {
            // Branch futures borrow disjoint fields; handling happens
            // after the select so it can take the whole actor mutably
            let step = tokio::select! {
                maybe_cmd = self.receiver.recv() => Step::Command(maybe_cmd),
                event = Self::next_worker_event(&mut self.active) => Step::Worker(event),
            };
            match step {
                Step::Command(Some(BackendCommand::Shutdown)) | Step::Command(None) => {
                    if let Some(active) = &self.active {
                        active.cancel.cancel();
                    }
                    break;
                }
                Step::Command(Some(cmd)) => self.handle_command(cmd).await,
                Step::Worker(event) => self.handle_worker_event(event).await,
            }
        }
        info!("Backend actor stopped");
    }

    /// Resolves only while a job is in flight; a closed worker channel
    /// without a terminal result is treated as a failure.
    async fn next_worker_event(active: &mut Option<ActiveJob>) -> WorkerEvent {
        match active {
            Some(job) => match job.events.recv().await {
                Some(event) => event,
                None => WorkerEvent::Done(JobOutcome::Failed(
                    "worker terminated unexpectedly".to_string(),
                )),
            },
            None => std::future::pending().await,
        }
    }

    async fn handle_command(&mut self, cmd: BackendCommand) {
        match cmd {
            BackendCommand::AddUrl(url) => {
                self.submit_url(&url, true).await;
                self.maybe_start().await;
            }
            BackendCommand::AddUrls(urls) => {
                for url in &urls {
                    self.submit_url(url, false).await;
                }
                self.maybe_start().await;
            }
            BackendCommand::RemoveItem(index) => {
                let removing_active =
                    self.active.is_some() && index == self.queue.current_index();
                if removing_active {
                    // Removing the active job implies cancelling it first
                    if let Some(active) = &self.active {
                        active.cancel.cancel();
                    }
                }
                if !self.queue.remove_item(index) {
                    debug!("Remove rejected, index {} out of bounds", index);
                }
            }
            BackendCommand::ClearQueue => {
                if let Some(active) = &self.active {
                    active.cancel.cancel();
                }
                self.queue.clear();
            }
            BackendCommand::Pause => {
                self.queue.pause();
            }
            BackendCommand::Resume => {
                self.queue.resume();
                self.maybe_start().await;
            }
            BackendCommand::CancelCurrent => {
                if let Some(active) = &self.active {
                    // The worker reports Cancelled once the process is down
                    active.cancel.cancel();
                    self.queue.cancel_current();
                } else if let Some(job) = self.queue.get_current() {
                    let url = job.url.clone();
                    self.queue.cancel_current();
                    let _ = self.sender.send(BackendEvent::Cancelled { url }).await;
                    self.queue.next();
                    self.maybe_start().await;
                }
            }
            BackendCommand::GetStats(reply) => {
                let _ = reply.send(self.queue.get_stats());
            }
            BackendCommand::Shutdown => unreachable!("handled in run loop"),
        }
    }

    /// Validate and enqueue one URL. Rejections are only reported for
    /// single submissions; batch submissions skip bad entries silently.
    async fn submit_url(&mut self, url: &str, report_rejects: bool) {
        let url = url.trim();
        if !validate_url(url) {
            warn!("Rejected invalid URL: {}", url);
            if report_rejects {
                let _ = self
                    .sender
                    .send(BackendEvent::Rejected {
                        url: url.to_string(),
                        reason: VidloaderError::InvalidUrl(
                            "must start with http:// or https://".to_string(),
                        )
                        .to_string(),
                    })
                    .await;
            }
            return;
        }
        if self.queue.add_url(url) {
            info!("Enqueued {}", url);
            let _ = self
                .sender
                .send(BackendEvent::Enqueued {
                    url: url.to_string(),
                })
                .await;
        } else {
            debug!("Duplicate URL skipped: {}", url);
            if report_rejects {
                let _ = self
                    .sender
                    .send(BackendEvent::Rejected {
                        url: url.to_string(),
                        reason: "URL is already in the queue".to_string(),
                    })
                    .await;
            }
        }
    }

    /// Start the job at the cursor when idle and not paused.
    /// Terminal jobs at the cursor are skipped over first.
    async fn maybe_start(&mut self) {
        if self.active.is_some() || self.queue.is_paused() {
            return;
        }

        while self
            .queue
            .get_current()
            .map(|job| job.state.is_terminal())
            .unwrap_or(false)
        {
            self.queue.next();
        }

        let job_url = match self.queue.get_current() {
            Some(job) if job.state == JobState::Pending => job.url.clone(),
            _ => {
                if self.queue.get_current().is_none() {
                    let _ = self.sender.send(BackendEvent::Idle).await;
                }
                return;
            }
        };

        let cancel = CancellationToken::new();
        let (worker_tx, worker_rx) = mpsc::channel::<WorkerEvent>(32);
        let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressUpdate>(32);

        // Forward runner progress into the worker event stream
        let forward_tx = worker_tx.clone();
        let forward_handle = tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                if forward_tx.send(WorkerEvent::Progress(update)).await.is_err() {
                    break;
                }
            }
        });

        let runner = Arc::clone(&self.runner);
        let url = job_url.clone();
        let output_dir = self.output_dir.clone();
        let quality = self.quality;
        let job_cancel = cancel.clone();
        tokio::spawn(async move {
            let outcome = runner
                .execute(&url, &output_dir, quality, progress_tx, job_cancel)
                .await;
            // The progress sender is gone once execute returns; waiting for
            // the forwarder keeps Done strictly after every Progress
            let _ = forward_handle.await;
            let _ = worker_tx.send(WorkerEvent::Done(outcome)).await;
        });

        debug!("Started job for {}", job_url);
        self.active = Some(ActiveJob {
            url: job_url,
            cancel,
            events: worker_rx,
        });
    }

    async fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress(update) => {
                let Some(active) = &self.active else { return };
                let url = active.url.clone();
                if self
                    .queue
                    .get_current()
                    .map(|j| j.url == url)
                    .unwrap_or(false)
                {
                    self.queue.update_current(update.percent, &update.text);
                }
                let _ = self
                    .sender
                    .send(BackendEvent::Progress {
                        url,
                        percent: update.percent,
                        text: update.text,
                    })
                    .await;
            }
            WorkerEvent::Done(outcome) => {
                let Some(active) = self.active.take() else { return };
                let cursor_matches = self
                    .queue
                    .get_current()
                    .map(|j| j.url == active.url)
                    .unwrap_or(false);

                match outcome {
                    JobOutcome::Completed(path) => {
                        let message = path.display().to_string();
                        if cursor_matches {
                            self.queue.mark_current_completed();
                            self.queue.next();
                        }
                        let _ = self
                            .sender
                            .send(BackendEvent::Finished {
                                url: active.url,
                                success: true,
                                message,
                            })
                            .await;
                    }
                    JobOutcome::Failed(message) => {
                        if cursor_matches {
                            self.queue.mark_current_failed(&message);
                            self.queue.next();
                        }
                        let _ = self
                            .sender
                            .send(BackendEvent::Finished {
                                url: active.url,
                                success: false,
                                message,
                            })
                            .await;
                    }
                    JobOutcome::Cancelled => {
                        if cursor_matches {
                            self.queue.cancel_current();
                            self.queue.next();
                        }
                        let _ = self
                            .sender
                            .send(BackendEvent::Cancelled { url: active.url })
                            .await;
                    }
                }

                self.maybe_start().await;
            }
        }
    }
}
