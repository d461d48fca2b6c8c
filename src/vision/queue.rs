//! One-at-a-time request scheduling
//!
//! A single worker task drains a FIFO of jobs. The next job starts no sooner
//! than `min_interval` after the previous one finished, and the worker pauses
//! for `settle_delay` after every job before looking at the queue again.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::OcrError;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// FIFO scheduler enforcing spacing between vision requests
pub struct RequestSerializer {
    tx: mpsc::UnboundedSender<Job>,
    depth: Arc<AtomicUsize>,
}

impl RequestSerializer {
    /// Start the worker. Must be called inside a Tokio runtime.
    pub fn new(min_interval: Duration, settle_delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run_worker(rx, depth.clone(), min_interval, settle_delay));

        Self { tx, depth }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.min_interval(), config.settle_delay())
    }

    /// Queue a task and wait for its result
    ///
    /// The task is queued when this is called, not when the returned future
    /// is first polled, so call order is execution order. A failing or
    /// panicking task only affects its own result.
    pub fn execute<T, F>(&self, task: F) -> impl Future<Output = Result<T, OcrError>> + Send + 'static
    where
        F: Future<Output = Result<T, OcrError>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // Receiver may be gone if the caller stopped waiting
            let _ = done_tx.send(task.await);
        });

        self.depth.fetch_add(1, Ordering::SeqCst);
        let queued = self.tx.send(job).is_ok();
        if !queued {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }

        async move {
            if !queued {
                return Err(OcrError::Queue("request worker has stopped".to_string()));
            }
            done_rx
                .await
                .map_err(|_| OcrError::Queue("request ended without a result".to_string()))?
        }
    }

    /// Tasks waiting or running
    pub fn queue_len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Job>,
    depth: Arc<AtomicUsize>,
    min_interval: Duration,
    settle_delay: Duration,
) {
    let mut last_finish: Option<Instant> = None;

    while let Some(job) = rx.recv().await {
        if let Some(finished) = last_finish {
            tokio::time::sleep_until(finished + min_interval).await;
        }

        debug!("Starting queued request ({} in queue)", depth.load(Ordering::SeqCst));

        // Spawned so a panic stays inside the task
        if let Err(e) = tokio::spawn(job).await {
            warn!("Queued request aborted: {}", e);
        }

        depth.fetch_sub(1, Ordering::SeqCst);
        last_finish = Some(Instant::now());

        tokio::time::sleep(settle_delay).await;
    }

    debug!("Request queue closed");
}
