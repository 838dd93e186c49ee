//! Write-behind queue for swipe history and preference records.
//!
//! Producers never wait on storage. Jobs go into a bounded channel; when it is full
//! the job is dropped and counted. A single worker coalesces everything that arrives
//! within the flush delay into one batch, retries transient failures and counts
//! writes that still fail. On shutdown the worker drains whatever is queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    db::{PreferenceRepository, SwipeHistoryStore},
    error::AppResult,
    models::{PreferenceRecord, SwipeHistoryEntry},
};

const RETRY_BASE_DELAY_MS: u64 = 100;

#[derive(Debug, Clone)]
pub enum PersistJob {
    Swipe(SwipeHistoryEntry),
    Preferences {
        user_id: String,
        records: Vec<PreferenceRecord>,
    },
}

#[derive(Debug, Default)]
struct QueueStats {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub capacity: usize,
    pub flush_delay: Duration,
    pub max_retries: u32,
}

/// Producer side of the queue, cheap to clone
#[derive(Clone)]
pub struct PersistenceQueue {
    sender: mpsc::Sender<PersistJob>,
    stats: Arc<QueueStats>,
}

/// Handle for gracefully shutting down the persistence worker
pub struct PersistenceWorkerHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PersistenceWorkerHandle {
    /// Signals the worker and waits until queued jobs are flushed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Persistence worker panicked during shutdown");
        }
        tracing::info!("Persistence worker stopped");
    }
}

struct Writer {
    history: Arc<dyn SwipeHistoryStore>,
    preferences: Arc<dyn PreferenceRepository>,
    stats: Arc<QueueStats>,
    max_retries: u32,
}

impl PersistenceQueue {
    /// Spawns the worker task and returns the producer plus its shutdown handle
    pub fn spawn(
        history: Arc<dyn SwipeHistoryStore>,
        preferences: Arc<dyn PreferenceRepository>,
        settings: QueueSettings,
    ) -> (Self, PersistenceWorkerHandle) {
        let (sender, receiver) = mpsc::channel(settings.capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(QueueStats::default());

        let writer = Writer {
            history,
            preferences,
            stats: stats.clone(),
            max_retries: settings.max_retries,
        };
        let task = tokio::spawn(writer.run(receiver, shutdown_rx, settings.flush_delay));

        (
            Self { sender, stats },
            PersistenceWorkerHandle { shutdown_tx, task },
        )
    }

    /// Enqueues without waiting. Returns false when the job was dropped.
    pub fn enqueue(&self, job: PersistJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Persistence queue full, dropping write");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Persistence worker stopped, dropping write");
                false
            }
        }
    }

    pub fn written(&self) -> u64 {
        self.stats.written.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

impl Writer {
    async fn run(
        self,
        mut receiver: mpsc::Receiver<PersistJob>,
        mut shutdown_rx: oneshot::Receiver<()>,
        flush_delay: Duration,
    ) {
        tracing::info!("Persistence worker started");

        loop {
            let first = tokio::select! {
                job = receiver.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
                _ = &mut shutdown_rx => {
                    self.drain(&mut receiver).await;
                    return;
                }
            };

            // Coalesce rapid consecutive swipes into one flush
            let mut batch = vec![first];
            let window = tokio::time::sleep(flush_delay);
            tokio::pin!(window);
            let mut stopping = false;

            loop {
                tokio::select! {
                    _ = &mut window => break,
                    job = receiver.recv() => match job {
                        Some(job) => batch.push(job),
                        None => {
                            stopping = true;
                            break;
                        }
                    },
                    _ = &mut shutdown_rx => {
                        stopping = true;
                        break;
                    }
                }
            }

            if stopping {
                receiver.close();
                while let Ok(job) = receiver.try_recv() {
                    batch.push(job);
                }
                self.flush(batch).await;
                break;
            }

            self.flush(batch).await;
        }

        tracing::info!("Persistence worker exiting");
    }

    async fn drain(&self, receiver: &mut mpsc::Receiver<PersistJob>) {
        receiver.close();
        let mut batch = Vec::new();
        while let Ok(job) = receiver.try_recv() {
            batch.push(job);
        }
        tracing::info!(pending = batch.len(), "Persistence worker flushing before shutdown");
        self.flush(batch).await;
    }

    async fn flush(&self, batch: Vec<PersistJob>) {
        if batch.is_empty() {
            return;
        }

        let mut swipes = Vec::new();
        let mut records: HashMap<String, Vec<PreferenceRecord>> = HashMap::new();
        for job in batch {
            match job {
                PersistJob::Swipe(entry) => swipes.push(entry),
                PersistJob::Preferences {
                    user_id,
                    records: user_records,
                } => records.entry(user_id).or_default().extend(user_records),
            }
        }

        tracing::debug!(swipes = swipes.len(), users = records.len(), "Flushing persistence batch");

        for entry in &swipes {
            let result = self.with_retry(|| self.history.append(entry)).await;
            self.settle(result, "swipe history", &entry.user_id);
        }

        for (user_id, user_records) in &records {
            let result = self
                .with_retry(|| self.preferences.save(user_id, user_records))
                .await;
            self.settle(result, "preference records", user_id);
        }
    }

    async fn with_retry<F, Fut>(&self, mut write: F) -> AppResult<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = AppResult<()>>,
    {
        let mut attempt = 0;
        loop {
            match write().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = RETRY_BASE_DELAY_MS * 2_u64.pow(attempt);
                    tracing::debug!(error = %e, attempt, "Retrying persistence write");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn settle(&self, result: AppResult<()>, what: &str, user_id: &str) {
        match result {
            Ok(()) => {
                self.stats.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, user_id, kind = what, "Persistence write failed");
            }
        }
    }
}
