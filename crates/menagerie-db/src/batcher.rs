//! Tiered, bounded write batching.
//!
//! Each durability tier owns a [`WriteBatcher`]: a bounded queue in front
//! of a flush loop. Producers call [`WriteBatcher::add`], which never
//! waits. A full queue drops the op and counts the drop; a stopped loop
//! hands the op back so the caller can write it synchronously.
//!
//! The flush loop applies a batch when it reaches the tier's batch size or
//! when the tier's ticker fires, whichever comes first. Every batch is one
//! repository transaction. A failed batch is logged, counted and
//! discarded. Memory-only tiers never touch the repository.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use menagerie_types::{DataPriority, WriteOp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::classifier::{StorageClassifier, TierPolicy};
use crate::error::DbError;
use crate::repository::Repository;

/// Result of queueing one op.
#[derive(Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Accepted into the queue.
    Queued,
    /// Queue was full; the op is gone and the tier's error counter moved.
    Dropped,
    /// The flush loop has stopped; the op is returned to the caller.
    Closed(WriteOp),
}

/// Counters for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    /// Ops flushed successfully.
    pub processed: u64,
    /// Ops dropped because the queue was full.
    pub errors: u64,
    /// Batches that failed to apply.
    pub failed_batches: u64,
    /// When the last batch was flushed.
    pub last_processed: Option<DateTime<Utc>>,
    /// Ops waiting in the queue.
    pub queue_len: usize,
}

#[derive(Debug, Default)]
struct TierCounters {
    processed: AtomicU64,
    errors: AtomicU64,
    failed_batches: AtomicU64,
    last_processed_ms: AtomicI64,
}

impl TierCounters {
    fn record_flush(&self, count: usize) {
        self.processed
            .fetch_add(u64::try_from(count).unwrap_or(u64::MAX), Ordering::Relaxed);
        self.last_processed_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn last_processed(&self) -> Option<DateTime<Utc>> {
        match self.last_processed_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }
}

/// Bounded queue and flush loop for one tier.
#[derive(Debug)]
pub struct WriteBatcher {
    priority: DataPriority,
    policy: TierPolicy,
    tx: mpsc::Sender<WriteOp>,
    rx: Mutex<Option<mpsc::Receiver<WriteOp>>>,
    counters: Arc<TierCounters>,
}

impl WriteBatcher {
    /// Create a batcher. Nothing is flushed until [`WriteBatcher::spawn`].
    pub fn new(priority: DataPriority, policy: TierPolicy) -> Self {
        let (tx, rx) = mpsc::channel(policy.queue_capacity.max(1));
        Self {
            priority,
            policy,
            tx,
            rx: Mutex::new(Some(rx)),
            counters: Arc::new(TierCounters::default()),
        }
    }

    /// The tier this batcher serves.
    pub const fn priority(&self) -> DataPriority {
        self.priority
    }

    /// The tier's policy.
    pub const fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// Queue `op` without waiting.
    pub fn add(&self, op: WriteOp) -> AddOutcome {
        match self.tx.try_send(op) {
            Ok(()) => AddOutcome::Queued,
            Err(TrySendError::Full(op)) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    tier = %self.priority,
                    agent_id = %op.agent_id(),
                    capacity = self.policy.queue_capacity,
                    "Write queue full, dropping op"
                );
                AddOutcome::Dropped
            }
            Err(TrySendError::Closed(op)) => AddOutcome::Closed(op),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> TierStats {
        TierStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            failed_batches: self.counters.failed_batches.load(Ordering::Relaxed),
            last_processed: self.counters.last_processed(),
            queue_len: self.tx.max_capacity().saturating_sub(self.tx.capacity()),
        }
    }

    /// Start the flush loop on `tracker`. Returns `false` if it was
    /// already started.
    pub fn spawn(&self, repository: Repository, tracker: &TaskTracker, token: CancellationToken) -> bool {
        let Some(rx) = self.rx.lock().ok().and_then(|mut slot| slot.take()) else {
            tracing::warn!(tier = %self.priority, "Flush loop already started");
            return false;
        };

        let flusher = Flusher {
            priority: self.priority,
            policy: self.policy,
            repository,
            counters: Arc::clone(&self.counters),
        };
        tracker.spawn(flusher.run(rx, token));
        true
    }
}

struct Flusher {
    priority: DataPriority,
    policy: TierPolicy,
    repository: Repository,
    counters: Arc<TierCounters>,
}

impl Flusher {
    async fn run(self, mut rx: mpsc::Receiver<WriteOp>, token: CancellationToken) {
        let batch_size = self.policy.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut ticker = tokio::time::interval(self.policy.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::debug!(
            tier = %self.priority,
            batch_size,
            flush_interval_ms = u64::try_from(self.policy.flush_interval.as_millis()).unwrap_or(u64::MAX),
            "Flush loop started"
        );

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                received = rx.recv() => {
                    let Some(op) = received else { break };
                    batch.push(op);
                    if batch.len() >= batch_size {
                        self.flush(&mut batch).await;
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }
        }

        rx.close();
        while let Ok(op) = rx.try_recv() {
            batch.push(op);
        }
        if !batch.is_empty() {
            self.flush(&mut batch).await;
        }
        tracing::debug!(tier = %self.priority, "Flush loop stopped");
    }

    async fn flush(&self, batch: &mut Vec<WriteOp>) {
        let count = batch.len();
        if self.policy.layers.persists() {
            match self.repository.apply_batch(batch).await {
                Ok(()) => {
                    self.counters.record_flush(count);
                    tracing::debug!(tier = %self.priority, count, "Flushed write batch");
                }
                Err(e) => {
                    self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        tier = %self.priority,
                        count,
                        error = %e,
                        "Write batch failed, discarding"
                    );
                }
            }
        } else {
            self.counters.record_flush(count);
        }
        batch.clear();
    }
}

/// Counters for every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Critical tier.
    pub critical: TierStats,
    /// Important tier.
    pub important: TierStats,
    /// Transient tier.
    pub transient: TierStats,
}

/// The three tier batchers plus the repository they flush into.
#[derive(Debug)]
pub struct WritePipeline {
    classifier: StorageClassifier,
    repository: Repository,
    critical: WriteBatcher,
    important: WriteBatcher,
    transient: WriteBatcher,
}

impl WritePipeline {
    /// Build one batcher per tier using the classifier's policies.
    pub fn new(classifier: StorageClassifier, repository: Repository) -> Self {
        let batcher = |p| WriteBatcher::new(p, classifier.policy_for(p));
        Self {
            critical: batcher(DataPriority::Critical),
            important: batcher(DataPriority::Important),
            transient: batcher(DataPriority::Transient),
            classifier,
            repository,
        }
    }

    /// The classifier the pipeline was built with.
    pub const fn classifier(&self) -> &StorageClassifier {
        &self.classifier
    }

    /// The batcher for `priority`.
    pub const fn batcher(&self, priority: DataPriority) -> &WriteBatcher {
        match priority {
            DataPriority::Critical => &self.critical,
            DataPriority::Important => &self.important,
            DataPriority::Transient => &self.transient,
        }
    }

    /// Start every flush loop.
    pub fn start(&self, tracker: &TaskTracker, token: &CancellationToken) {
        for priority in DataPriority::ALL {
            self.batcher(priority)
                .spawn(self.repository.clone(), tracker, token.child_token());
        }
        tracing::info!(backend = self.repository.name(), "Write pipeline started");
    }

    /// Queue `op` on the tier for `priority` without waiting.
    ///
    /// A dropped op is counted by the tier and not reported. If the tier's
    /// loop has stopped and the tier persists, the op is handed back for
    /// [`WritePipeline::write_through`].
    pub fn enqueue(&self, priority: DataPriority, op: WriteOp) -> Option<WriteOp> {
        let batcher = self.batcher(priority);
        match batcher.add(op) {
            AddOutcome::Queued | AddOutcome::Dropped => None,
            AddOutcome::Closed(op) => batcher.policy().layers.persists().then_some(op),
        }
    }

    /// Write ops straight to the repository, bypassing every batcher.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn write_through(&self, ops: &[WriteOp]) -> Result<(), DbError> {
        if ops.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = ops.len(), "Batcher closed, writing synchronously");
        self.repository.apply_batch(ops).await
    }

    /// Queue `op`, falling back to a synchronous write once the tier's
    /// loop has stopped.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] only from the synchronous fallback write.
    pub async fn submit(&self, priority: DataPriority, op: WriteOp) -> Result<(), DbError> {
        match self.enqueue(priority, op) {
            Some(op) => self.write_through(std::slice::from_ref(&op)).await,
            None => Ok(()),
        }
    }

    /// Counters for every tier.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            critical: self.critical.stats(),
            important: self.important.stats(),
            transient: self.transient.stats(),
        }
    }
}
