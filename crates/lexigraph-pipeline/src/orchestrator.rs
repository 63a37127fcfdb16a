//! Batch orchestrator
//!
//! Two-level concurrency: items are split into fixed-size batches, each batch
//! runs on one worker task (at most `num_workers` at a time), and inside a
//! worker up to `num_threads_per_worker` items are in flight. Per-item outcomes
//! flow back over a channel and are joined into a [`BatchReport`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use lexigraph_config::BatchConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};

/// Work driven by the orchestrator
#[async_trait]
pub trait BatchUnit: Send + Sync + 'static {
    type Item: Send + Sync + 'static;
    /// Shared by every item of one batch
    type Context: Send + Sync + 'static;
    type Output: Send + 'static;

    fn item_id(&self, item: &Self::Item) -> String;

    /// Runs once per batch before its items
    async fn prepare(&self, batch: &[Self::Item]) -> PipelineResult<Self::Context>;

    async fn process(
        &self,
        item: &Self::Item,
        context: &Self::Context,
    ) -> PipelineResult<Self::Output>;
}

// ============================================================================
// Progress and reports
// ============================================================================

/// Live completed/total counters; clones share the same counters
///
/// Once a run returns, `completed == total` whether it finished, failed or
/// was cut short.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    completed: Arc<AtomicUsize>,
    skipped: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl Progress {
    /// Items resolved so far: succeeded, failed or skipped
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Items never started because the run stopped early
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Items queued so far
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn queue(&self, count: usize) {
        self.total.fetch_add(count, Ordering::SeqCst);
    }

    fn complete_one(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn skip_one(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.complete_one();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub item_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T> {
    /// Outputs in input order
    pub succeeded: Vec<T>,
    pub failed: Vec<FailedItem>,
    /// Items never started because the run stopped early
    pub skipped: Vec<String>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

enum ItemOutcome<T> {
    Succeeded { index: usize, output: T },
    Failed { index: usize, item: FailedItem },
    Skipped { index: usize, item_id: String },
}

// ============================================================================
// BatchOrchestrator
// ============================================================================

pub struct BatchOrchestrator {
    config: BatchConfig,
    progress: Progress,
}

impl BatchOrchestrator {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            progress: Progress::default(),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Handle to the live progress counters
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Run `unit` over `items`
    ///
    /// Per-item failures land in the report. A fatal error stops the run and
    /// is returned; with `continue_on_error` off the first failure stops
    /// scheduling and the run returns [`PipelineError::Aborted`].
    pub async fn run<U: BatchUnit>(
        &self,
        unit: Arc<U>,
        items: Vec<U::Item>,
    ) -> PipelineResult<BatchReport<U::Output>> {
        let start = Instant::now();
        let total = items.len();
        self.progress.queue(total);

        let batch_size = self.config.batch_size.max(1);
        let mut batches: Vec<Vec<(usize, U::Item)>> = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            if index % batch_size == 0 {
                batches.push(Vec::with_capacity(batch_size));
            }
            if let Some(batch) = batches.last_mut() {
                batch.push((index, item));
            }
        }
        info!(
            items = total,
            batches = batches.len(),
            workers = self.config.num_workers,
            "starting batch run"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<ItemOutcome<U::Output>>();
        let semaphore = Arc::new(Semaphore::new(self.config.num_workers.max(1)));
        let abort = Arc::new(AtomicBool::new(false));
        let mut workers: JoinSet<PipelineResult<()>> = JoinSet::new();

        for (batch_index, batch) in batches.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?;

            if abort.load(Ordering::SeqCst) {
                drop(permit);
                for (index, item) in &batch {
                    self.progress.skip_one();
                    let _ = tx.send(ItemOutcome::Skipped {
                        index: *index,
                        item_id: unit.item_id(item),
                    });
                }
                continue;
            }

            let worker = Worker {
                unit: unit.clone(),
                threads: self.config.num_threads_per_worker.max(1),
                continue_on_error: self.config.continue_on_error,
                abort: abort.clone(),
                progress: self.progress.clone(),
                tx: tx.clone(),
            };
            workers.spawn(async move {
                let result = worker.run_batch(batch_index, batch).await;
                drop(permit);
                result
            });
        }
        drop(tx);

        let mut fatal: Option<PipelineError> = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined.map_err(|e| PipelineError::Worker(e.to_string()));
            if let Err(e) = result.and_then(|r| r) {
                if fatal.is_none() {
                    fatal = Some(e);
                }
            }
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();
        while let Some(outcome) = rx.recv().await {
            match outcome {
                ItemOutcome::Succeeded { index, output } => succeeded.push((index, output)),
                ItemOutcome::Failed { index, item } => failed.push((index, item)),
                ItemOutcome::Skipped { index, item_id } => skipped.push((index, item_id)),
            }
        }
        succeeded.sort_by_key(|(index, _)| *index);
        failed.sort_by_key(|(index, _)| *index);
        skipped.sort_by_key(|(index, _)| *index);

        if let Some(e) = fatal {
            error!(error = %e, "batch run stopped by fatal error");
            return Err(e);
        }

        let report = BatchReport {
            succeeded: succeeded.into_iter().map(|(_, o)| o).collect(),
            failed: failed.into_iter().map(|(_, f)| f).collect(),
            skipped: skipped.into_iter().map(|(_, id)| id).collect(),
        };

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch run finished"
        );

        if !self.config.continue_on_error {
            if let Some(first) = report.failed.first() {
                return Err(PipelineError::Aborted {
                    item_id: first.item_id.clone(),
                    reason: first.error.clone(),
                    completed: report.succeeded.len(),
                });
            }
        }
        Ok(report)
    }
}

struct Worker<U: BatchUnit> {
    unit: Arc<U>,
    threads: usize,
    continue_on_error: bool,
    abort: Arc<AtomicBool>,
    progress: Progress,
    tx: mpsc::UnboundedSender<ItemOutcome<U::Output>>,
}

impl<U: BatchUnit> Worker<U> {
    async fn run_batch(self, batch_index: usize, batch: Vec<(usize, U::Item)>) -> PipelineResult<()> {
        let (indices, items): (Vec<usize>, Vec<U::Item>) = batch.into_iter().unzip();
        debug!(batch = batch_index, items = items.len(), "worker picked up batch");

        let context = match self.unit.prepare(&items).await {
            Ok(context) => context,
            Err(e) if e.is_fatal() => {
                self.abort.store(true, Ordering::SeqCst);
                for (index, item) in indices.iter().zip(&items) {
                    self.progress.skip_one();
                    let _ = self.tx.send(ItemOutcome::Skipped {
                        index: *index,
                        item_id: self.unit.item_id(item),
                    });
                }
                return Err(e);
            }
            Err(e) => {
                warn!(batch = batch_index, error = %e, "batch preparation failed");
                if !self.continue_on_error {
                    self.abort.store(true, Ordering::SeqCst);
                }
                for (index, item) in indices.iter().zip(&items) {
                    self.progress.complete_one();
                    let _ = self.tx.send(ItemOutcome::Failed {
                        index: *index,
                        item: FailedItem {
                            item_id: self.unit.item_id(item),
                            error: e.to_string(),
                        },
                    });
                }
                return Ok(());
            }
        };

        let pending: Vec<BoxFuture<'_, Option<PipelineError>>> = indices
            .iter()
            .zip(&items)
            .map(|(index, item)| self.process_item(*index, item, &context).boxed())
            .collect();
        let fatal: Vec<PipelineError> = stream::iter(pending)
            .buffer_unordered(self.threads)
            .filter_map(future::ready)
            .collect()
            .await;

        match fatal.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Returns the error only when it is fatal
    async fn process_item(
        &self,
        index: usize,
        item: &U::Item,
        context: &U::Context,
    ) -> Option<PipelineError> {
        let item_id = self.unit.item_id(item);
        if self.abort.load(Ordering::SeqCst) {
            self.progress.skip_one();
            let _ = self.tx.send(ItemOutcome::Skipped { index, item_id });
            return None;
        }

        match self.unit.process(item, context).await {
            Ok(output) => {
                self.progress.complete_one();
                let _ = self.tx.send(ItemOutcome::Succeeded { index, output });
                None
            }
            Err(e) if e.is_fatal() => {
                self.abort.store(true, Ordering::SeqCst);
                self.progress.complete_one();
                error!(item_id = %item_id, error = %e, "fatal error");
                Some(e)
            }
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "item failed");
                if !self.continue_on_error {
                    self.abort.store(true, Ordering::SeqCst);
                }
                self.progress.complete_one();
                let _ = self.tx.send(ItemOutcome::Failed {
                    index,
                    item: FailedItem {
                        item_id,
                        error: e.to_string(),
                    },
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexigraph_core::ModelError;
    use std::time::Duration;

    /// Squares numbers; fails on `fail_on`, fatally on `fatal_on`
    struct Squarer {
        fail_on: Option<u64>,
        fatal_on: Option<u64>,
        prepared: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Squarer {
        fn new() -> Self {
            Self {
                fail_on: None,
                fatal_on: None,
                prepared: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BatchUnit for Squarer {
        type Item = u64;
        type Context = ();
        type Output = u64;

        fn item_id(&self, item: &u64) -> String {
            item.to_string()
        }

        async fn prepare(&self, _batch: &[u64]) -> PipelineResult<()> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn process(&self, item: &u64, _context: &()) -> PipelineResult<u64> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if Some(*item) == self.fatal_on {
                return Err(ModelError::PermissionDenied("denied".into()).into());
            }
            if Some(*item) == self.fail_on {
                return Err(ModelError::Transient("flaky".into()).into());
            }
            Ok(item * item)
        }
    }

    fn config(workers: usize, batch_size: usize, threads: usize, continue_on_error: bool) -> BatchConfig {
        BatchConfig {
            num_workers: workers,
            batch_size,
            num_threads_per_worker: threads,
            continue_on_error,
        }
    }

    #[tokio::test]
    async fn test_outputs_in_input_order() {
        let orchestrator = BatchOrchestrator::new(config(2, 3, 2, true));
        let unit = Arc::new(Squarer::new());

        let report = orchestrator.run(unit.clone(), (1..=10).collect()).await.unwrap();

        assert_eq!(report.succeeded, vec![1, 4, 9, 16, 25, 36, 49, 64, 81, 100]);
        assert!(report.is_success());
        // 10 items in batches of 3
        assert_eq!(unit.prepared.load(Ordering::SeqCst), 4);
        assert_eq!(orchestrator.progress().completed(), 10);
        assert_eq!(orchestrator.progress().total(), 10);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let orchestrator = BatchOrchestrator::new(config(2, 4, 2, true));
        let unit = Arc::new(Squarer::new());

        orchestrator.run(unit.clone(), (1..=16).collect()).await.unwrap();

        assert!(unit.max_in_flight.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_failures_are_collected() {
        let orchestrator = BatchOrchestrator::new(config(2, 2, 2, true));
        let unit = Arc::new(Squarer {
            fail_on: Some(3),
            ..Squarer::new()
        });

        let report = orchestrator.run(unit, (1..=5).collect()).await.unwrap();

        assert_eq!(report.succeeded, vec![1, 4, 16, 25]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].item_id, "3");
        assert!(report.failed[0].error.contains("flaky"));
    }

    #[tokio::test]
    async fn test_abort_without_continue_on_error() {
        let orchestrator = BatchOrchestrator::new(config(1, 1, 1, false));
        let unit = Arc::new(Squarer {
            fail_on: Some(2),
            ..Squarer::new()
        });

        let err = orchestrator.run(unit, (1..=5).collect()).await.unwrap_err();

        match err {
            PipelineError::Aborted {
                item_id, completed, ..
            } => {
                assert_eq!(item_id, "2");
                assert_eq!(completed, 1);
            }
            other => panic!("expected abort, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_progress_settles_after_abort() {
        let orchestrator = BatchOrchestrator::new(config(1, 2, 1, false));
        let unit = Arc::new(Squarer {
            fail_on: Some(2),
            ..Squarer::new()
        });

        orchestrator.run(unit, (1..=6).collect()).await.unwrap_err();

        let progress = orchestrator.progress();
        assert_eq!(progress.total(), 6);
        assert_eq!(progress.completed(), 6);
        // items 3..=6 never started
        assert_eq!(progress.skipped(), 4);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_run() {
        let orchestrator = BatchOrchestrator::new(config(1, 1, 1, true));
        let unit = Arc::new(Squarer {
            fatal_on: Some(2),
            ..Squarer::new()
        });

        let err = orchestrator.run(unit, (1..=5).collect()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let orchestrator = BatchOrchestrator::new(BatchConfig::default());
        let report = orchestrator
            .run(Arc::new(Squarer::new()), Vec::new())
            .await
            .unwrap();
        assert!(report.succeeded.is_empty());
        assert!(report.is_success());
    }
}
