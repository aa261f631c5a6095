//! Batch scheduling
//!
//! A fixed pool of scoped worker threads drains one queue per batch. Taking the
//! next item is the only operation that needs mutual exclusion: once an item
//! is dequeued it belongs to that worker until its result is written back.
//! The pool is joined at the end of the scope, so `run` blocks until every
//! worker observed an empty queue.

use crate::aggregator::AggregationError;
use crate::metadata_retrieval::{Artwork, MetadataRecord, ProviderError, Trailer};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that fail the processing of a single item
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The search request failed
    #[error("Search failed: {0}")]
    Search(#[source] ProviderError),

    /// The metadata record could not be assembled
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    /// A configured provider id is not registered
    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    /// Processing panicked
    #[error("Processing panicked: {0}")]
    Panicked(String),
}

/// One media entity queued for scraping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Display name used as the search query
    pub name: String,
    /// External (IMDb) id hint
    #[serde(default)]
    pub external_id: Option<String>,
    /// Release year hint
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub metadata: Option<MetadataRecord>,
    #[serde(default)]
    pub artwork: Vec<Artwork>,
    #[serde(default)]
    pub trailers: Vec<Trailer>,
}

impl WorkItem {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_year(mut self, year: Option<u32>) -> Self {
        self.year = year;
        self
    }

    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }

    fn apply(&mut self, result: ScrapeResult) {
        self.metadata = Some(result.metadata);
        self.artwork = result.artwork;
        self.trailers = result.trailers;
    }
}

/// Everything scraped for one item
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResult {
    pub metadata: MetadataRecord,
    pub artwork: Vec<Artwork>,
    pub trailers: Vec<Trailer>,
}

/// Why an item was left unscraped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoMatch,
    Ambiguous { perfect_matches: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoMatch => write!(f, "no match"),
            SkipReason::Ambiguous { perfect_matches } => {
                write!(f, "ambiguous ({} perfect matches)", perfect_matches)
            }
        }
    }
}

/// Successful result of processing one item
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    Scraped(ScrapeResult),
    Skipped(SkipReason),
}

/// Final state of one item after a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Scraped,
    Skipped { reason: SkipReason },
    Failed { error: String },
    Cancelled,
}

/// The per-item work a batch runs
///
/// Processors only read the item; the scheduler writes a successful result
/// back, so a failed or panicking item is returned untouched.
pub trait ItemProcessor: Sync {
    fn process(&self, item: &WorkItem) -> Result<Processed, ScrapeError>;
}

impl<F> ItemProcessor for F
where
    F: Fn(&WorkItem) -> Result<Processed, ScrapeError> + Sync,
{
    fn process(&self, item: &WorkItem) -> Result<Processed, ScrapeError> {
        self(item)
    }
}

/// Per-outcome counts of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub scraped: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Progress event emitted while a batch runs
///
/// Events come from worker threads; their order across items is not defined.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The batch started
    Started { total: usize, workers: usize },

    /// A worker dequeued an item; `progress` is the dequeued share in [0, 1]
    ItemTaken {
        index: usize,
        name: String,
        progress: f32,
    },

    ItemScraped {
        index: usize,
        name: String,
        title: String,
    },

    ItemSkipped {
        index: usize,
        name: String,
        reason: SkipReason,
    },

    ItemFailed {
        index: usize,
        name: String,
        error: String,
    },

    /// Cancellation drained items that were still pending
    Cancelled { remaining: usize },

    /// The batch finished
    Complete { summary: BatchSummary },
}

/// One item of a finished batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub item: WorkItem,
    pub outcome: ItemOutcome,
}

/// Result of a batch: every input item in its original order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn into_items(self) -> Vec<WorkItem> {
        self.entries.into_iter().map(|entry| entry.item).collect()
    }
}

struct SharedQueue {
    pending: Mutex<VecDeque<(usize, WorkItem)>>,
    drained: Mutex<Vec<(usize, WorkItem)>>,
    cancelled: AtomicBool,
}

impl SharedQueue {
    fn new(items: Vec<WorkItem>) -> Self {
        Self {
            pending: Mutex::new(items.into_iter().enumerate().collect()),
            drained: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Takes the next item, or `None` once the queue is empty or cancelled
    ///
    /// Returns the item together with the number of items still pending.
    fn take_next(&self) -> Option<((usize, WorkItem), usize)> {
        if self.is_cancelled() {
            return None;
        }
        let mut pending = self.pending.lock();
        let next = pending.pop_front()?;
        Some((next, pending.len()))
    }

    fn cancel(&self) -> usize {
        self.cancelled.store(true, Ordering::SeqCst);
        self.drain()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn drain(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        self.drained.lock().extend(pending.drain(..));
        count
    }
}

/// Cancels the batches currently running on the scheduler it was taken from
///
/// Pending items are drained and returned untouched; items already being
/// processed are allowed to finish. Cancelling while no batch runs has no
/// effect, so a scheduler stays usable after a cancelled batch.
#[derive(Clone, Default)]
pub struct CancelHandle {
    running: Arc<Mutex<Vec<Arc<SharedQueue>>>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let running = self.running.lock();
        let drained: usize = running.iter().map(|queue| queue.cancel()).sum();
        debug!(batches = running.len(), drained, "batch cancelled");
    }

    /// Whether a running batch has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.running.lock().iter().any(|queue| queue.is_cancelled())
    }

    fn register(&self, queue: &Arc<SharedQueue>) {
        self.running.lock().push(Arc::clone(queue));
    }

    fn unregister(&self, queue: &Arc<SharedQueue>) {
        self.running.lock().retain(|running| !Arc::ptr_eq(running, queue));
    }
}

/// Runs batches on fixed-size worker pools
///
/// Each call to [`run`](Self::run) owns its queue, so one scheduler can run
/// several batches at once without them sharing items.
#[derive(Default)]
pub struct BatchScheduler {
    cancel: CancelHandle,
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for cancelling running batches of this scheduler from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Processes all items with `concurrency` workers (at least one)
    ///
    /// Blocks until the queue is drained or the batch was cancelled.
    pub fn run<P, F>(
        &self,
        items: Vec<WorkItem>,
        concurrency: usize,
        processor: &P,
        progress: F,
    ) -> BatchReport
    where
        P: ItemProcessor + ?Sized,
        F: Fn(ProgressEvent) + Sync,
    {
        let total = items.len();
        let workers = concurrency.max(1).min(total.max(1));
        let queue = Arc::new(SharedQueue::new(items));
        self.cancel.register(&queue);

        info!(total, workers, "starting batch");
        progress(ProgressEvent::Started { total, workers });

        let finished: Mutex<Vec<(usize, WorkItem, ItemOutcome)>> =
            Mutex::new(Vec::with_capacity(total));

        thread::scope(|s| {
            let mut handles = Vec::with_capacity(workers);
            for worker in 0..workers {
                let spawned = thread::Builder::new()
                    .name(format!("scrape-worker-{}", worker))
                    .spawn_scoped(s, || work(&queue, total, processor, &progress, &finished));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => error!(worker, error = %e, "failed to spawn worker"),
                }
            }

            if handles.is_empty() {
                warn!("no worker threads available, processing on the calling thread");
                work(&queue, total, processor, &progress, &finished);
            }

            for handle in handles {
                if handle.join().is_err() {
                    error!("worker thread terminated abnormally");
                }
            }
        });

        self.cancel.unregister(&queue);
        // A cancel may have raced the last dequeue.
        if queue.is_cancelled() {
            queue.drain();
        }
        let mut drained: Vec<(usize, WorkItem)> = queue.drained.lock().drain(..).collect();
        if !drained.is_empty() {
            info!(remaining = drained.len(), "pending items cancelled");
            progress(ProgressEvent::Cancelled {
                remaining: drained.len(),
            });
        }

        let mut finished = finished.into_inner();
        finished.extend(
            drained
                .drain(..)
                .map(|(index, item)| (index, item, ItemOutcome::Cancelled)),
        );
        finished.sort_by_key(|(index, _, _)| *index);

        let report = build_report(total, finished);
        info!(
            scraped = report.summary.scraped,
            skipped = report.summary.skipped,
            failed = report.summary.failed,
            cancelled = report.summary.cancelled,
            "batch complete"
        );
        progress(ProgressEvent::Complete {
            summary: report.summary,
        });
        report
    }
}

fn work<P, F>(
    queue: &SharedQueue,
    total: usize,
    processor: &P,
    progress: &F,
    finished: &Mutex<Vec<(usize, WorkItem, ItemOutcome)>>,
) where
    P: ItemProcessor + ?Sized,
    F: Fn(ProgressEvent) + Sync,
{
    while let Some(((index, mut item), remaining)) = queue.take_next() {
        progress(ProgressEvent::ItemTaken {
            index,
            name: item.name.clone(),
            progress: total.saturating_sub(remaining) as f32 / total.max(1) as f32,
        });

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| processor.process(&item))) {
            Ok(Ok(Processed::Scraped(result))) => {
                let title = result.metadata.title.clone();
                item.apply(result);
                debug!(item = %item.name, %title, "item scraped");
                progress(ProgressEvent::ItemScraped {
                    index,
                    name: item.name.clone(),
                    title,
                });
                ItemOutcome::Scraped
            }
            Ok(Ok(Processed::Skipped(reason))) => {
                info!(item = %item.name, %reason, "item skipped");
                progress(ProgressEvent::ItemSkipped {
                    index,
                    name: item.name.clone(),
                    reason,
                });
                ItemOutcome::Skipped { reason }
            }
            Ok(Err(e)) => item_failed(index, &item, e.to_string(), progress),
            Err(payload) => {
                let e = ScrapeError::Panicked(panic_message(payload.as_ref()));
                item_failed(index, &item, e.to_string(), progress)
            }
        };

        finished.lock().push((index, item, outcome));
    }
}

fn item_failed<F>(index: usize, item: &WorkItem, error: String, progress: &F) -> ItemOutcome
where
    F: Fn(ProgressEvent) + Sync,
{
    error!(item = %item.name, %error, "item failed");
    progress(ProgressEvent::ItemFailed {
        index,
        name: item.name.clone(),
        error: error.clone(),
    });
    ItemOutcome::Failed { error }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn build_report(total: usize, finished: Vec<(usize, WorkItem, ItemOutcome)>) -> BatchReport {
    let mut summary = BatchSummary {
        total,
        ..Default::default()
    };

    let entries = finished
        .into_iter()
        .map(|(_, item, outcome)| {
            match outcome {
                ItemOutcome::Scraped => summary.scraped += 1,
                ItemOutcome::Skipped { .. } => summary.skipped += 1,
                ItemOutcome::Failed { .. } => summary.failed += 1,
                ItemOutcome::Cancelled => summary.cancelled += 1,
            }
            BatchEntry { item, outcome }
        })
        .collect();

    BatchReport { entries, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn scraped(item: &WorkItem) -> Result<Processed, ScrapeError> {
        Ok(Processed::Scraped(ScrapeResult {
            metadata: MetadataRecord {
                title: item.name.to_uppercase(),
                ..Default::default()
            },
            artwork: Vec::new(),
            trailers: Vec::new(),
        }))
    }

    fn items(count: usize) -> Vec<WorkItem> {
        (0..count).map(|i| WorkItem::new(&format!("item-{}", i))).collect()
    }

    #[test]
    fn test_every_item_processed_exactly_once() {
        for run in 0..20 {
            let seen: Mutex<HashMap<String, usize>> = Mutex::new(HashMap::new());
            let processor = |item: &WorkItem| {
                *seen.lock().entry(item.name.clone()).or_default() += 1;
                // Vary timing so workers interleave differently per run.
                if (item.name.len() + run) % 3 == 0 {
                    thread::sleep(Duration::from_micros(200));
                } else {
                    thread::yield_now();
                }
                scraped(item)
            };

            let scheduler = BatchScheduler::new();
            let report = scheduler.run(items(40), 2 + run % 4, &processor, |_| {});

            let seen = seen.into_inner();
            assert_eq!(seen.len(), 40);
            assert!(seen.values().all(|count| *count == 1));
            assert_eq!(report.summary.scraped, 40);
        }
    }

    #[test]
    fn test_report_keeps_original_order() {
        let scheduler = BatchScheduler::new();
        let report = scheduler.run(items(10), 4, &scraped, |_| {});

        let names: Vec<String> = report.entries.iter().map(|e| e.item.name.clone()).collect();
        let expected: Vec<String> = items(10).into_iter().map(|i| i.name).collect();
        assert_eq!(names, expected);
        assert!(
            report
                .entries
                .iter()
                .all(|e| e.item.metadata.as_ref().unwrap().title == e.item.name.to_uppercase())
        );
    }

    #[test]
    fn test_progress_reaches_one() {
        let events = Mutex::new(Vec::new());
        let scheduler = BatchScheduler::new();
        scheduler.run(items(6), 3, &scraped, |event| events.lock().push(event));

        let events = events.into_inner();
        let max = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::ItemTaken { progress, .. } => Some(*progress),
                _ => None,
            })
            .fold(0.0f32, f32::max);
        assert_eq!(max, 1.0);
        assert!(matches!(events.first(), Some(ProgressEvent::Started { total: 6, .. })));
        assert!(matches!(events.last(), Some(ProgressEvent::Complete { .. })));
    }

    #[test]
    fn test_cancel_drains_pending_items_untouched() {
        let scheduler = BatchScheduler::new();
        let handle = scheduler.cancel_handle();
        let processor = |item: &WorkItem| {
            handle.cancel();
            scraped(item)
        };

        let report = scheduler.run(items(5), 1, &processor, |_| {});

        assert_eq!(report.summary.scraped, 1);
        assert_eq!(report.summary.cancelled, 4);
        assert_eq!(report.entries.len(), 5);
        assert_eq!(report.entries[0].outcome, ItemOutcome::Scraped);
        for entry in &report.entries[1..] {
            assert_eq!(entry.outcome, ItemOutcome::Cancelled);
            assert!(entry.item.metadata.is_none());
        }
    }

    #[test]
    fn test_cancel_without_running_batch_is_a_no_op() {
        let scheduler = BatchScheduler::new();
        scheduler.cancel_handle().cancel();
        assert!(!scheduler.cancel_handle().is_cancelled());

        let report = scheduler.run(items(3), 2, &scraped, |_| {});
        assert_eq!(report.summary.scraped, 3);
        assert_eq!(report.summary.cancelled, 0);
    }

    #[test]
    fn test_scheduler_is_reusable_after_cancel() {
        let scheduler = BatchScheduler::new();
        let handle = scheduler.cancel_handle();
        let cancelling = |item: &WorkItem| {
            handle.cancel();
            scraped(item)
        };

        let first = scheduler.run(items(4), 1, &cancelling, |_| {});
        assert_eq!(first.summary.cancelled, 3);

        let second = scheduler.run(items(4), 2, &scraped, |_| {});
        assert_eq!(second.summary.scraped, 4);
        assert_eq!(second.summary.cancelled, 0);
    }

    #[test]
    fn test_concurrent_batches_keep_their_own_items() {
        let scheduler = BatchScheduler::new();
        let slow = |item: &WorkItem| {
            thread::sleep(Duration::from_millis(2));
            scraped(item)
        };
        let named = |prefix: &str, count: usize| -> Vec<WorkItem> {
            (0..count)
                .map(|i| WorkItem::new(&format!("{}{}", prefix, i)))
                .collect()
        };

        let (a, b) = thread::scope(|s| {
            let a = s.spawn(|| scheduler.run(named("A", 6), 3, &slow, |_| {}));
            let b = s.spawn(|| scheduler.run(named("B", 2), 3, &slow, |_| {}));
            (a.join().unwrap(), b.join().unwrap())
        });

        let names = |report: &BatchReport| -> Vec<String> {
            report.entries.iter().map(|e| e.item.name.clone()).collect()
        };
        assert_eq!(names(&a), vec!["A0", "A1", "A2", "A3", "A4", "A5"]);
        assert_eq!(names(&b), vec!["B0", "B1"]);
        assert_eq!(a.summary.scraped, 6);
        assert_eq!(b.summary.scraped, 2);
    }

    #[test]
    fn test_panic_is_isolated_to_its_item() {
        let processor = |item: &WorkItem| {
            if item.name == "item-2" {
                panic!("provider exploded");
            }
            scraped(item)
        };

        let scheduler = BatchScheduler::new();
        let report = scheduler.run(items(6), 2, &processor, |_| {});

        assert_eq!(report.summary.scraped, 5);
        assert_eq!(report.summary.failed, 1);
        match &report.entries[2].outcome {
            ItemOutcome::Failed { error } => assert!(error.contains("provider exploded")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(report.entries[2].item.metadata.is_none());
    }

    #[test]
    fn test_errors_and_skips_are_counted() {
        let processor = |item: &WorkItem| match item.name.as_str() {
            "item-0" => Ok(Processed::Skipped(SkipReason::NoMatch)),
            "item-1" => Ok(Processed::Skipped(SkipReason::Ambiguous { perfect_matches: 2 })),
            "item-2" => Err(ScrapeError::UnknownProvider("nope".to_string())),
            _ => scraped(item),
        };

        let report = BatchScheduler::new().run(items(4), 3, &processor, |_| {});
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.scraped, 1);
    }

    #[test]
    fn test_empty_batch() {
        let report = BatchScheduler::new().run(Vec::new(), 3, &scraped, |_| {});
        assert!(report.entries.is_empty());
        assert_eq!(report.summary, BatchSummary::default());
    }
}
