//! Resolution run driver
//!
//! One run takes a list of domains and drives it to a persisted cache
//! state:
//!
//! 1. Partition the input into per-worker segments by round-robin striping,
//!    which spreads any locality in the input (sorted domains sharing TLDs)
//!    evenly across workers.
//! 2. Spawn one writer task that drains the result channel and applies each
//!    batch to the cache, and `W` worker tasks that stream their segments
//!    through a [`BatchProcessor`].
//! 3. On SIGINT/SIGTERM, trip a shutdown latch; workers notice it between
//!    batches, the channel drains, and a final snapshot is persisted.
//!
//! The worker count scales with both the input (`min_worker_share` items per
//! worker at minimum) and the machine (a CPU-derived ceiling above the core
//! count, since the work is I/O-bound). Total in-flight lookups are bounded
//! by `W * max_concurrent_tasks`.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::cache::CacheWriter;
use crate::classify::{Batch, Classify};
use crate::processor::{BatchProcessor, ProcessorOptions};
use crate::progress::RuntimeEstimator;

/// Buffering on the result channel. Small on purpose: a slow writer is
/// supposed to throttle the classifiers through channel backpressure.
const RESULT_CHANNEL_CAPACITY: usize = 32;

/// How long the writer blocks on the channel before re-checking the
/// completion flag.
const RESULT_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Cooperative shutdown flag shared by the signal listener and the workers.
///
/// Tripping is idempotent; a second signal has no effect beyond the first.
#[derive(Debug, Default)]
pub struct ShutdownLatch {
    tripped: AtomicBool,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the latch. Returns `true` only for the first call.
    pub fn trip(&self) -> bool {
        !self.tripped.swap(true, Ordering::SeqCst)
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

/// Splits `items` into `workers` round-robin stripes.
///
/// Segment `i` receives the items at positions `i, i + workers,
/// i + 2 * workers, ...`, so segment sizes differ by at most one and their
/// disjoint union is the input.
pub fn partition(items: Vec<String>, workers: usize) -> Vec<Vec<String>> {
    let workers = workers.max(1);
    let mut segments: Vec<Vec<String>> = (0..workers)
        .map(|i| Vec::with_capacity(items.len() / workers + usize::from(i < items.len() % workers)))
        .collect();
    for (position, item) in items.into_iter().enumerate() {
        segments[position % workers].push(item);
    }
    segments
}

/// Worker-pool sizing for resolution runs.
pub struct Executor {
    min_worker_share: usize,
    max_workers: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            min_worker_share: 100,
            max_workers: default_max_workers(),
        }
    }
}

/// CPU-scaled worker ceiling: `round(cores * 1.7)`, at least 2. DNS work is
/// I/O-bound, so the ceiling deliberately exceeds the core count.
pub fn default_max_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    ((cores as f64 * 1.7).round() as usize).max(2)
}

impl Executor {
    pub fn new(min_worker_share: usize, max_workers: usize) -> Self {
        Self {
            min_worker_share: min_worker_share.max(1),
            max_workers: max_workers.max(1),
        }
    }

    /// Workers for an input of `items` domains: at least one, no more than
    /// one per `min_worker_share` items, capped by the configured ceiling.
    pub fn worker_count(&self, items: usize) -> usize {
        (items / self.min_worker_share).clamp(1, self.max_workers)
    }

    /// Runs one resolution pass, installing SIGINT/SIGTERM handlers for the
    /// duration of the run.
    pub async fn execute(
        &self,
        items: Vec<String>,
        classifier: Arc<dyn Classify>,
        options: ProcessorOptions,
        writer: Arc<CacheWriter>,
    ) -> Result<()> {
        let latch = Arc::new(ShutdownLatch::new());
        let signals = spawn_signal_listener(Arc::clone(&latch));
        let result = self
            .execute_with_latch(items, classifier, options, writer, latch)
            .await;
        signals.abort();
        result
    }

    /// [`Executor::execute`] with an externally owned shutdown latch and no
    /// signal handlers. This is the full driver; tests trip the latch
    /// directly instead of delivering signals.
    pub async fn execute_with_latch(
        &self,
        items: Vec<String>,
        classifier: Arc<dyn Classify>,
        options: ProcessorOptions,
        writer: Arc<CacheWriter>,
        latch: Arc<ShutdownLatch>,
    ) -> Result<()> {
        if items.is_empty() {
            debug!("Nothing to resolve");
            return Ok(());
        }

        let total = items.len();
        let workers = self.worker_count(total);
        let segments = partition(items, workers);
        info!("Workers: {}, items: {}", workers, total);

        let estimator = Arc::new(RuntimeEstimator::new(total));
        let completed = Arc::new(AtomicBool::new(false));
        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(RESULT_CHANNEL_CAPACITY);

        let writer_task = spawn_writer(
            batch_rx,
            Arc::clone(&writer),
            Arc::clone(&estimator),
            Arc::clone(&completed),
        );

        let mut worker_tasks = Vec::with_capacity(segments.len());
        for (worker_id, segment) in segments.into_iter().enumerate() {
            // W never exceeds the item count, so segments are nonempty;
            // spare workers are not created.
            if segment.is_empty() {
                continue;
            }
            worker_tasks.push(spawn_worker(
                worker_id,
                segment,
                BatchProcessor::new(Arc::clone(&classifier), options),
                batch_tx.clone(),
                Arc::clone(&estimator),
                Arc::clone(&latch),
            ));
        }
        // The writer must see the channel close once the workers are done.
        drop(batch_tx);

        for (worker_id, task) in worker_tasks.into_iter().enumerate() {
            if let Err(e) = task.await {
                // A panicking worker is confined to itself; the run goes on.
                error!("Worker {} aborted: {}", worker_id, e);
            }
        }

        completed.store(true, Ordering::Release);
        writer_task.await.context("Writer task failed")?;

        // Failing to persist the final state is the one fatal outcome here.
        writer
            .persist()
            .await
            .context("Failed to persist final snapshot")?;

        if latch.is_tripped() {
            info!("Run interrupted; partial results persisted");
        } else {
            info!("Run complete");
        }
        Ok(())
    }
}

/// The single writer task: drains the channel and applies each batch.
///
/// The bounded receive lets it observe the completion flag within a second
/// even when no batches arrive: once the flag is set, no worker can send
/// again, so the writer drains whatever is still queued and exits. Channel
/// closure (all workers gone) ends it the same way. Snapshot failures are
/// logged and retried implicitly with the next batch, since the in-memory
/// state is preserved.
fn spawn_writer(
    mut batch_rx: mpsc::Receiver<Batch>,
    writer: Arc<CacheWriter>,
    estimator: Arc<RuntimeEstimator>,
    completed: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let batch = match timeout(RESULT_RECV_TIMEOUT, batch_rx.recv()).await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(_elapsed) => {
                    if !completed.load(Ordering::Acquire) {
                        continue;
                    }
                    // Nothing new can arrive now; an empty channel is final.
                    match batch_rx.try_recv() {
                        Ok(batch) => batch,
                        Err(_) => {
                            debug!("Processing complete, writer drained");
                            break;
                        }
                    }
                }
            };

            if let Err(e) = writer.apply_batch(batch).await {
                error!("Failed to persist batch: {:#}", e);
            }
            estimator.log();
        }
        debug!("Writer finished");
    })
}

/// One worker: streams its segment through the processor onto the result
/// channel, crediting the estimator per batch and checking the shutdown
/// latch between batches.
fn spawn_worker(
    worker_id: usize,
    segment: Vec<String>,
    processor: BatchProcessor,
    batch_tx: mpsc::Sender<Batch>,
    estimator: Arc<RuntimeEstimator>,
    latch: Arc<ShutdownLatch>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Worker {} starting with {} items", worker_id, segment.len());
        for chunk in processor.chunks(&segment) {
            if latch.is_tripped() {
                info!("Worker {} exiting on shutdown request", worker_id);
                break;
            }
            match processor.process_chunk(chunk).await {
                Ok(batch) => {
                    let count = batch.len();
                    if batch_tx.send(batch).await.is_err() {
                        warn!("Worker {}: result channel closed", worker_id);
                        break;
                    }
                    estimator.update(worker_id, count);
                }
                Err(e) => {
                    // Confined to this worker; the others keep going.
                    error!("Worker {} failed: {:#}", worker_id, e);
                    break;
                }
            }
        }
        debug!("Worker {} finished", worker_id);
    })
}

/// Listens for SIGINT/SIGTERM and trips the latch. Further signals are
/// swallowed so a second interrupt cannot cut the drain short.
fn spawn_signal_listener(latch: Arc<ShutdownLatch>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            wait_for_signal().await;
            if latch.trip() {
                info!("Shutdown signal received, draining in-flight batches");
            } else {
                debug!("Additional shutdown signal ignored");
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
