//! Bounded-concurrency batch processing
//!
//! A worker walks its segment in chunks of at most `batch_size` domains.
//! Within a chunk every domain is classified concurrently, but each
//! classification first takes a permit from a semaphore of
//! `max_concurrent_tasks`, so the processor never has more than that many
//! lookups in flight. One chunk yields exactly one batch, in chunk order;
//! chunks are emitted in segment order.
//!
//! Bounding matters twice over: it keeps the process from exhausting
//! sockets against the upstream, and batching amortizes the writer-lock
//! and snapshot cost downstream.

use anyhow::{Context, Result};
use futures::future;
use std::slice::Chunks;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::classify::{Batch, Classify};

/// Tuning knobs for one batch processor.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorOptions {
    /// Maximum in-flight classifications across this processor.
    pub max_concurrent_tasks: usize,
    /// Upper bound on emitted batch cardinality.
    pub batch_size: usize,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
            batch_size: 10,
        }
    }
}

/// Streams a segment of domains through the classifier in bounded,
/// order-preserving batches.
pub struct BatchProcessor {
    classifier: Arc<dyn Classify>,
    gate: Arc<Semaphore>,
    batch_size: usize,
}

impl BatchProcessor {
    pub fn new(classifier: Arc<dyn Classify>, options: ProcessorOptions) -> Self {
        Self {
            classifier,
            gate: Arc::new(Semaphore::new(options.max_concurrent_tasks.max(1))),
            batch_size: options.batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Splits a segment into the chunks this processor will emit as batches.
    ///
    /// An empty segment yields no chunks; a segment shorter than the batch
    /// size collapses to a single chunk.
    pub fn chunks<'a>(&self, segment: &'a [String]) -> Chunks<'a, String> {
        segment.chunks(self.batch_size)
    }

    /// Classifies one chunk concurrently and returns its batch.
    ///
    /// Results come back in the same order as the chunk. Classification
    /// itself never fails; the only error here is the concurrency gate
    /// being closed, which does not happen in normal operation.
    pub async fn process_chunk(&self, chunk: &[String]) -> Result<Batch> {
        let lookups = chunk.iter().map(|domain| {
            let classifier = Arc::clone(&self.classifier);
            let gate = Arc::clone(&self.gate);
            async move {
                let _permit = gate
                    .acquire_owned()
                    .await
                    .context("Concurrency gate closed")?;
                Ok(classifier.classify(domain).await)
            }
        });

        future::try_join_all(lookups).await
    }
}
