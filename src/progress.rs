//! Run-time progress estimation
//!
//! Workers report how many items they classified; the estimator aggregates
//! the per-worker counters and projects a finish time from throughput so
//! far. Counters live in a concurrent map, so updates never contend with
//! the reader.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::info;

/// A point-in-time progress projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub remaining: usize,
    pub processed: usize,
    pub est_remaining: Duration,
    pub est_total: Duration,
}

/// Aggregates per-worker throughput for one resolution run.
///
/// `est_total = total * elapsed / processed` once anything has been
/// processed; zero before that.
#[derive(Debug)]
pub struct RuntimeEstimator {
    started: Instant,
    total_items: usize,
    counters: DashMap<usize, usize>,
}

impl RuntimeEstimator {
    pub fn new(total_items: usize) -> Self {
        Self {
            started: Instant::now(),
            total_items,
            counters: DashMap::new(),
        }
    }

    /// Credits `count` classified items to `worker`.
    pub fn update(&self, worker: usize, count: usize) {
        *self.counters.entry(worker).or_insert(0) += count;
    }

    /// Total items classified so far, across all workers.
    pub fn processed(&self) -> usize {
        self.counters.iter().map(|entry| *entry.value()).sum()
    }

    pub fn is_done(&self) -> bool {
        self.processed() >= self.total_items
    }

    pub fn estimate(&self) -> Estimate {
        let processed = self.processed();
        let remaining = self.total_items.saturating_sub(processed);
        let elapsed = self.started.elapsed();

        let est_total = if processed > 0 {
            Duration::from_secs_f64(
                self.total_items as f64 * elapsed.as_secs_f64() / processed as f64,
            )
        } else {
            Duration::ZERO
        };

        Estimate {
            remaining,
            processed,
            est_remaining: est_total.saturating_sub(elapsed),
            est_total,
        }
    }

    /// Emits one human-readable progress line.
    pub fn log(&self) {
        let estimate = self.estimate();
        info!(
            "Remaining: {}, processed: {}, estimated time to finish: {}",
            estimate.remaining,
            estimate.processed,
            format_span(estimate.est_remaining)
        );
    }
}

/// Formats a duration as a compact `2h 5m 30s` style span.
fn format_span(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
