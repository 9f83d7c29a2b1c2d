use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

/// Global runtime metrics for the collector.
///
/// Purpose:
/// - Track collection runs and per-source failures
/// - Track persistence outcomes (saved / duplicate / failed commits)
/// - Track fetch volume and the scheduler's firing decisions
///
/// Design:
/// - Lock-free (Atomics)
/// - Cheap to update
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    // Orchestrator
    pub collection_runs: AtomicUsize,
    pub source_failures: AtomicUsize,

    // Persistence
    pub records_saved: AtomicUsize,
    pub duplicates_skipped: AtomicUsize,
    pub commit_failures: AtomicUsize,

    // Fetcher
    pub fetches: AtomicUsize,
    pub fetch_failures: AtomicUsize,

    // Scheduler
    pub jobs_fired: AtomicUsize,
    pub jobs_dropped_running: AtomicUsize,
    pub jobs_misfired: AtomicUsize,
}

impl RuntimeMetrics {
    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// One-line snapshot for the periodic reporter.
    pub fn summary(&self) -> String {
        format!(
            "runs={} src_fail={} saved={} dup={} commit_fail={} fetch={} fetch_fail={} fired={} dropped={} misfired={}",
            self.collection_runs.load(Ordering::Relaxed),
            self.source_failures.load(Ordering::Relaxed),
            self.records_saved.load(Ordering::Relaxed),
            self.duplicates_skipped.load(Ordering::Relaxed),
            self.commit_failures.load(Ordering::Relaxed),
            self.fetches.load(Ordering::Relaxed),
            self.fetch_failures.load(Ordering::Relaxed),
            self.jobs_fired.load(Ordering::Relaxed),
            self.jobs_dropped_running.load(Ordering::Relaxed),
            self.jobs_misfired.load(Ordering::Relaxed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
