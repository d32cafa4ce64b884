use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing summarization activity.
#[derive(Default)]
pub struct SummaryMetrics {
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    model_calls: AtomicU64,
    // f64 seconds stored as raw bits.
    last_processing_time: AtomicU64,
}

impl SummaryMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful run, its duration in seconds, and the model calls it issued.
    pub fn record_success(&self, processing_time: f64, model_calls: u64) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.model_calls.fetch_add(model_calls, Ordering::Relaxed);
        self.last_processing_time
            .store(processing_time.to_bits(), Ordering::Relaxed);
    }

    /// Record a run that ended in an error.
    pub fn record_failure(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let runs_completed = self.runs_completed.load(Ordering::Relaxed);
        MetricsSnapshot {
            runs_completed,
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            model_calls: self.model_calls.load(Ordering::Relaxed),
            last_processing_time: (runs_completed > 0)
                .then(|| f64::from_bits(self.last_processing_time.load(Ordering::Relaxed))),
        }
    }
}

/// Immutable view of summarization counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Runs that produced a summary since startup.
    pub runs_completed: u64,
    /// Runs that failed since startup.
    pub runs_failed: u64,
    /// Model calls issued by successful runs.
    pub model_calls: u64,
    /// Duration in seconds of the most recent successful run.
    pub last_processing_time: Option<f64>,
}
