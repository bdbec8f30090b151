use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing scan outcomes.
#[derive(Default)]
pub struct ScanMetrics {
    scans_completed: AtomicU64,
    scans_degraded: AtomicU64,
    input_rejections: AtomicU64,
    extraction_failures: AtomicU64,
    internal_errors: AtomicU64,
}

impl ScanMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a 200 response; `degraded` marks a fallback analysis.
    pub fn record_completed(&self, degraded: bool) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.scans_degraded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an upload rejected before any provider call.
    pub fn record_input_rejection(&self) {
        self.input_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an OCR result with no usable text.
    pub fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that ended in a 500.
    pub fn record_internal_error(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            scans_degraded: self.scans_degraded.load(Ordering::Relaxed),
            input_rejections: self.input_rejections.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of scan counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Scans answered with 200, including degraded ones.
    pub scans_completed: u64,
    /// Completed scans whose analysis fell back to a diagnostic.
    pub scans_degraded: u64,
    /// Requests rejected for a missing or malformed upload.
    pub input_rejections: u64,
    /// Requests rejected because OCR found no usable text.
    pub extraction_failures: u64,
    /// Requests that ended in an internal error.
    pub internal_errors: u64,
}
