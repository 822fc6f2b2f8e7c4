use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters one node updates from its own task.
pub struct NodeMetrics {
    node_name: String,
    steps_completed: AtomicU64,
    errors_count: AtomicU64,
    previews_dropped: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl NodeMetrics {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            steps_completed: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            previews_dropped: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn previews_dropped(&self) -> u64 {
        self.previews_dropped.load(Ordering::Relaxed)
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preview_dropped(&self) {
        self.previews_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Time a step callback; successful steps are counted.
    pub fn measure<T>(&self, step: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
        let start = Instant::now();
        let result = step();
        let latency_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        if result.is_ok() {
            self.steps_completed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }
}
