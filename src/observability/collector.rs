use super::NodeMetrics;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub node_name: String,
    pub steps_completed: u64,
    pub errors_count: u64,
    pub previews_dropped: u64,
    pub avg_latency_us: u64,
}

/// Metrics of every node registered with a graph, keyed by node name.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<String, Arc<NodeMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node_name: impl Into<String>, metrics: Arc<NodeMetrics>) {
        self.metrics.insert(node_name.into(), metrics);
    }

    pub fn unregister(&mut self, node_name: &str) -> Option<Arc<NodeMetrics>> {
        self.metrics.remove(node_name)
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(name, metrics)| {
                (
                    name.clone(),
                    MetricsSnapshot {
                        node_name: metrics.node_name().to_string(),
                        steps_completed: metrics.steps_completed(),
                        errors_count: metrics.errors_count(),
                        previews_dropped: metrics.previews_dropped(),
                        avg_latency_us: metrics.avg_latency_us(),
                    },
                )
            })
            .collect()
    }

    pub fn get_node_metrics(&self, node_name: &str) -> Option<Arc<NodeMetrics>> {
        self.metrics.get(node_name).cloned()
    }
}
