use anyhow::anyhow;
use framegraph::observability::NodeMetrics;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_metrics_creation() {
    let metrics = NodeMetrics::new("test_node");
    assert_eq!(metrics.node_name(), "test_node");
    assert_eq!(metrics.steps_completed(), 0);
    assert_eq!(metrics.errors_count(), 0);
    assert_eq!(metrics.previews_dropped(), 0);
    assert_eq!(metrics.avg_latency_us(), 0);
}

#[test]
fn test_only_successful_steps_are_counted() {
    let metrics = Arc::new(NodeMetrics::new("test_node"));

    assert_eq!(metrics.measure(|| Ok(1)).unwrap(), 1);
    assert_eq!(metrics.measure(|| Ok(2)).unwrap(), 2);
    assert!(metrics.measure(|| -> anyhow::Result<u32> { Err(anyhow!("bad")) }).is_err());
    assert_eq!(metrics.steps_completed(), 2);

    metrics.record_error();
    metrics.record_preview_dropped();
    assert_eq!(metrics.errors_count(), 1);
    assert_eq!(metrics.previews_dropped(), 1);
}

#[test]
fn test_metrics_latency_tracking() {
    let metrics = NodeMetrics::new("test_node");

    metrics
        .measure(|| {
            std::thread::sleep(Duration::from_millis(10));
            Ok(())
        })
        .unwrap();

    let avg_latency = metrics.avg_latency_us();
    assert!(avg_latency >= 10_000); // At least 10ms in microseconds
}
