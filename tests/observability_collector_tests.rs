use framegraph::observability::{MetricsCollector, NodeMetrics};
use std::sync::Arc;

#[test]
fn test_collector_registration() {
    let mut collector = MetricsCollector::new();
    let metrics = Arc::new(NodeMetrics::new("node1"));

    collector.register("node1", metrics.clone());

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key("node1"));
    assert!(Arc::ptr_eq(&collector.get_node_metrics("node1").unwrap(), &metrics));

    assert!(collector.unregister("node1").is_some());
    assert!(collector.snapshot().is_empty());
}

#[test]
fn test_collector_aggregation() {
    let mut collector = MetricsCollector::new();

    let m1 = Arc::new(NodeMetrics::new("node1"));
    let m2 = Arc::new(NodeMetrics::new("node2"));

    m1.measure(|| Ok(())).unwrap();
    m1.measure(|| Ok(())).unwrap();
    m2.measure(|| Ok(())).unwrap();
    m2.record_preview_dropped();

    collector.register("node1", m1);
    collector.register("node2", m2);

    let snapshot = collector.snapshot();

    assert_eq!(snapshot.get("node1").unwrap().steps_completed, 2);
    assert_eq!(snapshot.get("node2").unwrap().steps_completed, 1);
    assert_eq!(snapshot.get("node2").unwrap().previews_dropped, 1);
}
