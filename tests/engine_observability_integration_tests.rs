use anyhow::anyhow;
use framegraph::nodes::{iter_source, PreviewerNode, SinkNode, SourceNode, TransformerNode};
use framegraph::{Graph, Node};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_graph_with_metrics() {
    let source = iter_source("source", 0..5u32);
    let mut gain = TransformerNode::new("gain", source.stream());
    gain.step_func(|sample: u32| Ok(sample * 2));
    let mut preview = PreviewerNode::wrap(&gain);
    preview.step_func(|sample: &u32| Ok(*sample));
    let mut print = SinkNode::new("print", preview.stream());
    print.step_func(|sample| {
        println!("{sample}");
        Ok(())
    });

    let mut graph = Graph::new("metrics");
    graph
        .set_nodes([
            Box::new(source) as Box<dyn Node>,
            Box::new(gain),
            Box::new(preview),
            Box::new(print),
        ])
        .await;

    graph.run(CancellationToken::new());
    assert!(graph.err().recv().await.is_ok());

    let report = graph.monitor().generate_report();
    assert!(report.contains("[source]\n  Steps: 5 steps completed"));
    assert!(report.contains("[gain]"));
    assert!(report.contains("[gain:PREVIEW]"));
    assert!(report.contains("[print]"));
}

#[tokio::test]
async fn test_failed_node_counts_error() {
    let mut broken = SourceNode::<u32>::new("broken");
    broken.step_func(|| Err(anyhow!("no signal")));

    let mut graph = Graph::new("errors");
    graph.set_node(broken).await;

    graph.run(CancellationToken::new());
    assert!(graph.err().recv().await.is_err());

    let metrics = graph
        .monitor()
        .collector()
        .get_node_metrics("broken")
        .unwrap();
    assert_eq!(metrics.errors_count(), 1);
    assert_eq!(metrics.steps_completed(), 0);
}
