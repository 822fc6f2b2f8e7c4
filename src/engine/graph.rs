use crate::core::{ErrReport, Node};
use crate::engine::config::GraphConfig;
use crate::engine::state::GraphState;
use crate::error::{GraphFailure, NodeResult, PipelineError};
use crate::observability::{MetricsCollector, PipelineMonitor};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

type Members = HashMap<String, Box<dyn Node>>;

/// A named set of nodes run, monitored and torn down as a unit.
///
/// A graph is itself a [`Node`], so graphs nest. Membership changes wait for
/// any run in progress to finish.
pub struct Graph {
    name: String,
    config: GraphConfig,
    nodes: Arc<Mutex<Members>>,
    collector: MetricsCollector,
    report_tx: mpsc::Sender<NodeResult>,
    report: ErrReport,
    state: Arc<watch::Sender<GraphState>>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, GraphConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: GraphConfig) -> Self {
        let (report_tx, report) = ErrReport::channel();
        let (state, _) = watch::channel(GraphState::Idle);
        Self {
            name: name.into(),
            config,
            nodes: Arc::new(Mutex::new(HashMap::new())),
            collector: MetricsCollector::new(),
            report_tx,
            report,
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: GraphConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> GraphState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<GraphState> {
        self.state.subscribe()
    }

    /// Add `node` under its own name, returning any node it replaced.
    pub async fn set_node(&mut self, node: impl Node + 'static) -> Option<Box<dyn Node>> {
        let mut nodes = self.nodes.lock().await;
        insert(&mut self.collector, &mut nodes, Box::new(node))
    }

    pub async fn set_nodes(&mut self, batch: impl IntoIterator<Item = Box<dyn Node>>) {
        let mut nodes = self.nodes.lock().await;
        for node in batch {
            insert(&mut self.collector, &mut nodes, node);
        }
    }

    pub async fn remove_node(&mut self, name: &str) -> Option<Box<dyn Node>> {
        let mut nodes = self.nodes.lock().await;
        self.collector.unregister(name);
        nodes.remove(name)
    }

    pub async fn remove_nodes<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Box<dyn Node>> {
        let mut nodes = self.nodes.lock().await;
        names
            .into_iter()
            .filter_map(|name| {
                self.collector.unregister(name);
                nodes.remove(name)
            })
            .collect()
    }

    /// Member names in sorted order.
    pub async fn node_names(&self) -> Vec<String> {
        let nodes = self.nodes.lock().await;
        let mut names: Vec<String> = nodes.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.lock().await.is_empty()
    }

    /// Text report over the metrics of every member.
    pub fn monitor(&self) -> PipelineMonitor {
        PipelineMonitor::new(self.collector.clone())
    }
}

/// Insert `node` under its own name, keeping the collector in sync.
fn insert(
    collector: &mut MetricsCollector,
    nodes: &mut Members,
    node: Box<dyn Node>,
) -> Option<Box<dyn Node>> {
    let name = node.name().to_string();
    match node.metrics() {
        Some(metrics) => collector.register(name.clone(), metrics),
        None => {
            collector.unregister(&name);
        }
    }
    nodes.insert(name, node)
}

impl Node for Graph {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: CancellationToken) {
        let supervisor = Supervisor {
            name: self.name.clone(),
            config: self.config.clone(),
            report_tx: self.report_tx.clone(),
            state: Arc::clone(&self.state),
        };
        tokio::spawn(supervisor.supervise(Arc::clone(&self.nodes), ctx));
    }

    fn err(&mut self) -> &mut ErrReport {
        &mut self.report
    }
}

/// What the supervisor task needs from its graph.
struct Supervisor {
    name: String,
    config: GraphConfig,
    report_tx: mpsc::Sender<NodeResult>,
    state: Arc<watch::Sender<GraphState>>,
}

impl Supervisor {
    async fn supervise(self, nodes: Arc<Mutex<Members>>, parent: CancellationToken) {
        let mut nodes = nodes.lock_owned().await;
        let result = self.run_members(&mut nodes, &parent).await;
        drop(nodes);

        self.advance(GraphState::Idle);
        match &result {
            Ok(()) => debug!(graph = %self.name, "Graph stopped"),
            Err(err) => debug!(graph = %self.name, error = %err, "Graph failed"),
        }
        let _ = self.report_tx.send(result).await;
    }

    async fn run_members(&self, nodes: &mut Members, parent: &CancellationToken) -> NodeResult {
        self.advance(GraphState::Running);

        let members_ctx = parent.child_token();
        for node in nodes.values_mut() {
            node.run(members_ctx.clone());
        }
        debug!(graph = %self.name, nodes = nodes.len(), "Graph started");

        let mut failure = GraphFailure::default();
        let mut pending: FuturesUnordered<_> = nodes
            .iter_mut()
            .map(|(name, node)| {
                let report = node.err();
                async move { (name.as_str(), report.recv().await) }
            })
            .collect();

        let main_loop = tokio::select! {
            biased;

            _ = parent.cancelled() => {
                debug!(graph = %self.name, "Graph cancelled");
                self.config.cancel_is_error.then_some(PipelineError::Cancelled)
            }
            Some((name, result)) = pending.next() => match result {
                Ok(()) => {
                    debug!(graph = %self.name, node = name, "Node finished, tearing down graph");
                    None
                }
                Err(err) => {
                    error!(graph = %self.name, node = name, error = %err, "Node error");
                    failure.nodes.insert(name.to_string(), err);
                    Some(PipelineError::NodeFailed(name.to_string()))
                }
            },
        };
        failure.main_loop = main_loop;

        self.advance(GraphState::TearingDown);
        members_ctx.cancel();

        let remaining = pending.len();
        if remaining > 0 {
            let deadline = self.config.teardown_timeout_for(remaining);
            let cancel_is_error = self.config.cancel_is_error;
            let failed = &mut failure.nodes;
            let drain = async {
                while let Some((name, result)) = pending.next().await {
                    let Err(err) = result else { continue };
                    if err.is_cancelled() && !cancel_is_error {
                        continue;
                    }
                    trace!(graph = %self.name, node = name, error = %err, "Teardown error");
                    failed.insert(name.to_string(), err);
                }
            };

            let timed_out = tokio::time::timeout(deadline, drain).await.is_err();
            if timed_out {
                warn!(
                    graph = %self.name,
                    abandoned = pending.len(),
                    ?deadline,
                    "Teardown timeout"
                );
                failure.teardown = Some(PipelineError::TeardownTimedOut);
            }
        }
        drop(pending);

        if failure.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Graph {
                name: self.name.clone(),
                failure: Box::new(failure),
            })
        }
    }

    fn advance(&self, next: GraphState) {
        let current = *self.state.borrow();
        if !current.can_transition_to(&next) {
            warn!(
                graph = %self.name,
                from = current.name(),
                to = next.name(),
                "Unexpected graph state transition"
            );
        }
        self.state.send_replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{iter_source, SinkNode};

    #[tokio::test]
    async fn test_set_and_remove_nodes() {
        let mut graph = Graph::new("g");
        let source = iter_source("numbers", vec![1, 2, 3]);
        let sink = SinkNode::new("sink", source.stream());

        assert!(graph.set_node(source).await.is_none());
        graph.set_nodes([Box::new(sink) as Box<dyn Node>]).await;
        assert_eq!(graph.node_names().await, vec!["numbers", "sink"]);
        assert!(graph.monitor().collector().get_node_metrics("sink").is_some());

        assert!(graph.remove_node("sink").await.is_some());
        assert!(graph.remove_node("sink").await.is_none());
        assert!(graph.monitor().collector().get_node_metrics("sink").is_none());
        assert_eq!(graph.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_graph_stops_on_cancel() {
        let mut graph = Graph::new("empty");
        let ctx = CancellationToken::new();
        graph.run(ctx.clone());
        ctx.cancel();

        assert!(graph.err().recv().await.is_ok());
        assert_eq!(graph.state(), GraphState::Idle);
    }
}
