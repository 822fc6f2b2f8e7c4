use crate::core::stream::Stream;
use crate::error::NodeResult;
use crate::observability::NodeMetrics;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Callback run once before the first step.
pub type SetupFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Callback run once after the last step, whatever ended the loop.
pub type TeardownFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Base trait for every stage and for graphs, which nest as ordinary nodes
pub trait Node: Send {
    /// Stable identifier, unique within one graph
    fn name(&self) -> &str;

    /// Start the background task under `ctx`.
    ///
    /// Single use: the task consumes the configured callbacks, so a second
    /// call is a no-op, as is a call on a node without a step callback.
    fn run(&mut self, ctx: CancellationToken);

    /// Completion signal yielding exactly one result per run
    fn err(&mut self) -> &mut ErrReport;

    fn metrics(&self) -> Option<Arc<NodeMetrics>> {
        None
    }
}

/// A node with a primary output stream.
pub trait StreamerNode<T>: Node {
    fn stream(&self) -> Stream<T>;
}

/// Receiving side of a node's error-report channel.
pub struct ErrReport {
    rx: mpsc::Receiver<NodeResult>,
}

impl ErrReport {
    /// Report channel for a `Node` implemented outside the provided shapes.
    ///
    /// The task owning the sender must send exactly one result per run.
    pub fn channel() -> (mpsc::Sender<NodeResult>, ErrReport) {
        let (tx, rx) = mpsc::channel(1);
        (tx, ErrReport { rx })
    }

    /// Wait for the run to end.
    ///
    /// Pends forever for a node that was never started.
    pub async fn recv(&mut self) -> NodeResult {
        match self.rx.recv().await {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    /// Poll for the terminal result without waiting.
    pub fn try_recv(&mut self) -> Option<NodeResult> {
        self.rx.try_recv().ok()
    }
}
