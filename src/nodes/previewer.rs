use crate::core::lifecycle::{BlockingStep, Cycle, Lifecycle};
use crate::core::stream::{
    blocking_recv, blocking_send, non_blocking_send, Outlet, Stream, StreamSender,
};
use crate::core::{Node, StreamerNode};
use crate::error::PipelineError;
use crate::observability::NodeMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type StepFn<T, P> = Box<dyn FnMut(&T) -> anyhow::Result<P> + Send>;

/// One input, a pass-through output and a best-effort preview output.
///
/// Each value is forwarded before its preview is computed, so the primary
/// stream never waits on preview generation. A preview nobody is waiting for
/// is dropped for that cycle.
pub struct PreviewerNode<T, P> {
    lifecycle: Lifecycle,
    input: Stream<T>,
    output: Outlet<T>,
    preview_output: Outlet<P>,
    step: Option<StepFn<T, P>>,
}

impl<T, P> PreviewerNode<T, P>
where
    T: Clone + Send + 'static,
    P: Send + 'static,
{
    pub fn new(name: impl Into<String>, input: Stream<T>) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            input,
            output: Outlet::new(),
            preview_output: Outlet::new(),
            step: None,
        }
    }

    /// A previewer named `<streamer>:PREVIEW` tapping the streamer's output.
    ///
    /// Downstream stages must read from the previewer's `stream()` instead.
    pub fn wrap<S: StreamerNode<T> + ?Sized>(streamer: &S) -> Self {
        Self::new(format!("{}:PREVIEW", streamer.name()), streamer.stream())
    }

    lifecycle_setters!();

    /// Install the step deriving a preview from each value.
    pub fn step_func(
        &mut self,
        step: impl FnMut(&T) -> anyhow::Result<P> + Send + 'static,
    ) -> &mut Self {
        self.step = Some(Box::new(step));
        self
    }

    pub fn stream(&self) -> Stream<T> {
        self.output.stream()
    }

    pub fn preview(&self) -> Stream<P> {
        self.preview_output.stream()
    }
}

impl<T, P> Node for PreviewerNode<T, P>
where
    T: Clone + Send + 'static,
    P: Send + 'static,
{
    node_identity!();

    fn run(&mut self, ctx: CancellationToken) {
        let Some(step) = self.step.take() else {
            return;
        };
        let (Some(output), Some(preview_output)) = (
            self.output.take_sender(),
            self.preview_output.take_sender(),
        ) else {
            return;
        };
        let metrics = Arc::clone(self.lifecycle.metrics());
        self.lifecycle.spawn(
            ctx,
            PreviewerCycle {
                input: self.input.clone(),
                output,
                preview_output,
                step: BlockingStep::new(step, Arc::clone(&metrics)),
                metrics,
            },
        );
    }
}

impl<T, P> StreamerNode<T> for PreviewerNode<T, P>
where
    T: Clone + Send + 'static,
    P: Send + 'static,
{
    fn stream(&self) -> Stream<T> {
        self.output.stream()
    }
}

struct PreviewerCycle<T, P> {
    input: Stream<T>,
    output: StreamSender<T>,
    preview_output: StreamSender<P>,
    step: BlockingStep<StepFn<T, P>>,
    metrics: Arc<NodeMetrics>,
}

#[async_trait]
impl<T, P> Cycle for PreviewerCycle<T, P>
where
    T: Clone + Send + 'static,
    P: Send + 'static,
{
    async fn cycle(&mut self, ctx: &CancellationToken) -> Result<(), PipelineError> {
        let original = blocking_recv(ctx, &self.input).await?;

        blocking_send(ctx, &self.output, original.clone()).await?;

        let preview = self.step.call(move |step| step(&original)).await?;

        match non_blocking_send(ctx, &self.preview_output, preview) {
            Err(PipelineError::NotSent) => {
                self.metrics.record_preview_dropped();
                Ok(())
            }
            // Nobody watches the preview any more; the primary stream carries on.
            Err(PipelineError::Disconnected) => Ok(()),
            result => result,
        }
    }
}
