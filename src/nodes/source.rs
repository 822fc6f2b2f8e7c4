use crate::core::lifecycle::{BlockingStep, Cycle, Lifecycle};
use crate::core::stream::{blocking_send, Outlet, Stream, StreamSender};
use crate::core::{Node, StreamerNode};
use crate::error::PipelineError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type StepFn<T> = Box<dyn FnMut() -> anyhow::Result<T> + Send>;

/// No input, one output: wraps an external producer such as a capture device.
pub struct SourceNode<T> {
    lifecycle: Lifecycle,
    output: Outlet<T>,
    step: Option<StepFn<T>>,
}

impl<T: Send + 'static> SourceNode<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            output: Outlet::new(),
            step: None,
        }
    }

    lifecycle_setters!();

    /// Install the producer.
    ///
    /// Returning `PipelineError::EndOfStream` stops the node cleanly.
    pub fn step_func(
        &mut self,
        step: impl FnMut() -> anyhow::Result<T> + Send + 'static,
    ) -> &mut Self {
        self.step = Some(Box::new(step));
        self
    }

    pub fn stream(&self) -> Stream<T> {
        self.output.stream()
    }
}

impl<T: Send + 'static> Node for SourceNode<T> {
    node_identity!();

    fn run(&mut self, ctx: CancellationToken) {
        let Some(step) = self.step.take() else {
            return;
        };
        let Some(output) = self.output.take_sender() else {
            return;
        };
        let metrics = Arc::clone(self.lifecycle.metrics());
        self.lifecycle.spawn(
            ctx,
            SourceCycle {
                output,
                step: BlockingStep::new(step, metrics),
            },
        );
    }
}

impl<T: Send + 'static> StreamerNode<T> for SourceNode<T> {
    fn stream(&self) -> Stream<T> {
        self.output.stream()
    }
}

struct SourceCycle<T> {
    output: StreamSender<T>,
    step: BlockingStep<StepFn<T>>,
}

#[async_trait]
impl<T: Send + 'static> Cycle for SourceCycle<T> {
    async fn cycle(&mut self, ctx: &CancellationToken) -> Result<(), PipelineError> {
        let value = self.step.call(|step| step()).await?;

        blocking_send(ctx, &self.output, value).await
    }
}
