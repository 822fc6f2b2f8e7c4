use crate::core::lifecycle::{BlockingStep, Cycle, Lifecycle};
use crate::core::stream::{blocking_recv, blocking_send, Outlet, Stream, StreamSender};
use crate::core::{Node, StreamerNode};
use crate::error::PipelineError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type StepFn<T> = Box<dyn FnMut(T) -> anyhow::Result<T> + Send>;

/// One input, one output of the same type.
///
/// The step may hand back the very value it received, e.g. after editing a
/// frame in place.
pub struct TransformerNode<T> {
    lifecycle: Lifecycle,
    input: Stream<T>,
    output: Outlet<T>,
    step: Option<StepFn<T>>,
}

impl<T: Send + 'static> TransformerNode<T> {
    pub fn new(name: impl Into<String>, input: Stream<T>) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            input,
            output: Outlet::new(),
            step: None,
        }
    }

    lifecycle_setters!();

    pub fn step_func(
        &mut self,
        step: impl FnMut(T) -> anyhow::Result<T> + Send + 'static,
    ) -> &mut Self {
        self.step = Some(Box::new(step));
        self
    }

    pub fn stream(&self) -> Stream<T> {
        self.output.stream()
    }
}

impl<T: Send + 'static> Node for TransformerNode<T> {
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
            TransformerCycle {
                input: self.input.clone(),
                output,
                step: BlockingStep::new(step, metrics),
            },
        );
    }
}

impl<T: Send + 'static> StreamerNode<T> for TransformerNode<T> {
    fn stream(&self) -> Stream<T> {
        self.output.stream()
    }
}

struct TransformerCycle<T> {
    input: Stream<T>,
    output: StreamSender<T>,
    step: BlockingStep<StepFn<T>>,
}

#[async_trait]
impl<T: Send + 'static> Cycle for TransformerCycle<T> {
    async fn cycle(&mut self, ctx: &CancellationToken) -> Result<(), PipelineError> {
        let value = blocking_recv(ctx, &self.input).await?;

        let value = self.step.call(move |step| step(value)).await?;

        blocking_send(ctx, &self.output, value).await
    }
}
