use crate::core::lifecycle::{BlockingStep, Cycle, Lifecycle};
use crate::core::stream::{blocking_recv, blocking_send, Outlet, Stream, StreamSender};
use crate::core::{Node, StreamerNode};
use crate::error::PipelineError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type StepFn<A, B, C> = Box<dyn FnMut(A, B) -> anyhow::Result<C> + Send>;

/// Two inputs, one output.
///
/// Every cycle receives from input A, then from input B. A stalled A input
/// stalls B as well; the inputs are never drained independently.
pub struct CombinerNode<A, B, C> {
    lifecycle: Lifecycle,
    input_a: Stream<A>,
    input_b: Stream<B>,
    output: Outlet<C>,
    step: Option<StepFn<A, B, C>>,
}

impl<A, B, C> CombinerNode<A, B, C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    pub fn new(name: impl Into<String>, input_a: Stream<A>, input_b: Stream<B>) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            input_a,
            input_b,
            output: Outlet::new(),
            step: None,
        }
    }

    lifecycle_setters!();

    pub fn step_func(
        &mut self,
        step: impl FnMut(A, B) -> anyhow::Result<C> + Send + 'static,
    ) -> &mut Self {
        self.step = Some(Box::new(step));
        self
    }

    pub fn stream(&self) -> Stream<C> {
        self.output.stream()
    }
}

impl<A, B, C> Node for CombinerNode<A, B, C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
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
            CombinerCycle {
                input_a: self.input_a.clone(),
                input_b: self.input_b.clone(),
                output,
                step: BlockingStep::new(step, metrics),
            },
        );
    }
}

impl<A, B, C> StreamerNode<C> for CombinerNode<A, B, C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    fn stream(&self) -> Stream<C> {
        self.output.stream()
    }
}

struct CombinerCycle<A, B, C> {
    input_a: Stream<A>,
    input_b: Stream<B>,
    output: StreamSender<C>,
    step: BlockingStep<StepFn<A, B, C>>,
}

#[async_trait]
impl<A, B, C> Cycle for CombinerCycle<A, B, C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    async fn cycle(&mut self, ctx: &CancellationToken) -> Result<(), PipelineError> {
        let a = blocking_recv(ctx, &self.input_a).await?;
        let b = blocking_recv(ctx, &self.input_b).await?;

        let combined = self.step.call(move |step| step(a, b)).await?;

        blocking_send(ctx, &self.output, combined).await
    }
}
