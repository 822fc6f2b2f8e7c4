use crate::core::lifecycle::{BlockingStep, Cycle, Lifecycle};
use crate::core::stream::{blocking_recv, blocking_send, Outlet, Stream, StreamSender};
use crate::core::{Node, StreamerNode};
use crate::error::PipelineError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type StepFn<In, Out> = Box<dyn FnMut(In) -> anyhow::Result<Out> + Send>;

/// One input, one output of a different type.
pub struct ConverterNode<In, Out> {
    lifecycle: Lifecycle,
    input: Stream<In>,
    output: Outlet<Out>,
    step: Option<StepFn<In, Out>>,
}

impl<In: Send + 'static, Out: Send + 'static> ConverterNode<In, Out> {
    pub fn new(name: impl Into<String>, input: Stream<In>) -> Self {
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
        step: impl FnMut(In) -> anyhow::Result<Out> + Send + 'static,
    ) -> &mut Self {
        self.step = Some(Box::new(step));
        self
    }

    pub fn stream(&self) -> Stream<Out> {
        self.output.stream()
    }
}

impl<In: Send + 'static, Out: Send + 'static> Node for ConverterNode<In, Out> {
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
            ConverterCycle {
                input: self.input.clone(),
                output,
                step: BlockingStep::new(step, metrics),
            },
        );
    }
}

impl<In: Send + 'static, Out: Send + 'static> StreamerNode<Out> for ConverterNode<In, Out> {
    fn stream(&self) -> Stream<Out> {
        self.output.stream()
    }
}

struct ConverterCycle<In, Out> {
    input: Stream<In>,
    output: StreamSender<Out>,
    step: BlockingStep<StepFn<In, Out>>,
}

#[async_trait]
impl<In: Send + 'static, Out: Send + 'static> Cycle for ConverterCycle<In, Out> {
    async fn cycle(&mut self, ctx: &CancellationToken) -> Result<(), PipelineError> {
        let value = blocking_recv(ctx, &self.input).await?;

        let converted = self.step.call(move |step| step(value)).await?;

        blocking_send(ctx, &self.output, converted).await
    }
}
