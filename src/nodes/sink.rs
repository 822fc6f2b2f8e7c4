use crate::core::lifecycle::{BlockingStep, Cycle, Lifecycle};
use crate::core::stream::{blocking_recv, Stream};
use crate::core::Node;
use crate::error::PipelineError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type StepFn<T> = Box<dyn FnMut(T) -> anyhow::Result<()> + Send>;

/// One input, no output: the terminal consumer of a stream.
pub struct SinkNode<T> {
    lifecycle: Lifecycle,
    input: Stream<T>,
    step: Option<StepFn<T>>,
}

impl<T: Send + 'static> SinkNode<T> {
    pub fn new(name: impl Into<String>, input: Stream<T>) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            input,
            step: None,
        }
    }

    lifecycle_setters!();

    pub fn step_func(
        &mut self,
        step: impl FnMut(T) -> anyhow::Result<()> + Send + 'static,
    ) -> &mut Self {
        self.step = Some(Box::new(step));
        self
    }
}

impl<T: Send + 'static> Node for SinkNode<T> {
    node_identity!();

    fn run(&mut self, ctx: CancellationToken) {
        let Some(step) = self.step.take() else {
            return;
        };
        let metrics = Arc::clone(self.lifecycle.metrics());
        self.lifecycle.spawn(
            ctx,
            SinkCycle {
                input: self.input.clone(),
                step: BlockingStep::new(step, metrics),
            },
        );
    }
}

struct SinkCycle<T> {
    input: Stream<T>,
    step: BlockingStep<StepFn<T>>,
}

#[async_trait]
impl<T: Send + 'static> Cycle for SinkCycle<T> {
    async fn cycle(&mut self, ctx: &CancellationToken) -> Result<(), PipelineError> {
        let value = blocking_recv(ctx, &self.input).await?;

        self.step.call(move |step| step(value)).await
    }
}
