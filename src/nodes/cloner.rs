use crate::core::lifecycle::{BlockingStep, Cycle, Lifecycle};
use crate::core::stream::{blocking_recv, blocking_send, Outlet, Stream, StreamSender};
use crate::core::{Node, StreamerNode};
use crate::error::PipelineError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type StepFn<T> = Box<dyn FnMut(&T) -> anyhow::Result<T> + Send>;

/// One input, two outputs: the original values and a copy of each.
///
/// Both outputs see every value. The copy is sent after the original and
/// both sends block, so a slow copy consumer holds back the primary stream
/// without ever reordering it.
pub struct ClonerNode<T> {
    lifecycle: Lifecycle,
    input: Stream<T>,
    output: Outlet<T>,
    clone_output: Outlet<T>,
    step: Option<StepFn<T>>,
}

impl<T: Send + 'static> ClonerNode<T> {
    pub fn new(name: impl Into<String>, input: Stream<T>) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            input,
            output: Outlet::new(),
            clone_output: Outlet::new(),
            step: None,
        }
    }

    lifecycle_setters!();

    /// Install the step producing the copy of each value.
    pub fn step_func(
        &mut self,
        step: impl FnMut(&T) -> anyhow::Result<T> + Send + 'static,
    ) -> &mut Self {
        self.step = Some(Box::new(step));
        self
    }

    pub fn stream(&self) -> Stream<T> {
        self.output.stream()
    }

    pub fn clone_stream(&self) -> Stream<T> {
        self.clone_output.stream()
    }
}

impl<T: Clone + Send + 'static> ClonerNode<T> {
    /// A cloner copying values with `Clone`.
    pub fn with_clone(name: impl Into<String>, input: Stream<T>) -> Self {
        let mut node = Self::new(name, input);
        node.step_func(|value: &T| Ok(value.clone()));
        node
    }
}

impl<T: Send + 'static> Node for ClonerNode<T> {
    node_identity!();

    fn run(&mut self, ctx: CancellationToken) {
        let Some(step) = self.step.take() else {
            return;
        };
        let (Some(output), Some(clone_output)) = (
            self.output.take_sender(),
            self.clone_output.take_sender(),
        ) else {
            return;
        };
        let metrics = Arc::clone(self.lifecycle.metrics());
        self.lifecycle.spawn(
            ctx,
            ClonerCycle {
                input: self.input.clone(),
                output,
                clone_output,
                step: BlockingStep::new(step, metrics),
            },
        );
    }
}

impl<T: Send + 'static> StreamerNode<T> for ClonerNode<T> {
    fn stream(&self) -> Stream<T> {
        self.output.stream()
    }
}

struct ClonerCycle<T> {
    input: Stream<T>,
    output: StreamSender<T>,
    clone_output: StreamSender<T>,
    step: BlockingStep<StepFn<T>>,
}

#[async_trait]
impl<T: Send + 'static> Cycle for ClonerCycle<T> {
    async fn cycle(&mut self, ctx: &CancellationToken) -> Result<(), PipelineError> {
        let original = blocking_recv(ctx, &self.input).await?;

        // The original rides along to the blocking pool and comes back with its copy.
        let (original, copy) = self
            .step
            .call(move |step| step(&original).map(|copy| (original, copy)))
            .await?;

        blocking_send(ctx, &self.output, original).await?;
        blocking_send(ctx, &self.clone_output, copy).await
    }
}
