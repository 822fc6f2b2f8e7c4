//! Setup → step loop → teardown driver shared by every node shape.

use crate::core::node::{ErrReport, SetupFn, TeardownFn};
use crate::error::{NodeResult, PipelineError};
use crate::observability::NodeMetrics;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One receive → step → send round of a node shape.
#[async_trait]
pub(crate) trait Cycle: Send + 'static {
    async fn cycle(&mut self, ctx: &CancellationToken) -> Result<(), PipelineError>;
}

/// State every node shape carries: identity, lifecycle callbacks and the report channel.
pub(crate) struct Lifecycle {
    name: String,
    setup: Option<SetupFn>,
    teardown: Option<TeardownFn>,
    report_tx: mpsc::Sender<NodeResult>,
    report: ErrReport,
    metrics: Arc<NodeMetrics>,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (report_tx, report) = ErrReport::channel();
        Self {
            metrics: Arc::new(NodeMetrics::new(&name)),
            name,
            setup: None,
            teardown: None,
            report_tx,
            report,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_setup(&mut self, setup: SetupFn) {
        self.setup = Some(setup);
    }

    pub fn set_teardown(&mut self, teardown: TeardownFn) {
        self.teardown = Some(teardown);
    }

    pub fn report(&mut self) -> &mut ErrReport {
        &mut self.report
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    /// Spawn the node task driving `cycle` until it fails, is cancelled or the stream ends.
    pub fn spawn<C: Cycle>(&mut self, ctx: CancellationToken, cycle: C) {
        let run = Run {
            name: self.name.clone(),
            setup: self.setup.take(),
            teardown: self.teardown.take(),
            report_tx: self.report_tx.clone(),
            metrics: Arc::clone(&self.metrics),
        };
        tokio::spawn(run.drive(ctx, cycle));
    }
}

struct Run {
    name: String,
    setup: Option<SetupFn>,
    teardown: Option<TeardownFn>,
    report_tx: mpsc::Sender<NodeResult>,
    metrics: Arc<NodeMetrics>,
}

impl Run {
    async fn drive<C: Cycle>(self, ctx: CancellationToken, mut cycle: C) {
        debug!(node = %self.name, "Node started");

        let result = AssertUnwindSafe(execute(
            &self.name,
            self.setup,
            self.teardown,
            &ctx,
            &mut cycle,
        ))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(&*panic))));

        // Closes our outputs so consumers see the end of the stream.
        drop(cycle);

        match &result {
            Ok(()) => debug!(node = %self.name, "Node stopped"),
            Err(err) if err.is_cancelled() => debug!(node = %self.name, "Node cancelled"),
            Err(err) => {
                self.metrics.record_error();
                debug!(node = %self.name, error = %err, "Node failed");
            }
        }

        // The node keeps its own sender, so this fails only once the node itself is gone.
        let _ = self.report_tx.send(result).await;
    }
}

async fn execute<C: Cycle>(
    node: &str,
    setup: Option<SetupFn>,
    teardown: Option<TeardownFn>,
    ctx: &CancellationToken,
    cycle: &mut C,
) -> NodeResult {
    if let Some(setup) = setup {
        // Nothing was acquired on failure, so teardown is not armed yet.
        offload(setup).await?.map_err(PipelineError::Setup)?;
    }
    let teardown = TeardownGuard {
        node: node.to_string(),
        teardown,
    };

    let loop_err = loop {
        if let Err(err) = cycle.cycle(ctx).await {
            break err;
        }
    };
    let loop_err = (!loop_err.is_end_of_stream()).then_some(loop_err);

    match PipelineError::flatten(loop_err.into_iter().chain(teardown.run().await.err())) {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

/// Run a blocking callback on the blocking pool so async workers and timers stay live.
pub(crate) async fn offload<R, F>(callback: F) -> Result<R, PipelineError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(callback)
        .await
        .map_err(|err| match err.try_into_panic() {
            Ok(panic) => PipelineError::Panicked(panic_message(&*panic)),
            Err(err) => PipelineError::Panicked(err.to_string()),
        })
}

/// A step callback that moves onto the blocking pool for each call and back.
pub(crate) struct BlockingStep<F> {
    step: Option<F>,
    metrics: Arc<NodeMetrics>,
}

impl<F: Send + 'static> BlockingStep<F> {
    pub fn new(step: F, metrics: Arc<NodeMetrics>) -> Self {
        Self {
            step: Some(step),
            metrics,
        }
    }

    /// Invoke the step through `call`, timing it into the node's metrics.
    pub async fn call<R>(
        &mut self,
        call: impl FnOnce(&mut F) -> anyhow::Result<R> + Send + 'static,
    ) -> Result<R, PipelineError>
    where
        R: Send + 'static,
    {
        // Only missing after a previous call panicked, which already ended the loop.
        let Some(mut step) = self.step.take() else {
            return Err(PipelineError::Panicked("step lost to an earlier panic".to_string()));
        };
        let metrics = Arc::clone(&self.metrics);

        let (step, result) = offload(move || {
            let result = metrics.measure(|| call(&mut step));
            (step, result)
        })
        .await?;

        self.step = Some(step);
        result.map_err(PipelineError::from_step)
    }
}

/// Runs the teardown callback exactly once, including when the task is
/// dropped or unwinds mid-loop.
struct TeardownGuard {
    node: String,
    teardown: Option<TeardownFn>,
}

impl TeardownGuard {
    async fn run(mut self) -> NodeResult {
        match self.teardown.take() {
            Some(teardown) => offload(teardown).await?.map_err(PipelineError::Teardown),
            None => Ok(()),
        }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            if let Err(err) = teardown() {
                warn!(node = %self.node, error = %format!("{err:#}"), "Teardown error after abort");
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails on the given round, succeeds before it.
    struct FailAt {
        round: usize,
        err: fn() -> PipelineError,
    }

    #[async_trait]
    impl Cycle for FailAt {
        async fn cycle(&mut self, _ctx: &CancellationToken) -> Result<(), PipelineError> {
            self.round = self.round.saturating_sub(1);
            if self.round == 0 {
                return Err((self.err)());
            }
            Ok(())
        }
    }

    fn counted(counter: &Arc<AtomicUsize>, fail: bool) -> TeardownFn {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            if fail {
                anyhow::bail!("release failed");
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_setup_failure_skips_teardown() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let mut lifecycle = Lifecycle::new("cam");
        lifecycle.set_setup(Box::new(|| Err(anyhow!("no device"))));
        lifecycle.set_teardown(counted(&teardowns, false));

        lifecycle.spawn(
            CancellationToken::new(),
            FailAt { round: 1, err: || PipelineError::Cancelled },
        );

        let err = lifecycle.report().recv().await.unwrap_err();
        assert_eq!(err.to_string(), "setup error: no device");
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_setup_skips_teardown() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let mut lifecycle = Lifecycle::new("cam");
        lifecycle.set_setup(Box::new(|| -> anyhow::Result<()> { panic!("open failed") }));
        lifecycle.set_teardown(counted(&teardowns, false));

        lifecycle.spawn(
            CancellationToken::new(),
            FailAt { round: 1, err: || PipelineError::Cancelled },
        );

        let err = lifecycle.report().recv().await.unwrap_err();
        assert!(matches!(err, PipelineError::Panicked(ref msg) if msg == "open failed"));
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blocking_step_keeps_state_between_calls() {
        let metrics = Arc::new(NodeMetrics::new("counter"));
        let mut total = 0u32;
        let mut step = BlockingStep::new(
            move |value: u32| -> anyhow::Result<u32> {
                total += value;
                Ok(total)
            },
            Arc::clone(&metrics),
        );

        assert_eq!(step.call(|step| step(2)).await.unwrap(), 2);
        assert_eq!(step.call(|step| step(3)).await.unwrap(), 5);
        assert_eq!(metrics.steps_completed(), 2);
    }

    #[tokio::test]
    async fn test_end_of_stream_is_a_clean_stop() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let mut lifecycle = Lifecycle::new("file");
        lifecycle.set_teardown(counted(&teardowns, false));

        lifecycle.spawn(
            CancellationToken::new(),
            FailAt { round: 3, err: || PipelineError::EndOfStream },
        );

        assert!(lifecycle.report().recv().await.is_ok());
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_error_reported_alongside_step_error() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let mut lifecycle = Lifecycle::new("fx");
        lifecycle.set_teardown(counted(&teardowns, true));

        lifecycle.spawn(
            CancellationToken::new(),
            FailAt { round: 2, err: || PipelineError::Step(anyhow!("bad frame")) },
        );

        let err = lifecycle.report().recv().await.unwrap_err();
        assert_eq!(err.to_string(), "bad frame, teardown error: release failed");
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert!(lifecycle.report().try_recv().is_none());
    }

    struct Panics;

    #[async_trait]
    impl Cycle for Panics {
        async fn cycle(&mut self, _ctx: &CancellationToken) -> Result<(), PipelineError> {
            panic!("kaboom");
        }
    }

    #[tokio::test]
    async fn test_panicking_step_still_reports_and_tears_down() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let mut lifecycle = Lifecycle::new("fragile");
        lifecycle.set_teardown(counted(&teardowns, false));

        lifecycle.spawn(CancellationToken::new(), Panics);

        let err = lifecycle.report().recv().await.unwrap_err();
        assert!(matches!(err, PipelineError::Panicked(ref msg) if msg == "kaboom"));
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.metrics().errors_count(), 1);
    }
}
