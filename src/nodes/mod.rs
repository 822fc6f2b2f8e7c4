//! The seven node shapes, plus a couple of ready-made stages built on them.
//!
//! Every shape follows the same lifecycle: `setup` once, `step` in a loop
//! over its streams, `teardown` once, then exactly one report on `err()`.

/// `setup_func` / `teardown_func`, identical on every shape.
macro_rules! lifecycle_setters {
    () => {
        /// Install the callback run once before the first step.
        pub fn setup_func(
            &mut self,
            setup: impl FnOnce() -> ::anyhow::Result<()> + Send + 'static,
        ) -> &mut Self {
            self.lifecycle.set_setup(Box::new(setup));
            self
        }

        /// Install the callback run once after the last step, on every exit path.
        pub fn teardown_func(
            &mut self,
            teardown: impl FnOnce() -> ::anyhow::Result<()> + Send + 'static,
        ) -> &mut Self {
            self.lifecycle.set_teardown(Box::new(teardown));
            self
        }
    };
}

/// The `Node` methods that only depend on the shared lifecycle.
macro_rules! node_identity {
    () => {
        fn name(&self) -> &str {
            self.lifecycle.name()
        }

        fn err(&mut self) -> &mut $crate::core::ErrReport {
            self.lifecycle.report()
        }

        fn metrics(&self) -> Option<::std::sync::Arc<$crate::observability::NodeMetrics>> {
            Some(::std::sync::Arc::clone(self.lifecycle.metrics()))
        }
    };
}

pub mod cloner;
pub mod combiner;
pub mod converter;
pub mod iter_source;
pub mod log_sink;
pub mod previewer;
pub mod sink;
pub mod source;
pub mod transformer;

pub use cloner::ClonerNode;
pub use combiner::CombinerNode;
pub use converter::ConverterNode;
pub use iter_source::iter_source;
pub use log_sink::log_sink;
pub use previewer::PreviewerNode;
pub use sink::SinkNode;
pub use source::SourceNode;
pub use transformer::TransformerNode;
