//! Error taxonomy for nodes, transport and graphs.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The cancellation token fired before the operation completed
    #[error("context canceled")]
    Cancelled,

    /// Non-blocking send found no consumer waiting
    #[error("value not sent")]
    NotSent,

    /// Non-blocking receive found nothing ready
    #[error("received nothing")]
    ReceivedNothing,

    /// Every producer of a stream has terminated, or a step signalled the end of its input
    #[error("end of stream")]
    EndOfStream,

    /// Every consumer of a stream is gone
    #[error("stream disconnected")]
    Disconnected,

    /// Not all children acknowledged shutdown within the deadline
    #[error("teardown timed out")]
    TeardownTimedOut,

    #[error("setup error: {0:#}")]
    Setup(anyhow::Error),

    #[error("teardown error: {0:#}")]
    Teardown(anyhow::Error),

    /// Domain failure reported by a step callback
    #[error("{0:#}")]
    Step(anyhow::Error),

    #[error("node panicked: {0}")]
    Panicked(String),

    #[error("node {0} failed")]
    NodeFailed(String),

    /// Several errors observed on one exit path
    #[error("{}", join(.0))]
    Multiple(Vec<PipelineError>),

    /// Aggregate failure of a whole graph run
    #[error("Graph {name} failed: {failure}")]
    Graph {
        name: String,
        failure: Box<GraphFailure>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result of one node run; `Ok(())` is a clean stop.
pub type NodeResult = Result<(), PipelineError>;

impl PipelineError {
    /// Turn a callback error back into a pipeline error when it carries one,
    /// otherwise tag it as a step failure.
    pub fn from_step(err: anyhow::Error) -> Self {
        match err.downcast::<PipelineError>() {
            Ok(err) => err,
            Err(err) => PipelineError::Step(err),
        }
    }

    /// Combine errors: none yields `None`, one yields itself, more yield `Multiple`.
    pub fn flatten(errs: impl IntoIterator<Item = PipelineError>) -> Option<PipelineError> {
        let mut errs: Vec<_> = errs.into_iter().collect();
        match errs.len() {
            0 => None,
            1 => errs.pop(),
            _ => Some(PipelineError::Multiple(errs)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, PipelineError::EndOfStream)
    }

    /// Graph failure details, if this is an aggregate graph error
    pub fn graph_failure(&self) -> Option<&GraphFailure> {
        match self {
            PipelineError::Graph { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

fn join(errs: &[PipelineError]) -> String {
    errs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything that went wrong during one graph run.
#[derive(Debug, Default)]
pub struct GraphFailure {
    pub main_loop: Option<PipelineError>,
    pub teardown: Option<PipelineError>,
    pub nodes: BTreeMap<String, PipelineError>,
}

impl GraphFailure {
    pub fn is_empty(&self) -> bool {
        self.main_loop.is_none() && self.teardown.is_none() && self.nodes.is_empty()
    }

    pub fn teardown_timed_out(&self) -> bool {
        matches!(self.teardown, Some(PipelineError::TeardownTimedOut))
    }

    pub fn failed_nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}

impl fmt::Display for GraphFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(err) = &self.main_loop {
            write!(f, "[MainLoop: {}]", err)?;
        }
        if let Some(err) = &self.teardown {
            write!(f, "[TearDown: {}]", err)?;
        }
        for (name, err) in &self.nodes {
            write!(f, "[Node {}: {}]", name, err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_setup_error_display() {
        let err = PipelineError::Setup(anyhow!("camera busy"));
        assert_eq!(err.to_string(), "setup error: camera busy");
    }

    #[test]
    fn test_from_step_unwraps_pipeline_error() {
        let err = PipelineError::from_step(PipelineError::EndOfStream.into());
        assert!(err.is_end_of_stream());

        let err = PipelineError::from_step(anyhow!("bad frame"));
        assert!(matches!(err, PipelineError::Step(_)));
        assert_eq!(err.to_string(), "bad frame");
    }

    #[test]
    fn test_flatten() {
        assert!(PipelineError::flatten(Vec::new()).is_none());

        let single = PipelineError::flatten(vec![PipelineError::Cancelled]).unwrap();
        assert!(single.is_cancelled());

        let many = PipelineError::flatten(vec![
            PipelineError::Cancelled,
            PipelineError::Teardown(anyhow!("close failed")),
        ])
        .unwrap();
        assert_eq!(many.to_string(), "context canceled, teardown error: close failed");
    }

    #[test]
    fn test_graph_failure_display() {
        let mut failure = GraphFailure {
            main_loop: Some(PipelineError::NodeFailed("b".to_string())),
            teardown: Some(PipelineError::TeardownTimedOut),
            ..Default::default()
        };
        failure
            .nodes
            .insert("b".to_string(), PipelineError::Step(anyhow!("boom")));
        failure
            .nodes
            .insert("a".to_string(), PipelineError::Cancelled);

        let err = PipelineError::Graph {
            name: "fx".to_string(),
            failure: Box::new(failure),
        };
        assert_eq!(
            err.to_string(),
            "Graph fx failed: [MainLoop: node b failed][TearDown: teardown timed out]\
             [Node a: context canceled][Node b: boom]"
        );
        assert!(err.graph_failure().unwrap().teardown_timed_out());
    }
}
