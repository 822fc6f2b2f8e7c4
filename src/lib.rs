//! Concurrent dataflow graphs: stages connected by rendezvous streams,
//! supervised and torn down as a unit.

pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod nodes;
pub mod observability;

pub use crate::core::{stream, Node, Stream, StreamerNode};
pub use engine::{Graph, GraphConfig, GraphState};
pub use error::{GraphFailure, NodeResult, PipelineError};
