pub mod config;
pub mod graph;
pub mod state;

pub use config::GraphConfig;
pub use graph::Graph;
pub use state::GraphState;
