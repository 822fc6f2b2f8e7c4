use crate::error::PipelineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Teardown timing and cancellation policy of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Teardown deadline for a graph with at most one remaining child
    pub min_teardown_timeout_ms: u64,

    /// Extra deadline per decade of remaining children
    pub teardown_timeout_increment_ms: u64,

    /// Treat cancellation as a failure instead of a clean stop
    pub cancel_is_error: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_teardown_timeout_ms: 1000,
            teardown_timeout_increment_ms: 1000,
            cancel_is_error: false,
        }
    }
}

impl GraphConfig {
    /// Read the optional `graph_config` object; missing keys keep their defaults.
    pub fn from_json(config: &Value) -> Result<Self> {
        let section = &config["graph_config"];
        let parsed: Self = if section.is_null() {
            Self::default()
        } else {
            serde_json::from_value(section.clone())?
        };

        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.min_teardown_timeout_ms == 0 {
            return Err(PipelineError::Config(
                "min_teardown_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn min_teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.min_teardown_timeout_ms)
    }

    /// Deadline for `remaining` children to acknowledge cancellation:
    /// the minimum plus one increment per decade of children.
    pub fn teardown_timeout_for(&self, remaining: usize) -> Duration {
        let min = self.min_teardown_timeout();
        if remaining <= 1 {
            return min;
        }

        let decades = (remaining as f64).log10();
        let increment = Duration::from_millis(self.teardown_timeout_increment_ms);
        let extra = Duration::try_from_secs_f64(increment.as_secs_f64() * decades)
            .unwrap_or(Duration::MAX);
        min.saturating_add(extra)
    }
}
