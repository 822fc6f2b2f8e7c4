use super::SinkNode;
use crate::core::Stream;
use std::fmt::Debug;
use tracing::info;

/// A sink logging every value it receives with its sequence number.
pub fn log_sink<T>(name: impl Into<String>, input: Stream<T>) -> SinkNode<T>
where
    T: Debug + Send + 'static,
{
    let label: String = name.into();
    let mut node = SinkNode::new(label.clone(), input);
    let mut sequence_id = 0u64;
    node.step_func(move |value| {
        info!(sink = %label, sequence_id, ?value, "Received");
        sequence_id += 1;
        Ok(())
    });
    node
}
