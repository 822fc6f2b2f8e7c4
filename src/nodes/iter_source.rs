use super::SourceNode;
use crate::error::PipelineError;

/// A source emitting every item of `items`, then ending its stream cleanly.
pub fn iter_source<T, I>(name: impl Into<String>, items: I) -> SourceNode<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
{
    let mut items = items.into_iter();
    let mut node = SourceNode::new(name);
    node.step_func(move || items.next().ok_or_else(|| PipelineError::EndOfStream.into()));
    node
}
