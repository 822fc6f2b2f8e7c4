pub(crate) mod lifecycle;
pub mod node;
pub mod stream;

pub use node::{ErrReport, Node, SetupFn, StreamerNode, TeardownFn};
pub use stream::{
    blocking_recv, blocking_send, non_blocking_recv, non_blocking_send, stream, Stream,
    StreamSender,
};
