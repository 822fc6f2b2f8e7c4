//! Stream edges and the four transport primitives every node is built on.
//!
//! An edge is a rendezvous: a send completes only once a consumer has taken
//! the value, so a producer is never ahead of its consumer. Cancellation
//! always wins a tie against a ready transfer.

use crate::error::PipelineError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// A value handed to the edge, with the acknowledgement its sender waits on.
struct Offer<T> {
    value: T,
    ack: Option<oneshot::Sender<()>>,
}

impl<T> Offer<T> {
    /// Take the value, unless its sender gave up waiting for us.
    fn accept(self) -> Option<T> {
        match self.ack {
            Some(ack) => ack.send(()).ok().map(|()| self.value),
            None => Some(self.value),
        }
    }
}

/// Producer half of an edge, owned by exactly one node.
pub struct StreamSender<T> {
    tx: mpsc::Sender<Offer<T>>,
    parked: Arc<AtomicUsize>,
}

impl<T> Clone for StreamSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            parked: Arc::clone(&self.parked),
        }
    }
}

/// Consumer handle of an edge.
///
/// Clones share the same edge: values are competed for, never duplicated.
/// Use a Cloner or Previewer to fan a stream out.
pub struct Stream<T> {
    rx: Arc<Mutex<mpsc::Receiver<Offer<T>>>>,
    parked: Arc<AtomicUsize>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            parked: Arc::clone(&self.parked),
        }
    }
}

impl<T> Stream<T> {
    async fn recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        let _parked = Parked::enter(&self.parked);
        loop {
            if let Some(value) = rx.recv().await?.accept() {
                return Some(value);
            }
        }
    }

    fn try_recv(&self) -> Result<T, PipelineError> {
        // Another clone is mid-receive: nothing is available to us.
        let Ok(mut rx) = self.rx.try_lock() else {
            return Err(PipelineError::ReceivedNothing);
        };

        loop {
            match rx.try_recv() {
                Ok(offer) => {
                    if let Some(value) = offer.accept() {
                        return Ok(value);
                    }
                }
                Err(TryRecvError::Empty) => return Err(PipelineError::ReceivedNothing),
                Err(TryRecvError::Disconnected) => return Err(PipelineError::EndOfStream),
            }
        }
    }
}

/// Marks a consumer as waiting on the edge for as long as it is held.
struct Parked<'a>(&'a AtomicUsize);

impl<'a> Parked<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Create a rendezvous edge.
pub fn stream<T>() -> (StreamSender<T>, Stream<T>) {
    let (tx, rx) = mpsc::channel(1);
    let parked = Arc::new(AtomicUsize::new(0));
    (
        StreamSender {
            tx,
            parked: Arc::clone(&parked),
        },
        Stream {
            rx: Arc::new(Mutex::new(rx)),
            parked,
        },
    )
}

/// Output side of a node: the sender moves into the node task on `run`,
/// the consumer handle stays behind for downstream stages.
pub(crate) struct Outlet<T> {
    tx: Option<StreamSender<T>>,
    stream: Stream<T>,
}

impl<T> Outlet<T> {
    pub fn new() -> Self {
        let (tx, stream) = stream();
        Self {
            tx: Some(tx),
            stream,
        }
    }

    pub fn stream(&self) -> Stream<T> {
        self.stream.clone()
    }

    pub fn take_sender(&mut self) -> Option<StreamSender<T>> {
        self.tx.take()
    }
}

/// Wait until a consumer has taken `value` or `ctx` is cancelled.
pub async fn blocking_send<T>(
    ctx: &CancellationToken,
    tx: &StreamSender<T>,
    value: T,
) -> Result<(), PipelineError> {
    let (ack, delivered) = oneshot::channel();
    let handover = async {
        tx.tx
            .send(Offer {
                value,
                ack: Some(ack),
            })
            .await
            .map_err(|_| PipelineError::Disconnected)?;
        // The ack is dropped unanswered only when every consumer is gone.
        delivered.await.map_err(|_| PipelineError::Disconnected)
    };

    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(PipelineError::Cancelled),
        res = handover => res,
    }
}

/// Hand `value` over only if a consumer is waiting for it right now.
pub fn non_blocking_send<T>(
    ctx: &CancellationToken,
    tx: &StreamSender<T>,
    value: T,
) -> Result<(), PipelineError> {
    if ctx.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    if tx.tx.is_closed() {
        return Err(PipelineError::Disconnected);
    }
    if tx.parked.load(Ordering::SeqCst) == 0 {
        return Err(PipelineError::NotSent);
    }

    tx.tx
        .try_send(Offer { value, ack: None })
        .map_err(|err| match err {
            TrySendError::Full(_) => PipelineError::NotSent,
            TrySendError::Closed(_) => PipelineError::Disconnected,
        })
}

/// Wait for the next value or for `ctx` to be cancelled.
pub async fn blocking_recv<T>(
    ctx: &CancellationToken,
    stream: &Stream<T>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(PipelineError::Cancelled),
        value = stream.recv() => value.ok_or(PipelineError::EndOfStream),
    }
}

/// Take a value only if a producer is offering one right now.
pub fn non_blocking_recv<T>(
    ctx: &CancellationToken,
    stream: &Stream<T>,
) -> Result<T, PipelineError> {
    if ctx.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    stream.try_recv()
}
