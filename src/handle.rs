use super::{
    errors::BridgeError,
    model::DelegationState,
    result::BridgeResult,
};
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};
use tokio::sync::oneshot;

/// Job executed by a pool worker thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Awaitable outcome of one delegation.
///
/// Resolves to the work item's output, or to the `BridgeError` that kept it
/// from producing one. Dropping the handle does not stop the work item.
pub struct JoinHandle<T> {
    id: u64,
    settled: Arc<AtomicBool>,
    receiver: oneshot::Receiver<BridgeResult<T>>,
}

impl<T> JoinHandle<T> {

    pub(crate) fn new
    (
        id: u64,
        settled: Arc<AtomicBool>,
        receiver: oneshot::Receiver<BridgeResult<T>>,
    ) -> Self {
        Self {
            id,
            settled,
            receiver,
        }
    }

    /// A handle that is already settled with `error`.
    pub(crate) fn failed(id: u64, error: BridgeError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self::new(id, Arc::new(AtomicBool::new(true)), rx)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn state(&self) -> DelegationState {
        if self.settled.load(Ordering::Acquire) {
            DelegationState::Settled
        } else {
            DelegationState::Pending
        }
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.state() == DelegationState::Settled
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = BridgeResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(BridgeError::ChannelClosed))),
            Poll::Pending => Poll::Pending,
        }
    }
}
