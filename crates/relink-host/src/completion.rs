//! Pending completions.
//!
//! Async operations (connect, accept, receive, disconnect) register a
//! continuation and return a `Completion<T>` fulfilled later by the run
//! loop. A completion resolves exactly once: with a value, with an error,
//! or — if the fulfilling side disappears — with
//! `AsyncFailure(Abandoned)`. It is never silently dropped.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::channel::oneshot;
use relink_core::error::{AsyncFailureKind, ErrorKind, Result};

/// The eventual result of an async operation.
///
/// Consumable two ways: as a `Future` (for async callers) or through
/// [`Completion::try_take`] from tick-driven code that pumps
/// `Host::run` itself.
#[derive(Debug)]
pub struct Completion<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> Completion<T> {
    /// Creates a slot/completion pair.
    pub(crate) fn channel() -> (CompletionSlot<T>, Completion<T>) {
        let (sender, receiver) = oneshot::channel();
        (CompletionSlot { sender }, Completion { receiver })
    }

    /// Creates an already-resolved completion.
    pub(crate) fn ready(value: Result<T>) -> Completion<T> {
        let (slot, completion) = Self::channel();
        slot.fulfill(value);
        completion
    }

    /// Non-blocking check. `None` while still pending; `Some` once
    /// resolved. A dropped fulfilling side surfaces as
    /// `AsyncFailure(Abandoned)`.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(Some(value)) => Some(value),
            Ok(None) => None,
            Err(oneshot::Canceled) => {
                Some(Err(ErrorKind::AsyncFailure(AsyncFailureKind::Abandoned)))
            }
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(oneshot::Canceled)) => {
                Poll::Ready(Err(ErrorKind::AsyncFailure(AsyncFailureKind::Abandoned)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Fulfilling end of a completion. Consuming `fulfill` makes
/// at-most-once resolution structural.
#[derive(Debug)]
pub(crate) struct CompletionSlot<T> {
    sender: oneshot::Sender<Result<T>>,
}

impl<T> CompletionSlot<T> {
    /// Resolves the completion. A consumer that already abandoned its
    /// completion is tolerated; the value is dropped.
    pub(crate) fn fulfill(self, value: Result<T>) {
        let _ = self.sender.send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_fulfilled() {
        let (slot, mut completion) = Completion::<u32>::channel();
        assert!(completion.try_take().is_none());

        slot.fulfill(Ok(7));
        assert_eq!(completion.try_take(), Some(Ok(7)));
    }

    #[test]
    fn test_dropped_slot_surfaces_as_abandoned() {
        let (slot, mut completion) = Completion::<u32>::channel();
        drop(slot);
        assert_eq!(
            completion.try_take(),
            Some(Err(ErrorKind::AsyncFailure(AsyncFailureKind::Abandoned)))
        );
    }

    #[test]
    fn test_ready_completion_resolves_immediately() {
        let mut completion = Completion::ready(Ok(vec![1u8, 2, 3]));
        assert_eq!(completion.try_take(), Some(Ok(vec![1, 2, 3])));
    }

    #[test]
    fn test_fulfill_after_consumer_gone_is_tolerated() {
        let (slot, completion) = Completion::<u32>::channel();
        drop(completion);
        slot.fulfill(Ok(1)); // Must not panic
    }

    #[test]
    fn test_future_interface() {
        let (slot, completion) = Completion::<u32>::channel();
        slot.fulfill(Ok(42));
        assert_eq!(futures::executor::block_on(completion), Ok(42));
    }
}
