//! Cross-thread deferred-action queue.
//!
//! The sole sanctioned channel for a foreign thread to affect a host.
//! Enqueue is mutex-guarded; the run loop drains with a swap-and-clear
//! under the lock and executes outside it, so enqueue during drain is
//! safe and lands in the next tick.

use std::sync::{Arc, Mutex};

use crate::host::Host;

/// An action executed on the run-loop thread with exclusive host access.
pub type DeferredAction = Box<dyn FnOnce(&mut Host) + Send + 'static>;

#[derive(Default)]
pub(crate) struct DeferredQueue {
    actions: Mutex<Vec<DeferredAction>>,
}

impl DeferredQueue {
    pub(crate) fn push(&self, action: DeferredAction) {
        self.actions.lock().expect("deferred queue poisoned").push(action);
    }

    /// Swap-and-clear under the lock; callers execute the returned actions
    /// outside it.
    pub(crate) fn drain(&self) -> Vec<DeferredAction> {
        std::mem::take(&mut *self.actions.lock().expect("deferred queue poisoned"))
    }
}

impl std::fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.actions.lock().map(|a| a.len()).unwrap_or(0);
        f.debug_struct("DeferredQueue").field("pending", &len).finish()
    }
}

/// Cloneable, `Send` handle for enqueuing actions from any thread.
///
/// Actions run during the next tick's drain point, strictly before that
/// tick's service step and event drain.
#[derive(Clone, Debug)]
pub struct DeferredHandle {
    queue: Arc<DeferredQueue>,
}

impl DeferredHandle {
    pub(crate) fn new(queue: Arc<DeferredQueue>) -> Self {
        Self { queue }
    }

    /// Enqueues an action for the run-loop thread.
    pub fn push<F>(&self, action: F)
    where
        F: FnOnce(&mut Host) + Send + 'static,
    {
        self.queue.push(Box::new(action));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_drain_preserves_enqueue_order() {
        let queue = Arc::new(DeferredQueue::default());
        let handle = DeferredHandle::new(queue.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            handle.push(move |_| log.lock().unwrap().push(i));
        }

        // Drained actions are executed outside the lock, in order. Run them
        // against a scratch host.
        let transport = crate::loopback::LoopbackTransport::new_shared();
        let mut host = Host::new(transport, relink_core::HostConfig::default()).unwrap();
        for action in queue.drain() {
            action(&mut host);
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_enqueue_during_drain_lands_in_next_batch() {
        let queue = Arc::new(DeferredQueue::default());
        let handle = DeferredHandle::new(queue.clone());
        let fired = Arc::new(AtomicUsize::new(0));

        {
            let handle = handle.clone();
            let fired = fired.clone();
            handle.clone().push(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
                // Re-entrant enqueue while the first batch executes.
                let fired = fired.clone();
                handle.push(move |_| {
                    fired.fetch_add(10, Ordering::SeqCst);
                });
            });
        }

        let transport = crate::loopback::LoopbackTransport::new_shared();
        let mut host = Host::new(transport, relink_core::HostConfig::default()).unwrap();

        for action in queue.drain() {
            action(&mut host);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        for action in queue.drain() {
            action(&mut host);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_handle_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let queue = Arc::new(DeferredQueue::default());
        let handle = DeferredHandle::new(queue);
        assert_send(&handle);

        let fired = Arc::new(AtomicUsize::new(0));
        let thread_fired = fired.clone();
        let thread_handle = handle.clone();
        std::thread::spawn(move || {
            thread_handle.push(move |_| {
                thread_fired.fetch_add(1, Ordering::SeqCst);
            });
        })
        .join()
        .unwrap();
    }
}
