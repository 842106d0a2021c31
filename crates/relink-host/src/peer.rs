//! Managed peer wrapper.
//!
//! Identity is the native handle, fixed at construction. The wrapper holds
//! no state machine of its own: `state()` is a read-through projection of
//! the native structure, `Uninitialized` once the handle is released.
//!
//! Per-peer subscriptions are explicit one-shot slots {connected, received,
//! disconnected}, each fulfilled at most once per subscription cycle by the
//! run loop. Receive is deliberately one-message-at-a-time: a fired
//! subscription is consumed and the consumer must resubscribe; packets that
//! arrive with no subscription installed wait in a FIFO inbox.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

use relink_core::{
    error::{AsyncFailureKind, ErrorKind, OperationErrorKind, ProtocolViolationKind},
    Delivery, PeerHandle, PeerState, Result, TransportRef,
};

use crate::{
    completion::{Completion, CompletionSlot},
    packet::Packet,
    registry::PeerRegistry,
};

struct PeerInner {
    transport: TransportRef,
    handle: Option<PeerHandle>,
    registry: Weak<RefCell<PeerRegistry>>,
    connected: Option<CompletionSlot<Peer>>,
    received: Option<CompletionSlot<Packet>>,
    disconnected: Option<CompletionSlot<u32>>,
    inbox: VecDeque<Packet>,
}

/// One remote connection endpoint.
///
/// Cloning yields another reference to the same identity; two clones
/// compare equal under [`Peer::is_same`].
#[derive(Clone)]
pub struct Peer {
    inner: Rc<RefCell<PeerInner>>,
}

impl Peer {
    pub(crate) fn new(
        transport: TransportRef,
        handle: PeerHandle,
        registry: Weak<RefCell<PeerRegistry>>,
    ) -> Peer {
        Peer {
            inner: Rc::new(RefCell::new(PeerInner {
                transport,
                handle: Some(handle),
                registry,
                connected: None,
                received: None,
                disconnected: None,
                inbox: VecDeque::new(),
            })),
        }
    }

    /// Identity comparison: true when both wrappers are the same managed
    /// object (not merely the same handle value, which the engine reuses).
    pub fn is_same(&self, other: &Peer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The native handle, `None` once released.
    pub fn handle(&self) -> Option<PeerHandle> {
        self.inner.borrow().handle
    }

    /// Read-through projection of the native peer state.
    pub fn state(&self) -> PeerState {
        let (transport, handle) = {
            let inner = self.inner.borrow();
            (inner.transport.clone(), inner.handle)
        };
        match handle {
            Some(handle) => transport.borrow().peer_state(handle),
            None => PeerState::Uninitialized,
        }
    }

    /// Fire-and-forget send of raw bytes on a channel.
    pub fn send(&self, channel: u8, data: &[u8], delivery: Delivery) -> Result<()> {
        let transport = self.inner.borrow().transport.clone();
        let packet = Packet::new(&transport, data, delivery)?;
        self.send_packet(channel, packet)
    }

    /// Fire-and-forget send of an already-built packet. Buffer ownership
    /// transfers to the engine, success or failure.
    pub fn send_packet(&self, channel: u8, mut packet: Packet) -> Result<()> {
        let (transport, handle) = {
            let inner = self.inner.borrow();
            (inner.transport.clone(), inner.handle)
        };
        let handle =
            handle.ok_or(ErrorKind::OperationError(OperationErrorKind::PeerReleased))?;
        let buffer = packet
            .take_handle()
            .ok_or(ErrorKind::OperationError(OperationErrorKind::SendFailed))?;
        let result = transport.borrow_mut().send(handle, channel, buffer);
        result
    }

    /// One-shot receive subscription.
    ///
    /// Resolves with the oldest undelivered packet — immediately if one is
    /// already waiting in the inbox, otherwise when the run loop dispatches
    /// the next Receive event. Consumed on firing; resubscribe for the next
    /// message. Fails if a receive subscription is already installed.
    pub fn receive(&self) -> Result<Completion<Packet>> {
        let mut inner = self.inner.borrow_mut();
        if let Some(packet) = inner.inbox.pop_front() {
            return Ok(Completion::ready(Ok(packet)));
        }
        if inner.handle.is_none() {
            return Err(ErrorKind::OperationError(OperationErrorKind::PeerReleased));
        }
        if inner.received.is_some() {
            return Err(ErrorKind::ProtocolViolation(ProtocolViolationKind::ReceiveAlreadyPending));
        }
        let (slot, completion) = Completion::channel();
        inner.received = Some(slot);
        Ok(completion)
    }

    /// Graceful disconnect. The completion resolves with the remote data
    /// word when the eventual Disconnect event is dispatched.
    pub fn disconnect(&self, data: u32) -> Result<Completion<u32>> {
        self.start_disconnect(data, false)
    }

    /// Graceful disconnect after all queued outgoing packets are delivered.
    pub fn disconnect_later(&self, data: u32) -> Result<Completion<u32>> {
        self.start_disconnect(data, true)
    }

    fn start_disconnect(&self, data: u32, later: bool) -> Result<Completion<u32>> {
        let (transport, handle) = {
            let inner = self.inner.borrow();
            (inner.transport.clone(), inner.handle)
        };
        let handle =
            handle.ok_or(ErrorKind::OperationError(OperationErrorKind::PeerReleased))?;

        let (slot, completion) = Completion::channel();
        // Installing a new subscription abandons a previously installed one.
        self.inner.borrow_mut().disconnected = Some(slot);

        if later {
            transport.borrow_mut().peer_disconnect_later(handle, data);
        } else {
            transport.borrow_mut().peer_disconnect(handle, data);
        }
        Ok(completion)
    }

    /// Immediate force-close. No future: the engine releases the local peer
    /// without generating a local Disconnect event, so the wrapper is torn
    /// down right here.
    pub fn disconnect_now(&self, data: u32) {
        let (transport, handle) = {
            let inner = self.inner.borrow();
            (inner.transport.clone(), inner.handle)
        };
        let Some(handle) = handle else { return };
        transport.borrow_mut().peer_disconnect_now(handle, data);
        self.remove_registry_entry(handle);
        self.abandon_handle(AsyncFailureKind::Disconnected);
    }

    /// Sends a keep-alive ping.
    pub fn ping(&self) -> Result<()> {
        let (transport, handle) = {
            let inner = self.inner.borrow();
            (inner.transport.clone(), inner.handle)
        };
        let handle =
            handle.ok_or(ErrorKind::OperationError(OperationErrorKind::PeerReleased))?;
        transport.borrow_mut().peer_ping(handle);
        Ok(())
    }

    /// Configures the engine's packet throttle for this connection.
    pub fn configure_throttle(
        &self,
        interval: Duration,
        acceleration: u32,
        deceleration: u32,
    ) -> Result<()> {
        let (transport, handle) = {
            let inner = self.inner.borrow();
            (inner.transport.clone(), inner.handle)
        };
        let handle =
            handle.ok_or(ErrorKind::OperationError(OperationErrorKind::PeerReleased))?;
        transport
            .borrow_mut()
            .peer_throttle_configure(handle, interval, acceleration, deceleration);
        Ok(())
    }

    /// Releases the native peer and removes the registry entry. Idempotent:
    /// the native reset is issued at most once. Pending subscriptions fail
    /// with `AsyncFailure(Abandoned)` through their dropped slots.
    pub fn close(&self) {
        let (transport, handle) = {
            let inner = self.inner.borrow();
            (inner.transport.clone(), inner.handle)
        };
        let Some(handle) = handle else { return };
        self.remove_registry_entry(handle);
        transport.borrow_mut().peer_reset(handle);
        self.clear_handle_and_slots();
    }

    // ------------------------------------------------------------------
    // Run-loop plumbing
    // ------------------------------------------------------------------

    /// Installs the connected-subscription consumed by an outbound connect.
    pub(crate) fn watch_connected(&self) -> Completion<Peer> {
        let (slot, completion) = Completion::channel();
        self.inner.borrow_mut().connected = Some(slot);
        completion
    }

    /// Outbound handshake completed: fulfill the connected-subscription.
    pub(crate) fn fulfill_connected(&self) {
        let slot = self.inner.borrow_mut().connected.take();
        if let Some(slot) = slot {
            slot.fulfill(Ok(self.clone()));
        }
    }

    /// A Receive event arrived: fulfill the received-subscription, or queue
    /// the packet in arrival order for the next subscription.
    pub(crate) fn deliver(&self, packet: Packet) {
        let slot = self.inner.borrow_mut().received.take();
        match slot {
            Some(slot) => slot.fulfill(Ok(packet)),
            None => self.inner.borrow_mut().inbox.push_back(packet),
        }
    }

    /// A Disconnect event was dispatched for this peer. The registry entry
    /// is already gone; release the native slot, fail in-flight
    /// connect/receive completions rather than silently resolving them,
    /// then fulfill the disconnected-subscription.
    pub(crate) fn finish_disconnect(&self, data: u32) {
        let (transport, handle, connected, received, disconnected, inbox) = {
            let mut inner = self.inner.borrow_mut();
            (
                inner.transport.clone(),
                inner.handle.take(),
                inner.connected.take(),
                inner.received.take(),
                inner.disconnected.take(),
                std::mem::take(&mut inner.inbox),
            )
        };
        if let Some(handle) = handle {
            transport.borrow_mut().peer_reset(handle);
        }
        drop(inbox); // Undelivered buffers go back to the engine
        if let Some(slot) = connected {
            slot.fulfill(Err(ErrorKind::AsyncFailure(AsyncFailureKind::Disconnected)));
        }
        if let Some(slot) = received {
            slot.fulfill(Err(ErrorKind::AsyncFailure(AsyncFailureKind::Disconnected)));
        }
        if let Some(slot) = disconnected {
            slot.fulfill(Ok(data));
        }
    }

    /// Host teardown: the native peer dies with the host, so only the
    /// wrapper is cleared. Every pending subscription fails with `reason`.
    pub(crate) fn abandon_handle(&self, reason: AsyncFailureKind) {
        let (connected, received, disconnected, inbox) = {
            let mut inner = self.inner.borrow_mut();
            inner.handle = None;
            (
                inner.connected.take(),
                inner.received.take(),
                inner.disconnected.take(),
                std::mem::take(&mut inner.inbox),
            )
        };
        drop(inbox);
        if let Some(slot) = connected {
            slot.fulfill(Err(ErrorKind::AsyncFailure(reason)));
        }
        if let Some(slot) = received {
            slot.fulfill(Err(ErrorKind::AsyncFailure(reason)));
        }
        if let Some(slot) = disconnected {
            slot.fulfill(Err(ErrorKind::AsyncFailure(reason)));
        }
    }

    fn remove_registry_entry(&self, handle: PeerHandle) {
        let registry = self.inner.borrow().registry.clone();
        if let Some(registry) = registry.upgrade() {
            registry.borrow_mut().remove(handle);
        }
    }

    fn clear_handle_and_slots(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.handle = None;
        inner.connected = None;
        inner.received = None;
        inner.disconnected = None;
        inner.inbox.clear();
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Peer) -> bool {
        self.is_same(other)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Peer")
            .field("handle", &inner.handle)
            .field("inbox", &inner.inbox.len())
            .finish()
    }
}
