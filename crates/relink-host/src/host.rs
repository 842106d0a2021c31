//! The host and its run loop.
//!
//! One tick (`run` / `run_once`):
//! 1. drain the deferred-action queue and execute everything enqueued since
//!    the previous tick;
//! 2. invoke the engine's non-blocking service step — a negative status ends
//!    the tick (recoverable, retried next tick, never surfaced to the
//!    application);
//! 3. exhaustively drain already-buffered native events in FIFO order and
//!    dispatch each to per-peer subscriptions or the host-level pending
//!    accept.
//!
//! Single-threaded: a host and all native calls against it belong to one
//! thread. Foreign threads reach the host only through [`Host::deferred`].

use std::{cell::RefCell, rc::Rc, sync::Arc, time::Duration};

use relink_core::{
    constants::{
        PROTOCOL_MAXIMUM_CHANNEL_COUNT, PROTOCOL_MAXIMUM_PEER_COUNT,
        PROTOCOL_MINIMUM_CHANNEL_COUNT,
    },
    error::{
        AsyncFailureKind, ConstructionErrorKind, ErrorKind, OperationErrorKind,
        ProtocolViolationKind,
    },
    transport::HostOptions,
    Address, HostConfig, HostHandle, PeerHandle, RawEvent, RawEventKind, Result, TransportRef,
};
use tracing::{debug, trace, warn};

use crate::{
    completion::{Completion, CompletionSlot},
    deferred::{DeferredHandle, DeferredQueue},
    event::{Event, EventKind},
    packet::Packet,
    peer::Peer,
    registry::PeerRegistry,
};

/// The local endpoint: owns the native host handle, the peer registry, the
/// pending-accept slot and the deferred-action queue.
#[derive(Debug)]
pub struct Host {
    transport: TransportRef,
    handle: Option<HostHandle>,
    registry: Rc<RefCell<PeerRegistry>>,
    pending_accept: Option<CompletionSlot<Peer>>,
    deferred: Arc<DeferredQueue>,
    config: HostConfig,
}

impl Host {
    /// Creates a host. A bind address makes it a server endpoint; none
    /// makes it an outbound-only client endpoint.
    ///
    /// Limits are validated against the protocol maxima before any native
    /// allocation; a null native handle maps to a construction error.
    pub fn new(transport: TransportRef, config: HostConfig) -> Result<Host> {
        if config.peer_limit == 0 || config.peer_limit > PROTOCOL_MAXIMUM_PEER_COUNT {
            return Err(ErrorKind::ConstructionError(ConstructionErrorKind::PeerLimitExceeded {
                requested: config.peer_limit,
                maximum: PROTOCOL_MAXIMUM_PEER_COUNT,
            }));
        }
        if config.channel_limit < PROTOCOL_MINIMUM_CHANNEL_COUNT {
            return Err(ErrorKind::ConstructionError(
                ConstructionErrorKind::ChannelLimitInvalid { requested: config.channel_limit },
            ));
        }

        let options = HostOptions {
            bind_address: config.bind_address,
            peer_limit: config.peer_limit,
            channel_limit: config.channel_limit,
            incoming_bandwidth: config.incoming_bandwidth,
            outgoing_bandwidth: config.outgoing_bandwidth,
            use_crc: config.use_crc,
        };
        let handle = transport
            .borrow_mut()
            .create_host(&options)
            .ok_or(ErrorKind::ConstructionError(ConstructionErrorKind::NativeHostCreation))?;

        Ok(Host {
            transport,
            handle: Some(handle),
            registry: Rc::new(RefCell::new(PeerRegistry::new())),
            pending_accept: None,
            deferred: Arc::new(DeferredQueue::default()),
            config,
        })
    }

    /// Starts an outbound connection.
    ///
    /// Returns the optimistic peer immediately plus a completion fulfilled
    /// when the run loop observes the matching Connect event. Fails
    /// synchronously if the native connect call is rejected.
    pub fn connect(
        &mut self,
        address: Address,
        channel_count: u8,
        user_data: u32,
    ) -> Result<(Peer, Completion<Peer>)> {
        let host = self.require_handle()?;
        let handle =
            self.transport.borrow_mut().connect(host, address, channel_count, user_data)?;

        let peer = Peer::new(self.transport.clone(), handle, Rc::downgrade(&self.registry));
        self.registry.borrow_mut().add(handle, peer.clone());
        let completion = peer.watch_connected();
        Ok((peer, completion))
    }

    /// Registers for the next inbound connection.
    ///
    /// Accept-once is a hard invariant: at most one accept may be
    /// outstanding, and a second request while one is pending fails
    /// synchronously.
    pub fn accept(&mut self) -> Result<Completion<Peer>> {
        self.require_handle()?;
        if self.pending_accept.is_some() {
            return Err(ErrorKind::ProtocolViolation(ProtocolViolationKind::AcceptAlreadyPending));
        }
        let (slot, completion) = Completion::channel();
        self.pending_accept = Some(slot);
        Ok(completion)
    }

    /// One tick with no service timeout.
    pub fn run(&mut self) {
        self.run_once(Duration::ZERO)
    }

    /// One tick. Must not be invoked concurrently on the same host; the
    /// type is `!Send`, which enforces single-thread driving statically.
    pub fn run_once(&mut self, timeout: Duration) {
        let actions = self.deferred.drain();
        for action in actions {
            action(self);
        }

        // A deferred action may have closed the host.
        let Some(host) = self.handle else { return };

        let status = self.transport.borrow_mut().service(host, timeout);
        if status < 0 {
            // Expected, recoverable; retried next tick.
            trace!(status, "service step failed; ending tick");
            return;
        }

        loop {
            let raw = self.transport.borrow_mut().check_events(host);
            match raw {
                Some(raw) => self.dispatch(raw),
                None => break,
            }
        }
    }

    /// Queues a packet to every connected peer. Buffer ownership transfers
    /// to the engine.
    pub fn broadcast(&mut self, channel: u8, mut packet: Packet) -> Result<()> {
        let host = self.require_handle()?;
        let buffer = packet
            .take_handle()
            .ok_or(ErrorKind::OperationError(OperationErrorKind::SendFailed))?;
        self.transport.borrow_mut().broadcast(host, channel, buffer);
        Ok(())
    }

    /// Forces queued outgoing traffic onto the wire immediately.
    pub fn flush(&mut self) -> Result<()> {
        let host = self.require_handle()?;
        self.transport.borrow_mut().flush(host);
        Ok(())
    }

    /// Adjusts host bandwidth limits (bytes/sec, 0 = unlimited).
    pub fn set_bandwidth_limit(&mut self, incoming: u32, outgoing: u32) -> Result<()> {
        let host = self.require_handle()?;
        self.transport.borrow_mut().set_bandwidth_limit(host, incoming, outgoing);
        self.config.incoming_bandwidth = incoming;
        self.config.outgoing_bandwidth = outgoing;
        Ok(())
    }

    /// Adjusts the channel limit for future connections; validated against
    /// the protocol maximum.
    pub fn set_channel_limit(&mut self, limit: u8) -> Result<()> {
        let host = self.require_handle()?;
        if limit < PROTOCOL_MINIMUM_CHANNEL_COUNT || limit > PROTOCOL_MAXIMUM_CHANNEL_COUNT {
            return Err(ErrorKind::ProtocolViolation(
                ProtocolViolationKind::ChannelLimitExceeded { requested: limit },
            ));
        }
        self.transport.borrow_mut().set_channel_limit(host, limit);
        self.config.channel_limit = limit;
        Ok(())
    }

    /// Handle for enqueuing deferred actions from any thread. Actions run
    /// at the start of the next tick, before the service step.
    pub fn deferred(&self) -> DeferredHandle {
        DeferredHandle::new(self.deferred.clone())
    }

    /// Number of live managed peers.
    pub fn peer_count(&self) -> usize {
        self.registry.borrow().len()
    }

    /// The bound address, or `None` for an outbound-only host.
    pub fn local_address(&self) -> Option<Address> {
        self.config.bind_address
    }

    /// The configuration this host was created with.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Shared transport reference, e.g. for building packets to broadcast.
    pub fn transport(&self) -> TransportRef {
        self.transport.clone()
    }

    /// Destroys the native host. Idempotent: the native handle is destroyed
    /// at most once. A pending accept fails with `AsyncFailure(HostClosed)`,
    /// as do all peers' pending subscriptions; the native peers die with the
    /// host.
    pub fn close(&mut self) {
        let Some(host) = self.handle.take() else { return };

        if let Some(slot) = self.pending_accept.take() {
            slot.fulfill(Err(ErrorKind::AsyncFailure(AsyncFailureKind::HostClosed)));
        }
        for peer in self.registry.borrow_mut().drain() {
            peer.abandon_handle(AsyncFailureKind::HostClosed);
        }
        self.transport.borrow_mut().destroy_host(host);
    }

    fn require_handle(&self) -> Result<HostHandle> {
        self.handle.ok_or(ErrorKind::OperationError(OperationErrorKind::HostClosed))
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    fn dispatch(&mut self, raw: RawEvent) {
        let was_registered = self.registry.borrow().contains(raw.peer);
        let mut event = self.resolve(raw);
        match event.kind() {
            EventKind::Connect => self.on_connect(&event, was_registered),
            EventKind::Receive => {
                let peer = event.peer().clone();
                match event.take_packet() {
                    Some(packet) => peer.deliver(packet),
                    None => warn!(?raw, "receive event without a packet"),
                }
            }
            EventKind::Disconnect => self.on_disconnect(&event, raw.peer),
            EventKind::None => {}
        }
    }

    /// Resolves a raw event record into its single-tick view, registering a
    /// wrapper for unseen handles defensively.
    fn resolve(&mut self, raw: RawEvent) -> Event {
        let peer = self.resolve_peer(raw.peer);
        let packet = raw.packet.map(|handle| Packet::from_handle(self.transport.clone(), handle));
        let kind = match raw.kind {
            RawEventKind::Connect => EventKind::Connect,
            RawEventKind::Receive => EventKind::Receive,
            RawEventKind::Disconnect => EventKind::Disconnect,
        };
        Event::new(kind, peer, raw.channel, raw.data, packet)
    }

    fn resolve_peer(&mut self, handle: PeerHandle) -> Peer {
        if let Some(peer) = self.registry.borrow().lookup(handle) {
            return peer;
        }
        let peer = Peer::new(self.transport.clone(), handle, Rc::downgrade(&self.registry));
        self.registry.borrow_mut().add(handle, peer.clone());
        peer
    }

    fn on_connect(&mut self, event: &Event, was_registered: bool) {
        if was_registered {
            // An outbound connect's handshake completing.
            event.peer().fulfill_connected();
            return;
        }
        // New inbound connection.
        match self.pending_accept.take() {
            Some(slot) => slot.fulfill(Ok(event.peer().clone())),
            None => {
                // Registered, but surfaced to no waiting consumer.
                debug!(handle = ?event.peer().handle(), "inbound connection with no pending accept");
            }
        }
    }

    fn on_disconnect(&mut self, event: &Event, handle: PeerHandle) {
        // Remove before any subscription fires: the engine may reuse the
        // handle value for a same-tick reconnect.
        self.registry.borrow_mut().remove(handle);
        event.peer().finish_disconnect(event.data());
    }

    #[cfg(test)]
    pub(crate) fn wrap_handle_for_tests(&mut self, handle: PeerHandle) -> Peer {
        Peer::new(self.transport.clone(), handle, Rc::downgrade(&self.registry))
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use relink_core::Delivery;

    use super::*;
    use crate::loopback::LoopbackTransport;

    fn engine() -> (Rc<RefCell<LoopbackTransport>>, TransportRef) {
        let engine = LoopbackTransport::new_shared();
        let transport: TransportRef = engine.clone();
        (engine, transport)
    }

    #[test]
    fn test_rejects_peer_limit_over_protocol_maximum() {
        let (_, transport) = engine();
        let config = HostConfig { peer_limit: PROTOCOL_MAXIMUM_PEER_COUNT + 1, ..Default::default() };
        let err = Host::new(transport, config).err().unwrap();
        assert!(matches!(
            err,
            ErrorKind::ConstructionError(ConstructionErrorKind::PeerLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_channel_limit() {
        let (_, transport) = engine();
        let config = HostConfig { channel_limit: 0, ..Default::default() };
        let err = Host::new(transport, config).err().unwrap();
        assert!(matches!(
            err,
            ErrorKind::ConstructionError(ConstructionErrorKind::ChannelLimitInvalid { .. })
        ));
    }

    #[test]
    fn test_bind_collision_maps_to_native_creation_failure() {
        let (_, transport) = engine();
        let address = Address::new(0x7F00_0001, 4100);
        let _first = Host::new(transport.clone(), HostConfig::bound(address)).unwrap();
        let err = Host::new(transport, HostConfig::bound(address)).err().unwrap();
        assert_eq!(
            err,
            ErrorKind::ConstructionError(ConstructionErrorKind::NativeHostCreation)
        );
    }

    #[test]
    fn test_accept_once_invariant() {
        let (_, transport) = engine();
        let mut host =
            Host::new(transport, HostConfig::bound(Address::new(0x7F00_0001, 4101))).unwrap();

        let _pending = host.accept().unwrap();
        let err = host.accept().err().unwrap();
        assert_eq!(
            err,
            ErrorKind::ProtocolViolation(ProtocolViolationKind::AcceptAlreadyPending)
        );
    }

    #[test]
    fn test_connect_to_unbound_address_fails_synchronously() {
        let (_, transport) = engine();
        let mut host = Host::new(transport, HostConfig::default()).unwrap();

        let err = host.connect(Address::new(0x7F00_0001, 59999), 2, 0).err().unwrap();
        assert_eq!(err, ErrorKind::OperationError(OperationErrorKind::ConnectFailed));
        assert_eq!(host.peer_count(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (engine, transport) = engine();
        let mut host =
            Host::new(transport, HostConfig::bound(Address::new(0x7F00_0001, 4102))).unwrap();

        host.close();
        host.close();
        drop(host);

        assert_eq!(engine.borrow().invalid_releases(), 0);
        assert_eq!(engine.borrow().live_host_count(), 0);
    }

    #[test]
    fn test_close_fails_pending_accept_with_host_closed() {
        let (_, transport) = engine();
        let mut host =
            Host::new(transport, HostConfig::bound(Address::new(0x7F00_0001, 4103))).unwrap();

        let mut pending = host.accept().unwrap();
        host.close();
        assert_eq!(
            pending.try_take(),
            Some(Err(ErrorKind::AsyncFailure(AsyncFailureKind::HostClosed)))
        );
    }

    #[test]
    fn test_service_failure_ends_tick_without_dispatch() {
        let (engine, transport) = engine();
        let server_addr = Address::new(0x7F00_0001, 4104);
        let mut server = Host::new(transport.clone(), HostConfig::bound(server_addr)).unwrap();
        let mut client = Host::new(transport, HostConfig::default()).unwrap();

        let mut accepted = server.accept().unwrap();
        let (_peer, _connecting) = client.connect(server_addr, 2, 0).unwrap();

        // The Connect event is buffered, but the failed service step must
        // end the tick before the drain.
        engine.borrow_mut().inject_service_failures(1);
        server.run();
        assert!(accepted.try_take().is_none());

        // Next tick recovers and dispatches the buffered event.
        server.run();
        assert!(matches!(accepted.try_take(), Some(Ok(_))));
    }

    #[test]
    fn test_broadcast_reaches_connected_peers() {
        let (_, transport) = engine();
        let server_addr = Address::new(0x7F00_0001, 4105);
        let mut server = Host::new(transport.clone(), HostConfig::bound(server_addr)).unwrap();
        let mut client_a = Host::new(transport.clone(), HostConfig::default()).unwrap();
        let mut client_b = Host::new(transport.clone(), HostConfig::default()).unwrap();

        let (peer_a, _) = client_a.connect(server_addr, 2, 0).unwrap();
        let (peer_b, _) = client_b.connect(server_addr, 2, 0).unwrap();
        server.run();
        client_a.run();
        client_b.run();

        let packet = Packet::new(&transport, b"tick", Delivery::Reliable).unwrap();
        server.broadcast(0, packet).unwrap();

        client_a.run();
        client_b.run();
        let mut rx_a = peer_a.receive().unwrap();
        let mut rx_b = peer_b.receive().unwrap();
        assert_eq!(rx_a.try_take().unwrap().unwrap().bytes(), b"tick");
        assert_eq!(rx_b.try_take().unwrap().unwrap().bytes(), b"tick");
    }

    #[test]
    fn test_set_channel_limit_validates_protocol_maximum() {
        let (_, transport) = engine();
        let mut host = Host::new(transport, HostConfig::default()).unwrap();

        assert!(host.set_channel_limit(8).is_ok());
        assert_eq!(host.config().channel_limit, 8);

        let err = host.set_channel_limit(0).err().unwrap();
        assert!(matches!(
            err,
            ErrorKind::ProtocolViolation(ProtocolViolationKind::ChannelLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_unaccepted_inbound_connection_is_registered_not_surfaced() {
        let (_, transport) = engine();
        let server_addr = Address::new(0x7F00_0001, 4106);
        let mut server = Host::new(transport.clone(), HostConfig::bound(server_addr)).unwrap();
        let mut client = Host::new(transport, HostConfig::default()).unwrap();

        let (_peer, _connecting) = client.connect(server_addr, 2, 0).unwrap();
        server.run();

        // No accept was pending; the wrapper exists so later events resolve,
        // but nothing was surfaced.
        assert_eq!(server.peer_count(), 1);
        let mut late_accept = server.accept().unwrap();
        server.run();
        assert!(late_accept.try_take().is_none());
    }

    #[test]
    fn test_deferred_action_runs_before_service() {
        let (engine, transport) = engine();
        let server_addr = Address::new(0x7F00_0001, 4107);
        let mut server = Host::new(transport.clone(), HostConfig::bound(server_addr)).unwrap();
        let mut client = Host::new(transport, HostConfig::default()).unwrap();

        let mut accepted = server.accept().unwrap();
        let (_peer, _connecting) = client.connect(server_addr, 2, 0).unwrap();

        // The action closes the host at the drain point; the buffered
        // Connect event must never be dispatched.
        server.deferred().push(|host| host.close());
        server.run();
        assert!(matches!(
            accepted.try_take(),
            Some(Err(ErrorKind::AsyncFailure(AsyncFailureKind::HostClosed)))
        ));
        assert_eq!(engine.borrow().live_host_count(), 1); // Client only
    }
}
