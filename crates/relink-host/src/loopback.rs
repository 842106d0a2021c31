//! In-memory transport engine.
//!
//! A deliberately small stand-in for the native reliable-UDP engine, used
//! by tests and demos: no wire format, no retransmission, no throttling —
//! just hosts keyed by bound address, peer slots with engine-style handle
//! reuse, and instantaneous event delivery. The managed layer cannot tell
//! it apart from the real engine through the `Transport` trait, which is
//! the point.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
    time::Duration,
};

use rand::Rng;
use relink_core::{
    constants::MAXIMUM_PACKET_SIZE,
    error::{ErrorKind, OperationErrorKind},
    transport::HostOptions,
    Address, Delivery, HostHandle, PacketHandle, PeerHandle, PeerState, RawEvent, RawEventKind,
    Result, Transport,
};
use tracing::trace;

#[derive(Debug)]
struct HostState {
    options: HostOptions,
    events: VecDeque<RawEvent>,
}

#[derive(Debug)]
struct PeerSlot {
    host: HostHandle,
    remote: Option<PeerHandle>,
    state: PeerState,
    /// Engine-side session id, for diagnostics.
    session_id: u32,
    throttle: Option<(Duration, u32, u32)>,
}

#[derive(Debug)]
struct PacketBuf {
    data: Vec<u8>,
    flags: u32,
}

/// The in-memory engine.
///
/// Peer slots live in a slab with a free list, so released handle values
/// ARE reused — exactly the property the registry exists to keep safe.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    hosts: HashMap<HostHandle, HostState>,
    bound: HashMap<Address, HostHandle>,
    peers: Vec<Option<PeerSlot>>,
    free_peers: Vec<u32>,
    packets: HashMap<PacketHandle, PacketBuf>,
    next_host: u32,
    next_packet: u64,
    fail_service_steps: u32,
    invalid_releases: u64,
}

impl LoopbackTransport {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine behind the shared-reference type the managed layer
    /// consumes. The concrete `Rc` coerces to `TransportRef` at call sites;
    /// keep a clone to inspect engine state from tests.
    pub fn new_shared() -> Rc<RefCell<LoopbackTransport>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Makes the next `n` service steps report a recoverable failure.
    pub fn inject_service_failures(&mut self, n: u32) {
        self.fail_service_steps = n;
    }

    /// Count of destroy/reset calls against handles the engine no longer
    /// owns. Zero means every release was issued exactly once.
    pub fn invalid_releases(&self) -> u64 {
        self.invalid_releases
    }

    /// Number of live hosts.
    pub fn live_host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Number of live peer slots.
    pub fn live_peer_count(&self) -> usize {
        self.peers.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of live packet buffers.
    pub fn live_packet_count(&self) -> usize {
        self.packets.len()
    }

    /// Engine-side session id of a peer, for diagnostics.
    pub fn peer_session_id(&self, peer: PeerHandle) -> Option<u32> {
        self.slot(peer).map(|slot| slot.session_id)
    }

    /// Last throttle configuration applied to a peer.
    pub fn peer_throttle(&self, peer: PeerHandle) -> Option<(Duration, u32, u32)> {
        self.slot(peer).and_then(|slot| slot.throttle)
    }

    fn slot(&self, peer: PeerHandle) -> Option<&PeerSlot> {
        self.peers.get(peer.0 as usize).and_then(|slot| slot.as_ref())
    }

    fn slot_mut(&mut self, peer: PeerHandle) -> Option<&mut PeerSlot> {
        self.peers.get_mut(peer.0 as usize).and_then(|slot| slot.as_mut())
    }

    fn alloc_peer(&mut self, host: HostHandle, state: PeerState) -> PeerHandle {
        let session_id = rand::rng().random();
        let slot = PeerSlot { host, remote: None, state, session_id, throttle: None };
        match self.free_peers.pop() {
            Some(index) => {
                self.peers[index as usize] = Some(slot);
                PeerHandle(index)
            }
            None => {
                self.peers.push(Some(slot));
                PeerHandle(self.peers.len() as u32 - 1)
            }
        }
    }

    fn free_peer(&mut self, peer: PeerHandle) -> bool {
        match self.peers.get_mut(peer.0 as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                self.free_peers.push(peer.0);
                true
            }
            _ => false,
        }
    }

    fn peers_of(&self, host: HostHandle) -> Vec<PeerHandle> {
        self.peers
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(|s| s.host == host))
            .map(|(index, _)| PeerHandle(index as u32))
            .collect()
    }

    fn alloc_packet(&mut self, data: Vec<u8>, flags: u32) -> PacketHandle {
        let handle = PacketHandle(self.next_packet);
        self.next_packet += 1;
        self.packets.insert(handle, PacketBuf { data, flags });
        handle
    }

    fn queue_event(&mut self, host: HostHandle, event: RawEvent) {
        if let Some(state) = self.hosts.get_mut(&host) {
            state.events.push_back(event);
        }
    }

    /// Tears down one side of a connection and notifies the other with a
    /// Disconnect event, leaving the remote slot for its wrapper to reset.
    fn sever_remote(&mut self, peer: PeerHandle, data: u32) {
        let remote = self.slot_mut(peer).and_then(|slot| slot.remote.take());
        let Some(remote) = remote else { return };
        let Some(remote_slot) = self.slot_mut(remote) else { return };
        remote_slot.state = PeerState::Zombie;
        remote_slot.remote = None;
        let remote_host = remote_slot.host;
        self.queue_event(
            remote_host,
            RawEvent {
                kind: RawEventKind::Disconnect,
                peer: remote,
                channel: 0,
                data,
                packet: None,
            },
        );
    }
}

impl Transport for LoopbackTransport {
    fn create_host(&mut self, options: &HostOptions) -> Option<HostHandle> {
        if let Some(address) = options.bind_address {
            if self.bound.contains_key(&address) {
                return None; // Bind collision: the native engine hands back null
            }
        }
        let handle = HostHandle(self.next_host);
        self.next_host += 1;
        self.hosts.insert(handle, HostState { options: options.clone(), events: VecDeque::new() });
        if let Some(address) = options.bind_address {
            self.bound.insert(address, handle);
        }
        trace!(?handle, "created loopback host");
        Some(handle)
    }

    fn destroy_host(&mut self, host: HostHandle) {
        if self.hosts.remove(&host).is_none() {
            self.invalid_releases += 1;
            return;
        }
        self.bound.retain(|_, bound| *bound != host);
        for peer in self.peers_of(host) {
            self.sever_remote(peer, 0);
            self.free_peer(peer);
        }
    }

    fn connect(
        &mut self,
        host: HostHandle,
        address: Address,
        _channel_count: u8,
        user_data: u32,
    ) -> Result<PeerHandle> {
        let connect_failed = || ErrorKind::OperationError(OperationErrorKind::ConnectFailed);

        if !self.hosts.contains_key(&host) {
            return Err(connect_failed());
        }
        let target = *self.bound.get(&address).ok_or_else(connect_failed)?;

        let target_limit = self.hosts[&target].options.peer_limit;
        let local_limit = self.hosts[&host].options.peer_limit;
        if self.peers_of(target).len() >= target_limit || self.peers_of(host).len() >= local_limit {
            return Err(connect_failed());
        }

        let local = self.alloc_peer(host, PeerState::Connected);
        let remote = self.alloc_peer(target, PeerState::Connected);
        self.slot_mut(local).expect("just allocated").remote = Some(remote);
        self.slot_mut(remote).expect("just allocated").remote = Some(local);

        // Loopback handshake is instantaneous: both sides get their Connect
        // event buffered immediately.
        self.queue_event(
            host,
            RawEvent { kind: RawEventKind::Connect, peer: local, channel: 0, data: 0, packet: None },
        );
        self.queue_event(
            target,
            RawEvent {
                kind: RawEventKind::Connect,
                peer: remote,
                channel: 0,
                data: user_data,
                packet: None,
            },
        );
        Ok(local)
    }

    fn service(&mut self, _host: HostHandle, _timeout: Duration) -> i32 {
        if self.fail_service_steps > 0 {
            self.fail_service_steps -= 1;
            return -1;
        }
        0
    }

    fn check_events(&mut self, host: HostHandle) -> Option<RawEvent> {
        self.hosts.get_mut(&host)?.events.pop_front()
    }

    fn broadcast(&mut self, host: HostHandle, channel: u8, packet: PacketHandle) {
        let Some(buf) = self.packets.remove(&packet) else {
            self.invalid_releases += 1;
            return;
        };
        for peer in self.peers_of(host) {
            let Some(slot) = self.slot(peer) else { continue };
            if !slot.state.is_connected() {
                continue;
            }
            let Some(remote) = slot.remote else { continue };
            let Some(remote_host) = self.slot(remote).map(|s| s.host) else { continue };
            let copy = self.alloc_packet(buf.data.clone(), buf.flags);
            self.queue_event(
                remote_host,
                RawEvent {
                    kind: RawEventKind::Receive,
                    peer: remote,
                    channel,
                    data: 0,
                    packet: Some(copy),
                },
            );
        }
    }

    fn flush(&mut self, _host: HostHandle) {
        // Delivery is instantaneous; nothing is ever queued engine-side.
    }

    fn set_bandwidth_limit(&mut self, host: HostHandle, incoming: u32, outgoing: u32) {
        if let Some(state) = self.hosts.get_mut(&host) {
            state.options.incoming_bandwidth = incoming;
            state.options.outgoing_bandwidth = outgoing;
        }
    }

    fn set_channel_limit(&mut self, host: HostHandle, limit: u8) {
        if let Some(state) = self.hosts.get_mut(&host) {
            state.options.channel_limit = limit;
        }
    }

    fn packet_create(&mut self, data: &[u8], delivery: Delivery) -> Option<PacketHandle> {
        if data.len() > MAXIMUM_PACKET_SIZE {
            return None; // Allocation failure
        }
        Some(self.alloc_packet(data.to_vec(), delivery.to_flags()))
    }

    fn packet_destroy(&mut self, packet: PacketHandle) {
        if self.packets.remove(&packet).is_none() {
            self.invalid_releases += 1;
        }
    }

    fn packet_len(&self, packet: PacketHandle) -> usize {
        self.packets.get(&packet).map(|buf| buf.data.len()).unwrap_or(0)
    }

    fn packet_data(&self, packet: PacketHandle) -> Vec<u8> {
        self.packets.get(&packet).map(|buf| buf.data.clone()).unwrap_or_default()
    }

    fn send(&mut self, peer: PeerHandle, channel: u8, packet: PacketHandle) -> Result<()> {
        // Ownership of the buffer transfers to the engine on entry,
        // success or failure.
        let Some(buf) = self.packets.remove(&packet) else {
            return Err(ErrorKind::OperationError(OperationErrorKind::SendFailed));
        };
        let (remote, connected) = match self.slot(peer) {
            Some(slot) => (slot.remote, slot.state.is_connected()),
            None => (None, false),
        };
        if !connected {
            return Err(ErrorKind::OperationError(OperationErrorKind::SendFailed));
        }
        let Some(remote) = remote else {
            return Err(ErrorKind::OperationError(OperationErrorKind::SendFailed));
        };
        let Some(remote_host) = self.slot(remote).map(|slot| slot.host) else {
            return Err(ErrorKind::OperationError(OperationErrorKind::SendFailed));
        };

        let copy = self.alloc_packet(buf.data, buf.flags);
        self.queue_event(
            remote_host,
            RawEvent {
                kind: RawEventKind::Receive,
                peer: remote,
                channel,
                data: 0,
                packet: Some(copy),
            },
        );
        Ok(())
    }

    fn peer_state(&self, peer: PeerHandle) -> PeerState {
        self.slot(peer).map(|slot| slot.state).unwrap_or(PeerState::Uninitialized)
    }

    fn peer_disconnect(&mut self, peer: PeerHandle, data: u32) {
        let Some(slot) = self.slot_mut(peer) else { return };
        if slot.state.is_disconnecting() {
            return;
        }
        slot.state = PeerState::Disconnecting;
        let host = slot.host;
        self.sever_remote(peer, data);
        self.queue_event(
            host,
            RawEvent { kind: RawEventKind::Disconnect, peer, channel: 0, data, packet: None },
        );
    }

    fn peer_disconnect_later(&mut self, peer: PeerHandle, data: u32) {
        // Nothing is ever queued engine-side, so "later" is "now".
        self.peer_disconnect(peer, data);
    }

    fn peer_disconnect_now(&mut self, peer: PeerHandle, data: u32) {
        if self.slot(peer).is_none() {
            return;
        }
        self.sever_remote(peer, data);
        // The local side gets no event; the engine releases the slot itself.
        self.free_peer(peer);
    }

    fn peer_reset(&mut self, peer: PeerHandle) {
        if !self.free_peer(peer) {
            self.invalid_releases += 1;
        }
    }

    fn peer_ping(&mut self, _peer: PeerHandle) {
        // RTT is zero here.
    }

    fn peer_throttle_configure(
        &mut self,
        peer: PeerHandle,
        interval: Duration,
        acceleration: u32,
        deceleration: u32,
    ) {
        if let Some(slot) = self.slot_mut(peer) {
            slot.throttle = Some((interval, acceleration, deceleration));
        }
    }
}
