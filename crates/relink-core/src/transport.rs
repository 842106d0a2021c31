//! Native transport ABI.
//!
//! The reliable-UDP engine (sequencing, acknowledgment, throttling,
//! fragmentation) is an external dependency. This module pins down the
//! surface the managed layer consumes from it: opaque handles, the raw event
//! record produced by polling, the native peer state machine, and the
//! `Transport` trait itself.
//!
//! All calls take `&mut self`: a transport instance is driven by exactly one
//! thread. The managed layer shares an instance between hosts and their
//! peers through [`TransportRef`], which is deliberately `!Send` — the
//! single-writer tick model is encoded in the type system rather than with
//! per-object locks.

use std::{cell::RefCell, fmt, rc::Rc, time::Duration};

use crate::{
    address::Address,
    error::Result,
};

/// Opaque handle to a native host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostHandle(pub u32);

/// Opaque handle to a native peer.
///
/// Handle values are reused by the engine after a peer is released: a
/// `PeerHandle` seen in a later event may refer to a different connection
/// than an earlier identical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(pub u32);

/// Opaque handle to a native packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHandle(pub u64);

/// Kind of a polled native event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    /// A connection handshake completed (inbound or outbound).
    Connect,
    /// A packet arrived on a channel.
    Receive,
    /// A connection terminated.
    Disconnect,
}

/// One polled native event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Event kind.
    pub kind: RawEventKind,
    /// The native peer the event concerns.
    pub peer: PeerHandle,
    /// Channel the event arrived on (Receive events).
    pub channel: u8,
    /// User data word (connect data on Connect, disconnect data on Disconnect).
    pub data: u32,
    /// Transport-owned packet buffer (Receive events only).
    pub packet: Option<PacketHandle>,
}

/// Native peer state machine, projected read-through by the managed layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    /// The handle has been released; no native state exists.
    #[default]
    Uninitialized,
    /// No connection.
    Disconnected,
    /// Outbound handshake in progress.
    Connecting,
    /// Inbound handshake in progress.
    AcknowledgingConnect,
    /// Handshake verified, awaiting final confirmation.
    ConnectionPending,
    /// Handshake complete, awaiting the Connect event.
    ConnectionSucceeded,
    /// Connection established.
    Connected,
    /// Graceful disconnect queued behind outgoing data.
    DisconnectLater,
    /// Disconnect handshake in progress.
    Disconnecting,
    /// Acknowledging a remote disconnect.
    AcknowledgingDisconnect,
    /// Awaiting teardown.
    Zombie,
}

impl PeerState {
    /// Returns true if the connection is fully established.
    pub fn is_connected(&self) -> bool {
        matches!(self, PeerState::Connected | PeerState::ConnectionSucceeded)
    }

    /// Returns true if the peer is tearing down or already gone.
    pub fn is_disconnecting(&self) -> bool {
        matches!(
            self,
            PeerState::DisconnectLater
                | PeerState::Disconnecting
                | PeerState::AcknowledgingDisconnect
                | PeerState::Zombie
                | PeerState::Disconnected
        )
    }
}

/// Delivery mode for an outgoing packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Packet will be delivered, in order per channel.
    #[default]
    Reliable,
    /// Packet may be dropped; sequenced per channel.
    Unreliable,
    /// Packet may be dropped and arrive out of order.
    Unsequenced,
}

impl Delivery {
    /// Converts to the native flag word.
    pub fn to_flags(self) -> u32 {
        match self {
            Delivery::Reliable => 1 << 0,
            Delivery::Unreliable => 0,
            Delivery::Unsequenced => 1 << 1,
        }
    }

    /// Converts from the native flag word; unknown bits degrade to unreliable.
    pub fn from_flags(flags: u32) -> Self {
        if flags & (1 << 0) != 0 {
            Delivery::Reliable
        } else if flags & (1 << 1) != 0 {
            Delivery::Unsequenced
        } else {
            Delivery::Unreliable
        }
    }
}

/// Options passed to native host creation.
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Bind address, or `None` for an unbound (outbound-only) host.
    pub bind_address: Option<Address>,
    /// Max number of peers.
    pub peer_limit: usize,
    /// Channels per peer connection.
    pub channel_limit: u8,
    /// Incoming bandwidth limit in bytes/sec (0 = unlimited).
    pub incoming_bandwidth: u32,
    /// Outgoing bandwidth limit in bytes/sec (0 = unlimited).
    pub outgoing_bandwidth: u32,
    /// Enable CRC checksums on the wire.
    pub use_crc: bool,
}

/// The native transport engine surface.
///
/// Implementations own all native state; the managed layer only ever holds
/// handles. Global engine initialization and teardown are the implementor's
/// constructor and `Drop`.
pub trait Transport {
    /// Creates a native host. `None` mirrors the engine returning a null
    /// handle (bind failure, resource exhaustion).
    fn create_host(&mut self, options: &HostOptions) -> Option<HostHandle>;

    /// Destroys a native host and every peer it still owns.
    fn destroy_host(&mut self, host: HostHandle);

    /// Starts an outbound connection; the handshake completes later through
    /// a Connect event. Fails synchronously if the engine rejects the call.
    fn connect(
        &mut self,
        host: HostHandle,
        address: Address,
        channel_count: u8,
        user_data: u32,
    ) -> Result<PeerHandle>;

    /// One non-blocking service step: sends queued traffic, ingests arrived
    /// traffic, buffers resulting events. A negative return is a recoverable
    /// engine-level error for this step.
    fn service(&mut self, host: HostHandle, timeout: Duration) -> i32;

    /// Pops the next already-buffered event, FIFO. `None` when drained.
    fn check_events(&mut self, host: HostHandle) -> Option<RawEvent>;

    /// Queues a packet to every connected peer of the host. Ownership of the
    /// packet buffer transfers to the engine.
    fn broadcast(&mut self, host: HostHandle, channel: u8, packet: PacketHandle);

    /// Forces queued outgoing traffic onto the wire immediately.
    fn flush(&mut self, host: HostHandle);

    /// Adjusts host bandwidth limits (bytes/sec, 0 = unlimited).
    fn set_bandwidth_limit(&mut self, host: HostHandle, incoming: u32, outgoing: u32);

    /// Adjusts the channel limit for future connections.
    fn set_channel_limit(&mut self, host: HostHandle, limit: u8);

    /// Allocates a packet buffer holding a copy of `data`. `None` mirrors
    /// allocation failure.
    fn packet_create(&mut self, data: &[u8], delivery: Delivery) -> Option<PacketHandle>;

    /// Releases a packet buffer.
    fn packet_destroy(&mut self, packet: PacketHandle);

    /// Returns the payload length of a packet buffer.
    fn packet_len(&self, packet: PacketHandle) -> usize;

    /// Returns a copy of the payload. Never a live alias into native memory.
    fn packet_data(&self, packet: PacketHandle) -> Vec<u8>;

    /// Queues a packet on a channel of a peer. Ownership of the packet buffer
    /// transfers to the engine, success or failure.
    fn send(&mut self, peer: PeerHandle, channel: u8, packet: PacketHandle) -> Result<()>;

    /// Returns the native state of a peer; `Uninitialized` for unknown
    /// handles.
    fn peer_state(&self, peer: PeerHandle) -> PeerState;

    /// Starts a graceful disconnect; completes through a Disconnect event.
    fn peer_disconnect(&mut self, peer: PeerHandle, data: u32);

    /// Graceful disconnect after all queued outgoing packets are sent.
    fn peer_disconnect_later(&mut self, peer: PeerHandle, data: u32);

    /// Force-closes immediately. The remote side gets a Disconnect event;
    /// the local side gets none.
    fn peer_disconnect_now(&mut self, peer: PeerHandle, data: u32);

    /// Frees the peer slot unconditionally. The handle value becomes
    /// reusable by the engine.
    fn peer_reset(&mut self, peer: PeerHandle);

    /// Sends a ping to keep the connection alive and refresh RTT.
    fn peer_ping(&mut self, peer: PeerHandle);

    /// Configures the engine's packet throttle for a peer.
    fn peer_throttle_configure(
        &mut self,
        peer: PeerHandle,
        interval: Duration,
        acceleration: u32,
        deceleration: u32,
    );
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<transport>")
    }
}

/// Shared reference to a transport instance.
///
/// `Rc<RefCell<..>>` rather than `Arc<Mutex<..>>`: every native call against
/// a given transport must originate from the single thread driving its
/// hosts' run loops.
pub type TransportRef = Rc<RefCell<dyn Transport>>;
