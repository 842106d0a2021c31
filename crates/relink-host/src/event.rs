//! Single-tick view over one polled native event.

use crate::{packet::Packet, peer::Peer};

/// Taxonomy the run loop translates native poll events into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// No event was pending.
    None,
    /// A connection handshake completed.
    Connect,
    /// A packet arrived.
    Receive,
    /// A connection terminated.
    Disconnect,
}

/// A read-only view over one native event record, valid for the tick that
/// produced it. The peer is resolved through the registry (registering
/// lazily if the handle was unseen); Receive events carry the packet.
#[derive(Debug)]
pub struct Event {
    kind: EventKind,
    peer: Peer,
    channel: u8,
    data: u32,
    packet: Option<Packet>,
}

impl Event {
    pub(crate) fn new(
        kind: EventKind,
        peer: Peer,
        channel: u8,
        data: u32,
        packet: Option<Packet>,
    ) -> Event {
        Event { kind, peer, channel, data, packet }
    }

    /// The event kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The resolved peer.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Channel the event arrived on (Receive events).
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// User data word carried by the native event.
    pub fn data(&self) -> u32 {
        self.data
    }

    /// Takes the packet out of a Receive event.
    pub fn take_packet(&mut self) -> Option<Packet> {
        self.packet.take()
    }
}
