//! Managed packet buffer wrapper.

use std::fmt;

use relink_core::{
    error::{ErrorKind, OperationErrorKind},
    Delivery, PacketHandle, Result, TransportRef,
};

/// Wraps exactly one native payload buffer.
///
/// Two construction modes: [`Packet::new`] allocates an engine buffer from
/// raw bytes; the receive path wraps an already transport-owned buffer
/// without allocating. Sending a packet transfers buffer ownership to the
/// engine, after which `close` is a no-op.
pub struct Packet {
    transport: TransportRef,
    handle: Option<PacketHandle>,
    delivery: Delivery,
}

impl Packet {
    /// Allocates a native buffer holding a copy of `data`.
    pub fn new(transport: &TransportRef, data: &[u8], delivery: Delivery) -> Result<Packet> {
        let handle = transport
            .borrow_mut()
            .packet_create(data, delivery)
            .ok_or(ErrorKind::OperationError(OperationErrorKind::PacketAllocation))?;
        Ok(Packet { transport: transport.clone(), handle: Some(handle), delivery })
    }

    /// Wraps a transport-owned buffer from the receive path. No allocation.
    pub(crate) fn from_handle(transport: TransportRef, handle: PacketHandle) -> Packet {
        Packet { transport, handle: Some(handle), delivery: Delivery::default() }
    }

    /// Payload length in bytes; zero once the buffer is released.
    pub fn len(&self) -> usize {
        match self.handle {
            Some(handle) => self.transport.borrow().packet_len(handle),
            None => 0,
        }
    }

    /// Returns true when the payload is empty or the buffer is released.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the payload. Never a live alias into native memory, so
    /// mutating the returned bytes cannot corrupt the underlying buffer.
    pub fn bytes(&self) -> Vec<u8> {
        match self.handle {
            Some(handle) => self.transport.borrow().packet_data(handle),
            None => Vec::new(),
        }
    }

    /// Delivery mode this packet was created with.
    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Transfers buffer ownership out of the wrapper (send/broadcast path).
    pub(crate) fn take_handle(&mut self) -> Option<PacketHandle> {
        self.handle.take()
    }

    /// Releases the native buffer. Idempotent: the buffer is destroyed at
    /// most once, and closing a sent packet is a no-op.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.transport.borrow_mut().packet_destroy(handle);
        }
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Packet) -> bool {
        self.delivery == other.delivery && self.bytes() == other.bytes()
    }
}

impl Drop for Packet {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("handle", &self.handle)
            .field("delivery", &self.delivery)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackTransport;

    use relink_core::TransportRef;

    #[test]
    fn test_bytes_are_a_copy() {
        let transport: TransportRef = LoopbackTransport::new_shared();
        let packet = Packet::new(&transport, &[1, 2, 3, 4], Delivery::Reliable).unwrap();
        assert_eq!(packet.len(), 4);

        let mut copy = packet.bytes();
        copy[0] = 99;
        assert_eq!(packet.bytes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let engine = LoopbackTransport::new_shared();
        let transport: TransportRef = engine.clone();
        let mut packet = Packet::new(&transport, &[5, 6], Delivery::Unreliable).unwrap();

        packet.close();
        packet.close();
        drop(packet);

        assert_eq!(engine.borrow().invalid_releases(), 0);
        assert_eq!(engine.borrow().live_packet_count(), 0);
    }

    #[test]
    fn test_oversized_allocation_fails() {
        let transport: TransportRef = LoopbackTransport::new_shared();
        let huge = vec![0u8; relink_core::constants::MAXIMUM_PACKET_SIZE + 1];
        let result = Packet::new(&transport, &huge, Delivery::Reliable);
        assert_eq!(
            result.err(),
            Some(ErrorKind::OperationError(OperationErrorKind::PacketAllocation))
        );
    }
}
