#![warn(missing_docs)]

//! relink-core: foundational types for the managed host/peer layer.
//!
//! This crate provides the minimal set of types shared across the workspace:
//! - The native transport ABI (`Transport` trait, handles, raw events)
//! - Address values
//! - Host configuration
//! - Error handling
//!
//! The managed layer itself (Host, Peer, Packet, Event) lives in
//! `relink-host`.

/// Protocol constants consumed from the native transport engine.
pub mod constants {
    /// Largest peer id the native protocol can address.
    pub const PROTOCOL_MAXIMUM_PEER_ID: usize = 0xFFF;
    /// Largest number of peers a single host may own.
    pub const PROTOCOL_MAXIMUM_PEER_COUNT: usize = PROTOCOL_MAXIMUM_PEER_ID + 1;
    /// Largest number of channels multiplexed over one peer connection.
    pub const PROTOCOL_MAXIMUM_CHANNEL_COUNT: u8 = 255;
    /// Smallest usable channel count.
    pub const PROTOCOL_MINIMUM_CHANNEL_COUNT: u8 = 1;
    /// Numeric host value meaning "bind to any interface".
    pub const HOST_ANY: u32 = 0;
    /// Numeric host value meaning "broadcast".
    pub const HOST_BROADCAST: u32 = 0xFFFF_FFFF;
    /// Largest payload the engine's packet allocator accepts.
    pub const MAXIMUM_PACKET_SIZE: usize = 32 * 1024 * 1024;
}

/// Address values (numeric host + port).
pub mod address;
/// Host configuration options.
pub mod config;
/// Error types and results.
pub mod error;
/// Native transport ABI: handles, raw events, peer states and the
/// `Transport` trait.
pub mod transport;

pub use address::Address;
pub use config::HostConfig;
pub use error::{ErrorKind, Result};
pub use transport::{
    Delivery, HostHandle, PacketHandle, PeerHandle, PeerState, RawEvent, RawEventKind, Transport,
    TransportRef,
};
