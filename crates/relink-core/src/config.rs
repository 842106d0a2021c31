use crate::address::Address;

/// Configuration for a managed host.
///
/// A host with a bind address acts as a server and accepts inbound
/// connections; a host without one is an outbound-only client endpoint.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address to bind to; `None` creates an unbound (client) host.
    pub bind_address: Option<Address>,
    /// Max number of peers this host may own (1 ..= PROTOCOL_MAXIMUM_PEER_COUNT).
    pub peer_limit: usize,
    /// Number of channels per peer connection (1 ..= PROTOCOL_MAXIMUM_CHANNEL_COUNT).
    pub channel_limit: u8,
    /// Incoming bandwidth limit in bytes/sec (0 = unlimited).
    pub incoming_bandwidth: u32,
    /// Outgoing bandwidth limit in bytes/sec (0 = unlimited).
    pub outgoing_bandwidth: u32,
    /// Enable CRC checksums on the wire (engine-side data integrity).
    pub use_crc: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_address: None,
            peer_limit: 32,
            channel_limit: 2,
            incoming_bandwidth: 0, // Unlimited
            outgoing_bandwidth: 0, // Unlimited
            use_crc: false,
        }
    }
}

impl HostConfig {
    /// Convenience constructor for a server host bound to `address`.
    pub fn bound(address: Address) -> Self {
        Self { bind_address: Some(address), ..Self::default() }
    }
}
