#![warn(missing_docs)]

//! Relink: a small public API facade for the workspace.
//!
//! This crate provides a clean, stable surface that re-exports
//! the most commonly used types for the managed networking layer:
//!
//! - Hosts and events (`Host`, `Event`, `EventKind`)
//! - Peers, packets and completions (`Peer`, `Packet`, `Completion`)
//! - Core configuration and addressing (`HostConfig`, `Address`)
//!
//! Example
//! ```ignore
//! use relink::{Address, Delivery, Host, HostConfig, LoopbackTransport, TransportRef};
//!
//! let transport: TransportRef = LoopbackTransport::new_shared();
//! let address = Address::new(0x7F00_0001, 9000);
//! let mut server = Host::new(transport.clone(), HostConfig::bound(address)).unwrap();
//! let mut client = Host::new(transport, HostConfig::default()).unwrap();
//!
//! let mut accepted = server.accept().unwrap();
//! let (peer, _connecting) = client.connect(address, 2, 0).unwrap();
//! client.run();
//! server.run();
//!
//! peer.send(0, b"hello", Delivery::Reliable).unwrap();
//! server.run();
//! if let Some(Ok(remote)) = accepted.try_take() {
//!     let mut rx = remote.receive().unwrap();
//!     assert_eq!(rx.try_take().unwrap().unwrap().bytes(), b"hello");
//! }
//! ```

// Core: addressing, configuration, errors, the transport ABI
pub use relink_core::{
    constants, Address, Delivery, ErrorKind, HostConfig, PeerState, Result, Transport,
    TransportRef,
};
// Host layer: managed objects and the run loop
pub use relink_host::{
    Completion, DeferredHandle, Event, EventKind, Host, LoopbackTransport, Packet, Peer,
};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        Address, Completion, Delivery, ErrorKind, Event, EventKind, Host, HostConfig, Packet,
        Peer, PeerState, Result,
    };
}
