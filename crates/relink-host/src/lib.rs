#![warn(missing_docs)]

//! relink-host: managed host/peer layer over a native transport engine.
//!
//! The engine owns the reliable-UDP wire protocol; this crate owns the
//! managed objects around its handles:
//!
//! - `Host` runs the single-threaded poll/dispatch loop and exposes
//!   connect/accept as pending completions
//! - `Peer` wraps one native peer handle with per-peer subscriptions
//! - `Packet` wraps one native payload buffer
//! - `Event` is the single-tick view over one polled native event
//! - `PeerRegistry` keeps exactly one live `Peer` per native handle
//!
//! Cross-thread interaction goes exclusively through the host's
//! deferred-action queue; everything else is single-writer by construction.

/// Pending completions returned by async operations.
pub mod completion;
/// Cross-thread deferred-action queue.
pub mod deferred;
/// Single-tick view over one polled native event.
pub mod event;
/// The host and its run loop.
pub mod host;
/// In-memory transport engine for tests and demos.
pub mod loopback;
/// Managed packet buffer wrapper.
pub mod packet;
/// Managed peer wrapper.
pub mod peer;
/// Native-handle to managed-peer registry.
pub mod registry;

pub use completion::Completion;
pub use deferred::DeferredHandle;
pub use event::{Event, EventKind};
pub use host::Host;
pub use loopback::LoopbackTransport;
pub use packet::Packet;
pub use peer::Peer;
pub use registry::PeerRegistry;
