//! Native-handle to managed-peer registry.
//!
//! At most one live `Peer` exists per native handle at any instant. The
//! engine reuses handle values after a peer is released, so "handle already
//! present" versus "handle absent" is the sole discriminator between an
//! outbound connect completing and a new inbound connection — and removal on
//! Disconnect must happen before the disconnected-subscription fires, so a
//! same-tick reconnect reusing the handle cannot route to a stale wrapper.

use std::collections::HashMap;

use relink_core::PeerHandle;

use crate::peer::Peer;

/// Mapping from native peer handle to managed wrapper.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerHandle, Peer>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer. The caller has already checked absence; a collision
    /// means two live wrappers for one handle, which the registry exists to
    /// prevent.
    pub fn add(&mut self, handle: PeerHandle, peer: Peer) {
        let previous = self.peers.insert(handle, peer);
        debug_assert!(previous.is_none(), "duplicate peer registration for {:?}", handle);
    }

    /// Removes the entry for a handle, returning its peer if present.
    pub fn remove(&mut self, handle: PeerHandle) -> Option<Peer> {
        self.peers.remove(&handle)
    }

    /// Looks up the live peer for a handle.
    pub fn lookup(&self, handle: PeerHandle) -> Option<Peer> {
        self.peers.get(&handle).cloned()
    }

    /// Returns whether a handle is currently registered.
    pub fn contains(&self, handle: PeerHandle) -> bool {
        self.peers.contains_key(&handle)
    }

    /// Number of live peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns true when no peers are registered.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Removes and returns every registered peer.
    pub fn drain(&mut self) -> Vec<Peer> {
        self.peers.drain().map(|(_, peer)| peer).collect()
    }

    /// Snapshot of the registered peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.values().cloned().collect()
    }
}
