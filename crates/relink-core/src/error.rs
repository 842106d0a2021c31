//! Error taxonomy for the managed layer.
//!
//! Four families, matching how failures reach the caller:
//! - `ConstructionError`: invalid limits or a failed native host creation,
//!   surfaced synchronously before any peer exists.
//! - `OperationError`: a native imperative call failed synchronously
//!   (connect, packet allocation, send on a dead peer).
//! - `ProtocolViolation`: the caller broke a usage contract of this layer.
//! - `AsyncFailure`: a pending completion's underlying connection terminated
//!   before the completion could resolve.

use thiserror::Error;

/// Convenience result alias used across the workspace.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Top-level error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Host construction failed.
    #[error("host construction failed: {0}")]
    ConstructionError(ConstructionErrorKind),
    /// A native imperative call failed synchronously.
    #[error("native operation failed: {0}")]
    OperationError(OperationErrorKind),
    /// A usage contract of the managed layer was violated.
    #[error("protocol violation: {0}")]
    ProtocolViolation(ProtocolViolationKind),
    /// A pending completion failed instead of resolving.
    #[error("pending completion failed: {0}")]
    AsyncFailure(AsyncFailureKind),
}

/// Reasons host construction can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstructionErrorKind {
    /// Requested peer limit exceeds the protocol maximum.
    #[error("peer limit {requested} exceeds protocol maximum {maximum}")]
    PeerLimitExceeded {
        /// The limit the caller asked for.
        requested: usize,
        /// The protocol maximum.
        maximum: usize,
    },
    /// Requested channel limit is outside the protocol bounds.
    #[error("channel limit {requested} is outside protocol bounds")]
    ChannelLimitInvalid {
        /// The limit the caller asked for.
        requested: u8,
    },
    /// The native engine returned a null host handle.
    #[error("native host creation returned a null handle")]
    NativeHostCreation,
}

/// Reasons a native imperative call can fail synchronously.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationErrorKind {
    /// The native connect call itself failed (distinct from host creation, so
    /// callers can tell "could not create a host" from "could not reach a
    /// peer").
    #[error("native connect call failed")]
    ConnectFailed,
    /// The engine could not allocate a packet buffer.
    #[error("native packet allocation failed")]
    PacketAllocation,
    /// The operation targeted a peer whose native handle is already released.
    #[error("peer handle already released")]
    PeerReleased,
    /// The operation targeted a host that is already closed.
    #[error("host already closed")]
    HostClosed,
    /// The engine rejected a send call.
    #[error("native send call failed")]
    SendFailed,
}

/// Usage-contract violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolationKind {
    /// An accept was requested while a prior accept is still pending.
    #[error("an accept is already pending")]
    AcceptAlreadyPending,
    /// A receive was requested while a prior receive is still pending.
    #[error("a receive is already pending")]
    ReceiveAlreadyPending,
    /// A channel limit outside the protocol maximum was requested at runtime.
    #[error("channel limit {requested} exceeds protocol maximum")]
    ChannelLimitExceeded {
        /// The limit the caller asked for.
        requested: u8,
    },
}

/// Reasons a pending completion fails instead of resolving.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AsyncFailureKind {
    /// The underlying connection terminated before the completion resolved.
    #[error("connection terminated before completion")]
    Disconnected,
    /// The host that owned the completion was closed.
    #[error("host closed before completion")]
    HostClosed,
    /// The fulfilling side was dropped without resolving the completion.
    #[error("completion abandoned")]
    Abandoned,
}
