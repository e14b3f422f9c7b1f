// ============================================
// File: crates/avalanche-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for the TCP side of the transport: binding,
//! accepting, reading and writing, plus the framing failures surfaced
//! from the core crate.
//!
//! ## Error Categories
//! 1. **Network Errors**: bind, accept, read, write failures
//! 2. **Protocol Errors**: bad frames, rejected handshakes (fail closed)
//! 3. **Configuration Errors**: unresolvable addresses, bad limits
//!
//! ## ⚠️ Important Note for Next Developer
//! - `is_benign` is the "peer is already going away" range. Those errors
//!   are logged at debug and never at error level
//! - Protocol violations close one connection, never the listener
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use avalanche_common::error::CommonError;
use avalanche_core::error::CoreError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Network Errors
    // ========================================

    /// Failed to bind to address.
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind to
        addr: SocketAddr,
        /// Why binding failed
        reason: String,
    },

    /// Address already in use.
    #[error("Address {addr} already in use")]
    AddressInUse {
        /// The address that's in use
        addr: SocketAddr,
    },

    /// Connection has already been torn down.
    #[error("Connection not connected")]
    NotConnected,

    // ========================================
    // Protocol Errors
    // ========================================

    /// The handshake handler refused the first frame.
    #[error("Handshake rejected")]
    HandshakeRejected,

    /// Framing or key exchange failure from the core crate.
    #[error(transparent)]
    Protocol(#[from] CoreError),

    // ========================================
    // Configuration Errors
    // ========================================

    /// Host name could not be resolved.
    #[error("Cannot resolve address: {addr}")]
    InvalidAddress {
        /// The host that failed to resolve
        addr: String,
    },

    // ========================================
    // System Errors
    // ========================================

    /// Operation timed out.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// What operation timed out
        operation: String,
    },

    /// Listener is shutting down.
    #[error("Transport is shutting down")]
    ShuttingDown,

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A listener setting failed validation.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `BindFailed` error.
    pub fn bind_failed(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            addr,
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the peer was already closing or aborting.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        match self {
            Self::Io { source, .. } => is_benign_io(source),
            Self::NotConnected | Self::ShuttingDown => true,
            _ => false,
        }
    }

    /// Returns `true` if the peer violated the protocol.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            Self::HandshakeRejected => true,
            Self::Protocol(inner) => inner.is_protocol_violation(),
            _ => false,
        }
    }
}

/// The socket error kinds that mean "peer already closing".
#[must_use]
pub fn is_benign_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "unspecified I/O operation".into(),
            source: err,
        }
    }
}

// ============================================
// Tests
// ============================================
