// ============================================
// File: crates/avalanche-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Main Functionality
//! - `ConnectionId`: Process-unique identifier for an accepted connection
//! - `ConnectionState`: Lifecycle of a connection actor
//!
//! ## Connection Lifecycle
//! ```text
//! ┌────────────┐  handshake ok   ┌───────────┐
//! │ Exchanging │ ──────────────► │ Streaming │
//! └─────┬──────┘                 └─────┬─────┘
//!       │ error / close / timeout      │
//!       └──────────────┬───────────────┘
//!                      ▼
//!               ┌───────────────┐
//!               │ Disconnecting │  (terminal)
//!               └───────────────┘
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================
// ConnectionId
// ============================================

/// Identifier assigned to each accepted connection.
///
/// Ids are allocated from a monotonically increasing counter and are
/// never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next unused identifier.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw value (tests and log correlation).
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================
// ConnectionState
// ============================================

/// Lifecycle state of a connection actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Waiting for the handshake frame.
    Exchanging = 0,
    /// Handshake accepted; all traffic passes through the session cipher.
    Streaming = 1,
    /// Terminal. Resources released or being released.
    Disconnecting = 2,
}

impl ConnectionState {
    /// Decodes the `repr(u8)` value stored in an atomic.
    ///
    /// Unknown values map to `Disconnecting` so a corrupted state fails closed.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Exchanging,
            1 => Self::Streaming,
            _ => Self::Disconnecting,
        }
    }

    /// Returns `true` for the terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exchanging => "Exchanging",
            Self::Streaming => "Streaming",
            Self::Disconnecting => "Disconnecting",
        };
        f.write_str(name)
    }
}

// ============================================
// Tests
// ============================================
