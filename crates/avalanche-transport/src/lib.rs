// ============================================
// File: crates/avalanche-transport/src/lib.rs
// ============================================
//! # Avalanche Transport - TCP I/O Layer
//!
//! ## Creation Reason
//! Moves encrypted game frames between clients and the server: accepts
//! sockets, bounds and rate-limits admissions, and runs one connection
//! actor per socket.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`listener`]: Socket setup and accept loop
//! - [`connection`]: Per-connection receive task and send path
//! - [`limiter`]: Per-address connection rate limiting
//! - [`buffer`]: Pooled receive buffers
//! - [`traits`]: Event callbacks and cipher factory
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              avalanche-server                       │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │   avalanche-core       avalanche-transport          │
//! │                        You are here ◄──             │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │             avalanche-common                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//!   Clients
//!      │ TCP (encrypted, length-prefixed, footer-terminated)
//!      ▼
//!   Listener ── admission semaphore ── RateLimiter
//!      │
//!      ▼
//!   ReceiveLoop ── decrypt ── FrameSplitter ──► TransportEvents
//!                                                   │
//!   Connection::send ◄── encrypt ◄── frame ◄────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The transport never interprets frame contents; that lives behind
//!   `TransportEvents`
//! - Each connection gets its own cipher instance from the factory
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod connection;
pub mod error;
pub mod limiter;
pub mod listener;
pub mod traits;

// Re-export primary types
pub use buffer::{BufferPool, PooledBuffer};
pub use connection::Connection;
pub use error::{Result, TransportError};
pub use limiter::{RateLimitConfig, RateLimiter};
pub use listener::{Listener, ListenerConfig};
pub use traits::{spawn_callback, CipherFactory, TransportEvents};
