// ============================================
// File: crates/avalanche-server/src/lib.rs
// ============================================
//! # Avalanche Server Library
//!
//! ## Creation Reason
//! Assembles the secured game-server front door: TCP admission, the
//! Diffie-Hellman handshake that re-keys each connection, and opcode
//! dispatch for the packets that follow.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Server configuration management
//! - [`server`]: Main server orchestration
//! - [`handlers`]: Transport callbacks
//!   - [`handlers::exchange`]: Key exchange and re-keying
//!   - [`handlers::dispatch`]: Packet routing by opcode
//! - [`error`]: Server-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Avalanche Server                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐    │
//! │  │   Config    │────►│   Server    │────►│   GameEvents    │    │
//! │  │   (TOML)    │     │ Orchestrator│     │                 │    │
//! │  └─────────────┘     └──────┬──────┘     └────────┬────────┘    │
//! │                             │                     │             │
//! │                             ▼                     ▼             │
//! │                      ┌─────────────┐  ┌──────────────────────┐  │
//! │                      │ PrimeSource │◄─│ ExchangeHandler      │  │
//! │                      └─────────────┘  │ Dispatcher           │  │
//! │                                       └──────────────────────┘  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                     Transport Layer                             │
//! │        Listener ── RateLimiter ── Connection × N                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//! Client → TCP → Decrypt → Split → Exchange | Dispatch
//! Client ← TCP ← Encrypt ← Frame ← Handler
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Configuration changes require restart (no hot-reload)
//! - Nothing is routed until a connection's exchange completes
//!
//! ## Last Modified
//! v0.1.0 - Initial server library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

// Re-export primary types
pub use config::ServerConfig;
pub use error::{ServerError, Result};
pub use server::Server;
