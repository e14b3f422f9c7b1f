// ============================================
// File: crates/avalanche-common/src/lib.rs
// ============================================
//! # Avalanche Common - Shared Utilities Library
//!
//! ## Creation Reason
//! Holds the small set of types every other Avalanche crate agrees on:
//! connection identifiers, the connection lifecycle enum, the activity
//! clock, and the base error type with the value checks that produce it.
//!
//! ## Main Functionality
//! - [`types`]: `ConnectionId`, `ConnectionState`
//! - [`time`]: `AtomicInstant` activity clock
//! - [`error`]: `CommonError` and its result alias
//! - [`validate`]: Range checks for config values
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              avalanche-server                       │
//! │                    │                                │
//! │                    ▼                                │
//! │            avalanche-transport                      │
//! │                    │                                │
//! │                    ▼                                │
//! │             avalanche-core                          │
//! │                    │                                │
//! │                    ▼                                │
//! │            avalanche-common  ◄── You are here      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Leaf crate: no internal dependencies, keep external ones minimal
//! - Everything here is shared by every connection task, so types must be `Send + Sync`
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;
pub mod validate;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use time::AtomicInstant;
pub use types::{ConnectionId, ConnectionState};
