// ============================================
// File: crates/avalanche-core/src/lib.rs
// ============================================
//! # Avalanche Core - Key Exchange, Ciphers & Framing
//!
//! ## Creation Reason
//! The socket-free half of the game transport: everything that can be
//! exercised with plain byte slices and tested without a network.
//!
//! ## Main Functionality
//!
//! ### Crypto Module ([`crypto`])
//! - `PrimeSource`: background probable-prime producer
//! - `KeyExchange`: Diffie-Hellman over the drawn prime
//! - `derive_session_key`: MD5 folding into session key material
//! - `SubstitutionStreamCipher`, `BlockFeedbackStreamCipher` behind `CipherEngine`
//!
//! ### Protocol Module ([`protocol`])
//! - `FrameSplitter` and the outbound frame builder
//! - `Packet` view, `PacketWriter`, hex dump
//! - `PacketRouter` opcode table
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
//! │             avalanche-core  ◄── You are here        │
//! │                    │                                │
//! │                    ▼                                │
//! │            avalanche-common                         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Wire compatibility beats everything here. MD5, CAST5 feedback and
//!   the exchange algebra must match deployed clients bit for bit
//! - Block primitives come from RustCrypto; only the modes are local
//! - Key material implements Zeroize
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod protocol;

// Re-export commonly used items
pub use crypto::{
    BaseKeyTable, BlockFeedbackStreamCipher, CipherEngine, KeyExchange, KeySeed, PrimeSource,
    SessionKeyMaterial, SubstitutionStreamCipher,
};
pub use error::{CoreError, Result};
pub use protocol::{build_outbound_frame, FrameSplitter, Packet, PacketRouter, PacketWriter};
