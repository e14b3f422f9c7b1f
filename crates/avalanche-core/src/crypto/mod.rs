// ============================================
// File: crates/avalanche-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Everything needed to take a fresh TCP connection from "unkeyed" to
//! "streaming under a session cipher".
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`prime`]: Background producer of probable primes
//! - [`exchange`]: Diffie-Hellman exchange over the drawn prime
//! - [`kdf`]: Two-round MD5 session key derivation
//! - [`cipher`]: The two stream cipher engines
//!
//! ## Cryptographic Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Exchange Phase                           │
//! │  Server                                        Client       │
//! │    │  m = PrimeSource.next()                      │         │
//! │    │  p, g, g^m mod p ──────────────────────────► │         │
//! │    │ ◄────────────────────────── peer public (hex)│         │
//! │    │                                              │         │
//! │    │  secret = peer^m mod p                       │         │
//! │    │       │                                      │         │
//! │    │       ▼                                      │         │
//! │    │  MD5 fold ─────► SessionKeyMaterial          │         │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Streaming Phase                          │
//! │   SessionKeyMaterial ──► CipherEngine.generate_keys         │
//! │   every byte in/out ───► encrypt / decrypt cursor           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - These are legacy wire ciphers kept for client compatibility; they
//!   offer obfuscation, not modern confidentiality
//! - Block primitives (CAST5, MD5) come from RustCrypto crates
//! - Session key material implements Zeroize
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod cipher;
pub mod exchange;
pub mod kdf;
pub mod prime;

// Re-export primary types at module level
pub use cipher::{
    BaseKeyTable, BlockFeedbackStreamCipher, CipherEngine, KeySeed, SubstitutionStreamCipher,
};
pub use exchange::KeyExchange;
pub use kdf::{derive_session_key, SessionKeyMaterial};
pub use prime::PrimeSource;
