// ============================================
// File: crates/avalanche-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types specific to the key exchange, the stream ciphers
//! and the wire framing in the Avalanche core crate.
//!
//! ## Error Categories
//! 1. **Crypto Errors**: prime production, key exchange, cipher keying
//! 2. **Framing Errors**: zero/oversized length prefixes, truncated headers
//! 3. **State Errors**: recomputing a secret, drawing from a closed source
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material in error messages
//! - Every framing error is a protocol violation; callers disconnect on it
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use avalanche_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for cryptographic and framing operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Cryptographic Errors
    // ========================================

    /// The prime producer stopped and no further primes will arrive.
    #[error("Prime source closed")]
    PrimeSourceClosed,

    /// Key exchange operation failed.
    #[error("Key exchange failed: {reason}")]
    KeyExchange {
        /// Why key exchange failed
        reason: String,
    },

    /// The peer public value could not be parsed.
    #[error("Malformed peer public key: {reason}")]
    MalformedPeerKey {
        /// What's wrong with the value (never the value itself)
        reason: String,
    },

    /// Cipher could not be keyed with the supplied material.
    #[error("Cipher keying failed: {reason}")]
    CipherKey {
        /// Why keying failed
        reason: String,
    },

    // ========================================
    // Framing Errors
    // ========================================

    /// A frame declared a zero length.
    #[error("Frame declares zero length at offset {offset}")]
    ZeroLengthFrame {
        /// Offset of the length prefix in the receive buffer
        offset: usize,
    },

    /// A frame declared more bytes than the receive buffer can hold.
    #[error("Frame too large: declared {declared} bytes, buffer holds {capacity}")]
    FrameTooLarge {
        /// Declared frame size including footer
        declared: usize,
        /// Physical buffer capacity
        capacity: usize,
    },

    /// Message is too short to be valid.
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum expected length
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Message is malformed.
    #[error("Malformed message: {reason}")]
    MalformedMessage {
        /// What's wrong with the message
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Bad exchange parameters from the caller.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `KeyExchange` error.
    pub fn key_exchange(reason: impl Into<String>) -> Self {
        Self::KeyExchange {
            reason: reason.into(),
        }
    }

    /// Creates a `MalformedPeerKey` error.
    pub fn malformed_peer_key(reason: impl Into<String>) -> Self {
        Self::MalformedPeerKey {
            reason: reason.into(),
        }
    }

    /// Creates a `CipherKey` error.
    pub fn cipher_key(reason: impl Into<String>) -> Self {
        Self::CipherKey {
            reason: reason.into(),
        }
    }

    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates a `MessageTooShort` error.
    #[must_use]
    pub const fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the remote peer caused this error by sending bad data.
    ///
    /// Protocol violations close the offending connection and nothing else.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            Self::MalformedPeerKey { .. }
            | Self::ZeroLengthFrame { .. }
            | Self::FrameTooLarge { .. }
            | Self::MessageTooShort { .. }
            | Self::MalformedMessage { .. } => true,
            _ => false,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_has_no_key_material() {
        let err = CoreError::malformed_peer_key("non-hex character at position 3");
        assert!(err.to_string().contains("position 3"));
    }

    #[test]
    fn test_protocol_violation_classification() {
        assert!(CoreError::ZeroLengthFrame { offset: 0 }.is_protocol_violation());
        assert!(CoreError::FrameTooLarge { declared: 9000, capacity: 4096 }.is_protocol_violation());
        assert!(CoreError::too_short(9, 3).is_protocol_violation());
        assert!(!CoreError::PrimeSourceClosed.is_protocol_violation());
        assert!(!CoreError::key_exchange("secret already computed").is_protocol_violation());
    }
}
