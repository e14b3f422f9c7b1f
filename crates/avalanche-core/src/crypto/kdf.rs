// ============================================
// File: crates/avalanche-core/src/crypto/kdf.rs
// ============================================
//! # Session Key Derivation
//!
//! ## Creation Reason
//! Turns the Diffie-Hellman shared secret into the bytes that key a
//! connection's stream cipher.
//!
//! ## Main Functionality
//! - `derive_session_key`: Two-round MD5 folding of the secret
//! - `SessionKeyMaterial`: 64 ASCII hex bytes, zeroized on drop
//!
//! ## Derivation
//! ```text
//! secret (big-endian, cut at first 0x00)
//!        │ md5
//!        ▼
//! buf = d1 || d1                      (32 bytes)
//!        │ hex (lowercase, 64 bytes) ─► md5 ─► buf[16..32] = d2
//!        ▼
//! material = hex(d1 || d2)            (64 ASCII bytes)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - MD5 is here for wire compatibility with existing clients. Swapping the
//!   hash breaks every peer.
//! - The truncation at the first zero byte is part of the algebra, not a bug
//!
//! ## Last Modified
//! v0.1.0 - Initial key derivation

use md5::{Digest, Md5};
use num_bigint::BigUint;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// MD5 digest size in bytes.
pub const DIGEST_SIZE: usize = 16;

/// Size of the derived material: hex of two digests.
pub const SESSION_KEY_MATERIAL_SIZE: usize = DIGEST_SIZE * 2 * 2;

// ============================================
// SessionKeyMaterial
// ============================================

/// Bytes derived from a shared secret, used to key one cipher instance.
///
/// The content is lowercase ASCII hex. Debug output is redacted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeyMaterial {
    bytes: [u8; SESSION_KEY_MATERIAL_SIZE],
}

impl SessionKeyMaterial {
    /// Returns the raw material.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SESSION_KEY_MATERIAL_SIZE] {
        &self.bytes
    }

    /// First 16 bytes, the key of the block-feedback cipher.
    #[must_use]
    pub fn block_key(&self) -> &[u8] {
        &self.bytes[..16]
    }

    /// First 8 bytes read little-endian, the seed of the substitution cipher.
    #[must_use]
    pub fn substitution_seed(&self) -> u64 {
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&self.bytes[..8]);
        u64::from_le_bytes(seed)
    }
}

impl std::fmt::Debug for SessionKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeyMaterial([REDACTED])")
    }
}

// ============================================
// Key Derivation
// ============================================

/// Derives session key material from a shared secret.
///
/// # Errors
/// Returns `KeyExchange` if a digest cannot be hex-encoded into its slot.
pub fn derive_session_key(shared_secret: &BigUint) -> Result<SessionKeyMaterial> {
    let mut secret = shared_secret.to_bytes_be();
    let cut = secret.iter().position(|&b| b == 0).unwrap_or(secret.len());

    let mut buf = [0u8; DIGEST_SIZE * 2];
    let first = Md5::digest(&secret[..cut]);
    buf[..DIGEST_SIZE].copy_from_slice(&first);
    buf[DIGEST_SIZE..].copy_from_slice(&first);

    secret.zeroize();

    let mut hexed = [0u8; DIGEST_SIZE * 4];
    let mut material = SessionKeyMaterial {
        bytes: [0u8; SESSION_KEY_MATERIAL_SIZE],
    };
    let folded = hex::encode_to_slice(buf, &mut hexed).and_then(|()| {
        let second = Md5::digest(hexed);
        buf[DIGEST_SIZE..].copy_from_slice(&second);
        hex::encode_to_slice(buf, &mut material.bytes)
    });

    buf.zeroize();
    hexed.zeroize();
    folded.map_err(|e| CoreError::key_exchange(format!("hex encoding session key: {e}")))?;
    Ok(material)
}

// ============================================
// Tests
// ============================================
