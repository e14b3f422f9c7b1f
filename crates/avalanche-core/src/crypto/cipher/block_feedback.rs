// ============================================
// File: crates/avalanche-core/src/crypto/cipher/block_feedback.rs
// ============================================
//! # Block Feedback Stream Cipher (CAST5)
//!
//! ## Creation Reason
//! Newer game clients wrap CAST5 in a 64-bit cipher feedback mode. The
//! block cipher itself comes from RustCrypto; only the feedback loop
//! lives here.
//!
//! ## Main Functionality
//! - `BlockFeedbackStreamCipher`: Per-direction register + cursor over one CAST5 key
//!
//! ## Feedback Loop (per byte)
//! ```text
//! encrypt:  if n == 0 { reg = CAST5(reg) }  c = p ^ reg[n]; reg[n] = c
//! decrypt:  if n == 0 { reg = CAST5(reg) }  p = c ^ reg[n]; reg[n] = c
//! n = (n + 1) mod 8
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The register is 16 bytes but only the first block is ever fed back:
//!   the cursor wraps at 8, which is what deployed clients do
//! - Call `reset` after re-keying. A desync is fatal to the connection;
//!   there is no in-place recovery
//!
//! ## Last Modified
//! v0.1.0 - Initial block feedback cipher

use cast5::cipher::generic_array::GenericArray;
use cast5::cipher::{BlockEncrypt, KeyInit};
use cast5::Cast5;
use zeroize::Zeroize;

use super::{CipherEngine, KeySeed};
use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Key length taken from the supplied material.
pub const KEY_SIZE: usize = 16;

/// Feedback register size (two blocks).
pub const REGISTER_SIZE: usize = 16;

const BLOCK_SIZE: usize = 8;

/// Initial key used before the exchange completes.
pub const DEFAULT_INITIAL_KEY: &[u8; KEY_SIZE] = b"BC234xs45nme7HU9";

// ============================================
// Direction State
// ============================================

#[derive(Clone, Default)]
struct Feedback {
    register: [u8; REGISTER_SIZE],
    cursor: usize,
}

impl Feedback {
    fn clear(&mut self) {
        self.register.zeroize();
        self.cursor = 0;
    }

    fn refill(&mut self, cipher: &Cast5) {
        if self.cursor == 0 {
            cipher.encrypt_block(GenericArray::from_mut_slice(&mut self.register[..BLOCK_SIZE]));
        }
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % BLOCK_SIZE;
    }
}

// ============================================
// BlockFeedbackStreamCipher
// ============================================

/// CAST5 in 64-bit cipher feedback mode.
///
/// # Example
/// ```
/// use avalanche_core::crypto::cipher::{BlockFeedbackStreamCipher, CipherEngine};
///
/// let mut a = BlockFeedbackStreamCipher::new(b"0123456789abcdef").unwrap();
/// let mut b = BlockFeedbackStreamCipher::new(b"0123456789abcdef").unwrap();
///
/// let mut data = *b"hello world";
/// a.encrypt(&mut data);
/// b.decrypt(&mut data);
/// assert_eq!(&data, b"hello world");
/// ```
#[derive(Clone)]
pub struct BlockFeedbackStreamCipher {
    cipher: Cast5,
    encrypt_state: Feedback,
    decrypt_state: Feedback,
}

impl BlockFeedbackStreamCipher {
    /// Creates a cipher keyed with the first 16 bytes of `key`, registers zeroed.
    ///
    /// # Errors
    /// Returns `CipherKey` if fewer than 16 bytes are supplied.
    pub fn new(key: &[u8]) -> Result<Self> {
        Ok(Self {
            cipher: Self::schedule(key)?,
            encrypt_state: Feedback::default(),
            decrypt_state: Feedback::default(),
        })
    }

    /// Creates a cipher keyed with [`DEFAULT_INITIAL_KEY`].
    ///
    /// # Errors
    /// Never in practice; the default key has a valid length.
    pub fn with_initial_key() -> Result<Self> {
        Self::new(DEFAULT_INITIAL_KEY)
    }

    /// Replaces the key schedule. Registers are left untouched.
    ///
    /// # Errors
    /// Returns `CipherKey` if fewer than 16 bytes are supplied.
    pub fn generate_key(&mut self, key: &[u8]) -> Result<()> {
        self.cipher = Self::schedule(key)?;
        Ok(())
    }

    fn schedule(key: &[u8]) -> Result<Cast5> {
        let key = key.get(..KEY_SIZE).ok_or_else(|| {
            CoreError::cipher_key(format!("block feedback key needs {KEY_SIZE} bytes, got {}", key.len()))
        })?;
        Cast5::new_from_slice(key).map_err(|_| CoreError::cipher_key("CAST5 rejected key length"))
    }
}

impl CipherEngine for BlockFeedbackStreamCipher {
    fn encrypt(&mut self, buf: &mut [u8]) {
        let state = &mut self.encrypt_state;
        for byte in buf.iter_mut() {
            state.refill(&self.cipher);
            let c = *byte ^ state.register[state.cursor];
            state.register[state.cursor] = c;
            *byte = c;
            state.advance();
        }
    }

    fn decrypt(&mut self, buf: &mut [u8]) {
        let state = &mut self.decrypt_state;
        for byte in buf.iter_mut() {
            state.refill(&self.cipher);
            let c = *byte;
            *byte = c ^ state.register[state.cursor];
            state.register[state.cursor] = c;
            state.advance();
        }
    }

    fn generate_keys(&mut self, seed: KeySeed<'_>) -> Result<()> {
        match seed {
            KeySeed::Material(bytes) => self.generate_key(bytes),
            KeySeed::Token(_) => Err(CoreError::cipher_key(
                "block feedback cipher needs key material, not a token",
            )),
        }
    }

    fn reset(&mut self) {
        self.encrypt_state.clear();
        self.decrypt_state.clear();
    }

    fn name(&self) -> &'static str {
        "block_feedback"
    }
}

impl Drop for BlockFeedbackStreamCipher {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for BlockFeedbackStreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockFeedbackStreamCipher")
            .field("encrypt_cursor", &self.encrypt_state.cursor)
            .field("decrypt_cursor", &self.decrypt_state.cursor)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; 16] = b"0123456789abcdef";

    #[test]
    fn test_roundtrip_across_block_wraps() {
        for len in [1usize, 15, 16, 17, 33] {
            let mut sender = BlockFeedbackStreamCipher::new(KEY).unwrap();
            let mut receiver = BlockFeedbackStreamCipher::new(KEY).unwrap();
            let original: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();

            let mut data = original.clone();
            sender.encrypt(&mut data);
            receiver.decrypt(&mut data);
            assert_eq!(data, original, "length {len}");
        }
    }

    #[test]
    fn test_stream_continues_across_calls() {
        let mut sender = BlockFeedbackStreamCipher::new(KEY).unwrap();
        let mut receiver = BlockFeedbackStreamCipher::new(KEY).unwrap();

        let mut first = *b"abcdefghijk";
        let mut second = *b"lmnopqrstuvwxyz";
        sender.encrypt(&mut first);
        sender.encrypt(&mut second);

        let mut joined = [first.as_slice(), second.as_slice()].concat();
        receiver.decrypt(&mut joined);
        assert_eq!(joined, b"abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_ciphertext_feeds_back() {
        let mut a = BlockFeedbackStreamCipher::new(KEY).unwrap();
        let mut b = BlockFeedbackStreamCipher::new(KEY).unwrap();

        let mut x = [0u8; 16];
        let mut y = [0u8; 16];
        y[0] = 1;
        a.encrypt(&mut x);
        b.encrypt(&mut y);

        // A change in byte 0 alters the next block through the register.
        assert_ne!(x[8..], y[8..]);
        assert_eq!(x[1..8], y[1..8]);
    }

    #[test]
    fn test_reset_restores_initial_stream() {
        let mut cipher = BlockFeedbackStreamCipher::new(KEY).unwrap();
        let mut first = [0x55u8; 12];
        cipher.encrypt(&mut first);

        cipher.reset();
        let mut again = [0x55u8; 12];
        cipher.encrypt(&mut again);
        assert_eq!(first, again);
    }

    #[test]
    fn test_rekey_with_material() {
        let mut server = BlockFeedbackStreamCipher::with_initial_key().unwrap();
        let mut client = BlockFeedbackStreamCipher::new(KEY).unwrap();
        server.generate_keys(KeySeed::Material(b"0123456789abcdef-extra")).unwrap();
        server.reset();

        let mut data = *b"after exchange";
        client.encrypt(&mut data);
        server.decrypt(&mut data);
        assert_eq!(&data, b"after exchange");
    }

    #[test]
    fn test_short_or_token_key_rejected() {
        assert!(BlockFeedbackStreamCipher::new(b"short").is_err());
        let mut cipher = BlockFeedbackStreamCipher::new(KEY).unwrap();
        assert!(cipher.generate_keys(KeySeed::Token(1)).is_err());
    }
}
