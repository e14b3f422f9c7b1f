// ============================================
// File: crates/avalanche-core/src/crypto/cipher/substitution.rs
// ============================================
//! # Substitution Stream Cipher
//!
//! ## Creation Reason
//! Older game clients encrypt with a table-driven XOR cipher. The base
//! table comes from a fixed seed, so it is identical for every
//! connection and is computed once at startup.
//!
//! ## Main Functionality
//! - `BaseKeyTable`: The 512-byte table expanded from the fixed seed
//! - `SubstitutionStreamCipher`: Per-connection engine over a shared table
//! - `KeystreamCounter`: Pluggable cursor increment (`PlainCounter`, `AtomicCounter`)
//!
//! ## Per-byte Transform
//! ```text
//! server:                     client (inverse):
//!   b = src ^ 0xAB              b = src ^ table[x & 0xFF]
//!   b = rotate(b, 4)            b ^= table[(x >> 8) + 256]
//!   b ^= table[x & 0xFF]        b = rotate(b, 4)
//!   b ^= table[(x >> 8) + 256]  b ^= 0xAB
//!   x += 1                      x += 1
//! ```
//! The server applies the same forward transform in both directions,
//! exactly as deployed servers do; the client end undoes it. The
//! transform is not an involution, so two server-role instances do not
//! round-trip with each other.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Server encrypt ALWAYS uses the base table. Only server decrypt
//!   switches to the session table after `generate_keys`
//! - Re-keying zeroes the server's encrypt cursor only. The decrypt cursor
//!   keeps running. Deployed clients depend on this asymmetry
//! - `Role::Client` mirrors both rules (session table for encrypt, decrypt
//!   cursor reset on re-key) and exists for tools and tests
//!
//! ## Last Modified
//! v0.1.0 - Initial substitution cipher

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use super::{CipherEngine, KeySeed};
use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Table length: two 256-byte halves.
pub const TABLE_SIZE: usize = 0x200;

const SEED: [u8; 8] = [0x9D, 0x0F, 0xFA, 0x13, 0x62, 0x79, 0x5C, 0x6D];

// ============================================
// BaseKeyTable
// ============================================

/// Immutable base table shared by every substitution cipher instance.
///
/// Build it once with [`BaseKeyTable::new`] and hand out clones of the `Arc`.
#[derive(Clone, PartialEq, Eq)]
pub struct BaseKeyTable {
    bytes: [u8; TABLE_SIZE],
}

impl BaseKeyTable {
    /// Expands the fixed seed into the base table.
    #[must_use]
    pub fn new() -> Self {
        let mut seed = SEED;
        let mut bytes = [0u8; TABLE_SIZE];
        for i in 0..0x100 {
            bytes[i] = seed[0];
            bytes[i + 0x100] = seed[4];
            seed[0] = seed[1]
                .wrapping_add(seed[0].wrapping_mul(seed[2]))
                .wrapping_mul(seed[0])
                .wrapping_add(seed[3]);
            seed[4] = seed[5]
                .wrapping_sub(seed[4].wrapping_mul(seed[6]))
                .wrapping_mul(seed[4])
                .wrapping_add(seed[7]);
        }
        Self { bytes }
    }

    /// Convenience for the common case of a shared handle.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Raw table bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; TABLE_SIZE] {
        &self.bytes
    }
}

impl Default for BaseKeyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BaseKeyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseKeyTable").finish_non_exhaustive()
    }
}

// ============================================
// Keystream Counters
// ============================================

/// Cursor increment strategy.
///
/// `advance` adds `len` (wrapping) and returns the value before the add.
pub trait KeystreamCounter: Send + std::fmt::Debug {
    /// Adds `len` and returns the previous position.
    fn advance(&mut self, len: usize) -> u16;

    /// Sets the position back to zero.
    fn reset(&mut self);
}

/// Plain post-increment. Correct whenever one task drives the direction.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCounter(u16);

impl KeystreamCounter for PlainCounter {
    #[allow(clippy::cast_possible_truncation)]
    fn advance(&mut self, len: usize) -> u16 {
        let previous = self.0;
        self.0 = self.0.wrapping_add(len as u16);
        previous
    }

    fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Atomic post-increment. Clones share one position, so concurrent
/// callers each reserve a disjoint keystream range.
#[derive(Debug, Default, Clone)]
pub struct AtomicCounter(Arc<AtomicU16>);

impl KeystreamCounter for AtomicCounter {
    #[allow(clippy::cast_possible_truncation)]
    fn advance(&mut self, len: usize) -> u16 {
        self.0.fetch_add(len as u16, Ordering::AcqRel)
    }

    fn reset(&mut self) {
        self.0.store(0, Ordering::Release);
    }
}

// ============================================
// SubstitutionStreamCipher
// ============================================

/// Which end of a connection a cipher instance serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    /// Forward transform both ways; what the game server runs.
    #[default]
    Server,
    /// Inverse transform; what a game client runs.
    Client,
}

/// Table-driven XOR stream cipher.
///
/// # Example
/// ```
/// use avalanche_core::crypto::cipher::{BaseKeyTable, CipherEngine, SubstitutionStreamCipher};
///
/// let table = BaseKeyTable::shared();
/// let mut server = SubstitutionStreamCipher::new(table.clone());
/// let mut client = SubstitutionStreamCipher::client(table);
///
/// let mut data = *b"hello";
/// client.encrypt(&mut data);
/// server.decrypt(&mut data);
/// assert_eq!(&data, b"hello");
/// ```
#[derive(Debug)]
pub struct SubstitutionStreamCipher<C: KeystreamCounter = PlainCounter> {
    base: Arc<BaseKeyTable>,
    session: Option<Box<[u8; TABLE_SIZE]>>,
    role: Role,
    encrypt_counter: C,
    decrypt_counter: C,
}

impl SubstitutionStreamCipher<PlainCounter> {
    /// Creates a server-role cipher on the base table with plain counters.
    #[must_use]
    pub fn new(base: Arc<BaseKeyTable>) -> Self {
        Self::with_counters(base, PlainCounter::default(), PlainCounter::default())
    }

    /// Creates the client-role counterpart of [`new`](Self::new).
    #[must_use]
    pub fn client(base: Arc<BaseKeyTable>) -> Self {
        Self::new(base).with_role(Role::Client)
    }
}

impl<C: KeystreamCounter> SubstitutionStreamCipher<C> {
    /// Creates a server-role cipher with caller-supplied counters.
    pub fn with_counters(base: Arc<BaseKeyTable>, encrypt_counter: C, decrypt_counter: C) -> Self {
        Self {
            base,
            session: None,
            role: Role::Server,
            encrypt_counter,
            decrypt_counter,
        }
    }

    /// Switches the role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Current role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Derives the session table from a 64-bit seed.
    ///
    /// Resets the cursor facing the session table's opposite direction:
    /// encrypt for the server, decrypt for the client.
    pub fn generate_session_table(&mut self, seed: u64) {
        #[allow(clippy::cast_possible_truncation)]
        let (a, b) = ((seed >> 32) as u32, seed as u32);
        let c = (a.wrapping_add(b) ^ 0x4321) ^ a;
        let d = c.wrapping_mul(c);
        let (c, d) = (c.to_le_bytes(), d.to_le_bytes());

        let base = self.base.as_bytes();
        let mut table = Box::new([0u8; TABLE_SIZE]);
        for i in 0..0x100 {
            table[i] = base[i] ^ c[i % 4];
            table[i + 0x100] = base[i + 0x100] ^ d[i % 4];
        }

        self.session = Some(table);
        match self.role {
            Role::Server => self.encrypt_counter.reset(),
            Role::Client => self.decrypt_counter.reset(),
        }
    }

    fn session_or_base(&self) -> &[u8; TABLE_SIZE] {
        self.session.as_deref().unwrap_or_else(|| self.base.as_bytes())
    }

    fn forward(buf: &mut [u8], table: &[u8; TABLE_SIZE], mut x: u16) {
        for byte in buf.iter_mut() {
            let mut b = *byte ^ 0xAB;
            b = b.rotate_left(4);
            b ^= table[usize::from(x & 0xff)];
            b ^= table[usize::from(x >> 8) + 0x100];
            *byte = b;
            x = x.wrapping_add(1);
        }
    }

    fn inverse(buf: &mut [u8], table: &[u8; TABLE_SIZE], mut x: u16) {
        for byte in buf.iter_mut() {
            let mut b = *byte ^ table[usize::from(x & 0xff)];
            b ^= table[usize::from(x >> 8) + 0x100];
            b = b.rotate_left(4);
            *byte = b ^ 0xAB;
            x = x.wrapping_add(1);
        }
    }
}

impl<C: KeystreamCounter> CipherEngine for SubstitutionStreamCipher<C> {
    fn encrypt(&mut self, buf: &mut [u8]) {
        let x = self.encrypt_counter.advance(buf.len());
        match self.role {
            Role::Server => Self::forward(buf, self.base.as_bytes(), x),
            Role::Client => Self::inverse(buf, self.session_or_base(), x),
        }
    }

    fn decrypt(&mut self, buf: &mut [u8]) {
        let x = self.decrypt_counter.advance(buf.len());
        match self.role {
            Role::Server => Self::forward(buf, self.session_or_base(), x),
            Role::Client => Self::inverse(buf, self.base.as_bytes(), x),
        }
    }

    fn generate_keys(&mut self, seed: KeySeed<'_>) -> Result<()> {
        let seed = match seed {
            KeySeed::Token(token) => token,
            KeySeed::Material(bytes) => {
                let head: [u8; 8] = bytes
                    .get(..8)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| CoreError::cipher_key("substitution seed needs 8 bytes"))?;
                u64::from_le_bytes(head)
            }
        };
        self.generate_session_table(seed);
        Ok(())
    }

    /// Drops the session table and zeroes both cursors.
    fn reset(&mut self) {
        self.session = None;
        self.encrypt_counter.reset();
        self.decrypt_counter.reset();
    }

    fn name(&self) -> &'static str {
        "substitution"
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    /// (client, server) over one shared table.
    fn pair() -> (SubstitutionStreamCipher, SubstitutionStreamCipher) {
        let table = BaseKeyTable::shared();
        (
            SubstitutionStreamCipher::client(table.clone()),
            SubstitutionStreamCipher::new(table),
        )
    }

    #[test]
    fn test_base_table_head() {
        let table = BaseKeyTable::new();
        assert_eq!(table.as_bytes()[0], 0x9D);
        assert_eq!(table.as_bytes()[0x100], 0x62);
        // seed[0] = (0x0F + 0x9D * 0xFA) * 0x9D + 0x13 mod 256
        let expected = 0x0Fu8
            .wrapping_add(0x9Du8.wrapping_mul(0xFA))
            .wrapping_mul(0x9D)
            .wrapping_add(0x13);
        assert_eq!(table.as_bytes()[1], expected);
    }

    #[test]
    fn test_roundtrip_from_cursor_zero() {
        let (mut client, mut server) = pair();
        let original: Vec<u8> = (0..=255u8).cycle().take(700).collect();

        let mut data = original.clone();
        client.encrypt(&mut data);
        assert_ne!(data, original);
        server.decrypt(&mut data);
        assert_eq!(data, original);

        let mut data = original.clone();
        server.encrypt(&mut data);
        client.decrypt(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_server_transform_is_not_an_involution() {
        let table = BaseKeyTable::shared();
        let mut a = SubstitutionStreamCipher::new(table.clone());
        let mut b = SubstitutionStreamCipher::new(table);
        let original = *b"not symmetric";
        let mut data = original;
        a.encrypt(&mut data);
        b.decrypt(&mut data);
        assert_ne!(data, original);
    }

    #[test]
    fn test_split_calls_match_single_call() {
        let table = BaseKeyTable::shared();
        let mut whole = SubstitutionStreamCipher::new(table.clone());
        let mut pieces = SubstitutionStreamCipher::new(table);
        let mut a = vec![0x42u8; 40];
        let mut b = a.clone();

        whole.encrypt(&mut a);
        let (head, tail) = b.split_at_mut(13);
        pieces.encrypt(head);
        pieces.encrypt(tail);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rekey_switches_decrypt_table_only() {
        let table = BaseKeyTable::shared();
        let mut server = SubstitutionStreamCipher::new(table.clone());
        let mut reference = SubstitutionStreamCipher::new(table);
        server.generate_keys(KeySeed::Token(0x1122_3344_5566_7788)).unwrap();

        // Server encrypt stays on the base table from cursor zero.
        let mut data = *b"frame";
        server.encrypt(&mut data);
        let mut expected = *b"frame";
        reference.encrypt(&mut expected);
        assert_eq!(data, expected);

        // Session table differs from base.
        let mut plain = *b"frame";
        let mut via_base = plain;
        server.decrypt(&mut plain);
        reference.decrypt(&mut via_base);
        assert_ne!(plain, via_base);
    }

    #[test]
    fn test_rekey_keeps_client_and_server_aligned() {
        let (mut client, mut server) = pair();
        let seed = KeySeed::Token(0xDEAD_BEEF_0BAD_F00D);

        // Exchange traffic before the re-key moves every cursor.
        let mut request = [7u8; 33];
        server.encrypt(&mut request);
        client.decrypt(&mut request);
        let mut response = [9u8; 21];
        client.encrypt(&mut response);
        server.decrypt(&mut response);
        assert_eq!(response, [9u8; 21]);

        server.generate_keys(seed).unwrap();
        client.generate_keys(seed).unwrap();

        let mut inbound = *b"after rekey, client to server";
        client.encrypt(&mut inbound);
        server.decrypt(&mut inbound);
        assert_eq!(&inbound, b"after rekey, client to server");

        let mut outbound = *b"after rekey, server to client";
        server.encrypt(&mut outbound);
        client.decrypt(&mut outbound);
        assert_eq!(&outbound, b"after rekey, server to client");
    }

    #[test]
    fn test_rekey_resets_encrypt_cursor_not_decrypt() {
        let table = BaseKeyTable::shared();
        let mut cipher = SubstitutionStreamCipher::new(table.clone());
        let mut scratch = [0u8; 10];
        cipher.encrypt(&mut scratch);
        cipher.decrypt(&mut scratch);

        cipher.generate_keys(KeySeed::Token(7)).unwrap();

        let mut fresh = SubstitutionStreamCipher::new(table.clone());
        let mut a = [1u8; 4];
        let mut b = [1u8; 4];
        cipher.encrypt(&mut a);
        fresh.encrypt(&mut b);
        assert_eq!(a, b, "encrypt cursor restarted at zero");

        let mut rekeyed_fresh = SubstitutionStreamCipher::new(table);
        rekeyed_fresh.generate_keys(KeySeed::Token(7)).unwrap();
        let mut c = [1u8; 4];
        let mut d = [1u8; 4];
        cipher.decrypt(&mut c);
        rekeyed_fresh.decrypt(&mut d);
        assert_ne!(c, d, "decrypt cursor kept its position");
    }

    #[test]
    fn test_material_seed_is_little_endian_head() {
        let table = BaseKeyTable::shared();
        let mut by_token = SubstitutionStreamCipher::new(table.clone());
        let mut by_material = SubstitutionStreamCipher::new(table);
        let material = b"0123456789abcdef";

        by_token
            .generate_keys(KeySeed::Token(u64::from_le_bytes(*b"01234567")))
            .unwrap();
        by_material.generate_keys(KeySeed::Material(material)).unwrap();

        let mut a = [9u8; 16];
        let mut b = [9u8; 16];
        by_token.decrypt(&mut a);
        by_material.decrypt(&mut b);
        assert_eq!(a, b);
        assert!(by_material.generate_keys(KeySeed::Material(b"short")).is_err());
    }

    #[test]
    fn test_atomic_counter_clones_share_position() {
        let mut a = AtomicCounter::default();
        let mut b = a.clone();
        assert_eq!(a.advance(5), 0);
        assert_eq!(b.advance(3), 5);
        assert_eq!(a.advance(0), 8);
        b.reset();
        assert_eq!(a.advance(1), 0);
    }

    #[test]
    fn test_counter_wraps_at_u16() {
        let mut counter = PlainCounter(u16::MAX - 1);
        assert_eq!(counter.advance(3), u16::MAX - 1);
        assert_eq!(counter.advance(0), 1);
    }
}
