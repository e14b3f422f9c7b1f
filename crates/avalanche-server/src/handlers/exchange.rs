// ============================================
// File: crates/avalanche-server/src/handlers/exchange.rs
// ============================================
//! # Key Exchange Handler
//!
//! ## Creation Reason
//! Every connection starts under a well-known key. This handler runs the
//! Diffie-Hellman exchange that replaces it with a per-connection session
//! key before any game packet is accepted.
//!
//! ## Main Functionality
//! - `ExchangeHandler::begin`: Draw a prime, send the exchange request
//! - `ExchangeHandler::complete`: Parse the client's reply, derive, re-key
//! - Wire helpers for both messages (`build_request`, `parse_request`,
//!   `build_response`, `parse_response`)
//! - `rekey`: How each cipher kind consumes session key material
//!
//! ## Exchange Flow
//! ```text
//! Server                                       Client
//!   │  connected                                 │
//!   │  m ◄── PrimeSource; A = g^m mod p          │
//!   │ ─── request { junk, ivs, p, g, A } ──────► │
//!   │                                            │  B = g^n mod p
//!   │ ◄── response { junk, B } ───────────────── │  (first frame)
//!   │  s = B^m mod p ─► material ─► re-key       │
//! ```
//!
//! ## Request Layout (after the 11-byte pad, all u32 little-endian)
//! ```text
//! size | junk_len junk | 8 iv | 8 iv | p_len p | g_len g | a_len A | 2-byte pad
//! ```
//! ## Response Layout
//! ```text
//! 7-byte pad | size | junk_len junk | b_len B | ...
//! ```
//! `size` at offset 7 is the frame length minus 7, which is what the
//! receive loop reads as the handshake length.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Exchange state lives only between `begin` and `complete`; a reply
//!   without a pending exchange is rejected
//! - Hex strings are never logged
//!
//! ## Last Modified
//! v0.1.0 - Initial key exchange handler

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use dashmap::DashMap;
use rand::RngCore;
use tokio::time;
use tracing::{debug, trace};

use avalanche_common::ConnectionId;
use avalanche_core::crypto::{CipherEngine, KeyExchange, KeySeed, PrimeSource, SessionKeyMaterial};
use avalanche_core::error::CoreError;
use avalanche_core::protocol::{PacketReader, PacketWriter, HANDSHAKE_LENGTH_OFFSET};
use avalanche_transport::Connection;

use crate::config::{CipherKind, KeyExchangeConfig};
use crate::error::{Result, ServerError};

// ============================================
// Constants
// ============================================

/// Random bytes ahead of the request's size field.
pub const REQUEST_PADDING: usize = 11;

/// Junk block length in requests.
pub const JUNK_SIZE: usize = 12;

/// Length of each (unused, zeroed) IV in the request.
pub const IV_SIZE: usize = 8;

/// Random bytes after the request's last field.
pub const TRAILER_SIZE: usize = 2;

/// Largest junk block accepted in a response.
pub const MAX_RESPONSE_JUNK: usize = 256;

/// Largest public key hex accepted in a response.
pub const MAX_PUBLIC_KEY_HEX: usize = 1024;

// ============================================
// ExchangeHandler
// ============================================

/// Per-connection key exchange state machine.
pub struct ExchangeHandler {
    template: KeyExchange,
    primitive_root_hex: String,
    generator_hex: String,
    primes: Arc<PrimeSource>,
    kind: CipherKind,
    timeout: Duration,
    pending: DashMap<ConnectionId, KeyExchange>,
    completed: AtomicU64,
}

impl ExchangeHandler {
    /// Creates a handler drawing primes from `primes`.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if `p` or `g` is unusable.
    pub fn new(config: &KeyExchangeConfig, kind: CipherKind, primes: Arc<PrimeSource>) -> Result<Self> {
        Ok(Self {
            template: config.template()?,
            primitive_root_hex: config.primitive_root.clone(),
            generator_hex: config.generator.clone(),
            primes,
            kind,
            timeout: config.exchange_timeout(),
            pending: DashMap::new(),
            completed: AtomicU64::new(0),
        })
    }

    /// Computes this side's public value and sends the exchange request.
    ///
    /// # Errors
    /// - `ExchangeTimeout` if no prime arrives in time
    /// - `Core` if the prime source has stopped
    /// - `Transport` if the request cannot be sent
    pub async fn begin(&self, connection: &Arc<Connection>) -> Result<()> {
        let id = connection.id();
        let mut exchange = self.template.clone();

        match time::timeout(self.timeout, exchange.compute_public_key(&self.primes)).await {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                return Err(ServerError::ExchangeTimeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }

        let public_key = exchange
            .public_value_hex()
            .ok_or_else(|| CoreError::key_exchange("public key not computed"))?;
        let request = build_request(&self.primitive_root_hex, &self.generator_hex, &public_key)?;

        self.pending.insert(id, exchange);
        if let Err(e) = connection.send(&request).await {
            self.pending.remove(&id);
            return Err(e.into());
        }

        trace!(connection = %id, len = request.len(), "Exchange request sent");
        Ok(())
    }

    /// Finishes the exchange from the client's first frame and re-keys
    /// the connection's cipher.
    ///
    /// # Errors
    /// - `ExchangeNotStarted` if `begin` has not completed for this connection
    /// - `InvalidExchange` / `Core` if the reply is malformed
    pub fn complete(&self, connection: &Arc<Connection>, frame: &[u8]) -> Result<()> {
        let id = connection.id();
        let (_, mut exchange) = self
            .pending
            .remove(&id)
            .ok_or(ServerError::ExchangeNotStarted(id))?;

        let peer_key = parse_response(frame)?;
        exchange.compute_shared_secret(peer_key)?;
        let material = exchange.derive_session_key()?;

        connection.with_cipher(|cipher| rekey(self.kind, cipher, &material))?;
        self.completed.fetch_add(1, Ordering::Relaxed);

        debug!(connection = %id, cipher = ?self.kind, "Session key installed");
        Ok(())
    }

    /// Drops any pending state for a closed connection.
    pub fn forget(&self, id: ConnectionId) {
        self.pending.remove(&id);
    }

    /// Exchanges waiting for a client reply.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Exchanges finished since startup.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ExchangeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeHandler")
            .field("kind", &self.kind)
            .field("pending", &self.pending.len())
            .field("completed", &self.completed())
            .finish_non_exhaustive()
    }
}

// ============================================
// Re-keying
// ============================================

/// Installs session key material into `cipher`.
///
/// - `BlockFeedback`: key from the first 16 bytes, then both registers reset
/// - `Substitution`: session table from the first 8 bytes as a LE `u64`
///
/// # Errors
/// Returns `CipherKey` if the engine rejects the material.
pub fn rekey(
    kind: CipherKind,
    cipher: &mut dyn CipherEngine,
    material: &SessionKeyMaterial,
) -> avalanche_core::Result<()> {
    match kind {
        CipherKind::BlockFeedback => {
            cipher.generate_keys(KeySeed::Material(material.block_key()))?;
            cipher.reset();
        }
        CipherKind::Substitution => {
            cipher.generate_keys(KeySeed::Token(material.substitution_seed()))?;
        }
    }
    Ok(())
}

// ============================================
// Wire Format
// ============================================

/// Fields of a parsed exchange request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeRequest<'a> {
    /// Modulus `p`, hex.
    pub primitive_root: &'a str,
    /// Generator `g`, hex.
    pub generator: &'a str,
    /// Server public value, hex.
    pub public_key: &'a str,
}

fn put_field(writer: &mut PacketWriter, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| CoreError::malformed(format!("field of {} bytes exceeds u32", bytes.len())))?;
    writer.put_u32(len).put_bytes(bytes);
    Ok(())
}

fn read_field<'a>(reader: &mut PacketReader<'a>, max: usize, what: &str) -> Result<&'a [u8]> {
    let len = usize::try_from(reader.read_u32()?).unwrap_or(usize::MAX);
    if len > max {
        return Err(ServerError::invalid_exchange(format!(
            "{what} length {len} exceeds {max}"
        )));
    }
    Ok(reader.read_bytes(len)?)
}

fn as_hex_str<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(bytes)
        .map_err(|_| ServerError::invalid_exchange(format!("{what} is not ASCII")))
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Builds the server's exchange request.
///
/// # Errors
/// Returns `Core` if a field does not fit its length prefix.
pub fn build_request(primitive_root: &str, generator: &str, public_key: &str) -> Result<BytesMut> {
    let mut body = PacketWriter::raw();
    put_field(&mut body, &random_bytes::<JUNK_SIZE>())?;
    put_field(&mut body, &[0u8; IV_SIZE])?;
    put_field(&mut body, &[0u8; IV_SIZE])?;
    put_field(&mut body, primitive_root.as_bytes())?;
    put_field(&mut body, generator.as_bytes())?;
    put_field(&mut body, public_key.as_bytes())?;
    body.put_bytes(&random_bytes::<TRAILER_SIZE>());
    let body = body.into_inner();

    let size = u32::try_from(body.len() + 4)
        .map_err(|_| CoreError::malformed("exchange request exceeds u32"))?;
    let mut request = PacketWriter::raw();
    request
        .put_bytes(&random_bytes::<REQUEST_PADDING>())
        .put_u32(size)
        .put_bytes(&body);
    Ok(request.into_inner())
}

/// Parses an exchange request; the client side of [`build_request`].
///
/// A trailing footer is ignored.
///
/// # Errors
/// Returns `Core`/`InvalidExchange` on truncated or oversized fields.
pub fn parse_request(frame: &[u8]) -> Result<ExchangeRequest<'_>> {
    let mut reader = PacketReader::new(frame);
    reader.skip(REQUEST_PADDING)?;
    let _size = reader.read_u32()?;
    read_field(&mut reader, MAX_RESPONSE_JUNK, "junk")?;
    read_field(&mut reader, IV_SIZE, "iv")?;
    read_field(&mut reader, IV_SIZE, "iv")?;
    let primitive_root = as_hex_str(read_field(&mut reader, MAX_PUBLIC_KEY_HEX, "p")?, "p")?;
    let generator = as_hex_str(read_field(&mut reader, MAX_PUBLIC_KEY_HEX, "g")?, "g")?;
    let public_key =
        as_hex_str(read_field(&mut reader, MAX_PUBLIC_KEY_HEX, "public key")?, "public key")?;
    Ok(ExchangeRequest {
        primitive_root,
        generator,
        public_key,
    })
}

/// Builds a client exchange response carrying `public_key`.
///
/// # Errors
/// Returns `Core` if the key does not fit its length prefix.
pub fn build_response(public_key: &str) -> Result<BytesMut> {
    let mut response = PacketWriter::raw();
    response
        .put_bytes(&random_bytes::<HANDSHAKE_LENGTH_OFFSET>())
        .put_u32(0);
    put_field(&mut response, &random_bytes::<JUNK_SIZE>())?;
    put_field(&mut response, public_key.as_bytes())?;
    let mut response = response.into_inner();

    let size = u16::try_from(response.len() - HANDSHAKE_LENGTH_OFFSET)
        .map_err(|_| CoreError::malformed("exchange response exceeds u16"))?;
    response[HANDSHAKE_LENGTH_OFFSET..HANDSHAKE_LENGTH_OFFSET + 4]
        .copy_from_slice(&u32::from(size).to_le_bytes());
    Ok(response)
}

/// Extracts the client's public key hex from its exchange response.
///
/// # Errors
/// Returns `Core`/`InvalidExchange` on truncated or oversized fields.
pub fn parse_response(frame: &[u8]) -> Result<&str> {
    let mut reader = PacketReader::new(frame);
    reader.skip(HANDSHAKE_LENGTH_OFFSET)?;
    let _size = reader.read_u32()?;
    read_field(&mut reader, MAX_RESPONSE_JUNK, "junk")?;
    let key = read_field(&mut reader, MAX_PUBLIC_KEY_HEX, "public key")?;
    if key.is_empty() {
        return Err(CoreError::malformed_peer_key("empty").into());
    }
    as_hex_str(key, "public key")
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use avalanche_core::crypto::cipher::{BaseKeyTable, BlockFeedbackStreamCipher, SubstitutionStreamCipher};
    use avalanche_core::crypto::derive_session_key;
    use avalanche_core::protocol::handshake_frame_len;
    use num_bigint::BigUint;

    #[test]
    fn test_request_roundtrip() {
        let request = build_request("E7A69EBD", "05", "1f2e3d").unwrap();
        let mut framed = request.to_vec();
        framed.extend_from_slice(b"TQServer");

        let parsed = parse_request(&framed).unwrap();
        assert_eq!(parsed.primitive_root, "E7A69EBD");
        assert_eq!(parsed.generator, "05");
        assert_eq!(parsed.public_key, "1f2e3d");

        let size = u32::from_le_bytes(request[11..15].try_into().unwrap());
        assert_eq!(size as usize, request.len() - REQUEST_PADDING);
    }

    #[test]
    fn test_response_length_matches_handshake_header() {
        let response = build_response("abcdef0123").unwrap();
        assert_eq!(handshake_frame_len(&response).unwrap(), response.len());
        assert_eq!(parse_response(&response).unwrap(), "abcdef0123");
    }

    #[test]
    fn test_response_rejects_oversized_fields() {
        let mut frame = vec![0u8; 7];
        frame.extend_from_slice(&100u32.to_le_bytes());
        frame.extend_from_slice(&10_000u32.to_le_bytes());
        assert!(matches!(
            parse_response(&frame),
            Err(ServerError::InvalidExchange { .. })
        ));

        let truncated = build_response("abcdef").unwrap();
        assert!(parse_response(&truncated[..truncated.len() - 2]).is_err());
    }

    #[test]
    fn test_response_rejects_empty_key() {
        let response = build_response("").unwrap();
        let err = parse_response(&response).unwrap_err();
        assert!(err.is_client_fault());
    }

    fn exchanged_material() -> SessionKeyMaterial {
        let p = BigUint::from(0xFFFF_FFFB_u64);
        let secret = BigUint::from(5u8).modpow(&BigUint::from(77u8), &p);
        derive_session_key(&secret).unwrap()
    }

    #[test]
    fn test_rekey_block_feedback_resets_registers() {
        let material = exchanged_material();
        let mut server = BlockFeedbackStreamCipher::with_initial_key().unwrap();
        let mut scratch = [0u8; 5];
        server.encrypt(&mut scratch);

        rekey(CipherKind::BlockFeedback, &mut server, &material).unwrap();

        let mut fresh = BlockFeedbackStreamCipher::new(material.block_key()).unwrap();
        let mut a = *b"post-exchange";
        let mut b = a;
        server.encrypt(&mut a);
        fresh.encrypt(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rekey_substitution_uses_seed() {
        let material = exchanged_material();
        let table = BaseKeyTable::shared();
        let mut server = SubstitutionStreamCipher::new(table.clone());
        let mut client = SubstitutionStreamCipher::client(table);

        rekey(CipherKind::Substitution, &mut server, &material).unwrap();
        rekey(CipherKind::Substitution, &mut client, &material).unwrap();

        let mut data = *b"session traffic";
        client.encrypt(&mut data);
        server.decrypt(&mut data);
        assert_eq!(&data, b"session traffic");
    }
}
