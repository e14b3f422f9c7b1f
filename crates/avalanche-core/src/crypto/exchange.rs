// ============================================
// File: crates/avalanche-core/src/crypto/exchange.rs
// ============================================
//! # Diffie-Hellman Key Exchange
//!
//! ## Creation Reason
//! Establishes the per-connection shared secret that keys the session
//! cipher.
//!
//! ## Main Functionality
//! - `KeyExchange`: Holds root `p`, generator `g`, the drawn prime `m`
//!   and the results of both halves of the exchange
//!
//! ## Algebra
//! ```text
//! m       = PrimeSource.next()          (drawn once, memoized)
//! public  = g ^ m  mod p
//! secret  = peer ^ m mod p
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The exponent is the freshly drawn prime `m`. This is NOT textbook
//!   Diffie-Hellman, but every deployed client computes exactly this.
//!   Do not "fix" it.
//! - The secret is computed once. A second call is an error.
//!
//! ## Last Modified
//! v0.1.0 - Initial key exchange

use num_bigint::BigUint;
use tracing::trace;

use avalanche_common::error::CommonError;
use avalanche_common::validate;

use super::kdf::{derive_session_key, SessionKeyMaterial};
use super::prime::PrimeSource;
use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Default primitive root modulus `p`, 512 bits, hex.
pub const DEFAULT_PRIMITIVE_ROOT: &str = concat!(
    "E7A69EBDF105F2A6BBDEAD7E798F76A209AD73FB466431E2E7352ED262F8C558",
    "F10BEFEA977DE9E21DCEE9B04D245F300ECCBBA03E72630556D011023F9E857F",
);

/// Default generator `g`, hex.
pub const DEFAULT_GENERATOR: &str = "05";

// ============================================
// KeyExchange
// ============================================

/// One side of the key exchange, owned by a single connection.
#[derive(Debug, Clone)]
pub struct KeyExchange {
    primitive_root: BigUint,
    generator: BigUint,
    modulus: Option<BigUint>,
    public_value: Option<BigUint>,
    shared_secret: Option<BigUint>,
}

impl KeyExchange {
    /// Creates an exchange from hex-encoded root and generator.
    ///
    /// # Errors
    /// Returns `Common` if either value is not hex or is out of range.
    pub fn from_hex(primitive_root: &str, generator: &str) -> Result<Self> {
        let primitive_root = parse_hex(primitive_root)
            .ok_or_else(|| CommonError::invalid_input("primitive_root", "not a hex integer"))?;
        let generator = parse_hex(generator)
            .ok_or_else(|| CommonError::invalid_input("generator", "not a hex integer"))?;
        Self::new(primitive_root, generator)
    }

    /// Creates an exchange from already-parsed parameters.
    ///
    /// # Errors
    /// Returns `Common` if the root is below 2 or the generator is zero.
    pub fn new(primitive_root: BigUint, generator: BigUint) -> Result<Self> {
        validate::at_least("primitive_root", &primitive_root, &BigUint::from(2u8))?;
        validate::non_zero("generator", generator.clone())?;
        Ok(Self {
            primitive_root,
            generator,
            modulus: None,
            public_value: None,
            shared_secret: None,
        })
    }

    /// Draws `m` from the source on first use, then computes `g^m mod p`.
    ///
    /// Suspends while the source is empty; wrap in a timeout.
    ///
    /// # Errors
    /// Returns `PrimeSourceClosed` if the source has stopped.
    pub async fn compute_public_key(&mut self, primes: &PrimeSource) -> Result<&BigUint> {
        let modulus = match self.modulus.take() {
            Some(m) => m,
            None => primes.next().await?,
        };
        Ok(self.compute_public_key_with(modulus))
    }

    /// Same as [`compute_public_key`](Self::compute_public_key) with `m`
    /// supplied directly. An already memoized `m` wins over the argument.
    pub fn compute_public_key_with(&mut self, modulus: BigUint) -> &BigUint {
        let modulus = self.modulus.take().unwrap_or(modulus);
        let public = self.generator.modpow(&modulus, &self.primitive_root);
        trace!(bits = public.bits(), "Public value computed");
        self.modulus = Some(modulus);
        self.public_value.insert(public)
    }

    /// Computes `peer^m mod p` from a hex string.
    ///
    /// # Errors
    /// - `MalformedPeerKey` if the string is empty or not hexadecimal
    /// - `KeyExchange` if no public key was computed yet or the secret exists
    pub fn compute_shared_secret(&mut self, peer_public_hex: &str) -> Result<&BigUint> {
        if self.shared_secret.is_some() {
            return Err(CoreError::key_exchange("shared secret already computed"));
        }
        let modulus = self
            .modulus
            .as_ref()
            .ok_or_else(|| CoreError::key_exchange("public key not computed yet"))?;

        let peer = parse_hex(peer_public_hex.trim())
            .ok_or_else(|| CoreError::malformed_peer_key("not a hexadecimal integer"))?;

        let secret = peer.modpow(modulus, &self.primitive_root);
        Ok(self.shared_secret.insert(secret))
    }

    /// Derives session key material from the shared secret.
    ///
    /// # Errors
    /// Returns `KeyExchange` if the secret has not been computed.
    pub fn derive_session_key(&self) -> Result<SessionKeyMaterial> {
        let secret = self
            .shared_secret
            .as_ref()
            .ok_or_else(|| CoreError::key_exchange("shared secret not computed yet"))?;
        derive_session_key(secret)
    }

    /// Primitive root `p`.
    #[must_use]
    pub const fn primitive_root(&self) -> &BigUint {
        &self.primitive_root
    }

    /// Generator `g`.
    #[must_use]
    pub const fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// Public value, once computed.
    #[must_use]
    pub const fn public_value(&self) -> Option<&BigUint> {
        self.public_value.as_ref()
    }

    /// Public value as lowercase hex, once computed.
    #[must_use]
    pub fn public_value_hex(&self) -> Option<String> {
        self.public_value.as_ref().map(|v| v.to_str_radix(16))
    }

    /// Shared secret, once computed.
    #[must_use]
    pub const fn shared_secret(&self) -> Option<&BigUint> {
        self.shared_secret.as_ref()
    }
}

impl Default for KeyExchange {
    fn default() -> Self {
        Self {
            primitive_root: parse_hex(DEFAULT_PRIMITIVE_ROOT).unwrap_or_default(),
            generator: BigUint::from(5u8),
            modulus: None,
            public_value: None,
            shared_secret: None,
        }
    }
}

fn parse_hex(value: &str) -> Option<BigUint> {
    if value.is_empty() {
        return None;
    }
    BigUint::parse_bytes(value.as_bytes(), 16)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::prime::generate_probable_prime;

    #[test]
    fn test_default_parameters() {
        let dh = KeyExchange::default();
        assert_eq!(dh.primitive_root().bits(), 512);
        assert_eq!(dh.generator(), &BigUint::from(5u8));
        let parsed = KeyExchange::from_hex(DEFAULT_PRIMITIVE_ROOT, DEFAULT_GENERATOR).unwrap();
        assert_eq!(parsed.primitive_root(), dh.primitive_root());
    }

    #[test]
    fn test_bad_parameters_name_the_field() {
        let cases = [
            ("not-hex", "05", "primitive_root"),
            ("01", "05", "primitive_root"),
            ("ff", "0", "generator"),
        ];
        for (root, generator, field) in cases {
            match KeyExchange::from_hex(root, generator) {
                Err(CoreError::Common(inner)) => assert_eq!(inner.field(), field),
                other => panic!("{root}/{generator}: {other:?}"),
            }
        }
        assert!(!KeyExchange::from_hex("zz", "05").unwrap_err().is_protocol_violation());
    }

    #[test]
    fn test_shared_secret_matches_direct_modpow() {
        let m_a = generate_probable_prime(64);
        let m_b = generate_probable_prime(64);

        let mut side_a = KeyExchange::default();
        let mut side_b = KeyExchange::default();
        side_a.compute_public_key_with(m_a.clone());
        let b_public = side_b.compute_public_key_with(m_b).clone();

        let secret = side_a
            .compute_shared_secret(&b_public.to_str_radix(16))
            .unwrap()
            .clone();

        let p = side_a.primitive_root().clone();
        assert_eq!(secret, b_public.modpow(&m_a, &p));
    }

    #[test]
    fn test_modulus_is_memoized() {
        let mut dh = KeyExchange::default();
        let first = dh.compute_public_key_with(BigUint::from(7u8)).clone();
        let second = dh.compute_public_key_with(BigUint::from(11u8)).clone();
        assert_eq!(first, second);
        assert_eq!(first, BigUint::from(5u8).modpow(&BigUint::from(7u8), dh.primitive_root()));
    }

    #[test]
    fn test_non_hex_peer_key_is_rejected() {
        let mut dh = KeyExchange::default();
        dh.compute_public_key_with(BigUint::from(7u8));
        let err = dh.compute_shared_secret("zz-not-hex").unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(dh.compute_shared_secret("").is_err());
        assert!(dh.shared_secret().is_none());
    }

    #[test]
    fn test_secret_is_computed_once() {
        let mut dh = KeyExchange::default();
        dh.compute_public_key_with(BigUint::from(7u8));
        dh.compute_shared_secret("1f").unwrap();
        assert!(dh.compute_shared_secret("1f").is_err());
        assert!(dh.derive_session_key().is_ok());
    }

    #[test]
    fn test_secret_requires_public_key() {
        let mut dh = KeyExchange::default();
        assert!(dh.compute_shared_secret("1f").is_err());
        assert!(dh.derive_session_key().is_err());
    }

    #[tokio::test]
    async fn test_public_key_draws_from_source() {
        let primes = PrimeSource::spawn(64, 2);
        let mut dh = KeyExchange::default();
        let public = dh.compute_public_key(&primes).await.unwrap().clone();
        assert_eq!(dh.public_value(), Some(&public));
        assert_eq!(dh.public_value_hex(), Some(public.to_str_radix(16)));
    }
}
