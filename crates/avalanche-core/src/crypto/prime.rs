// ============================================
// File: crates/avalanche-core/src/crypto/prime.rs
// ============================================
//! # Prime Source
//!
//! ## Creation Reason
//! Every key exchange needs a fresh large probable prime. Finding one
//! takes milliseconds of CPU, far too long for the accept path, so a
//! background producer fills a bounded queue ahead of demand.
//!
//! ## Main Functionality
//! - `PrimeSource`: Bounded queue of primes fed by a blocking producer task
//! - `generate_probable_prime`: Single-shot random prime search
//! - `is_probable_prime`: Miller-Rabin test with fixed small bases plus random rounds
//!
//! ## Flow
//! ```text
//! spawn_blocking producer ──► mpsc(capacity) ──► next().await (many consumers)
//!         ▲ suspends when full                    suspends when empty
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The producer runs on the blocking pool and uses `blocking_send`,
//!   so it never stalls a runtime worker
//! - Dropping the source closes the receiver; the producer exits on its next send
//!
//! ## Last Modified
//! v0.1.0 - Initial prime source

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Default bit length of produced primes.
pub const DEFAULT_PRIME_BITS: u64 = 256;

/// Default number of primes buffered ahead of demand.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Random Miller-Rabin rounds run after the fixed bases.
const RANDOM_ROUNDS: usize = 10;

/// Fixed witnesses; catches nearly all composites before the random rounds.
const SMALL_BASES: [u8; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

// ============================================
// PrimeSource
// ============================================

/// Background producer of probable primes.
///
/// # Example
/// ```no_run
/// # async fn demo() -> avalanche_core::Result<()> {
/// use avalanche_core::crypto::PrimeSource;
///
/// let source = PrimeSource::spawn(256, 100);
/// let prime = source.next().await?;
/// assert_eq!(prime.bits(), 256);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PrimeSource {
    receiver: Mutex<mpsc::Receiver<BigUint>>,
    producer: JoinHandle<()>,
    bits: u64,
}

impl PrimeSource {
    /// Starts the producer on the blocking pool.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `bits` - Exact bit length of each prime (top bit always set)
    /// * `capacity` - Queue depth; production suspends when full
    #[must_use]
    pub fn spawn(bits: u64, capacity: usize) -> Self {
        let bits = bits.max(8);
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let producer = tokio::task::spawn_blocking(move || {
            loop {
                let prime = generate_probable_prime(bits);
                trace!(bits, "Prime produced");
                if sender.blocking_send(prime).is_err() {
                    debug!("Prime source dropped, producer exiting");
                    break;
                }
            }
        });

        debug!(bits, capacity, "Prime source started");

        Self {
            receiver: Mutex::new(receiver),
            producer,
            bits,
        }
    }

    /// Pulls the next prime, suspending until one is available.
    ///
    /// There is no timeout here; callers bound the wait themselves.
    ///
    /// # Errors
    /// Returns `PrimeSourceClosed` if the producer has stopped.
    pub async fn next(&self) -> Result<BigUint> {
        self.receiver
            .lock()
            .await
            .recv()
            .await
            .ok_or(CoreError::PrimeSourceClosed)
    }

    /// Returns the configured prime bit length.
    #[must_use]
    pub const fn bits(&self) -> u64 {
        self.bits
    }
}

impl Drop for PrimeSource {
    fn drop(&mut self) {
        // Blocking tasks cannot be cancelled mid-search; this only detaches.
        // The closed channel stops the loop at its next send.
        self.producer.abort();
    }
}

// ============================================
// Prime Search
// ============================================

/// Draws random odd `bits`-bit candidates until one passes Miller-Rabin.
#[must_use]
pub fn generate_probable_prime(bits: u64) -> BigUint {
    let bits = bits.max(8);
    #[allow(clippy::cast_possible_truncation)]
    let byte_len = bits.div_ceil(8) as usize;
    let excess_bits = byte_len as u64 * 8 - bits;
    let mut raw = vec![0u8; byte_len];
    let mut rng = rand::thread_rng();

    loop {
        rng.fill_bytes(&mut raw);
        raw[0] &= 0xff_u8 >> excess_bits;
        raw[0] |= 0x80_u8 >> excess_bits;
        raw[byte_len - 1] |= 1;

        let candidate = BigUint::from_bytes_be(&raw);
        if is_probable_prime(&candidate, RANDOM_ROUNDS) {
            return candidate;
        }
    }
}

/// Miller-Rabin primality test.
///
/// Runs the fixed small bases, then `rounds` random bases.
#[must_use]
pub fn is_probable_prime(n: &BigUint, rounds: usize) -> bool {
    let two = BigUint::from(2u8);
    let three = BigUint::from(3u8);
    if n < &two {
        return false;
    }
    if n == &two || n == &three {
        return true;
    }
    if (n % &two).is_zero() {
        return false;
    }

    let n_minus_one = n - BigUint::one();
    let mut d = n_minus_one.clone();
    let mut s = 0u32;
    while (&d % &two).is_zero() {
        d >>= 1;
        s += 1;
    }

    for &base in &SMALL_BASES {
        let a = BigUint::from(base);
        if a >= n_minus_one {
            continue;
        }
        if is_witness(n, &d, s, &a) {
            return false;
        }
    }

    let n_minus_three = n - &three;
    for _ in 0..rounds {
        let Some(offset) = random_below(&n_minus_three) else {
            break;
        };
        if is_witness(n, &d, s, &(offset + &two)) {
            return false;
        }
    }

    true
}

fn is_witness(n: &BigUint, d: &BigUint, s: u32, a: &BigUint) -> bool {
    let n_minus_one = n - BigUint::one();
    let mut x = a.modpow(d, n);
    if x.is_one() || x == n_minus_one {
        return false;
    }
    for _ in 1..s {
        x = (&x * &x) % n;
        if x == n_minus_one {
            return false;
        }
    }
    true
}

/// Uniform value in `[1, modulus)`, or `None` for tiny moduli.
fn random_below(modulus: &BigUint) -> Option<BigUint> {
    #[allow(clippy::cast_possible_truncation)]
    let bits = modulus.bits() as usize;
    if bits == 0 {
        return None;
    }
    let byte_len = bits.div_ceil(8);
    let excess_bits = byte_len * 8 - bits;
    let mut raw = vec![0u8; byte_len];
    let mut rng = rand::thread_rng();

    for _ in 0..256 {
        rng.fill_bytes(&mut raw);
        raw[0] &= 0xff_u8 >> excess_bits;
        let value = BigUint::from_bytes_be(&raw);
        if !value.is_zero() && &value < modulus {
            return Some(value);
        }
    }
    None
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_primes_and_composites() {
        for p in [2u32, 3, 5, 7, 97, 7919, 104_729] {
            assert!(is_probable_prime(&BigUint::from(p), 5), "{p} is prime");
        }
        for c in [0u32, 1, 4, 9, 561, 7917, 104_730] {
            assert!(!is_probable_prime(&BigUint::from(c), 5), "{c} is composite");
        }
    }

    #[test]
    fn test_generated_prime_has_exact_bit_length() {
        let prime = generate_probable_prime(64);
        assert_eq!(prime.bits(), 64);
        assert!(is_probable_prime(&prime, 20));
    }

    #[tokio::test]
    async fn test_source_yields_distinct_primes() {
        let source = PrimeSource::spawn(64, 4);
        let a = source.next().await.unwrap();
        let b = source.next().await.unwrap();
        assert_eq!(a.bits(), 64);
        assert_eq!(b.bits(), 64);
        assert_ne!(a, b);
        assert_eq!(source.bits(), 64);
    }
}
