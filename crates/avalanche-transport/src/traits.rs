// ============================================
// File: crates/avalanche-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! The transport moves frames; it does not know what they mean. Game
//! logic plugs in through `TransportEvents`, and the cipher for each new
//! connection comes from a factory.
//!
//! ## Main Functionality
//! - `TransportEvents`: connected / handshake / received / disconnected
//! - `CipherFactory`: Builds one fresh `CipherEngine` per accepted socket
//! - `spawn_callback`: Fire-and-forget task whose panics are only logged
//!
//! ## Callback Contract
//! ```text
//! connected     spawned, not awaited       once, after admission
//! handshake     inline, receive task       once, first frame; false = disconnect
//! received      inline, receive task       per frame, in order, never concurrent
//! disconnected  spawned, not awaited       once, after teardown
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `handshake` and `received` run on the receive task. Blocking there
//!   stalls that connection's reads
//! - Implementations must be Send + Sync for use across tasks
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use avalanche_common::ConnectionId;
use avalanche_core::crypto::CipherEngine;

use crate::connection::Connection;

// ============================================
// CipherFactory
// ============================================

/// Builds the cipher for a newly accepted connection.
pub type CipherFactory = Arc<dyn Fn() -> Box<dyn CipherEngine> + Send + Sync>;

// ============================================
// TransportEvents Trait
// ============================================

/// Collaborator interface the listener and connections call into.
#[async_trait]
pub trait TransportEvents: Send + Sync + 'static {
    /// A connection passed admission and rate limiting.
    async fn connected(&self, _connection: Arc<Connection>) {}

    /// Gate for the first decrypted frame. Returning `false` disconnects.
    fn handshake(&self, connection: &Arc<Connection>, frame: &[u8]) -> bool;

    /// One complete decrypted frame, footer included.
    fn received(&self, connection: &Arc<Connection>, frame: &[u8]);

    /// The connection has been torn down.
    async fn disconnected(&self, _connection: Arc<Connection>) {}
}

// ============================================
// Callback Spawning
// ============================================

/// Runs `callback` as an independent task.
///
/// Nothing waits for it. A panic inside is caught at the task boundary
/// and logged.
pub fn spawn_callback<F>(name: &'static str, connection: ConnectionId, callback: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(callback);
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            if e.is_panic() {
                error!(%connection, callback = name, "Event callback panicked");
            }
        }
    });
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_callback_panic_is_contained() {
        spawn_callback("connected", ConnectionId::from_raw(1), async {
            panic!("callback failure");
        });

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        spawn_callback("disconnected", ConnectionId::from_raw(1), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
