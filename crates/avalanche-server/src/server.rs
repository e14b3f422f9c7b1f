// ============================================
// File: crates/avalanche-server/src/server.rs
// ============================================
//! # Server Orchestrator
//!
//! ## Creation Reason
//! Wires configuration, the prime source, the event handlers and the
//! TCP listener together and owns the server lifecycle.
//!
//! ## Main Functionality
//! - `Server::bind`: Build every component and bind the socket
//! - `Server::run`: Accept until Ctrl+C or `shutdown`
//! - `cipher_factory`: Per-connection cipher from `[cipher]`
//!
//! ## Server Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Server                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌────────────┐        ┌──────────────────────────────┐     │
//! │  │PrimeSource │◄───────│         GameEvents           │     │
//! │  │ (blocking) │        │  ExchangeHandler  Dispatcher │     │
//! │  └────────────┘        └──────────────▲───────────────┘     │
//! │                                       │ callbacks           │
//! │  ┌────────────────────────────────────┴─────────────────┐   │
//! │  │  Listener ── RateLimiter ── Connection × N           │   │
//! │  │     ▲ CipherFactory                                  │   │
//! │  └─────┴────────────────────────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Stopping the listener disconnects every live connection
//! - Graceful shutdown waits up to 5 seconds for the accept loop
//!
//! ## Last Modified
//! v0.1.0 - Initial server implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use avalanche_core::crypto::cipher::{BaseKeyTable, BlockFeedbackStreamCipher, SubstitutionStreamCipher};
use avalanche_core::crypto::{CipherEngine, PrimeSource};
use avalanche_transport::{CipherFactory, Listener, TransportError, TransportEvents};

use crate::config::{CipherConfig, CipherKind, ServerConfig};
use crate::error::{Result, ServerError};
use crate::handlers::{Dispatcher, ExchangeHandler, GameEvents};

/// How long `run` waits for the accept loop after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================
// Server
// ============================================

/// Game server front door.
///
/// # Lifecycle
/// 1. Create with `Server::bind(config).await`
/// 2. Start with `server.run().await`
/// 3. Shutdown via Ctrl+C or `server.shutdown()`
pub struct Server {
    /// Server configuration.
    config: ServerConfig,
    /// Bound TCP listener.
    listener: Arc<Listener>,
    /// Transport callbacks.
    events: Arc<GameEvents>,
    /// Prime producer shared by all exchanges.
    primes: Arc<PrimeSource>,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Builds all components and binds the listening socket.
    ///
    /// # Errors
    /// - `ConfigInvalid` if the configuration does not validate
    /// - `StartupFailed` if the socket cannot be bound
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let primes = Arc::new(PrimeSource::spawn(
            config.key_exchange.prime_bits,
            config.key_exchange.prime_queue_capacity,
        ));
        let exchange = ExchangeHandler::new(&config.key_exchange, config.cipher.kind, Arc::clone(&primes))?;
        let events = Arc::new(GameEvents::new(exchange, Dispatcher::new()?));

        let listener = Listener::bind(
            config.to_listener_config(),
            Arc::clone(&events) as Arc<dyn TransportEvents>,
            cipher_factory(&config.cipher)?,
        )
        .await
        .map_err(|e| ServerError::startup_failed(format!("TCP bind failed: {e}")))?;

        info!(
            cipher = ?config.cipher.kind,
            prime_bits = primes.bits(),
            "Server bound to {}",
            listener.local_addr()
        );

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            listener,
            events,
            primes,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        })
    }

    /// Runs the server until shutdown.
    ///
    /// # Errors
    /// Returns error if the accept loop cannot start.
    pub async fn run(&self) -> Result<()> {
        info!("Starting Avalanche server v{}", env!("CARGO_PKG_VERSION"));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let listener = Arc::clone(&self.listener);
        let accept = tokio::spawn(async move { listener.run().await });

        if !self.shutdown.load(Ordering::SeqCst) {
            tokio::select! {
                _ = shutdown_rx.recv() => debug!("Shutdown requested"),
                () = wait_for_ctrl_c() => info!("Received shutdown signal"),
            }
        }

        info!("Shutting down server...");
        self.shutdown.store(true, Ordering::SeqCst);
        self.listener.stop();

        match tokio::time::timeout(SHUTDOWN_GRACE, accept).await {
            Ok(Ok(Ok(()))) => debug!("Accept loop completed"),
            Ok(Ok(Err(TransportError::ShuttingDown))) => debug!("Accept loop never started"),
            Ok(Ok(Err(e))) => {
                warn!("Accept loop failed: {}", e);
                return Err(e.into());
            }
            Ok(Err(e)) => warn!("Accept task failed: {}", e),
            Err(_) => warn!("Accept loop timed out during shutdown"),
        }

        info!(
            exchanges = self.events.exchange().completed(),
            "Server shutdown complete"
        );
        Ok(())
    }

    /// Triggers server shutdown programmatically.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Handlers, for inspection.
    #[must_use]
    pub fn events(&self) -> &Arc<GameEvents> {
        &self.events
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.listener.local_addr())
            .field("cipher", &self.config.cipher.kind)
            .field("prime_bits", &self.primes.bits())
            .finish_non_exhaustive()
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================
// Cipher Factory
// ============================================

/// Builds the per-connection cipher factory for `[cipher]`.
///
/// # Errors
/// Returns `Core` if the initial key is unusable.
pub fn cipher_factory(config: &CipherConfig) -> Result<CipherFactory> {
    match config.kind {
        CipherKind::BlockFeedback => {
            let prototype = BlockFeedbackStreamCipher::new(config.initial_key.as_bytes())?;
            Ok(Arc::new(move || Box::new(prototype.clone()) as Box<dyn CipherEngine>))
        }
        CipherKind::Substitution => {
            let table = BaseKeyTable::shared();
            Ok(Arc::new(move || {
                Box::new(SubstitutionStreamCipher::new(Arc::clone(&table))) as Box<dyn CipherEngine>
            }))
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::exchange::{build_response, parse_request};
    use crate::handlers::{rekey, MSG_CONNECT};
    use avalanche_core::crypto::derive_session_key;
    use avalanche_core::protocol::PacketWriter;
    use num_bigint::BigUint;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    const CLIENT_FOOTER: &[u8] = b"TQClient";
    const SERVER_FOOTER_LEN: usize = 8;

    fn test_config(kind: CipherKind) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.network.bind_address = "127.0.0.1".into();
        config.network.port = 0;
        config.key_exchange.prime_bits = 64;
        config.key_exchange.prime_queue_capacity = 4;
        config.cipher.kind = kind;
        config
    }

    async fn start(kind: CipherKind) -> (Arc<Server>, TcpStream) {
        let server = Arc::new(Server::bind(test_config(kind)).await.unwrap());
        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });

        let addr = SocketAddr::from(([127, 0, 0, 1], server.local_addr().port()));
        let stream = TcpStream::connect(addr).await.unwrap();
        (server, stream)
    }

    /// Reads one server frame, length prefix and footer included.
    async fn read_frame(stream: &mut TcpStream, cipher: &mut dyn CipherEngine) -> Vec<u8> {
        let mut frame = vec![0u8; 2];
        stream.read_exact(&mut frame).await.unwrap();
        cipher.decrypt(&mut frame);
        let total = usize::from(u16::from_le_bytes([frame[0], frame[1]])) + SERVER_FOOTER_LEN;
        frame.resize(total, 0);
        stream.read_exact(&mut frame[2..]).await.unwrap();
        cipher.decrypt(&mut frame[2..]);
        frame
    }

    /// Plays the client half of the exchange; returns the session material.
    async fn exchange(
        server: &Server,
        stream: &mut TcpStream,
        cipher: &mut dyn CipherEngine,
    ) -> avalanche_core::crypto::SessionKeyMaterial {
        let request = read_frame(stream, cipher).await;
        assert_eq!(&request[request.len() - SERVER_FOOTER_LEN..], b"TQServer");
        let parsed = parse_request(&request).unwrap();

        let p = BigUint::parse_bytes(parsed.primitive_root.as_bytes(), 16).unwrap();
        let g = BigUint::parse_bytes(parsed.generator.as_bytes(), 16).unwrap();
        let server_public = BigUint::parse_bytes(parsed.public_key.as_bytes(), 16).unwrap();
        let private = BigUint::from(0x1234_5678_9ABC_DEF1_u64);

        let public = g.modpow(&private, &p);
        let secret = server_public.modpow(&private, &p);

        let mut response = build_response(&public.to_str_radix(16)).unwrap();
        cipher.encrypt(&mut response);
        stream.write_all(&response).await.unwrap();

        for _ in 0..200 {
            if server.events().exchange().completed() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.events().exchange().completed(), 1);
        assert_eq!(server.events().exchange().pending(), 0);
        derive_session_key(&secret).unwrap()
    }

    async fn send_connect(stream: &mut TcpStream, cipher: &mut dyn CipherEngine, account: u32) {
        let mut writer = PacketWriter::new(MSG_CONNECT);
        writer
            .put_u32(account)
            .put_u32(0x0BAD_F00D)
            .put_fixed_str("TQClient", 16);
        let mut frame = writer.finish().unwrap().to_vec();
        frame.extend_from_slice(CLIENT_FOOTER);
        cipher.encrypt(&mut frame);
        stream.write_all(&frame).await.unwrap();
    }

    async fn wait_for_account(server: &Server, account: u32) {
        for _ in 0..200 {
            if server.events().dispatcher().find_account(account).is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("account {account} never logged in");
    }

    #[tokio::test]
    async fn test_block_feedback_exchange_then_connect() {
        let (server, mut stream) = start(CipherKind::BlockFeedback).await;
        let mut cipher = BlockFeedbackStreamCipher::with_initial_key().unwrap();

        let material = exchange(&server, &mut stream, &mut cipher).await;
        rekey(CipherKind::BlockFeedback, &mut cipher, &material).unwrap();

        send_connect(&mut stream, &mut cipher, 1_000_001).await;
        wait_for_account(&server, 1_000_001).await;

        server.shutdown();
    }

    #[tokio::test]
    async fn test_substitution_exchange_then_connect() {
        let (server, mut stream) = start(CipherKind::Substitution).await;
        let mut cipher = SubstitutionStreamCipher::client(BaseKeyTable::shared());

        let material = exchange(&server, &mut stream, &mut cipher).await;
        rekey(CipherKind::Substitution, &mut cipher, &material).unwrap();

        send_connect(&mut stream, &mut cipher, 42).await;
        wait_for_account(&server, 42).await;

        server.shutdown();
    }

    #[tokio::test]
    async fn test_garbage_response_disconnects() {
        let (server, mut stream) = start(CipherKind::BlockFeedback).await;
        let mut cipher = BlockFeedbackStreamCipher::with_initial_key().unwrap();
        let _request = read_frame(&mut stream, &mut cipher).await;

        let mut garbage = vec![0u8; 7];
        garbage.extend_from_slice(&9u32.to_le_bytes());
        garbage.extend_from_slice(&[0xFF; 5]);
        cipher.encrypt(&mut garbage);
        stream.write_all(&garbage).await.unwrap();

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(server.events().exchange().completed(), 0);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_late_register_after_disconnect_keeps_no_session() {
        let (server, stream) = start(CipherKind::Substitution).await;
        let dispatcher = server.events().dispatcher();

        let mut registered = None;
        for _ in 0..200 {
            registered = dispatcher.sessions().into_iter().next();
            if registered.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let connection = Arc::clone(registered.expect("session never registered").connection());

        drop(stream);
        for _ in 0..200 {
            if dispatcher.is_empty() && !connection.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!connection.is_connected());
        assert!(dispatcher.is_empty());

        // A `connected` callback that lost the race to `disconnected`.
        dispatcher.register(&connection);
        assert!(dispatcher.is_empty());
        assert!(dispatcher.session(connection.id()).is_none());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_before_run_returns() {
        let server = Server::bind(test_config(CipherKind::Substitution)).await.unwrap();
        server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), server.run())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_cipher_factory_builds_fresh_instances() {
        let factory = cipher_factory(&CipherConfig::default()).unwrap();
        let mut a = factory();
        let mut b = factory();
        let mut x = *b"independent";
        let mut y = x;
        a.encrypt(&mut x);
        b.encrypt(&mut y);
        assert_eq!(x, y);
        assert_eq!(a.name(), b.name());
    }
}
