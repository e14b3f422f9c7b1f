// ============================================
// File: crates/avalanche-transport/src/listener.rs
// ============================================
//! # TCP Listener
//!
//! ## Creation Reason
//! The front door: binds the game port, bounds concurrent connections,
//! filters abusive addresses and starts a connection actor per socket.
//!
//! ## Main Functionality
//! - `ListenerConfig`: Socket options, limits and framing parameters
//! - `Listener`: Bind, accept loop, stop
//!
//! ## Accept Loop
//! ```text
//! ┌──► acquire admission slot (bounded wait, races shutdown)
//! │        │ timeout ─► retry
//! │        ▼
//! │    accept() ─► RateLimiter.authenticate(ip)
//! │        │ rejected ─► drop socket + slot, no callbacks
//! │        ▼
//! │    Connection + ReceiveLoop task ─► spawn connected callback
//! └────────┘
//! ```
//!
//! ## Design Choices
//! - socket2 for options Tokio does not expose (linger, don't-fragment)
//! - SO_REUSEADDR for quick rebinding after restart
//! - The shutdown broadcast reaches every live connection, so `stop`
//!   also closes accepted sockets
//!
//! ## ⚠️ Important Note for Next Developer
//! - "localhost", "127.0.0.1" and "0.0.0.0" all bind the wildcard
//!   address; this matches how game deployments have been configured
//! - Don't-fragment is only applied on Linux
//!
//! ## Last Modified
//! v0.1.0 - Initial TCP listener

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tracing::{debug, error, info, trace, warn};

use avalanche_common::validate;
use avalanche_core::protocol::HANDSHAKE_HEADER_SIZE;

use crate::buffer::BufferPool;
use crate::connection::{Connection, ReceiveLoop};
use crate::error::{is_benign_io, Result, TransportError};
use crate::limiter::{RateLimitConfig, RateLimiter};
use crate::traits::{spawn_callback, CipherFactory, TransportEvents};

// ============================================
// ListenerConfig
// ============================================

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Host name or IP to bind.
    pub bind_address: String,
    /// TCP port.
    pub port: u16,
    /// Listen backlog.
    pub backlog: u32,
    /// Disable Nagle's algorithm on accepted sockets.
    pub no_delay: bool,
    /// Set the IPv4 don't-fragment flag.
    pub dont_fragment: bool,
    /// Admission limit.
    pub max_connections: usize,
    /// Receive buffer capacity per connection.
    pub receive_buffer_size: usize,
    /// Per-read timeout.
    pub receive_timeout: Duration,
    /// How long one admission attempt waits before re-checking shutdown.
    pub admission_wait: Duration,
    /// Footer appended to every outbound frame.
    pub server_footer: Bytes,
    /// Footer length expected after every inbound frame.
    pub client_footer_len: usize,
    /// Rate limiter settings.
    pub rate_limit: RateLimitConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 5816,
            backlog: 100,
            no_delay: true,
            dont_fragment: false,
            max_connections: 1000,
            receive_buffer_size: 4096,
            receive_timeout: Duration::from_secs(30),
            admission_wait: Duration::from_secs(5),
            server_footer: Bytes::from_static(b"TQServer"),
            client_footer_len: 8,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ListenerConfig {
    /// Checks the limits the listener relies on.
    ///
    /// # Errors
    /// Returns `Common` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        validate::non_zero("max_connections", self.max_connections)?;
        validate::at_most("max_connections", self.max_connections, Semaphore::MAX_PERMITS)?;
        validate::at_least("receive_buffer_size", self.receive_buffer_size, HANDSHAKE_HEADER_SIZE)?;
        validate::non_zero("receive_timeout", self.receive_timeout)?;
        validate::non_zero("admission_wait", self.admission_wait)?;
        validate::non_zero("rate_limit.window", self.rate_limit.window)?;
        Ok(())
    }
}

// ============================================
// Listener
// ============================================

/// Accepting TCP listener.
///
/// # Example
/// ```ignore
/// let listener = Listener::bind(config, events, cipher_factory).await?;
/// let runner = Arc::clone(&listener);
/// tokio::spawn(async move { runner.run().await });
/// // ...
/// listener.stop();
/// ```
pub struct Listener {
    config: ListenerConfig,
    local_addr: SocketAddr,
    socket: Mutex<Option<TcpListener>>,
    admission: Arc<Semaphore>,
    limiter: Arc<RateLimiter>,
    pool: BufferPool,
    events: Arc<dyn TransportEvents>,
    cipher_factory: CipherFactory,
    shutdown: broadcast::Sender<()>,
    stopped: AtomicBool,
}

impl Listener {
    /// Resolves, configures and binds the listening socket.
    ///
    /// # Errors
    /// - `Common` if the config fails validation
    /// - `InvalidAddress` if the host does not resolve
    /// - `AddressInUse` / `BindFailed` / `Io` on socket setup failures
    pub async fn bind(
        config: ListenerConfig,
        events: Arc<dyn TransportEvents>,
        cipher_factory: CipherFactory,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let addr = resolve(&config.bind_address, config.port).await?;
        info!("Binding TCP listener to {}", addr);

        let socket = configure_socket(addr, &config)?;
        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| TransportError::io("converting to Tokio listener", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::io("getting local address", e))?;

        let (shutdown, _) = broadcast::channel(1);
        let limiter = RateLimiter::spawn(config.rate_limit, shutdown.subscribe());

        info!(
            max_connections = config.max_connections,
            "TCP listener bound to {}", local_addr
        );

        Ok(Arc::new(Self {
            admission: Arc::new(Semaphore::new(config.max_connections)),
            pool: BufferPool::new(config.receive_buffer_size, config.max_connections),
            config,
            local_addr,
            socket: Mutex::new(Some(listener)),
            limiter,
            events,
            cipher_factory,
            shutdown,
            stopped: AtomicBool::new(false),
        }))
    }

    /// Runs the accept loop until [`stop`](Self::stop) is called.
    ///
    /// The listening socket is closed when this returns.
    ///
    /// # Errors
    /// Returns `ShuttingDown` if the listener was already stopped or is
    /// already running.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        if self.is_stopped() {
            return Err(TransportError::ShuttingDown);
        }
        let Some(socket) = self.socket.lock().take() else {
            return Err(TransportError::ShuttingDown);
        };

        debug!(addr = %self.local_addr, "Accept loop started");

        loop {
            let permit = tokio::select! {
                _ = shutdown.recv() => break,
                acquired = time::timeout(
                    self.config.admission_wait,
                    Arc::clone(&self.admission).acquire_owned(),
                ) => match acquired {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => break,
                    Err(_) => {
                        trace!("Admission limit reached, waiting");
                        continue;
                    }
                },
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = socket.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) if is_benign_io(&e) => {
                        debug!(error = %e, "Accept aborted by peer");
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        continue;
                    }
                },
            };

            if !self.limiter.authenticate(peer.ip()) {
                debug!(%peer, "Connection rejected by rate limiter");
                drop(stream);
                drop(permit);
                continue;
            }

            if let Err(e) = self.spawn_connection(stream, peer, permit) {
                warn!(%peer, error = %e, "Failed to start connection");
            }
        }

        drop(socket);
        info!(addr = %self.local_addr, "TCP listener stopped");
        Ok(())
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: OwnedSemaphorePermit,
    ) -> Result<()> {
        stream
            .set_nodelay(self.config.no_delay)
            .map_err(|e| TransportError::io("setting TCP_NODELAY", e))?;
        let (reader, writer) = stream.into_split();

        let connection = Connection::new(
            peer,
            writer,
            (self.cipher_factory)(),
            Some(permit),
            self.config.server_footer.clone(),
            Arc::clone(&self.events),
        );
        debug!(connection = %connection.id(), %peer, "Connection accepted");

        let receive = ReceiveLoop::new(
            Arc::clone(&connection),
            reader,
            self.pool.acquire(),
            self.config.client_footer_len,
            self.config.receive_timeout,
            self.shutdown.subscribe(),
        );
        tokio::spawn(receive.run());

        let events = Arc::clone(&self.events);
        let id = connection.id();
        spawn_callback("connected", id, async move {
            events.connected(connection).await;
        });
        Ok(())
    }

    /// Stops accepting and signals every live connection. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(addr = %self.local_addr, "Stopping TCP listener");
        let _ = self.shutdown.send(());
        // Never ran: close the socket here.
        drop(self.socket.lock().take());
    }

    /// Returns `true` once `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Bound address (with the real port if 0 was requested).
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections currently holding an admission slot.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.config.max_connections - self.admission.available_permits()
    }

    /// The limiter guarding this listener.
    #[must_use]
    pub const fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("live_connections", &self.live_connections())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

// ============================================
// Socket Setup
// ============================================

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    match host {
        "" | "localhost" | "127.0.0.1" | "0.0.0.0" => {
            Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        }
        other => {
            if let Ok(ip) = other.parse::<IpAddr>() {
                return Ok(SocketAddr::new(ip, port));
            }
            lookup_host((other, port))
                .await
                .map_err(|e| TransportError::io(format!("resolving {other}"), e))?
                .next()
                .ok_or_else(|| TransportError::InvalidAddress {
                    addr: other.to_string(),
                })
        }
    }
}

fn configure_socket(addr: SocketAddr, config: &ListenerConfig) -> Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| TransportError::io("creating TCP socket", e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| TransportError::io("setting SO_REUSEADDR", e))?;
    socket
        .set_linger(None)
        .map_err(|e| TransportError::io("setting SO_LINGER", e))?;
    socket
        .set_nodelay(config.no_delay)
        .map_err(|e| TransportError::io("setting TCP_NODELAY", e))?;
    if addr.is_ipv4() {
        set_dont_fragment(&socket, config.dont_fragment)
            .map_err(|e| TransportError::io("setting don't-fragment", e))?;
    }
    socket
        .set_nonblocking(true)
        .map_err(|e| TransportError::io("setting non-blocking", e))?;

    socket.bind(&addr.into()).map_err(|e| {
        if e.kind() == io::ErrorKind::AddrInUse {
            TransportError::AddressInUse { addr }
        } else {
            TransportError::bind_failed(addr, e.to_string())
        }
    })?;

    let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
    socket
        .listen(backlog)
        .map_err(|e| TransportError::io("listening", e))?;

    Ok(socket)
}

#[cfg(target_os = "linux")]
fn set_dont_fragment(socket: &Socket, enabled: bool) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let value: libc::c_int = if enabled {
        libc::IP_PMTUDISC_DO
    } else {
        libc::IP_PMTUDISC_DONT
    };
    #[allow(clippy::cast_possible_truncation)]
    let len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;

    // SAFETY: the fd is owned by `socket` for the duration of the call and
    // `value` outlives it.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_MTU_DISCOVER,
            std::ptr::addr_of!(value).cast::<libc::c_void>(),
            len,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
fn set_dont_fragment(_socket: &Socket, enabled: bool) -> io::Result<()> {
    if enabled {
        debug!("Don't-fragment not supported on this platform, ignoring");
    }
    Ok(())
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use avalanche_core::crypto::{BaseKeyTable, CipherEngine, SubstitutionStreamCipher};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    const CLIENT_FOOTER: &[u8] = b"TQClient";

    struct Recorder {
        accept_handshake: bool,
        connected: AtomicUsize,
        disconnected: AtomicUsize,
        handshakes: mpsc::UnboundedSender<Vec<u8>>,
        frames: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait]
    impl TransportEvents for Recorder {
        async fn connected(&self, _: Arc<Connection>) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        fn handshake(&self, _: &Arc<Connection>, frame: &[u8]) -> bool {
            let _ = self.handshakes.send(frame.to_vec());
            self.accept_handshake
        }

        fn received(&self, _: &Arc<Connection>, frame: &[u8]) {
            let _ = self.frames.send(frame.to_vec());
        }

        async fn disconnected(&self, _: Arc<Connection>) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        listener: Arc<Listener>,
        events: Arc<Recorder>,
        handshakes: mpsc::UnboundedReceiver<Vec<u8>>,
        frames: mpsc::UnboundedReceiver<Vec<u8>>,
        table: Arc<BaseKeyTable>,
    }

    impl Harness {
        async fn start(config: ListenerConfig, accept_handshake: bool) -> Self {
            let (hs_tx, handshakes) = mpsc::unbounded_channel();
            let (frame_tx, frames) = mpsc::unbounded_channel();
            let events = Arc::new(Recorder {
                accept_handshake,
                connected: AtomicUsize::new(0),
                disconnected: AtomicUsize::new(0),
                handshakes: hs_tx,
                frames: frame_tx,
            });
            let table = BaseKeyTable::shared();
            let factory_table = Arc::clone(&table);
            let factory: CipherFactory = Arc::new(move || {
                Box::new(SubstitutionStreamCipher::new(Arc::clone(&factory_table)))
                    as Box<dyn CipherEngine>
            });

            let listener = Listener::bind(config, Arc::clone(&events) as Arc<dyn TransportEvents>, factory)
                .await
                .unwrap();
            let runner = Arc::clone(&listener);
            tokio::spawn(async move { runner.run().await });

            Self {
                listener,
                events,
                handshakes,
                frames,
                table,
            }
        }

        async fn connect(&self) -> TcpStream {
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.listener.local_addr().port()));
            TcpStream::connect(addr).await.unwrap()
        }

        fn client_cipher(&self) -> SubstitutionStreamCipher {
            SubstitutionStreamCipher::client(Arc::clone(&self.table))
        }
    }

    fn test_config() -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            receive_timeout: Duration::from_secs(5),
            admission_wait: Duration::from_millis(50),
            ..ListenerConfig::default()
        }
    }

    fn handshake_frame() -> Vec<u8> {
        let mut frame = vec![0x5Au8; 20];
        frame[7..9].copy_from_slice(&13u16.to_le_bytes());
        frame
    }

    fn client_frame(opcode: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&u16::try_from(payload.len() + 4).unwrap().to_le_bytes());
        frame.extend_from_slice(&opcode.to_le_bytes());
        frame.extend_from_slice(payload);
        frame.extend_from_slice(CLIENT_FOOTER);
        frame
    }

    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == expected {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), expected);
    }

    #[tokio::test]
    async fn test_handshake_then_two_frames_in_one_write() {
        let mut harness = Harness::start(test_config(), true).await;
        let mut client = harness.connect().await;
        let mut cipher = harness.client_cipher();

        let mut handshake = handshake_frame();
        cipher.encrypt(&mut handshake);
        client.write_all(&handshake).await.unwrap();

        let received = harness.handshakes.recv().await.unwrap();
        assert_eq!(received, handshake_frame());

        let first = client_frame(1001, &[0x11; 10]);
        let second = client_frame(1002, &[0x22; 15]);
        let mut wire = [first.clone(), second.clone()].concat();
        cipher.encrypt(&mut wire);
        client.write_all(&wire).await.unwrap();

        assert_eq!(harness.frames.recv().await.unwrap(), first);
        assert_eq!(harness.frames.recv().await.unwrap(), second);
        assert!(harness.frames.try_recv().is_err());
        assert_eq!(harness.events.connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_frames_split_across_reads_are_reassembled() {
        let mut harness = Harness::start(test_config(), true).await;
        let mut client = harness.connect().await;
        let mut cipher = harness.client_cipher();

        let frame = client_frame(1010, &[0x33; 40]);
        let mut wire = [handshake_frame(), frame.clone()].concat();
        cipher.encrypt(&mut wire);

        client.write_all(&wire[..23]).await.unwrap();
        harness.handshakes.recv().await.unwrap();
        time::sleep(Duration::from_millis(20)).await;
        client.write_all(&wire[23..]).await.unwrap();

        assert_eq!(harness.frames.recv().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn test_short_handshake_disconnects() {
        let harness = Harness::start(test_config(), true).await;
        let mut client = harness.connect().await;
        client.write_all(&[1, 2, 3, 4, 5]).await.unwrap();

        let mut buf = [0u8; 1];
        let read = time::timeout(Duration::from_secs(2), client.read(&mut buf)).await.unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        wait_for(&harness.events.disconnected, 1).await;
        assert_eq!(harness.listener.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_rejected_handshake_disconnects() {
        let harness = Harness::start(test_config(), false).await;
        let mut client = harness.connect().await;
        let mut handshake = handshake_frame();
        harness.client_cipher().encrypt(&mut handshake);
        client.write_all(&handshake).await.unwrap();

        wait_for(&harness.events.disconnected, 1).await;
    }

    #[tokio::test]
    async fn test_zero_length_frame_disconnects() {
        let mut harness = Harness::start(test_config(), true).await;
        let mut client = harness.connect().await;
        let mut cipher = harness.client_cipher();

        let mut wire = [handshake_frame(), vec![0, 0, 1, 2]].concat();
        cipher.encrypt(&mut wire);
        client.write_all(&wire).await.unwrap();

        harness.handshakes.recv().await.unwrap();
        wait_for(&harness.events.disconnected, 1).await;
    }

    #[tokio::test]
    async fn test_admission_limit_holds_extra_connections() {
        let config = ListenerConfig {
            max_connections: 1,
            ..test_config()
        };
        let harness = Harness::start(config, true).await;

        let first = harness.connect().await;
        wait_for(&harness.events.connected, 1).await;

        let _second = harness.connect().await;
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(harness.events.connected.load(Ordering::SeqCst), 1);
        assert_eq!(harness.listener.live_connections(), 1);

        drop(first);
        wait_for(&harness.events.connected, 2).await;
        assert_eq!(harness.listener.live_connections(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_address_gets_no_callbacks() {
        let config = ListenerConfig {
            rate_limit: RateLimitConfig {
                max_attempts: 1,
                ..RateLimitConfig::default()
            },
            ..test_config()
        };
        let harness = Harness::start(config, true).await;

        let _first = harness.connect().await;
        wait_for(&harness.events.connected, 1).await;

        let mut second = harness.connect().await;
        let mut buf = [0u8; 1];
        let read = time::timeout(Duration::from_secs(2), second.read(&mut buf)).await.unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(harness.events.connected.load(Ordering::SeqCst), 1);
        assert_eq!(harness.events.disconnected.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_closes_live_connections() {
        let harness = Harness::start(test_config(), true).await;
        let _client = harness.connect().await;
        wait_for(&harness.events.connected, 1).await;

        harness.listener.stop();
        harness.listener.stop();

        wait_for(&harness.events.disconnected, 1).await;
        assert!(harness.listener.is_stopped());
        assert!(harness.listener.run().await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_wildcards() {
        for host in ["localhost", "127.0.0.1", "0.0.0.0"] {
            let addr = resolve(host, 9000).await.unwrap();
            assert_eq!(addr, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9000)));
        }
        let addr = resolve("10.1.2.3", 9000).await.unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
    }

    #[test]
    fn test_config_validation() {
        assert!(ListenerConfig::default().validate().is_ok());
        let bad = ListenerConfig {
            receive_buffer_size: 4,
            ..ListenerConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(TransportError::Common(ref e)) if e.field() == "receive_buffer_size"
        ));
        let bad = ListenerConfig {
            max_connections: 0,
            ..ListenerConfig::default()
        };
        assert!(matches!(bad.validate(), Err(TransportError::Common(_))));
        let bad = ListenerConfig {
            receive_timeout: Duration::ZERO,
            ..ListenerConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(TransportError::Common(ref e)) if e.field() == "receive_timeout"
        ));
    }
}
