// ============================================
// File: crates/avalanche-transport/src/connection.rs
// ============================================
//! # Connection Actor
//!
//! ## Creation Reason
//! Owns one accepted TCP socket together with its cipher and receive
//! buffer. It decrypts what arrives, cuts it into frames, hands the frames
//! on, and encrypts what is sent back.
//!
//! ## Main Functionality
//! - `Connection`: Shared handle (send, disconnect, cipher access, state)
//! - `ReceiveLoop`: The task that owns the read half and the buffer
//!
//! ## Receive Flow
//! ```text
//! Exchanging:
//!   read ≥ 9 bytes ─► decrypt [0..9) ─► total = u16@7 + 7
//!   total > read ? ─► disconnect
//!   decrypt rest of frame ─► handshake(frame) ? ─► Streaming
//!   leftover bytes ─► decrypt ─► split ─► carry residual
//!
//! Streaming (loop):
//!   read at residual ─► decrypt new bytes only ─► split [0..examined)
//!   ─► received(frame) per frame ─► carry residual
//! ```
//! Every read races the connection's own shutdown signal, the listener's
//! shutdown broadcast and the receive timeout.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Bytes must be decrypted exactly once and in wire order; the cipher
//!   cursors are sequential state
//! - The send path holds the writer lock across encrypt + write so two
//!   frames never interleave in the keystream
//! - A send blocked on a full socket gives up when `disconnect` fires, so
//!   teardown never waits on the peer
//! - `disconnect` is idempotent; the callback fires once
//!
//! ## Last Modified
//! v0.1.0 - Initial connection actor

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, watch, OwnedSemaphorePermit};
use tokio::time;
use tracing::{debug, error, trace};

use avalanche_common::{AtomicInstant, ConnectionId, ConnectionState};
use avalanche_core::crypto::CipherEngine;
use avalanche_core::error::CoreError;
use avalanche_core::protocol::{
    build_outbound_frame, carry_residual, handshake_frame_len, FrameSplitter,
    HANDSHAKE_HEADER_SIZE,
};

use crate::buffer::PooledBuffer;
use crate::error::{Result, TransportError};
use crate::traits::{spawn_callback, TransportEvents};

/// Upper bound on waiting for the write half during teardown.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================
// Connection
// ============================================

/// Handle to one accepted connection.
///
/// Cheap to share through `Arc`; the receive task holds one clone.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    state: AtomicU8,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    cipher: Mutex<Box<dyn CipherEngine>>,
    footer: Bytes,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
    last_activity: AtomicInstant,
    events: Arc<dyn TransportEvents>,
}

impl Connection {
    /// Wraps the write half of an accepted socket.
    ///
    /// `permit` is the admission slot; it is released on disconnect.
    pub(crate) fn new(
        peer: SocketAddr,
        writer: OwnedWriteHalf,
        cipher: Box<dyn CipherEngine>,
        permit: Option<OwnedSemaphorePermit>,
        footer: Bytes,
        events: Arc<dyn TransportEvents>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            id: ConnectionId::next(),
            peer,
            state: AtomicU8::new(ConnectionState::Exchanging as u8),
            writer: tokio::sync::Mutex::new(Some(writer)),
            cipher: Mutex::new(cipher),
            footer,
            shutdown,
            closed: AtomicBool::new(false),
            permit: Mutex::new(permit),
            last_activity: AtomicInstant::now(),
            events,
        })
    }

    // ========================================
    // Accessors
    // ========================================

    /// Process-unique id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` until `disconnect` has run.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Time since bytes were last received.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Runs `f` with exclusive access to this connection's cipher.
    ///
    /// Used by handshake handlers to re-key. Keep `f` short: the send
    /// path and the receive task wait on the same lock.
    pub fn with_cipher<R>(&self, f: impl FnOnce(&mut dyn CipherEngine) -> R) -> R {
        let mut cipher = self.cipher.lock();
        f(&mut **cipher)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn decrypt(&self, buf: &mut [u8]) {
        if !buf.is_empty() {
            self.cipher.lock().decrypt(buf);
        }
    }

    // ========================================
    // Send Path
    // ========================================

    /// Frames, encrypts and writes one packet.
    ///
    /// The first two bytes of `payload` are overwritten with its length;
    /// the footer is appended after it.
    ///
    /// # Errors
    /// - `NotConnected` after disconnect
    /// - `Protocol` if the payload cannot be framed
    /// - `Io` if the write fails (benign kinds are logged at debug only)
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        let mut frame = build_outbound_frame(payload, &self.footer)?;
        let mut shutdown = self.shutdown.subscribe();

        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        if *shutdown.borrow_and_update() {
            return Err(TransportError::NotConnected);
        }

        self.cipher.lock().encrypt(&mut frame);

        // A peer that stops reading stalls write_all; disconnect must win.
        let written = tokio::select! {
            _ = shutdown.changed() => return Err(TransportError::NotConnected),
            written = stream.write_all(&frame) => written,
        };

        if let Err(e) = written {
            let err = TransportError::io("writing frame", e);
            if err.is_benign() {
                debug!(connection = %self.id, error = %err, "Send to closing peer");
            } else {
                error!(connection = %self.id, peer = %self.peer, error = %err, "Send failed");
            }
            return Err(err);
        }

        trace!(connection = %self.id, len = frame.len(), "Frame sent");
        Ok(())
    }

    // ========================================
    // Disconnect
    // ========================================

    /// Tears the connection down. Safe to call any number of times.
    ///
    /// Signals the receive task and any pending send, releases the
    /// admission slot, spawns the `disconnected` callback and then shuts
    /// the socket down. The receive buffer returns to its pool when the
    /// receive task exits.
    pub async fn disconnect(self: &Arc<Self>) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.set_state(ConnectionState::Disconnecting);
        self.shutdown.send_replace(true);
        drop(self.permit.lock().take());
        debug!(connection = %self.id, peer = %self.peer, "Disconnected");

        let events = Arc::clone(&self.events);
        let connection = Arc::clone(self);
        spawn_callback("disconnected", self.id, async move {
            events.disconnected(connection).await;
        });

        self.close_writer().await;
    }

    async fn close_writer(&self) {
        let Ok(mut writer) = time::timeout(WRITER_CLOSE_TIMEOUT, self.writer.lock()).await else {
            debug!(connection = %self.id, "Writer still busy, leaving it to drop");
            return;
        };
        let Some(mut stream) = writer.take() else {
            return;
        };
        drop(writer);

        match time::timeout(WRITER_CLOSE_TIMEOUT, stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(connection = %self.id, error = %e, "Socket shutdown"),
            Err(_) => trace!(connection = %self.id, "Socket shutdown timed out"),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================
// ReceiveLoop
// ============================================

enum ReadOutcome {
    Bytes(usize),
    Closed,
    Shutdown,
}

/// Receive task state: the read half, the pooled buffer and the splitter.
pub(crate) struct ReceiveLoop {
    connection: Arc<Connection>,
    reader: OwnedReadHalf,
    buffer: PooledBuffer,
    splitter: FrameSplitter,
    receive_timeout: Duration,
    shutdown: watch::Receiver<bool>,
    listener_shutdown: broadcast::Receiver<()>,
}

impl ReceiveLoop {
    pub(crate) fn new(
        connection: Arc<Connection>,
        reader: OwnedReadHalf,
        buffer: PooledBuffer,
        footer_len: usize,
        receive_timeout: Duration,
        listener_shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let splitter = FrameSplitter::new(footer_len, buffer.len());
        let shutdown = connection.shutdown.subscribe();
        Self {
            connection,
            reader,
            buffer,
            splitter,
            receive_timeout,
            shutdown,
            listener_shutdown,
        }
    }

    /// Runs until the peer leaves, a violation occurs or shutdown fires.
    pub(crate) async fn run(mut self) {
        let outcome = match self.exchange().await {
            Ok(Some(residual)) => self.stream(residual).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            let connection = self.connection.id();
            let peer = self.connection.peer_addr();
            if e.is_protocol_violation() {
                debug!(%connection, %peer, error = %e, "Protocol violation");
            } else if e.is_benign() || matches!(e, TransportError::Timeout { .. }) {
                debug!(%connection, %peer, error = %e, "Connection closed");
            } else {
                error!(%connection, %peer, error = %e, "Receive failed");
            }
        }

        self.connection.disconnect().await;
    }

    /// Handles the first read. Returns the residual byte count, or
    /// `None` if the connection closed before the handshake.
    async fn exchange(&mut self) -> Result<Option<usize>> {
        let examined = match self.read_at(0).await? {
            ReadOutcome::Bytes(n) => n,
            ReadOutcome::Closed | ReadOutcome::Shutdown => return Ok(None),
        };
        if examined < HANDSHAKE_HEADER_SIZE {
            return Err(CoreError::too_short(HANDSHAKE_HEADER_SIZE, examined).into());
        }

        let connection = &self.connection;
        let buf = &mut self.buffer[..];

        connection.decrypt(&mut buf[..HANDSHAKE_HEADER_SIZE]);
        let total = handshake_frame_len(&buf[..HANDSHAKE_HEADER_SIZE])?;
        if total > examined {
            return Err(CoreError::malformed(format!(
                "handshake declares {total} bytes, {examined} arrived"
            ))
            .into());
        }
        let decrypted = total.max(HANDSHAKE_HEADER_SIZE);
        connection.decrypt(&mut buf[HANDSHAKE_HEADER_SIZE..decrypted]);

        if !connection.events.handshake(connection, &buf[..total]) {
            return Err(TransportError::HandshakeRejected);
        }
        connection.set_state(ConnectionState::Streaming);
        trace!(connection = %connection.id, total, "Handshake accepted");

        if examined == total {
            return Ok(Some(0));
        }

        connection.decrypt(&mut buf[decrypted..examined]);
        let consumed = self
            .splitter
            .split(&buf[total..examined], |frame| connection.events.received(connection, frame))?;
        Ok(Some(carry_residual(buf, total + consumed, examined)))
    }

    /// Steady-state loop.
    async fn stream(&mut self, mut residual: usize) -> Result<()> {
        loop {
            if residual >= self.buffer.len() {
                return Err(CoreError::FrameTooLarge {
                    declared: residual,
                    capacity: self.buffer.len(),
                }
                .into());
            }

            let read = match self.read_at(residual).await? {
                ReadOutcome::Bytes(n) => n,
                ReadOutcome::Closed | ReadOutcome::Shutdown => return Ok(()),
            };
            let examined = residual + read;

            let connection = &self.connection;
            let buf = &mut self.buffer[..];
            connection.decrypt(&mut buf[residual..examined]);

            let consumed = self
                .splitter
                .split(&buf[..examined], |frame| connection.events.received(connection, frame))?;
            residual = carry_residual(buf, consumed, examined);
        }
    }

    async fn read_at(&mut self, offset: usize) -> Result<ReadOutcome> {
        if *self.shutdown.borrow() {
            return Ok(ReadOutcome::Shutdown);
        }

        let buf = &mut self.buffer[offset..];
        tokio::select! {
            _ = self.shutdown.changed() => Ok(ReadOutcome::Shutdown),
            _ = self.listener_shutdown.recv() => Ok(ReadOutcome::Shutdown),
            read = time::timeout(self.receive_timeout, self.reader.read(buf)) => match read {
                Err(_) => Err(TransportError::timeout("receive")),
                Ok(Ok(0)) => Ok(ReadOutcome::Closed),
                Ok(Ok(n)) => {
                    self.connection.last_activity.touch();
                    Ok(ReadOutcome::Bytes(n))
                }
                Ok(Err(e)) => Err(TransportError::io("receiving", e)),
            },
        }
    }
}

// ============================================
// Tests
// ============================================
