// ============================================
// File: crates/avalanche-server/src/handlers/dispatch.rs
// ============================================
//! # Packet Dispatch
//!
//! ## Creation Reason
//! Decrypted frames that arrive after the handshake are routed by opcode
//! to game handlers. Each connection gets a small `Session` context that
//! the handlers can read and update.
//!
//! ## Main Functionality
//! - `Session`: Per-connection context handed to route handlers
//! - `Dispatcher`: Session registry plus the opcode table
//! - `ROUTES`: Static registration list
//!
//! ## ⚠️ Important Note for Next Developer
//! - Route handlers run on the receive task; keep them short
//! - `register` may race `forget`; it re-checks the connection after insert
//! - Adding a message means adding a `Route` entry to `ROUTES`
//!
//! ## Last Modified
//! v0.1.0 - Initial dispatcher with MsgConnect

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use avalanche_common::ConnectionId;
use avalanche_core::protocol::{Packet, PacketRouter, Route, RouteOutcome};
use avalanche_transport::Connection;

use crate::error::Result;

// ============================================
// Opcodes
// ============================================

/// Client login to the game server.
pub const MSG_CONNECT: u16 = 1052;

/// Width of the client version string in `MsgConnect`.
pub const CLIENT_VERSION_WIDTH: usize = 16;

// ============================================
// Session
// ============================================

/// Per-connection dispatch context.
#[derive(Debug)]
pub struct Session {
    connection: Arc<Connection>,
    account: AtomicU32,
}

impl Session {
    fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            account: AtomicU32::new(0),
        }
    }

    /// The connection this session belongs to.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Account id announced by `MsgConnect`, if any.
    #[must_use]
    pub fn account(&self) -> Option<u32> {
        match self.account.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }
}

// ============================================
// Handlers
// ============================================

fn on_connect(session: &Session, packet: Packet<'_>) -> avalanche_core::Result<()> {
    let mut reader = packet.reader();
    let account = reader.read_u32()?;
    let _token = reader.read_u32()?;
    let client = reader.read_fixed_str(CLIENT_VERSION_WIDTH)?;

    session.account.store(account, Ordering::Release);
    debug!(
        connection = %session.connection.id(),
        account,
        client,
        "MsgConnect"
    );
    Ok(())
}

/// Registered game messages.
pub const ROUTES: &[Route<Session>] = &[Route {
    opcode: MSG_CONNECT,
    name: "MsgConnect",
    handler: on_connect,
}];

// ============================================
// Dispatcher
// ============================================

/// Routes post-handshake frames to handlers.
#[derive(Debug)]
pub struct Dispatcher {
    router: PacketRouter<Session>,
    sessions: DashMap<ConnectionId, Arc<Session>>,
}

impl Dispatcher {
    /// Creates a dispatcher with the built-in routes.
    ///
    /// # Errors
    /// Returns `Core` if two routes share an opcode.
    pub fn new() -> Result<Self> {
        Self::with_routes(ROUTES)
    }

    /// Creates a dispatcher with a custom route table.
    ///
    /// # Errors
    /// Returns `Core` if two routes share an opcode.
    pub fn with_routes(routes: &[Route<Session>]) -> Result<Self> {
        Ok(Self {
            router: PacketRouter::from_routes(routes)?,
            sessions: DashMap::new(),
        })
    }

    /// Creates the session for a new connection.
    ///
    /// `connected` and `disconnected` run as separate tasks, so `forget`
    /// may already have run. A closed connection is never kept.
    pub fn register(&self, connection: &Arc<Connection>) {
        if !connection.is_connected() {
            return;
        }
        self.sessions
            .insert(connection.id(), Arc::new(Session::new(Arc::clone(connection))));
        if !connection.is_connected() {
            self.sessions.remove(&connection.id());
        }
    }

    /// Drops a closed connection's session.
    pub fn forget(&self, id: ConnectionId) {
        self.sessions.remove(&id);
    }

    /// Routes one frame.
    ///
    /// # Errors
    /// Returns `Core` if the frame is malformed or a handler rejects it.
    pub fn dispatch(&self, connection: &Arc<Connection>, frame: &[u8]) -> Result<RouteOutcome> {
        let session = Arc::clone(
            self.sessions
                .entry(connection.id())
                .or_insert_with(|| Arc::new(Session::new(Arc::clone(connection))))
                .value(),
        );
        Ok(self.router.dispatch(&session, frame)?)
    }

    /// Session for `id`, if the connection is live.
    #[must_use]
    pub fn session(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|s| Arc::clone(s.value()))
    }

    /// Session logged in as `account`, if any.
    #[must_use]
    pub fn find_account(&self, account: u32) -> Option<Arc<Session>> {
        self.sessions
            .iter()
            .find(|entry| entry.value().account() == Some(account))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every live session.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ============================================
// Tests
// ============================================
