// ============================================
// File: crates/avalanche-server/src/handlers/mod.rs
// ============================================
//! # Connection Event Handlers
//!
//! ## Creation Reason
//! Connects the transport's event callbacks to the key exchange and
//! packet dispatch.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`exchange`]: Diffie-Hellman handshake and cipher re-keying
//! - [`dispatch`]: Opcode routing for post-handshake frames
//!
//! ## Event Flow
//! ```text
//!   connected ──► Dispatcher::register ──► ExchangeHandler::begin
//!                                              │ request sent
//!   handshake ──► ExchangeHandler::complete ◄──┘ first frame
//!                      │ re-keyed
//!   received  ──► Dispatcher::dispatch ──► Route handler
//!
//!   disconnected ──► forget (both)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `handshake` and `received` run on the receive task; anything that
//!   awaits (like `disconnect`) is spawned
//! - Client-caused failures log at debug, server faults at warn
//!
//! ## Last Modified
//! v0.1.0 - Initial handlers structure

pub mod dispatch;
pub mod exchange;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use avalanche_core::protocol::RouteOutcome;
use avalanche_transport::{Connection, TransportEvents};

pub use dispatch::{Dispatcher, Session, MSG_CONNECT};
pub use exchange::{rekey, ExchangeHandler};

use crate::error::ServerError;

// ============================================
// GameEvents
// ============================================

/// Transport callbacks for the game server.
#[derive(Debug)]
pub struct GameEvents {
    exchange: ExchangeHandler,
    dispatcher: Dispatcher,
}

impl GameEvents {
    /// Combines the exchange handler and dispatcher.
    #[must_use]
    pub fn new(exchange: ExchangeHandler, dispatcher: Dispatcher) -> Self {
        Self {
            exchange,
            dispatcher,
        }
    }

    /// Key exchange state.
    #[must_use]
    pub fn exchange(&self) -> &ExchangeHandler {
        &self.exchange
    }

    /// Packet dispatcher and session registry.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

fn log_failure(connection: &Connection, stage: &str, err: &ServerError) {
    if err.is_client_fault() {
        debug!(connection = %connection.id(), peer = %connection.peer_addr(), stage, error = %err, "Client rejected");
    } else {
        warn!(connection = %connection.id(), peer = %connection.peer_addr(), stage, error = %err, "Connection failed");
    }
}

fn spawn_disconnect(connection: &Arc<Connection>) {
    let connection = Arc::clone(connection);
    tokio::spawn(async move {
        connection.disconnect().await;
    });
}

#[async_trait]
impl TransportEvents for GameEvents {
    async fn connected(&self, connection: Arc<Connection>) {
        self.dispatcher.register(&connection);
        if let Err(e) = self.exchange.begin(&connection).await {
            log_failure(&connection, "exchange request", &e);
            connection.disconnect().await;
        }
    }

    fn handshake(&self, connection: &Arc<Connection>, frame: &[u8]) -> bool {
        match self.exchange.complete(connection, frame) {
            Ok(()) => true,
            Err(e) => {
                log_failure(connection, "exchange response", &e);
                false
            }
        }
    }

    fn received(&self, connection: &Arc<Connection>, frame: &[u8]) {
        match self.dispatcher.dispatch(connection, frame) {
            Ok(RouteOutcome::Handled(name)) => {
                trace!(connection = %connection.id(), message = name, "Handled");
            }
            Ok(RouteOutcome::Unknown(opcode)) => {
                debug!(connection = %connection.id(), opcode, "Unhandled opcode");
            }
            Err(e) => {
                log_failure(connection, "dispatch", &e);
                spawn_disconnect(connection);
            }
        }
    }

    async fn disconnected(&self, connection: Arc<Connection>) {
        self.exchange.forget(connection.id());
        self.dispatcher.forget(connection.id());
    }
}
