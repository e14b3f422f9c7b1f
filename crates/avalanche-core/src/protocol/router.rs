// ============================================
// File: crates/avalanche-core/src/protocol/router.rs
// ============================================
//! # Opcode Router
//!
//! ## Creation Reason
//! Decoded frames need to reach game logic by opcode. The table is an
//! explicit list built once at startup; nothing is discovered at runtime.
//!
//! ## Main Functionality
//! - `PacketRouter<C>`: `opcode -> handler fn` map over a caller context `C`
//! - `Route<C>`: One static registration entry
//! - `RouteOutcome`: Whether a handler ran
//!
//! ## ⚠️ Important Note for Next Developer
//! - Handlers are synchronous and run on the connection's receive task;
//!   anything slow must be spawned by the handler itself
//! - Unknown opcodes are logged with a hex dump and dropped, not fatal
//!
//! ## Last Modified
//! v0.1.0 - Initial router

use std::collections::HashMap;

use tracing::trace;

use super::packet::{hex_dump, Packet};
use crate::error::{CoreError, Result};

/// Handler signature: context plus the parsed packet.
pub type PacketHandler<C> = fn(&C, Packet<'_>) -> Result<()>;

/// One registration entry.
pub struct Route<C: ?Sized> {
    /// Opcode this route answers.
    pub opcode: u16,
    /// Name used in logs.
    pub name: &'static str,
    /// Function to run.
    pub handler: PacketHandler<C>,
}

impl<C: ?Sized> Clone for Route<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: ?Sized> Copy for Route<C> {}

/// Result of routing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A handler ran; carries its name.
    Handled(&'static str),
    /// No handler is registered for this opcode.
    Unknown(u16),
}

/// Static opcode table.
pub struct PacketRouter<C: ?Sized> {
    routes: HashMap<u16, Route<C>>,
}

impl<C: ?Sized> PacketRouter<C> {
    /// Builds the table from a registration list.
    ///
    /// # Errors
    /// Returns `MalformedMessage` if two routes claim the same opcode.
    pub fn from_routes(routes: &[Route<C>]) -> Result<Self> {
        let mut table = HashMap::with_capacity(routes.len());
        for route in routes {
            if let Some(existing) = table.insert(route.opcode, *route) {
                return Err(CoreError::malformed(format!(
                    "opcode {} registered twice ({} and {})",
                    route.opcode, existing.name, route.name
                )));
            }
        }
        Ok(Self { routes: table })
    }

    /// Number of registered opcodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Parses `frame` and runs the matching handler.
    ///
    /// # Errors
    /// Propagates parse errors and handler errors.
    pub fn dispatch(&self, context: &C, frame: &[u8]) -> Result<RouteOutcome> {
        let packet = Packet::parse(frame)?;
        let opcode = packet.opcode();

        match self.routes.get(&opcode) {
            Some(route) => {
                (route.handler)(context, packet)?;
                Ok(RouteOutcome::Handled(route.name))
            }
            None => {
                trace!(opcode, length = packet.length(), "Unknown opcode\n{}", hex_dump(frame));
                Ok(RouteOutcome::Unknown(opcode))
            }
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for PacketRouter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut opcodes: Vec<_> = self.routes.keys().copied().collect();
        opcodes.sort_unstable();
        f.debug_struct("PacketRouter").field("opcodes", &opcodes).finish()
    }
}

// ============================================
// Tests
// ============================================
