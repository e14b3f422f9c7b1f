// ============================================
// File: crates/avalanche-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! The generic envelope every game packet travels in. Payload semantics
//! belong to the game; this module only knows lengths, opcodes and footers.
//!
//! ## Main Functionality
//! - [`frame`]: Stream splitting, handshake header, outbound framing
//! - [`packet`]: Frame view, field reader/writer, hex dump
//! - [`router`]: Opcode to handler table
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod frame;
pub mod packet;
pub mod router;

pub use frame::{
    build_outbound_frame, carry_residual, handshake_frame_len, FrameSplitter,
    HANDSHAKE_HEADER_SIZE, HANDSHAKE_LENGTH_OFFSET, LENGTH_PREFIX_SIZE,
};
pub use packet::{hex_dump, Packet, PacketReader, PacketWriter, PACKET_HEADER_SIZE};
pub use router::{PacketHandler, PacketRouter, Route, RouteOutcome};
