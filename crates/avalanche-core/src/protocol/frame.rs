// ============================================
// File: crates/avalanche-core/src/protocol/frame.rs
// ============================================
//! # Wire Framing
//!
//! ## Creation Reason
//! TCP delivers a byte stream; the game protocol is a sequence of
//! length-prefixed frames followed by a fixed footer. This module cuts
//! the stream back into frames and builds outbound ones.
//!
//! ## Wire Format (after decryption, little-endian)
//! ```text
//! [0..2)               length L (covers offset 0 up to the footer)
//! [2..4)               opcode
//! [4..L)               payload
//! [L..L+footer_len)    fixed footer
//! ```
//!
//! The very first frame of a connection is the handshake: a 9-byte
//! header whose u16 at offset 7 plus 7 is the total frame length.
//!
//! ## Main Functionality
//! - `FrameSplitter`: Walks a decrypted region and yields complete frames
//! - `carry_residual`: Moves an unfinished frame to the buffer start
//! - `handshake_frame_len`: Reads the handshake header
//! - `build_outbound_frame`: payload + length fix-up + footer
//!
//! ## ⚠️ Important Note for Next Developer
//! - All length checks fail closed; the caller disconnects on `Err`
//! - Frames are handed out strictly in order, one at a time
//!
//! ## Last Modified
//! v0.1.0 - Initial framing helpers

use bytes::{BufMut, BytesMut};

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Size of the length prefix on every frame.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Bytes that must arrive before the handshake length can be read.
pub const HANDSHAKE_HEADER_SIZE: usize = 9;

/// Offset of the handshake length field.
pub const HANDSHAKE_LENGTH_OFFSET: usize = 7;

// ============================================
// Handshake Header
// ============================================

/// Returns the total handshake frame length declared by `header`.
///
/// # Errors
/// Returns `MessageTooShort` if fewer than 9 bytes are supplied.
pub fn handshake_frame_len(header: &[u8]) -> Result<usize> {
    if header.len() < HANDSHAKE_HEADER_SIZE {
        return Err(CoreError::too_short(HANDSHAKE_HEADER_SIZE, header.len()));
    }
    let declared = u16::from_le_bytes([
        header[HANDSHAKE_LENGTH_OFFSET],
        header[HANDSHAKE_LENGTH_OFFSET + 1],
    ]);
    Ok(usize::from(declared) + HANDSHAKE_LENGTH_OFFSET)
}

// ============================================
// Outbound Frames
// ============================================

/// Builds `payload || footer` with the payload length written at offset 0.
///
/// The first two bytes of `payload` are a placeholder for the length.
///
/// # Errors
/// - `MessageTooShort` if the payload cannot hold the length prefix
/// - `MalformedMessage` if the payload length does not fit in a u16
pub fn build_outbound_frame(payload: &[u8], footer: &[u8]) -> Result<BytesMut> {
    if payload.len() < LENGTH_PREFIX_SIZE {
        return Err(CoreError::too_short(LENGTH_PREFIX_SIZE, payload.len()));
    }
    let length = u16::try_from(payload.len())
        .map_err(|_| CoreError::malformed(format!("payload of {} bytes exceeds u16", payload.len())))?;

    let mut frame = BytesMut::with_capacity(payload.len() + footer.len());
    frame.put_slice(payload);
    frame[..LENGTH_PREFIX_SIZE].copy_from_slice(&length.to_le_bytes());
    frame.put_slice(footer);
    Ok(frame)
}

// ============================================
// FrameSplitter
// ============================================

/// Cuts a decrypted region into complete frames.
///
/// # Example
/// ```
/// use avalanche_core::protocol::FrameSplitter;
///
/// let splitter = FrameSplitter::new(2, 1024);
/// // One 5-byte frame + 2-byte footer, then 1 byte of the next header.
/// let region = [5, 0, 1, 0, 9, 0xEE, 0xEE, 3];
/// let mut frames = Vec::new();
/// let consumed = splitter.split(&region, |f| frames.push(f.to_vec())).unwrap();
/// assert_eq!(consumed, 7);
/// assert_eq!(frames, vec![region[..7].to_vec()]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameSplitter {
    footer_len: usize,
    capacity: usize,
}

impl FrameSplitter {
    /// Creates a splitter for the given footer length and buffer capacity.
    #[must_use]
    pub const fn new(footer_len: usize, capacity: usize) -> Self {
        Self {
            footer_len,
            capacity,
        }
    }

    /// Footer length this splitter expects after each frame.
    #[must_use]
    pub const fn footer_len(&self) -> usize {
        self.footer_len
    }

    /// Hands every complete frame in `region` to `on_frame`, in order.
    ///
    /// Returns how many bytes were consumed. Bytes past that offset
    /// belong to an unfinished frame.
    ///
    /// # Errors
    /// - `ZeroLengthFrame` when a length prefix is 0
    /// - `FrameTooLarge` when a frame could never fit in the buffer
    pub fn split<F>(&self, region: &[u8], mut on_frame: F) -> Result<usize>
    where
        F: FnMut(&[u8]),
    {
        let examined = region.len();
        let mut consumed = 0usize;

        while consumed + LENGTH_PREFIX_SIZE <= examined {
            let declared = usize::from(u16::from_le_bytes([region[consumed], region[consumed + 1]]));
            if declared == 0 {
                return Err(CoreError::ZeroLengthFrame { offset: consumed });
            }

            let frame_len = declared + self.footer_len;
            if declared > self.capacity || frame_len > self.capacity {
                return Err(CoreError::FrameTooLarge {
                    declared: frame_len,
                    capacity: self.capacity,
                });
            }

            if consumed + frame_len > examined {
                break;
            }

            on_frame(&region[consumed..consumed + frame_len]);
            consumed += frame_len;
        }

        Ok(consumed)
    }
}

/// Moves `buf[consumed..examined]` to the front of `buf`.
///
/// Returns the residual length, which is where the next read starts.
pub fn carry_residual(buf: &mut [u8], consumed: usize, examined: usize) -> usize {
    let residual = examined.saturating_sub(consumed);
    if residual > 0 && consumed > 0 {
        buf.copy_within(consumed..examined, 0);
    }
    residual
}

// ============================================
// Tests
// ============================================
