// ============================================
// File: crates/avalanche-core/src/protocol/packet.rs
// ============================================
//! # Packet View & Writer
//!
//! ## Main Functionality
//! - `Packet`: Borrowed view of one decrypted frame (length, opcode, body, footer)
//! - `PacketReader`: Little-endian cursor over a packet body
//! - `PacketWriter`: Builds `length || opcode || body` with the length fixed up last
//! - `hex_dump`: 16-bytes-per-line dump with offset column and ASCII gutter
//!
//! ## Last Modified
//! v0.1.0 - Initial packet helpers

use std::fmt::Write as _;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{CoreError, Result};

/// Bytes before the body: length + opcode.
pub const PACKET_HEADER_SIZE: usize = 4;

const BYTES_PER_DUMP_LINE: usize = 16;

// ============================================
// Packet
// ============================================

/// Borrowed view of a complete frame.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    frame: &'a [u8],
    length: usize,
}

impl<'a> Packet<'a> {
    /// Wraps a frame produced by the splitter.
    ///
    /// # Errors
    /// - `MessageTooShort` if the frame cannot hold a header
    /// - `MalformedMessage` if the declared length exceeds the frame
    pub fn parse(frame: &'a [u8]) -> Result<Self> {
        if frame.len() < PACKET_HEADER_SIZE {
            return Err(CoreError::too_short(PACKET_HEADER_SIZE, frame.len()));
        }
        let length = usize::from(u16::from_le_bytes([frame[0], frame[1]]));
        if length < PACKET_HEADER_SIZE || length > frame.len() {
            return Err(CoreError::malformed(format!(
                "declared length {length} outside frame of {} bytes",
                frame.len()
            )));
        }
        Ok(Self { frame, length })
    }

    /// Declared length (header + body, no footer).
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Opcode at offset 2.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_le_bytes([self.frame[2], self.frame[3]])
    }

    /// Bytes between the header and the footer.
    #[must_use]
    pub fn body(&self) -> &'a [u8] {
        &self.frame[PACKET_HEADER_SIZE..self.length]
    }

    /// Trailing footer bytes.
    #[must_use]
    pub fn footer(&self) -> &'a [u8] {
        &self.frame[self.length..]
    }

    /// Entire frame.
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.frame
    }

    /// Reader positioned at the start of the body.
    #[must_use]
    pub fn reader(&self) -> PacketReader<'a> {
        PacketReader::new(self.body())
    }
}

// ============================================
// PacketReader
// ============================================

/// Little-endian field reader. Every read is bounds-checked.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    /// Reads from the start of `buf`.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(CoreError::too_short(n, self.buf.remaining()));
        }
        Ok(())
    }

    /// Skips `n` bytes.
    ///
    /// # Errors
    /// Returns `MessageTooShort` past the end.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.need(n)?;
        self.buf.advance(n);
        Ok(())
    }

    /// Reads a `u8`.
    ///
    /// # Errors
    /// Returns `MessageTooShort` past the end.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads a little-endian `u16`.
    ///
    /// # Errors
    /// Returns `MessageTooShort` past the end.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    /// Reads a little-endian `u32`.
    ///
    /// # Errors
    /// Returns `MessageTooShort` past the end.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Reads a little-endian `u64`.
    ///
    /// # Errors
    /// Returns `MessageTooShort` past the end.
    pub fn read_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    /// Borrows the next `n` bytes.
    ///
    /// # Errors
    /// Returns `MessageTooShort` past the end.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Reads a fixed-width string, trimming trailing NULs.
    ///
    /// # Errors
    /// Returns `MessageTooShort` past the end, `MalformedMessage` on invalid UTF-8.
    pub fn read_fixed_str(&mut self, n: usize) -> Result<&'a str> {
        let raw = self.read_bytes(n)?;
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        std::str::from_utf8(&raw[..end]).map_err(|_| CoreError::malformed("string is not UTF-8"))
    }
}

// ============================================
// PacketWriter
// ============================================

/// Builds a packet body behind a 4-byte header.
///
/// # Example
/// ```
/// use avalanche_core::protocol::{Packet, PacketWriter};
///
/// let mut writer = PacketWriter::new(1052);
/// writer.put_u32(7).put_fixed_str("hero", 16);
/// let bytes = writer.finish().unwrap();
///
/// let packet = Packet::parse(&bytes).unwrap();
/// assert_eq!(packet.opcode(), 1052);
/// assert_eq!(packet.length(), 4 + 4 + 16);
/// ```
#[derive(Debug, Clone)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    /// Starts a packet with the given opcode.
    #[must_use]
    pub fn new(opcode: u16) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u16_le(0);
        buf.put_u16_le(opcode);
        Self { buf }
    }

    /// Starts a headerless buffer (the handshake request has no opcode).
    #[must_use]
    pub fn raw() -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
        }
    }

    /// Appends a `u8`.
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Appends a little-endian `u16`.
    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    /// Appends a little-endian `u32`.
    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Appends a little-endian `u64`.
    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    /// Appends raw bytes.
    pub fn put_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    /// Appends `value` NUL-padded (or cut) to exactly `width` bytes.
    pub fn put_fixed_str(&mut self, value: &str, width: usize) -> &mut Self {
        let bytes = value.as_bytes();
        let take = bytes.len().min(width);
        self.buf.put_slice(&bytes[..take]);
        self.buf.put_bytes(0, width - take);
        self
    }

    /// Current length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes the length at offset 0 and returns the bytes.
    ///
    /// # Errors
    /// Returns `MalformedMessage` if the packet exceeds `u16::MAX`.
    pub fn finish(mut self) -> Result<BytesMut> {
        let length = u16::try_from(self.buf.len())
            .map_err(|_| CoreError::malformed(format!("packet of {} bytes exceeds u16", self.buf.len())))?;
        if self.buf.len() >= 2 {
            self.buf[..2].copy_from_slice(&length.to_le_bytes());
        }
        Ok(self.buf)
    }

    /// Returns the bytes exactly as written, no length fix-up.
    #[must_use]
    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

// ============================================
// Hex Dump
// ============================================

/// Renders a frame the way packet logs have always looked.
///
/// Dumps the number of bytes declared by the length prefix, clamped to
/// the slice.
#[must_use]
pub fn hex_dump(frame: &[u8]) -> String {
    let declared = if frame.len() >= 2 {
        usize::from(u16::from_le_bytes([frame[0], frame[1]]))
    } else {
        frame.len()
    };
    let size = declared.min(frame.len());

    let mut out = String::with_capacity(144 + size.div_ceil(BYTES_PER_DUMP_LINE) * 74);
    out.push_str("      00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f 0123456789abcdef\n");
    out.push_str("    +------------------------------------------------ ----------------\n");

    for line in (0..size).step_by(BYTES_PER_DUMP_LINE) {
        let _ = write!(out, "{line:03x} | ");
        for j in line..line + BYTES_PER_DUMP_LINE {
            if j < size {
                let _ = write!(out, "{:02x} ", frame[j]);
            } else {
                out.push_str("   ");
            }
        }
        out.push(' ');
        for j in line..line + BYTES_PER_DUMP_LINE {
            let c = match frame.get(j) {
                Some(&b) if j < size && (0x20..0x7f).contains(&b) => char::from(b),
                Some(_) if j < size => '.',
                _ => ' ',
            };
            out.push(c);
        }
        out.push('\n');
    }
    out
}

// ============================================
// Tests
// ============================================
