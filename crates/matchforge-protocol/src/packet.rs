//! Packet builder and reader for the length-prefixed binary frame format.
//!
//! Wire layout:
//!
//! ```text
//! u16 totalLength | u8 marker(0xF0) | u8 opcode | payload
//! ```
//!
//! `totalLength` is little-endian and counts everything from the marker
//! onward plus its own 2 bytes. [`Packet`] is an append-only builder that
//! produces the full wire frame with [`Packet::finish`]. [`PacketReader`]
//! walks a received frame body (the bytes after the length prefix) with
//! typed reads that fail softly: a malformed packet yields a
//! [`ProtocolError`] and the caller drops the packet, not the connection.

use crate::ProtocolError;

/// First body byte of every frame.
pub const MARKER: u8 = 0xF0;

/// Append-only builder for an outgoing packet.
///
/// All multi-byte values are written little-endian. Booleans are a single
/// `0`/`1` byte. Strings are either NUL-terminated or written into a
/// fixed-length zero-padded buffer.
#[derive(Debug, Clone)]
pub struct Packet {
    buf: Vec<u8>,
}

impl Packet {
    /// Starts a packet for the given opcode.
    pub fn new(opcode: impl Into<u8>) -> Self {
        Self {
            buf: vec![MARKER, opcode.into()],
        }
    }

    /// The opcode this packet was created with.
    pub fn opcode(&self) -> u8 {
        self.buf[1]
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    /// Writes a NUL-terminated string.
    pub fn write_cstring(&mut self, value: &str) {
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
    }

    /// Writes a string into a fixed-length zero-padded buffer.
    ///
    /// Strings longer than `len` are cut at the byte limit so the field
    /// width stays exact; a multi-byte character on the boundary is left
    /// incomplete.
    pub fn write_string_buffer(&mut self, value: &str, len: usize) {
        let bytes = value.as_bytes();
        let n = bytes.len().min(len);
        self.buf.extend_from_slice(&bytes[..n]);
        self.buf.resize(self.buf.len() + (len - n), 0);
    }

    /// Finalizes the packet, prepending the little-endian length prefix.
    pub fn finish(&self) -> Vec<u8> {
        let total = (self.buf.len() + 2) as u16;
        let mut wire = Vec::with_capacity(self.buf.len() + 2);
        wire.extend_from_slice(&total.to_le_bytes());
        wire.extend_from_slice(&self.buf);
        wire
    }
}

/// Cursor over a received frame body.
#[derive(Debug)]
pub struct PacketReader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Parses a frame body (marker, opcode, payload; no length prefix).
    pub fn parse(body: &'a [u8]) -> Result<Self, ProtocolError> {
        if body.len() < 2 {
            return Err(ProtocolError::Truncated {
                declared: 2,
                actual: body.len(),
            });
        }
        if body[0] != MARKER {
            return Err(ProtocolError::BadMarker(body[0]));
        }
        Ok(Self { body, pos: 2 })
    }

    /// Parses a full wire frame, validating the length prefix first.
    pub fn parse_wire(frame: &'a [u8]) -> Result<Self, ProtocolError> {
        if frame.len() < 2 {
            return Err(ProtocolError::Truncated {
                declared: 2,
                actual: frame.len(),
            });
        }
        let declared = u16::from_le_bytes([frame[0], frame[1]]) as usize;
        if declared != frame.len() {
            return Err(ProtocolError::Truncated {
                declared,
                actual: frame.len(),
            });
        }
        Self::parse(&frame[2..])
    }

    pub fn opcode(&self) -> u8 {
        self.body[1]
    }

    /// Bytes left in the payload.
    pub fn remaining(&self) -> usize {
        self.body.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::UnexpectedEof(self.pos));
        }
        let slice = &self.body[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(i64::from_le_bytes(raw))
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(n)
    }

    /// Consumes the rest of the payload.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let slice = &self.body[self.pos..];
        self.pos = self.body.len();
        slice
    }

    /// Reads a NUL-terminated string.
    pub fn read_cstring(&mut self) -> Result<String, ProtocolError> {
        let rest = &self.body[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::BadString)?;
        let s = std::str::from_utf8(&rest[..nul]).map_err(|_| ProtocolError::BadString)?;
        self.pos += nul + 1;
        Ok(s.to_owned())
    }

    /// Reads a fixed-length string buffer, stopping at the first NUL.
    pub fn read_cstring_buffer(&mut self, len: usize) -> Result<String, ProtocolError> {
        let raw = self.take(len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(len);
        std::str::from_utf8(&raw[..end])
            .map(str::to_owned)
            .map_err(|_| ProtocolError::BadString)
    }
}
