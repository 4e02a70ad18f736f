//! Error types for the protocol layer.
//!
//! Each crate in Matchforge defines its own error enum. A `ProtocolError`
//! always means "this buffer could not be understood", never an I/O or
//! room-logic problem. Callers are expected to drop the offending packet
//! and keep the connection alive.

/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The declared frame length does not match the bytes available.
    #[error("frame truncated: declared {declared} bytes, have {actual}")]
    Truncated { declared: usize, actual: usize },

    /// The first body byte is not the protocol marker `0xF0`.
    #[error("bad frame marker {0:#04x}")]
    BadMarker(u8),

    /// A typed read ran past the end of the payload.
    #[error("unexpected end of payload at offset {0}")]
    UnexpectedEof(usize),

    /// A string field is missing its NUL terminator or is not valid UTF-8.
    #[error("malformed string field")]
    BadString,

    /// The opcode byte maps to no known operation.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
}
