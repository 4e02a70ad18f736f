//! Framed TCP connection layer for Matchforge.
//!
//! One [`FramedServer`] per service. It accepts raw TCP connections,
//! reassembles the 2-byte length-prefixed frames, and hands complete
//! frame bodies to the owner as [`ServerEvent`]s. Outbound traffic goes
//! through per-session [`SessionHandle`]s, which are cheap to clone and
//! safe to use from synchronous code.

mod error;
mod framed;
mod session;

pub use error::TransportError;
pub use framed::{FramedServer, ServerEvent, ServerHandle};
pub use session::SessionHandle;

use std::fmt;

/// Opaque identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a new `SessionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}
