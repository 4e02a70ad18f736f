//! Relay tunnel service for Matchforge.
//!
//! See [`RelayService`] for the forwarding rules.

mod error;
mod service;

pub use error::RelayError;
pub use service::RelayService;
