//! Wire protocol for Matchforge.
//!
//! This crate defines the "language" that game clients and the server
//! speak:
//!
//! - **Packets** ([`Packet`], [`PacketReader`]) build and walk the
//!   length-prefixed binary frames.
//! - **Opcodes** ([`MatchOpcode`], [`RelayOpcode`], [`P2pOpcode`]) name
//!   the operations those frames carry.
//! - **Types** ([`Team`], [`GameRule`], [`MatchKey`], result codes) are
//!   the shared vocabulary of payload fields.
//! - **Obfuscation** ([`descramble`]) undoes the client-side payload
//!   scramble used on the match service.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and session
//! (player identity). It knows nothing about connections, registries, or
//! rooms; it only turns bytes into meaning and back.
//!
//! ```text
//! Transport (frame bytes) -> Protocol (opcode + payload) -> Dispatcher
//! ```

mod crypt;
mod error;
mod matchkey;
mod opcode;
mod p2p;
mod packet;
mod types;

pub use crypt::{descramble, scramble};
pub use error::ProtocolError;
pub use matchkey::MatchKey;
pub use opcode::{MatchOpcode, P2pOpcode, RelayOpcode};
pub use p2p::P2pHeader;
pub use packet::{Packet, PacketReader, MARKER};
pub use types::{
    BuyItemResult, EventMessage, GamePhase, GameRule, PlayState, PlayerMode, ServerResult, Team,
    TimeState,
};
