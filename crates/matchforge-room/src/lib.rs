//! Match rooms for Matchforge.
//!
//! The [`Room`] state machine runs one match from lobby to result
//! screen: membership and slots, team balance, the half-time cycle,
//! scoring, payouts and the timers that tie them together. The
//! [`RoomRegistry`] owns every live room and hands out tunnel ids for
//! the relay.

mod error;
pub mod packets;
mod registry;
mod room;

pub use error::RoomError;
pub use registry::RoomRegistry;
pub use room::{Room, RoomSettings};
