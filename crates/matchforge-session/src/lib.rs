//! Player sessions for Matchforge.
//!
//! This crate owns everything about a player that outlives a single
//! packet: the [`Player`] model and its locked state, per-rule round
//! scores and lifetime statistics, the concurrent player and channel
//! registries, and the [`PlayerStore`] persistence seam.
//!
//! Room mechanics live in `matchforge-room`; this crate deliberately
//! knows nothing about match rules beyond the score shapes they need.

mod channel;
mod player;
mod registry;
pub mod score;
mod store;

pub use channel::Channel;
pub use player::{NatInfo, Player, PlayerState};
pub use registry::{ChannelRegistry, PlayerRegistry};
pub use score::{
    apply_exp, exp_to_next, total_exp, DeathmatchScore, DeathmatchStats, GameScore, SurvivalScore,
    TouchdownScore, TouchdownStats, MAX_LEVEL,
};
pub use store::{MemoryStore, PlayerRecord, PlayerStore, ShopItem, ShopKey, StoreError};
