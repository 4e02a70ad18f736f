//! Packed room configuration key.
//!
//! Four bytes carried verbatim in room creation, room lists, and enter
//! acks. Layout:
//!
//! ```text
//! byte 0: bit 0 game type | bit 1 public | bit 2 join-auth | bits 4-7 rule
//! byte 1: map id
//! byte 2: capacity code (3 -> 4, 5 -> 6, 6 -> 8, 7 -> 10, 8 -> 12)
//! byte 3: bit 1 observer flag
//! ```
//!
//! The capacity code maps to the player ceiling; spectator slots fill the
//! remainder of the 12-seat room.

use crate::GameRule;

/// Total seats in a room, players plus spectators.
const ROOM_SEATS: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchKey([u8; 4]);

impl MatchKey {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Composes a key from its parts. Mostly useful for tests and tools;
    /// real keys arrive from clients.
    pub fn compose(rule: GameRule, map_id: u8, capacity_code: u8, public: bool) -> Self {
        let byte0 = (u8::from(rule) << 4) | (u8::from(public) << 1);
        Self([byte0, map_id, capacity_code, 0])
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn game_type(&self) -> u8 {
        self.0[0] & 1
    }

    pub fn is_public(&self) -> bool {
        (self.0[0] >> 1) & 1 == 1
    }

    pub fn join_auth(&self) -> bool {
        (self.0[0] >> 2) & 1 == 1
    }

    /// The game rule nibble; `None` when it holds no known rule.
    pub fn game_rule(&self) -> Option<GameRule> {
        GameRule::from_u8(self.0[0] >> 4)
    }

    pub fn map_id(&self) -> u8 {
        self.0[1]
    }

    /// Player ceiling for this room; 0 for an unknown capacity code.
    pub fn player_limit(&self) -> u8 {
        match self.0[2] {
            3 => 4,
            5 => 6,
            6 => 8,
            7 => 10,
            8 => 12,
            _ => 0,
        }
    }

    /// Spectator ceiling: whatever the players leave of the 12 seats.
    pub fn spectator_limit(&self) -> u8 {
        ROOM_SEATS - self.player_limit()
    }

    pub fn observer_enabled(&self) -> bool {
        (self.0[3] >> 1) & 1 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_tiers() {
        for (code, limit) in [(3u8, 4u8), (5, 6), (6, 8), (7, 10), (8, 12)] {
            let key = MatchKey::from_bytes([0, 0, code, 0]);
            assert_eq!(key.player_limit(), limit);
            assert_eq!(key.spectator_limit(), 12 - limit);
        }
    }

    #[test]
    fn unknown_capacity_code_is_zero() {
        let key = MatchKey::from_bytes([0, 0, 4, 0]);
        assert_eq!(key.player_limit(), 0);
        assert_eq!(key.spectator_limit(), 12);
    }

    #[test]
    fn unpacks_flag_byte() {
        let key = MatchKey::compose(GameRule::Deathmatch, 9, 6, true);
        assert_eq!(key.game_rule(), Some(GameRule::Deathmatch));
        assert_eq!(key.map_id(), 9);
        assert!(key.is_public());
        assert!(!key.join_auth());
        assert!(!key.observer_enabled());
    }

    #[test]
    fn tampered_rule_nibble_is_rejected() {
        let key = MatchKey::from_bytes([0x70, 0, 3, 0]);
        assert_eq!(key.game_rule(), None);
    }
}
