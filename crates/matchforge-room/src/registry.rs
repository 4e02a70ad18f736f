//! Room registry and tunnel allocation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use matchforge_session::{Channel, PlayerStore};

use crate::error::RoomError;
use crate::room::{Room, RoomSettings};

/// All live rooms, keyed by tunnel id. Tunnel ids come from a monotonic
/// counter and are never reused, so a stale relay binding can't land in
/// a newer room. Room numbers are reused per channel, lowest free
/// number first.
pub struct RoomRegistry {
    rooms: DashMap<u32, Arc<Room>>,
    next_tunnel: AtomicU32,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            next_tunnel: AtomicU32::new(1),
        }
    }

    /// Creates a room in `channel` and announces it to the lobby.
    pub fn create(
        &self,
        channel: Arc<Channel>,
        settings: RoomSettings,
        store: Arc<dyn PlayerStore>,
    ) -> Result<Arc<Room>, RoomError> {
        let rule = settings
            .match_key
            .game_rule()
            .ok_or(RoomError::InvalidMatchKey)?;
        let tunnel_id = self.next_tunnel.fetch_add(1, Ordering::Relaxed);
        let number = self.free_number(channel.id());
        let room = Room::new(tunnel_id, number, rule, channel, settings, store);
        self.rooms.insert(tunnel_id, Arc::clone(&room));
        tracing::info!(tunnel = tunnel_id, number, ?rule, "room created");
        room.announce();
        Ok(room)
    }

    fn free_number(&self, channel_id: u16) -> u32 {
        let used: Vec<u32> = self
            .rooms
            .iter()
            .filter(|entry| entry.channel_id() == channel_id)
            .map(|entry| entry.number())
            .collect();
        let mut number = 1;
        while used.contains(&number) {
            number += 1;
        }
        number
    }

    pub fn get(&self, tunnel_id: u32) -> Option<Arc<Room>> {
        self.rooms.get(&tunnel_id).map(|r| Arc::clone(&r))
    }

    /// Removes the room and cancels its timers.
    pub fn remove(&self, tunnel_id: u32) -> Option<Arc<Room>> {
        let room = self.rooms.remove(&tunnel_id).map(|(_, room)| room)?;
        room.dispose();
        Some(room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Looks a room up by the number shown in a channel's lobby list.
    pub fn room_by_number(&self, channel_id: u16, number: u32) -> Option<Arc<Room>> {
        self.rooms
            .iter()
            .find(|entry| entry.channel_id() == channel_id && entry.number() == number)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Rooms in one channel, ordered by room number.
    pub fn rooms_in_channel(&self, channel_id: u16) -> Vec<Arc<Room>> {
        let mut rooms: Vec<Arc<Room>> = self
            .rooms
            .iter()
            .filter(|entry| entry.channel_id() == channel_id)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        rooms.sort_by_key(|r| r.number());
        rooms
    }

    /// Point-in-time copy of every room, for the sweep loop.
    pub fn snapshot(&self) -> Vec<Arc<Room>> {
        self.rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchforge_protocol::{GameRule, MatchKey};
    use matchforge_session::MemoryStore;
    use std::time::Duration;

    fn settings(rule_key: MatchKey) -> RoomSettings {
        RoomSettings {
            name: "test".into(),
            match_key: rule_key,
            time_limit: Duration::from_secs(600),
            score_limit: 6,
            password: 0,
            is_friendly: false,
            is_balanced: false,
            min_level: 0,
            max_level: 100,
            equip_limit: 0,
            no_intrusion: false,
        }
    }

    #[tokio::test]
    async fn room_numbers_fill_the_lowest_gap() {
        let registry = RoomRegistry::new();
        let channel = Arc::new(Channel::new(1, "Rookie"));
        let store: Arc<dyn PlayerStore> = Arc::new(MemoryStore::new());
        let key = MatchKey::compose(GameRule::Touchdown, 1, 5, true);

        let first = registry
            .create(Arc::clone(&channel), settings(key), Arc::clone(&store))
            .unwrap();
        let second = registry
            .create(Arc::clone(&channel), settings(key), Arc::clone(&store))
            .unwrap();
        assert_eq!(first.number(), 1);
        assert_eq!(second.number(), 2);

        registry.remove(first.tunnel_id());
        let third = registry
            .create(channel, settings(key), store)
            .unwrap();
        assert_eq!(third.number(), 1);
        assert_ne!(third.tunnel_id(), first.tunnel_id());
    }

    #[tokio::test]
    async fn tampered_match_key_is_rejected() {
        let registry = RoomRegistry::new();
        let channel = Arc::new(Channel::new(1, "Rookie"));
        let store: Arc<dyn PlayerStore> = Arc::new(MemoryStore::new());
        let bad = MatchKey::from_bytes([0xF0, 1, 5, 0]);
        assert!(matches!(
            registry.create(channel, settings(bad), store),
            Err(RoomError::InvalidMatchKey)
        ));
    }
}
