//! Concurrent player and channel registries.
//!
//! Both registries are `DashMap`s keyed by their natural id. Secondary
//! lookups (account id, nickname, relay slot) walk a snapshot, so they
//! stay safe while sessions connect and drop concurrently.

use std::sync::Arc;

use dashmap::DashMap;

use matchforge_transport::SessionId;

use crate::channel::Channel;
use crate::player::Player;

/// All authenticated players, keyed by session id.
#[derive(Default)]
pub struct PlayerRegistry {
    players: DashMap<SessionId, Arc<Player>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: SessionId, player: Arc<Player>) {
        self.players.insert(session, player);
    }

    pub fn remove(&self, session: SessionId) -> Option<Arc<Player>> {
        self.players.remove(&session).map(|(_, player)| player)
    }

    pub fn get(&self, session: SessionId) -> Option<Arc<Player>> {
        self.players.get(&session).map(|p| Arc::clone(&p))
    }

    pub fn by_account(&self, account_id: u64) -> Option<Arc<Player>> {
        self.players
            .iter()
            .find(|entry| entry.account_id() == account_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn by_nickname(&self, nickname: &str) -> Option<Arc<Player>> {
        self.players
            .iter()
            .find(|entry| entry.nickname() == nickname)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains_account(&self, account_id: u64) -> bool {
        self.by_account(account_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Point-in-time copy of every player.
    pub fn snapshot(&self) -> Vec<Arc<Player>> {
        self.players
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

/// All lobby channels, keyed by channel id.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<u16, Arc<Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the given channels, typically once at startup.
    pub fn seed(&self, channels: impl IntoIterator<Item = Channel>) {
        for channel in channels {
            self.channels.insert(channel.id(), Arc::new(channel));
        }
    }

    pub fn get(&self, id: u16) -> Option<Arc<Channel>> {
        self.channels.get(&id).map(|c| Arc::clone(&c))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Channels ordered by id, for channel-list replies.
    pub fn snapshot(&self) -> Vec<Arc<Channel>> {
        let mut channels: Vec<Arc<Channel>> = self
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        channels.sort_by_key(|c| c.id());
        channels
    }
}
