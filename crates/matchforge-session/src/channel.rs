//! Lobby channels.

use std::sync::Arc;

use dashmap::DashMap;

use matchforge_transport::SessionId;

use crate::player::Player;

/// One lobby channel. Membership is a `DashMap` so broadcasts can
/// iterate a snapshot while players come and go.
pub struct Channel {
    id: u16,
    name: String,
    members: DashMap<SessionId, Arc<Player>>,
}

impl Channel {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            members: DashMap::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Adds the player and marks them as being in this channel.
    pub fn join(&self, player: &Arc<Player>) {
        player.state().channel_id = Some(self.id);
        self.members
            .insert(player.session().id(), Arc::clone(player));
        tracing::debug!(channel = self.id, nickname = player.nickname(), "joined channel");
    }

    /// Removes the player. Safe to call for non-members.
    pub fn leave(&self, player: &Arc<Player>) {
        if self.members.remove(&player.session().id()).is_some() {
            tracing::debug!(channel = self.id, nickname = player.nickname(), "left channel");
        }
        let mut state = player.state();
        if state.channel_id == Some(self.id) {
            state.channel_id = None;
        }
    }

    /// Sends a frame to every member except `exclude`. Iterates a
    /// snapshot of the membership.
    pub fn broadcast(&self, frame: &[u8], exclude: Option<SessionId>) {
        for member in self.members_snapshot() {
            if Some(member.session().id()) == exclude {
                continue;
            }
            member.send(frame.to_vec());
        }
    }

    /// Point-in-time copy of the membership.
    pub fn members_snapshot(&self) -> Vec<Arc<Player>> {
        self.members
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
