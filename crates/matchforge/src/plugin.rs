//! Plugin hooks.
//!
//! Plugins observe and veto engine decisions without patching the
//! engine. Every hook has a default so a plugin only implements what it
//! cares about. Veto hooks return `false` to stop the action; with
//! several plugins registered, the first veto wins.

use std::sync::Arc;

use matchforge_room::Room;
use matchforge_session::{Player, ShopKey};

pub trait GamePlugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Called for every decoded packet before dispatch. `player` is
    /// `None` until the session logs in.
    fn on_packet(&self, _player: Option<&Arc<Player>>, _opcode: u8, _payload: &[u8]) -> bool {
        true
    }

    fn on_create_room(&self, _player: &Arc<Player>, _room: &Arc<Room>) -> bool {
        true
    }

    /// Called once per sweep for every live room. Returning `false`
    /// skips the room's update this tick.
    fn room_tick(&self, _room: &Arc<Room>) -> bool {
        true
    }

    fn on_begin_round(&self, _player: &Arc<Player>, _room: &Arc<Room>) -> bool {
        true
    }

    fn on_ready_round(&self, _player: &Arc<Player>, _room: &Arc<Room>) -> bool {
        true
    }

    fn on_buy_item(&self, _player: &Arc<Player>, _items: &[ShopKey]) {}

    /// First plugin to return `Some` answers the admin command.
    fn on_admin_action(&self, _sender: &Arc<Player>, _args: &[&str]) -> Option<String> {
        None
    }
}

/// The plugins registered at startup, in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn GamePlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn GamePlugin>) {
        tracing::info!(plugin = plugin.name(), "plugin registered");
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn allow_packet(&self, player: Option<&Arc<Player>>, opcode: u8, payload: &[u8]) -> bool {
        self.plugins
            .iter()
            .all(|p| p.on_packet(player, opcode, payload))
    }

    pub fn allow_create_room(&self, player: &Arc<Player>, room: &Arc<Room>) -> bool {
        self.plugins.iter().all(|p| p.on_create_room(player, room))
    }

    pub fn allow_room_tick(&self, room: &Arc<Room>) -> bool {
        self.plugins.iter().all(|p| p.room_tick(room))
    }

    pub fn allow_begin_round(&self, player: &Arc<Player>, room: &Arc<Room>) -> bool {
        self.plugins.iter().all(|p| p.on_begin_round(player, room))
    }

    pub fn allow_ready_round(&self, player: &Arc<Player>, room: &Arc<Room>) -> bool {
        self.plugins.iter().all(|p| p.on_ready_round(player, room))
    }

    pub fn notify_buy_item(&self, player: &Arc<Player>, items: &[ShopKey]) {
        for plugin in &self.plugins {
            plugin.on_buy_item(player, items);
        }
    }

    pub fn admin_action(&self, sender: &Arc<Player>, args: &[&str]) -> Option<String> {
        self.plugins
            .iter()
            .find_map(|p| p.on_admin_action(sender, args))
    }
}
