//! Server configuration.
//!
//! Loaded from a JSON file at startup; every field has a default so a
//! missing file still yields a runnable development server.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MatchforgeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the match service listens on.
    pub match_addr: String,
    /// Address the relay service listens on.
    pub relay_addr: String,
    /// Room sweep frequency.
    pub tick_rate_hz: u32,
    /// Wallet granted to accounts the in-memory store seeds.
    pub starting_pen: u32,
    pub starting_ap: u32,
    pub channels: Vec<ChannelConfig>,
    /// Accounts seeded into the in-memory store.
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: u16,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub account_id: u64,
    pub username: String,
    pub nickname: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            match_addr: "0.0.0.0:28008".into(),
            relay_addr: "0.0.0.0:28012".into(),
            tick_rate_hz: 1,
            starting_pen: 5_000,
            starting_ap: 0,
            channels: vec![
                ChannelConfig {
                    id: 1,
                    name: "Rookie".into(),
                },
                ChannelConfig {
                    id: 2,
                    name: "Veteran".into(),
                },
            ],
            accounts: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MatchforgeError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
