//! Persistence seam.
//!
//! The engine never talks to a database directly; everything durable
//! goes through the [`PlayerStore`] trait so deployments can plug in
//! their own backend. [`MemoryStore`] is the in-process implementation
//! used by the bundled binary and the test suites.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use thiserror::Error;

use crate::score::{DeathmatchStats, TouchdownStats};

/// Durable facts about one account.
#[derive(Debug, Clone, Default)]
pub struct PlayerRecord {
    pub account_id: u64,
    pub username: String,
    pub nickname: String,
    pub level: u32,
    pub exp: u32,
    pub pen: u32,
    pub ap: u32,
    pub tutorial_completed: bool,
    pub td_stats: TouchdownStats,
    pub dm_stats: DeathmatchStats,
}

/// One purchasable catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopItem {
    pub category: u8,
    pub sub_category: u8,
    pub item_id: u16,
    pub product_id: u8,
    pub price: u32,
}

/// Key the client sends to identify a catalogue entry.
pub type ShopKey = (u8, u8, u16, u8);

impl ShopItem {
    pub fn key(&self) -> ShopKey {
        (self.category, self.sub_category, self.item_id, self.product_id)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("no such account {0}")]
    NoSuchAccount(u64),
}

/// Backend for accounts, wallets and the item catalogue.
pub trait PlayerStore: Send + Sync + 'static {
    fn account_id_by_username(&self, username: &str) -> Result<Option<u64>, StoreError>;
    fn get_player(&self, account_id: u64) -> Result<Option<PlayerRecord>, StoreError>;
    fn update_money(&self, account_id: u64, pen: u32, ap: u32) -> Result<(), StoreError>;
    fn update_exp_level(&self, account_id: u64, level: u32, exp: u32) -> Result<(), StoreError>;
    fn update_touchdown_stats(
        &self,
        account_id: u64,
        stats: &TouchdownStats,
    ) -> Result<(), StoreError>;
    fn update_deathmatch_stats(
        &self,
        account_id: u64,
        stats: &DeathmatchStats,
    ) -> Result<(), StoreError>;
    fn set_tutorial_completed(&self, account_id: u64) -> Result<(), StoreError>;
    /// Looks up a catalogue entry; `None` means the client named an item
    /// that does not exist.
    fn shop_item(&self, key: ShopKey) -> Result<Option<ShopItem>, StoreError>;
    /// Records a completed purchase.
    fn record_purchase(&self, account_id: u64, item: &ShopItem) -> Result<(), StoreError>;
    fn is_valid_map(&self, map_id: u8) -> bool;
}

/// In-memory [`PlayerStore`].
#[derive(Default)]
pub struct MemoryStore {
    players: DashMap<u64, PlayerRecord>,
    shop: DashMap<ShopKey, ShopItem>,
    /// Empty set means every map id is accepted.
    maps: HashSet<u8>,
    fail_purchases: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_player(&self, record: PlayerRecord) {
        self.players.insert(record.account_id, record);
    }

    pub fn insert_shop_item(&self, item: ShopItem) {
        self.shop.insert(item.key(), item);
    }

    /// Restricts `is_valid_map` to the given ids.
    pub fn with_maps(mut self, maps: impl IntoIterator<Item = u8>) -> Self {
        self.maps = maps.into_iter().collect();
        self
    }

    /// Makes `record_purchase` fail, to exercise the error path.
    pub fn fail_purchases(&self, fail: bool) {
        self.fail_purchases.store(fail, Ordering::Relaxed);
    }

    fn with_player<T>(
        &self,
        account_id: u64,
        apply: impl FnOnce(&mut PlayerRecord) -> T,
    ) -> Result<T, StoreError> {
        let mut record = self
            .players
            .get_mut(&account_id)
            .ok_or(StoreError::NoSuchAccount(account_id))?;
        Ok(apply(&mut record))
    }
}

impl PlayerStore for MemoryStore {
    fn account_id_by_username(&self, username: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .players
            .iter()
            .find(|entry| entry.username == username)
            .map(|entry| entry.account_id))
    }

    fn get_player(&self, account_id: u64) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.players.get(&account_id).map(|r| r.clone()))
    }

    fn update_money(&self, account_id: u64, pen: u32, ap: u32) -> Result<(), StoreError> {
        self.with_player(account_id, |record| {
            record.pen = pen;
            record.ap = ap;
        })
    }

    fn update_exp_level(&self, account_id: u64, level: u32, exp: u32) -> Result<(), StoreError> {
        self.with_player(account_id, |record| {
            record.level = level;
            record.exp = exp;
        })
    }

    fn update_touchdown_stats(
        &self,
        account_id: u64,
        stats: &TouchdownStats,
    ) -> Result<(), StoreError> {
        self.with_player(account_id, |record| record.td_stats = stats.clone())
    }

    fn update_deathmatch_stats(
        &self,
        account_id: u64,
        stats: &DeathmatchStats,
    ) -> Result<(), StoreError> {
        self.with_player(account_id, |record| record.dm_stats = stats.clone())
    }

    fn set_tutorial_completed(&self, account_id: u64) -> Result<(), StoreError> {
        self.with_player(account_id, |record| record.tutorial_completed = true)
    }

    fn shop_item(&self, key: ShopKey) -> Result<Option<ShopItem>, StoreError> {
        Ok(self.shop.get(&key).map(|item| item.clone()))
    }

    fn record_purchase(&self, _account_id: u64, _item: &ShopItem) -> Result<(), StoreError> {
        if self.fail_purchases.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("purchase log rejected write".into()));
        }
        Ok(())
    }

    fn is_valid_map(&self, map_id: u8) -> bool {
        self.maps.is_empty() || self.maps.contains(&map_id)
    }
}
