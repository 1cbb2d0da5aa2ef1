//! Position ledger - the set of currently open stakes
//!
//! One `Position` per asset, keyed by mint; no two open positions may share a
//! mint. All mutation goes through `Ledger` methods under the global ledger
//! lock, and every mutation is persisted to disk so a restart can reconcile
//! against live balances instead of starting blind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::logger::{self, LogTag};

/// Remaining-amount floor as a percent of entry amount. At or below this the
/// position counts as fully closed.
pub const DUST_THRESHOLD_PERCENT: f64 = 1.0;

/// On-disk ledger location
pub const POSITIONS_FILE: &str = "data/positions.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Asset mint address - unique key in the ledger
    pub mint: String,
    pub symbol: String,
    /// Entry price in lamports per raw token unit
    pub entry_price: f64,
    /// Raw units received at entry
    pub entry_amount: u64,
    /// Raw units still held; never increases
    pub amount_remaining: u64,
    /// SOL cost of the entry in lamports
    pub stake_lamports: u64,
    pub entry_time: DateTime<Utc>,
    /// Best price observed since entry
    pub high_water_price: f64,
    /// Best gain percent observed since entry
    pub high_water_gain_percent: f64,
    /// Monotonic cursor into the sell level table: levels [0, cursor) have
    /// executed, cursor is the next eligible level
    pub levels_executed: usize,
    /// Cumulative lamports received from partial exits
    pub total_proceeds_lamports: u64,
    pub entry_signature: String,
}

impl Position {
    pub fn new(
        mint: &str,
        symbol: &str,
        entry_price: f64,
        entry_amount: u64,
        stake_lamports: u64,
        entry_signature: &str,
    ) -> Self {
        Self {
            mint: mint.to_string(),
            symbol: symbol.to_string(),
            entry_price,
            entry_amount,
            amount_remaining: entry_amount,
            stake_lamports,
            entry_time: Utc::now(),
            high_water_price: entry_price,
            high_water_gain_percent: 0.0,
            levels_executed: 0,
            total_proceeds_lamports: 0,
            entry_signature: entry_signature.to_string(),
        }
    }

    /// Gain percent of `price` relative to entry
    pub fn gain_percent(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0
    }

    /// Track the high-water mark from a new price observation
    pub fn update_tracking(&mut self, price: f64) {
        if price > self.high_water_price {
            self.high_water_price = price;
            self.high_water_gain_percent = self.gain_percent(price);
        }
    }

    /// Drawdown percent from the high-water price
    pub fn drawdown_from_high(&self, price: f64) -> f64 {
        if self.high_water_price <= 0.0 {
            return 0.0;
        }
        (self.high_water_price - price) / self.high_water_price * 100.0
    }

    pub fn dust_floor(&self) -> u64 {
        (self.entry_amount as f64 * DUST_THRESHOLD_PERCENT / 100.0) as u64
    }

    pub fn is_dust(&self) -> bool {
        self.amount_remaining <= self.dust_floor()
    }

    pub fn hold_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.entry_time).num_seconds()
    }

    /// Book a partial exit: reduce remaining, accumulate proceeds, advance
    /// the level cursor.
    pub fn record_level_exit(&mut self, sold_raw: u64, proceeds_lamports: u64) {
        self.amount_remaining = self.amount_remaining.saturating_sub(sold_raw);
        self.total_proceeds_lamports = self
            .total_proceeds_lamports
            .saturating_add(proceeds_lamports);
        self.levels_executed += 1;
    }

    /// Realized gain over the whole position once closed
    pub fn total_gain_percent(&self) -> f64 {
        if self.stake_lamports == 0 {
            return 0.0;
        }
        (self.total_proceeds_lamports as f64 - self.stake_lamports as f64)
            / self.stake_lamports as f64
            * 100.0
    }
}

/// Open positions keyed by mint. BTreeMap keeps cycle iteration order stable.
#[derive(Debug, Default)]
pub struct Ledger {
    positions: BTreeMap<String, Position>,
    path: Option<PathBuf>,
}

impl Ledger {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            positions: BTreeMap::new(),
            path,
        }
    }

    /// Load the persisted ledger, or start empty if the file is absent or
    /// unreadable. Entries still need reconciliation against live balances.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path_buf = path.as_ref().to_path_buf();
        let positions = match std::fs::read_to_string(&path_buf) {
            Ok(content) => match serde_json::from_str::<Vec<Position>>(&content) {
                Ok(list) => {
                    logger::info(
                        LogTag::Position,
                        &format!("loaded {} persisted positions", list.len()),
                    );
                    list.into_iter().map(|p| (p.mint.clone(), p)).collect()
                }
                Err(e) => {
                    logger::error(
                        LogTag::Position,
                        &format!("failed to parse positions file: {}", e),
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            positions,
            path: Some(path_buf),
        }
    }

    /// Persist the current state. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let list: Vec<&Position> = self.positions.values().collect();
        match serde_json::to_string_pretty(&list) {
            Ok(content) => {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(path, content) {
                    logger::error(
                        LogTag::Position,
                        &format!("failed to save positions: {}", e),
                    );
                }
            }
            Err(e) => {
                logger::error(
                    LogTag::Position,
                    &format!("failed to serialize positions: {}", e),
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.positions.contains_key(mint)
    }

    pub fn get(&self, mint: &str) -> Option<Position> {
        self.positions.get(mint).cloned()
    }

    /// Mints in stable iteration order
    pub fn mints(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    /// Admit a new position. Rejects duplicates and enforces the concurrent
    /// position bound.
    pub fn insert(&mut self, position: Position, max_open: usize) -> Result<(), String> {
        if self.positions.contains_key(&position.mint) {
            return Err(format!("position already open for {}", position.mint));
        }
        if self.positions.len() >= max_open {
            return Err(format!(
                "max open positions reached ({}/{})",
                self.positions.len(),
                max_open
            ));
        }

        self.positions.insert(position.mint.clone(), position);
        self.save();
        Ok(())
    }

    /// Mutate one position in place. Returns false if the mint is not held.
    pub fn apply<F: FnOnce(&mut Position)>(&mut self, mint: &str, mutate: F) -> bool {
        match self.positions.get_mut(mint) {
            Some(position) => {
                mutate(position);
                self.save();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, mint: &str) -> Option<Position> {
        let removed = self.positions.remove(mint);
        if removed.is_some() {
            self.save();
        }
        removed
    }
}

/// Global ledger. The supervisor serializes all mutating access through this
/// lock; no call site edits position state outside `Ledger` methods.
pub static LEDGER: Lazy<Arc<Mutex<Ledger>>> =
    Lazy::new(|| Arc::new(Mutex::new(Ledger::new(Some(PathBuf::from(POSITIONS_FILE))))));

#[cfg(test)]
mod tests {
    use super::*;

    fn test_position(mint: &str) -> Position {
        Position::new(mint, "TEST", 40.0, 1_000_000, 10_000_000, "sig")
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut ledger = Ledger::new(None);
        ledger.insert(test_position("mint-a"), 5).unwrap();
        assert!(ledger.insert(test_position("mint-a"), 5).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut ledger = Ledger::new(None);
        ledger.insert(test_position("mint-a"), 2).unwrap();
        ledger.insert(test_position("mint-b"), 2).unwrap();
        assert!(ledger.insert(test_position("mint-c"), 2).is_err());
    }

    #[test]
    fn test_high_water_only_rises() {
        let mut position = test_position("mint-a");
        position.update_tracking(50.0);
        assert!((position.high_water_price - 50.0).abs() < f64::EPSILON);
        assert!((position.high_water_gain_percent - 25.0).abs() < 1e-9);

        position.update_tracking(45.0);
        assert!((position.high_water_price - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_remaining_is_non_increasing_and_saturates() {
        let mut position = test_position("mint-a");
        position.record_level_exit(600_000, 7_000_000);
        assert_eq!(position.amount_remaining, 400_000);
        assert_eq!(position.levels_executed, 1);

        position.record_level_exit(500_000, 3_000_000);
        assert_eq!(position.amount_remaining, 0);
        assert_eq!(position.total_proceeds_lamports, 10_000_000);
    }

    #[test]
    fn test_dust_threshold_is_one_percent_of_entry() {
        let mut position = test_position("mint-a");
        assert!(!position.is_dust());

        position.amount_remaining = position.entry_amount / 100;
        assert!(position.is_dust());

        position.amount_remaining = position.entry_amount / 100 + 1;
        assert!(!position.is_dust());
    }

    #[test]
    fn test_total_gain_percent() {
        let mut position = test_position("mint-a");
        position.total_proceeds_lamports = 15_000_000;
        assert!((position.total_gain_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");

        let mut ledger = Ledger::new(Some(path.clone()));
        ledger.insert(test_position("mint-a"), 5).unwrap();
        ledger
            .apply("mint-a", |p| p.record_level_exit(100_000, 1_500_000))
            .then_some(())
            .unwrap();

        let reloaded = Ledger::load(&path);
        assert_eq!(reloaded.len(), 1);
        let position = reloaded.get("mint-a").unwrap();
        assert_eq!(position.amount_remaining, 900_000);
        assert_eq!(position.levels_executed, 1);
    }
}
