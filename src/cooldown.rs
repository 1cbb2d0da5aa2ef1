//! Re-entry cooldown management
//!
//! Per-asset memory of the last trade's outcome, gating how soon the asset
//! may be traded again. Wins free up quickly, losses sit out much longer. A
//! strong enough fresh opportunity can override the wait, but never within
//! 24 hours of a loss on that asset. Records are evicted lazily once their
//! window has fully elapsed.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::logger::{self, LogTag};

/// Cooldown window after a profitable close (minutes)
pub const PROFIT_COOLDOWN_MINUTES: i64 = 15;
/// Cooldown window after a losing close (minutes)
pub const LOSS_COOLDOWN_MINUTES: i64 = 120;
/// Cooldown window after a breakeven close (minutes)
pub const DEFAULT_COOLDOWN_MINUTES: i64 = 45;

/// Minimum elapsed time before an override can apply (minutes)
pub const OVERRIDE_MIN_ELAPSED_MINUTES: i64 = 30;
/// Opportunity score required for an override
pub const OVERRIDE_SCORE_THRESHOLD: f64 = 80.0;
/// No override while a loss on the asset is this recent (hours)
pub const OVERRIDE_LOSS_LOOKBACK_HOURS: i64 = 24;

/// Gains inside this band (percent, either side) classify as breakeven
const BREAKEVEN_BAND_PERCENT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Profit,
    Loss,
    Breakeven,
}

impl TradeOutcome {
    pub fn classify(gain_percent: f64) -> Self {
        if gain_percent > BREAKEVEN_BAND_PERCENT {
            TradeOutcome::Profit
        } else if gain_percent < -BREAKEVEN_BAND_PERCENT {
            TradeOutcome::Loss
        } else {
            TradeOutcome::Breakeven
        }
    }
}

#[derive(Debug, Clone)]
pub struct CooldownRecord {
    pub last_trade: DateTime<Utc>,
    pub outcome: TradeOutcome,
    pub trades: u32,
    pub last_loss: Option<DateTime<Utc>>,
}

static COOLDOWNS: Lazy<RwLock<HashMap<String, CooldownRecord>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn window_minutes(outcome: TradeOutcome) -> i64 {
    match outcome {
        TradeOutcome::Profit => PROFIT_COOLDOWN_MINUTES,
        TradeOutcome::Loss => LOSS_COOLDOWN_MINUTES,
        TradeOutcome::Breakeven => DEFAULT_COOLDOWN_MINUTES,
    }
}

fn record_trade_result_at(mint: &str, outcome: TradeOutcome, now: DateTime<Utc>) {
    let mut cooldowns = COOLDOWNS.write();
    let entry = cooldowns
        .entry(mint.to_string())
        .or_insert_with(|| CooldownRecord {
            last_trade: now,
            outcome,
            trades: 0,
            last_loss: None,
        });

    entry.last_trade = now;
    entry.outcome = outcome;
    entry.trades += 1;
    if outcome == TradeOutcome::Loss {
        entry.last_loss = Some(now);
    }

    logger::debug(
        LogTag::Cooldown,
        &format!(
            "recorded {:?} for {} (trade #{}, window {}m)",
            outcome,
            mint,
            entry.trades,
            window_minutes(outcome)
        ),
    );
}

/// Record a trade completion. Called on every close, successful or not -
/// the record is updated, never replaced.
pub fn record_trade_result(mint: &str, outcome: TradeOutcome) {
    record_trade_result_at(mint, outcome, Utc::now());
}

fn is_blocked_at(mint: &str, opportunity_score: f64, now: DateTime<Utc>) -> bool {
    let mut cooldowns = COOLDOWNS.write();

    let Some(record) = cooldowns.get(mint) else {
        return false;
    };

    let elapsed_minutes = now.signed_duration_since(record.last_trade).num_minutes();
    let window = window_minutes(record.outcome);

    if elapsed_minutes >= window {
        // Lazy eviction: the window has fully elapsed
        cooldowns.remove(mint);
        return false;
    }

    let recent_loss = record
        .last_loss
        .map(|t| now.signed_duration_since(t) < Duration::hours(OVERRIDE_LOSS_LOOKBACK_HOURS))
        .unwrap_or(false);

    if elapsed_minutes >= OVERRIDE_MIN_ELAPSED_MINUTES
        && opportunity_score >= OVERRIDE_SCORE_THRESHOLD
        && !recent_loss
    {
        logger::info(
            LogTag::Cooldown,
            &format!(
                "cooldown override for {} (score {:.1}, {}m elapsed of {}m)",
                mint, opportunity_score, elapsed_minutes, window
            ),
        );
        return false;
    }

    true
}

/// Whether re-entry on this asset is currently blocked
pub fn is_blocked(mint: &str, opportunity_score: f64) -> bool {
    is_blocked_at(mint, opportunity_score, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_mint(tag: &str) -> String {
        format!("cooldown-test-{}", tag)
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(TradeOutcome::classify(12.5), TradeOutcome::Profit);
        assert_eq!(TradeOutcome::classify(-8.0), TradeOutcome::Loss);
        assert_eq!(TradeOutcome::classify(0.4), TradeOutcome::Breakeven);
        assert_eq!(TradeOutcome::classify(-0.9), TradeOutcome::Breakeven);
    }

    #[test]
    fn test_loss_blocks_longer_than_profit() {
        let mint_loss = unique_mint("loss");
        let mint_profit = unique_mint("profit");
        let now = Utc::now();

        record_trade_result_at(&mint_loss, TradeOutcome::Loss, now);
        record_trade_result_at(&mint_profit, TradeOutcome::Profit, now);

        let later = now + Duration::minutes(PROFIT_COOLDOWN_MINUTES + 1);
        assert!(!is_blocked_at(&mint_profit, 0.0, later));
        assert!(is_blocked_at(&mint_loss, 0.0, later));
    }

    #[test]
    fn test_override_requires_all_conditions() {
        let mint = unique_mint("override");
        let now = Utc::now();
        record_trade_result_at(&mint, TradeOutcome::Breakeven, now);

        let elapsed = now + Duration::minutes(OVERRIDE_MIN_ELAPSED_MINUTES);

        // Score too low - still blocked
        assert!(is_blocked_at(&mint, OVERRIDE_SCORE_THRESHOLD - 1.0, elapsed));
        // Score clears the bar - override applies
        assert!(!is_blocked_at(&mint, OVERRIDE_SCORE_THRESHOLD, elapsed));
    }

    #[test]
    fn test_no_override_after_recent_loss() {
        let mint = unique_mint("recent-loss");
        let now = Utc::now();
        record_trade_result_at(&mint, TradeOutcome::Loss, now);

        let elapsed = now + Duration::minutes(OVERRIDE_MIN_ELAPSED_MINUTES + 5);
        assert!(is_blocked_at(&mint, 99.0, elapsed));
    }

    #[test]
    fn test_elapsed_window_evicts_lazily() {
        let mint = unique_mint("evict");
        let now = Utc::now();
        record_trade_result_at(&mint, TradeOutcome::Breakeven, now);

        let later = now + Duration::minutes(DEFAULT_COOLDOWN_MINUTES);
        assert!(!is_blocked_at(&mint, 0.0, later));
        assert!(!COOLDOWNS.read().contains_key(&mint));
    }

    #[test]
    fn test_record_updates_not_replaces() {
        let mint = unique_mint("counter");
        let now = Utc::now();

        record_trade_result_at(&mint, TradeOutcome::Loss, now);
        record_trade_result_at(&mint, TradeOutcome::Profit, now + Duration::minutes(1));

        let cooldowns = COOLDOWNS.read();
        let record = cooldowns.get(&mint).unwrap();
        assert_eq!(record.trades, 2);
        assert_eq!(record.outcome, TradeOutcome::Profit);
        // Loss history survives the profitable close
        assert!(record.last_loss.is_some());
    }
}
