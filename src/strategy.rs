use chrono::{DateTime, Utc};

use crate::positions::Position;

// ═══════════════════════════════════════════════════════════════════════════════
// EXIT STRATEGY CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════
// Tuned thresholds. These are operating parameters, not derived values.

/// Full exit when loss from entry reaches this percent
pub const STOP_LOSS_PERCENT: f64 = 20.0;

/// Full exit when drawdown from the high-water price reaches this percent
/// (only armed once the position has been in profit)
pub const TRAILING_STOP_PERCENT: f64 = 15.0;

/// Stagnation exit: held longer than the window with price still inside the band
pub const STAGNATION_WINDOW_SECONDS: i64 = 3600; // 1 hour
pub const STAGNATION_BAND_PERCENT: f64 = 5.0;

/// Unconditional exit after this hold time regardless of price
pub const MAX_HOLD_TIME_SECONDS: i64 = 21600; // 6 hours

/// Staged take-profit rule: at `trigger_gain_percent` above entry, sell
/// `sell_fraction_percent` of the currently remaining amount.
#[derive(Debug, Clone, Copy)]
pub struct SellLevel {
    pub trigger_gain_percent: f64,
    pub sell_fraction_percent: f64,
}

/// Take-profit ladder, ascending trigger order. Each level fires once per
/// position, lowest first.
pub const SELL_LEVELS: [SellLevel; 3] = [
    SellLevel { trigger_gain_percent: 20.0, sell_fraction_percent: 50.0 },
    SellLevel { trigger_gain_percent: 75.0, sell_fraction_percent: 60.0 },
    SellLevel { trigger_gain_percent: 150.0, sell_fraction_percent: 100.0 },
];

/// What to do with a position on this tick
#[derive(Debug, Clone, PartialEq)]
pub enum PositionAction {
    Hold,
    /// Full exit - sell the entire live balance
    SellAll { reason: String },
    /// Partial exit for one take-profit level
    SellLevel {
        level: usize,
        fraction_percent: f64,
        reason: String,
    },
}

/// Evaluate one position against the exit rules. First matching rule wins;
/// the order here is the rule precedence and must not be reshuffled:
/// timeout, stop-loss, trailing-stop, stagnation, take-profit levels.
pub fn evaluate_position(
    position: &Position,
    current_price: f64,
    now: DateTime<Utc>,
) -> PositionAction {
    let gain = position.gain_percent(current_price);
    let held_secs = position.hold_secs(now);

    // Rule 1: absolute max hold time
    if held_secs >= MAX_HOLD_TIME_SECONDS {
        return PositionAction::SellAll {
            reason: format!("max_hold_time({:+.2}%)", gain),
        };
    }

    // Rule 2: stop loss from entry
    if gain <= -STOP_LOSS_PERCENT {
        return PositionAction::SellAll {
            reason: format!("stop_loss({:+.2}%)", gain),
        };
    }

    // Rule 3: trailing stop from the high-water mark, armed only after the
    // position has actually been in profit
    if position.high_water_gain_percent > 0.0
        && position.drawdown_from_high(current_price) >= TRAILING_STOP_PERCENT
    {
        return PositionAction::SellAll {
            reason: format!(
                "trailing_stop({:+.2}% from high {:+.2}%)",
                gain, position.high_water_gain_percent
            ),
        };
    }

    // Rule 4: stagnation - held past the window with price going nowhere
    if held_secs >= STAGNATION_WINDOW_SECONDS && gain.abs() < STAGNATION_BAND_PERCENT {
        return PositionAction::SellAll {
            reason: format!("stagnation({:+.2}%)", gain),
        };
    }

    // Rule 5: next eligible take-profit level. The cursor guarantees levels
    // fire in ascending trigger order, once each.
    if !position.is_dust() && position.levels_executed < SELL_LEVELS.len() {
        let level = SELL_LEVELS[position.levels_executed];
        if gain >= level.trigger_gain_percent {
            return PositionAction::SellLevel {
                level: position.levels_executed,
                fraction_percent: level.sell_fraction_percent,
                reason: format!(
                    "sell_level_{}({:+.2}%)",
                    position.levels_executed + 1,
                    gain
                ),
            };
        }
    }

    PositionAction::Hold
}

/// Raw units to sell for a partial exit, rounded down to an integer unit.
/// A zero result aborts the level without marking it executed.
pub fn partial_sell_amount(remaining_raw: u64, fraction_percent: f64) -> u64 {
    ((remaining_raw as f64) * fraction_percent / 100.0).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn position_at(entry_price: f64, held_secs: i64) -> Position {
        let mut position = Position::new(
            "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
            "TEST",
            entry_price,
            1_000_000,
            10_000_000,
            "sig",
        );
        position.entry_time = Utc::now() - Duration::seconds(held_secs);
        position
    }

    fn reason_of(action: PositionAction) -> String {
        match action {
            PositionAction::SellAll { reason } => reason,
            PositionAction::SellLevel { reason, .. } => reason,
            PositionAction::Hold => "hold".to_string(),
        }
    }

    #[test]
    fn test_stop_loss_fires_on_drop() {
        // Entry at 1.0, price drops to 0.79 - stop loss with no partials first
        let position = position_at(1.0, 60);
        let action = evaluate_position(&position, 0.79, Utc::now());
        assert!(reason_of(action).starts_with("stop_loss"));
    }

    #[test]
    fn test_stop_loss_beats_pending_levels() {
        let mut position = position_at(1.0, 60);
        // High water establishes level eligibility, then price collapses
        position.update_tracking(1.3);
        let action = evaluate_position(&position, 0.79, Utc::now());
        assert!(reason_of(action).starts_with("stop_loss"));
    }

    #[test]
    fn test_trailing_stop_fires_while_still_in_profit() {
        let mut position = position_at(1.0, 60);
        position.update_tracking(2.0); // +100% high water
        // Falls 20% from high but still +60% from entry
        let action = evaluate_position(&position, 1.6, Utc::now());
        assert!(reason_of(action).starts_with("trailing_stop"));
    }

    #[test]
    fn test_trailing_stop_unarmed_without_profit() {
        // Never profitable: high water stays at entry, drawdown rule is inert
        let position = position_at(1.0, 60);
        let action = evaluate_position(&position, 0.9, Utc::now());
        assert_eq!(action, PositionAction::Hold);
    }

    #[test]
    fn test_timeout_wins_over_stagnation() {
        // Oscillating within ±1% the whole window; at max hold the timeout
        // rule reports, not stagnation
        let position = position_at(1.0, MAX_HOLD_TIME_SECONDS + 1);
        let action = evaluate_position(&position, 1.005, Utc::now());
        assert!(reason_of(action).starts_with("max_hold_time"));
    }

    #[test]
    fn test_stagnation_exit_inside_band() {
        let position = position_at(1.0, STAGNATION_WINDOW_SECONDS + 1);
        let action = evaluate_position(&position, 1.02, Utc::now());
        assert!(reason_of(action).starts_with("stagnation"));
    }

    #[test]
    fn test_no_stagnation_outside_band() {
        let mut position = position_at(1.0, STAGNATION_WINDOW_SECONDS + 1);
        position.update_tracking(1.1);
        let action = evaluate_position(&position, 1.1, Utc::now());
        // +10% is outside the band; first level (20%) not reached either
        assert_eq!(action, PositionAction::Hold);
    }

    #[test]
    fn test_sell_level_walkthrough() {
        // Entry at 1.0 with levels 20%/50% and 75%/60%
        let mut position = position_at(1.0, 60);

        // Price 1.25: first level fires for 50% of remaining
        position.update_tracking(1.25);
        match evaluate_position(&position, 1.25, Utc::now()) {
            PositionAction::SellLevel { level, fraction_percent, .. } => {
                assert_eq!(level, 0);
                let amount = partial_sell_amount(position.amount_remaining, fraction_percent);
                assert_eq!(amount, 500_000);
                position.record_level_exit(amount, 12_500_000 / 2);
            }
            other => panic!("expected first level, got {:?}", other),
        }

        // Price 1.80 (+80%): second level fires for 60% of the new remaining,
        // i.e. 30% of the original amount
        position.update_tracking(1.8);
        match evaluate_position(&position, 1.8, Utc::now()) {
            PositionAction::SellLevel { level, fraction_percent, .. } => {
                assert_eq!(level, 1);
                let amount = partial_sell_amount(position.amount_remaining, fraction_percent);
                assert_eq!(amount, 300_000);
                position.record_level_exit(amount, 5_400_000);
            }
            other => panic!("expected second level, got {:?}", other),
        }

        // ~20% of the original stake stays open
        assert_eq!(position.amount_remaining, 200_000);
        assert_eq!(evaluate_position(&position, 1.8, Utc::now()), PositionAction::Hold);
    }

    #[test]
    fn test_levels_fire_in_ascending_order() {
        // A straight jump past both triggers still fires the lower level first
        let mut position = position_at(1.0, 60);
        position.update_tracking(1.9);
        match evaluate_position(&position, 1.9, Utc::now()) {
            PositionAction::SellLevel { level, .. } => assert_eq!(level, 0),
            other => panic!("expected level 0, got {:?}", other),
        }
    }

    #[test]
    fn test_levels_skip_at_dust() {
        let mut position = position_at(1.0, 60);
        position.amount_remaining = position.dust_floor();
        position.update_tracking(1.5);
        assert_eq!(evaluate_position(&position, 1.5, Utc::now()), PositionAction::Hold);
    }

    #[test]
    fn test_partial_sell_amount_rounds_down() {
        assert_eq!(partial_sell_amount(999, 50.0), 499);
        assert_eq!(partial_sell_amount(1, 50.0), 0);
        assert_eq!(partial_sell_amount(0, 100.0), 0);
    }
}
