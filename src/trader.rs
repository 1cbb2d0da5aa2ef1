//! Position supervisor
//!
//! Owns the two periodic cycles: the position-check cycle (price each open
//! position, walk the exit rules, execute exits) and the discovery cycle
//! (admit new positions from the screener's candidate list). Both cycles
//! mutate the ledger, so both run under one cycle lock and never interleave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep, Duration};

use crate::balances;
use crate::cooldown::{self, TradeOutcome};
use crate::discovery::{Candidate, CandidateSource};
use crate::errors::SwapError;
use crate::events::{self, PositionEvent};
use crate::global::{get_configs, is_dry_run_enabled};
use crate::logger::{self, log, LogTag};
use crate::positions::{Ledger, Position, LEDGER, POSITIONS_FILE};
use crate::rpc::sol_to_lamports;
use crate::strategy::{self, PositionAction, SELL_LEVELS};
use crate::swaps::config::{MIN_TRADING_LAMPORTS, QUOTE_SLIPPAGE_PERCENT, SOL_MINT};
use crate::swaps::{buy_token, get_quote, sell_token};

/// Pause between positions inside one check cycle, keeps quote traffic smooth
const INTER_POSITION_DELAY_MS: u64 = 500;

/// Pause after each admission before considering the next candidate
const ADMISSION_DELAY_MS: u64 = 2000;

/// Serializes the position-check and discovery cycles. Every ledger-mutating
/// cycle body holds this for its full duration.
static CYCLE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

static TRADER_RUNNING: AtomicBool = AtomicBool::new(false);

/// Shutdown signal shared with the binary's signal handler
pub static SHUTDOWN: Lazy<Arc<Notify>> = Lazy::new(|| Arc::new(Notify::new()));

pub fn is_trader_running() -> bool {
    TRADER_RUNNING.load(Ordering::SeqCst)
}

/// Stop both cycles. Safe to call from a signal handler context.
pub fn stop_trader() {
    TRADER_RUNNING.store(false, Ordering::SeqCst);
    SHUTDOWN.notify_waiters();
}

/// Start the supervisor: reconcile the persisted ledger against live
/// balances, then spawn the two cycle loops.
pub async fn start_trader(source: Arc<dyn CandidateSource>) -> Result<(), String> {
    if TRADER_RUNNING.swap(true, Ordering::SeqCst) {
        return Err("trader already running".to_string());
    }

    reconcile_positions_on_startup().await;

    let configs = get_configs();
    log(
        LogTag::Trader,
        "START",
        &format!(
            "supervisor up: check every {}s, discovery every {}s, max {} positions{}",
            configs.positions_check_secs,
            configs.discovery_check_secs,
            configs.max_open_positions,
            if is_dry_run_enabled() { " [DRY RUN]" } else { "" }
        ),
    );

    tokio::spawn(position_check_loop());
    tokio::spawn(discovery_loop(source));

    Ok(())
}

/// Rebuild the in-memory ledger from disk, trusting live balances over the
/// persisted amounts. Entries whose live balance is at or below dust are
/// dropped; remaining amounts are clamped down, never up.
pub async fn reconcile_positions_on_startup() {
    let loaded = Ledger::load(POSITIONS_FILE);
    let mut reconciled = Ledger::new(Some(POSITIONS_FILE.into()));

    for mint in loaded.mints() {
        let Some(mut position) = loaded.get(&mint) else {
            continue;
        };

        match balances::get_live_token_balance(&mint).await {
            Ok(live) => {
                if live <= position.dust_floor() {
                    log(
                        LogTag::Trader,
                        "RECONCILE",
                        &format!(
                            "dropping {} - live balance {} at or below dust floor {}",
                            mint,
                            live,
                            position.dust_floor()
                        ),
                    );
                    continue;
                }
                if live < position.amount_remaining {
                    log(
                        LogTag::Trader,
                        "RECONCILE",
                        &format!(
                            "clamping {} remaining {} -> live {}",
                            mint, position.amount_remaining, live
                        ),
                    );
                    position.amount_remaining = live;
                }
            }
            Err(e) => {
                // Chain unreadable right now: keep the persisted amount and
                // let a later cycle sort it out
                logger::warning(
                    LogTag::Trader,
                    &format!("could not verify balance for {}: {}", mint, e),
                );
            }
        }

        // Capacity was enforced when the position was admitted; pass the
        // current count so a lowered config cap cannot orphan entries
        let max = reconciled.len() + 1;
        if let Err(e) = reconciled.insert(position, max) {
            logger::error(LogTag::Trader, &format!("reconcile insert failed: {}", e));
        }
    }

    log(
        LogTag::Trader,
        "RECONCILE",
        &format!("{} positions survive reconciliation", reconciled.len()),
    );

    *LEDGER.lock().await = reconciled;
}

async fn position_check_loop() {
    let interval_secs = get_configs().positions_check_secs;

    loop {
        tokio::select! {
            _ = SHUTDOWN.notified() => break,
            _ = sleep(Duration::from_secs(interval_secs)) => {}
        }
        if !is_trader_running() {
            break;
        }
        run_position_check_cycle().await;
    }

    logger::info(LogTag::Trader, "position check loop stopped");
}

async fn discovery_loop(source: Arc<dyn CandidateSource>) {
    let interval_secs = get_configs().discovery_check_secs;

    loop {
        tokio::select! {
            _ = SHUTDOWN.notified() => break,
            _ = sleep(Duration::from_secs(interval_secs)) => {}
        }
        if !is_trader_running() {
            break;
        }
        run_admission_cycle(source.as_ref()).await;
    }

    logger::info(LogTag::Trader, "discovery loop stopped");
}

/// One pass over every open position in stable mint order
async fn run_position_check_cycle() {
    let _cycle = CYCLE_LOCK.lock().await;

    let mints = LEDGER.lock().await.mints();
    if mints.is_empty() {
        return;
    }

    logger::debug(
        LogTag::Trader,
        &format!("checking {} open positions", mints.len()),
    );

    for (i, mint) in mints.iter().enumerate() {
        if !is_trader_running() {
            break;
        }
        process_position(mint).await;
        if i + 1 < mints.len() {
            sleep(Duration::from_millis(INTER_POSITION_DELAY_MS)).await;
        }
    }
}

/// Price one position and act on it. Several levels can become due on the
/// same tick (a straight jump past multiple triggers), so the evaluation
/// re-runs after each partial exit until the action is Hold or an exit fails.
async fn process_position(mint: &str) {
    // One re-evaluation per level plus a final full-exit check bounds the loop
    for _pass in 0..=SELL_LEVELS.len() {
        let Some(position) = LEDGER.lock().await.get(mint) else {
            return;
        };

        let price = match read_current_price(&position).await {
            Ok(price) => price,
            Err(e) => {
                logger::warning(
                    LogTag::Position,
                    &format!("no price for {} this tick: {}", mint, e),
                );
                return;
            }
        };

        LEDGER.lock().await.apply(mint, |p| p.update_tracking(price));

        // Re-read so the evaluation sees the updated high-water mark
        let Some(position) = LEDGER.lock().await.get(mint) else {
            return;
        };

        let gain = position.gain_percent(price);
        logger::debug(
            LogTag::Position,
            &format!(
                "{} at {:.12} ({:+.2}%, high {:+.2}%, {} raw left)",
                mint, price, gain, position.high_water_gain_percent, position.amount_remaining
            ),
        );

        match strategy::evaluate_position(&position, price, Utc::now()) {
            PositionAction::Hold => return,
            PositionAction::SellAll { reason } => {
                execute_full_exit(mint, &reason).await;
                return;
            }
            PositionAction::SellLevel {
                level,
                fraction_percent,
                reason,
            } => {
                if !execute_level_exit(&position, level, fraction_percent, &reason).await {
                    return;
                }
                // Loop again: the next level may already be due, or the
                // remainder may now be dust
            }
        }
    }
}

/// Current price in lamports per raw unit, read through a sell-direction
/// quote for the position's remaining amount. No balance gate - this is a
/// read, not a trade.
async fn read_current_price(position: &Position) -> Result<f64, SwapError> {
    let quote = get_quote(
        &position.mint,
        SOL_MINT,
        position.amount_remaining.max(1),
        QUOTE_SLIPPAGE_PERCENT,
        true,
    )
    .await?;
    quote
        .price_lamports_per_unit(SOL_MINT)
        .ok_or_else(|| SwapError::Parse(format!("quote for {} carries no price", position.mint)))
}

/// Full exit: sell the live balance and close the position. A failed sell
/// leaves the position open for the next cycle.
async fn execute_full_exit(mint: &str, reason: &str) {
    log(LogTag::Position, "EXIT", &format!("{}: {}", mint, reason));

    match sell_token(mint, None).await {
        Ok(result) if result.success => {
            let Some(mut position) = LEDGER.lock().await.remove(mint) else {
                return;
            };
            position.amount_remaining = 0;
            position.total_proceeds_lamports = position
                .total_proceeds_lamports
                .saturating_add(result.output_amount);

            finalize_close(position, reason);
        }
        Ok(result) => {
            logger::warning(
                LogTag::Position,
                &format!(
                    "exit of {} did not land ({}), position stays open",
                    mint,
                    result.error.as_deref().unwrap_or("unknown")
                ),
            );
        }
        Err(e) if exit_failure_closes_books(&e) => {
            // A live read confirmed nothing left to sell: the holding left
            // the wallet outside this process, or an earlier unconfirmed
            // exit landed after all. Close the books with what was collected.
            if let Some(position) = LEDGER.lock().await.remove(mint) {
                finalize_close(position, reason);
            }
        }
        Err(e) => {
            logger::error(
                LogTag::Position,
                &format!("exit of {} failed ({}), position stays open", mint, e),
            );
        }
    }
}

/// A failed full exit closes the books only when a live balance read
/// confirmed zero units on chain. Failed or stale balance checks (including
/// `InsufficientBalance` with a zero fallback) keep the position open.
fn exit_failure_closes_books(error: &SwapError) -> bool {
    matches!(error, SwapError::NoBalance { .. })
}

/// Partial exit for one take-profit level. Returns true when the level
/// executed and booked; the level cursor only advances on success.
async fn execute_level_exit(
    position: &Position,
    level: usize,
    fraction_percent: f64,
    reason: &str,
) -> bool {
    let amount = strategy::partial_sell_amount(position.amount_remaining, fraction_percent);
    if amount == 0 {
        return false;
    }

    log(
        LogTag::Position,
        "LEVEL",
        &format!(
            "{}: {} - selling {} of {} raw units",
            position.mint, reason, amount, position.amount_remaining
        ),
    );

    let result = match sell_token(&position.mint, Some(amount)).await {
        Ok(result) if result.success => result,
        Ok(result) => {
            logger::warning(
                LogTag::Position,
                &format!(
                    "level {} sell for {} did not land: {}",
                    level + 1,
                    position.mint,
                    result.error.as_deref().unwrap_or("unknown")
                ),
            );
            return false;
        }
        Err(e) => {
            logger::warning(
                LogTag::Position,
                &format!("level {} sell for {} failed: {}", level + 1, position.mint, e),
            );
            return false;
        }
    };

    let gain = position.gain_percent(result.effective_price);

    let booked = LEDGER.lock().await.apply(&position.mint, |p| {
        p.record_level_exit(result.input_amount, result.output_amount);
    });
    if !booked {
        return false;
    }

    let Some(updated) = LEDGER.lock().await.get(&position.mint) else {
        return false;
    };

    events::emit(PositionEvent::PartialExit {
        mint: position.mint.clone(),
        level: level + 1,
        proceeds_lamports: result.output_amount,
        gain_percent: gain,
        remaining_raw: updated.amount_remaining,
        timestamp: Utc::now(),
    });

    // Partial exits can shave the remainder down to dust; that closes the
    // position without another swap
    if updated.is_dust() {
        if let Some(position) = LEDGER.lock().await.remove(&position.mint) {
            finalize_close(position, &format!("sell_levels_complete({:+.2}%)", gain));
        }
        return false;
    }

    true
}

/// Closing bookkeeping shared by every exit path: cooldown record and the
/// Closed event. The position is already out of the ledger.
fn finalize_close(position: Position, reason: &str) {
    let total_gain = position.total_gain_percent();
    let outcome = TradeOutcome::classify(total_gain);
    cooldown::record_trade_result(&position.mint, outcome);

    log(
        LogTag::Position,
        "CLOSED",
        &format!(
            "{} [{}] proceeds {} lamports ({:+.2}%)",
            position.mint, reason, position.total_proceeds_lamports, total_gain
        ),
    );

    events::emit(PositionEvent::Closed {
        mint: position.mint.clone(),
        reason: reason.to_string(),
        total_proceeds_lamports: position.total_proceeds_lamports,
        total_gain_percent: total_gain,
        hold_secs: position.hold_secs(Utc::now()),
        timestamp: Utc::now(),
    });
}

/// Candidates that pass the admission gates, in rank order, capped at the
/// number of free slots. Pure filtering; no network.
fn select_admissible(candidates: Vec<Candidate>, ledger: &Ledger, slots: usize) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| {
            if ledger.contains(&c.mint) {
                return false;
            }
            if cooldown::is_blocked(&c.mint, c.opportunity_score) {
                logger::debug(
                    LogTag::Trader,
                    &format!("{} skipped: re-entry cooldown", c.mint),
                );
                return false;
            }
            true
        })
        .take(slots)
        .collect()
}

/// One admission pass: fetch the candidate list, filter, and open positions
/// until the free slots are used up.
async fn run_admission_cycle(source: &dyn CandidateSource) {
    let _cycle = CYCLE_LOCK.lock().await;

    let candidates = match source.fetch_candidates().await {
        Ok(candidates) => candidates,
        Err(e) => {
            logger::warning(LogTag::Discovery, &format!("candidate fetch failed: {}", e));
            return;
        }
    };
    if candidates.is_empty() {
        return;
    }

    let configs = get_configs();
    let admissible = {
        let ledger = LEDGER.lock().await;
        let slots = configs.max_open_positions.saturating_sub(ledger.len());
        if slots == 0 {
            return;
        }
        select_admissible(candidates, &ledger, slots)
    };

    for (i, candidate) in admissible.iter().enumerate() {
        if !is_trader_running() {
            break;
        }
        if open_position(candidate, configs.max_open_positions).await && i + 1 < admissible.len() {
            sleep(Duration::from_millis(ADMISSION_DELAY_MS)).await;
        }
    }
}

/// Buy the candidate and admit it to the ledger. A failed entry is simply
/// not admitted; the candidate may come around again next cycle.
async fn open_position(candidate: &Candidate, max_open: usize) -> bool {
    if is_dry_run_enabled() {
        logger::info(
            LogTag::Trader,
            &format!(
                "DRY RUN: would open {} (score {:.1})",
                candidate.mint, candidate.opportunity_score
            ),
        );
        return false;
    }

    let stake_lamports = sol_to_lamports(get_configs().trade_size_sol);
    if stake_lamports < MIN_TRADING_LAMPORTS {
        logger::error(
            LogTag::Trader,
            &format!(
                "trade_size_sol too small: {} lamports is below the {} floor",
                stake_lamports, MIN_TRADING_LAMPORTS
            ),
        );
        return false;
    }

    let result = match buy_token(&candidate.mint, stake_lamports).await {
        Ok(result) if result.success && result.output_amount > 0 => result,
        Ok(result) => {
            logger::warning(
                LogTag::Trader,
                &format!(
                    "entry for {} did not land: {}",
                    candidate.mint,
                    result.error.as_deref().unwrap_or("unknown")
                ),
            );
            return false;
        }
        Err(e) => {
            logger::warning(
                LogTag::Trader,
                &format!("entry for {} failed: {}", candidate.mint, e),
            );
            return false;
        }
    };

    let position = Position::new(
        &candidate.mint,
        &candidate.symbol,
        result.effective_price,
        result.output_amount,
        result.input_amount,
        result.signature.as_deref().unwrap_or(""),
    );

    let admitted = {
        let mut ledger = LEDGER.lock().await;
        ledger.insert(position.clone(), max_open)
    };
    if let Err(e) = admitted {
        // Should not happen - slots were counted under the same cycle lock
        logger::error(
            LogTag::Trader,
            &format!("bought {} but could not admit it: {}", candidate.mint, e),
        );
        return false;
    }

    log(
        LogTag::Trader,
        "OPENED",
        &format!(
            "{} ({}): {} raw units at {:.12} lamports/unit",
            candidate.mint, candidate.symbol, position.entry_amount, position.entry_price
        ),
    );

    events::emit(PositionEvent::Opened {
        mint: position.mint,
        symbol: position.symbol,
        entry_price: position.entry_price,
        entry_amount: position.entry_amount,
        stake_lamports: position.stake_lamports,
        signature: position.entry_signature,
        timestamp: position.entry_time,
    });

    true
}
