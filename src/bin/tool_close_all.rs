//! Close every open position immediately.
//!
//! Operator escape hatch: loads the persisted ledger, reconciles it against
//! live balances, then market-sells each remaining position through the
//! normal sell ladder. Run with --dry-run to only print what would be sold.
//!
//! Usage: cargo run --bin tool_close_all [-- --dry-run]

use scalpbot::global::{get_configs, init_configs, is_dry_run_enabled};
use scalpbot::logger::{self, LogTag};
use scalpbot::positions::LEDGER;
use scalpbot::rpc::{init_rpc_client, lamports_to_sol};
use scalpbot::swaps::sell_token;
use scalpbot::trader::reconcile_positions_on_startup;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    logger::info(LogTag::System, "close-all tool starting");

    init_configs("configs.json").map_err(|e| anyhow::anyhow!("configuration error: {}", e))?;
    init_rpc_client(&get_configs().rpc_url)?;

    reconcile_positions_on_startup().await;

    let positions: Vec<_> = {
        let ledger = LEDGER.lock().await;
        ledger.mints().iter().filter_map(|m| ledger.get(m)).collect()
    };

    if positions.is_empty() {
        println!("no open positions");
        return Ok(());
    }

    println!("{} open positions to close", positions.len());

    let mut closed = 0usize;
    let mut failed = 0usize;

    for position in positions {
        if is_dry_run_enabled() {
            println!(
                "DRY RUN: would sell {} raw units of {} ({})",
                position.amount_remaining, position.mint, position.symbol
            );
            continue;
        }

        match sell_token(&position.mint, None).await {
            Ok(result) if result.success => {
                LEDGER.lock().await.remove(&position.mint);
                closed += 1;
                println!(
                    "closed {} for {:.4} SOL (confirmed: {})",
                    position.mint,
                    lamports_to_sol(result.output_amount),
                    result.confirmed
                );
            }
            Ok(result) => {
                failed += 1;
                println!(
                    "FAILED {}: {}",
                    position.mint,
                    result.error.as_deref().unwrap_or("unknown")
                );
            }
            Err(e) => {
                failed += 1;
                println!("FAILED {}: {}", position.mint, e);
            }
        }
    }

    println!("done: {} closed, {} failed", closed, failed);
    Ok(())
}
