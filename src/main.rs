use std::sync::Arc;

use scalpbot::discovery::FileCandidateSource;
use scalpbot::events::{self, ConsoleSink, TradeLogSink};
use scalpbot::global::{get_configs, init_configs, is_dry_run_enabled, STARTUP_TIME};
use scalpbot::logger::{self, LogTag};
use scalpbot::rpc::init_rpc_client;
use scalpbot::trader;

const CONFIG_FILE: &str = "configs.json";
const CANDIDATES_FILE: &str = "data/candidates.json";
const TRADE_HISTORY_FILE: &str = "data/trade_history.jsonl";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    logger::info(LogTag::System, "scalpbot starting up");

    if let Err(e) = init_configs(CONFIG_FILE) {
        logger::error(LogTag::System, &format!("failed to load {}: {}", CONFIG_FILE, e));
        anyhow::bail!("configuration error: {}", e);
    }

    let configs = get_configs();
    init_rpc_client(&configs.rpc_url)?;

    if is_dry_run_enabled() {
        logger::warning(LogTag::System, "dry-run mode: no swaps will be submitted");
    }

    events::register_sink(Arc::new(ConsoleSink));
    events::register_sink(Arc::new(TradeLogSink::new(TRADE_HISTORY_FILE)));

    let source = Arc::new(FileCandidateSource::new(CANDIDATES_FILE));
    trader::start_trader(source)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let shutdown = trader::SHUTDOWN.clone();
    ctrlc::set_handler(move || {
        println!();
        shutdown.notify_waiters();
    })?;

    // Park until the signal handler fires, then stop the cycles cleanly
    trader::SHUTDOWN.notified().await;
    logger::info(LogTag::System, "shutdown requested, stopping supervisor");
    trader::stop_trader();

    // Give in-flight cycle bodies a moment to release the cycle lock
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let uptime_secs = chrono::Utc::now()
        .signed_duration_since(*STARTUP_TIME)
        .num_seconds();
    logger::info(
        LogTag::System,
        &format!("scalpbot stopped after {}s uptime", uptime_secs),
    );

    Ok(())
}
