use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};

pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

// Startup timestamp used for trading logic and uptime reporting
pub static STARTUP_TIME: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

/// Check if dry-run mode is enabled via command line args.
/// In dry-run mode no swap is ever submitted; entries and exits are logged only.
pub fn is_dry_run_enabled() -> bool {
    if let Ok(args) = CMD_ARGS.lock() {
        args.contains(&"--dry-run".to_string())
    } else {
        false
    }
}

/// Check if swap debug mode is enabled via command line args
pub fn is_debug_swap_enabled() -> bool {
    if let Ok(args) = CMD_ARGS.lock() {
        args.contains(&"--debug-swap".to_string())
    } else {
        false
    }
}

/// Runtime configuration loaded from configs.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configs {
    /// Wallet public address (the settlement service executes for this account)
    pub wallet_address: String,
    /// JSON-RPC endpoint for balance and status reads
    pub rpc_url: String,
    /// Quote API base URL
    pub quote_api_url: String,
    /// Swap execution API base URL
    pub swap_api_url: String,
    /// API key authorizing execution for the wallet session
    pub api_key: String,

    // Engine tunables - defaults keep configs.json minimal
    #[serde(default = "default_trade_size_sol")]
    pub trade_size_sol: f64,
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    #[serde(default = "default_positions_check_secs")]
    pub positions_check_secs: u64,
    #[serde(default = "default_discovery_check_secs")]
    pub discovery_check_secs: u64,
}

fn default_trade_size_sol() -> f64 {
    0.01
}

fn default_max_open_positions() -> usize {
    5
}

fn default_positions_check_secs() -> u64 {
    30
}

fn default_discovery_check_secs() -> u64 {
    120
}

impl Default for Configs {
    fn default() -> Self {
        Self {
            wallet_address: String::new(),
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            quote_api_url: "https://lite-api.jup.ag/swap/v1".to_string(),
            swap_api_url: "https://lite-api.jup.ag/swap/v1".to_string(),
            api_key: String::new(),
            trade_size_sol: default_trade_size_sol(),
            max_open_positions: default_max_open_positions(),
            positions_check_secs: default_positions_check_secs(),
            discovery_check_secs: default_discovery_check_secs(),
        }
    }
}

pub static CONFIGS: Lazy<RwLock<Configs>> = Lazy::new(|| RwLock::new(Configs::default()));

/// Reads the configs.json file and returns a Configs object
pub fn read_configs<P: AsRef<Path>>(path: P) -> Result<Configs, Box<dyn std::error::Error>> {
    let data = fs::read_to_string(path)?;
    let configs: Configs = serde_json::from_str(&data)?;
    Ok(configs)
}

/// Load configs.json into the global CONFIGS. Called once at startup.
pub fn init_configs<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
    let configs = read_configs(path)?;
    if configs.wallet_address.is_empty() {
        return Err("configs.json: wallet_address must be set".into());
    }
    if let Ok(mut global) = CONFIGS.write() {
        *global = configs;
    }
    Ok(())
}

/// Snapshot of the current global configuration
pub fn get_configs() -> Configs {
    CONFIGS.read().map(|c| c.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configs_defaults_fill_missing_fields() {
        let json = r#"{
            "wallet_address": "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
            "rpc_url": "http://localhost:8899",
            "quote_api_url": "http://localhost:9000",
            "swap_api_url": "http://localhost:9000",
            "api_key": "test-key"
        }"#;

        let configs: Configs = serde_json::from_str(json).unwrap();
        assert_eq!(configs.trade_size_sol, 0.01);
        assert_eq!(configs.max_open_positions, 5);
        assert_eq!(configs.positions_check_secs, 30);
        assert_eq!(configs.discovery_check_secs, 120);
    }
}
