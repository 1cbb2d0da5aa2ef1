//! Balance oracle - cached wallet balance reads with bounded staleness
//!
//! All "do we hold enough of X" questions go through here. Reads are cached
//! per (wallet, mint) with a fixed TTL; live reads are retried with backoff
//! through the RPC channel limiter. The sufficiency check is fail-closed:
//! after exhausting attempts it answers false, never "balance is zero".

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::errors::SwapError;
use crate::global::get_configs;
use crate::logger::{self, LogTag};
use crate::rpc::get_rpc_client;
use crate::swaps::config::SOL_MINT;

/// Cache entry lifetime
pub const BALANCE_CACHE_TTL_SECS: i64 = 30;

/// Live read retry bound
const BALANCE_READ_ATTEMPTS: u32 = 3;
const BALANCE_RETRY_BASE_DELAY_MS: u64 = 400;

/// Lamports reserved for transaction fees when checking the native balance
pub const FEE_MARGIN_LAMPORTS: u64 = 5_000_000;

#[derive(Debug, Clone)]
struct CachedBalance {
    raw_amount: u64,
    fetched_at: DateTime<Utc>,
}

static BALANCE_CACHE: Lazy<RwLock<HashMap<(String, String), CachedBalance>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn cache_get(wallet: &str, mint: &str) -> Option<u64> {
    let cache = BALANCE_CACHE.read();
    let entry = cache.get(&(wallet.to_string(), mint.to_string()))?;
    let age = Utc::now()
        .signed_duration_since(entry.fetched_at)
        .num_seconds();
    if age < BALANCE_CACHE_TTL_SECS {
        Some(entry.raw_amount)
    } else {
        None
    }
}

fn cache_put(wallet: &str, mint: &str, raw_amount: u64) {
    let mut cache = BALANCE_CACHE.write();
    cache.insert(
        (wallet.to_string(), mint.to_string()),
        CachedBalance {
            raw_amount,
            fetched_at: Utc::now(),
        },
    );
}

/// Drop the cached balance for a mint, forcing the next read to go live.
/// Called after every executed swap touching that mint.
pub fn invalidate_balance(mint: &str) {
    let wallet = get_configs().wallet_address;
    let mut cache = BALANCE_CACHE.write();
    cache.remove(&(wallet.clone(), mint.to_string()));
    cache.remove(&(wallet, SOL_MINT.to_string()));
}

async fn read_live_balance(wallet: &str, mint: &str) -> Result<u64, SwapError> {
    let client = get_rpc_client()?;
    let mut last_error = SwapError::Api("balance read not attempted".to_string());

    for attempt in 1..=BALANCE_READ_ATTEMPTS {
        let result = if mint == SOL_MINT {
            client.get_sol_balance(wallet).await
        } else {
            client.get_token_balance(wallet, mint).await
        };

        match result {
            Ok(raw_amount) => {
                cache_put(wallet, mint, raw_amount);
                return Ok(raw_amount);
            }
            Err(e) => {
                // A rate limited read already put the channel into cooldown;
                // the next acquire waits it out. Transient errors back off.
                logger::warning(
                    LogTag::Wallet,
                    &format!(
                        "balance read {} attempt {}/{} failed: {}",
                        mint, attempt, BALANCE_READ_ATTEMPTS, e
                    ),
                );
                last_error = e;
                if attempt < BALANCE_READ_ATTEMPTS {
                    let delay = BALANCE_RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
            }
        }
    }

    Err(last_error)
}

/// Raw balance of the configured wallet for a mint, served from cache while
/// fresh. Failed live reads do not evict a still-valid cache entry.
pub async fn get_token_balance(mint: &str) -> Result<u64, SwapError> {
    let wallet = get_configs().wallet_address;

    if let Some(raw_amount) = cache_get(&wallet, mint) {
        logger::verbose(
            LogTag::Wallet,
            &format!("balance cache hit for {}: {} raw", mint, raw_amount),
        );
        return Ok(raw_amount);
    }

    read_live_balance(&wallet, mint).await
}

/// Raw balance bypassing the cache. Full exits use this so the amount sold
/// tracks the real chain state, not the ledger's bookkeeping.
pub async fn get_live_token_balance(mint: &str) -> Result<u64, SwapError> {
    let wallet = get_configs().wallet_address;
    read_live_balance(&wallet, mint).await
}

/// Required amount for a mint once the fee margin is applied
fn required_with_margin(mint: &str, required_raw: u64) -> u64 {
    if mint == SOL_MINT {
        required_raw.saturating_add(FEE_MARGIN_LAMPORTS)
    } else {
        required_raw
    }
}

/// Fail-closed sufficiency check. A `false` answer means "do not proceed",
/// not "the balance is zero" - reads can fail while funds exist.
pub async fn has_sufficient_balance(mint: &str, required_raw: u64) -> bool {
    match get_token_balance(mint).await {
        Ok(available) => available >= required_with_margin(mint, required_raw),
        Err(e) => {
            logger::warning(
                LogTag::Wallet,
                &format!("treating {} as insufficient after failed reads: {}", mint, e),
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    #[test]
    fn test_cache_serves_within_ttl() {
        cache_put("wallet-a", TEST_MINT, 12345);
        assert_eq!(cache_get("wallet-a", TEST_MINT), Some(12345));
        // Different key misses
        assert_eq!(cache_get("wallet-b", TEST_MINT), None);
    }

    #[test]
    fn test_cache_expires_after_ttl() {
        let key = ("wallet-c".to_string(), TEST_MINT.to_string());
        BALANCE_CACHE.write().insert(
            key,
            CachedBalance {
                raw_amount: 999,
                fetched_at: Utc::now() - chrono::Duration::seconds(BALANCE_CACHE_TTL_SECS + 1),
            },
        );
        assert_eq!(cache_get("wallet-c", TEST_MINT), None);
    }

    /// Two reads for the same (wallet, mint) inside the TTL must hit the
    /// upstream exactly once. The stub server counts incoming requests.
    #[tokio::test]
    async fn test_warm_cache_issues_exactly_one_live_read() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        const BODY: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"value":[{"account":{"data":{"parsed":{"info":{"tokenAmount":{"amount":"777"}}}}}}]}}"#;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let reads = Arc::new(AtomicU32::new(0));

        let counter = reads.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = vec![0u8; 8192];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    BODY.len(),
                    BODY
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        crate::rpc::init_rpc_client(&format!("http://{}", addr)).unwrap();
        if let Ok(mut configs) = crate::global::CONFIGS.write() {
            configs.wallet_address = "balance-cache-test-wallet".to_string();
        }

        let mint = "BalCacheMint111111111111111111111111111111";
        assert_eq!(get_token_balance(mint).await.unwrap(), 777);
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        // Second call inside the TTL is served from cache - zero new requests
        assert_eq!(get_token_balance(mint).await.unwrap(), 777);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fee_margin_only_on_native() {
        assert_eq!(
            required_with_margin(SOL_MINT, 1_000_000),
            1_000_000 + FEE_MARGIN_LAMPORTS
        );
        assert_eq!(required_with_margin(TEST_MINT, 1_000_000), 1_000_000);
    }
}
