//! JSON-RPC channel for balance and transaction status reads
//!
//! Thin client over the node's JSON-RPC endpoint. Every call passes through
//! the RPC channel limiter; a 429 response extends the channel cooldown and
//! surfaces as `SwapError::RateLimited`.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::errors::SwapError;
use crate::logger::{self, LogTag};
use crate::rate_limit::RPC_LIMITER;

const RPC_TIMEOUT_SECS: u64 = 30;
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64) as u64
}

/// Transaction status as reported by the chain
#[derive(Debug, Clone, PartialEq)]
pub enum TxStatus {
    /// Not yet visible or not yet confirmed
    Pending,
    Confirmed,
    /// Landed with an error payload
    Failed(String),
}

#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, SwapError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
            .build()
            .map_err(|e| SwapError::Config(format!("failed to build RPC client: {}", e)))?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SwapError> {
        RPC_LIMITER.acquire().await;

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SwapError::SubmissionFailed(format!("{} request failed: {}", method, e)))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            RPC_LIMITER.record_429().await;
            return Err(SwapError::RateLimited(format!("{} returned 429", method)));
        }

        if !response.status().is_success() {
            return Err(SwapError::Api(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| SwapError::Parse(format!("{} response not JSON: {}", method, e)))?;

        if let Some(err) = payload.get("error") {
            return Err(SwapError::Api(format!("{} error: {}", method, err)));
        }

        payload
            .get("result")
            .cloned()
            .ok_or_else(|| SwapError::Parse(format!("{} response missing result", method)))
    }

    /// Native balance of a wallet in lamports
    pub async fn get_sol_balance(&self, wallet: &str) -> Result<u64, SwapError> {
        let result = self.call("getBalance", json!([wallet])).await?;
        result
            .get("value")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| SwapError::Parse("getBalance missing value".to_string()))
    }

    /// Raw token balance of a wallet for one mint, summed over all of the
    /// wallet's token accounts for that mint.
    pub async fn get_token_balance(&self, wallet: &str, mint: &str) -> Result<u64, SwapError> {
        let result = self
            .call(
                "getTokenAccountsByOwner",
                json!([wallet, { "mint": mint }, { "encoding": "jsonParsed" }]),
            )
            .await?;

        let accounts = result
            .get("value")
            .and_then(|v| v.as_array())
            .ok_or_else(|| SwapError::Parse("getTokenAccountsByOwner missing value".to_string()))?;

        let mut total: u64 = 0;
        for account in accounts {
            let amount = account
                .pointer("/account/data/parsed/info/tokenAmount/amount")
                .and_then(|a| a.as_str())
                .and_then(|a| a.parse::<u64>().ok())
                .unwrap_or(0);
            total = total.saturating_add(amount);
        }

        logger::debug(
            LogTag::Rpc,
            &format!("token balance {} for {}: {} raw", mint, wallet, total),
        );

        Ok(total)
    }

    /// Status of a submitted transaction signature
    pub async fn get_signature_status(&self, signature: &str) -> Result<TxStatus, SwapError> {
        let result = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;

        let status = result.pointer("/value/0").cloned().unwrap_or(Value::Null);
        if status.is_null() {
            return Ok(TxStatus::Pending);
        }

        if let Some(err) = status.get("err") {
            if !err.is_null() {
                return Ok(TxStatus::Failed(err.to_string()));
            }
        }

        match status
            .get("confirmationStatus")
            .and_then(|s| s.as_str())
            .unwrap_or("")
        {
            "confirmed" | "finalized" => Ok(TxStatus::Confirmed),
            _ => Ok(TxStatus::Pending),
        }
    }
}

static RPC_CLIENT: Lazy<RwLock<Option<Arc<RpcClient>>>> = Lazy::new(|| RwLock::new(None));

/// Initialize the global RPC client from configuration. Called once at startup.
pub fn init_rpc_client(url: &str) -> Result<(), SwapError> {
    let client = Arc::new(RpcClient::new(url)?);
    *RPC_CLIENT.write() = Some(client);
    logger::info(LogTag::Rpc, &format!("RPC client initialized: {}", url));
    Ok(())
}

/// Global RPC client accessor
pub fn get_rpc_client() -> Result<Arc<RpcClient>, SwapError> {
    RPC_CLIENT
        .read()
        .clone()
        .ok_or_else(|| SwapError::Config("RPC client not initialized".to_string()))
}
