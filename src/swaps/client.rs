//! HTTP client for the upstream quote/settlement service
//!
//! Wire operations only: fetch a quote, submit an execution for the
//! authorized wallet session, poll a receipt's status. All calls pass through
//! the swap channel limiter (status polls ride the RPC channel inside
//! `rpc::get_signature_status`). Error classification happens here so the
//! retry policy can tell fatal from transient.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::errors::SwapError;
use crate::global::get_configs;
use crate::logger::{self, LogTag};
use crate::rate_limit::SWAP_LIMITER;
use crate::rpc::{get_rpc_client, TxStatus};

use super::config::{
    API_TIMEOUT_SECS, CONFIRMATION_MAX_ATTEMPTS, CONFIRMATION_RETRY_DELAY_MS, QUOTE_TIMEOUT_SECS,
};
use super::types::SwapQuote;

static HTTP: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// Terminal outcome of confirmation polling
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Confirmed,
    /// Landed on chain with an error payload
    Failed(String),
    /// Polling budget exhausted without a definitive answer
    TimedOut,
}

/// Fetch a fresh quote for swapping `amount` raw units of `input_mint` into
/// `output_mint`. The returned quote is single-use.
pub async fn fetch_quote(
    input_mint: &str,
    output_mint: &str,
    amount: u64,
    slippage_bps: u64,
) -> Result<SwapQuote, SwapError> {
    SWAP_LIMITER.acquire().await;

    let configs = get_configs();
    let url = format!("{}/quote", configs.quote_api_url);

    let response = HTTP
        .get(&url)
        .timeout(Duration::from_secs(QUOTE_TIMEOUT_SECS))
        .query(&[
            ("inputMint", input_mint),
            ("outputMint", output_mint),
            ("amount", &amount.to_string()),
            ("slippageBps", &slippage_bps.to_string()),
            ("swapMode", "ExactIn"),
        ])
        .send()
        .await
        .map_err(|e| SwapError::Api(format!("quote request failed: {}", e)))?;

    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        SWAP_LIMITER.record_429().await;
        return Err(SwapError::RateLimited("quote returned 429".to_string()));
    }

    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| SwapError::Parse(format!("quote response not JSON: {}", e)))?;

    if let Some(error) = extract_error_text(&payload) {
        if is_no_route_error(&error) {
            return Err(SwapError::NoRoute {
                mint: output_mint.to_string(),
            });
        }
        return Err(SwapError::Api(format!("quote error: {}", error)));
    }

    if !status.is_success() {
        return Err(SwapError::Api(format!("quote returned HTTP {}", status)));
    }

    SwapQuote::from_response(payload)
}

/// Submit an execution for a quote. Returns the receipt signature. The caller
/// owns retry policy; this function makes exactly one submission attempt.
pub async fn submit_swap(quote: &SwapQuote) -> Result<String, SwapError> {
    SWAP_LIMITER.acquire().await;

    let configs = get_configs();
    let url = format!("{}/execute", configs.swap_api_url);

    let body = json!({
        "quoteResponse": quote.payload,
        "wallet": configs.wallet_address,
        "apiKey": configs.api_key,
        "dynamicComputeUnitLimit": true,
    });

    let response = HTTP
        .post(&url)
        .timeout(Duration::from_secs(API_TIMEOUT_SECS))
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            if e.is_connect() {
                // The connection never came up; nothing reached the upstream
                SwapError::SubmissionFailed(format!("execute request failed: {}", e))
            } else {
                // The request may have gone out before the failure - a receipt
                // could exist, so this attempt must not be resubmitted
                SwapError::SubmissionUnverified(format!("execute response lost: {}", e))
            }
        })?;

    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        SWAP_LIMITER.record_429().await;
        return Err(SwapError::RateLimited("execute returned 429".to_string()));
    }

    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| {
            // The upstream answered but the body was unreadable; whether it
            // produced a receipt is unknown
            SwapError::SubmissionUnverified(format!("execute response not JSON: {}", e))
        })?;

    if let Some(error) = extract_error_text(&payload) {
        return Err(classify_execute_error(&error));
    }

    if !status.is_success() {
        return Err(SwapError::SubmissionFailed(format!(
            "execute returned HTTP {}",
            status
        )));
    }

    payload
        .get("signature")
        .or_else(|| payload.get("txid"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| SwapError::SubmissionFailed("execute response missing signature".to_string()))
}

/// Poll a receipt signature until confirmed, failed, or the polling budget
/// runs out. A timeout is not an error - the transfer may still land.
pub async fn poll_confirmation(signature: &str) -> Result<ConfirmOutcome, SwapError> {
    let client = get_rpc_client()?;

    for attempt in 1..=CONFIRMATION_MAX_ATTEMPTS {
        tokio::time::sleep(Duration::from_millis(CONFIRMATION_RETRY_DELAY_MS)).await;

        match client.get_signature_status(signature).await {
            Ok(TxStatus::Confirmed) => {
                logger::debug(
                    LogTag::Swap,
                    &format!("{} confirmed after {} polls", signature, attempt),
                );
                return Ok(ConfirmOutcome::Confirmed);
            }
            Ok(TxStatus::Failed(reason)) => {
                return Ok(ConfirmOutcome::Failed(reason));
            }
            Ok(TxStatus::Pending) => {}
            Err(e) => {
                // Status read failures burn a poll but never abort the wait
                logger::debug(
                    LogTag::Swap,
                    &format!("status poll {}/{} failed: {}", attempt, CONFIRMATION_MAX_ATTEMPTS, e),
                );
            }
        }
    }

    Ok(ConfirmOutcome::TimedOut)
}

fn extract_error_text(payload: &Value) -> Option<String> {
    payload
        .get("error")
        .or_else(|| payload.get("errorCode"))
        .filter(|v| !v.is_null())
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
}

fn is_no_route_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("no route")
        || lower.contains("could_not_find_any_route")
        || lower.contains("no liquidity")
}

/// Map an execute-stage error payload into the taxonomy. Insufficient-funds
/// and simulation rejections are fatal; everything else is transient.
fn classify_execute_error(error: &str) -> SwapError {
    let lower = error.to_lowercase();

    if lower.contains("insufficient") {
        return SwapError::InsufficientBalance {
            mint: String::new(),
            required: 0,
            available: 0,
        };
    }
    if lower.contains("simulation") || lower.contains("slippage tolerance exceeded") {
        return SwapError::SimulationRejected(error.to_string());
    }
    if lower.contains("rate limit") || lower.contains("429") {
        return SwapError::RateLimited(error.to_string());
    }

    SwapError::SubmissionFailed(error.to_string())
}
