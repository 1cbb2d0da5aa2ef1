/// Main swap interface - the operations the trading system actually calls
///
/// `buy_token` and `sell_token` wrap the full pipeline: balance gate, fresh
/// quote, balance re-verification, bounded submission retries, confirmation
/// polling. Sells walk a progressive slippage ladder with a fresh quote per
/// attempt; a quote is never reused after a failed execution.

use crate::balances::{self, has_sufficient_balance};
use crate::errors::SwapError;
use crate::global::{is_debug_swap_enabled, is_dry_run_enabled};
use crate::logger::{self, log, LogTag};

use super::client::{fetch_quote, poll_confirmation, submit_swap, ConfirmOutcome};
use super::config::{
    MIN_SLIPPAGE_PERCENT, QUOTE_SLIPPAGE_PERCENT, SELL_BALANCE_FACTOR, SELL_RETRY_SLIPPAGES,
    SOL_MINT, SUBMISSION_RETRY_ATTEMPTS, SUBMISSION_RETRY_BASE_DELAY_MS,
};
use super::retry::{with_retry, RetryPolicy};
use super::types::{SwapQuote, SwapResult};

const SUBMISSION_POLICY: RetryPolicy =
    RetryPolicy::new(SUBMISSION_RETRY_ATTEMPTS, SUBMISSION_RETRY_BASE_DELAY_MS);

fn slippage_to_bps(slippage_percent: f64) -> u64 {
    let clamped = if slippage_percent < MIN_SLIPPAGE_PERCENT {
        MIN_SLIPPAGE_PERCENT
    } else {
        slippage_percent
    };
    (clamped * 100.0) as u64
}

/// Obtain a single-use quote. The balance oracle is consulted first unless
/// the caller verified balance in the same logical operation.
pub async fn get_quote(
    input_mint: &str,
    output_mint: &str,
    amount_raw: u64,
    slippage_percent: f64,
    skip_balance_check: bool,
) -> Result<SwapQuote, SwapError> {
    if !skip_balance_check && !has_sufficient_balance(input_mint, amount_raw).await {
        let available = balances::get_token_balance(input_mint).await.unwrap_or(0);
        return Err(SwapError::InsufficientBalance {
            mint: input_mint.to_string(),
            required: amount_raw,
            available,
        });
    }

    fetch_quote(
        input_mint,
        output_mint,
        amount_raw,
        slippage_to_bps(slippage_percent),
    )
    .await
}

/// Execute a quote: re-verify balance against the quote's declared input,
/// submit with bounded retries, then poll for confirmation.
///
/// A submission retry is only issued when the prior attempt produced no
/// receipt signature - once a signature exists the instruction is considered
/// in flight and is never re-submitted.
pub async fn execute_quote(quote: &SwapQuote) -> Result<(String, ConfirmOutcome), SwapError> {
    // Balances can change between quote and execute
    if !has_sufficient_balance(&quote.input_mint, quote.in_amount).await {
        let available = balances::get_token_balance(&quote.input_mint)
            .await
            .unwrap_or(0);
        return Err(SwapError::InsufficientBalance {
            mint: quote.input_mint.clone(),
            required: quote.in_amount,
            available,
        });
    }

    if is_debug_swap_enabled() {
        logger::debug(LogTag::Swap, &format!("quote payload: {}", quote.payload));
    }

    let signature = with_retry(&SUBMISSION_POLICY, "submit_swap", |_attempt| {
        submit_swap(quote)
    })
    .await?;

    log(
        LogTag::Swap,
        "SUBMITTED",
        &format!(
            "{} -> {} for {} raw units: {}",
            quote.input_mint, quote.output_mint, quote.in_amount, signature
        ),
    );

    balances::invalidate_balance(&quote.input_mint);
    balances::invalidate_balance(&quote.output_mint);

    let outcome = poll_confirmation(&signature).await?;
    Ok((signature, outcome))
}

fn result_from_outcome(
    quote: &SwapQuote,
    signature: String,
    outcome: ConfirmOutcome,
) -> SwapResult {
    let effective_price = quote.price_lamports_per_unit(SOL_MINT).unwrap_or(0.0);

    match outcome {
        ConfirmOutcome::Confirmed => SwapResult {
            success: true,
            signature: Some(signature),
            input_mint: quote.input_mint.clone(),
            output_mint: quote.output_mint.clone(),
            input_amount: quote.in_amount,
            output_amount: quote.out_amount,
            effective_price,
            confirmed: true,
            error: None,
        },
        // Provisional success: the transfer may still land. Hand the receipt
        // back; the caller must not retry this instruction blindly.
        ConfirmOutcome::TimedOut => SwapResult {
            success: true,
            signature: Some(signature.clone()),
            input_mint: quote.input_mint.clone(),
            output_mint: quote.output_mint.clone(),
            input_amount: quote.in_amount,
            output_amount: quote.out_amount,
            effective_price,
            confirmed: false,
            error: Some(format!("confirmation timed out for {}", signature)),
        },
        ConfirmOutcome::Failed(reason) => {
            let mut result = SwapResult::failed(
                &quote.input_mint,
                &quote.output_mint,
                format!("transaction failed on-chain: {}", reason),
            );
            // The instruction did land, just with an error payload
            result.signature = Some(signature);
            result.confirmed = true;
            result
        }
    }
}

/// Buy `mint` with `sol_lamports` of SOL. A failed entry is returned as an
/// unsuccessful result or an error; the caller simply does not admit the
/// position and may retry on a later cycle.
pub async fn buy_token(mint: &str, sol_lamports: u64) -> Result<SwapResult, SwapError> {
    if is_dry_run_enabled() {
        return Err(SwapError::Config("dry-run mode - swaps disabled".to_string()));
    }

    log(
        LogTag::Swap,
        "BUY_START",
        &format!("buying {} with {} lamports", mint, sol_lamports),
    );

    let quote = get_quote(SOL_MINT, mint, sol_lamports, QUOTE_SLIPPAGE_PERCENT, false).await?;
    let (signature, outcome) = execute_quote(&quote).await?;
    let result = result_from_outcome(&quote, signature, outcome);

    if result.success {
        log(
            LogTag::Swap,
            "BUY_COMPLETE",
            &format!(
                "bought {} raw units of {} at {:.12} lamports/unit (confirmed: {})",
                result.output_amount, mint, result.effective_price, result.confirmed
            ),
        );
    } else {
        log(
            LogTag::Swap,
            "BUY_FAILED",
            &format!(
                "buy of {} failed: {}",
                mint,
                result.error.as_deref().unwrap_or("unknown")
            ),
        );
    }

    Ok(result)
}

/// Sell `mint` back to SOL. `amount_raw = None` means full exit: sell the
/// live on-chain balance times the safety factor, not the ledger's last-known
/// amount. Each ladder attempt re-quotes with wider slippage.
pub async fn sell_token(mint: &str, amount_raw: Option<u64>) -> Result<SwapResult, SwapError> {
    if is_dry_run_enabled() {
        return Err(SwapError::Config("dry-run mode - swaps disabled".to_string()));
    }

    let amount = match amount_raw {
        Some(amount) => amount,
        None => {
            let live = balances::get_live_token_balance(mint).await?;
            (live as f64 * SELL_BALANCE_FACTOR) as u64
        }
    };

    // The live read above succeeded; zero here is a confirmed chain fact,
    // not a failed check
    if amount == 0 {
        return Err(SwapError::NoBalance {
            mint: mint.to_string(),
        });
    }

    log(
        LogTag::Swap,
        "SELL_START",
        &format!("selling {} raw units of {}", amount, mint),
    );

    let mut last_error = SwapError::SubmissionFailed("sell not attempted".to_string());

    for (attempt, slippage) in SELL_RETRY_SLIPPAGES.iter().enumerate() {
        // Fresh quote per attempt; the first attempt gates on the balance
        // oracle, later ones already verified in this logical operation.
        let quote =
            match get_quote(mint, SOL_MINT, amount, *slippage, attempt > 0).await {
                Ok(quote) => quote,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    last_error = e;
                    continue;
                }
            };

        match execute_quote(&quote).await {
            Ok((signature, outcome)) => {
                if let ConfirmOutcome::Failed(reason) = &outcome {
                    // On-chain failure at this tolerance; widen and re-quote
                    log(
                        LogTag::Swap,
                        "SELL_RETRY",
                        &format!(
                            "sell of {} failed on-chain at {}% slippage: {}",
                            mint, slippage, reason
                        ),
                    );
                    last_error = SwapError::SubmissionFailed(reason.clone());
                    continue;
                }

                let result = result_from_outcome(&quote, signature, outcome);
                log(
                    LogTag::Swap,
                    "SELL_COMPLETE",
                    &format!(
                        "sold {} raw units of {} for {} lamports (confirmed: {})",
                        result.input_amount, mint, result.output_amount, result.confirmed
                    ),
                );
                return Ok(result);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                last_error = e;
            }
        }
    }

    log(
        LogTag::Swap,
        "SELL_FAILED",
        &format!("all sell attempts for {} exhausted: {}", mint, last_error),
    );
    Err(last_error)
}
