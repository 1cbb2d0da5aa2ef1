/// Common swap structures and types used across the gateway
/// Shared data structures for quote and execution operations

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SwapError;

/// An ephemeral price quote. Valid only for the immediate next execute call -
/// never cached, never reused across retries. A failed execution re-quotes.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in raw units (lamports for SOL)
    pub in_amount: u64,
    /// Expected output amount in raw units
    pub out_amount: u64,
    pub slippage_bps: u64,
    /// Opaque routing payload forwarded verbatim to the execute endpoint
    pub payload: Value,
}

impl SwapQuote {
    /// Parse a quote API response. Amounts arrive as decimal strings.
    pub fn from_response(payload: Value) -> Result<Self, SwapError> {
        let input_mint = payload
            .get("inputMint")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SwapError::Parse("quote missing inputMint".to_string()))?
            .to_string();
        let output_mint = payload
            .get("outputMint")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SwapError::Parse("quote missing outputMint".to_string()))?
            .to_string();
        let in_amount = parse_amount(&payload, "inAmount")?;
        let out_amount = parse_amount(&payload, "outAmount")?;
        let slippage_bps = payload
            .get("slippageBps")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        if out_amount == 0 {
            return Err(SwapError::NoRoute { mint: output_mint });
        }

        Ok(Self {
            input_mint,
            output_mint,
            in_amount,
            out_amount,
            slippage_bps,
            payload,
        })
    }

    /// Quoted price in lamports per raw token unit, independent of which side
    /// is SOL. Returns None for degenerate quotes.
    pub fn price_lamports_per_unit(&self, sol_mint: &str) -> Option<f64> {
        if self.input_mint == sol_mint && self.out_amount > 0 {
            Some(self.in_amount as f64 / self.out_amount as f64)
        } else if self.output_mint == sol_mint && self.in_amount > 0 {
            Some(self.out_amount as f64 / self.in_amount as f64)
        } else {
            None
        }
    }
}

fn parse_amount(payload: &Value, field: &str) -> Result<u64, SwapError> {
    let value = payload
        .get(field)
        .ok_or_else(|| SwapError::Parse(format!("quote missing {}", field)))?;

    // Some API versions send numbers, most send strings
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    value
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| SwapError::Parse(format!("quote field {} not a valid amount", field)))
}

/// Final outcome of a buy or sell driven through the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResult {
    pub success: bool,
    /// Receipt signature, present whenever submission succeeded
    pub signature: Option<String>,
    pub input_mint: String,
    pub output_mint: String,
    /// Raw units actually committed on the input side
    pub input_amount: u64,
    /// Raw units expected on the output side (quoted; chain may differ inside
    /// the slippage tolerance)
    pub output_amount: u64,
    /// Lamports per raw token unit at execution
    pub effective_price: f64,
    /// False when confirmation timed out - a provisional success. The transfer
    /// may still land; the signature is kept for operator follow-up.
    pub confirmed: bool,
    pub error: Option<String>,
}

impl SwapResult {
    pub fn failed(input_mint: &str, output_mint: &str, error: String) -> Self {
        Self {
            success: false,
            signature: None,
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            input_amount: 0,
            output_amount: 0,
            effective_price: 0.0,
            confirmed: false,
            error: Some(error),
        }
    }
}
