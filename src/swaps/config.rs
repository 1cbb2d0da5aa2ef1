/// Gateway configuration - hardcoded parameters for quoting, execution and
/// confirmation. Values are tuned, not derived; change with care.

// =============================================================================
// COMMON CONFIGURATION
// =============================================================================

/// SOL token mint address (native/base asset)
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Quote request timeout (seconds)
pub const QUOTE_TIMEOUT_SECS: u64 = 15;

/// Execution/API request timeout (seconds)
pub const API_TIMEOUT_SECS: u64 = 30;

/// Submission retry attempts for transient failures
pub const SUBMISSION_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between submission retries (milliseconds)
pub const SUBMISSION_RETRY_BASE_DELAY_MS: u64 = 500;

// =============================================================================
// CONFIRMATION POLLING
// =============================================================================

/// Delay between confirmation status polls (milliseconds)
pub const CONFIRMATION_RETRY_DELAY_MS: u64 = 3000;

/// Maximum confirmation polls before the result becomes a provisional success
pub const CONFIRMATION_MAX_ATTEMPTS: u32 = 10;

// =============================================================================
// SLIPPAGE CONFIGURATION
// =============================================================================

/// Default slippage tolerance for quotes (percent)
pub const QUOTE_SLIPPAGE_PERCENT: f64 = 5.0;

/// Floor on requested slippage tolerance (percent). Tighter tolerances on
/// thin-liquidity assets cause spurious failures, so requests below the floor
/// are clamped up.
pub const MIN_SLIPPAGE_PERCENT: f64 = 1.0;

/// Sell retry slippage progression (percent, used when a sell fails and needs
/// retry): attempt 1 -> 15%, attempt 2 -> 25%, attempt 3 -> 35%, attempt 4 -> 50%
pub const SELL_RETRY_SLIPPAGES: [f64; 4] = [15.0, 25.0, 35.0, 50.0];

// =============================================================================
// EXECUTION SAFETY
// =============================================================================

/// Fraction of the live on-chain balance sold on a full exit. Slightly under
/// 100% so rounding drift between quote and chain state cannot fail the swap.
pub const SELL_BALANCE_FACTOR: f64 = 0.999;

/// Minimum trading amount in lamports (0.0005 SOL)
pub const MIN_TRADING_LAMPORTS: u64 = 500_000;
