//! Error taxonomy for the execution gateway
//!
//! Every upstream interaction (balance read, quote, execute, confirmation)
//! funnels its failures into `SwapError`. The split that matters operationally
//! is fatal vs transient: fatal classes abort a retry loop immediately,
//! transient classes are retried with backoff.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SwapError {
    /// Local balance check failed - no network call was attempted
    #[error("insufficient balance: need {required} raw units of {mint}, have {available}")]
    InsufficientBalance {
        mint: String,
        required: u64,
        available: u64,
    },

    /// A live balance read succeeded and showed nothing left to sell. Unlike
    /// `InsufficientBalance` this is a confirmed on-chain fact, not a failed
    /// or stale local check.
    #[error("wallet holds no units of {mint}")]
    NoBalance { mint: String },

    /// Upstream declared no viable route/liquidity for this pair
    #[error("no route available for {mint}")]
    NoRoute { mint: String },

    /// Upstream 429-class response
    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    /// Upstream rejected the swap before submission (simulation failure)
    #[error("simulation rejected: {0}")]
    SimulationRejected(String),

    /// Transient network/RPC error during submission. The request never
    /// reached the upstream, so resubmitting the same quote is safe.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// The execute call may have reached the upstream but no receipt could be
    /// read back (response lost or unreadable). Never retried - a receipt may
    /// already exist and resubmitting would double-spend the instruction.
    #[error("submission outcome unknown: {0}")]
    SubmissionUnverified(String),

    /// Submission succeeded but confirmation could not be verified in time.
    /// Carries the receipt signature - the transfer may still land.
    #[error("confirmation timed out for {signature}")]
    ConfirmationTimeout { signature: String },

    /// Generic upstream API error (unexpected payload, HTTP failure)
    #[error("api error: {0}")]
    Api(String),

    /// Configuration problem (missing file, bad wallet, bad endpoint)
    #[error("config error: {0}")]
    Config(String),

    /// Response payload could not be parsed
    #[error("parse error: {0}")]
    Parse(String),
}

impl SwapError {
    /// Fatal errors abort retry loops immediately; retrying them cannot
    /// succeed (or risks double-spending the same logical instruction).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SwapError::InsufficientBalance { .. }
                | SwapError::NoBalance { .. }
                | SwapError::SimulationRejected(_)
                | SwapError::SubmissionUnverified(_)
                | SwapError::NoRoute { .. }
                | SwapError::Config(_)
        )
    }

    /// Rate-limit errors get an extended wait instead of the normal backoff.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, SwapError::RateLimited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SwapError::SimulationRejected("slippage".to_string()).is_fatal());
        assert!(
            SwapError::InsufficientBalance {
                mint: "So11111111111111111111111111111111111111112".to_string(),
                required: 100,
                available: 50,
            }
            .is_fatal()
        );
        assert!(SwapError::NoRoute { mint: "abc".to_string() }.is_fatal());
        assert!(SwapError::NoBalance { mint: "abc".to_string() }.is_fatal());
        assert!(SwapError::SubmissionUnverified("response lost".to_string()).is_fatal());

        assert!(!SwapError::SubmissionFailed("timeout".to_string()).is_fatal());
        assert!(!SwapError::RateLimited("429".to_string()).is_fatal());
        assert!(
            !SwapError::ConfirmationTimeout { signature: "sig".to_string() }.is_fatal()
        );
    }

    #[test]
    fn test_rate_limit_classification() {
        assert!(SwapError::RateLimited("slow down".to_string()).is_rate_limit());
        assert!(!SwapError::SubmissionFailed("x".to_string()).is_rate_limit());
    }
}
