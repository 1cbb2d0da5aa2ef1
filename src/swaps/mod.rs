/// Quote/settlement gateway
///
/// Everything that moves value goes through here: quoting, balance-gated
/// execution, bounded retries and confirmation polling. Callers use the
/// `interface` functions; the lower modules are the wire client and shared
/// plumbing.

pub mod client;
pub mod config;
pub mod interface;
pub mod retry;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::ConfirmOutcome;
pub use interface::{buy_token, execute_quote, get_quote, sell_token};
pub use retry::{with_retry, RetryPolicy};
pub use types::{SwapQuote, SwapResult};
