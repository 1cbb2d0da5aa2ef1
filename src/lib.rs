pub mod balances;
pub mod cooldown;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod global;
pub mod logger;
pub mod positions;
pub mod rate_limit;
pub mod rpc;
pub mod strategy;
pub mod swaps;
pub mod trader;
