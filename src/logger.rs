//! Structured console logging
//!
//! Tag + level based logging with per-module debug control:
//! - Standard levels (Error/Warning/Info/Debug/Verbose)
//! - `--debug-<module>` enables Debug output for that tag only
//! - `--verbose` enables Verbose output globally
//! - Addresses, signatures and numbers are highlighted in console output
//!
//! Call `logger::init()` once at startup before any logging occurs. Errors
//! are always shown regardless of flags.

use std::collections::HashSet;
use std::io::{self, Write};

use chrono::Utc;
use colored::*;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

/// Log categories, one per subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Trader,
    Position,
    Swap,
    Rpc,
    Wallet,
    Cooldown,
    Discovery,
    Event,
}

impl LogTag {
    /// Key used for `--debug-<key>` command line flags
    pub fn to_debug_key(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Trader => "trader",
            LogTag::Position => "position",
            LogTag::Swap => "swap",
            LogTag::Rpc => "rpc",
            LogTag::Wallet => "wallet",
            LogTag::Cooldown => "cooldown",
            LogTag::Discovery => "discovery",
            LogTag::Event => "event",
        }
    }

    fn colored_label(&self) -> ColoredString {
        match self {
            LogTag::System => "SYSTEM".bright_white().bold(),
            LogTag::Trader => "TRADER".yellow().bold(),
            LogTag::Position => "POSITION".bright_magenta().bold(),
            LogTag::Swap => "SWAP".bright_yellow().bold(),
            LogTag::Rpc => "RPC".bright_green().bold(),
            LogTag::Wallet => "WALLET".blue().bold(),
            LogTag::Cooldown => "COOLDOWN".cyan().bold(),
            LogTag::Discovery => "DISCOVERY".magenta().bold(),
            LogTag::Event => "EVENT".bright_blue().bold(),
        }
    }
}

/// Levels ordered by severity (Error < Warning < Info < Debug < Verbose)
/// so filtering is a simple threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 3,
    Verbose = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Verbose => "VERBOSE",
        }
    }
}

#[derive(Debug, Clone)]
struct LoggerConfig {
    min_level: LogLevel,
    debug_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

/// Initialize logger configuration from command line arguments.
///
/// Recognized flags: `--verbose`, `--quiet`, `--debug-all`, `--debug-<module>`
/// (e.g. `--debug-swap`, `--debug-trader`).
pub fn init() {
    let mut config = LoggerConfig::default();

    for arg in std::env::args() {
        if arg == "--verbose" {
            config.min_level = LogLevel::Verbose;
        } else if arg == "--quiet" {
            config.min_level = LogLevel::Warning;
        } else if arg == "--debug-all" {
            config.min_level = LogLevel::Debug;
            config.debug_tags.insert("all".to_string());
        } else if let Some(module) = arg.strip_prefix("--debug-") {
            config.debug_tags.insert(module.to_string());
        }
    }

    *LOGGER_CONFIG.write() = config;
}

fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    let config = LOGGER_CONFIG.read();
    config.debug_tags.contains("all") || config.debug_tags.contains(tag.to_debug_key())
}

/// Filtering rules:
/// 1. Errors always log
/// 2. Anything above the minimum level threshold is dropped
/// 3. Debug requires `--debug-<module>` for that tag
fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    if level == LogLevel::Error {
        return true;
    }

    if level == LogLevel::Debug {
        return is_debug_enabled_for_tag(tag) || LOGGER_CONFIG.read().min_level >= LogLevel::Debug;
    }

    level <= LOGGER_CONFIG.read().min_level
}

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?[\d,]+\.?\d*%?)").unwrap());
static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([1-9A-HJ-NP-Za-km-z]{32,44})").unwrap());
static SIGNATURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([1-9A-HJ-NP-Za-km-z]{80,90})").unwrap());

/// Highlight numbers, addresses and transaction signatures for readability
fn format_message(message: &str) -> String {
    let mut formatted = SIGNATURE_RE
        .replace_all(message, |caps: &regex::Captures| {
            let sig = &caps[1];
            format!(
                "{}...{}",
                sig[..12].bright_yellow().bold(),
                sig[sig.len() - 8..].bright_yellow().bold()
            )
        })
        .to_string();

    formatted = ADDRESS_RE
        .replace_all(&formatted, |caps: &regex::Captures| {
            let addr = &caps[1];
            format!(
                "{}...{}",
                addr[..8].bright_cyan().bold(),
                addr[addr.len() - 4..].bright_cyan().bold()
            )
        })
        .to_string();

    formatted = NUMBER_RE
        .replace_all(&formatted, |caps: &regex::Captures| {
            caps[1].bright_white().bold().to_string()
        })
        .to_string();

    formatted
}

fn write_log(tag: LogTag, level: LogLevel, subtag: Option<&str>, message: &str) {
    if !should_log(&tag, level) {
        return;
    }

    let timestamp = Utc::now().format("%H:%M:%S%.3f");
    let level_str = match level {
        LogLevel::Error => level.as_str().red().bold(),
        LogLevel::Warning => level.as_str().yellow().bold(),
        LogLevel::Info => level.as_str().normal(),
        LogLevel::Debug => level.as_str().purple(),
        LogLevel::Verbose => level.as_str().dimmed(),
    };

    match subtag {
        Some(sub) => println!(
            "{} {} {} {} {}",
            format!("[{}]", timestamp).dimmed(),
            tag.colored_label(),
            level_str,
            sub.dimmed(),
            format_message(message)
        ),
        None => println!(
            "{} {} {} {}",
            format!("[{}]", timestamp).dimmed(),
            tag.colored_label(),
            level_str,
            format_message(message)
        ),
    }

    let _ = io::stdout().flush();
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    write_log(tag, LogLevel::Error, None, message);
}

/// Log at WARNING level
pub fn warning(tag: LogTag, message: &str) {
    write_log(tag, LogLevel::Warning, None, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    write_log(tag, LogLevel::Info, None, message);
}

/// Log at DEBUG level (only with --debug-<module>)
pub fn debug(tag: LogTag, message: &str) {
    write_log(tag, LogLevel::Debug, None, message);
}

/// Log at VERBOSE level (only with --verbose)
pub fn verbose(tag: LogTag, message: &str) {
    write_log(tag, LogLevel::Verbose, None, message);
}

/// Legacy subtag form used by the swap pipeline, logged at INFO level.
pub fn log(tag: LogTag, subtag: &str, message: &str) {
    write_log(tag, LogLevel::Info, Some(subtag), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_always_pass_filter() {
        assert!(should_log(&LogTag::Swap, LogLevel::Error));
    }

    #[test]
    fn test_debug_gated_by_flag() {
        // Default config has no debug flags set
        *LOGGER_CONFIG.write() = LoggerConfig::default();
        assert!(!should_log(&LogTag::Rpc, LogLevel::Debug));

        let mut config = LoggerConfig::default();
        config.debug_tags.insert("rpc".to_string());
        *LOGGER_CONFIG.write() = config;
        assert!(should_log(&LogTag::Rpc, LogLevel::Debug));
        assert!(!should_log(&LogTag::Swap, LogLevel::Debug));

        *LOGGER_CONFIG.write() = LoggerConfig::default();
    }

    #[test]
    fn test_address_highlighting_preserves_ends() {
        let msg = format_message("mint So11111111111111111111111111111111111111112 priced");
        assert!(msg.contains("So111111"));
        assert!(msg.contains("1112"));
    }
}
