//! Position lifecycle events
//!
//! The engine emits `PositionEvent`s at every lifecycle transition and fans
//! them out to registered sinks (console notification, durable trade log).
//! Delivery is fire-and-forget: a sink failure is logged and ignored, it
//! never blocks or fails the underlying trade.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::logger::{self, LogTag};
use crate::rpc::lamports_to_sol;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PositionEvent {
    Opened {
        mint: String,
        symbol: String,
        entry_price: f64,
        entry_amount: u64,
        stake_lamports: u64,
        signature: String,
        timestamp: DateTime<Utc>,
    },
    PartialExit {
        mint: String,
        level: usize,
        proceeds_lamports: u64,
        gain_percent: f64,
        remaining_raw: u64,
        timestamp: DateTime<Utc>,
    },
    Closed {
        mint: String,
        reason: String,
        total_proceeds_lamports: u64,
        total_gain_percent: f64,
        hold_secs: i64,
        timestamp: DateTime<Utc>,
    },
}

impl PositionEvent {
    pub fn mint(&self) -> &str {
        match self {
            PositionEvent::Opened { mint, .. } => mint,
            PositionEvent::PartialExit { mint, .. } => mint,
            PositionEvent::Closed { mint, .. } => mint,
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;
    async fn publish(&self, event: &PositionEvent) -> Result<(), String>;
}

static EVENT_SINKS: Lazy<RwLock<Vec<Arc<dyn EventSink>>>> = Lazy::new(|| RwLock::new(Vec::new()));

pub fn register_sink(sink: Arc<dyn EventSink>) {
    logger::info(LogTag::Event, &format!("registered event sink: {}", sink.name()));
    EVENT_SINKS.write().push(sink);
}

#[cfg(test)]
pub fn clear_sinks() {
    EVENT_SINKS.write().clear();
}

/// Emit an event to all sinks on a detached task. The trade path never waits
/// on sink delivery.
pub fn emit(event: PositionEvent) {
    let sinks: Vec<Arc<dyn EventSink>> = EVENT_SINKS.read().clone();
    if sinks.is_empty() {
        return;
    }

    tokio::spawn(async move {
        let results =
            futures::future::join_all(sinks.iter().map(|sink| sink.publish(&event))).await;
        for (sink, result) in sinks.iter().zip(results) {
            if let Err(e) = result {
                logger::warning(
                    LogTag::Event,
                    &format!("sink {} failed for {}: {}", sink.name(), event.mint(), e),
                );
            }
        }
    });
}

/// Notification sink - renders lifecycle events to the console
pub struct ConsoleSink;

#[async_trait]
impl EventSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn publish(&self, event: &PositionEvent) -> Result<(), String> {
        let line = match event {
            PositionEvent::Opened {
                mint,
                symbol,
                stake_lamports,
                entry_price,
                ..
            } => format!(
                "opened {} ({}) stake {:.4} SOL @ {:.12}",
                symbol,
                mint,
                lamports_to_sol(*stake_lamports),
                entry_price
            ),
            PositionEvent::PartialExit {
                mint,
                level,
                proceeds_lamports,
                gain_percent,
                ..
            } => format!(
                "partial exit level {} on {} for {:.4} SOL ({:+.2}%)",
                level,
                mint,
                lamports_to_sol(*proceeds_lamports),
                gain_percent
            ),
            PositionEvent::Closed {
                mint,
                reason,
                total_proceeds_lamports,
                total_gain_percent,
                hold_secs,
                ..
            } => format!(
                "closed {} [{}] proceeds {:.4} SOL ({:+.2}%) after {}s",
                mint,
                reason,
                lamports_to_sol(*total_proceeds_lamports),
                total_gain_percent,
                hold_secs
            ),
        };

        logger::info(LogTag::Event, &line);
        Ok(())
    }
}

/// Persistence sink - appends one JSON line per event to the trade history
/// file for offline analysis.
pub struct TradeLogSink {
    path: PathBuf,
}

impl TradeLogSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSink for TradeLogSink {
    fn name(&self) -> &str {
        "trade_log"
    }

    async fn publish(&self, event: &PositionEvent) -> Result<(), String> {
        let line = serde_json::to_string(event).map_err(|e| e.to_string())?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| e.to_string())?;
        writeln!(file, "{}", line).map_err(|e| e.to_string())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> PositionEvent {
        PositionEvent::Closed {
            mint: "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263".to_string(),
            reason: "stop_loss(-21.40%)".to_string(),
            total_proceeds_lamports: 7_900_000,
            total_gain_percent: -21.4,
            hold_secs: 840,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_trade_log_sink_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trade_history.jsonl");
        let sink = TradeLogSink::new(&path);

        sink.publish(&sample_event()).await.unwrap();
        sink.publish(&sample_event()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: PositionEvent = serde_json::from_str(lines[0]).unwrap();
        match parsed {
            PositionEvent::Closed { reason, .. } => assert!(reason.starts_with("stop_loss")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_console_sink_never_fails() {
        let sink = ConsoleSink;
        assert!(sink.publish(&sample_event()).await.is_ok());
    }
}
