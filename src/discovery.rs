//! Discovery collaborator seam
//!
//! The engine does not score assets itself; it consumes a ranked candidate
//! list from an external screener. `FileCandidateSource` reads the list the
//! screener process writes to disk; tests plug in in-memory sources.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logger::{self, LogTag};

/// One ranked discovery candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub mint: String,
    #[serde(default)]
    pub symbol: String,
    pub opportunity_score: f64,
    /// Screener's last observed price, informational only - the engine
    /// always quotes its own prices
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub metrics: Value,
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Candidates ranked descending by opportunity score. The engine treats
    /// this as a read-only, already-filtered input.
    async fn fetch_candidates(&self) -> Result<Vec<Candidate>, String>;
}

/// Reads candidates from the JSON file maintained by the screener process
pub struct FileCandidateSource {
    path: PathBuf,
}

impl FileCandidateSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for FileCandidateSource {
    async fn fetch_candidates(&self) -> Result<Vec<Candidate>, String> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(_) => {
                // No candidate file yet - the screener has not produced one
                return Ok(Vec::new());
            }
        };

        let mut candidates: Vec<Candidate> =
            serde_json::from_str(&content).map_err(|e| format!("bad candidate file: {}", e))?;

        candidates.sort_by(|a, b| {
            b.opportunity_score
                .partial_cmp(&a.opportunity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        logger::debug(
            LogTag::Discovery,
            &format!("loaded {} candidates", candidates.len()),
        );

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_candidates_sorted_descending_by_score() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.json");
        std::fs::write(
            &path,
            r#"[
                {"mint": "mint-low", "opportunity_score": 40.0},
                {"mint": "mint-high", "opportunity_score": 92.5, "symbol": "HI"},
                {"mint": "mint-mid", "opportunity_score": 71.0}
            ]"#,
        )
        .unwrap();

        let source = FileCandidateSource::new(&path);
        let candidates = source.fetch_candidates().await.unwrap();

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].mint, "mint-high");
        assert_eq!(candidates[0].symbol, "HI");
        assert_eq!(candidates[2].mint, "mint-low");
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty_list() {
        let source = FileCandidateSource::new("/nonexistent/candidates.json");
        assert!(source.fetch_candidates().await.unwrap().is_empty());
    }
}
