//! Append-only CSV log of language-model usage.
//!
//! One row per completed answer or summary:
//!
//! ```text
//! timestamp,model,input_tokens,output_tokens,total_tokens,cost_usd
//! 2026-03-01T10:15:02Z,gemini-1.5-pro,812,9,821,0.001060
//! ```
//!
//! The header is written when the file is created and never again.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::UsageConfig;
use crate::error::{DocketError, Result};
use crate::models::TokenUsage;

/// USD prices per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million
            + usage.output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// One row of the usage log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl UsageRecord {
    pub fn new(at: DateTime<Utc>, model: &str, usage: &TokenUsage, pricing: &Pricing) -> Self {
        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            model: model.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
            // six decimals keeps the file readable
            cost_usd: (pricing.cost(usage) * 1e6).round() / 1e6,
        }
    }
}

/// Writer for the usage log. Appends from concurrent tasks are serialized.
#[derive(Debug, Clone)]
pub struct UsageLog {
    path: PathBuf,
    pricing: Pricing,
    lock: Arc<Mutex<()>>,
}

fn usage_err(e: impl std::fmt::Display) -> DocketError {
    DocketError::UsageLog(e.to_string())
}

impl UsageLog {
    pub fn new(path: impl Into<PathBuf>, pricing: Pricing) -> Self {
        Self {
            path: path.into(),
            pricing,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &UsageConfig) -> Self {
        Self::new(
            config.path.clone(),
            Pricing {
                input_per_million: config.input_cost_per_million,
                output_per_million: config.output_cost_per_million,
            },
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    /// Append one row for a completed generation call.
    pub async fn append(&self, model: &str, usage: &TokenUsage) -> Result<UsageRecord> {
        let record = UsageRecord::new(Utc::now(), model, usage, &self.pricing);
        let path = self.path.clone();
        let lock = self.lock.clone();
        let row = record.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| usage_err("usage log lock poisoned"))?;
            append_record(&path, &row)
        })
        .await
        .map_err(usage_err)??;

        Ok(record)
    }
}

fn append_record(path: &Path, record: &UsageRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(usage_err)?;
    }
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(usage_err)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    writer.serialize(record).map_err(usage_err)?;
    writer.flush().map_err(usage_err)?;
    Ok(())
}

/// Read every row of a usage log.
pub fn read_records(path: &Path) -> Result<Vec<UsageRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(usage_err)?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<UsageRecord>, _>>()
        .map_err(usage_err)
}

/// Totals over a usage log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

/// Summarize the usage log at `path`. A missing log is an empty summary.
pub fn summarize(path: &Path) -> Result<UsageSummary> {
    if !path.exists() {
        return Ok(UsageSummary::default());
    }
    let summary = read_records(path)?
        .iter()
        .fold(UsageSummary::default(), |mut acc, r| {
            acc.calls += 1;
            acc.input_tokens += r.input_tokens;
            acc.output_tokens += r.output_tokens;
            acc.total_tokens += r.total_tokens;
            acc.cost_usd += r.cost_usd;
            acc
        });
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PRICING: Pricing = Pricing {
        input_per_million: 1.25,
        output_per_million: 5.0,
    };

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn test_cost_per_million() {
        let cost = PRICING.cost(&usage(1_000_000, 200_000));
        assert!((cost - 2.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("usage.csv");
        let log = UsageLog::new(&path, PRICING);

        log.append("gemini-1.5-pro", &usage(812, 9)).await.unwrap();
        log.append("gemini-1.5-pro", &usage(100, 50)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "timestamp,model,input_tokens,output_tokens,total_tokens,cost_usd"
        );
        assert!(lines[1].contains(",gemini-1.5-pro,812,9,821,"));
        assert_eq!(content.matches("timestamp").count(), 1);
    }

    #[tokio::test]
    async fn test_summarize_totals_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("usage.csv");
        let log = UsageLog::new(&path, PRICING);
        log.append("m", &usage(1_000_000, 0)).await.unwrap();
        log.append("m", &usage(0, 1_000_000)).await.unwrap();

        let summary = summarize(&path).unwrap();
        assert_eq!(summary.calls, 2);
        assert_eq!(summary.total_tokens, 2_000_000);
        assert!((summary.cost_usd - 6.25).abs() < 1e-6);
    }

    #[test]
    fn test_missing_log_summarizes_empty() {
        let tmp = TempDir::new().unwrap();
        let summary = summarize(&tmp.path().join("none.csv")).unwrap();
        assert_eq!(summary, UsageSummary::default());
    }

    #[tokio::test]
    async fn test_unwritable_path_is_usage_error() {
        let tmp = TempDir::new().unwrap();
        // A directory where the file should be
        let log = UsageLog::new(tmp.path(), PRICING);
        let err = log.append("m", &usage(1, 1)).await.unwrap_err();
        assert!(matches!(err, DocketError::UsageLog(_)));
    }
}
