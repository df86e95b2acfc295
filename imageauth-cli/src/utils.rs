//! Common utility functions shared across CLI commands.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use imageauth_core::{DeepClassifier, HttpLedger, HttpLedgerConfig, SqliteCorpus};
use serde::Serialize;
use tracing::{debug, warn};

/// Where command results go: human text, JSON, or nowhere.
pub struct Output {
    json: bool,
    quiet: bool,
}

impl Output {
    pub fn new(json: bool, quiet: bool) -> Self {
        Self { json, quiet }
    }

    /// Print `value` as JSON, or run `human` unless quiet.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> Result<()> {
        if self.json {
            let rendered =
                serde_json::to_string_pretty(value).context("Failed to serialize output")?;
            println!("{rendered}");
        } else if !self.quiet {
            human();
        }
        Ok(())
    }
}

/// Read an image file fully into memory.
pub fn read_image(path: &Path) -> Result<Vec<u8>> {
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    debug!(path = %path.display(), bytes = data.len(), "Read file");
    Ok(data)
}

/// Open (and migrate) the SQLite corpus.
pub async fn open_corpus(database_url: &str) -> Result<SqliteCorpus> {
    SqliteCorpus::connect(database_url)
        .await
        .with_context(|| format!("Failed to open corpus: {database_url}"))
}

pub fn http_ledger(base_url: &str, timeout_secs: u64) -> Result<HttpLedger> {
    let mut config = HttpLedgerConfig::new(base_url);
    config.timeout = Duration::from_secs(timeout_secs);
    HttpLedger::new(config).context("Failed to create ledger client")
}

/// Load the morph classifier, or a disabled one that fails open.
#[cfg(feature = "onnx")]
pub fn load_classifier(model: Option<&Path>) -> Result<DeepClassifier> {
    use imageauth_core::OnnxMorphModel;
    use std::sync::Arc;

    match model {
        Some(path) => {
            let model = OnnxMorphModel::from_path(path)
                .with_context(|| format!("Failed to load model: {}", path.display()))?;
            Ok(DeepClassifier::new(Arc::new(model)))
        }
        None => {
            warn!("No classifier model given; classifier signal disabled");
            Ok(DeepClassifier::disabled())
        }
    }
}

#[cfg(not(feature = "onnx"))]
pub fn load_classifier(model: Option<&Path>) -> Result<DeepClassifier> {
    if let Some(path) = model {
        warn!(
            path = %path.display(),
            "Built without the `onnx` feature; ignoring model, classifier signal disabled"
        );
    }
    Ok(DeepClassifier::disabled())
}

/// Format a Unix timestamp (seconds) as a human-readable UTC string.
pub fn format_timestamp(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => format!("{timestamp}s"),
    }
}
