//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use imageauth_core::{
    CorpusStore, DeepClassifier, DetectionPipeline, HttpLedger, HttpLedgerConfig, ImageRegistry,
    Ledger, MemoryCorpus, MemoryLedger, SqliteCorpus,
};

use crate::config::Config;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Registration service wired with the configured corpus, ledger and classifier
    pub registry: Arc<ImageRegistry>,
    /// Maximum accepted image size in bytes
    pub max_file_size: usize,
}

impl AppState {
    pub fn new(registry: ImageRegistry, max_file_size: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            max_file_size,
        }
    }

    /// State backed by in-memory corpus and ledger.
    pub fn in_memory(config: &Config, classifier: DeepClassifier) -> Self {
        let pipeline = DetectionPipeline::new(config.detection_config(), classifier);
        let registry = ImageRegistry::new(
            pipeline,
            Arc::new(MemoryCorpus::new()),
            Arc::new(MemoryLedger::new()),
        );
        Self::new(registry, config.max_file_size())
    }

    /// Build the state from environment-derived configuration.
    ///
    /// Missing `DATABASE_URL`, `LEDGER_URL` or `MODEL_PATH` fall back to
    /// in-process stand-ins, each with a warning.
    pub async fn from_config(config: &Config) -> imageauth_core::Result<Self> {
        let corpus: Arc<dyn CorpusStore> = match &config.database_url {
            Some(url) => Arc::new(SqliteCorpus::connect(url).await?),
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory corpus (not persisted)");
                Arc::new(MemoryCorpus::new())
            }
        };

        let ledger: Arc<dyn Ledger> = match &config.ledger_url {
            Some(url) => {
                let mut ledger_config = HttpLedgerConfig::new(url.as_str());
                ledger_config.timeout = config.ledger_timeout();
                tracing::info!(ledger_url = %ledger_config.base_url, "Using HTTP ledger gateway");
                Arc::new(HttpLedger::new(ledger_config)?)
            }
            None => {
                tracing::warn!("LEDGER_URL not set, using in-memory ledger (development only)");
                Arc::new(MemoryLedger::new())
            }
        };

        let classifier = load_classifier(config)?;
        let pipeline = DetectionPipeline::new(config.detection_config(), classifier);

        Ok(Self::new(
            ImageRegistry::new(pipeline, corpus, ledger),
            config.max_file_size(),
        ))
    }
}

#[cfg(feature = "onnx")]
fn load_classifier(config: &Config) -> imageauth_core::Result<DeepClassifier> {
    use imageauth_core::OnnxMorphModel;

    match &config.model_path {
        Some(path) => {
            let model = OnnxMorphModel::from_path(std::path::Path::new(path))?;
            tracing::info!(model_path = %path, "Morph classifier loaded");
            Ok(DeepClassifier::new(Arc::new(model)))
        }
        None => {
            tracing::warn!("MODEL_PATH not set, classifier disabled (fail-open)");
            Ok(DeepClassifier::disabled())
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn load_classifier(config: &Config) -> imageauth_core::Result<DeepClassifier> {
    if config.model_path.is_some() {
        tracing::warn!(
            "MODEL_PATH set but server built without the `onnx` feature, classifier disabled"
        );
    } else {
        tracing::warn!("MODEL_PATH not set, classifier disabled (fail-open)");
    }
    Ok(DeepClassifier::disabled())
}
