//! ImageAuth Core - morph and near-duplicate detection for image registration
//!
//! This crate decides, for each uploaded image, whether it is a morph of or a
//! near-duplicate of something already registered, and sequences the
//! registration of accepted uploads on a ledger and in a local corpus.
//!
//! # Features
//!
//! - Exact-duplicate rejection by SHA-256 content hash
//! - Two-stage similarity search: perceptual-hash filter, then keypoint
//!   descriptor confirmation
//! - Pluggable deep classifier that fails open when unavailable
//! - Corpus adapters (in-memory, SQLite) and ledger adapters (in-memory, HTTP gateway)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use imageauth_core::{
//!     DeepClassifier, DetectionConfig, DetectionPipeline, ImageRegistry, MemoryCorpus,
//!     MemoryLedger, StaticModel,
//! };
//!
//! # async fn example() -> imageauth_core::Result<()> {
//! let pipeline = DetectionPipeline::new(
//!     DetectionConfig::default(),
//!     DeepClassifier::new(Arc::new(StaticModel::new(0.9))),
//! );
//! let registry = ImageRegistry::new(
//!     pipeline,
//!     Arc::new(MemoryCorpus::new()),
//!     Arc::new(MemoryLedger::new()),
//! );
//!
//! let bytes = std::fs::read("photo.jpg").unwrap();
//! let receipt = registry.upload(&bytes, "passport photo").await?;
//! println!("{} morph={}", receipt.content_hash, receipt.is_morph);
//!
//! let report = registry.verify(&receipt.content_hash).await?;
//! assert!(report.verified);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod combiner;
pub mod content;
pub mod corpus;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod matcher;
pub mod pipeline;
pub mod registry;

// Re-export main types for convenience
pub use classifier::{
    ChannelOrder, ClassifierLabel, ClassifierVerdict, DeepClassifier, MorphModel, StaticModel,
};
pub use combiner::{combine, DetectionSource, Verdict};
pub use content::{ContentHash, CONTENT_HASH_SIZE};
pub use corpus::{CorpusEntry, CorpusStore, ImageRecord, InsertOutcome, MemoryCorpus};
pub use error::{ErrorKind, ImageAuthError, Result};
pub use fingerprint::{
    cosine_similarity, decode_image, FeatureDescriptor, Fingerprint, FingerprintExtractor,
    PerceptualHash, PerceptualHasher,
};
pub use ledger::{Ledger, LedgerReceipt, LedgerRegistration, LedgerVerification, MemoryLedger};
pub use matcher::{CandidateOutcome, MatcherConfig, SimilarityMatch, SimilarityMatcher};
pub use pipeline::{Detection, DetectionConfig, DetectionPipeline};
pub use registry::{ImageRegistry, LocalRecord, UploadReceipt, VerifyReport};

#[cfg(feature = "sqlite")]
pub use corpus::SqliteCorpus;

#[cfg(feature = "network")]
pub use ledger::{HttpLedger, HttpLedgerConfig};

#[cfg(feature = "onnx")]
pub use classifier::{OnnxConfig, OnnxMorphModel};
