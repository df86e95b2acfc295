//! Corpus store: every previously registered image with its fingerprint.
//!
//! The matcher only needs a lazy, insertion-ordered scan of fingerprints; the
//! registration service needs an existence check and an atomic
//! compare-and-insert keyed by content hash. Adapters decide how that maps to
//! storage.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryCorpus;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCorpus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::content::ContentHash;
use crate::error::Result;
use crate::fingerprint::{Fingerprint, PerceptualHash};

/// A registered image as persisted in the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub content_hash: ContentHash,
    pub metadata: String,
    pub fingerprint: Fingerprint,
    pub is_morph: bool,
    /// Unix seconds.
    pub registration_time: i64,
    pub ledger_reference: String,
}

/// One element of a corpus scan.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusEntry {
    pub content_hash: ContentHash,
    pub fingerprint: Fingerprint,
}

impl From<&ImageRecord> for CorpusEntry {
    fn from(record: &ImageRecord) -> Self {
        Self {
            content_hash: record.content_hash,
            fingerprint: record.fingerprint.clone(),
        }
    }
}

/// Result of a compare-and-insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same content hash already existed; nothing was written.
    Conflict,
}

#[async_trait]
pub trait CorpusStore: Send + Sync {
    async fn exists(&self, content_hash: &ContentHash) -> Result<bool>;

    async fn get(&self, content_hash: &ContentHash) -> Result<Option<ImageRecord>>;

    /// All fingerprints in insertion order.
    fn fingerprints(&self) -> BoxStream<'_, Result<CorpusEntry>>;

    /// Entries worth comparing against `probe`.
    ///
    /// Must preserve insertion order and must never omit an entry that would
    /// pass the perceptual-hash filter.
    fn candidates(&self, probe: &PerceptualHash) -> BoxStream<'_, Result<CorpusEntry>> {
        let _ = probe;
        self.fingerprints()
    }

    async fn insert(&self, record: ImageRecord) -> Result<InsertOutcome>;

    async fn len(&self) -> Result<u64>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Backend name for health reporting.
    fn backend(&self) -> &'static str;
}
