use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;

use super::{CorpusEntry, CorpusStore, ImageRecord, InsertOutcome};
use crate::content::ContentHash;
use crate::error::Result;

#[derive(Default)]
struct Inner {
    records: Vec<ImageRecord>,
    index: HashMap<ContentHash, usize>,
}

/// In-process corpus for development and tests.
///
/// Scans iterate over a snapshot taken when the stream is created, so records
/// inserted mid-scan are not observed by that scan.
#[derive(Default)]
pub struct MemoryCorpus {
    inner: RwLock<Inner>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate from existing records, keeping the first of any duplicates.
    pub fn with_records(records: impl IntoIterator<Item = ImageRecord>) -> Self {
        let corpus = Self::new();
        {
            let mut inner = corpus.inner.write();
            for record in records {
                if inner.index.contains_key(&record.content_hash) {
                    continue;
                }
                let position = inner.records.len();
                inner.index.insert(record.content_hash, position);
                inner.records.push(record);
            }
        }
        corpus
    }
}

#[async_trait]
impl CorpusStore for MemoryCorpus {
    async fn exists(&self, content_hash: &ContentHash) -> Result<bool> {
        Ok(self.inner.read().index.contains_key(content_hash))
    }

    async fn get(&self, content_hash: &ContentHash) -> Result<Option<ImageRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .index
            .get(content_hash)
            .map(|&i| inner.records[i].clone()))
    }

    fn fingerprints(&self) -> BoxStream<'_, Result<CorpusEntry>> {
        let snapshot: Vec<Result<CorpusEntry>> = self
            .inner
            .read()
            .records
            .iter()
            .map(|r| Ok(CorpusEntry::from(r)))
            .collect();
        stream::iter(snapshot).boxed()
    }

    async fn insert(&self, record: ImageRecord) -> Result<InsertOutcome> {
        let mut inner = self.inner.write();
        if inner.index.contains_key(&record.content_hash) {
            return Ok(InsertOutcome::Conflict);
        }
        let position = inner.records.len();
        inner.index.insert(record.content_hash, position);
        inner.records.push(record);
        Ok(InsertOutcome::Inserted)
    }

    async fn len(&self) -> Result<u64> {
        Ok(self.inner.read().records.len() as u64)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
