//! Registration service: sequences detection, ledger registration and corpus
//! insertion for uploads, and merges ledger and local state for verification.
//!
//! Ordering on upload is ledger first, corpus second. A ledger failure leaves
//! the corpus untouched; a corpus conflict after a successful ledger write is a
//! cross-process race and surfaces as a duplicate.
//!
//! The post-ledger corpus insert is retried with backoff. If it still fails,
//! the ledger holds a hash the corpus lacks; the next upload of the same bytes
//! finds it on the ledger, skips registration and restores the corpus record
//! from the ledger's answer.

use std::sync::Arc;
use std::time::Duration;

use backoff::{future::retry_notify, ExponentialBackoff};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::combiner::Verdict;
use crate::content::ContentHash;
use crate::corpus::{CorpusStore, ImageRecord, InsertOutcome};
use crate::error::{ImageAuthError, Result};
use crate::ledger::{Ledger, LedgerReceipt, LedgerRegistration};
use crate::pipeline::{Detection, DetectionPipeline};

/// Time spent retrying a corpus insert after the ledger accepted the image.
const DEFAULT_INSERT_RETRY: Duration = Duration::from_secs(2);

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub content_hash: ContentHash,
    pub ledger_reference: String,
    pub metadata: String,
    pub is_morph: bool,
    pub classifier_confidence: f32,
    pub verdict: Verdict,
    pub registration_time: i64,
}

impl UploadReceipt {
    pub fn message(&self) -> &'static str {
        if self.is_morph {
            "Potential morph detected"
        } else {
            "New image registered"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub exists: bool,
    pub metadata: Option<String>,
}

/// Ledger answer merged with the local corpus lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub verified: bool,
    pub timestamp: i64,
    pub metadata: String,
    pub is_morph: bool,
    pub local: LocalRecord,
}

/// Holds a content hash in the in-flight set until dropped.
struct Reservation<'a> {
    set: &'a DashSet<ContentHash>,
    hash: ContentHash,
}

impl<'a> Reservation<'a> {
    fn acquire(set: &'a DashSet<ContentHash>, hash: ContentHash) -> Option<Self> {
        set.insert(hash).then_some(Self { set, hash })
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.hash);
    }
}

pub struct ImageRegistry {
    pipeline: DetectionPipeline,
    corpus: Arc<dyn CorpusStore>,
    ledger: Arc<dyn Ledger>,
    in_flight: DashSet<ContentHash>,
    insert_retry: Duration,
}

impl ImageRegistry {
    pub fn new(
        pipeline: DetectionPipeline,
        corpus: Arc<dyn CorpusStore>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            pipeline,
            corpus,
            ledger,
            in_flight: DashSet::new(),
            insert_retry: DEFAULT_INSERT_RETRY,
        }
    }

    /// Bound on retrying the corpus insert that follows a ledger write.
    /// `Duration::ZERO` makes a single attempt.
    pub fn with_insert_retry(mut self, window: Duration) -> Self {
        self.insert_retry = window;
        self
    }

    pub fn pipeline(&self) -> &DetectionPipeline {
        &self.pipeline
    }

    pub fn corpus(&self) -> &dyn CorpusStore {
        self.corpus.as_ref()
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    pub async fn corpus_size(&self) -> Result<u64> {
        self.corpus.len().await
    }

    /// Dry-run detection: no ledger write, no corpus insert.
    pub async fn check(&self, data: &[u8]) -> Result<Detection> {
        if data.is_empty() {
            return Err(ImageAuthError::InvalidInput("No image data provided".into()));
        }
        self.pipeline.evaluate(data, self.corpus.as_ref()).await
    }

    /// Register a new image.
    ///
    /// Returns `Duplicate` when identical bytes are already registered or are
    /// being registered concurrently, before any detection work is done.
    #[instrument(skip_all, fields(bytes = data.len()))]
    pub async fn upload(&self, data: &[u8], metadata: &str) -> Result<UploadReceipt> {
        if data.is_empty() {
            return Err(ImageAuthError::InvalidInput("No image data provided".into()));
        }

        let content_hash = ContentHash::from_bytes(data);
        let Some(_reservation) = Reservation::acquire(&self.in_flight, content_hash) else {
            info!(content_hash = %content_hash.short(), "Concurrent upload of identical bytes");
            return Err(ImageAuthError::Duplicate { content_hash });
        };

        if self.corpus.exists(&content_hash).await? {
            info!(content_hash = %content_hash.short(), "Image already registered");
            return Err(ImageAuthError::Duplicate { content_hash });
        }

        let detection = self
            .pipeline
            .evaluate(data, self.corpus.as_ref())
            .await?;
        let verdict = detection.verdict;

        let on_ledger = self
            .ledger
            .verify(&content_hash)
            .await
            .map_err(|e| self.ledger_failure(e))?;

        // The ledger is the record of truth: a hash it already holds keeps its
        // original metadata, morph flag and reference.
        let (receipt, recorded_metadata, is_morph) = if on_ledger.verified {
            warn!(
                content_hash = %content_hash,
                ledger_reference = %on_ledger.reference,
                "Hash on ledger but missing from corpus, restoring corpus record"
            );
            let receipt = LedgerReceipt {
                reference: on_ledger.reference,
                timestamp: on_ledger.timestamp,
            };
            (receipt, on_ledger.metadata, on_ledger.is_morph)
        } else {
            let registration = LedgerRegistration {
                content_hash,
                metadata: metadata.to_string(),
                perceptual_hash: detection.fingerprint.perceptual_hash.to_hex(),
                feature_summary: detection.fingerprint.feature_summary(),
                is_morph: verdict.is_morph,
            };
            let receipt = self
                .ledger
                .register(&registration)
                .await
                .map_err(|e| self.ledger_failure(e))?;
            (receipt, registration.metadata, verdict.is_morph)
        };

        let record = ImageRecord {
            content_hash,
            metadata: recorded_metadata.clone(),
            fingerprint: detection.fingerprint,
            is_morph,
            registration_time: receipt.timestamp,
            ledger_reference: receipt.reference.clone(),
        };

        match self.insert_after_ledger(record).await {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::Conflict) => {
                error!(
                    content_hash = %content_hash,
                    ledger_reference = %receipt.reference,
                    "Corpus conflict after ledger registration; ledger and corpus disagree"
                );
                return Err(ImageAuthError::Duplicate { content_hash });
            }
            Err(e) => {
                error!(
                    content_hash = %content_hash,
                    ledger_reference = %receipt.reference,
                    error = %e,
                    "Corpus insert failed after ledger registration; re-upload to reconcile"
                );
                return Err(e);
            }
        }

        info!(
            content_hash = %content_hash.short(),
            ledger_reference = %receipt.reference,
            is_morph,
            "Image registered"
        );

        Ok(UploadReceipt {
            content_hash,
            ledger_reference: receipt.reference,
            metadata: recorded_metadata,
            is_morph,
            classifier_confidence: verdict.model_confidence(),
            verdict,
            registration_time: receipt.timestamp,
        })
    }

    fn ledger_failure(&self, e: ImageAuthError) -> ImageAuthError {
        warn!(error = %e, ledger = self.ledger.name(), "Ledger call failed");
        match e {
            ImageAuthError::Ledger(_) => e,
            other => ImageAuthError::Ledger(other.to_string()),
        }
    }

    async fn insert_after_ledger(&self, record: ImageRecord) -> Result<InsertOutcome> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(500),
            max_elapsed_time: Some(self.insert_retry),
            ..Default::default()
        };

        retry_notify(
            policy,
            || {
                let record = record.clone();
                async move {
                    self.corpus
                        .insert(record)
                        .await
                        .map_err(backoff::Error::transient)
                }
            },
            |err: ImageAuthError, wait: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = wait.as_millis() as u64,
                    "Corpus insert failed, retrying"
                );
            },
        )
        .await
    }

    /// Look a content hash up in the ledger and in the local corpus.
    #[instrument(skip_all, fields(content_hash = %content_hash.short()))]
    pub async fn verify(&self, content_hash: &ContentHash) -> Result<VerifyReport> {
        let (ledger, local) = tokio::join!(
            self.ledger.verify(content_hash),
            self.corpus.get(content_hash)
        );
        let ledger = ledger?;
        let local = local?;

        Ok(VerifyReport {
            verified: ledger.verified,
            timestamp: ledger.timestamp,
            metadata: ledger.metadata,
            is_morph: ledger.is_morph,
            local: LocalRecord {
                exists: local.is_some(),
                metadata: local.map(|r| r.metadata),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{DeepClassifier, StaticModel};
    use crate::corpus::MemoryCorpus;
    use crate::ledger::{LedgerVerification, MemoryLedger};
    use crate::pipeline::DetectionConfig;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::corpus::CorpusEntry;

    fn png(seed: u8) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(96, 96, |x, y| {
            Rgb([(x as u8).wrapping_mul(seed), (y as u8).wrapping_add(seed), seed])
        }));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn pipeline() -> DetectionPipeline {
        DetectionPipeline::new(
            DetectionConfig::default(),
            DeepClassifier::new(Arc::new(StaticModel::new(0.9))),
        )
    }

    fn registry_with(ledger: Arc<dyn Ledger>) -> (ImageRegistry, Arc<MemoryCorpus>) {
        let corpus = Arc::new(MemoryCorpus::new());
        (
            ImageRegistry::new(pipeline(), corpus.clone(), ledger),
            corpus,
        )
    }

    /// Memory corpus whose next `failing` inserts error out.
    struct LockedCorpus {
        inner: MemoryCorpus,
        failing: AtomicUsize,
    }

    impl LockedCorpus {
        fn new(failing: usize) -> Self {
            Self {
                inner: MemoryCorpus::new(),
                failing: AtomicUsize::new(failing),
            }
        }

        fn unlock(&self) {
            self.failing.store(0, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CorpusStore for LockedCorpus {
        async fn exists(&self, content_hash: &ContentHash) -> Result<bool> {
            self.inner.exists(content_hash).await
        }

        async fn get(&self, content_hash: &ContentHash) -> Result<Option<ImageRecord>> {
            self.inner.get(content_hash).await
        }

        fn fingerprints(&self) -> BoxStream<'_, Result<CorpusEntry>> {
            self.inner.fingerprints()
        }

        async fn insert(&self, record: ImageRecord) -> Result<InsertOutcome> {
            let locked = self
                .failing
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if locked {
                return Err(ImageAuthError::Corpus("database is locked".into()));
            }
            self.inner.insert(record).await
        }

        async fn len(&self) -> Result<u64> {
            self.inner.len().await
        }

        fn backend(&self) -> &'static str {
            "locked"
        }
    }

    /// Corpus that never reports a hash but loses every insert race.
    struct RacingCorpus;

    #[async_trait]
    impl CorpusStore for RacingCorpus {
        async fn exists(&self, _: &ContentHash) -> Result<bool> {
            Ok(false)
        }

        async fn get(&self, _: &ContentHash) -> Result<Option<ImageRecord>> {
            Ok(None)
        }

        fn fingerprints(&self) -> BoxStream<'_, Result<CorpusEntry>> {
            Box::pin(stream::empty())
        }

        async fn insert(&self, _: ImageRecord) -> Result<InsertOutcome> {
            Ok(InsertOutcome::Conflict)
        }

        async fn len(&self) -> Result<u64> {
            Ok(0)
        }

        fn backend(&self) -> &'static str {
            "racing"
        }
    }

    struct DownLedger;

    #[async_trait]
    impl Ledger for DownLedger {
        async fn register(&self, _: &LedgerRegistration) -> Result<LedgerReceipt> {
            Err(ImageAuthError::Ledger("gateway unreachable".into()))
        }

        async fn verify(&self, _: &ContentHash) -> Result<LedgerVerification> {
            Err(ImageAuthError::Ledger("gateway unreachable".into()))
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn test_upload_registers_and_stores() {
        let ledger = Arc::new(MemoryLedger::new());
        let (registry, corpus) = registry_with(ledger.clone());

        let data = png(3);
        let receipt = registry.upload(&data, "first").await.unwrap();

        assert_eq!(receipt.content_hash, ContentHash::from_bytes(&data));
        assert!(!receipt.is_morph);
        assert_eq!(receipt.message(), "New image registered");
        assert_eq!(ledger.len(), 1);

        let stored = corpus.get(&receipt.content_hash).await.unwrap().unwrap();
        assert_eq!(stored.ledger_reference, receipt.ledger_reference);
        assert_eq!(stored.metadata, "first");
    }

    #[tokio::test]
    async fn test_second_upload_is_duplicate() {
        let (registry, corpus) = registry_with(Arc::new(MemoryLedger::new()));
        let data = png(5);
        registry.upload(&data, "a").await.unwrap();

        let err = registry.upload(&data, "b").await.unwrap_err();
        assert!(matches!(err, ImageAuthError::Duplicate { .. }));
        assert_eq!(corpus.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_upload_is_invalid() {
        let (registry, _) = registry_with(Arc::new(MemoryLedger::new()));
        let err = registry.upload(&[], "").await.unwrap_err();
        assert!(matches!(err, ImageAuthError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_ledger_failure_leaves_corpus_untouched() {
        let (registry, corpus) = registry_with(Arc::new(DownLedger));
        let err = registry.upload(&png(7), "x").await.unwrap_err();

        assert!(matches!(err, ImageAuthError::Ledger(_)));
        assert!(corpus.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_transient_insert_failure_is_retried() {
        let ledger = Arc::new(MemoryLedger::new());
        let corpus = Arc::new(LockedCorpus::new(1));
        let registry = ImageRegistry::new(pipeline(), corpus.clone(), ledger.clone());

        let receipt = registry.upload(&png(15), "retried").await.unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(corpus.len().await.unwrap(), 1);
        assert!(corpus.exists(&receipt.content_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_reupload_restores_record_missing_after_ledger_write() {
        let ledger = Arc::new(MemoryLedger::new());
        let corpus = Arc::new(LockedCorpus::new(usize::MAX));
        let registry = ImageRegistry::new(pipeline(), corpus.clone(), ledger.clone())
            .with_insert_retry(Duration::ZERO);
        let data = png(17);
        let content_hash = ContentHash::from_bytes(&data);

        let err = registry.upload(&data, "original").await.unwrap_err();
        assert!(matches!(err, ImageAuthError::Corpus(_)));
        assert_eq!(ledger.len(), 1);
        assert_eq!(corpus.len().await.unwrap(), 0);

        corpus.unlock();
        let receipt = registry.upload(&data, "second attempt").await.unwrap();

        // No second ledger registration; the original entry is reused
        let on_ledger = ledger.verify(&content_hash).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(receipt.ledger_reference, on_ledger.reference);
        assert_eq!(receipt.registration_time, on_ledger.timestamp);
        assert_eq!(receipt.metadata, "original");

        let stored = corpus.get(&content_hash).await.unwrap().unwrap();
        assert_eq!(stored.ledger_reference, on_ledger.reference);
        assert_eq!(stored.metadata, "original");

        let err = registry.upload(&data, "third").await.unwrap_err();
        assert!(matches!(err, ImageAuthError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_conflict_after_ledger_write_is_duplicate() {
        let ledger = Arc::new(MemoryLedger::new());
        let registry = ImageRegistry::new(pipeline(), Arc::new(RacingCorpus), ledger.clone());
        let data = png(19);

        let err = registry.upload(&data, "raced").await.unwrap_err();

        match err {
            ImageAuthError::Duplicate { content_hash } => {
                assert_eq!(content_hash, ContentHash::from_bytes(&data));
            }
            other => panic!("expected Duplicate, got {other:?}"),
        }
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_reservation_released_after_failure() {
        let set = DashSet::new();
        let hash = ContentHash::from_bytes(b"x");
        {
            let _held = Reservation::acquire(&set, hash).unwrap();
            assert!(Reservation::acquire(&set, hash).is_none());
        }
        assert!(Reservation::acquire(&set, hash).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_identical_uploads_register_once() {
        let ledger = Arc::new(MemoryLedger::new());
        let (registry, corpus) = registry_with(ledger.clone());
        let data = png(9);

        let (a, b) = tokio::join!(registry.upload(&data, "a"), registry.upload(&data, "b"));
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();

        assert_eq!(successes, 1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(corpus.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_verify_merges_ledger_and_local() {
        let (registry, _) = registry_with(Arc::new(MemoryLedger::new()));
        let receipt = registry.upload(&png(11), "meta").await.unwrap();

        let report = registry.verify(&receipt.content_hash).await.unwrap();
        assert!(report.verified);
        assert_eq!(report.metadata, "meta");
        assert_eq!(report.timestamp, receipt.registration_time);
        assert_eq!(
            report.local,
            LocalRecord {
                exists: true,
                metadata: Some("meta".into())
            }
        );

        let unknown = registry
            .verify(&ContentHash::from_bytes(b"nope"))
            .await
            .unwrap();
        assert!(!unknown.verified);
        assert!(!unknown.local.exists);
        assert!(unknown.local.metadata.is_none());
    }

    #[tokio::test]
    async fn test_check_does_not_mutate() {
        let ledger = Arc::new(MemoryLedger::new());
        let (registry, corpus) = registry_with(ledger.clone());
        registry.check(&png(13)).await.unwrap();

        assert!(ledger.is_empty());
        assert!(corpus.is_empty().await.unwrap());
    }
}
