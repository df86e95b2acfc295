use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{Ledger, LedgerReceipt, LedgerRegistration, LedgerVerification};
use crate::content::ContentHash;
use crate::error::{ImageAuthError, Result};

struct Entry {
    timestamp: i64,
    reference: String,
    metadata: String,
    is_morph: bool,
}

#[derive(Default)]
struct State {
    sequence: u64,
    last_timestamp: i64,
    entries: HashMap<ContentHash, Entry>,
}

/// In-process ledger for development and tests.
///
/// Timestamps are wall-clock seconds forced to be strictly increasing, and
/// references are `sha256(content_hash || sequence)` in hex.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn register(&self, registration: &LedgerRegistration) -> Result<LedgerReceipt> {
        let mut state = self.state.lock();
        if state.entries.contains_key(&registration.content_hash) {
            return Err(ImageAuthError::Ledger(format!(
                "Hash {} already registered",
                registration.content_hash
            )));
        }

        state.sequence += 1;
        let timestamp = chrono::Utc::now()
            .timestamp()
            .max(state.last_timestamp + 1);
        state.last_timestamp = timestamp;

        let mut hasher = Sha256::new();
        hasher.update(registration.content_hash.as_bytes());
        hasher.update(state.sequence.to_be_bytes());
        let reference = format!("0x{}", hex::encode(hasher.finalize()));

        state.entries.insert(
            registration.content_hash,
            Entry {
                timestamp,
                reference: reference.clone(),
                metadata: registration.metadata.clone(),
                is_morph: registration.is_morph,
            },
        );

        tracing::debug!(
            content_hash = %registration.content_hash.short(),
            reference = %reference,
            "Registered on memory ledger"
        );

        Ok(LedgerReceipt {
            reference,
            timestamp,
        })
    }

    async fn verify(&self, content_hash: &ContentHash) -> Result<LedgerVerification> {
        let state = self.state.lock();
        Ok(state
            .entries
            .get(content_hash)
            .map(|e| LedgerVerification {
                verified: true,
                timestamp: e.timestamp,
                reference: e.reference.clone(),
                metadata: e.metadata.clone(),
                is_morph: e.is_morph,
            })
            .unwrap_or_else(LedgerVerification::not_found))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(data: &[u8], is_morph: bool) -> LedgerRegistration {
        LedgerRegistration {
            content_hash: ContentHash::from_bytes(data),
            metadata: "holiday photo".into(),
            perceptual_hash: "0011223344556677".into(),
            feature_summary: "101.5".into(),
            is_morph,
        }
    }

    #[tokio::test]
    async fn test_register_then_verify() {
        let ledger = MemoryLedger::new();
        let reg = registration(b"a", true);

        let receipt = ledger.register(&reg).await.unwrap();
        assert!(receipt.reference.starts_with("0x"));
        assert_eq!(receipt.reference.len(), 66);

        let v = ledger.verify(&reg.content_hash).await.unwrap();
        assert!(v.verified);
        assert!(v.is_morph);
        assert_eq!(v.metadata, "holiday photo");
        assert_eq!(v.timestamp, receipt.timestamp);
        assert_eq!(v.reference, receipt.reference);
    }

    #[tokio::test]
    async fn test_unknown_hash_not_verified() {
        let ledger = MemoryLedger::new();
        let v = ledger
            .verify(&ContentHash::from_bytes(b"never"))
            .await
            .unwrap();
        assert_eq!(v, LedgerVerification::not_found());
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let ledger = MemoryLedger::new();
        ledger.register(&registration(b"a", false)).await.unwrap();
        let err = ledger
            .register(&registration(b"a", false))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageAuthError::Ledger(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_timestamps_and_references_unique() {
        let ledger = MemoryLedger::new();
        let r1 = ledger.register(&registration(b"a", false)).await.unwrap();
        let r2 = ledger.register(&registration(b"b", false)).await.unwrap();
        assert!(r2.timestamp > r1.timestamp);
        assert_ne!(r1.reference, r2.reference);
    }
}
