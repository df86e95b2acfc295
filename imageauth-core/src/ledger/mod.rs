//! Ledger adapters: the tamper-evident registry of uploads.
//!
//! The ledger is keyed by content hash and records the metadata, fingerprint
//! summary and morph flag of each registration. Chain interaction (signing,
//! fees, confirmation) belongs to the gateway behind [`HttpLedger`].

#[cfg(feature = "network")]
mod http;
mod memory;

#[cfg(feature = "network")]
pub use http::{HttpLedger, HttpLedgerConfig};
pub use memory::MemoryLedger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::content::ContentHash;
use crate::error::Result;

/// Payload submitted to the ledger for a new image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRegistration {
    pub content_hash: ContentHash,
    pub metadata: String,
    /// Hex-encoded perceptual hash.
    pub perceptual_hash: String,
    /// Descriptor summary as a decimal string; empty when absent.
    pub feature_summary: String,
    pub is_morph: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    /// Transaction reference (hash) of the registration.
    pub reference: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Answer to a verification lookup. Unknown hashes are `verified = false`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerVerification {
    pub verified: bool,
    pub timestamp: i64,
    /// Transaction reference of the original registration; empty when unknown.
    pub reference: String,
    pub metadata: String,
    pub is_morph: bool,
}

impl LedgerVerification {
    pub fn not_found() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Record a registration. Not idempotent: a second registration of the
    /// same hash is an error.
    async fn register(&self, registration: &LedgerRegistration) -> Result<LedgerReceipt>;

    async fn verify(&self, content_hash: &ContentHash) -> Result<LedgerVerification>;

    fn name(&self) -> &'static str;
}
