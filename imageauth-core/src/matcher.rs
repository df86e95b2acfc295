//! Two-stage near-duplicate search.
//!
//! A cheap perceptual-hash Hamming filter runs against every candidate; only
//! candidates that pass it pay for the descriptor cosine comparison. A
//! candidate is a match when both tests pass.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::content::ContentHash;
use crate::corpus::{CorpusEntry, CorpusStore};
use crate::error::Result;
use crate::fingerprint::{cosine_similarity, Fingerprint};

/// Default maximum (exclusive) Hamming distance for the cheap filter.
pub const DEFAULT_PHASH_THRESHOLD: u32 = 8;

/// Default minimum (exclusive) cosine similarity for confirmation.
pub const DEFAULT_DESCRIPTOR_THRESHOLD: f32 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Candidates pass the filter when `distance < phash_threshold`.
    pub phash_threshold: u32,
    /// Candidates are confirmed when `similarity > descriptor_threshold`.
    pub descriptor_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            phash_threshold: DEFAULT_PHASH_THRESHOLD,
            descriptor_threshold: DEFAULT_DESCRIPTOR_THRESHOLD,
        }
    }
}

/// Reference to the registered image a new upload was matched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub content_hash: ContentHash,
    pub hamming_distance: u32,
    pub similarity: f32,
}

/// How a single candidate fared against the new fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    /// Failed the perceptual-hash filter.
    Rejected { distance: u32 },
    /// Passed the filter but the descriptor comparison did not confirm.
    Unconfirmed { distance: u32, similarity: f32 },
    Matched(SimilarityMatch),
}

impl CandidateOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityMatcher {
    config: MatcherConfig,
}

impl SimilarityMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Compare a new fingerprint against one registered entry.
    pub fn evaluate(&self, new: &Fingerprint, candidate: &CorpusEntry) -> CandidateOutcome {
        let distance = new
            .perceptual_hash
            .hamming_distance(&candidate.fingerprint.perceptual_hash);
        if distance >= self.config.phash_threshold {
            return CandidateOutcome::Rejected { distance };
        }

        let similarity = cosine_similarity(
            new.feature_descriptor.as_ref(),
            candidate.fingerprint.feature_descriptor.as_ref(),
        );
        if similarity > self.config.descriptor_threshold {
            CandidateOutcome::Matched(SimilarityMatch {
                content_hash: candidate.content_hash,
                hamming_distance: distance,
                similarity,
            })
        } else {
            CandidateOutcome::Unconfirmed {
                distance,
                similarity,
            }
        }
    }

    /// Scan the corpus and return the first confirmed match in insertion
    /// order, not the closest one.
    ///
    /// A corpus read error aborts the scan and is returned to the caller.
    #[instrument(skip_all, fields(phash = %new.perceptual_hash))]
    pub async fn find_match(
        &self,
        new: &Fingerprint,
        corpus: &dyn CorpusStore,
    ) -> Result<Option<SimilarityMatch>> {
        let mut candidates = corpus.candidates(&new.perceptual_hash);
        let mut scanned = 0u64;

        while let Some(entry) = candidates.next().await {
            let entry = entry?;
            scanned += 1;
            match self.evaluate(new, &entry) {
                CandidateOutcome::Matched(found) => {
                    debug!(
                        content_hash = %found.content_hash.short(),
                        distance = found.hamming_distance,
                        similarity = found.similarity,
                        scanned,
                        "Similarity match confirmed"
                    );
                    return Ok(Some(found));
                }
                CandidateOutcome::Unconfirmed {
                    distance,
                    similarity,
                } => {
                    debug!(
                        content_hash = %entry.content_hash.short(),
                        distance,
                        similarity,
                        "Candidate passed hash filter but descriptor did not confirm"
                    );
                }
                CandidateOutcome::Rejected { .. } => {}
            }
        }

        debug!(scanned, "No similarity match");
        Ok(None)
    }
}
