//! Compare command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use imageauth_core::{
    cosine_similarity, CandidateOutcome, ContentHash, CorpusEntry, FingerprintExtractor,
    MatcherConfig, SimilarityMatcher,
};
use serde::Serialize;

use crate::utils::{read_image, Output};

#[derive(Serialize)]
struct CompareReport {
    hamming_distance: u32,
    similarity: f32,
    phash_threshold: u32,
    descriptor_threshold: f32,
    hash_filter_passed: bool,
    would_match: bool,
}

/// Execute the compare command.
///
/// `first` plays the registered image, `second` the new upload.
pub fn execute(
    first: &Path,
    second: &Path,
    phash_threshold: u32,
    descriptor_threshold: f32,
    out: &Output,
) -> Result<()> {
    let extractor = FingerprintExtractor::default();

    let first_data = read_image(first)?;
    let registered = CorpusEntry {
        content_hash: ContentHash::from_bytes(&first_data),
        fingerprint: extractor
            .extract_bytes(&first_data)
            .with_context(|| format!("Failed to fingerprint {}", first.display()))?,
    };
    let candidate = extractor
        .extract_bytes(&read_image(second)?)
        .with_context(|| format!("Failed to fingerprint {}", second.display()))?;

    let matcher = SimilarityMatcher::new(MatcherConfig {
        phash_threshold,
        descriptor_threshold,
    });
    let outcome = matcher.evaluate(&candidate, &registered);

    // The matcher skips the descriptor when the hash filter fails; report it anyway
    let similarity = cosine_similarity(
        registered.fingerprint.feature_descriptor.as_ref(),
        candidate.feature_descriptor.as_ref(),
    );
    let report = CompareReport {
        hamming_distance: registered
            .fingerprint
            .perceptual_hash
            .hamming_distance(&candidate.perceptual_hash),
        similarity,
        phash_threshold,
        descriptor_threshold,
        hash_filter_passed: !matches!(outcome, CandidateOutcome::Rejected { .. }),
        would_match: outcome.is_match(),
    };

    out.emit(&report, || {
        println!(
            "   {} {} (threshold < {})",
            "Hamming distance:".dimmed(),
            report.hamming_distance,
            report.phash_threshold
        );
        println!(
            "   {} {:.4} (threshold > {})",
            "Descriptor similarity:".dimmed(),
            report.similarity,
            report.descriptor_threshold
        );
        let verdict = if report.would_match {
            "MATCH: B would be flagged against A".red().bold()
        } else if report.hash_filter_passed {
            "NO MATCH: hash filter passed, descriptor did not confirm".yellow()
        } else {
            "NO MATCH".green()
        };
        println!("   {verdict}");
    })
}
