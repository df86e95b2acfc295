//! Check command implementation: dry-run detection against the corpus.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use imageauth_core::{ContentHash, CorpusStore, DetectionConfig, DetectionPipeline};
use serde::Serialize;
use tracing::info;

use crate::exit_codes::Flagged;
use crate::utils::{load_classifier, open_corpus, read_image, Output};

#[derive(Serialize)]
struct MatchReport {
    content_hash: String,
    hamming_distance: u32,
    similarity: f32,
}

#[derive(Serialize)]
struct CheckReport {
    content_hash: String,
    already_registered: bool,
    is_morph: bool,
    source: &'static str,
    similarity_match: Option<MatchReport>,
    classifier_label: String,
    classifier_confidence: f32,
    classifier_degraded: bool,
    corpus_size: u64,
}

/// Execute the check command.
pub async fn execute(
    file: &Path,
    database_url: &str,
    model: Option<&Path>,
    fail_on_morph: bool,
    out: &Output,
) -> Result<()> {
    let data = read_image(file)?;
    let corpus = open_corpus(database_url).await?;
    let pipeline = DetectionPipeline::new(DetectionConfig::default(), load_classifier(model)?);

    let content_hash = ContentHash::from_bytes(&data);
    let already_registered = corpus
        .exists(&content_hash)
        .await
        .context("Corpus lookup failed")?;
    let detection = pipeline
        .evaluate(&data, &corpus)
        .await
        .with_context(|| format!("Detection failed for {}", file.display()))?;
    let corpus_size = corpus.len().await.context("Corpus count failed")?;

    let verdict = &detection.verdict;
    info!(
        content_hash = %content_hash.short(),
        already_registered,
        is_morph = verdict.is_morph,
        "Check complete"
    );

    let report = CheckReport {
        content_hash: content_hash.to_hex(),
        already_registered,
        is_morph: verdict.is_morph,
        source: verdict.source().as_str(),
        similarity_match: verdict.similarity_match.as_ref().map(|m| MatchReport {
            content_hash: m.content_hash.to_hex(),
            hamming_distance: m.hamming_distance,
            similarity: m.similarity,
        }),
        classifier_label: verdict.classifier.label.to_string(),
        classifier_confidence: verdict.classifier.confidence,
        classifier_degraded: verdict.classifier.degraded,
        corpus_size,
    };

    out.emit(&report, || {
        println!();
        if report.already_registered {
            println!("{}", "   ALREADY REGISTERED".red().bold());
        } else if report.is_morph {
            println!("{}", "   POTENTIAL MORPH".red().bold());
        } else {
            println!("{}", "   CLEAN".green().bold());
        }
        println!();
        println!("   {} {}", "Content hash:".dimmed(), report.content_hash);
        println!("   {} {}", "Flagged by:".dimmed(), report.source);
        if let Some(m) = &report.similarity_match {
            println!(
                "   {} {} (distance {}, similarity {:.4})",
                "Similar to:".dimmed(),
                m.content_hash,
                m.hamming_distance,
                m.similarity
            );
        }
        let classifier = if report.classifier_degraded {
            "unavailable (failed open)".yellow().to_string()
        } else {
            format!(
                "{} ({:.2})",
                report.classifier_label, report.classifier_confidence
            )
        };
        println!("   {} {}", "Classifier:".dimmed(), classifier);
        println!("   {} {} images", "Corpus:".dimmed(), report.corpus_size);
    })?;

    if fail_on_morph && (already_registered || detection.verdict.is_morph) {
        let reason = if already_registered {
            "image already registered"
        } else {
            "potential morph detected"
        };
        return Err(Flagged(format!("Check failed: {reason}")).into());
    }
    Ok(())
}
