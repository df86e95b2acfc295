//! Register command implementation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use imageauth_core::{DetectionConfig, DetectionPipeline, ImageRegistry};
use serde::Serialize;

use crate::utils::{
    format_timestamp, http_ledger, load_classifier, open_corpus, read_image, Output,
};

#[derive(Serialize)]
struct RegisterReport {
    content_hash: String,
    tx_hash: String,
    metadata: String,
    is_morph: bool,
    message: &'static str,
    source: &'static str,
    model_confidence: f32,
    registration_time: i64,
}

/// Execute the register command.
pub async fn execute(
    file: &Path,
    database_url: &str,
    ledger_url: &str,
    ledger_timeout: u64,
    metadata: &str,
    model: Option<&Path>,
    out: &Output,
) -> Result<()> {
    let data = read_image(file)?;
    let corpus = open_corpus(database_url).await?;
    let ledger = http_ledger(ledger_url, ledger_timeout)?;
    let pipeline = DetectionPipeline::new(DetectionConfig::default(), load_classifier(model)?);
    let registry = ImageRegistry::new(pipeline, Arc::new(corpus), Arc::new(ledger));

    let receipt = registry
        .upload(&data, metadata)
        .await
        .with_context(|| format!("Registration failed for {}", file.display()))?;

    let report = RegisterReport {
        content_hash: receipt.content_hash.to_hex(),
        tx_hash: receipt.ledger_reference.clone(),
        metadata: receipt.metadata.clone(),
        is_morph: receipt.is_morph,
        message: receipt.message(),
        source: receipt.verdict.source().as_str(),
        model_confidence: receipt.classifier_confidence,
        registration_time: receipt.registration_time,
    };

    out.emit(&report, || {
        println!();
        if report.is_morph {
            println!("{}", format!("   {}", report.message).yellow().bold());
        } else {
            println!("{}", format!("   {}", report.message).green().bold());
        }
        println!();
        println!("   {} {}", "Content hash:".dimmed(), report.content_hash);
        println!("   {} {}", "Ledger tx:".dimmed(), report.tx_hash);
        println!(
            "   {} {}",
            "Registered at:".dimmed(),
            format_timestamp(report.registration_time)
        );
        if report.is_morph {
            println!("   {} {}", "Flagged by:".dimmed(), report.source);
        }
    })
}
