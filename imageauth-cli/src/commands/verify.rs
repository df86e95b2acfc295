//! Verify command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use imageauth_core::{ContentHash, DetectionPipeline, ImageRegistry};
use serde::Serialize;

use crate::utils::{format_timestamp, http_ledger, open_corpus, Output};

#[derive(Serialize)]
struct LocalReport {
    exists: bool,
    metadata: Option<String>,
}

#[derive(Serialize)]
struct VerifyReport {
    hash: String,
    verified: bool,
    timestamp: i64,
    metadata: String,
    is_morph: bool,
    local_data: LocalReport,
}

/// Execute the verify command.
///
/// An unregistered hash is reported, not treated as a failure.
pub async fn execute(
    hash: &str,
    database_url: &str,
    ledger_url: &str,
    ledger_timeout: u64,
    out: &Output,
) -> Result<()> {
    let content_hash = ContentHash::from_hex(hash.trim()).context("Invalid content hash")?;
    let corpus = open_corpus(database_url).await?;
    let ledger = http_ledger(ledger_url, ledger_timeout)?;
    // Verification never runs detection, so the classifier stays disabled
    let registry = ImageRegistry::new(
        DetectionPipeline::default(),
        Arc::new(corpus),
        Arc::new(ledger),
    );

    let result = registry
        .verify(&content_hash)
        .await
        .context("Verification failed")?;

    let report = VerifyReport {
        hash: content_hash.to_hex(),
        verified: result.verified,
        timestamp: result.timestamp,
        metadata: result.metadata,
        is_morph: result.is_morph,
        local_data: LocalReport {
            exists: result.local.exists,
            metadata: result.local.metadata,
        },
    };

    out.emit(&report, || {
        println!();
        if report.verified {
            println!("{}", "   REGISTERED".green().bold());
            println!();
            println!(
                "   {} {}",
                "Registered at:".dimmed(),
                format_timestamp(report.timestamp)
            );
            println!("   {} {}", "Metadata:".dimmed(), report.metadata);
            if report.is_morph {
                println!("   {} {}", "Flag:".dimmed(), "potential morph".yellow());
            }
        } else {
            println!("{}", "   NOT REGISTERED".yellow().bold());
        }
        let local = if report.local_data.exists {
            "present".green()
        } else {
            "absent".yellow()
        };
        println!("   {} {}", "Local corpus:".dimmed(), local);
    })
}
