//! Fingerprint command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use imageauth_core::{ContentHash, FingerprintExtractor};
use serde::Serialize;
use tracing::info;

use crate::utils::{read_image, Output};

#[derive(Serialize)]
struct FingerprintReport {
    file: String,
    content_hash: String,
    perceptual_hash: String,
    has_descriptor: bool,
    feature_summary: String,
}

/// Execute the fingerprint command.
pub fn execute(file: &Path, out: &Output) -> Result<()> {
    let data = read_image(file)?;
    let content_hash = ContentHash::from_bytes(&data);
    let fingerprint = FingerprintExtractor::default()
        .extract_bytes(&data)
        .with_context(|| format!("Failed to fingerprint {}", file.display()))?;

    info!(
        content_hash = %content_hash.short(),
        phash = %fingerprint.perceptual_hash,
        "Fingerprint computed"
    );

    let report = FingerprintReport {
        file: file.display().to_string(),
        content_hash: content_hash.to_hex(),
        perceptual_hash: fingerprint.perceptual_hash.to_hex(),
        has_descriptor: fingerprint.feature_descriptor.is_some(),
        feature_summary: fingerprint.feature_summary(),
    };

    out.emit(&report, || {
        println!("{}", report.file.bold());
        println!("   {} {}", "Content hash:".dimmed(), report.content_hash);
        println!("   {} {}", "Perceptual hash:".dimmed(), report.perceptual_hash);
        if report.has_descriptor {
            println!("   {} {}", "Descriptor mean:".dimmed(), report.feature_summary);
        } else {
            println!(
                "   {} {}",
                "Descriptor:".dimmed(),
                "none (no keypoints found)".yellow()
            );
        }
    })
}
