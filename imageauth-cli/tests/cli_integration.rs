//! CLI integration tests for imageauth-cli.
//!
//! These tests run the actual binary against temporary SQLite corpora and
//! synthetic images, checking outputs and exit codes.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

/// Get a Command for the imageauth binary with a clean environment.
fn imageauth() -> Command {
    let mut cmd = Command::cargo_bin("imageauth").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env_remove("LEDGER_URL")
        .env_remove("MODEL_PATH")
        .env_remove("RUST_LOG");
    cmd
}

const SQUARES: [(u32, u32, u32); 7] = [
    (30, 40, 20),
    (90, 35, 28),
    (160, 60, 16),
    (200, 150, 30),
    (50, 170, 24),
    (120, 120, 18),
    (180, 210, 14),
];

fn textured() -> RgbImage {
    ImageBuffer::from_fn(256, 256, |x, y| {
        let in_square = SQUARES
            .iter()
            .any(|&(sx, sy, side)| x >= sx && x < sx + side && y >= sy && y < sy + side);
        if in_square {
            Rgb([250, 240, 230])
        } else {
            Rgb([(x / 2) as u8, (y / 2) as u8, ((x + y) / 4) as u8])
        }
    })
}

fn write_png(dir: &Path, name: &str, img: RgbImage) -> PathBuf {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    let path = dir.join(name);
    fs::write(&path, out.into_inner()).unwrap();
    path
}

fn db_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("corpus.db").display())
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    imageauth()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("near-duplicate detection"))
        .stdout(predicate::str::contains("fingerprint"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("register"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn test_version_displays_version() {
    imageauth()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("imageauth"));
}

#[test]
fn test_help_shows_exit_codes() {
    imageauth()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("65"))
        .stdout(predicate::str::contains("69"));
}

#[test]
fn test_register_help_shows_options() {
    imageauth()
        .args(["register", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--db"))
        .stdout(predicate::str::contains("--ledger-url"))
        .stdout(predicate::str::contains("--metadata"))
        .stdout(predicate::str::contains("--model"));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn test_missing_file_returns_input_error() {
    // Exit code 66 = EX_NOINPUT
    imageauth()
        .args(["fingerprint", "nonexistent_file.png"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_undecodable_image_returns_input_error() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("fake.jpg");
    fs::write(&file, b"this is not an image").unwrap();

    imageauth()
        .args(["fingerprint", file.to_str().unwrap()])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Invalid input"));
}

#[test]
fn test_malformed_hash_returns_input_error() {
    let temp = TempDir::new().unwrap();

    imageauth()
        .args([
            "verify",
            "not-a-hash",
            "--db",
            &db_url(temp.path()),
            "--ledger-url",
            "http://127.0.0.1:9",
        ])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Invalid content hash"));
}

#[test]
fn test_unreachable_ledger_returns_network_error() {
    let temp = TempDir::new().unwrap();
    let image = write_png(temp.path(), "photo.png", textured());
    let db = db_url(temp.path());

    // Exit code 69 = EX_UNAVAILABLE
    imageauth()
        .args([
            "register",
            image.to_str().unwrap(),
            "--db",
            &db,
            "--ledger-url",
            "http://127.0.0.1:9",
            "--ledger-timeout",
            "1",
        ])
        .assert()
        .code(69);

    // Nothing reached the corpus
    let output = imageauth()
        .args(["--json", "check", image.to_str().unwrap(), "--db", &db])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["already_registered"], false);
    assert_eq!(json["corpus_size"], 0);
}

// ============================================================================
// Fingerprint and Compare Tests
// ============================================================================

#[test]
fn test_fingerprint_json() {
    let temp = TempDir::new().unwrap();
    let image = write_png(temp.path(), "photo.png", textured());

    let output = imageauth()
        .args(["--json", "fingerprint", image.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["content_hash"].as_str().unwrap().len(), 64);
    assert_eq!(json["perceptual_hash"].as_str().unwrap().len(), 16);
    assert_eq!(json["has_descriptor"], true);
    assert!(!json["feature_summary"].as_str().unwrap().is_empty());
}

#[test]
fn test_fingerprint_flat_image_has_no_descriptor() {
    let temp = TempDir::new().unwrap();
    let image = write_png(
        temp.path(),
        "flat.png",
        ImageBuffer::from_pixel(64, 64, Rgb([120, 120, 120])),
    );

    let output = imageauth()
        .args(["--json", "fingerprint", image.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["has_descriptor"], false);
    assert_eq!(json["feature_summary"], "");
}

#[test]
fn test_compare_identical_images_match() {
    let temp = TempDir::new().unwrap();
    let a = write_png(temp.path(), "a.png", textured());
    let b = write_png(temp.path(), "b.png", textured());

    let output = imageauth()
        .args(["--json", "compare", a.to_str().unwrap(), b.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["hamming_distance"], 0);
    assert!(json["similarity"].as_f64().unwrap() > 0.99);
    assert_eq!(json["would_match"], true);
}

#[test]
fn test_compare_inverted_image_does_not_match() {
    let temp = TempDir::new().unwrap();
    let a = write_png(temp.path(), "a.png", textured());
    let mut inverted = textured();
    image::imageops::invert(&mut inverted);
    let b = write_png(temp.path(), "b.png", inverted);

    let output = imageauth()
        .args(["--json", "compare", a.to_str().unwrap(), b.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["hash_filter_passed"], false);
    assert_eq!(json["would_match"], false);
}

#[test]
fn test_compare_threshold_override() {
    let temp = TempDir::new().unwrap();
    let a = write_png(temp.path(), "a.png", textured());
    let b = write_png(temp.path(), "b.png", textured());

    // Similarity can never exceed 1.0
    let output = imageauth()
        .args([
            "--json",
            "compare",
            a.to_str().unwrap(),
            b.to_str().unwrap(),
            "--descriptor-threshold",
            "1.0",
        ])
        .output()
        .unwrap();

    let json = stdout_json(&output);
    assert_eq!(json["hash_filter_passed"], true);
    assert_eq!(json["would_match"], false);
}

// ============================================================================
// Check Tests
// ============================================================================

#[test]
fn test_check_on_empty_corpus_is_clean() {
    let temp = TempDir::new().unwrap();
    let image = write_png(temp.path(), "photo.png", textured());

    imageauth()
        .args([
            "check",
            image.to_str().unwrap(),
            "--db",
            &db_url(temp.path()),
            "--fail-on-morph",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("CLEAN"));
}

#[test]
fn test_check_json_reports_degraded_classifier() {
    let temp = TempDir::new().unwrap();
    let image = write_png(temp.path(), "photo.png", textured());

    let output = imageauth()
        .args([
            "--json",
            "check",
            image.to_str().unwrap(),
            "--db",
            &db_url(temp.path()),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["is_morph"], false);
    assert_eq!(json["source"], "none");
    assert_eq!(json["classifier_degraded"], true);
    assert!(json["similarity_match"].is_null());
}

// ============================================================================
// Quiet, Color and Argument Tests
// ============================================================================

#[test]
fn test_quiet_mode_no_stdout() {
    let temp = TempDir::new().unwrap();
    let image = write_png(temp.path(), "photo.png", textured());

    let output = imageauth()
        .args(["--quiet", "fingerprint", image.to_str().unwrap()])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    assert!(
        stdout.trim().is_empty(),
        "Quiet mode should have no stdout, got: {}",
        stdout
    );
}

#[test]
fn test_color_never_no_ansi() {
    let temp = TempDir::new().unwrap();
    let image = write_png(temp.path(), "photo.png", textured());

    let output = imageauth()
        .args(["--color=never", "fingerprint", image.to_str().unwrap()])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let stderr = String::from_utf8_lossy(&output.get_output().stderr);
    assert!(!stdout.contains("\x1b["));
    assert!(!stderr.contains("\x1b["));
}

#[test]
fn test_conflicting_verbose_quiet_rejected() {
    let temp = TempDir::new().unwrap();
    let image = write_png(temp.path(), "photo.png", textured());

    imageauth()
        .args([
            "--verbose",
            "--quiet",
            "fingerprint",
            image.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_check_requires_db() {
    imageauth()
        .args(["check", "photo.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--db"));
}
