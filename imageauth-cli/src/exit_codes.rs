//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use imageauth_core::{ErrorKind, ImageAuthError};

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Image flagged: duplicate, or potential morph under `check --fail-on-morph`.
/// Maps to EX_DATAERR from sysexits.h.
pub const FLAGGED: i32 = 65;

/// Cannot open or decode input (file, image bytes, content hash).
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Ledger gateway unavailable.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// Corpus store or other I/O failure.
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Raised by commands whose check succeeded but whose verdict should fail the run.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Flagged(pub String);

/// Exit code paired with the rendered error chain.
pub struct ExitCode {
    pub code: i32,
    pub message: String,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let code = err.chain().find_map(classify).unwrap_or(GENERAL_ERROR);

        Self {
            code,
            message: format!("{err:#}"),
        }
    }
}

/// Map one error in the chain to an exit code, if it is a known kind.
fn classify(cause: &(dyn std::error::Error + 'static)) -> Option<i32> {
    if cause.is::<Flagged>() {
        return Some(FLAGGED);
    }
    if let Some(e) = cause.downcast_ref::<ImageAuthError>() {
        return Some(match e.kind() {
            ErrorKind::Input => INPUT_ERROR,
            ErrorKind::Duplicate => FLAGGED,
            ErrorKind::Ledger => NETWORK_ERROR,
            ErrorKind::Storage => IO_ERROR,
            ErrorKind::Internal => GENERAL_ERROR,
        });
    }
    if let Some(e) = cause.downcast_ref::<std::io::Error>() {
        return Some(match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => INPUT_ERROR,
            _ => IO_ERROR,
        });
    }
    None
}
