use thiserror::Error;

use crate::content::ContentHash;

#[derive(Error, Debug)]
pub enum ImageAuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Image already registered: {content_hash}")]
    Duplicate { content_hash: ContentHash },

    #[error("Corpus store error: {0}")]
    Corpus(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[cfg(feature = "network")]
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Coarse failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or undecodable upload; nothing was mutated.
    Input,
    /// Content hash already present (or being registered concurrently).
    Duplicate,
    /// Ledger registration or lookup failed; the upload did not take effect.
    Ledger,
    /// Corpus store unavailable or inconsistent.
    Storage,
    Internal,
}

impl ImageAuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::Input,
            Self::Duplicate { .. } => ErrorKind::Duplicate,
            Self::Ledger(_) => ErrorKind::Ledger,
            #[cfg(feature = "network")]
            Self::HttpError(_) => ErrorKind::Ledger,
            Self::Corpus(_) => ErrorKind::Storage,
            Self::Classifier(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for ImageAuthError {
    fn from(e: sqlx::Error) -> Self {
        Self::Corpus(e.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::migrate::MigrateError> for ImageAuthError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Corpus(format!("Migration failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, ImageAuthError>;
