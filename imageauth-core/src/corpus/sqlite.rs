//! SQLite implementation of the corpus store.

use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use super::{CorpusEntry, CorpusStore, ImageRecord, InsertOutcome};
use crate::content::ContentHash;
use crate::error::{ImageAuthError, Result};
use crate::fingerprint::{FeatureDescriptor, Fingerprint, PerceptualHash};

/// SQLite-backed corpus.
///
/// Insertion order is the `seq` autoincrement column; uniqueness on
/// `content_hash` is enforced by the schema.
#[derive(Clone)]
pub struct SqliteCorpus {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct FingerprintRow {
    content_hash: String,
    perceptual_hash: Vec<u8>,
    feature_descriptor: Option<Vec<u8>>,
}

#[derive(FromRow)]
struct ImageRow {
    content_hash: String,
    metadata: String,
    perceptual_hash: Vec<u8>,
    feature_descriptor: Option<Vec<u8>>,
    is_morph: bool,
    registration_time: i64,
    ledger_reference: String,
}

fn decode_fingerprint(perceptual_hash: &[u8], descriptor: Option<&[u8]>) -> Result<Fingerprint> {
    let perceptual_hash = PerceptualHash::from_slice(perceptual_hash)
        .map_err(|e| ImageAuthError::Corpus(format!("Corrupt perceptual hash: {e}")))?;
    let feature_descriptor = descriptor
        .map(FeatureDescriptor::from_le_bytes)
        .transpose()
        .map_err(|e| ImageAuthError::Corpus(format!("Corrupt feature descriptor: {e}")))?;
    Ok(Fingerprint {
        perceptual_hash,
        feature_descriptor,
    })
}

fn decode_hash(hex: &str) -> Result<ContentHash> {
    ContentHash::from_hex(hex)
        .map_err(|e| ImageAuthError::Corpus(format!("Corrupt content hash: {e}")))
}

impl TryFrom<FingerprintRow> for CorpusEntry {
    type Error = ImageAuthError;

    fn try_from(row: FingerprintRow) -> Result<Self> {
        Ok(Self {
            content_hash: decode_hash(&row.content_hash)?,
            fingerprint: decode_fingerprint(
                &row.perceptual_hash,
                row.feature_descriptor.as_deref(),
            )?,
        })
    }
}

impl TryFrom<ImageRow> for ImageRecord {
    type Error = ImageAuthError;

    fn try_from(row: ImageRow) -> Result<Self> {
        Ok(Self {
            content_hash: decode_hash(&row.content_hash)?,
            metadata: row.metadata,
            fingerprint: decode_fingerprint(
                &row.perceptual_hash,
                row.feature_descriptor.as_deref(),
            )?,
            is_morph: row.is_morph,
            registration_time: row.registration_time,
            ledger_reference: row.ledger_reference,
        })
    }
}

impl SqliteCorpus {
    /// Open (creating if missing) the database at `database_url` and apply
    /// migrations.
    ///
    /// `sqlite::memory:` databases are bound to a single long-lived connection,
    /// since every new connection would see an empty database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options)
                .await?
        };

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(database_url, "Corpus store connected and migrations applied");

        Ok(Self { pool })
    }
}

#[async_trait]
impl CorpusStore for SqliteCorpus {
    async fn exists(&self, content_hash: &ContentHash) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM images WHERE content_hash = ?1")
                .bind(content_hash.to_hex())
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn get(&self, content_hash: &ContentHash) -> Result<Option<ImageRecord>> {
        let row: Option<ImageRow> = sqlx::query_as(
            r#"
            SELECT content_hash, metadata, perceptual_hash, feature_descriptor,
                   is_morph, registration_time, ledger_reference
            FROM images
            WHERE content_hash = ?1
            "#,
        )
        .bind(content_hash.to_hex())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ImageRecord::try_from).transpose()
    }

    fn fingerprints(&self) -> BoxStream<'_, Result<CorpusEntry>> {
        sqlx::query_as::<_, FingerprintRow>(
            r#"
            SELECT content_hash, perceptual_hash, feature_descriptor
            FROM images
            ORDER BY seq
            "#,
        )
        .fetch(&self.pool)
        .map(|row| row.map_err(ImageAuthError::from).and_then(CorpusEntry::try_from))
        .boxed()
    }

    async fn insert(&self, record: ImageRecord) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO images (content_hash, metadata, perceptual_hash, feature_descriptor,
                                is_morph, registration_time, ledger_reference)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (content_hash) DO NOTHING
            "#,
        )
        .bind(record.content_hash.to_hex())
        .bind(&record.metadata)
        .bind(record.fingerprint.perceptual_hash.as_bytes().to_vec())
        .bind(
            record
                .fingerprint
                .feature_descriptor
                .as_ref()
                .map(FeatureDescriptor::to_le_bytes),
        )
        .bind(record.is_morph)
        .bind(record.registration_time)
        .bind(&record.ledger_reference)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(content_hash = %record.content_hash.short(), "Insert conflicted");
            return Ok(InsertOutcome::Conflict);
        }

        tracing::debug!(content_hash = %record.content_hash.short(), "Stored image record");
        Ok(InsertOutcome::Inserted)
    }

    async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
