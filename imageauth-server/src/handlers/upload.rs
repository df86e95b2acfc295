//! Image upload handler
//!
//! Handles POST /upload: detection, ledger registration and corpus insertion.

use axum::{
    extract::{Multipart, State},
    Json,
};
use imageauth_core::{SimilarityMatch, UploadReceipt};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::multipart::MultipartFields;
use crate::state::AppState;
use crate::validation::validate_image_signature;

/// Registered image the upload was found to be near-identical to
#[derive(Debug, Serialize, ToSchema)]
pub struct SimilarityMatchBody {
    /// Content hash of the earlier registration
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub hash: String,
    /// Perceptual-hash Hamming distance (0-64)
    #[schema(example = 3)]
    pub hamming_distance: u32,
    /// Cosine similarity of the feature descriptors
    #[schema(example = 0.97)]
    pub similarity: f32,
}

impl From<&SimilarityMatch> for SimilarityMatchBody {
    fn from(m: &SimilarityMatch) -> Self {
        Self {
            hash: m.content_hash.to_hex(),
            hamming_distance: m.hamming_distance,
            similarity: m.similarity,
        }
    }
}

/// Which detectors fired and how the classifier behaved
#[derive(Debug, Serialize, ToSchema)]
pub struct DetectionBody {
    /// "none", "similarity", "classifier" or "both"
    #[schema(example = "similarity")]
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_match: Option<SimilarityMatchBody>,
    /// "real" or "morphed"
    #[schema(example = "real")]
    pub classifier_label: String,
    /// True when the classifier was unavailable and the verdict failed open
    pub classifier_degraded: bool,
}

/// Response for a successful upload
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// SHA-256 of the uploaded bytes (hex)
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub hash: String,
    /// Ledger transaction reference
    #[schema(example = "0x5e1c...")]
    pub tx_hash: String,
    #[schema(example = "registered")]
    pub status: &'static str,
    pub metadata: String,
    /// Whether the image was flagged as a potential morph
    pub is_morph: bool,
    #[schema(example = "New image registered")]
    pub message: &'static str,
    /// Classifier confidence in its own label
    #[schema(example = 0.92)]
    pub model_confidence: f32,
    pub detection: DetectionBody,
}

impl From<UploadReceipt> for UploadResponse {
    fn from(receipt: UploadReceipt) -> Self {
        let message = receipt.message();
        let verdict = &receipt.verdict;
        let detection = DetectionBody {
            source: verdict.source().as_str(),
            similarity_match: verdict.similarity_match.as_ref().map(Into::into),
            classifier_label: verdict.classifier.label.to_string(),
            classifier_degraded: verdict.classifier.degraded,
        };

        Self {
            hash: receipt.content_hash.to_hex(),
            tx_hash: receipt.ledger_reference,
            status: "registered",
            metadata: receipt.metadata,
            is_morph: receipt.is_morph,
            message,
            model_confidence: receipt.classifier_confidence,
            detection,
        }
    }
}

/// Register an image
///
/// Accepts multipart/form-data with:
/// - **image** (required): the image bytes (`file` is accepted as an alias)
/// - **metadata** (optional): free text recorded on the ledger
///
/// The image is checked against the registered corpus (perceptual hash, then
/// descriptor confirmation) and by the morph classifier. Either signal marks it
/// as a potential morph; it is registered either way. Identical bytes that are
/// already registered are rejected with 409.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "Registration",
    request_body(
        content_type = "multipart/form-data",
        description = "Image to register and optional metadata"
    ),
    responses(
        (status = 200, description = "Image registered", body = UploadResponse),
        (status = 400, description = "Missing, empty, oversized or undecodable image"),
        (status = 409, description = "Identical image already registered"),
        (status = 502, description = "Ledger registration failed"),
        (status = 503, description = "Corpus store unavailable")
    )
)]
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let fields = MultipartFields::parse(&mut multipart, state.max_file_size).await?;
    let image = fields.require_image()?;
    validate_image_signature(&image.data)?;
    let metadata = fields.get_text("metadata").unwrap_or_default();

    tracing::debug!(
        bytes = image.data.len(),
        content_type = ?image.content_type,
        file_name = ?image.file_name,
        "Upload received"
    );

    let receipt = state.registry.upload(&image.data, metadata).await?;
    Ok(Json(receipt.into()))
}
