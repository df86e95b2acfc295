//! Registration verification handler
//!
//! Handles POST /verify requests: ledger lookup merged with the local corpus.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use imageauth_core::{ContentHash, VerifyReport};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for verification
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    /// SHA-256 content hash returned by /upload (64 hex characters)
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub hash: String,
}

/// What the local corpus knows about the hash
#[derive(Debug, Serialize, ToSchema)]
pub struct LocalData {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Response for verification
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    /// Whether the ledger has a registration for this hash
    #[schema(example = true)]
    pub verified: bool,
    /// Ledger registration time (Unix seconds), 0 when unknown
    #[schema(example = 1717000000)]
    pub timestamp: i64,
    pub metadata: String,
    pub is_morph: bool,
    pub local_data: LocalData,
}

impl From<VerifyReport> for VerifyResponse {
    fn from(report: VerifyReport) -> Self {
        Self {
            verified: report.verified,
            timestamp: report.timestamp,
            metadata: report.metadata,
            is_morph: report.is_morph,
            local_data: LocalData {
                exists: report.local.exists,
                metadata: report.local.metadata,
            },
        }
    }
}

/// Verify a registration by content hash
///
/// An unknown hash is not an error: the response reports `verified: false`.
#[utoipa::path(
    post,
    path = "/verify",
    tag = "Verification",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Verification completed", body = VerifyResponse),
        (status = 400, description = "Missing or malformed hash"),
        (status = 502, description = "Ledger lookup failed"),
        (status = 503, description = "Corpus store unavailable")
    )
)]
pub async fn verify_handler(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?;
    let hash = ContentHash::from_hex(request.hash.trim())?;

    let report = state.registry.verify(&hash).await?;
    Ok(Json(report.into()))
}
