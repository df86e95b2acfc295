//! Health check handlers
//!
//! Provides health and readiness endpoints for monitoring and orchestration.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status: "healthy" or "degraded"
    #[schema(example = "healthy")]
    pub status: &'static str,
    /// Server version from Cargo.toml
    pub version: &'static str,
    /// Service name
    pub service: &'static str,
    /// Corpus store backend ("memory" or "sqlite")
    pub corpus_backend: &'static str,
    /// Registered images, absent when the corpus could not be counted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_size: Option<u64>,
    /// Ledger adapter ("memory" or "http")
    pub ledger: &'static str,
    /// Whether a morph classifier model is loaded
    pub classifier_loaded: bool,
}

/// GET /health - Health check endpoint
///
/// Reports `degraded` when the classifier is disabled (uploads fail open on
/// that signal) or the corpus cannot be counted.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service status", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = &state.registry;
    let classifier_loaded = registry.pipeline().classifier().is_loaded();
    let corpus_size = match registry.corpus_size().await {
        Ok(size) => Some(size),
        Err(e) => {
            tracing::warn!(error = %e, "Corpus size unavailable");
            None
        }
    };

    let status = if classifier_loaded && corpus_size.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        service: "imageauth-server",
        corpus_backend: registry.corpus().backend(),
        corpus_size,
        ledger: registry.ledger().name(),
        classifier_loaded,
    })
}

/// Readiness response for Kubernetes
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether the service is ready to accept traffic
    pub ready: bool,
    /// Optional message explaining status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// GET /ready - Kubernetes readiness probe
///
/// Returns 503 while the corpus store is unreachable.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready", body = ReadyResponse),
        (status = 503, description = "Corpus store unreachable", body = ReadyResponse)
    )
)]
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    match state.registry.corpus_size().await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    message: Some("Corpus store unreachable"),
                }),
            )
        }
    }
}
