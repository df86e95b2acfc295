//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod upload;
pub mod verify;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use upload::{upload_handler, DetectionBody, SimilarityMatchBody, UploadResponse};
pub use verify::{verify_handler, LocalData, VerifyRequest, VerifyResponse};
