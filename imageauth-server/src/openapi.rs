//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 document served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::handlers::{
    DetectionBody, HealthResponse, LocalData, ReadyResponse, SimilarityMatchBody, UploadResponse,
    VerifyRequest, VerifyResponse,
};

/// ImageAuth API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ImageAuth API",
        version = "0.1.0",
        description = r#"
## Morph and Near-Duplicate Detection for Image Registration

Every uploaded image is checked before it is registered:

- **Exact duplicates** are rejected by SHA-256 content hash
- **Near-duplicates** are found with a perceptual-hash filter confirmed by keypoint descriptor similarity
- **Morphs** are flagged by a deep classifier (fails open when unavailable)

Accepted images are registered on the ledger of record and added to the local corpus.

### How It Works

1. **Upload** an image via `POST /upload`
2. The response carries the content hash, the ledger transaction reference and the morph verdict
3. **Verify** a registration later via `POST /verify` with the content hash
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Registration", description = "Detect and register images"),
        (name = "Verification", description = "Look registrations up by content hash"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::upload::upload_handler,
        crate::handlers::verify::verify_handler,
    ),
    components(
        schemas(
            UploadResponse,
            DetectionBody,
            SimilarityMatchBody,
            VerifyRequest,
            VerifyResponse,
            LocalData,
            HealthResponse,
            ReadyResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_all_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/upload", "/verify", "/health", "/ready"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
