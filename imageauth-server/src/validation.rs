//! Upload validation module
//!
//! Cheap checks applied to an uploaded image before it reaches the detection pipeline.

use imageauth_core::PerceptualHasher;

use crate::error::ApiError;

/// MIME prefixes accepted for the image part of an upload
const ALLOWED_MIME_PREFIXES: &[&str] = &["image/", "application/octet-stream"];

/// Validates the declared Content-Type of an uploaded image
///
/// Accepts `image/*` and `application/octet-stream` (the decoder sniffs the
/// real format). A missing Content-Type is treated as binary.
pub fn validate_content_type(content_type: Option<&str>) -> Result<(), ApiError> {
    let Some(ct) = content_type else {
        return Ok(());
    };

    let ct_lower = ct.to_lowercase();
    if ALLOWED_MIME_PREFIXES
        .iter()
        .any(|prefix| ct_lower.starts_with(prefix))
    {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Unsupported Content-Type: '{}'. Allowed types: image/*, application/octet-stream",
            ct
        )))
    }
}

/// Validates the size of an uploaded image
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ApiError> {
    if size == 0 {
        return Err(ApiError::bad_request("Uploaded image is empty"));
    }
    if size > max_size {
        let max_mb = max_size / (1024 * 1024);
        let actual_mb = size / (1024 * 1024);
        return Err(ApiError::bad_request(format!(
            "Image too large: {} MB exceeds maximum of {} MB",
            actual_mb, max_mb
        )));
    }
    Ok(())
}

/// Rejects bytes whose magic number matches no known image format
pub fn validate_image_signature(data: &[u8]) -> Result<(), ApiError> {
    if PerceptualHasher::is_supported_format(data) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Unrecognized image format"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_images_accepted() {
        assert!(validate_content_type(Some("image/jpeg")).is_ok());
        assert!(validate_content_type(Some("image/png")).is_ok());
        assert!(validate_content_type(Some("IMAGE/WEBP")).is_ok());
        assert!(validate_content_type(Some("application/octet-stream")).is_ok());
        assert!(validate_content_type(None).is_ok());
    }

    #[test]
    fn test_content_type_rejected() {
        assert!(validate_content_type(Some("video/mp4")).is_err());
        assert!(validate_content_type(Some("text/html")).is_err());
        assert!(validate_content_type(Some("application/json")).is_err());
    }

    #[test]
    fn test_file_size_bounds() {
        let max = 10 * 1024 * 1024;
        assert!(validate_file_size(1024, max).is_ok());
        assert!(validate_file_size(max, max).is_ok());
        assert!(validate_file_size(max + 1, max).is_err());
        assert!(validate_file_size(0, max).is_err());
    }

    #[test]
    fn test_image_signature() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert!(validate_image_signature(&png_magic).is_ok());
        assert!(validate_image_signature(b"%PDF-1.7 not an image").is_err());
    }
}
