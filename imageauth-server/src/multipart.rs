//! Multipart form parsing for image uploads

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::error::ApiError;
use crate::validation::{validate_content_type, validate_file_size};

/// Field names accepted for the image part, in order of preference
pub const IMAGE_FIELD_NAMES: &[&str] = &["image", "file"];

/// Image bytes uploaded via multipart form
#[derive(Debug, Clone)]
pub struct ImageField {
    pub data: Vec<u8>,
    /// Content-Type from the multipart field (if provided)
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

/// Parsed multipart form fields
#[derive(Debug, Default)]
pub struct MultipartFields {
    image: Option<ImageField>,
    text_fields: HashMap<String, String>,
}

impl MultipartFields {
    /// Parse all fields from a multipart request
    ///
    /// The image part is validated for Content-Type and size as it is read.
    /// Unknown file parts are rejected so a client cannot smuggle a second
    /// image under another name.
    pub async fn parse(multipart: &mut Multipart, max_file_size: usize) -> Result<Self, ApiError> {
        let mut fields = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to parse multipart: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();

            if IMAGE_FIELD_NAMES.contains(&name.as_str()) {
                if fields.image.is_some() {
                    return Err(ApiError::bad_request(
                        "Multiple images provided; upload one image per request",
                    ));
                }

                let content_type = field.content_type().map(|s| s.to_string());
                let file_name = field.file_name().map(|s| s.to_string());
                validate_content_type(content_type.as_deref())?;

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read image: {}", e)))?
                    .to_vec();
                validate_file_size(data.len(), max_file_size)?;

                fields.image = Some(ImageField {
                    data,
                    content_type,
                    file_name,
                });
            } else if field.file_name().is_some() {
                return Err(ApiError::bad_request(format!(
                    "Unexpected file field '{}'. Use 'image' for the upload.",
                    name
                )));
            } else {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read field '{}': {}", name, e))
                })?;
                fields.text_fields.insert(name, value);
            }
        }

        Ok(fields)
    }

    /// Get the image field, or an error naming the expected field
    pub fn require_image(&self) -> Result<&ImageField, ApiError> {
        self.image.as_ref().ok_or_else(|| {
            ApiError::bad_request("No image provided. Use 'image' field in multipart form.")
        })
    }

    /// Get a text field value
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.text_fields.get(name).map(|s| s.as_str())
    }
}
