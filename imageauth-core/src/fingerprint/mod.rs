//! Fingerprint extraction: a perceptual hash plus an optional local-feature
//! descriptor per image.
//!
//! Decoding is the only fallible step. Once an image is decoded the extractor
//! always produces a fingerprint; images without detectable keypoints simply
//! carry no descriptor.

mod descriptor;
mod perceptual;

pub use descriptor::{
    cosine_similarity, DescriptorConfig, DescriptorExtractor, FeatureDescriptor, Keypoint,
    DESCRIPTOR_BYTES, DESCRIPTOR_DIM,
};
pub use perceptual::{
    hamming_distance, PerceptualHash, PerceptualHasher, PERCEPTUAL_HASH_BITS,
    PERCEPTUAL_HASH_SIZE,
};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{ImageAuthError, Result};

/// Compact representation of an image used for similarity comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub perceptual_hash: PerceptualHash,
    /// Absent when no keypoints were detected.
    pub feature_descriptor: Option<FeatureDescriptor>,
}

impl Fingerprint {
    /// Descriptor summary formatted for the ledger; empty when absent.
    pub fn feature_summary(&self) -> String {
        self.feature_descriptor
            .as_ref()
            .map(|d| d.summary().to_string())
            .unwrap_or_default()
    }
}

/// Decode raw upload bytes, guessing the format from content.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    if data.is_empty() {
        return Err(ImageAuthError::InvalidInput("No image data provided".into()));
    }
    image::load_from_memory(data)
        .map_err(|e| ImageAuthError::InvalidInput(format!("Failed to decode image: {e}")))
}

/// Computes fingerprints for decoded images.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintExtractor {
    hasher: PerceptualHasher,
    descriptor: DescriptorExtractor,
}

impl FingerprintExtractor {
    pub fn new(config: DescriptorConfig) -> Self {
        Self {
            hasher: PerceptualHasher::new(),
            descriptor: DescriptorExtractor::new(config),
        }
    }

    pub fn extract(&self, image: &DynamicImage) -> Fingerprint {
        let perceptual_hash = self.hasher.hash_image(image);
        let feature_descriptor = self.descriptor.extract(image);
        if feature_descriptor.is_none() {
            tracing::debug!(phash = %perceptual_hash, "Fingerprint has no feature descriptor");
        }
        Fingerprint {
            perceptual_hash,
            feature_descriptor,
        }
    }

    pub fn extract_bytes(&self, data: &[u8]) -> Result<Fingerprint> {
        let image = decode_image(data)?;
        Ok(self.extract(&image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};
    use std::io::Cursor;

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("png encode");
        out.into_inner()
    }

    #[test]
    fn test_empty_input_is_invalid() {
        let err = decode_image(&[]).unwrap_err();
        assert!(matches!(err, ImageAuthError::InvalidInput(_)));
    }

    #[test]
    fn test_garbage_input_is_invalid() {
        let extractor = FingerprintExtractor::default();
        let err = extractor.extract_bytes(b"not an image at all").unwrap_err();
        assert!(matches!(err, ImageAuthError::InvalidInput(_)));
    }

    #[test]
    fn test_flat_image_has_hash_but_no_descriptor() {
        let flat = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(128, 128, Rgb([90, 90, 90])));
        let fp = FingerprintExtractor::default()
            .extract_bytes(&png_bytes(&flat))
            .unwrap();
        assert!(fp.feature_descriptor.is_none());
        assert_eq!(fp.feature_summary(), "");
    }

    #[test]
    fn test_textured_image_has_descriptor() {
        let textured = DynamicImage::ImageLuma8(ImageBuffer::from_fn(256, 256, |x, y| {
            if (x % 48) >= 24 && (x % 48) < 40 && (y % 48) >= 24 && (y % 48) < 40 {
                Luma([220u8])
            } else {
                Luma([30u8])
            }
        }));
        let fp = FingerprintExtractor::default().extract(&textured);
        assert!(fp.feature_descriptor.is_some());
        assert!(!fp.feature_summary().is_empty());
    }

    #[test]
    fn test_fingerprint_serde() {
        let fp = Fingerprint {
            perceptual_hash: PerceptualHash::new([1, 2, 3, 4, 5, 6, 7, 8]),
            feature_descriptor: None,
        };
        let json = serde_json::to_value(&fp).unwrap();
        assert_eq!(json["perceptual_hash"], "0102030405060708");
        assert!(json["feature_descriptor"].is_null());
    }
}
