//! Perceptual hashing for images.
//!
//! The perceptual hash summarizes low-frequency visual structure so that small
//! pixel edits barely move it, while deliberate morphs and crops move it more.
//!
//! # Algorithm
//!
//! DCT-preprocessed median hash: grayscale, downscale, 2-D DCT, keep the
//! top-left 8×8 coefficient block, set each bit when the coefficient exceeds the
//! block median. Output is always 64 bits.
//!
//! # Usage
//!
//! ```no_run
//! use imageauth_core::fingerprint::PerceptualHasher;
//!
//! let image = image::open("image.jpg").unwrap();
//! let hasher = PerceptualHasher::default();
//! let hash1 = hasher.hash_image(&image);
//!
//! let image2 = image::open("image2.jpg").unwrap();
//! let hash2 = hasher.hash_image(&image2);
//! let near_duplicate = hash1.hamming_distance(&hash2) < 8;
//! ```

use std::fmt;

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ImageAuthError, Result};

/// Fixed hash size in bytes (64 bits = 8 bytes).
pub const PERCEPTUAL_HASH_SIZE: usize = 8;

/// Fixed hash size in bits.
pub const PERCEPTUAL_HASH_BITS: u32 = (PERCEPTUAL_HASH_SIZE * 8) as u32;

/// Side length of the low-frequency DCT block kept for the hash.
const HASH_GRID: u32 = 8;

/// A 64-bit perceptual hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash([u8; PERCEPTUAL_HASH_SIZE]);

impl PerceptualHash {
    pub const fn new(hash: [u8; PERCEPTUAL_HASH_SIZE]) -> Self {
        Self(hash)
    }

    /// Build from a byte slice; must be exactly 8 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let hash: [u8; PERCEPTUAL_HASH_SIZE] = bytes.try_into().map_err(|_| {
            ImageAuthError::InvalidInput(format!(
                "Perceptual hash must be {} bytes, got {}",
                PERCEPTUAL_HASH_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(hash))
    }

    pub fn as_bytes(&self) -> &[u8; PERCEPTUAL_HASH_SIZE] {
        &self.0
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    /// Number of differing bits between two hashes (0..=64).
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        hamming_distance(&self.0, &other.0)
    }

    /// Get the hash as a hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create a perceptual hash from a hexadecimal string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| {
            ImageAuthError::InvalidInput(format!("Invalid perceptual hash hex: {e}"))
        })?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PerceptualHash({})", self.to_hex())
    }
}

impl Serialize for PerceptualHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PerceptualHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Perceptual hasher (DCT median hash, 8×8 bits).
#[derive(Debug, Clone, Copy, Default)]
pub struct PerceptualHasher;

impl PerceptualHasher {
    pub fn new() -> Self {
        Self
    }

    /// Compute the perceptual hash of a decoded image.
    pub fn hash_image(&self, image: &DynamicImage) -> PerceptualHash {
        let hasher = HasherConfig::new()
            .hash_size(HASH_GRID, HASH_GRID)
            .hash_alg(HashAlg::Median)
            .preproc_dct()
            .to_hasher();

        let hash = hasher.hash_image(image);
        let mut bytes = [0u8; PERCEPTUAL_HASH_SIZE];
        // 8×8 bits always packs into exactly 8 bytes
        for (dst, src) in bytes.iter_mut().zip(hash.as_bytes()) {
            *dst = *src;
        }
        PerceptualHash(bytes)
    }

    /// Decode raw bytes and hash them.
    ///
    /// Supports JPEG, PNG, GIF, and WebP formats.
    pub fn hash_bytes(&self, image_data: &[u8]) -> Result<PerceptualHash> {
        let image = image::load_from_memory(image_data)
            .map_err(|e| ImageAuthError::InvalidInput(format!("Failed to decode image: {e}")))?;
        Ok(self.hash_image(&image))
    }

    /// Check if the provided bytes appear to be a supported image format.
    pub fn is_supported_format(data: &[u8]) -> bool {
        image::guess_format(data).is_ok()
    }
}

/// Compute Hamming distance between two equal-size hash byte arrays.
pub fn hamming_distance(a: &[u8; PERCEPTUAL_HASH_SIZE], b: &[u8; PERCEPTUAL_HASH_SIZE]) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn gradient_image() -> DynamicImage {
        let img = ImageBuffer::from_fn(64, 64, |x, y| {
            let band = if (x / 8 + y / 16) % 2 == 0 { 60 } else { 0 };
            Luma([((x * 3) as u8).saturating_add(band)])
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_perceptual_hash_size() {
        assert_eq!(PERCEPTUAL_HASH_SIZE, 8);
        assert_eq!(PERCEPTUAL_HASH_BITS, 64);
    }

    #[test]
    fn test_hamming_distance_identical() {
        let a = PerceptualHash::new([0x00, 0xFF, 0xAA, 0x55, 0x00, 0xFF, 0xAA, 0x55]);
        assert_eq!(a.hamming_distance(&a), 0);
    }

    #[test]
    fn test_hamming_distance_all_bits() {
        let a = PerceptualHash::new([0x00; 8]);
        let b = PerceptualHash::new([0xFF; 8]);
        assert_eq!(a.hamming_distance(&b), 64);

        let c = PerceptualHash::new([0xAA; 8]);
        let d = PerceptualHash::new([0x55; 8]);
        assert_eq!(c.hamming_distance(&d), 64);
    }

    #[test]
    fn test_hamming_distance_partial() {
        let a = PerceptualHash::new([0x00; 8]);
        let b = PerceptualHash::new([0x01, 0, 0, 0, 0, 0, 0x80, 0]);
        assert_eq!(a.hamming_distance(&b), 2);
        assert_eq!(b.hamming_distance(&a), 2);
    }

    #[test]
    fn test_perceptual_hash_hex_roundtrip() {
        let original = PerceptualHash::new([0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xBA, 0xBE]);
        let hex = original.to_hex();
        assert_eq!(hex, "deadbeefcafebabe");
        assert_eq!(PerceptualHash::from_hex(&hex).unwrap(), original);
        assert_eq!(original.as_u64(), 0xDEAD_BEEF_CAFE_BABE);
    }

    #[test]
    fn test_from_hex_rejects_wrong_size() {
        // Legacy 5-byte hashes are not comparable under the fixed 64-bit contract
        assert!(PerceptualHash::from_hex("0011223344").is_err());
        assert!(PerceptualHash::from_hex("not hex").is_err());
    }

    #[test]
    fn test_hash_is_deterministic_and_self_distance_zero() {
        let image = gradient_image();
        let hasher = PerceptualHasher::new();
        let h1 = hasher.hash_image(&image);
        let h2 = hasher.hash_image(&image);
        assert_eq!(h1, h2);
        assert_eq!(h1.hamming_distance(&h2), 0);
    }

    #[test]
    fn test_hash_bytes_rejects_garbage() {
        let hasher = PerceptualHasher::new();
        assert!(hasher.hash_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn test_is_supported_format() {
        // PNG magic bytes
        assert!(PerceptualHasher::is_supported_format(&[
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A
        ]));

        // JPEG magic bytes
        assert!(PerceptualHasher::is_supported_format(&[0xFF, 0xD8, 0xFF]));

        // Invalid
        assert!(!PerceptualHasher::is_supported_format(&[0x00, 0x00, 0x00]));
    }
}
