//! Local-feature descriptor summary.
//!
//! Detects FAST-9 corners on a fixed-resolution grayscale copy of the image,
//! orients each one by intensity centroid, and computes a steered 256-bit BRIEF
//! descriptor on a smoothed copy (the ORB recipe). The unordered descriptor set
//! is then collapsed to a single mean vector so that comparing two images costs
//! O(1) instead of a descriptor-set matching pass.

use std::sync::OnceLock;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::{ImageAuthError, Result};

/// Bytes per binary keypoint descriptor (256 bits).
pub const DESCRIPTOR_BYTES: usize = 32;

/// Dimensionality of the mean-vector summary.
pub const DESCRIPTOR_DIM: usize = DESCRIPTOR_BYTES;

/// BRIEF test pairs per descriptor.
const PATTERN_PAIRS: usize = DESCRIPTOR_BYTES * 8;

/// Sampling pattern coordinates lie in `[-PATTERN_EXTENT, PATTERN_EXTENT]`.
const PATTERN_EXTENT: i32 = 13;

/// Radius of the circular patch used for orientation.
const ORIENTATION_RADIUS: i32 = 15;

/// Keypoints closer than this to an edge are discarded; covers the rotated
/// sampling pattern (13·√2) and the orientation patch.
const BORDER: u32 = 20;

/// Contiguous circle pixels required by the segment test.
const FAST_ARC: usize = 9;

/// Standard deviation of the smoothing applied before BRIEF sampling.
const SMOOTHING_SIGMA: f32 = 2.0;

/// Fixed seed for the sampling pattern; changing it invalidates stored descriptors.
const PATTERN_SEED: u64 = 0x1A6E_A07B_0B5E_55ED;

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Knobs for keypoint detection and description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    /// Square side the image is resized to before detection.
    pub resolution: u32,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Strongest keypoints kept per image.
    pub max_keypoints: usize,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            resolution: 256,
            fast_threshold: 20,
            max_keypoints: 500,
        }
    }
}

/// A detected, oriented keypoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: u32,
    pub y: u32,
    pub score: u32,
    /// Orientation in radians.
    pub angle: f32,
}

/// Mean of the binary descriptors of an image, one entry per descriptor byte.
///
/// Entries are mean byte values in `[0, 255]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureDescriptor(Vec<f32>);

impl FeatureDescriptor {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(ImageAuthError::InvalidInput(format!(
                "Feature descriptor must have {} entries, got {}",
                DESCRIPTOR_DIM,
                values.len()
            )));
        }
        Ok(Self(values))
    }

    /// Average a set of raw binary descriptors.
    ///
    /// Returns `None` for an empty set.
    pub fn from_binary(descriptors: &[[u8; DESCRIPTOR_BYTES]]) -> Option<Self> {
        if descriptors.is_empty() {
            return None;
        }

        let mut sums = [0u64; DESCRIPTOR_BYTES];
        for descriptor in descriptors {
            for (sum, byte) in sums.iter_mut().zip(descriptor) {
                *sum += u64::from(*byte);
            }
        }

        let count = descriptors.len() as f64;
        Some(Self(
            sums.iter().map(|s| (*s as f64 / count) as f32).collect(),
        ))
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// Scalar summary forwarded to the ledger: the mean over all entries.
    pub fn summary(&self) -> f32 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.iter().sum::<f32>() / self.0.len() as f32
    }

    /// Storage encoding: little-endian `f32` sequence.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DESCRIPTOR_DIM * 4 {
            return Err(ImageAuthError::Serialization(format!(
                "Feature descriptor blob must be {} bytes, got {}",
                DESCRIPTOR_DIM * 4,
                bytes.len()
            )));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self(values))
    }
}

/// Cosine similarity of two optional descriptors.
///
/// Absent descriptors, mismatched dimensions and zero-norm vectors all
/// evaluate to 0.0, which can never confirm a match.
pub fn cosine_similarity(a: Option<&FeatureDescriptor>, b: Option<&FeatureDescriptor>) -> f32 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    if a.0.len() != b.0.len() || a.0.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.0.iter().zip(&b.0) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 || !dot.is_finite() {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// ORB-style descriptor extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorExtractor {
    config: DescriptorConfig,
}

impl DescriptorExtractor {
    pub fn new(config: DescriptorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DescriptorConfig {
        &self.config
    }

    /// Extract the mean descriptor, or `None` when no keypoints survive.
    pub fn extract(&self, image: &DynamicImage) -> Option<FeatureDescriptor> {
        let side = self.config.resolution;
        let gray = image
            .resize_exact(side, side, FilterType::Triangle)
            .to_luma8();

        let keypoints = self.detect_keypoints(&gray);
        if keypoints.is_empty() {
            tracing::debug!("No keypoints detected, descriptor absent");
            return None;
        }

        let smoothed = image::imageops::blur(&gray, SMOOTHING_SIGMA);
        let descriptors: Vec<[u8; DESCRIPTOR_BYTES]> = keypoints
            .iter()
            .map(|kp| describe(&smoothed, kp))
            .collect();

        tracing::trace!(keypoints = descriptors.len(), "Computed binary descriptors");
        FeatureDescriptor::from_binary(&descriptors)
    }

    /// FAST-9 detection with 3×3 non-maximum suppression, oriented and
    /// truncated to the strongest `max_keypoints`.
    pub fn detect_keypoints(&self, gray: &GrayImage) -> Vec<Keypoint> {
        let (width, height) = gray.dimensions();
        if width <= 2 * BORDER || height <= 2 * BORDER {
            return Vec::new();
        }

        let threshold = i32::from(self.config.fast_threshold);
        let pixels = gray.as_raw();
        let w = width as usize;
        let at = |x: i32, y: i32| -> i32 { i32::from(pixels[y as usize * w + x as usize]) };

        let mut scores = vec![0u32; w * height as usize];
        for y in BORDER..height - BORDER {
            for x in BORDER..width - BORDER {
                let (xi, yi) = (x as i32, y as i32);
                let center = at(xi, yi);
                let ring: [i32; 16] = std::array::from_fn(|i| {
                    let (dx, dy) = CIRCLE[i];
                    at(xi + dx, yi + dy)
                });
                scores[y as usize * w + x as usize] = fast_score(center, &ring, threshold);
            }
        }

        let mut keypoints = Vec::new();
        for y in BORDER..height - BORDER {
            for x in BORDER..width - BORDER {
                let score = scores[y as usize * w + x as usize];
                if score == 0 || !is_local_max(&scores, w, x as usize, y as usize, score) {
                    continue;
                }
                keypoints.push(Keypoint {
                    x,
                    y,
                    score,
                    angle: orientation(gray, x as i32, y as i32),
                });
            }
        }

        keypoints.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        keypoints.truncate(self.config.max_keypoints);
        keypoints
    }
}

/// Segment-test score: 0 when not a corner, otherwise the larger of the summed
/// excess brightness/darkness over the threshold.
fn fast_score(center: i32, ring: &[i32; 16], threshold: i32) -> u32 {
    let brighter = ring.map(|v| v > center + threshold);
    let darker = ring.map(|v| v < center - threshold);

    if !has_arc(&brighter) && !has_arc(&darker) {
        return 0;
    }

    let bright_sum: i32 = ring
        .iter()
        .filter(|v| **v > center + threshold)
        .map(|v| v - center - threshold)
        .sum();
    let dark_sum: i32 = ring
        .iter()
        .filter(|v| **v < center - threshold)
        .map(|v| center - v - threshold)
        .sum();

    bright_sum.max(dark_sum).max(1) as u32
}

/// True when at least `FAST_ARC` consecutive flags (wrapping) are set.
fn has_arc(flags: &[bool; 16]) -> bool {
    let mut run = 0;
    for i in 0..(16 + FAST_ARC) {
        if flags[i % 16] {
            run += 1;
            if run >= FAST_ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Ties resolve to the earliest pixel in raster order.
fn is_local_max(scores: &[u32], w: usize, x: usize, y: usize, score: u32) -> bool {
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if nx == x && ny == y {
                continue;
            }
            let other = scores[ny * w + nx];
            let earlier = (ny, nx) < (y, x);
            if other > score || (earlier && other == score) {
                return false;
            }
        }
    }
    true
}

/// Intensity-centroid orientation over a circular patch.
fn orientation(gray: &GrayImage, cx: i32, cy: i32) -> f32 {
    let mut m01 = 0i64;
    let mut m10 = 0i64;
    let r2 = ORIENTATION_RADIUS * ORIENTATION_RADIUS;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let v = i64::from(gray.get_pixel((cx + dx) as u32, (cy + dy) as u32)[0]);
            m10 += i64::from(dx) * v;
            m01 += i64::from(dy) * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

/// Steered BRIEF: rotate the sampling pattern by the keypoint angle and
/// compare smoothed intensities pairwise.
fn describe(smoothed: &GrayImage, kp: &Keypoint) -> [u8; DESCRIPTOR_BYTES] {
    let (sin, cos) = kp.angle.sin_cos();
    let (cx, cy) = (kp.x as i32, kp.y as i32);
    let sample = |(px, py): (i32, i32)| -> u8 {
        let (fx, fy) = (px as f32, py as f32);
        let rx = (fx * cos - fy * sin).round() as i32;
        let ry = (fx * sin + fy * cos).round() as i32;
        smoothed.get_pixel((cx + rx) as u32, (cy + ry) as u32)[0]
    };

    let mut descriptor = [0u8; DESCRIPTOR_BYTES];
    for (i, (p1, p2)) in sampling_pattern().iter().enumerate() {
        if sample(*p1) < sample(*p2) {
            descriptor[i / 8] |= 1 << (i % 8);
        }
    }
    descriptor
}

type PatternPair = ((i32, i32), (i32, i32));

fn sampling_pattern() -> &'static [PatternPair] {
    static PATTERN: OnceLock<Vec<PatternPair>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut state = PATTERN_SEED;
        let mut coord = || {
            let span = (2 * PATTERN_EXTENT + 1) as u64;
            (splitmix64(&mut state) % span) as i32 - PATTERN_EXTENT
        };
        let mut pairs = Vec::with_capacity(PATTERN_PAIRS);
        while pairs.len() < PATTERN_PAIRS {
            let p1 = (coord(), coord());
            let p2 = (coord(), coord());
            if p1 != p2 {
                pairs.push((p1, p2));
            }
        }
        pairs
    })
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
