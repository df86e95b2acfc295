//! Deep morph classifier wrapper.
//!
//! The model itself is an injected [`MorphModel`]; this module owns
//! preprocessing, label thresholding and the fail-open policy. The classifier
//! never returns an error: missing models, undecodable images, inference
//! failures and nonsensical probabilities all degrade to a "real" verdict with
//! zero confidence, flagged as degraded so callers can tell.

#[cfg(feature = "onnx")]
mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxConfig, OnnxMorphModel};

use std::fmt;
use std::sync::Arc;

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::fingerprint::decode_image;

/// Probability at or above which an image is labelled real.
pub const REAL_THRESHOLD: f32 = 0.5;

/// Default model input side.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierLabel {
    Real,
    Morphed,
}

impl fmt::Display for ClassifierLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => f.write_str("real"),
            Self::Morphed => f.write_str("morphed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub label: ClassifierLabel,
    /// Confidence in `label`, in `[0, 1]`.
    pub confidence: f32,
    /// True when the verdict is the fail-open default rather than a model output.
    pub degraded: bool,
}

impl ClassifierVerdict {
    pub const fn fail_open() -> Self {
        Self {
            label: ClassifierLabel::Real,
            confidence: 0.0,
            degraded: true,
        }
    }

    /// Map the model's "real" probability to a label and confidence.
    pub fn from_real_probability(p: f32) -> Self {
        if p >= REAL_THRESHOLD {
            Self {
                label: ClassifierLabel::Real,
                confidence: p,
                degraded: false,
            }
        } else {
            Self {
                label: ClassifierLabel::Morphed,
                confidence: 1.0 - p,
                degraded: false,
            }
        }
    }

    pub fn is_morphed(&self) -> bool {
        self.label == ClassifierLabel::Morphed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// A binary real/morphed image model.
pub trait MorphModel: Send + Sync {
    /// `(width, height)` the model expects.
    fn input_size(&self) -> (u32, u32) {
        (DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    /// Probability that the image is real, given an NHWC `(1, H, W, 3)`
    /// tensor scaled to `[0, 1]`.
    fn real_probability(&self, input: &Array4<f32>) -> Result<f32>;
}

/// Resize and normalize an image into the model's input tensor.
pub fn preprocess(image: &DynamicImage, model: &dyn MorphModel) -> Array4<f32> {
    let (width, height) = model.input_size();
    let rgb = image
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8();
    let order = model.channel_order();

    Array4::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| {
            let channel = match order {
                ChannelOrder::Rgb => c,
                ChannelOrder::Bgr => 2 - c,
            };
            f32::from(rgb.get_pixel(x as u32, y as u32)[channel]) / 255.0
        },
    )
}

/// Fixed-output model for development and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticModel {
    probability: f32,
}

impl StaticModel {
    pub fn new(real_probability: f32) -> Self {
        Self {
            probability: real_probability,
        }
    }
}

impl MorphModel for StaticModel {
    fn real_probability(&self, _input: &Array4<f32>) -> Result<f32> {
        Ok(self.probability)
    }
}

/// Fail-open wrapper around an optional model.
#[derive(Clone)]
pub struct DeepClassifier {
    model: Option<Arc<dyn MorphModel>>,
}

impl fmt::Debug for DeepClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepClassifier")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl DeepClassifier {
    pub fn new(model: Arc<dyn MorphModel>) -> Self {
        Self { model: Some(model) }
    }

    /// No model configured; every verdict is the degraded default.
    pub fn disabled() -> Self {
        Self { model: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn classify(&self, image: &DynamicImage) -> ClassifierVerdict {
        let Some(model) = &self.model else {
            debug!("No classifier model loaded, failing open");
            return ClassifierVerdict::fail_open();
        };

        let input = preprocess(image, model.as_ref());
        match model.real_probability(&input) {
            Ok(p) if p.is_finite() && (0.0..=1.0).contains(&p) => {
                let verdict = ClassifierVerdict::from_real_probability(p);
                debug!(
                    label = %verdict.label,
                    confidence = verdict.confidence,
                    "Classifier verdict"
                );
                verdict
            }
            Ok(p) => {
                warn!(probability = p, "Classifier returned out-of-range probability, failing open");
                ClassifierVerdict::fail_open()
            }
            Err(e) => {
                warn!(error = %e, "Classifier inference failed, failing open");
                ClassifierVerdict::fail_open()
            }
        }
    }

    pub fn classify_bytes(&self, data: &[u8]) -> ClassifierVerdict {
        match decode_image(data) {
            Ok(image) => self.classify(&image),
            Err(e) => {
                warn!(error = %e, "Classifier could not decode image, failing open");
                ClassifierVerdict::fail_open()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageAuthError;
    use image::{ImageBuffer, Rgb};

    struct FailingModel;

    impl MorphModel for FailingModel {
        fn real_probability(&self, _input: &Array4<f32>) -> Result<f32> {
            Err(ImageAuthError::Classifier("runtime exploded".into()))
        }
    }

    /// Reports the mean of the first channel so tests can observe preprocessing.
    struct ProbeModel {
        order: ChannelOrder,
    }

    impl MorphModel for ProbeModel {
        fn input_size(&self) -> (u32, u32) {
            (4, 2)
        }

        fn channel_order(&self) -> ChannelOrder {
            self.order
        }

        fn real_probability(&self, input: &Array4<f32>) -> Result<f32> {
            assert_eq!(input.shape(), &[1, 2, 4, 3]);
            Ok(input[[0, 0, 0, 0]])
        }
    }

    fn red_image() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(16, 16, Rgb([255, 0, 0])))
    }

    #[test]
    fn test_probability_mapping() {
        let real = ClassifierVerdict::from_real_probability(0.8);
        assert_eq!(real.label, ClassifierLabel::Real);
        assert!((real.confidence - 0.8).abs() < 1e-6);

        let morphed = ClassifierVerdict::from_real_probability(0.03);
        assert_eq!(morphed.label, ClassifierLabel::Morphed);
        assert!((morphed.confidence - 0.97).abs() < 1e-6);

        // Boundary belongs to real
        assert_eq!(
            ClassifierVerdict::from_real_probability(0.5).label,
            ClassifierLabel::Real
        );
    }

    #[test]
    fn test_disabled_fails_open() {
        let verdict = DeepClassifier::disabled().classify(&red_image());
        assert_eq!(verdict, ClassifierVerdict::fail_open());
        assert!(verdict.degraded);
    }

    #[test]
    fn test_inference_error_fails_open() {
        let classifier = DeepClassifier::new(Arc::new(FailingModel));
        assert_eq!(
            classifier.classify(&red_image()),
            ClassifierVerdict::fail_open()
        );
    }

    #[test]
    fn test_out_of_range_probability_fails_open() {
        for p in [1.5, -0.1, f32::NAN] {
            let classifier = DeepClassifier::new(Arc::new(StaticModel::new(p)));
            assert_eq!(
                classifier.classify(&red_image()),
                ClassifierVerdict::fail_open()
            );
        }
    }

    #[test]
    fn test_undecodable_bytes_fail_open() {
        let classifier = DeepClassifier::new(Arc::new(StaticModel::new(0.1)));
        assert_eq!(
            classifier.classify_bytes(b"garbage"),
            ClassifierVerdict::fail_open()
        );
    }

    #[test]
    fn test_static_model_morphed() {
        let classifier = DeepClassifier::new(Arc::new(StaticModel::new(0.03)));
        let verdict = classifier.classify(&red_image());
        assert!(verdict.is_morphed());
        assert!(!verdict.degraded);
    }

    #[test]
    fn test_preprocess_scales_and_orders_channels() {
        let rgb = DeepClassifier::new(Arc::new(ProbeModel {
            order: ChannelOrder::Rgb,
        }));
        let bgr = DeepClassifier::new(Arc::new(ProbeModel {
            order: ChannelOrder::Bgr,
        }));

        // Red channel first in RGB, blue channel first in BGR
        let v_rgb = rgb.classify(&red_image());
        assert_eq!(v_rgb.label, ClassifierLabel::Real);
        assert!((v_rgb.confidence - 1.0).abs() < 1e-6);

        let v_bgr = bgr.classify(&red_image());
        assert_eq!(v_bgr.label, ClassifierLabel::Morphed);
        assert!((v_bgr.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_label_serde() {
        assert_eq!(
            serde_json::to_string(&ClassifierLabel::Morphed).unwrap(),
            "\"morphed\""
        );
    }
}
