//! ONNX Runtime model loading and inference via the `ort` crate.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use super::{ChannelOrder, MorphModel, DEFAULT_INPUT_SIZE};
use crate::error::{ImageAuthError, Result};

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub input_name: String,
    pub output_name: String,
    pub input_size: (u32, u32),
    pub channel_order: ChannelOrder,
    pub intra_threads: usize,
}

impl OnnxConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_name: "input".into(),
            output_name: "output".into(),
            input_size: (DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE),
            channel_order: ChannelOrder::Rgb,
            intra_threads: 4,
        }
    }
}

fn ort_error(e: impl std::fmt::Display) -> ImageAuthError {
    ImageAuthError::Classifier(e.to_string())
}

/// Binary real/morphed classifier exported to ONNX.
///
/// The model must take a single NHWC float tensor and produce the "real"
/// probability as the first element of its output.
pub struct OnnxMorphModel {
    session: Mutex<Session>,
    config: OnnxConfig,
}

impl OnnxMorphModel {
    /// Load the model once; the session is reused for every request.
    pub fn load(config: OnnxConfig) -> Result<Self> {
        let session = Session::builder()
            .map_err(ort_error)?
            .with_intra_threads(config.intra_threads)
            .map_err(ort_error)?
            .commit_from_file(&config.model_path)
            .map_err(ort_error)?;

        tracing::info!(model_path = %config.model_path.display(), "Loaded ONNX morph model");

        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    pub fn from_path(model_path: &Path) -> Result<Self> {
        Self::load(OnnxConfig::new(model_path))
    }
}

impl MorphModel for OnnxMorphModel {
    fn input_size(&self) -> (u32, u32) {
        self.config.input_size
    }

    fn channel_order(&self) -> ChannelOrder {
        self.config.channel_order
    }

    fn real_probability(&self, input: &Array4<f32>) -> Result<f32> {
        let input_tensor = TensorRef::from_array_view(input).map_err(ort_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ImageAuthError::Classifier(format!("lock error: {e}")))?;
        let outputs = session
            .run(ort::inputs![self.config.input_name.clone() => input_tensor])
            .map_err(ort_error)?;

        let output_array = outputs[self.config.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(ort_error)?;

        output_array
            .iter()
            .next()
            .copied()
            .ok_or_else(|| ImageAuthError::Classifier("Model produced an empty output".into()))
    }
}
