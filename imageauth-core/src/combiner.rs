//! Merges the similarity and classifier signals into the final verdict.

use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifierLabel, ClassifierVerdict};
use crate::matcher::SimilarityMatch;

/// Which detector flagged the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    None,
    Similarity,
    Classifier,
    Both,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Similarity => "similarity",
            Self::Classifier => "classifier",
            Self::Both => "both",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_morph: bool,
    pub similarity_match: Option<SimilarityMatch>,
    pub classifier: ClassifierVerdict,
}

impl Verdict {
    pub fn source(&self) -> DetectionSource {
        let classifier_flagged = self.classifier.label == ClassifierLabel::Morphed;
        match (self.similarity_match.is_some(), classifier_flagged) {
            (true, true) => DetectionSource::Both,
            (true, false) => DetectionSource::Similarity,
            (false, true) => DetectionSource::Classifier,
            (false, false) => DetectionSource::None,
        }
    }

    /// Confidence reported to clients; always the classifier's.
    pub fn model_confidence(&self) -> f32 {
        self.classifier.confidence
    }
}

/// Logical OR of the two signals; either one alone marks the image as a morph.
pub fn combine(similarity_match: Option<SimilarityMatch>, classifier: ClassifierVerdict) -> Verdict {
    let is_morph = similarity_match.is_some() || classifier.label == ClassifierLabel::Morphed;
    Verdict {
        is_morph,
        similarity_match,
        classifier,
    }
}
