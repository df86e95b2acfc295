//! Detection pipeline: decode, fingerprint, then run the similarity scan and
//! the classifier concurrently and combine their signals.

use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::classifier::{ClassifierVerdict, DeepClassifier};
use crate::combiner::{combine, Verdict};
use crate::content::ContentHash;
use crate::corpus::CorpusStore;
use crate::error::Result;
use crate::fingerprint::{decode_image, DescriptorConfig, Fingerprint, FingerprintExtractor};
use crate::matcher::{MatcherConfig, SimilarityMatcher};

/// Tunable knobs for a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub matcher: MatcherConfig,
    pub descriptor: DescriptorConfig,
}

/// Everything computed for one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub content_hash: ContentHash,
    pub fingerprint: Fingerprint,
    pub verdict: Verdict,
}

#[derive(Debug, Clone)]
pub struct DetectionPipeline {
    extractor: FingerprintExtractor,
    matcher: SimilarityMatcher,
    classifier: Arc<DeepClassifier>,
}

impl DetectionPipeline {
    pub fn new(config: DetectionConfig, classifier: DeepClassifier) -> Self {
        Self {
            extractor: FingerprintExtractor::new(config.descriptor),
            matcher: SimilarityMatcher::new(config.matcher),
            classifier: Arc::new(classifier),
        }
    }

    pub fn extractor(&self) -> &FingerprintExtractor {
        &self.extractor
    }

    pub fn matcher(&self) -> &SimilarityMatcher {
        &self.matcher
    }

    pub fn classifier(&self) -> &DeepClassifier {
        &self.classifier
    }

    /// Run detection against `corpus` without mutating anything.
    ///
    /// Fails only on undecodable input or a corpus read error.
    #[instrument(skip_all, fields(bytes = data.len()))]
    pub async fn evaluate(&self, data: &[u8], corpus: &dyn CorpusStore) -> Result<Detection> {
        let content_hash = ContentHash::from_bytes(data);
        let image = Arc::new(decode_image(data)?);
        let fingerprint = self.extractor.extract(&image);

        let (similarity, classifier) = tokio::join!(
            self.matcher.find_match(&fingerprint, corpus),
            self.classify_blocking(Arc::clone(&image)),
        );
        let verdict = combine(similarity?, classifier);

        info!(
            content_hash = %content_hash.short(),
            is_morph = verdict.is_morph,
            source = ?verdict.source(),
            label = %verdict.classifier.label,
            confidence = verdict.classifier.confidence,
            degraded = verdict.classifier.degraded,
            "Detection complete"
        );

        Ok(Detection {
            content_hash,
            fingerprint,
            verdict,
        })
    }

    async fn classify_blocking(&self, image: Arc<DynamicImage>) -> ClassifierVerdict {
        let classifier = Arc::clone(&self.classifier);
        match tokio::task::spawn_blocking(move || classifier.classify(&image)).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "Classifier task failed, failing open");
                ClassifierVerdict::fail_open()
            }
        }
    }
}

impl Default for DetectionPipeline {
    fn default() -> Self {
        Self::new(DetectionConfig::default(), DeepClassifier::disabled())
    }
}
