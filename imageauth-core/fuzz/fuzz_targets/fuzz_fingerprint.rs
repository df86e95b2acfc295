#![no_main]

//! Fuzz target for fingerprint extraction
//!
//! Arbitrary bytes must either be rejected as invalid input or produce a
//! well-formed fingerprint. Neither decoding nor extraction may panic.
//!
//! Run with: cargo +nightly fuzz run fuzz_fingerprint

use imageauth_core::{DeepClassifier, FingerprintExtractor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let extractor = FingerprintExtractor::default();
    if let Ok(fingerprint) = extractor.extract_bytes(data) {
        assert_eq!(fingerprint.perceptual_hash.hamming_distance(&fingerprint.perceptual_hash), 0);
        if let Some(descriptor) = &fingerprint.feature_descriptor {
            assert!(descriptor.values().iter().all(|v| v.is_finite()));
        }
    }

    // The classifier must fail open on garbage rather than panic
    let verdict = DeepClassifier::disabled().classify_bytes(data);
    assert!(verdict.degraded);
});
