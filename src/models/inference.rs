//! Reconstruction-error scoring against the shared model

use crate::error::{DetectorError, Result};
use crate::feature_extractor::FeatureVector;
use crate::models::loader::ModelHandle;
use std::sync::Arc;
use tracing::debug;

/// Reconstruction error of one vector and the verdict for a threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub error: f64,
    pub threshold: f64,
    pub is_fraud: bool,
}

impl Score {
    /// Compare an error with a caller-supplied threshold.
    pub fn classify(error: f64, threshold: f64) -> Self {
        Self {
            error,
            threshold,
            is_fraud: error > threshold,
        }
    }
}

/// Stateless scorer; concurrent calls share the handle's current model.
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    model: Arc<ModelHandle>,
}

impl AnomalyScorer {
    pub fn new(model: Arc<ModelHandle>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    /// Score one vector. The threshold is never computed here. A vector or
    /// error that is not finite is rejected rather than classified.
    pub fn score(&self, vector: &FeatureVector, threshold: f64) -> Result<Score> {
        check_threshold(threshold)?;
        check_vector(vector)?;
        let model = self.model.current()?;
        let error = check_error(model.reconstruction_error(vector))?;
        let score = Score::classify(error, threshold);

        debug!(
            error = score.error,
            threshold = score.threshold,
            is_fraud = score.is_fraud,
            "Vector scored"
        );

        Ok(score)
    }

    /// Reconstruction errors for a batch, all computed against the same
    /// model snapshot.
    pub fn reconstruction_errors(&self, vectors: &[FeatureVector]) -> Result<Vec<f64>> {
        let model = self.model.current()?;
        Ok(vectors.iter().map(|v| model.reconstruction_error(v)).collect())
    }

    /// Score a batch against one threshold.
    pub fn score_batch(&self, vectors: &[FeatureVector], threshold: f64) -> Result<Vec<Score>> {
        check_threshold(threshold)?;
        self.reconstruction_errors(vectors)?
            .into_iter()
            .map(|error| Ok(Score::classify(check_error(error)?, threshold)))
            .collect()
    }
}

fn check_vector(vector: &FeatureVector) -> Result<()> {
    if vector.values().iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DetectorError::MalformedTransaction {
            line: None,
            reason: format!("feature vector is not finite: {:?}", vector.values()),
        })
    }
}

/// A reconstruction error usable for a verdict.
pub(crate) fn check_error(error: f64) -> Result<f64> {
    if error.is_finite() {
        Ok(error)
    } else {
        Err(DetectorError::MalformedTransaction {
            line: None,
            reason: format!("reconstruction error is not finite: {}", error),
        })
    }
}

fn check_threshold(threshold: f64) -> Result<()> {
    if threshold.is_nan() {
        return Err(DetectorError::ThresholdUnavailable(
            "threshold is NaN".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::network::Autoencoder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scorer() -> AnomalyScorer {
        let model = Autoencoder::initialize(&mut StdRng::seed_from_u64(5));
        AnomalyScorer::new(Arc::new(ModelHandle::with_model(model)))
    }

    fn vector() -> FeatureVector {
        FeatureVector::new([0.4, -0.2, 15.0, 3.0, 0.0])
    }

    #[test]
    fn test_unloaded_model_fails() {
        let scorer = AnomalyScorer::new(Arc::new(ModelHandle::empty()));
        assert!(matches!(
            scorer.score(&vector(), 1.0),
            Err(DetectorError::ModelUnavailable)
        ));
        assert!(matches!(
            scorer.reconstruction_errors(&[vector()]),
            Err(DetectorError::ModelUnavailable)
        ));
    }

    #[test]
    fn test_verdict_is_strictly_greater() {
        let scorer = scorer();
        let error = scorer.score(&vector(), 0.0).unwrap().error;
        assert!(error > 0.0);

        assert!(scorer.score(&vector(), error - 1e-9).unwrap().is_fraud);
        assert!(!scorer.score(&vector(), error).unwrap().is_fraud);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let scorer = scorer();
        let mut previous_fraud = true;
        for step in 0..2000 {
            let threshold = step as f64 * 0.5;
            let verdict = scorer.score(&vector(), threshold).unwrap().is_fraud;
            // Once cleared, raising the threshold never flags it again.
            assert!(previous_fraud || !verdict);
            previous_fraud = verdict;
        }
        assert!(!previous_fraud);
    }

    #[test]
    fn test_batch_matches_single() {
        let scorer = scorer();
        let vectors = vec![vector(), FeatureVector::new([3.0, 8.0, 2.0, 6.0, 1.0])];
        let batch = scorer.score_batch(&vectors, 10.0).unwrap();
        for (v, s) in vectors.iter().zip(&batch) {
            assert_eq!(*s, scorer.score(v, 10.0).unwrap());
        }
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let scorer = scorer();
        for bad in [f64::NAN, f64::INFINITY] {
            let vector = FeatureVector::new([bad, 0.0, 12.0, 3.0, 0.0]);
            assert!(matches!(
                scorer.score(&vector, 1.0),
                Err(DetectorError::MalformedTransaction { line: None, .. })
            ));
            assert!(scorer.score_batch(&[vector], 1.0).is_err());
        }
    }

    #[test]
    fn test_overflowing_error_rejected() {
        // Finite input whose squared difference overflows
        let vector = FeatureVector::new([1e200, 0.0, 12.0, 3.0, 0.0]);
        assert!(matches!(
            scorer().score(&vector, 1.0),
            Err(DetectorError::MalformedTransaction { .. })
        ));
    }

    #[test]
    fn test_nan_threshold_rejected() {
        assert!(matches!(
            scorer().score(&vector(), f64::NAN),
            Err(DetectorError::ThresholdUnavailable(_))
        ));
    }
}
