//! Threshold policies.
//!
//! The scorer only ever compares an error with a threshold it is handed.
//! Choosing that threshold is a separate, pluggable concern so calibration
//! can change without touching the scorer.

use crate::config::ThresholdPolicyConfig;
use crate::error::{DetectorError, Result};
use std::fmt::Debug;

/// Resolve a threshold from reference reconstruction errors (e.g. a
/// client's recent transactions).
pub trait ThresholdPolicy: Debug + Send + Sync {
    fn resolve(&self, reference_errors: &[f64]) -> Result<f64>;

    fn name(&self) -> &'static str;
}

/// Constant threshold chosen by calibration. Ignores the reference set.
#[derive(Debug, Clone, Copy)]
pub struct FixedThreshold(pub f64);

impl ThresholdPolicy for FixedThreshold {
    fn resolve(&self, _reference_errors: &[f64]) -> Result<f64> {
        ensure_finite(self.0)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Element `floor(n * percentile)` of the sorted reference errors.
#[derive(Debug, Clone, Copy)]
pub struct PercentileThreshold {
    percentile: f64,
}

impl PercentileThreshold {
    pub fn new(percentile: f64) -> Self {
        Self {
            percentile: percentile.clamp(0.0, 1.0),
        }
    }
}

impl ThresholdPolicy for PercentileThreshold {
    fn resolve(&self, reference_errors: &[f64]) -> Result<f64> {
        let mut sorted = finite_errors(reference_errors)?;
        sorted.sort_by(|a, b| a.total_cmp(b));
        let index = ((sorted.len() as f64 * self.percentile) as usize).min(sorted.len() - 1);
        Ok(sorted[index])
    }

    fn name(&self) -> &'static str {
        "percentile"
    }
}

/// Mean plus `k` population standard deviations of the reference errors.
#[derive(Debug, Clone, Copy)]
pub struct ZScoreThreshold {
    k: f64,
}

impl ZScoreThreshold {
    pub fn new(k: f64) -> Self {
        Self { k }
    }
}

impl ThresholdPolicy for ZScoreThreshold {
    fn resolve(&self, reference_errors: &[f64]) -> Result<f64> {
        let errors = finite_errors(reference_errors)?;
        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;
        let variance = errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        ensure_finite(mean + self.k * variance.sqrt())
    }

    fn name(&self) -> &'static str {
        "z_score"
    }
}

impl ThresholdPolicyConfig {
    /// Instantiate the configured policy.
    pub fn build(&self) -> Box<dyn ThresholdPolicy> {
        match *self {
            ThresholdPolicyConfig::Fixed { value } => Box::new(FixedThreshold(value)),
            ThresholdPolicyConfig::Percentile { percentile } => {
                Box::new(PercentileThreshold::new(percentile))
            }
            ThresholdPolicyConfig::ZScore { k } => Box::new(ZScoreThreshold::new(k)),
        }
    }
}

fn finite_errors(reference_errors: &[f64]) -> Result<Vec<f64>> {
    let errors: Vec<f64> = reference_errors.iter().copied().filter(|e| e.is_finite()).collect();
    if errors.is_empty() {
        return Err(DetectorError::ThresholdUnavailable(
            "no reference errors to derive a threshold from".to_string(),
        ));
    }
    Ok(errors)
}

fn ensure_finite(threshold: f64) -> Result<f64> {
    if threshold.is_finite() {
        Ok(threshold)
    } else {
        Err(DetectorError::ThresholdUnavailable(format!(
            "threshold {} is not finite",
            threshold
        )))
    }
}
