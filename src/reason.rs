//! Alert reason resolution.
//!
//! One reason per alert, checked in priority order: amount, location,
//! foreign city, then an unattributed reconstruction anomaly.

use crate::baseline::ClientBaseline;
use crate::config::ReasonConfig;
use crate::feature_extractor::FeatureVector;
use crate::types::alert::AlertReason;

#[derive(Debug, Clone, Default)]
pub struct ReasonResolver {
    cutoffs: ReasonConfig,
}

impl ReasonResolver {
    pub fn new(cutoffs: ReasonConfig) -> Self {
        Self { cutoffs }
    }

    pub fn cutoffs(&self) -> &ReasonConfig {
        &self.cutoffs
    }

    /// First matching reason for a scored vector.
    pub fn resolve(
        &self,
        vector: &FeatureVector,
        baseline: &ClientBaseline,
        is_fraud: bool,
    ) -> AlertReason {
        if !is_fraud {
            return AlertReason::NoAnomaly;
        }

        if vector.normalized_amount().abs() > self.cutoffs.amount_cutoff {
            AlertReason::AmountOutlier
        } else if vector.normalized_distance().abs() > self.cutoffs.distance_cutoff {
            AlertReason::LocationOutlier
        } else if vector.is_foreign() && baseline.foreign_rate <= self.cutoffs.foreign_rate_cutoff {
            AlertReason::ForeignTransactionOutlier
        } else {
            AlertReason::ReconstructionAnomaly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(foreign_rate: f64) -> ClientBaseline {
        ClientBaseline {
            client_id: 3,
            primary_city: "Monterrey".to_string(),
            primary_latitude: 25.6866,
            primary_longitude: -100.3161,
            mean_amount: 180.0,
            std_amount: 95.0,
            mean_distance: 700.0,
            foreign_rate,
            transaction_count: 120,
        }
    }

    fn v(amount: f64, distance: f64, foreign: bool) -> FeatureVector {
        FeatureVector::new([amount, distance, 12.0, 2.0, if foreign { 1.0 } else { 0.0 }])
    }

    #[test]
    fn test_priority_order() {
        let resolver = ReasonResolver::default();
        let b = baseline(0.0);

        assert_eq!(resolver.resolve(&v(9.0, 40.0, true), &b, true), AlertReason::AmountOutlier);
        assert_eq!(resolver.resolve(&v(-4.0, 0.0, false), &b, true), AlertReason::AmountOutlier);
        assert_eq!(resolver.resolve(&v(1.0, 40.0, true), &b, true), AlertReason::LocationOutlier);
        assert_eq!(
            resolver.resolve(&v(1.0, 0.5, true), &b, true),
            AlertReason::ForeignTransactionOutlier
        );
        assert_eq!(
            resolver.resolve(&v(1.0, 0.5, false), &b, true),
            AlertReason::ReconstructionAnomaly
        );
    }

    #[test]
    fn test_foreign_requires_rare_history() {
        let resolver = ReasonResolver::default();
        assert_eq!(
            resolver.resolve(&v(0.2, 0.1, true), &baseline(0.3), true),
            AlertReason::ReconstructionAnomaly
        );
    }

    #[test]
    fn test_not_flagged() {
        let resolver = ReasonResolver::default();
        assert_eq!(
            resolver.resolve(&v(9.0, 40.0, true), &baseline(0.0), false),
            AlertReason::NoAnomaly
        );
    }

    #[test]
    fn test_custom_cutoffs() {
        let resolver = ReasonResolver::new(ReasonConfig {
            amount_cutoff: 10.0,
            distance_cutoff: 50.0,
            foreign_rate_cutoff: 0.5,
        });
        assert_eq!(
            resolver.resolve(&v(9.0, 40.0, true), &baseline(0.3), true),
            AlertReason::ForeignTransactionOutlier
        );
    }
}
