//! Feature extraction for autoencoder training and scoring.
//!
//! Each transaction is encoded relative to its client's baseline into a
//! fixed 5-value vector. The same extraction is used for training and for
//! scoring, so any change here invalidates previously trained models.

use crate::baseline::ClientBaseline;
use crate::types::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of features produced per transaction.
pub const FEATURE_COUNT: usize = 5;

/// Guard added to the normalization divisor.
pub const NORMALIZATION_EPSILON: f64 = 1e-6;

/// Default cutoff (in normalized units) for the training outlier filter.
pub const DEFAULT_OUTLIER_CUTOFF: f64 = 5.0;

/// Fixed-order feature vector:
/// `[normalized_amount, normalized_distance, hour, day_of_week, foreign_flag]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn normalized_amount(&self) -> f64 {
        self.0[0]
    }

    pub fn normalized_distance(&self) -> f64 {
        self.0[1]
    }

    pub fn hour(&self) -> f64 {
        self.0[2]
    }

    pub fn day_of_week(&self) -> f64 {
        self.0[3]
    }

    pub fn is_foreign(&self) -> bool {
        self.0[4] > 0.5
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

/// Feature extractor that maps a transaction and its client's baseline to
/// model input features.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    /// Cities that always count as foreign, whatever the client's primary city
    foreign_cities: HashSet<String>,
}

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_foreign_cities<I, S>(cities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            foreign_cities: cities.into_iter().map(Into::into).collect(),
        }
    }

    /// Extract features from a transaction.
    ///
    /// Both the amount and the distance are normalized by
    /// `std_amount + NORMALIZATION_EPSILON`, so a client with a single
    /// repeated amount still produces finite values.
    pub fn extract(&self, tx: &Transaction, baseline: &ClientBaseline) -> FeatureVector {
        let divisor = baseline.std_amount + NORMALIZATION_EPSILON;
        let distance = baseline.distance_from_primary(tx.latitude, tx.longitude);

        let normalized_amount = (tx.amount - baseline.mean_amount) / divisor;
        let normalized_distance = (distance - baseline.mean_distance) / divisor;
        let foreign = if self.is_foreign(tx, baseline) { 1.0 } else { 0.0 };

        FeatureVector([
            normalized_amount,
            normalized_distance,
            tx.hour() as f64,
            tx.day_of_week() as f64,
            foreign,
        ])
    }

    /// Extract features for a batch of transactions sharing one baseline.
    pub fn extract_all(&self, txs: &[Transaction], baseline: &ClientBaseline) -> Vec<FeatureVector> {
        txs.iter().map(|tx| self.extract(tx, baseline)).collect()
    }

    fn is_foreign(&self, tx: &Transaction, baseline: &ClientBaseline) -> bool {
        tx.city != baseline.primary_city || self.foreign_cities.contains(&tx.city)
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in vector order.
    pub fn feature_names(&self) -> [&'static str; FEATURE_COUNT] {
        [
            "norm_amount",
            "norm_distance",
            "hour",
            "day_of_week",
            "is_foreign",
        ]
    }
}

/// Drop vectors whose normalized amount or distance reaches `cutoff`.
///
/// Training-corpus hygiene only; scoring never filters.
pub fn filter_outliers(vectors: &[FeatureVector], cutoff: f64) -> Vec<FeatureVector> {
    vectors
        .iter()
        .filter(|v| v.normalized_amount().abs() < cutoff && v.normalized_distance().abs() < cutoff)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transaction::parse_datetime;

    fn tx(amount: f64, lat: f64, lon: f64, city: &str, when: &str) -> Transaction {
        Transaction::new(11, parse_datetime(when).unwrap(), amount, lat, lon, city)
    }

    fn baseline() -> ClientBaseline {
        ClientBaseline {
            client_id: 11,
            primary_city: "Mexico City".to_string(),
            primary_latitude: 19.4326,
            primary_longitude: -99.1332,
            mean_amount: 200.0,
            std_amount: 50.0,
            mean_distance: 400.0,
            foreign_rate: 0.0,
            transaction_count: 30,
        }
    }

    #[test]
    fn test_feature_extraction() {
        let extractor = FeatureExtractor::new();
        // Wednesday
        let t = tx(300.0, 19.4326, -99.1332, "Mexico City", "2024-01-03 08:45:00");

        let features = extractor.extract(&t, &baseline());

        assert!((features.normalized_amount() - 100.0 / (50.0 + 1e-6)).abs() < 1e-12);
        assert!((features.normalized_distance() - (-400.0 / (50.0 + 1e-6))).abs() < 1e-12);
        assert_eq!(features.hour(), 8.0);
        assert_eq!(features.day_of_week(), 2.0);
        assert!(!features.is_foreign());
    }

    #[test]
    fn test_foreign_flag() {
        let extractor = FeatureExtractor::new();
        let t = tx(100.0, 48.8566, 2.3522, "Paris", "2024-01-03 08:45:00");
        assert!(extractor.extract(&t, &baseline()).is_foreign());

        let always_foreign = FeatureExtractor::with_foreign_cities(["Mexico City"]);
        let home = tx(100.0, 19.4326, -99.1332, "Mexico City", "2024-01-03 08:45:00");
        assert!(always_foreign.extract(&home, &baseline()).is_foreign());
    }

    #[test]
    fn test_zero_std_stays_finite() {
        let extractor = FeatureExtractor::new();
        let mut b = baseline();
        b.std_amount = 0.0;

        for amount in [0.0, 200.0, 1e6, -5e4] {
            let v = extractor.extract(&tx(amount, 19.5, -99.2, "Mexico City", "2024-01-03 08:45:00"), &b);
            assert!(v.normalized_amount().is_finite());
            assert!(v.normalized_distance().is_finite());
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = FeatureExtractor::new();
        let t = tx(123.45, 19.44, -99.12, "Mexico City", "2024-06-30 23:59:59");
        let a = extractor.extract(&t, &baseline());
        let b = extractor.extract(&t, &baseline());
        for (x, y) in a.values().iter().zip(b.values()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_filter_outliers() {
        let vectors = vec![
            FeatureVector::new([0.5, 0.2, 10.0, 1.0, 0.0]),
            FeatureVector::new([6.0, 0.2, 10.0, 1.0, 0.0]),
            FeatureVector::new([0.5, -5.0, 10.0, 1.0, 0.0]),
            FeatureVector::new([-4.9, 4.9, 3.0, 6.0, 1.0]),
        ];

        let filtered = filter_outliers(&vectors, DEFAULT_OUTLIER_CUTOFF);
        assert_eq!(filtered, vec![vectors[0], vectors[3]]);

        let again = filter_outliers(&filtered, DEFAULT_OUTLIER_CUTOFF);
        assert_eq!(again, filtered);
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.feature_count(), 5);
        assert_eq!(extractor.feature_names().len(), 5);
    }
}
