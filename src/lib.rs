//! Per-client autoencoder fraud detection
//!
//! Each client's history yields a behavioral baseline; transactions are
//! turned into baseline-relative feature vectors and scored by the
//! reconstruction error of a small dense autoencoder.

pub mod baseline;
pub mod config;
pub mod detector;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod reason;
pub mod source;
pub mod types;

pub use baseline::{BaselineCache, ClientBaseline};
pub use config::AppConfig;
pub use detector::{BatchReport, FraudDetector};
pub use error::{DetectorError, Result};
pub use feature_extractor::{FeatureExtractor, FeatureVector};
pub use models::{AnomalyScorer, Autoencoder, ModelHandle, Trainer};
pub use producer::AlertProducer;
pub use types::{Alert, AlertReason, ScoringRequest, ScoringResponse, Transaction};
