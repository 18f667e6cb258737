//! Configuration management for training and scoring

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Prefix of environment overrides (`FRAUD__SECTION__KEY`).
pub const ENV_PREFIX: &str = "FRAUD";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub detection: DetectionConfig,
    pub logging: LoggingConfig,
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path of the serialized autoencoder weights
    pub path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model/autoencoder.bin"),
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over the corpus
    pub epochs: usize,
    /// Mini-batch size (the last batch may be smaller)
    pub batch_size: usize,
    /// Adam step size
    pub learning_rate: f64,
    /// Seed for weight initialization and shuffling
    pub seed: u64,
    /// Reshuffle the corpus every epoch
    pub shuffle: bool,
    /// Normalized amount/distance cutoff for the training outlier filter
    pub outlier_cutoff: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            seed: 42,
            shuffle: true,
            outlier_cutoff: 5.0,
        }
    }
}

/// How a scoring threshold is chosen for a set of reference errors
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdPolicyConfig {
    /// Constant chosen by calibration
    Fixed { value: f64 },
    /// Percentile of the reference errors (0.0 - 1.0)
    Percentile { percentile: f64 },
    /// Mean plus `k` standard deviations of the reference errors
    ZScore { k: f64 },
}

impl Default for ThresholdPolicyConfig {
    fn default() -> Self {
        ThresholdPolicyConfig::Percentile { percentile: 0.80 }
    }
}

/// Cutoffs used to pick an alert reason
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReasonConfig {
    /// Normalized amount magnitude that counts as an amount outlier
    pub amount_cutoff: f64,
    /// Normalized distance magnitude that counts as a location outlier
    pub distance_cutoff: f64,
    /// Historical foreign-transaction rate at or below which a foreign city
    /// is unusual for the client
    pub foreign_rate_cutoff: f64,
}

impl Default for ReasonConfig {
    fn default() -> Self {
        Self {
            amount_cutoff: 3.0,
            distance_cutoff: 3.0,
            foreign_rate_cutoff: 0.01,
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DetectionConfig {
    pub threshold: ThresholdPolicyConfig,
    pub reasons: ReasonConfig,
    /// Cities always treated as foreign
    pub foreign_cities: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file if present, then apply
    /// `FRAUD__SECTION__KEY` environment overrides.
    pub fn load() -> Result<Self> {
        Self::build(File::with_name(DEFAULT_CONFIG_PATH).required(false))
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(File::from(path.as_ref()))
    }

    fn build(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self> {
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.training.epochs, 50);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.learning_rate, 0.001);
        assert_eq!(config.training.outlier_cutoff, 5.0);
        assert_eq!(
            config.detection.threshold,
            ThresholdPolicyConfig::Percentile { percentile: 0.80 }
        );
        assert!(config.detection.foreign_cities.is_empty());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[model]
path = "artifacts/ae.bin"

[training]
epochs = 5
seed = 9

[detection]
foreign_cities = ["London", "Paris"]

[detection.threshold]
kind = "z_score"
k = 2.5

[detection.reasons]
amount_cutoff = 4.0
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.model.path, PathBuf::from("artifacts/ae.bin"));
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.seed, 9);
        // Unspecified keys keep their defaults
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.detection.threshold, ThresholdPolicyConfig::ZScore { k: 2.5 });
        assert_eq!(config.detection.reasons.amount_cutoff, 4.0);
        assert_eq!(config.detection.reasons.distance_cutoff, 3.0);
        assert_eq!(config.detection.foreign_cities, vec!["London", "Paris"]);
    }
}
