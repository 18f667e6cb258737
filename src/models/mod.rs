//! Compressive model: topology, training, persistence and scoring

pub mod inference;
pub mod loader;
pub mod network;
pub mod threshold;
pub mod training;

pub use inference::{AnomalyScorer, Score};
pub use loader::{load_model, save_model, ModelHandle};
pub use network::Autoencoder;
pub use threshold::{FixedThreshold, PercentileThreshold, ThresholdPolicy, ZScoreThreshold};
pub use training::{build_training_corpus, Trainer, TrainingCorpus, TrainingReport};
