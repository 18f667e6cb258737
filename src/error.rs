//! Error types for baseline building, training and scoring

use thiserror::Error;

/// Errors raised by the detection core.
#[derive(Error, Debug)]
pub enum DetectorError {
    /// A baseline was requested for a client without any transactions.
    /// The id is unknown when the history itself was empty.
    #[error("No transaction history{}", for_client(client_id))]
    NoHistory { client_id: Option<u64> },

    /// A history passed to the baseline builder spans several clients.
    #[error("History mixes clients {expected} and {found}")]
    MixedHistory { expected: u64, found: u64 },

    /// Amount standard deviation is zero. Scoring still works through the
    /// epsilon guard; this is only reported.
    #[error("Degenerate amount statistics for client {client_id} (std = 0)")]
    DegenerateStatistics { client_id: u64 },

    /// Scoring was attempted before a model was trained or loaded.
    #[error("No compressive model is loaded")]
    ModelUnavailable,

    /// A single input record could not be used. `line` is set for records
    /// read from a file.
    #[error("Malformed transaction{}: {reason}", at_line(line))]
    MalformedTransaction { line: Option<u64>, reason: String },

    /// Training was started with no vectors left after filtering.
    #[error("Training corpus is empty")]
    EmptyCorpus,

    /// A threshold could not be resolved or is not usable.
    #[error("Threshold unavailable: {0}")]
    ThresholdUnavailable(String),

    /// The model artifact is unreadable or does not match the topology.
    #[error("Invalid model artifact: {0}")]
    ModelArtifact(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DetectorError {
    /// Whether this error only affects a single record or client.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DetectorError::NoHistory { .. }
                | DetectorError::MixedHistory { .. }
                | DetectorError::DegenerateStatistics { .. }
                | DetectorError::MalformedTransaction { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;

fn for_client(client_id: &Option<u64>) -> String {
    client_id.map(|id| format!(" for client {}", id)).unwrap_or_default()
}

fn at_line(line: &Option<u64>) -> String {
    line.map(|l| format!(" at line {}", l)).unwrap_or_default()
}
