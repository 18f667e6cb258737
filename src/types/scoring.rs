//! Request/response records for scoring a single transaction

use crate::baseline::ClientBaseline;
use crate::types::alert::{Alert, AlertReason};
use crate::types::transaction::Transaction;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// What the caller knows about the client's normal behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringContext {
    /// Raw history; a baseline is built from the transactions that belong
    /// to the scored client.
    History(Vec<Transaction>),
    /// Baseline computed earlier (e.g. from a [`crate::baseline::BaselineCache`]).
    Baseline(ClientBaseline),
}

/// A request to score one transaction against an externally chosen threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub transaction: Transaction,
    pub context: ScoringContext,
    pub threshold: f64,
}

impl ScoringRequest {
    pub fn with_history(transaction: Transaction, history: Vec<Transaction>, threshold: f64) -> Self {
        Self {
            transaction,
            context: ScoringContext::History(history),
            threshold,
        }
    }

    pub fn with_baseline(transaction: Transaction, baseline: ClientBaseline, threshold: f64) -> Self {
        Self {
            transaction,
            context: ScoringContext::Baseline(baseline),
            threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStatus {
    Scored,
    InsufficientHistory,
}

/// Scoring verdict returned to the request boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResponse {
    pub client_id: u64,
    #[serde(with = "crate::types::transaction::datetime_serde")]
    pub datetime: NaiveDateTime,
    pub status: ScoringStatus,
    pub is_fraud: bool,
    pub reason: String,
    /// Reconstruction error; absent when the client could not be scored
    pub error: Option<f64>,
    pub threshold: f64,
}

impl ScoringResponse {
    /// Response for a client whose history cannot support a baseline.
    pub fn insufficient_history(transaction: &Transaction, threshold: f64) -> Self {
        Self {
            client_id: transaction.client_id,
            datetime: transaction.datetime,
            status: ScoringStatus::InsufficientHistory,
            is_fraud: false,
            reason: "insufficient history".to_string(),
            error: None,
            threshold,
        }
    }

    pub fn reason_is(&self, reason: AlertReason) -> bool {
        self.status == ScoringStatus::Scored && self.reason == reason.as_str()
    }
}

impl From<&Alert> for ScoringResponse {
    fn from(alert: &Alert) -> Self {
        Self {
            client_id: alert.client_id,
            datetime: alert.datetime,
            status: ScoringStatus::Scored,
            is_fraud: alert.is_fraud,
            reason: alert.reason.to_string(),
            error: Some(alert.error),
            threshold: alert.threshold,
        }
    }
}
