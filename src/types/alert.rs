//! Fraud alert data structures

use crate::types::transaction::Transaction;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable justification attached to a scored transaction.
///
/// Exactly one reason is chosen per alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertReason {
    AmountOutlier,
    LocationOutlier,
    ForeignTransactionOutlier,
    ReconstructionAnomaly,
    NoAnomaly,
}

impl AlertReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertReason::AmountOutlier => "amount outlier",
            AlertReason::LocationOutlier => "location outlier",
            AlertReason::ForeignTransactionOutlier => "foreign transaction outlier",
            AlertReason::ReconstructionAnomaly => {
                "reconstruction anomaly (unspecified feature contribution)"
            }
            AlertReason::NoAnomaly => "no anomaly detected",
        }
    }
}

impl fmt::Display for AlertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scoring one transaction against its client's baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Client the transaction belongs to
    pub client_id: u64,

    /// Transaction timestamp
    #[serde(with = "crate::types::transaction::datetime_serde")]
    pub datetime: NaiveDateTime,

    /// Transaction amount
    pub amount: f64,

    /// Transaction city
    pub city: String,

    /// Reconstruction error (mean squared error)
    pub error: f64,

    /// Threshold the error was compared against
    pub threshold: f64,

    /// Fraud verdict (`error > threshold`)
    pub is_fraud: bool,

    /// Why the transaction was (or was not) flagged
    pub reason: AlertReason,
}

impl Alert {
    /// Create an alert for a scored transaction
    pub fn new(
        transaction: &Transaction,
        error: f64,
        threshold: f64,
        is_fraud: bool,
        reason: AlertReason,
    ) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            client_id: transaction.client_id,
            datetime: transaction.datetime,
            amount: transaction.amount,
            city: transaction.city.clone(),
            error,
            threshold,
            is_fraud,
            reason,
        }
    }
}
