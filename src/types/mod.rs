//! Type definitions for the fraud scoring core

pub mod alert;
pub mod scoring;
pub mod transaction;

pub use alert::{Alert, AlertReason};
pub use scoring::{ScoringContext, ScoringRequest, ScoringResponse, ScoringStatus};
pub use transaction::Transaction;
