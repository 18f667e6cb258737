//! Per-client behavioral baselines.
//!
//! A baseline summarizes where a client usually transacts and how much it
//! usually spends. It is always recomputed from the client's full history;
//! [`BaselineCache`] only decides *when* that recomputation happens.

use crate::error::{DetectorError, Result};
use crate::types::transaction::Transaction;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mean Earth radius in meters used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two points (haversine formula).
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Learned "normal" behavior of one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientBaseline {
    pub client_id: u64,
    /// Most frequent city in the history
    pub primary_city: String,
    /// Median latitude of the history
    pub primary_latitude: f64,
    /// Median longitude of the history
    pub primary_longitude: f64,
    pub mean_amount: f64,
    /// Sample standard deviation of the amount (0 for a single transaction)
    pub std_amount: f64,
    /// Mean distance in meters from the primary location
    pub mean_distance: f64,
    /// Share of history transactions outside the primary city
    pub foreign_rate: f64,
    pub transaction_count: usize,
}

impl ClientBaseline {
    /// Build a baseline from one client's transaction history.
    ///
    /// Fails with [`DetectorError::NoHistory`] on an empty history and with
    /// [`DetectorError::MixedHistory`] when the history spans several clients.
    pub fn from_history(history: &[Transaction]) -> Result<Self> {
        let first = history
            .first()
            .ok_or(DetectorError::NoHistory { client_id: None })?;
        let client_id = first.client_id;

        if let Some(other) = history.iter().find(|t| t.client_id != client_id) {
            return Err(DetectorError::MixedHistory {
                expected: client_id,
                found: other.client_id,
            });
        }

        let primary_city = primary_city(history);
        let primary_latitude = median(history.iter().map(|t| t.latitude).collect());
        let primary_longitude = median(history.iter().map(|t| t.longitude).collect());

        let n = history.len() as f64;
        let mean_amount = history.iter().map(|t| t.amount).sum::<f64>() / n;
        let sum_sq: f64 = history
            .iter()
            .map(|t| (t.amount - mean_amount).powi(2))
            .sum();
        let std_amount = if history.len() > 1 {
            (sum_sq / (n - 1.0)).sqrt()
        } else {
            0.0
        };

        let mean_distance = history
            .iter()
            .map(|t| haversine(t.latitude, t.longitude, primary_latitude, primary_longitude))
            .sum::<f64>()
            / n;

        let foreign = history.iter().filter(|t| t.city != primary_city).count();
        let foreign_rate = foreign as f64 / n;

        let baseline = Self {
            client_id,
            primary_city,
            primary_latitude,
            primary_longitude,
            mean_amount,
            std_amount,
            mean_distance,
            foreign_rate,
            transaction_count: history.len(),
        };

        if baseline.is_degenerate() {
            warn!(
                client_id = client_id,
                transactions = history.len(),
                "Amount standard deviation is zero, normalization relies on epsilon guard"
            );
        }

        debug!(
            client_id = client_id,
            primary_city = %baseline.primary_city,
            mean_amount = baseline.mean_amount,
            std_amount = baseline.std_amount,
            mean_distance = baseline.mean_distance,
            "Client baseline computed"
        );

        Ok(baseline)
    }

    /// Distance in meters from this client's primary location.
    pub fn distance_from_primary(&self, latitude: f64, longitude: f64) -> f64 {
        haversine(latitude, longitude, self.primary_latitude, self.primary_longitude)
    }

    /// True when every historical amount is identical.
    pub fn is_degenerate(&self) -> bool {
        self.std_amount == 0.0
    }
}

/// Mode of the city labels. Ties go to the lexicographically smallest city.
fn primary_city(history: &[Transaction]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for t in history {
        *counts.entry(t.city.as_str()).or_insert(0) += 1;
    }

    let mut best = ("", 0usize);
    for (city, count) in counts {
        if count > best.1 {
            best = (city, count);
        }
    }
    best.0.to_string()
}

/// Upper median: element `n / 2` of the sorted values.
fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    values[values.len() / 2]
}

/// `Transaction::validate` as a detector error for an in-memory record.
pub(crate) fn check_transaction(transaction: &Transaction) -> Result<()> {
    transaction
        .validate()
        .map_err(|reason| DetectorError::MalformedTransaction { line: None, reason })
}

/// Group transactions by client and build every baseline in parallel.
pub fn build_baselines(transactions: &[Transaction]) -> BTreeMap<u64, Result<ClientBaseline>> {
    group_by_client(transactions)
        .into_par_iter()
        .map(|(client_id, history)| (client_id, ClientBaseline::from_history(&history)))
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

/// Split a transaction list into per-client histories, preserving order.
pub fn group_by_client(transactions: &[Transaction]) -> BTreeMap<u64, Vec<Transaction>> {
    let mut grouped: BTreeMap<u64, Vec<Transaction>> = BTreeMap::new();
    for t in transactions {
        grouped.entry(t.client_id).or_default().push(t.clone());
    }
    grouped
}

#[derive(Debug, Default)]
struct CacheEntry {
    history: Vec<Transaction>,
    baseline: Option<Arc<ClientBaseline>>,
}

/// Baselines keyed by client, invalidated whenever that client ingests a
/// new transaction and rebuilt from the full history on the next lookup.
#[derive(Debug, Default)]
pub struct BaselineCache {
    entries: RwLock<HashMap<u64, CacheEntry>>,
}

impl BaselineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with an existing transaction set. Malformed records
    /// are logged and left out.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let cache = Self::new();
        let rejected = cache.ingest_all(transactions.iter().cloned());
        if !rejected.is_empty() {
            warn!(rejected = rejected.len(), "Malformed transactions left out of the cache");
        }
        cache
    }

    /// Append a transaction to its client's history. A malformed record is
    /// rejected and the history is left unchanged.
    pub fn ingest(&self, transaction: Transaction) -> Result<()> {
        check_transaction(&transaction)?;
        let mut entries = self.entries.write();
        let entry = entries.entry(transaction.client_id).or_default();
        entry.history.push(transaction);
        entry.baseline = None;
        Ok(())
    }

    /// Ingest many transactions under one lock, returning the rejected ones'
    /// errors.
    pub fn ingest_all(&self, transactions: impl IntoIterator<Item = Transaction>) -> Vec<DetectorError> {
        let mut rejected = Vec::new();
        let mut entries = self.entries.write();
        for transaction in transactions {
            if let Err(e) = check_transaction(&transaction) {
                rejected.push(e);
                continue;
            }
            let entry = entries.entry(transaction.client_id).or_default();
            entry.history.push(transaction);
            entry.baseline = None;
        }
        rejected
    }

    /// Baseline for a client, recomputed only if its history changed.
    pub fn baseline(&self, client_id: u64) -> Result<Arc<ClientBaseline>> {
        {
            let entries = self.entries.read();
            match entries.get(&client_id) {
                Some(CacheEntry {
                    baseline: Some(baseline),
                    ..
                }) => return Ok(baseline.clone()),
                Some(_) => {}
                None => {
                    return Err(DetectorError::NoHistory {
                        client_id: Some(client_id),
                    })
                }
            }
        }

        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&client_id)
            .ok_or(DetectorError::NoHistory {
                client_id: Some(client_id),
            })?;

        // Another writer may have rebuilt it between the two locks.
        if let Some(baseline) = &entry.baseline {
            return Ok(baseline.clone());
        }

        let baseline = Arc::new(ClientBaseline::from_history(&entry.history)?);
        entry.baseline = Some(baseline.clone());
        Ok(baseline)
    }

    /// Snapshot of a client's history.
    pub fn history(&self, client_id: u64) -> Vec<Transaction> {
        self.entries
            .read()
            .get(&client_id)
            .map(|e| e.history.clone())
            .unwrap_or_default()
    }

    pub fn is_cached(&self, client_id: u64) -> bool {
        self.entries
            .read()
            .get(&client_id)
            .map(|e| e.baseline.is_some())
            .unwrap_or(false)
    }

    pub fn client_count(&self) -> usize {
        self.entries.read().len()
    }
}
