//! CSV transaction source.
//!
//! Reads the `idClient,datetime,amount,latitude,longitude,city` layout.
//! A bad record is skipped and reported; it never aborts the rest of the
//! file.

use crate::error::{DetectorError, Result};
use crate::types::transaction::Transaction;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// Parsed transactions plus the records that were rejected
#[derive(Debug, Default)]
pub struct SourceReport {
    pub transactions: Vec<Transaction>,
    pub rejected: Vec<DetectorError>,
}

impl SourceReport {
    /// Transactions of a single client, in file order.
    pub fn for_client(&self, client_id: u64) -> Vec<Transaction> {
        self.transactions
            .iter()
            .filter(|t| t.client_id == client_id)
            .cloned()
            .collect()
    }
}

/// Read transactions from a CSV file.
pub fn read_path<P: AsRef<Path>>(path: P) -> Result<SourceReport> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let report = read_transactions(BufReader::new(file))?;

    info!(
        path = %path.display(),
        transactions = report.transactions.len(),
        rejected = report.rejected.len(),
        "Transactions loaded"
    );

    Ok(report)
}

/// Read transactions from any CSV reader with a header row.
pub fn read_transactions<R: Read>(reader: R) -> Result<SourceReport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut report = SourceReport::default();

    for (index, result) in reader.deserialize::<Transaction>().enumerate() {
        // Header is line 1
        let fallback_line = index as u64 + 2;

        let transaction = match result {
            Ok(transaction) => transaction,
            Err(e) if e.is_io_error() => {
                return Err(DetectorError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    e.to_string(),
                )));
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                warn!(line = line, error = %e, "Skipping malformed transaction");
                report.rejected.push(DetectorError::MalformedTransaction {
                    line: Some(line),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if let Err(reason) = transaction.validate() {
            warn!(line = fallback_line, reason = %reason, "Skipping invalid transaction");
            report.rejected.push(DetectorError::MalformedTransaction {
                line: Some(fallback_line),
                reason,
            });
            continue;
        }

        report.transactions.push(transaction);
    }

    Ok(report)
}
