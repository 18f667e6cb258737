//! Scoring statistics for batch detection runs.

use crate::types::alert::AlertReason;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Keep at most this many samples per series.
const MAX_SAMPLES: usize = 10_000;

/// Metrics collector for the scoring path
pub struct DetectionMetrics {
    /// Total transactions scored
    pub transactions_scored: AtomicU64,
    /// Total transactions flagged as fraud
    pub alerts_raised: AtomicU64,
    /// Scoring requests that could not be served (no history, no model)
    pub unscoreable: AtomicU64,
    alerts_by_reason: RwLock<HashMap<AlertReason, u64>>,
    /// Processing times in microseconds
    processing_times: RwLock<Vec<u64>>,
    reconstruction_errors: RwLock<Vec<f64>>,
    start_time: Instant,
}

impl DetectionMetrics {
    pub fn new() -> Self {
        Self {
            transactions_scored: AtomicU64::new(0),
            alerts_raised: AtomicU64::new(0),
            unscoreable: AtomicU64::new(0),
            alerts_by_reason: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            reconstruction_errors: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a scored transaction
    pub fn record_score(&self, processing_time: Duration, error: f64) {
        self.transactions_scored.fetch_add(1, Ordering::Relaxed);

        let mut times = self.processing_times.write();
        times.push(processing_time.as_micros() as u64);
        if times.len() > MAX_SAMPLES {
            times.drain(0..MAX_SAMPLES / 2);
        }
        drop(times);

        let mut errors = self.reconstruction_errors.write();
        errors.push(error);
        if errors.len() > MAX_SAMPLES {
            errors.drain(0..MAX_SAMPLES / 2);
        }
    }

    /// Record a flagged transaction
    pub fn record_alert(&self, reason: AlertReason) {
        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
        *self.alerts_by_reason.write().entry(reason).or_insert(0) += 1;
    }

    pub fn record_unscoreable(&self) {
        self.unscoreable.fetch_add(1, Ordering::Relaxed);
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = self.processing_times.read().clone();
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Get reconstruction error distribution
    pub fn get_error_stats(&self) -> ErrorStats {
        let mut sorted = self.reconstruction_errors.read().clone();
        if sorted.is_empty() {
            return ErrorStats::default();
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        ErrorStats {
            count: count as u64,
            mean: sorted.iter().sum::<f64>() / count as f64,
            p50: sorted[count / 2],
            p80: sorted[(count as f64 * 0.80) as usize],
            p99: sorted[(count as f64 * 0.99) as usize],
            max: sorted[count - 1],
        }
    }

    /// Get current throughput (transactions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get alerts by reason
    pub fn get_alerts_by_reason(&self) -> HashMap<AlertReason, u64> {
        self.alerts_by_reason.read().clone()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let scored = self.transactions_scored.load(Ordering::Relaxed);
        let alerts = self.alerts_raised.load(Ordering::Relaxed);
        let unscoreable = self.unscoreable.load(Ordering::Relaxed);
        let alert_rate = if scored > 0 {
            (alerts as f64 / scored as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let errors = self.get_error_stats();
        let throughput = self.get_throughput();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              FRAUD SCORING - METRICS SUMMARY                 ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Transactions Scored: {:>8}  │  Throughput: {:>9.1} tx/s ║",
            scored, throughput
        );
        info!(
            "║ Alerts Raised:       {:>8}  │  Alert Rate: {:>9.1}%    ║",
            alerts, alert_rate
        );
        info!("║ Unscoreable:         {:>8}                                 ║", unscoreable);
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!(
            "║ Reconstruction Error: mean={:.4} p50={:.4} p80={:.4} p99={:.4} max={:.4}",
            errors.mean, errors.p50, errors.p80, errors.p99, errors.max
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Alerts by Reason:                                            ║");
        let mut by_reason: Vec<(AlertReason, u64)> = self.get_alerts_by_reason().into_iter().collect();
        by_reason.sort_by(|a, b| b.1.cmp(&a.1));
        for (reason, count) in by_reason {
            let pct = if alerts > 0 {
                (count as f64 / alerts as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:<58} {:>6} ({:>5.1}%)", reason.as_str(), count, pct);
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for DetectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Reconstruction error statistics
#[derive(Debug, Default)]
pub struct ErrorStats {
    pub count: u64,
    pub mean: f64,
    pub p50: f64,
    pub p80: f64,
    pub p99: f64,
    pub max: f64,
}
