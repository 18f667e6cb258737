//! Detection orchestration: baseline → features → score → reason.

use crate::baseline::{check_transaction, group_by_client, BaselineCache, ClientBaseline};
use crate::config::DetectionConfig;
use crate::error::{DetectorError, Result};
use crate::feature_extractor::FeatureExtractor;
use crate::metrics::DetectionMetrics;
use crate::models::inference::{check_error, AnomalyScorer, Score};
use crate::models::loader::ModelHandle;
use crate::models::threshold::ThresholdPolicy;
use crate::reason::ReasonResolver;
use crate::types::alert::Alert;
use crate::types::scoring::{ScoringContext, ScoringRequest, ScoringResponse};
use crate::types::transaction::Transaction;
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of scoring a whole transaction set.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Flagged transactions only
    pub alerts: Vec<Alert>,
    pub scored: usize,
    /// Threshold resolved for each scored client
    pub thresholds: BTreeMap<u64, f64>,
    /// Per-client and per-record failures, plus non-fatal notices
    pub issues: Vec<DetectorError>,
}

#[derive(Default)]
struct ClientOutcome {
    alerts: Vec<Alert>,
    scored: usize,
    threshold: Option<f64>,
    issues: Vec<DetectorError>,
}

/// Scores transactions relative to their client's baseline.
pub struct FraudDetector {
    extractor: FeatureExtractor,
    scorer: AnomalyScorer,
    resolver: ReasonResolver,
    policy: Box<dyn ThresholdPolicy>,
    metrics: Arc<DetectionMetrics>,
}

impl FraudDetector {
    pub fn new(
        model: Arc<ModelHandle>,
        extractor: FeatureExtractor,
        resolver: ReasonResolver,
        policy: Box<dyn ThresholdPolicy>,
    ) -> Self {
        Self {
            extractor,
            scorer: AnomalyScorer::new(model),
            resolver,
            policy,
            metrics: Arc::new(DetectionMetrics::new()),
        }
    }

    /// Create a detector from the detection section of the configuration
    pub fn from_config(model: Arc<ModelHandle>, config: &DetectionConfig) -> Self {
        let detector = Self::new(
            model,
            FeatureExtractor::with_foreign_cities(config.foreign_cities.iter().cloned()),
            ReasonResolver::new(config.reasons.clone()),
            config.threshold.build(),
        );

        info!(
            policy = detector.policy.name(),
            foreign_cities = config.foreign_cities.len(),
            "Fraud detector initialized"
        );

        detector
    }

    pub fn with_metrics(mut self, metrics: Arc<DetectionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<DetectionMetrics> {
        &self.metrics
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn policy(&self) -> &dyn ThresholdPolicy {
        self.policy.as_ref()
    }

    /// Score one transaction against a known baseline and threshold.
    ///
    /// A malformed transaction fails with
    /// [`DetectorError::MalformedTransaction`]; it never gets a verdict.
    pub fn score_transaction(
        &self,
        transaction: &Transaction,
        baseline: &ClientBaseline,
        threshold: f64,
    ) -> Result<Alert> {
        check_transaction(transaction)?;
        if baseline.client_id != transaction.client_id {
            return Err(DetectorError::MixedHistory {
                expected: baseline.client_id,
                found: transaction.client_id,
            });
        }

        let started = Instant::now();
        let vector = self.extractor.extract(transaction, baseline);
        let score = self.scorer.score(&vector, threshold)?;
        let reason = self.resolver.resolve(&vector, baseline, score.is_fraud);

        self.metrics.record_score(started.elapsed(), score.error);
        if score.is_fraud {
            self.metrics.record_alert(reason);
        }

        Ok(Alert::new(
            transaction,
            score.error,
            score.threshold,
            score.is_fraud,
            reason,
        ))
    }

    /// Serve a scoring request. A client without usable history gets an
    /// "insufficient history" response instead of a verdict. Malformed
    /// history rows are left out of the baseline.
    pub fn score_request(&self, request: &ScoringRequest) -> Result<ScoringResponse> {
        let transaction = &request.transaction;
        check_transaction(transaction)?;

        let baseline = match &request.context {
            ScoringContext::Baseline(baseline) => Cow::Borrowed(baseline),
            ScoringContext::History(history) => {
                let own = usable_history(history, transaction.client_id);
                match ClientBaseline::from_history(&own) {
                    Ok(baseline) => Cow::Owned(baseline),
                    Err(DetectorError::NoHistory { .. }) => {
                        return Ok(self.insufficient_history(transaction, request.threshold));
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let alert = self.score_transaction(transaction, &baseline, request.threshold)?;

        info!(
            client_id = alert.client_id,
            error = alert.error,
            threshold = alert.threshold,
            is_fraud = alert.is_fraud,
            reason = %alert.reason,
            "Transaction scored"
        );

        Ok(ScoringResponse::from(&alert))
    }

    /// Score against a cached baseline. The transaction is not ingested.
    pub fn score_cached(
        &self,
        cache: &BaselineCache,
        transaction: &Transaction,
        threshold: f64,
    ) -> Result<ScoringResponse> {
        check_transaction(transaction)?;
        match cache.baseline(transaction.client_id) {
            Ok(baseline) => {
                let alert = self.score_transaction(transaction, &baseline, threshold)?;
                Ok(ScoringResponse::from(&alert))
            }
            Err(DetectorError::NoHistory { .. }) => {
                Ok(self.insufficient_history(transaction, threshold))
            }
            Err(e) => Err(e),
        }
    }

    /// Threshold from the configured policy over the reconstruction errors
    /// of the client's own history. Malformed rows do not contribute.
    pub fn calibrate_threshold(
        &self,
        history: &[Transaction],
        baseline: &ClientBaseline,
    ) -> Result<f64> {
        let own = usable_history(history, baseline.client_id);
        let vectors = self.extractor.extract_all(&own, baseline);
        let errors = self.scorer.reconstruction_errors(&vectors)?;
        let threshold = self.policy.resolve(&errors)?;

        debug!(
            client_id = baseline.client_id,
            policy = self.policy.name(),
            samples = errors.len(),
            threshold = threshold,
            "Threshold calibrated"
        );

        Ok(threshold)
    }

    /// Score every transaction of every client. Each client's baseline is
    /// built from its well-formed history in the set and its threshold
    /// comes from the policy over that client's errors. One client's or one
    /// record's failure is recorded without stopping the others.
    pub fn detect_batch(&self, transactions: &[Transaction]) -> Result<BatchReport> {
        // Pin one model version for the whole run.
        let scorer = AnomalyScorer::new(Arc::new(ModelHandle::from_shared(
            self.scorer.model().current()?,
        )));

        let outcomes: BTreeMap<u64, Result<ClientOutcome>> = group_by_client(transactions)
            .into_par_iter()
            .map(|(client_id, history)| (client_id, self.detect_client(&scorer, client_id, history)))
            .collect();

        let mut report = BatchReport::default();
        for (client_id, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    report.scored += outcome.scored;
                    if let Some(threshold) = outcome.threshold {
                        report.thresholds.insert(client_id, threshold);
                    }
                    report.alerts.extend(outcome.alerts);
                    report.issues.extend(outcome.issues);
                }
                Err(e) => {
                    warn!(client_id = client_id, error = %e, "Client could not be scored");
                    self.metrics.record_unscoreable();
                    report.issues.push(e);
                }
            }
        }

        info!(
            scored = report.scored,
            alerts = report.alerts.len(),
            issues = report.issues.len(),
            "Batch detection complete"
        );

        Ok(report)
    }

    fn detect_client(
        &self,
        scorer: &AnomalyScorer,
        client_id: u64,
        history: Vec<Transaction>,
    ) -> Result<ClientOutcome> {
        let started = Instant::now();
        let mut outcome = ClientOutcome::default();

        let mut valid = Vec::with_capacity(history.len());
        for transaction in history {
            match check_transaction(&transaction) {
                Ok(()) => valid.push(transaction),
                Err(e) => {
                    self.metrics.record_unscoreable();
                    outcome.issues.push(e);
                }
            }
        }
        if valid.is_empty() {
            return Err(DetectorError::NoHistory {
                client_id: Some(client_id),
            });
        }

        let baseline = ClientBaseline::from_history(&valid)?;
        if baseline.is_degenerate() {
            outcome.issues.push(DetectorError::DegenerateStatistics { client_id });
        }

        let vectors = self.extractor.extract_all(&valid, &baseline);
        let errors = scorer.reconstruction_errors(&vectors)?;
        let threshold = self.policy.resolve(&errors)?;
        let per_transaction = started.elapsed() / valid.len() as u32;

        for ((transaction, vector), error) in valid.iter().zip(&vectors).zip(errors) {
            let error = match check_error(error) {
                Ok(error) => error,
                Err(e) => {
                    self.metrics.record_unscoreable();
                    outcome.issues.push(e);
                    continue;
                }
            };

            let score = Score::classify(error, threshold);
            self.metrics.record_score(per_transaction, score.error);
            outcome.scored += 1;
            if !score.is_fraud {
                continue;
            }

            let reason = self.resolver.resolve(vector, &baseline, true);
            self.metrics.record_alert(reason);
            outcome
                .alerts
                .push(Alert::new(transaction, score.error, threshold, true, reason));
        }

        debug!(
            client_id = client_id,
            transactions = valid.len(),
            alerts = outcome.alerts.len(),
            threshold = threshold,
            "Client scored"
        );

        outcome.threshold = Some(threshold);
        Ok(outcome)
    }

    fn insufficient_history(&self, transaction: &Transaction, threshold: f64) -> ScoringResponse {
        warn!(
            client_id = transaction.client_id,
            "No history for client, returning insufficient history"
        );
        self.metrics.record_unscoreable();
        ScoringResponse::insufficient_history(transaction, threshold)
    }
}

/// The client's own well-formed rows from a caller-supplied history.
fn usable_history(history: &[Transaction], client_id: u64) -> Vec<Transaction> {
    let (own, malformed): (Vec<Transaction>, Vec<Transaction>) = history
        .iter()
        .filter(|t| t.client_id == client_id)
        .cloned()
        .partition(|t| t.validate().is_ok());

    if !malformed.is_empty() {
        warn!(
            client_id = client_id,
            skipped = malformed.len(),
            "Malformed history rows left out of the baseline"
        );
    }
    own
}
