//! Autoencoder training: corpus assembly, mini-batch loop and Adam.

use crate::baseline::{group_by_client, ClientBaseline};
use crate::config::TrainingConfig;
use crate::error::{DetectorError, Result};
use crate::feature_extractor::{filter_outliers, FeatureExtractor, FeatureVector, FEATURE_COUNT};
use crate::models::network::{to_matrix, Activation, Autoencoder};
use crate::types::transaction::Transaction;
use ndarray::{Array, Array1, Array2, Axis, Dimension, Ix1, Ix2, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Filtered feature vectors ready for training.
#[derive(Debug, Default)]
pub struct TrainingCorpus {
    pub vectors: Vec<FeatureVector>,
    /// Vectors dropped by the outlier filter
    pub filtered_out: usize,
    pub clients: usize,
    /// Clients whose baseline could not be built
    pub skipped: Vec<DetectorError>,
}

/// Build baselines from each client's full history, extract one vector per
/// transaction and drop outliers beyond `outlier_cutoff`.
pub fn build_training_corpus(
    transactions: &[Transaction],
    extractor: &FeatureExtractor,
    outlier_cutoff: f64,
) -> TrainingCorpus {
    let per_client: BTreeMap<u64, Result<Vec<FeatureVector>>> = group_by_client(transactions)
        .into_par_iter()
        .map(|(client_id, history)| {
            let vectors = ClientBaseline::from_history(&history)
                .map(|baseline| extractor.extract_all(&history, &baseline));
            (client_id, vectors)
        })
        .collect();

    let mut corpus = TrainingCorpus::default();
    let mut raw = Vec::with_capacity(transactions.len());

    for (client_id, vectors) in per_client {
        match vectors {
            Ok(vectors) => {
                corpus.clients += 1;
                raw.extend(vectors);
            }
            Err(e) => {
                warn!(client_id = client_id, error = %e, "Skipping client in training corpus");
                corpus.skipped.push(e);
            }
        }
    }

    corpus.vectors = filter_outliers(&raw, outlier_cutoff);
    corpus.filtered_out = raw.len() - corpus.vectors.len();

    info!(
        clients = corpus.clients,
        vectors = corpus.vectors.len(),
        filtered_out = corpus.filtered_out,
        "Training corpus assembled"
    );

    corpus
}

/// Per-parameter Adam moments for one tensor.
#[derive(Debug, Clone)]
struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    fn zeros_like(param: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }
}

/// Adam optimizer state for the whole network.
#[derive(Debug)]
struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    weights: Vec<Moments<Ix2>>,
    biases: Vec<Moments<Ix1>>,
}

impl Adam {
    fn new(model: &Autoencoder, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            weights: model.layers().iter().map(|l| Moments::zeros_like(&l.weights)).collect(),
            biases: model.layers().iter().map(|l| Moments::zeros_like(&l.bias)).collect(),
        }
    }

    fn apply(&mut self, model: &mut Autoencoder, gradients: &[(Array2<f64>, Array1<f64>)]) {
        self.step += 1;
        let params = StepParams {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            correction1: 1.0 - self.beta1.powi(self.step),
            correction2: 1.0 - self.beta2.powi(self.step),
        };

        for (i, layer) in model.layers_mut().iter_mut().enumerate() {
            let (grad_w, grad_b) = &gradients[i];
            update(&mut layer.weights, grad_w, &mut self.weights[i], &params);
            update(&mut layer.bias, grad_b, &mut self.biases[i], &params);
        }
    }
}

struct StepParams {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    correction1: f64,
    correction2: f64,
}

fn update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    state: &mut Moments<D>,
    params: &StepParams,
) {
    Zip::from(param)
        .and(grad)
        .and(&mut state.m)
        .and(&mut state.v)
        .for_each(|p, &g, m, v| {
            *m = params.beta1 * *m + (1.0 - params.beta1) * g;
            *v = params.beta2 * *v + (1.0 - params.beta2) * g * g;
            let m_hat = *m / params.correction1;
            let v_hat = *v / params.correction2;
            *p -= params.learning_rate * m_hat / (v_hat.sqrt() + params.epsilon);
        });
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model: Autoencoder,
    /// Mean batch loss per epoch
    pub epoch_losses: Vec<f64>,
    pub samples: usize,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

/// Mini-batch trainer. Batches are applied strictly in sequence; a fixed
/// seed reproduces both initialization and shuffle order.
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train a fresh model on `corpus` for exactly `config.epochs` passes.
    pub fn fit(&self, corpus: &[FeatureVector]) -> Result<TrainingReport> {
        if corpus.is_empty() {
            return Err(DetectorError::EmptyCorpus);
        }
        let batch_size = self.config.batch_size.max(1);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut model = Autoencoder::initialize(&mut rng);
        let mut optimizer = Adam::new(&model, self.config.learning_rate);
        let mut order: Vec<usize> = (0..corpus.len()).collect();
        let mut epoch_losses = Vec::with_capacity(self.config.epochs);

        info!(
            samples = corpus.len(),
            epochs = self.config.epochs,
            batch_size = batch_size,
            learning_rate = self.config.learning_rate,
            seed = self.config.seed,
            "Starting autoencoder training"
        );
        let started = Instant::now();

        for epoch in 0..self.config.epochs {
            if self.config.shuffle {
                order.shuffle(&mut rng);
            }

            let mut loss_sum = 0.0;
            let mut batches = 0usize;
            for chunk in order.chunks(batch_size) {
                let batch = to_matrix(chunk.iter().map(|&i| &corpus[i]));
                let (loss, gradients) = loss_and_gradients(&model, batch);
                optimizer.apply(&mut model, &gradients);
                loss_sum += loss;
                batches += 1;
            }

            let epoch_loss = loss_sum / batches as f64;
            epoch_losses.push(epoch_loss);
            debug!(epoch = epoch + 1, loss = epoch_loss, "Epoch complete");
        }

        info!(
            epochs = self.config.epochs,
            final_loss = epoch_losses.last().copied().unwrap_or(f64::NAN),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Training finished"
        );

        Ok(TrainingReport {
            model,
            epoch_losses,
            samples: corpus.len(),
        })
    }
}

/// Mean squared reconstruction loss of a batch and its gradients per layer.
fn loss_and_gradients(
    model: &Autoencoder,
    batch: Array2<f64>,
) -> (f64, Vec<(Array2<f64>, Array1<f64>)>) {
    let trace = model.forward_trace(batch);
    let input = &trace[0];
    let output = &trace[trace.len() - 1];
    let count = (input.nrows() * FEATURE_COUNT) as f64;

    let diff = output - input;
    let loss = diff.mapv(|d| d * d).sum() / count;

    let layers = model.layers();
    let mut gradients = vec![None; layers.len()];
    let mut upstream = diff * (2.0 / count);

    for (i, layer) in layers.iter().enumerate().rev() {
        let activated = &trace[i + 1];
        if layer.activation == Activation::Relu {
            Zip::from(&mut upstream)
                .and(activated)
                .for_each(|g, &a| {
                    if a <= 0.0 {
                        *g = 0.0;
                    }
                });
        }

        let previous = &trace[i];
        let grad_w = previous.t().dot(&upstream);
        let grad_b = upstream.sum_axis(Axis(0));
        let next_upstream = upstream.dot(&layer.weights.t());
        gradients[i] = Some((grad_w, grad_b));
        upstream = next_upstream;
    }

    (loss, gradients.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transaction::parse_datetime;

    fn small_config(epochs: usize) -> TrainingConfig {
        TrainingConfig {
            epochs,
            batch_size: 8,
            learning_rate: 0.01,
            seed: 7,
            shuffle: true,
            outlier_cutoff: 5.0,
        }
    }

    fn corpus() -> Vec<FeatureVector> {
        (0..40)
            .map(|i| {
                let x = (i % 10) as f64 / 10.0 - 0.5;
                FeatureVector::new([x, -x * 0.5, (i % 24) as f64 / 4.0, (i % 7) as f64, 0.0])
            })
            .collect()
    }

    #[test]
    fn test_empty_corpus_fails() {
        let trainer = Trainer::new(small_config(1));
        assert!(matches!(trainer.fit(&[]), Err(DetectorError::EmptyCorpus)));
    }

    #[test]
    fn test_runs_exact_epoch_count() {
        let report = Trainer::new(small_config(3)).fit(&corpus()).unwrap();
        assert_eq!(report.epoch_losses.len(), 3);
        assert_eq!(report.samples, 40);
    }

    #[test]
    fn test_training_reduces_loss() {
        let report = Trainer::new(small_config(60)).fit(&corpus()).unwrap();
        let first = report.epoch_losses[0];
        let last = report.final_loss().unwrap();
        assert!(last < first, "loss did not decrease: {} -> {}", first, last);
    }

    #[test]
    fn test_training_is_reproducible_with_seed() {
        let a = Trainer::new(small_config(5)).fit(&corpus()).unwrap();
        let b = Trainer::new(small_config(5)).fit(&corpus()).unwrap();
        assert_eq!(a.model, b.model);
        assert_eq!(a.epoch_losses, b.epoch_losses);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let model = Autoencoder::initialize(&mut StdRng::seed_from_u64(3));
        let sample = corpus();
        let batch = to_matrix(sample[..6].iter());
        let (_, gradients) = loss_and_gradients(&model, batch.clone());

        let h = 1e-6;
        for (layer, row, col) in [(0usize, 1usize, 2usize), (3, 0, 5), (5, 7, 4)] {
            let mut plus = model.clone();
            plus.layers_mut()[layer].weights[[row, col]] += h;
            let mut minus = model.clone();
            minus.layers_mut()[layer].weights[[row, col]] -= h;

            let (lp, _) = loss_and_gradients(&plus, batch.clone());
            let (lm, _) = loss_and_gradients(&minus, batch.clone());
            let numeric = (lp - lm) / (2.0 * h);
            let analytic = gradients[layer].0[[row, col]];
            assert!(
                (numeric - analytic).abs() < 1e-5,
                "layer {} [{}, {}]: numeric {} vs analytic {}",
                layer,
                row,
                col,
                numeric,
                analytic
            );
        }
    }

    #[test]
    fn test_training_corpus_filters_outliers() {
        let when = parse_datetime("2024-01-08 10:00:00").unwrap();
        let mut transactions: Vec<Transaction> = (0..30)
            .map(|i| Transaction::new(1, when, 100.0 + i as f64, 19.4326, -99.1332, "Mexico City"))
            .collect();
        transactions.push(Transaction::new(1, when, 50_000.0, 19.4326, -99.1332, "Mexico City"));

        let corpus = build_training_corpus(&transactions, &FeatureExtractor::new(), 5.0);
        assert_eq!(corpus.clients, 1);
        assert_eq!(corpus.filtered_out, 1);
        assert_eq!(corpus.vectors.len(), 30);
        assert!(corpus.skipped.is_empty());
    }
}
