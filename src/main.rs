//! Fraud Autoencoder - Command Line Entry Point
//!
//! Trains the per-client autoencoder from a transaction CSV, runs batch
//! detection over a transaction set, or scores a single transaction.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fraud_autoencoder::{
    baseline::ClientBaseline,
    config::{AppConfig, LoggingConfig},
    detector::FraudDetector,
    error::DetectorError,
    models::{build_training_corpus, save_model, ModelHandle, Trainer},
    producer::AlertProducer,
    source,
    types::{transaction::parse_datetime, ScoringRequest, ScoringResponse, Transaction},
    FeatureExtractor,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fraud-autoencoder", version, about = "Per-client autoencoder fraud detection")]
struct Cli {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the autoencoder on a transaction history CSV
    Train {
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the model artifact (defaults to model.path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Score every transaction in a CSV and emit alerts as JSON lines
    Detect {
        #[arg(short, long)]
        input: PathBuf,
        /// Alerts file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Score one transaction against a client's history
    Score {
        #[arg(long)]
        history: PathBuf,
        #[arg(long)]
        client: u64,
        /// Timestamp as `YYYY-MM-DD HH:MM:SS`
        #[arg(long)]
        datetime: String,
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        #[arg(long)]
        city: String,
        /// Decision threshold; calibrated from the client's history when omitted
        #[arg(long)]
        threshold: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load()?,
    };

    init_tracing(&config.logging)?;
    info!("Configuration loaded successfully");

    match cli.command {
        Command::Train { input, output } => {
            let output = output.unwrap_or_else(|| config.model.path.clone());
            train(&config, input, output)
        }
        Command::Detect { input, output } => detect(&config, input, output),
        Command::Score {
            history,
            client,
            datetime,
            amount,
            latitude,
            longitude,
            city,
            threshold,
        } => {
            let datetime = parse_datetime(&datetime)
                .with_context(|| format!("Invalid datetime '{}'", datetime))?;
            let transaction = Transaction::new(client, datetime, amount, latitude, longitude, city);
            transaction
                .validate()
                .map_err(|reason| anyhow::anyhow!("Invalid transaction: {}", reason))?;
            score(&config, history, transaction, threshold)
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("warn,fraud_autoencoder={}", logging.level))
            .context("Invalid log level")?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

fn train(config: &AppConfig, input: PathBuf, output: PathBuf) -> Result<()> {
    info!(input = %input.display(), "Starting training");
    let start_time = Instant::now();

    let report = source::read_path(&input)
        .with_context(|| format!("Failed to read transactions from {}", input.display()))?;
    log_rejected(&report.rejected);

    let extractor =
        FeatureExtractor::with_foreign_cities(config.detection.foreign_cities.iter().cloned());
    let corpus = build_training_corpus(
        &report.transactions,
        &extractor,
        config.training.outlier_cutoff,
    );
    for issue in &corpus.skipped {
        warn!(error = %issue, "Client skipped during corpus assembly");
    }
    info!(
        vectors = corpus.vectors.len(),
        filtered_out = corpus.filtered_out,
        clients = corpus.clients,
        "Training corpus assembled"
    );

    let trained = Trainer::new(config.training.clone())
        .fit(&corpus.vectors)
        .context("Training failed")?;

    save_model(&trained.model, &output)
        .with_context(|| format!("Failed to write model to {}", output.display()))?;

    info!(
        epochs = trained.epoch_losses.len(),
        samples = trained.samples,
        final_loss = trained.final_loss().unwrap_or(f64::NAN),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        output = %output.display(),
        "Training complete"
    );

    Ok(())
}

fn detect(config: &AppConfig, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let detector = load_detector(config)?;

    let report = source::read_path(&input)
        .with_context(|| format!("Failed to read transactions from {}", input.display()))?;
    log_rejected(&report.rejected);

    let batch = detector
        .detect_batch(&report.transactions)
        .context("Batch detection failed")?;
    for issue in &batch.issues {
        warn!(error = %issue, "Detection issue");
    }

    let published = match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut producer = AlertProducer::new(BufWriter::new(file));
            producer
                .publish_batch(&batch.alerts)
                .with_context(|| format!("Failed to write alerts to {}", path.display()))?;
            info!(path = %path.display(), "Alerts written");
            producer.published()
        }
        None => {
            let mut producer = AlertProducer::new(io::stdout().lock());
            producer.publish_batch(&batch.alerts)?;
            producer.published()
        }
    };

    info!(
        scored = batch.scored,
        alerts = published,
        "Detection run finished"
    );
    detector.metrics().print_summary();

    Ok(())
}

fn score(
    config: &AppConfig,
    history: PathBuf,
    transaction: Transaction,
    threshold: Option<f64>,
) -> Result<()> {
    let detector = load_detector(config)?;

    let report = source::read_path(&history)
        .with_context(|| format!("Failed to read history from {}", history.display()))?;
    log_rejected(&report.rejected);
    let own = report.for_client(transaction.client_id);

    let response = match ClientBaseline::from_history(&own) {
        Ok(baseline) => {
            let threshold = match threshold {
                Some(value) => value,
                None => detector
                    .calibrate_threshold(&own, &baseline)
                    .context("Failed to calibrate threshold")?,
            };
            detector.score_request(&ScoringRequest::with_baseline(transaction, baseline, threshold))?
        }
        Err(DetectorError::NoHistory { .. }) => detector.score_request(
            &ScoringRequest::with_history(transaction, own, threshold.unwrap_or(f64::INFINITY)),
        )?,
        Err(e) => return Err(e.into()),
    };

    print_response(&response)
}

fn load_detector(config: &AppConfig) -> Result<FraudDetector> {
    let handle = ModelHandle::from_path(&config.model.path).with_context(|| {
        format!("Failed to load model from {}", config.model.path.display())
    })?;
    Ok(FraudDetector::from_config(Arc::new(handle), &config.detection))
}

fn log_rejected(rejected: &[DetectorError]) {
    if !rejected.is_empty() {
        warn!(rejected = rejected.len(), "Malformed transactions skipped");
    }
}

fn print_response(response: &ScoringResponse) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, response)?;
    writeln!(stdout)?;
    Ok(())
}
