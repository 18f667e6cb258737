//! Synthetic Transaction Dataset Generator
//!
//! Writes a labeled-by-construction client history CSV for validating the
//! detector: mostly local, small purchases with injected amount, location
//! and foreign-city anomalies.
//!
//! Usage: generate-dataset [output] [clients] [months] [seed]

use anyhow::{Context, Result};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use fraud_autoencoder::types::Transaction;
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use tracing::info;

const METERS_TO_DEG: f64 = 1.0 / 111_320.0;
const FIRST_CLIENT_ID: u64 = 1000;

const CITIES: [(&str, f64, f64); 12] = [
    ("Mexico City", 19.4326, -99.1332),
    ("Guadalajara", 20.6597, -103.3496),
    ("Monterrey", 25.6866, -100.3161),
    ("New York", 40.7128, -74.0060),
    ("Los Angeles", 34.0522, -118.2437),
    ("Tokyo", 35.6895, 139.6917),
    ("Paris", 48.8566, 2.3522),
    ("London", 51.5074, -0.1278),
    ("Berlin", 52.5200, 13.4050),
    ("Madrid", 40.4168, -3.7038),
    ("Toronto", 43.6532, -79.3832),
    ("Buenos Aires", -34.6037, -58.3816),
];

const FOREIGN_CITIES: [&str; 8] = [
    "Paris",
    "London",
    "Tokyo",
    "Berlin",
    "New York",
    "Toronto",
    "Buenos Aires",
    "Madrid",
];

const NEAR_DISTANCES_M: [f64; 7] = [10.0, 50.0, 100.0, 300.0, 500.0, 1000.0, 2000.0];
const MID_DISTANCES_M: [f64; 2] = [5000.0, 10000.0];
const FAR_DISTANCES_M: [f64; 4] = [5000.0, 10000.0, 20000.0, 30000.0];

/// Counts of what was injected, for the run summary
#[derive(Debug, Default)]
struct GenerationStats {
    normal: u64,
    amount_anomalies: u64,
    location_anomalies: u64,
    foreign: u64,
}

/// Per-client generation plan
struct ClientProfile {
    client_id: u64,
    city: &'static str,
    latitude: f64,
    longitude: f64,
    amount_fraud: bool,
    geo_fraud: bool,
    foreign: bool,
}

/// Transaction generator for validation datasets
struct TransactionGenerator {
    rng: StdRng,
    start: NaiveDate,
    months: u32,
    stats: GenerationStats,
}

impl TransactionGenerator {
    fn new(seed: u64, start: NaiveDate, months: u32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            start,
            months,
            stats: GenerationStats::default(),
        }
    }

    fn profiles(&mut self, clients: u64) -> Vec<ClientProfile> {
        let picked = (clients as usize / 10).max(1).min(clients as usize);
        let foreign: HashSet<usize> = index::sample(&mut self.rng, clients as usize, picked)
            .into_iter()
            .collect();
        let unusual: HashSet<usize> = index::sample(&mut self.rng, clients as usize, picked)
            .into_iter()
            .collect();

        (0..clients as usize)
            .map(|i| {
                let (city, latitude, longitude) = if self.rng.gen_bool(0.8) {
                    CITIES[0]
                } else {
                    *self.random_city()
                };
                ClientProfile {
                    client_id: FIRST_CLIENT_ID + i as u64,
                    city,
                    latitude,
                    longitude,
                    amount_fraud: self.rng.gen_bool(0.1),
                    geo_fraud: unusual.contains(&i) && self.rng.gen_bool(0.7),
                    foreign: foreign.contains(&i),
                }
            })
            .collect()
    }

    /// Generate a client's full history, month by month
    fn generate_client(&mut self, profile: &ClientProfile) -> Vec<Transaction> {
        let mut transactions = Vec::new();

        for month in 0..self.months {
            let Some(month_start) = self.start.checked_add_months(Months::new(month)) else {
                break;
            };
            let days = days_in_month(month_start);
            let tx_count = self.transactions_per_month();
            let active_days = self.rng.gen_range(5..=tx_count.min(days).max(5));
            let days_with_tx: Vec<u32> = (0..active_days)
                .map(|_| self.rng.gen_range(1..=days))
                .collect();
            let mut geo_injected = false;

            for tx_num in 0..tx_count {
                let day = *days_with_tx.choose(&mut self.rng).unwrap_or(&1);
                let Some(datetime) = self.random_time(month_start.with_day(day)) else {
                    continue;
                };

                if profile.foreign && month == 0 && tx_num == 0 {
                    transactions.push(self.foreign_transaction(profile, datetime));
                } else {
                    transactions.push(self.normal_transaction(profile, datetime));
                }

                if profile.geo_fraud && !geo_injected && tx_num + 1 < tx_count && self.rng.gen_bool(0.3) {
                    geo_injected = true;
                    transactions.push(self.displaced_transaction(profile, datetime));
                }
            }
        }

        transactions
    }

    fn normal_transaction(&mut self, profile: &ClientProfile, datetime: NaiveDateTime) -> Transaction {
        let distance = if self.rng.gen_bool(0.8) {
            *NEAR_DISTANCES_M.choose(&mut self.rng).unwrap_or(&10.0)
        } else {
            *MID_DISTANCES_M.choose(&mut self.rng).unwrap_or(&5000.0)
        };
        let (latitude, longitude) = self.offset(profile.latitude, profile.longitude, distance);

        let amount = if profile.amount_fraud && self.rng.gen_bool(0.05) {
            self.stats.amount_anomalies += 1;
            round_cents(self.rng.gen_range(10_000.0..50_000.0))
        } else {
            self.stats.normal += 1;
            round_cents(self.rng.gen_range(10.0..500.0))
        };

        Transaction::new(profile.client_id, datetime, amount, latitude, longitude, profile.city)
    }

    /// Same time as `datetime`, 5-30 km from home
    fn displaced_transaction(&mut self, profile: &ClientProfile, datetime: NaiveDateTime) -> Transaction {
        self.stats.location_anomalies += 1;
        let distance = *FAR_DISTANCES_M.choose(&mut self.rng).unwrap_or(&30000.0);
        let (latitude, longitude) = self.offset(profile.latitude, profile.longitude, distance);
        let city = if self.rng.gen_bool(0.5) {
            profile.city
        } else {
            self.random_city().0
        };
        let amount = round_cents(self.rng.gen_range(10.0..500.0));

        Transaction::new(profile.client_id, datetime, amount, latitude, longitude, city)
    }

    fn foreign_transaction(&mut self, profile: &ClientProfile, datetime: NaiveDateTime) -> Transaction {
        self.stats.foreign += 1;
        let name = *FOREIGN_CITIES.choose(&mut self.rng).unwrap_or(&"Paris");
        let (city, latitude, longitude) = CITIES
            .iter()
            .copied()
            .find(|(c, _, _)| *c == name)
            .unwrap_or(CITIES[6]);
        let amount = round_cents(self.rng.gen_range(10.0..500.0));

        Transaction::new(
            profile.client_id,
            datetime,
            amount,
            latitude + self.rng.gen_range(-0.01..0.01),
            longitude + self.rng.gen_range(-0.01..0.01),
            city,
        )
    }

    /// Heavy-tailed monthly volume
    fn transactions_per_month(&mut self) -> u32 {
        let p: f64 = self.rng.gen();
        if p < 0.5 {
            self.rng.gen_range(5..=50)
        } else if p < 0.8 {
            self.rng.gen_range(51..=200)
        } else if p < 0.95 {
            self.rng.gen_range(201..=400)
        } else {
            self.rng.gen_range(401..=500)
        }
    }

    fn random_time(&mut self, date: Option<NaiveDate>) -> Option<NaiveDateTime> {
        date?.and_hms_opt(
            self.rng.gen_range(0..24),
            self.rng.gen_range(0..60),
            self.rng.gen_range(0..60),
        )
    }

    fn offset(&mut self, latitude: f64, longitude: f64, meters: f64) -> (f64, f64) {
        let angle = self.rng.gen_range(0.0..2.0 * PI);
        let degrees = meters * METERS_TO_DEG;
        (latitude + degrees * angle.cos(), longitude + degrees * angle.sin())
    }

    fn random_city(&mut self) -> &'static (&'static str, f64, f64) {
        &CITIES[self.rng.gen_range(0..CITIES.len())]
    }
}

fn days_in_month(month_start: NaiveDate) -> u32 {
    month_start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_dataset=info".parse()?),
        )
        .init();

    info!("Starting Synthetic Dataset Generator");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let output = args.get(1).map(|s| s.as_str()).unwrap_or("data/transactions.csv");
    let clients: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let months: u32 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(18);
    let seed: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(42);

    info!(
        output = %output,
        clients = clients,
        months = months,
        seed = seed,
        "Configuration loaded"
    );

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).context("Invalid start date")?;
    let mut generator = TransactionGenerator::new(seed, start, months);

    let path = Path::new(output);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let profiles = generator.profiles(clients);
    let mut written = 0u64;
    for profile in &profiles {
        for transaction in generator.generate_client(profile) {
            writer.serialize(&transaction)?;
            written += 1;
        }

        if (profile.client_id - FIRST_CLIENT_ID + 1) % 10 == 0 {
            info!(
                "Generated {}/{} clients ({} transactions)",
                profile.client_id - FIRST_CLIENT_ID + 1,
                clients,
                written
            );
        }
    }
    writer.flush()?;

    let stats = &generator.stats;
    info!(
        written = written,
        normal = stats.normal,
        amount_anomalies = stats.amount_anomalies,
        location_anomalies = stats.location_anomalies,
        foreign = stats.foreign,
        "Completed! Dataset written to {}",
        output
    );

    Ok(())
}
