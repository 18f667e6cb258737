//! Transaction data structures for baseline-relative fraud scoring

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Timestamp layout used by the transaction datasets.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single card transaction as produced by the upstream ingestion source.
///
/// Field names follow the dataset header
/// (`idClient,datetime,amount,latitude,longitude,city`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Client identifier
    #[serde(rename = "idClient", alias = "client_id")]
    pub client_id: u64,

    /// Local timestamp of the transaction
    #[serde(with = "datetime_serde")]
    pub datetime: NaiveDateTime,

    /// Amount in currency units
    pub amount: f64,

    /// Latitude in decimal degrees
    pub latitude: f64,

    /// Longitude in decimal degrees
    pub longitude: f64,

    /// Free-text city label
    pub city: String,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(
        client_id: u64,
        datetime: NaiveDateTime,
        amount: f64,
        latitude: f64,
        longitude: f64,
        city: impl Into<String>,
    ) -> Self {
        Self {
            client_id,
            datetime,
            amount,
            latitude,
            longitude,
            city: city.into(),
        }
    }

    /// Hour of day (0-23)
    pub fn hour(&self) -> u32 {
        self.datetime.hour()
    }

    /// Day of week with Monday = 0 and Sunday = 6
    pub fn day_of_week(&self) -> u32 {
        self.datetime.weekday().num_days_from_monday()
    }

    /// Check the numeric fields a baseline or feature vector depends on.
    pub fn validate(&self) -> Result<(), String> {
        if !self.amount.is_finite() {
            return Err(format!("amount is not a finite number: {}", self.amount));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(format!("latitude out of range: {}", self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(format!("longitude out of range: {}", self.longitude));
        }
        if self.city.trim().is_empty() {
            return Err("city is empty".to_string());
        }
        Ok(())
    }
}

/// Parse a dataset timestamp (`YYYY-MM-DD HH:MM:SS`).
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT)
}

pub(crate) mod datetime_serde {
    use super::DATETIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(DATETIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_datetime(&raw).map_err(serde::de::Error::custom)
    }
}
