//! Domain models for meterbill

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ym::Ym;

/// An apartment (billing unit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apartment {
    pub id: i64,
    pub title: String,
    pub tenant_name: Option<String>,
    pub address: Option<String>,
    pub note: Option<String>,
    /// Personal account number printed on bills
    pub ls_account: Option<String>,
    /// Chat bound to this apartment for reading submission and bill delivery
    pub chat_id: Option<i64>,
    /// How many electricity tariff registers this unit is billed on (1..3)
    pub electric_expected: i64,
    pub created_at: DateTime<Utc>,
}

/// Utility meter kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterType {
    Cold,
    Hot,
    Electric,
    Sewer,
}

impl MeterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Hot => "hot",
            Self::Electric => "electric",
            Self::Sewer => "sewer",
        }
    }
}

impl std::str::FromStr for MeterType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cold" => Ok(Self::Cold),
            "hot" => Ok(Self::Hot),
            "electric" => Ok(Self::Electric),
            "sewer" => Ok(Self::Sewer),
            _ => Err(format!("Unknown meter type: {}", s)),
        }
    }
}

impl std::fmt::Display for MeterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance of a stored reading - decides whether a later write may
/// overwrite it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    /// Extracted from a meter photo
    #[default]
    Ocr,
    /// Entered by a human (bot reply or admin edit)
    Manual,
}

impl ReadingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for ReadingSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ocr" => Ok(Self::Ocr),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown reading source: {}", s)),
        }
    }
}

impl std::fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A canonical meter reading for one apartment/month/type/slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterReading {
    pub id: i64,
    pub apartment_id: i64,
    pub ym: Ym,
    pub meter_type: MeterType,
    /// Slot 1..3 for electric; always 1 for water/sewer
    pub meter_index: i64,
    pub value: f64,
    pub source: ReadingSource,
    /// Value as originally reported by OCR, kept for audit
    pub ocr_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tariff row, effective from `month_from` until superseded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tariff {
    pub month_from: Ym,
    pub cold: f64,
    pub hot: f64,
    pub electric: f64,
    pub sewer: f64,
    /// Tier overrides; fall back to the base electric rate when unset
    pub electric_t1: Option<f64>,
    pub electric_t2: Option<f64>,
    pub electric_t3: Option<f64>,
}

/// Per apartment-month reconciliation and billing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthState {
    pub apartment_id: i64,
    pub ym: Ym,
    /// More distinct electric readings arrived than the apartment expects
    pub electric_extra_pending: bool,
    /// `electric_expected` captured at the moment pending was raised
    pub electric_expected_snapshot: Option<i64>,
    pub electric_extra_resolved_at: Option<DateTime<Utc>>,
    /// Blocking per-article diff items, JSON object keyed by article
    pub bill_pending: Option<String>,
    /// Last computed bill snapshot, JSON
    pub bill_last_json: Option<String>,
    pub bill_approved_at: Option<DateTime<Utc>>,
    pub bill_sent_at: Option<DateTime<Utc>>,
    pub bill_sent_total: Option<f64>,
}

/// Processing stage of an ingest audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    /// Submission recorded, nothing written yet
    #[default]
    Received,
    /// A canonical reading row was written
    ReadingWritten,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ReadingWritten => "reading_written",
        }
    }
}

impl std::str::FromStr for IngestStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "received" => Ok(Self::Received),
            "reading_written" => Ok(Self::ReadingWritten),
            _ => Err(format!("Unknown ingest stage: {}", s)),
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An append-only ingest audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEvent {
    pub id: i64,
    pub apartment_id: i64,
    pub ym: Ym,
    pub chat_id: Option<i64>,
    /// SHA-256 of the submitted photo bytes, when the submission had one
    pub file_sha256: Option<String>,
    pub stage: IngestStage,
    pub reading_written: bool,
    /// Warnings and parse diagnostics accumulated during ingest, JSON
    pub diag_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Tolerance under which two readings count as the same physical value.
pub const VALUE_EPS: f64 = 1e-6;

/// Whether two reading values match within [`VALUE_EPS`].
pub fn same_value(a: f64, b: f64) -> bool {
    (a - b).abs() < VALUE_EPS
}

/// Clamp a stored register count into the supported 1..3 range.
pub fn clamp_expected(n: i64) -> i64 {
    n.clamp(1, 3)
}

/// Tolerant numeric parse for manually entered readings.
///
/// Accepts comma decimal separators and surrounding whitespace; anything
/// unparsable resolves to `None` (the value is treated as absent, never
/// as an error).
pub fn parse_reading(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".").replace(' ', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
