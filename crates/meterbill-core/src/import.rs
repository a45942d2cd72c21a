//! Tariff CSV import
//!
//! Loads a tariff history from a CSV with a header row. Columns
//! `month_from, cold, hot, electric, sewer` are required; the tier
//! columns `electric_t1..3` are optional, and a missing base rate falls
//! back to the T1 column when present. Rows are upserted by `month_from`
//! so re-importing a corrected file is safe.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::Tariff;
use crate::ym::Ym;

/// Outcome counters for one import run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TariffImportStats {
    /// Rows upserted
    pub imported: usize,
    /// Rows dropped by validation
    pub skipped: usize,
}

/// Import tariff rows from CSV, upserting by `month_from`.
///
/// A header missing a required column fails the whole import; a row that
/// fails validation is skipped and counted, never fatal.
pub fn import_tariffs_csv<R: Read>(db: &Database, reader: R) -> Result<TariffImportStats> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let col = |name: &str| -> Option<usize> {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };
    let required = |name: &str| -> Result<usize> {
        col(name).ok_or_else(|| Error::Import(format!("Missing required column: {}", name)))
    };

    let idx_month = required("month_from")?;
    let idx_cold = required("cold")?;
    let idx_hot = required("hot")?;
    let idx_sewer = required("sewer")?;
    let idx_electric = col("electric");
    let idx_t1 = col("electric_t1");
    let idx_t2 = col("electric_t2");
    let idx_t3 = col("electric_t3");

    if idx_electric.is_none() && idx_t1.is_none() {
        return Err(Error::Import(
            "Missing required column: electric (or electric_t1)".to_string(),
        ));
    }

    let mut stats = TariffImportStats {
        imported: 0,
        skipped: 0,
    };

    for result in rdr.records() {
        let record = result?;

        let month_raw = field(&record, Some(idx_month)).unwrap_or_default();
        let month_from = match Ym::parse(&month_raw) {
            Ok(ym) => ym,
            Err(_) => {
                warn!("Skipping tariff row with bad month_from: {:?}", month_raw);
                stats.skipped += 1;
                continue;
            }
        };

        let t1 = parse_rate(&record, idx_t1);
        let base = parse_rate(&record, idx_electric).or(t1);

        let rates = (
            parse_rate(&record, Some(idx_cold)),
            parse_rate(&record, Some(idx_hot)),
            parse_rate(&record, Some(idx_sewer)),
            base,
        );
        let (cold, hot, sewer, electric) = match rates {
            (Some(c), Some(h), Some(s), Some(b)) => (c, h, s, b),
            _ => {
                warn!("Skipping tariff row {}: missing or unparsable rates", month_from);
                stats.skipped += 1;
                continue;
            }
        };

        db.upsert_tariff(&Tariff {
            month_from,
            cold,
            hot,
            electric,
            sewer,
            electric_t1: t1,
            electric_t2: parse_rate(&record, idx_t2),
            electric_t3: parse_rate(&record, idx_t3),
        })?;
        stats.imported += 1;
    }

    debug!(
        "Imported {} tariff rows, skipped {}",
        stats.imported, stats.skipped
    );
    Ok(stats)
}

/// Empty cells count as absent
fn field(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    let raw = record.get(idx?)?.trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Parse a rate cell, tolerating a comma decimal separator
fn parse_rate(record: &StringRecord, idx: Option<usize>) -> Option<f64> {
    let raw = field(record, idx)?;
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
