//! Reading submission and inspection command implementations

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use meterbill_core::config::BillingConfig;
use meterbill_core::db::Database;
use meterbill_core::ingest::{photo_sha256, CleanedReading, IngestPipeline};
use meterbill_core::models::{parse_reading, MeterType, ReadingSource};
use meterbill_core::notify::TG_TOKEN_ENV;

use super::bills::print_bill_line;
use super::{fmt_ts, resolve_month, sender_from_env, truncate};

#[allow(clippy::too_many_arguments)]
pub async fn cmd_reading_submit(
    db: &Database,
    apartment: i64,
    month: Option<&str>,
    meter: &str,
    value: &str,
    index: Option<i64>,
    ocr: bool,
    photo: Option<&Path>,
) -> Result<()> {
    let ym = resolve_month(month)?;
    let meter_type: MeterType = meter.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    // Fail early on an unknown apartment; the pipeline assumes it exists
    db.require_apartment(apartment)?;

    let photo_hash = match photo {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("Failed to read photo: {}", path.display()))?;
            Some(photo_sha256(&bytes))
        }
        None => None,
    };

    let source = if ocr {
        ReadingSource::Ocr
    } else {
        ReadingSource::Manual
    };

    if std::env::var(TG_TOKEN_ENV).is_err() {
        println!("💡 Tip: Set {} to deliver bills over Telegram", TG_TOKEN_ENV);
    }

    let mut config = BillingConfig::load()?;
    if index.is_some() {
        // An index on the command line is an explicit slot assignment
        config.explicit_electric_slots = true;
    }
    let sender = sender_from_env();
    let pipeline = IngestPipeline::with_config(db, sender.as_ref(), config);

    let reading = CleanedReading {
        apartment_id: apartment,
        ym: ym.clone(),
        meter_type,
        meter_index: index,
        value: parse_reading(value),
        source,
        chat_id: None,
        photo_sha256: photo_hash,
    };

    let outcome = pipeline.ingest(&reading).await?;

    println!(
        "📥 Reading for apartment {} {} ({}, {}):",
        apartment, ym, meter_type, source
    );

    if outcome.reading_written {
        match outcome.assigned_index {
            Some(i) if meter_type == MeterType::Electric => {
                println!("   ✅ Stored in electric slot {}", i)
            }
            _ => println!("   ✅ Stored"),
        }
    } else {
        println!("   ❌ Nothing stored (see audit event {})", outcome.event_id);
    }

    for warning in &outcome.warnings {
        println!("   ⚠️  {}", warning);
    }

    if outcome.bill.extra_pending {
        println!("   ⚠️  More electric readings than expected; billing is held");
        println!(
            "      Resolve with: meterbill extra accept -a {} -m {}  (or extra reject)",
            apartment, ym
        );
    }

    print_bill_line(&outcome.bill);
    if outcome.bill_sent {
        println!("   📨 Bill sent to the bound chat");
    }

    Ok(())
}

pub fn cmd_reading_list(db: &Database, apartment: i64, month: Option<&str>) -> Result<()> {
    let ym = resolve_month(month)?;
    let readings = db.list_readings_for_month(apartment, &ym)?;

    if readings.is_empty() {
        println!("No readings for apartment {} in {}.", apartment, ym);
        return Ok(());
    }

    println!();
    println!("📋 Readings for apartment {} in {}", apartment, ym);
    println!("   ─────────────────────────────────────────────────────────────");

    for r in readings {
        let meter = if r.meter_type == MeterType::Electric {
            format!("{} [{}]", r.meter_type, r.meter_index)
        } else {
            r.meter_type.to_string()
        };
        let ocr_note = match r.ocr_value {
            // A manual row that still carries an OCR value was corrected by hand
            Some(v) if r.source == ReadingSource::Manual => format!(" (ocr saw {:.3})", v),
            _ => String::new(),
        };
        println!(
            "   {:<13} │ {:>12.3} │ {:<6} │ {}{}",
            meter,
            r.value,
            r.source.as_str(),
            fmt_ts(&r.updated_at),
            ocr_note
        );
    }

    Ok(())
}

pub fn cmd_reading_events(db: &Database, apartment: i64, month: Option<&str>) -> Result<()> {
    let ym = resolve_month(month)?;
    let events = db.list_ingest_events(apartment, &ym)?;

    if events.is_empty() {
        println!("No ingest events for apartment {} in {}.", apartment, ym);
        return Ok(());
    }

    println!();
    println!(
        "🧾 Ingest audit for apartment {} in {} (newest first)",
        apartment, ym
    );
    println!("   ─────────────────────────────────────────────────────────────");

    for e in events {
        let written = if e.reading_written { "written" } else { "no write" };
        let photo = match &e.file_sha256 {
            Some(hash) => format!(" │ photo {}", truncate(hash, 12)),
            None => String::new(),
        };
        println!(
            "   [{}] {} │ {:<15} │ {}{}",
            e.id,
            fmt_ts(&e.created_at),
            e.stage.as_str(),
            written,
            photo
        );
        if let Some(diag) = &e.diag_json {
            println!("         {}", truncate(diag, 72));
        }
    }

    Ok(())
}
