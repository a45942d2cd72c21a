//! Tariff management command implementations

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use meterbill_core::db::Database;
use meterbill_core::import::import_tariffs_csv;
use meterbill_core::models::Tariff;
use meterbill_core::ym::Ym;

#[allow(clippy::too_many_arguments)]
pub fn cmd_tariff_set(
    db: &Database,
    month_from: &str,
    cold: f64,
    hot: f64,
    electric: f64,
    sewer: f64,
    t1: Option<f64>,
    t2: Option<f64>,
    t3: Option<f64>,
) -> Result<()> {
    let month_from = Ym::parse(month_from)?;

    db.upsert_tariff(&Tariff {
        month_from: month_from.clone(),
        cold,
        hot,
        electric,
        sewer,
        electric_t1: t1,
        electric_t2: t2,
        electric_t3: t3,
    })?;

    println!("✅ Tariff set from {}", month_from);
    println!(
        "   Cold {:.2} │ Hot {:.2} │ Electric {:.2} │ Sewer {:.2}",
        cold, hot, electric, sewer
    );
    if t1.is_some() || t2.is_some() || t3.is_some() {
        println!(
            "   Tiers: T1 {} │ T2 {} │ T3 {}",
            tier_rate(t1, electric),
            tier_rate(t2, electric),
            tier_rate(t3, electric)
        );
    }

    Ok(())
}

fn tier_rate(tier: Option<f64>, base: f64) -> String {
    match tier {
        Some(rate) => format!("{:.2}", rate),
        None => format!("{:.2} (base)", base),
    }
}

pub fn cmd_tariff_list(db: &Database) -> Result<()> {
    let tariffs = db.list_tariffs()?;

    if tariffs.is_empty() {
        println!("No tariffs yet. Load them with:");
        println!("  meterbill tariff import --file tariffs.csv");
        return Ok(());
    }

    println!();
    println!("💰 Tariffs (roubles, oldest first)");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   From    │   Cold │    Hot │  Elec │ Sewer │ T1    │ T2    │ T3");

    for t in tariffs {
        let tier = |v: Option<f64>| match v {
            Some(rate) => format!("{:>5.2}", rate),
            None => "    -".to_string(),
        };
        println!(
            "   {} │ {:>6.2} │ {:>6.2} │ {:>5.2} │ {:>5.2} │ {} │ {} │ {}",
            t.month_from,
            t.cold,
            t.hot,
            t.electric,
            t.sewer,
            tier(t.electric_t1),
            tier(t.electric_t2),
            tier(t.electric_t3),
        );
    }

    Ok(())
}

pub fn cmd_tariff_import(db: &Database, file: &Path) -> Result<()> {
    println!("📥 Importing tariffs from {}...", file.display());

    let csv_file =
        File::open(file).with_context(|| format!("Failed to open file: {}", file.display()))?;
    let stats = import_tariffs_csv(db, csv_file)?;

    println!("   Imported: {}", stats.imported);
    if stats.skipped > 0 {
        println!("   ⚠️  Skipped: {} invalid row(s)", stats.skipped);
    }
    println!("✅ Import complete. Current history:");

    cmd_tariff_list(db)
}
