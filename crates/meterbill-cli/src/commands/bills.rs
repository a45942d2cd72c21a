//! Bill command implementations (calc, approve, send) and extra-reading resolution

use anyhow::Result;
use meterbill_core::approval::ApprovalManager;
use meterbill_core::billing::{BillCalculator, BillReason, BillResult};
use meterbill_core::config::BillingConfig;
use meterbill_core::db::Database;
use meterbill_core::notify::TG_TOKEN_ENV;
use meterbill_core::reconcile::ElectricReconciler;
use meterbill_core::ym::Ym;

use super::{fmt_ts, resolve_month, sender_from_env};

/// One-line bill verdict, shared with the ingest path
pub fn print_bill_line(bill: &BillResult) {
    match bill.reason {
        BillReason::Ok => {
            if let Some(total) = bill.total_rub {
                println!("   💰 Bill: {:.2} ₽ (payable)", total);
            }
        }
        BillReason::MissingPhotos => {
            println!("   ⏳ Bill: waiting for readings ({})", bill.missing.join(", "));
        }
        BillReason::PendingAdmin => {
            println!("   ⛔ Bill: held for admin review");
        }
        BillReason::NoPrevMonth => {
            println!("   ℹ️  Bill: first recorded month, nothing to bill against");
        }
    }
}

fn print_bill(ym: &Ym, bill: &BillResult) {
    println!();
    println!("🧾 Bill for {}", ym);
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Reason: {}", bill.reason);

    if !bill.missing.is_empty() {
        println!("   Missing readings: {}", bill.missing.join(", "));
    }
    if bill.extra_pending {
        println!("   ⚠️  Extra electric reading pending (accept or reject it)");
    }

    for (article, item) in &bill.pending_items {
        println!(
            "   ⛔ {}: {:.2} ₽ vs {:.2} ₽ last month (moved {:.2}, threshold {:.2})",
            article, item.cur_rub, item.prev_rub, item.diff_rub, bill.threshold_rub
        );
    }
    for flag in &bill.pending_flags {
        println!("   ⚠️  [{}] {}", flag.code, flag.message);
    }
    if bill.t3.mismatch {
        if let (Some(expected), Some(raw)) = (bill.t3.expected, bill.t3.raw) {
            println!("   ⚠️  T3 cross-check: stored {:.3}, T1+T2 gives {:.3}", raw, expected);
        }
    }

    match bill.total_rub {
        Some(total) => println!("   Total: {:.2} ₽", total),
        None => println!("   Total: (not payable yet)"),
    }
    if let Some(at) = &bill.approved_at {
        println!("   Approved: {}", fmt_ts(at));
    }
    if let Some(at) = &bill.sent_at {
        println!("   Sent: {}", fmt_ts(at));
    }
}

pub fn cmd_bill_calc(db: &Database, apartment: i64, month: Option<&str>, json: bool) -> Result<()> {
    let ym = resolve_month(month)?;
    let config = BillingConfig::load()?;
    let calc = BillCalculator::with_config(db, config);

    let bill = calc.calculate(apartment, ym.as_str())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bill)?);
        return Ok(());
    }

    print_bill(&ym, &bill);
    Ok(())
}

pub async fn cmd_bill_approve(
    db: &Database,
    apartment: i64,
    month: Option<&str>,
    send: bool,
) -> Result<()> {
    let ym = resolve_month(month)?;
    let config = BillingConfig::load()?;
    let sender = sender_from_env();
    let manager = ApprovalManager::with_config(db, sender.as_ref(), config);

    let (bill, sent) = manager.approve(apartment, &ym, send).await?;

    println!("✅ Bill for apartment {} {} approved", apartment, ym);
    print_bill(&ym, &bill);
    if send {
        if sent {
            println!("   📨 Sent to the bound chat");
        } else {
            println!("   Not delivered (no chat or transport, or already sent at this total)");
        }
    }

    Ok(())
}

pub async fn cmd_bill_send(db: &Database, apartment: i64, month: Option<&str>) -> Result<()> {
    let ym = resolve_month(month)?;

    if std::env::var(TG_TOKEN_ENV).is_err() {
        println!("💡 Tip: Set {} to deliver bills over Telegram", TG_TOKEN_ENV);
    }

    let config = BillingConfig::load()?;
    let sender = sender_from_env();
    let manager = ApprovalManager::with_config(db, sender.as_ref(), config.clone());
    let calc = BillCalculator::with_config(db, config);

    let bill = calc.calculate(apartment, ym.as_str())?;
    let sent = manager.send_if_due(apartment, &ym, &bill).await?;

    print_bill(&ym, &bill);
    if sent {
        println!("   📨 Sent to the bound chat");
    } else {
        println!("   Not sent (unpayable, undeliverable, or already sent at this total)");
    }

    Ok(())
}

pub async fn cmd_bill_send_without_t3(
    db: &Database,
    apartment: i64,
    month: Option<&str>,
) -> Result<()> {
    let ym = resolve_month(month)?;
    let config = BillingConfig::load()?;
    let sender = sender_from_env();
    let manager = ApprovalManager::with_config(db, sender.as_ref(), config);

    let (bill, sent) = manager.send_without_t3_photo(apartment, &ym).await?;

    println!(
        "✅ T3 photo requirement waived for apartment {} {}",
        apartment, ym
    );
    print_bill(&ym, &bill);
    if sent {
        println!("   📨 Sent to the bound chat");
    } else {
        println!("   Not delivered (no transport, or already sent at this total)");
    }

    Ok(())
}

pub fn cmd_extra_accept(db: &Database, apartment: i64, month: Option<&str>) -> Result<()> {
    let ym = resolve_month(month)?;
    let reconciler = ElectricReconciler::new(db);

    match reconciler.accept_extra(apartment, &ym)? {
        Some(expected) => {
            println!(
                "✅ Extra electric reading accepted for apartment {} {}",
                apartment, ym
            );
            println!("   Unit is now billed on {} register(s)", expected);
            println!(
                "   Recalculate with: meterbill bill calc -a {} -m {}",
                apartment, ym
            );
        }
        None => println!("Nothing pending for apartment {} in {}.", apartment, ym),
    }

    Ok(())
}

pub fn cmd_extra_reject(db: &Database, apartment: i64, month: Option<&str>) -> Result<()> {
    let ym = resolve_month(month)?;
    let reconciler = ElectricReconciler::new(db);

    let expected = reconciler.reject_extra(apartment, &ym)?;

    println!(
        "✅ Extra electric readings rejected for apartment {} {}",
        apartment, ym
    );
    println!("   Slot layout restored to {} register(s)", expected);

    Ok(())
}
