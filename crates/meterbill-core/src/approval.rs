//! Bill approval and delivery
//!
//! Admin decisions around a computed bill:
//! - approve a diff-gated bill, optionally delivering it right away
//! - deliver a payable bill to the bound chat, at most once per total
//! - the send-without-T3 override for months where the T3 value exists
//!   but its photo never arrived
//!
//! Delivery is idempotent per total: a bill is re-sent only when the
//! payable amount differs from what the chat last received.

use tracing::{debug, info};

use crate::billing::{round2, BillCalculator, BillReason, BillResult};
use crate::config::BillingConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::notify::NotificationSender;
use crate::ym::Ym;

/// The payment message delivered to the apartment chat
pub fn bill_message(ym: &Ym, total_rub: f64) -> String {
    format!("Сумма оплаты по счётчикам за {}: {:.2} ₽", ym, total_rub)
}

/// Whether two payable totals are the same amount of money
fn same_total(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => round2(a) == round2(b),
        _ => false,
    }
}

/// Coordinates bill approval and delivery
pub struct ApprovalManager<'a> {
    db: &'a Database,
    sender: &'a dyn NotificationSender,
    config: BillingConfig,
}

impl<'a> ApprovalManager<'a> {
    pub fn new(db: &'a Database, sender: &'a dyn NotificationSender) -> Self {
        Self {
            db,
            sender,
            config: BillingConfig::default(),
        }
    }

    pub fn with_config(
        db: &'a Database,
        sender: &'a dyn NotificationSender,
        config: BillingConfig,
    ) -> Self {
        Self { db, sender, config }
    }

    fn calculator(&self) -> BillCalculator<'a> {
        BillCalculator::with_config(self.db, self.config.clone())
    }

    /// Approve the month's bill as computed, recompute it, and (when
    /// `send` is set) deliver it if payable.
    ///
    /// Returns the fresh post-approval bill and whether it went out.
    pub async fn approve(&self, apartment_id: i64, ym: &Ym, send: bool) -> Result<(BillResult, bool)> {
        self.db.approve_bill(apartment_id, ym)?;
        info!("Bill for apartment {} {} approved", apartment_id, ym);

        let calc = self.calculator();
        let bill = calc.calculate(apartment_id, ym.as_str())?;

        let mut sent = false;
        if send {
            sent = self.send_if_due(apartment_id, ym, &bill).await?;
        }

        // Re-read so the returned bill carries fresh sent/approved stamps
        let bill = calc.calculate(apartment_id, ym.as_str())?;
        Ok((bill, sent))
    }

    /// Deliver a payable bill to the apartment's chat unless the same
    /// total already went out.
    ///
    /// Quietly does nothing when the bill is not payable, no chat is
    /// bound, or delivery fails; billing state is only stamped on a
    /// confirmed delivery.
    pub async fn send_if_due(&self, apartment_id: i64, ym: &Ym, bill: &BillResult) -> Result<bool> {
        if bill.reason != BillReason::Ok {
            return Ok(false);
        }
        let total = match bill.total_rub {
            Some(t) => t,
            None => return Ok(false),
        };

        let state = self.db.get_month_state(apartment_id, ym)?;
        if same_total(state.and_then(|s| s.bill_sent_total), Some(total)) {
            debug!(
                "Bill for apartment {} {} already sent at this total; skipping",
                apartment_id, ym
            );
            return Ok(false);
        }

        let apartment = self.db.require_apartment(apartment_id)?;
        let chat_id = match apartment.chat_id {
            Some(c) => c,
            None => {
                debug!("No chat bound to apartment {}; bill not sent", apartment_id);
                return Ok(false);
            }
        };

        let delivered = self.sender.send(chat_id, &bill_message(ym, total)).await?;
        if delivered {
            self.db.mark_bill_sent(apartment_id, ym, total)?;
            info!(
                "Bill for apartment {} {} sent: {:.2} ₽",
                apartment_id, ym, total
            );
        }
        Ok(delivered)
    }

    /// Manual override: deliver the bill when the only thing outstanding
    /// is the T3 photo. Every other billing rule stays in force.
    pub async fn send_without_t3_photo(
        &self,
        apartment_id: i64,
        ym: &Ym,
    ) -> Result<(BillResult, bool)> {
        let calc = self.calculator();

        let strict = calc.calculate(apartment_id, ym.as_str())?;
        let only_t3_missing =
            strict.reason == BillReason::MissingPhotos && strict.missing == ["electric_3"];
        if !only_t3_missing {
            return Err(Error::InvalidAction(
                "override allowed only when electric_3 is the only missing reading".to_string(),
            ));
        }

        let bill = calc.calculate_with(apartment_id, ym.as_str(), true)?;
        let total = match (bill.reason, bill.total_rub) {
            (BillReason::Ok, Some(t)) => t,
            _ => {
                return Err(Error::InvalidAction(format!(
                    "cannot send bill with reason {}",
                    bill.reason
                )));
            }
        };

        let apartment = self.db.require_apartment(apartment_id)?;
        let chat_id = apartment.chat_id.ok_or_else(|| {
            Error::InvalidAction(format!("no chat bound to apartment {}", apartment_id))
        })?;

        let state = self.db.get_month_state(apartment_id, ym)?;
        if same_total(state.and_then(|s| s.bill_sent_total), Some(total)) {
            debug!(
                "Bill for apartment {} {} already sent at this total; skipping",
                apartment_id, ym
            );
            return Ok((bill, false));
        }

        let delivered = self.sender.send(chat_id, &bill_message(ym, total)).await?;
        if delivered {
            self.db.mark_bill_sent(apartment_id, ym, total)?;
            info!(
                "Bill for apartment {} {} sent without T3 photo: {:.2} ₽",
                apartment_id, ym, total
            );
        }
        Ok((bill, delivered))
    }
}
