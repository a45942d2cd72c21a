//! Reading ingest pipeline
//!
//! Library entry point for cleaned submissions coming off the photo bot.
//! Every submission is recorded in the audit trail before anything is
//! written, then routed to the store by meter type and source:
//! - electric OCR values go through the slot reconciler (auto-sort, or
//!   explicit mode when configured and the submission names a register)
//! - electric manual corrections overwrite the named slot and re-sort
//! - water values are plain slot-1 upserts
//!
//! After the write the month's bill is recomputed and, when payable,
//! delivered through the same-total dedup guard. Warnings picked up along
//! the way (unparsable value, resubmitted photo, a value that duplicates
//! another meter's reading) land as diagnostics JSON on the audit row;
//! none of them ever blocks a write.

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::approval::ApprovalManager;
use crate::billing::{BillCalculator, BillResult};
use crate::config::BillingConfig;
use crate::db::{Database, NewIngestEvent, ReadingWrite};
use crate::error::Result;
use crate::models::{IngestStage, MeterType, ReadingSource};
use crate::notify::NotificationSender;
use crate::reconcile::{ElectricReconciler, ReconcileOutcome};
use crate::ym::Ym;

/// Content hash recorded on the audit row for a submitted photo
pub fn photo_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// One cleaned submission, after upstream OCR and apartment resolution
#[derive(Debug, Clone)]
pub struct CleanedReading {
    pub apartment_id: i64,
    pub ym: Ym,
    pub meter_type: MeterType,
    /// Register named by the submission; `None` lets electric auto-sort
    pub meter_index: Option<i64>,
    /// `None` when the upstream reading did not parse to a number
    pub value: Option<f64>,
    pub source: ReadingSource,
    /// Chat the submission came from, kept on the audit row
    pub chat_id: Option<i64>,
    /// Content hash of the photo, when the submission had one
    pub photo_sha256: Option<String>,
}

/// What one ingest call did
#[derive(Debug)]
pub struct IngestOutcome {
    /// Audit row recorded for the submission
    pub event_id: i64,
    /// A canonical reading row was written or confirmed
    pub reading_written: bool,
    /// Slot the value landed in or matched
    pub assigned_index: Option<i64>,
    /// Diagnostics recorded on the audit row
    pub warnings: Vec<serde_json::Value>,
    /// The month's bill, recomputed after the write
    pub bill: BillResult,
    /// The recomputed bill went out through the dedup guard
    pub bill_sent: bool,
}

/// Routes cleaned submissions into the store and bills out to the chat
pub struct IngestPipeline<'a> {
    db: &'a Database,
    sender: &'a dyn NotificationSender,
    config: BillingConfig,
}

impl<'a> IngestPipeline<'a> {
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

    /// Process one cleaned submission end to end.
    ///
    /// The audit row goes in before any write, so even a submission that
    /// writes nothing leaves a trace. The bill is recomputed and (when
    /// payable) delivered regardless of whether a write happened; an
    /// earlier submission may have been the one that completed the month.
    pub async fn ingest(&self, reading: &CleanedReading) -> Result<IngestOutcome> {
        self.db.require_apartment(reading.apartment_id)?;

        let mut warnings: Vec<serde_json::Value> = Vec::new();

        if let Some(hash) = reading.photo_sha256.as_deref() {
            if self.db.ingest_hash_seen(reading.apartment_id, hash)? {
                debug!(
                    "Apartment {} resubmitted an already seen photo ({})",
                    reading.apartment_id, hash
                );
                warnings.push(json!({ "repeat_photo": hash }));
            }
        }

        let event_id = self.db.insert_ingest_event(&NewIngestEvent {
            apartment_id: reading.apartment_id,
            ym: reading.ym.clone(),
            chat_id: reading.chat_id,
            file_sha256: reading.photo_sha256.clone(),
        })?;

        let (written, assigned) = match reading.value {
            Some(value) => self.write_reading(reading, value)?,
            None => {
                debug!(
                    "Submission for apartment {} {} carried no usable value; nothing written",
                    reading.apartment_id, reading.ym
                );
                warnings.push(json!("unparsable_value"));
                (false, None)
            }
        };

        if let (Some(value), Some(index)) = (reading.value, assigned) {
            if reading.source == ReadingSource::Ocr {
                self.warn_on_cross_duplicate(reading, value, index, &mut warnings)?;
            }
        }

        let stage = if written {
            IngestStage::ReadingWritten
        } else {
            IngestStage::Received
        };
        let diag = if warnings.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&json!({ "warnings": warnings }))?)
        };
        self.db
            .finish_ingest_event(event_id, stage, written, diag.as_deref())?;

        let calc = BillCalculator::with_config(self.db, self.config.clone());
        let bill = calc.calculate(reading.apartment_id, reading.ym.as_str())?;

        let approvals = ApprovalManager::with_config(self.db, self.sender, self.config.clone());
        let bill_sent = approvals
            .send_if_due(reading.apartment_id, &reading.ym, &bill)
            .await?;
        // Re-read so the returned bill carries the fresh sent stamp
        let bill = if bill_sent {
            calc.calculate(reading.apartment_id, reading.ym.as_str())?
        } else {
            bill
        };

        info!(
            "Ingested {} reading for apartment {} {}: written={} slot={:?} bill={} sent={}",
            reading.meter_type,
            reading.apartment_id,
            reading.ym,
            written,
            assigned,
            bill.reason,
            bill_sent
        );

        Ok(IngestOutcome {
            event_id,
            reading_written: written,
            assigned_index: assigned,
            warnings,
            bill,
            bill_sent,
        })
    }

    /// Route the parsed value to the store. Returns whether a row was
    /// written or confirmed, and the slot involved.
    fn write_reading(&self, reading: &CleanedReading, value: f64) -> Result<(bool, Option<i64>)> {
        if reading.meter_type == MeterType::Electric {
            let reconciler = ElectricReconciler::new(self.db);

            if reading.source == ReadingSource::Manual {
                let index = reading.meter_index.unwrap_or(1);
                let landed =
                    reconciler.write_manual(reading.apartment_id, &reading.ym, index, value)?;
                return Ok((true, Some(landed)));
            }

            let explicit = if self.config.explicit_electric_slots {
                reading.meter_index
            } else {
                None
            };
            return Ok(
                match reconciler.reconcile(reading.apartment_id, &reading.ym, value, explicit)? {
                    ReconcileOutcome::Written { index, .. } => (true, Some(index)),
                    ReconcileOutcome::Duplicate { index, .. } => (true, Some(index)),
                    ReconcileOutcome::Dropped => (false, None),
                },
            );
        }

        // water and sewer live in slot 1
        self.db.upsert_reading(&ReadingWrite::new(
            reading.apartment_id,
            reading.ym.clone(),
            reading.meter_type,
            1,
            value,
            reading.source,
        ))?;
        Ok((true, Some(1)))
    }

    /// Flag a value that nearly equals a reading stored under another
    /// (type, slot) key; usually one photo submitted as two meters.
    fn warn_on_cross_duplicate(
        &self,
        reading: &CleanedReading,
        value: f64,
        assigned_index: i64,
        warnings: &mut Vec<serde_json::Value>,
    ) -> Result<()> {
        let hit = self.db.find_near_value(
            reading.apartment_id,
            &reading.ym,
            value,
            self.config.cross_type_warn_tolerance,
            (reading.meter_type, assigned_index),
        )?;
        if let Some(existing) = hit {
            warn!(
                "Value {} ingested as {} slot {} for apartment {} {} is already stored as {} slot {}",
                value,
                reading.meter_type,
                assigned_index,
                reading.apartment_id,
                reading.ym,
                existing.meter_type,
                existing.meter_index
            );
            warnings.push(json!({
                "possible_duplicate": {
                    "meter_type": existing.meter_type.as_str(),
                    "meter_index": existing.meter_index,
                    "ym": reading.ym.as_str(),
                    "value": value,
                    "incoming_meter_type": reading.meter_type.as_str(),
                    "incoming_meter_index": assigned_index,
                }
            }));
        }
        Ok(())
    }
}
