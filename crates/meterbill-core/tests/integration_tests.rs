//! Integration tests for meterbill-core
//!
//! These tests exercise the full ingest → reconcile → bill → send workflow.

use std::sync::Mutex;

use async_trait::async_trait;

use meterbill_core::{
    approval::{bill_message, ApprovalManager},
    billing::{BillCalculator, BillReason},
    db::{Database, NewApartment, ReadingWrite},
    ingest::{photo_sha256, CleanedReading, IngestPipeline},
    models::{MeterType, ReadingSource, Tariff},
    notify::NotificationSender,
    reconcile::{ElectricReconciler, ReconcileOutcome},
    ym::Ym,
    Result,
};

/// Records deliveries instead of calling out to a chat transport
struct MockSender {
    sent: Mutex<Vec<(i64, String)>>,
}

impl MockSender {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn last(&self) -> Option<(i64, String)> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl NotificationSender for MockSender {
    async fn send(&self, chat_id: i64, text: &str) -> Result<bool> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(true)
    }
}

/// Apartment plus a tariff effective from 2026-01:
/// cold 50, hot 200, sewer 40, electric T1 5 / T2 6
fn setup(expected: i64, chat_id: Option<i64>) -> (Database, i64) {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let id = db
        .create_apartment(&NewApartment {
            title: "Unit 12".to_string(),
            chat_id,
            electric_expected: Some(expected),
            ..Default::default()
        })
        .expect("Failed to create apartment");
    db.upsert_tariff(&Tariff {
        month_from: Ym::parse("2026-01").unwrap(),
        cold: 50.0,
        hot: 200.0,
        electric: 6.0,
        sewer: 40.0,
        electric_t1: Some(5.0),
        electric_t2: Some(6.0),
        electric_t3: None,
    })
    .expect("Failed to seed tariff");
    (db, id)
}

fn put(db: &Database, id: i64, ym: &str, mt: MeterType, idx: i64, value: f64) {
    db.upsert_reading(&ReadingWrite::new(
        id,
        Ym::parse(ym).unwrap(),
        mt,
        idx,
        value,
        ReadingSource::Ocr,
    ))
    .unwrap();
}

fn put_month(db: &Database, id: i64, ym: &str, cold: f64, hot: f64, e1: f64, e2: f64) {
    put(db, id, ym, MeterType::Cold, 1, cold);
    put(db, id, ym, MeterType::Hot, 1, hot);
    put(db, id, ym, MeterType::Electric, 1, e1);
    put(db, id, ym, MeterType::Electric, 2, e2);
}

/// A photo submission as the bot hands it over: OCR source, no register
/// named, hashed photo bytes
fn photo(apartment_id: i64, ym: &str, mt: MeterType, value: f64, label: &str) -> CleanedReading {
    CleanedReading {
        apartment_id,
        ym: Ym::parse(ym).unwrap(),
        meter_type: mt,
        meter_index: None,
        value: Some(value),
        source: ReadingSource::Ocr,
        chat_id: Some(777),
        photo_sha256: Some(photo_sha256(label.as_bytes())),
    }
}

fn electric_slots(db: &Database, id: i64, ym: &str) -> Vec<(i64, f64)> {
    db.electric_readings(id, &Ym::parse(ym).unwrap())
        .unwrap()
        .iter()
        .map(|r| (r.meter_index, r.value))
        .collect()
}

// =============================================================================
// Ingest → Bill → Send Workflow
// =============================================================================

#[tokio::test]
async fn test_full_ingest_to_bill_workflow() {
    let (db, id) = setup(2, Some(777));
    let sender = MockSender::new();
    let pipeline = IngestPipeline::new(&db, &sender);

    // First month on file: everything arrives, but with no previous month
    // there is nothing to bill
    for (mt, value, label) in [
        (MeterType::Cold, 100.0, "feb-cold"),
        (MeterType::Hot, 50.0, "feb-hot"),
        (MeterType::Electric, 400.0, "feb-night"),
        (MeterType::Electric, 1000.0, "feb-day"),
    ] {
        let outcome = pipeline
            .ingest(&photo(id, "2026-02", mt, value, label))
            .await
            .unwrap();
        assert!(outcome.reading_written);
        assert!(!outcome.bill_sent);
    }
    assert_eq!(sender.count(), 0);

    let bill = BillCalculator::new(&db).calculate(id, "2026-02").unwrap();
    assert_eq!(bill.reason, BillReason::NoPrevMonth);

    // Unlabeled electric photos were sorted: larger value is the day
    // register (T1), smaller the night register (T2)
    assert_eq!(
        electric_slots(&db, id, "2026-02"),
        vec![(1, 1000.0), (2, 400.0)]
    );

    // Second month: the submission that completes the month triggers the
    // send. cold Δ2×50 + hot Δ1×200 + sewer Δ3×40 + T1 Δ10×5 + T2 Δ20×6
    pipeline
        .ingest(&photo(id, "2026-03", MeterType::Cold, 102.0, "mar-cold"))
        .await
        .unwrap();
    pipeline
        .ingest(&photo(id, "2026-03", MeterType::Hot, 51.0, "mar-hot"))
        .await
        .unwrap();
    pipeline
        .ingest(&photo(id, "2026-03", MeterType::Electric, 420.0, "mar-night"))
        .await
        .unwrap();
    let outcome = pipeline
        .ingest(&photo(id, "2026-03", MeterType::Electric, 1010.0, "mar-day"))
        .await
        .unwrap();

    assert_eq!(outcome.bill.reason, BillReason::Ok);
    assert_eq!(outcome.bill.total_rub, Some(590.0));
    assert!(outcome.bill_sent);
    assert!(outcome.bill.sent_at.is_some());
    assert_eq!(sender.count(), 1);

    let ym = Ym::parse("2026-03").unwrap();
    let (chat, text) = sender.last().unwrap();
    assert_eq!(chat, 777);
    assert_eq!(text, bill_message(&ym, 590.0));

    let state = db.get_month_state(id, &ym).unwrap().unwrap();
    assert_eq!(state.bill_sent_total, Some(590.0));

    // Every submission left an audit row with the write recorded
    let events = db.list_ingest_events(id, &ym).unwrap();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e.reading_written));

    // Resubmitting the same photo flags the repeat and sends nothing new
    let outcome = pipeline
        .ingest(&photo(id, "2026-03", MeterType::Cold, 102.0, "mar-cold"))
        .await
        .unwrap();
    assert!(!outcome.warnings.is_empty());
    assert!(!outcome.bill_sent);
    assert_eq!(sender.count(), 1);
}

#[test]
fn test_bill_recompute_is_idempotent() {
    let (db, id) = setup(2, None);
    put_month(&db, id, "2026-02", 100.0, 50.0, 1000.0, 2000.0);
    put_month(&db, id, "2026-03", 102.0, 51.0, 1010.0, 2020.0);

    let calc = BillCalculator::new(&db);
    let first = calc.calculate(id, "2026-03").unwrap();
    assert_eq!(first.reason, BillReason::Ok);
    assert_eq!(first.total_rub, Some(590.0));

    let ym = Ym::parse("2026-03").unwrap();
    let snapshot = db
        .get_month_state(id, &ym)
        .unwrap()
        .unwrap()
        .bill_last_json;

    // Same stored readings: same result, same persisted snapshot
    let second = calc.calculate(id, "2026-03").unwrap();
    assert_eq!(first, second);
    let snapshot_after = db
        .get_month_state(id, &ym)
        .unwrap()
        .unwrap()
        .bill_last_json;
    assert_eq!(snapshot, snapshot_after);
}

// =============================================================================
// Extra Reading Resolution
// =============================================================================

#[test]
fn test_extra_reading_blocks_billing_until_accepted() {
    let (db, id) = setup(2, None);
    put_month(&db, id, "2026-02", 100.0, 50.0, 140.0, 90.0);
    put(&db, id, "2026-03", MeterType::Cold, 1, 102.0);
    put(&db, id, "2026-03", MeterType::Hot, 1, 51.0);

    let rec = ElectricReconciler::new(&db);
    let ym = Ym::parse("2026-03").unwrap();
    rec.reconcile(id, &ym, 150.0, None).unwrap();
    rec.reconcile(id, &ym, 100.0, None).unwrap();

    let calc = BillCalculator::new(&db);
    let bill = calc.calculate(id, "2026-03").unwrap();
    assert_eq!(bill.reason, BillReason::Ok);
    assert_eq!(bill.total_rub, Some(530.0));

    // A third distinct value exceeds the two expected registers: the
    // month is held for review and the total disappears
    let outcome = rec.reconcile(id, &ym, 300.0, None).unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Written {
            index: 3,
            extra_pending: true
        }
    );
    assert_eq!(
        electric_slots(&db, id, "2026-03"),
        vec![(1, 150.0), (2, 100.0), (3, 300.0)]
    );

    let bill = calc.calculate(id, "2026-03").unwrap();
    assert_eq!(bill.reason, BillReason::PendingAdmin);
    assert!(bill.extra_pending);
    assert_eq!(bill.total_rub, None);
    assert_eq!(bill.pending_flags[0].code, "duplicate_photos");

    // Admin accepts: the apartment is billed on three registers from now
    // on and the bill comes back (T3 itself is never priced)
    assert_eq!(rec.accept_extra(id, &ym).unwrap(), Some(3));
    assert_eq!(db.electric_expected(id).unwrap(), 3);

    let bill = calc.calculate(id, "2026-03").unwrap();
    assert_eq!(bill.reason, BillReason::Ok);
    assert_eq!(bill.total_rub, Some(530.0));
    assert!(!bill.extra_pending);

    // 300 does not equal 150 + 100, which is worth a look but not a block
    assert!(bill.t3.mismatch);
    assert_eq!(bill.pending_flags[0].code, "t3_mismatch");
}

#[test]
fn test_rejecting_extra_restores_slot_layout() {
    let (db, id) = setup(2, None);
    put_month(&db, id, "2026-02", 100.0, 50.0, 140.0, 90.0);
    put(&db, id, "2026-03", MeterType::Cold, 1, 102.0);
    put(&db, id, "2026-03", MeterType::Hot, 1, 51.0);

    let rec = ElectricReconciler::new(&db);
    let ym = Ym::parse("2026-03").unwrap();
    rec.reconcile(id, &ym, 150.0, None).unwrap();
    rec.reconcile(id, &ym, 100.0, None).unwrap();
    rec.reconcile(id, &ym, 300.0, None).unwrap();

    assert_eq!(rec.reject_extra(id, &ym).unwrap(), 2);
    assert_eq!(db.electric_expected(id).unwrap(), 2);
    assert_eq!(
        electric_slots(&db, id, "2026-03"),
        vec![(1, 150.0), (2, 100.0)]
    );

    let bill = BillCalculator::new(&db).calculate(id, "2026-03").unwrap();
    assert_eq!(bill.reason, BillReason::Ok);
    assert_eq!(bill.total_rub, Some(530.0));
    assert!(!bill.extra_pending);
}

// =============================================================================
// Diff Gate and Approval
// =============================================================================

#[tokio::test]
async fn test_diff_gate_holds_bill_until_approved() {
    let (db, id) = setup(2, Some(777));
    put_month(&db, id, "2026-01", 78.0, 50.0, 1000.0, 2000.0);
    put_month(&db, id, "2026-02", 88.0, 51.0, 1010.0, 2020.0);
    // cold jumps from Δ10 to Δ22: 1100 ₽ against 500 ₽ last month
    put_month(&db, id, "2026-03", 110.0, 52.0, 1020.0, 2040.0);

    let calc = BillCalculator::new(&db);
    let bill = calc.calculate(id, "2026-03").unwrap();
    assert_eq!(bill.reason, BillReason::PendingAdmin);

    // The blocked articles carry their numbers; the total stays visible
    // so the admin can judge it
    assert_eq!(bill.total_rub, Some(2390.0));
    let flagged: Vec<&str> = bill.pending_items.keys().map(|s| s.as_str()).collect();
    assert_eq!(flagged, vec!["cold", "total"]);
    let cold = &bill.pending_items["cold"];
    assert_eq!(cold.cur_rub, 1100.0);
    assert_eq!(cold.prev_rub, 500.0);
    assert_eq!(cold.diff_rub, 600.0);

    // Nothing goes out while the gate holds
    let sender = MockSender::new();
    let manager = ApprovalManager::new(&db, &sender);
    let ym = Ym::parse("2026-03").unwrap();
    assert!(!manager.send_if_due(id, &ym, &bill).await.unwrap());
    assert_eq!(sender.count(), 0);

    let (bill, sent) = manager.approve(id, &ym, true).await.unwrap();
    assert!(sent);
    assert_eq!(bill.reason, BillReason::Ok);
    assert!(bill.approved_at.is_some());
    assert_eq!(sender.count(), 1);
    let (_, text) = sender.last().unwrap();
    assert_eq!(text, bill_message(&ym, 2390.0));
}

// =============================================================================
// T3 Register Handling
// =============================================================================

#[tokio::test]
async fn test_t3_register_is_never_priced() {
    let (db, id) = setup(3, Some(777));
    put(&db, id, "2026-02", MeterType::Cold, 1, 100.0);
    put(&db, id, "2026-02", MeterType::Hot, 1, 50.0);
    put(&db, id, "2026-02", MeterType::Electric, 1, 1000.0);
    put(&db, id, "2026-02", MeterType::Electric, 2, 2000.0);
    put(&db, id, "2026-02", MeterType::Electric, 3, 3000.0);

    // Water stands still; only the electric registers move. T3 grew by
    // 30 but the total prices T1 and T2 alone: 10×5 + 20×6 = 170
    put(&db, id, "2026-03", MeterType::Cold, 1, 100.0);
    put(&db, id, "2026-03", MeterType::Hot, 1, 50.0);
    put(&db, id, "2026-03", MeterType::Electric, 1, 1010.0);
    put(&db, id, "2026-03", MeterType::Electric, 2, 2020.0);
    put(&db, id, "2026-03", MeterType::Electric, 3, 3030.0);

    let bill = BillCalculator::new(&db).calculate(id, "2026-03").unwrap();
    assert_eq!(bill.reason, BillReason::Ok);
    assert_eq!(bill.total_rub, Some(170.0));
    assert!(!bill.t3.mismatch);
    assert!(bill.pending_flags.is_empty());

    let sender = MockSender::new();
    let manager = ApprovalManager::new(&db, &sender);
    let ym = Ym::parse("2026-03").unwrap();
    assert!(manager.send_if_due(id, &ym, &bill).await.unwrap());
    let (_, text) = sender.last().unwrap();
    assert_eq!(text, bill_message(&ym, 170.0));
}

#[tokio::test]
async fn test_derived_t3_confirmed_by_late_photo() {
    let (db, id) = setup(3, Some(777));
    put(&db, id, "2026-02", MeterType::Cold, 1, 100.0);
    put(&db, id, "2026-02", MeterType::Hot, 1, 50.0);
    put(&db, id, "2026-02", MeterType::Electric, 1, 240.0);
    put(&db, id, "2026-02", MeterType::Electric, 2, 85.0);

    let sender = MockSender::new();
    let pipeline = IngestPipeline::new(&db, &sender);

    pipeline
        .ingest(&photo(id, "2026-03", MeterType::Cold, 102.0, "mar-cold"))
        .await
        .unwrap();
    pipeline
        .ingest(&photo(id, "2026-03", MeterType::Hot, 51.0, "mar-hot"))
        .await
        .unwrap();

    // The tenant types T1 and T2 by hand; T3 is filled with their sum
    let mut manual = photo(id, "2026-03", MeterType::Electric, 250.0, "mar-t1");
    manual.source = ReadingSource::Manual;
    manual.meter_index = Some(1);
    manual.photo_sha256 = None;
    pipeline.ingest(&manual).await.unwrap();

    let mut manual = photo(id, "2026-03", MeterType::Electric, 95.0, "mar-t2");
    manual.source = ReadingSource::Manual;
    manual.meter_index = Some(2);
    manual.photo_sha256 = None;
    let outcome = pipeline.ingest(&manual).await.unwrap();

    assert_eq!(
        electric_slots(&db, id, "2026-03"),
        vec![(1, 250.0), (2, 95.0), (3, 345.0)]
    );

    // The derived T3 never came from a photo, so the strict bill is
    // still incomplete and nothing has been sent
    assert_eq!(outcome.bill.reason, BillReason::MissingPhotos);
    assert_eq!(outcome.bill.missing, vec!["electric_3"]);
    assert!(!outcome.bill_sent);
    assert_eq!(sender.count(), 0);

    // The real T3 photo shows the same sum: the slot is confirmed as OCR
    // and the month completes. cold Δ2×50 + hot Δ1×200 + sewer Δ3×40 +
    // T1 Δ10×5 + T2 Δ10×6
    let outcome = pipeline
        .ingest(&photo(id, "2026-03", MeterType::Electric, 345.0, "mar-t3"))
        .await
        .unwrap();
    assert_eq!(outcome.assigned_index, Some(3));
    let slot3 = db
        .get_reading(id, &Ym::parse("2026-03").unwrap(), MeterType::Electric, 3)
        .unwrap()
        .unwrap();
    assert_eq!(slot3.source, ReadingSource::Ocr);

    assert_eq!(outcome.bill.reason, BillReason::Ok);
    assert_eq!(outcome.bill.total_rub, Some(530.0));
    assert!(outcome.bill_sent);
    assert_eq!(sender.count(), 1);
}

// =============================================================================
// Manual Corrections
// =============================================================================

#[tokio::test]
async fn test_manual_correction_survives_ocr_echo() {
    let (db, id) = setup(2, Some(777));
    let sender = MockSender::new();
    let pipeline = IngestPipeline::new(&db, &sender);

    let mut manual = photo(id, "2026-03", MeterType::Cold, 250.0, "unused");
    manual.source = ReadingSource::Manual;
    manual.photo_sha256 = None;
    pipeline.ingest(&manual).await.unwrap();

    // A late photo of the same dial re-reads the corrected value: the
    // row stays manual, the OCR value is kept for audit
    pipeline
        .ingest(&photo(id, "2026-03", MeterType::Cold, 250.0, "cold-photo"))
        .await
        .unwrap();

    let row = db
        .get_reading(id, &Ym::parse("2026-03").unwrap(), MeterType::Cold, 1)
        .unwrap()
        .unwrap();
    assert_eq!(row.value, 250.0);
    assert_eq!(row.source, ReadingSource::Manual);
    assert_eq!(row.ocr_value, Some(250.0));
}
