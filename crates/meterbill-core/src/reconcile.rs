//! Electric slot reconciliation
//!
//! Incoming electricity readings arrive unlabeled (a photo of one of up
//! to three registers) or with an explicit register index. This module
//! assigns each value to a canonical slot 1..3:
//! - re-submissions of a known value confirm it instead of taking a slot
//! - months touched by a human are never re-sorted under their feet
//! - OCR-only months are rewritten into canonical order on every write
//! - more distinct values than the apartment expects raises a flag that
//!   blocks billing until an admin accepts or rejects the extra value
//!
//! Every entry point runs as a single transaction: read state, decide,
//! write. Two racing calls for the same apartment-month serialize on the
//! store; the one that commits last wins in full.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::{
    clear_extra_pending_in, delete_electric_above_in, delete_electric_range_in,
    electric_expected_in, electric_readings_in, extra_pending_in, promote_reading_to_ocr_in,
    set_electric_expected_in, set_extra_pending_in, upsert_reading_in, Database, ReadingWrite,
};
use crate::error::Result;
use crate::models::{clamp_expected, same_value, MeterReading, MeterType, ReadingSource};
use crate::ym::Ym;

/// Where an incoming electric value ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Value written to a slot
    Written {
        index: i64,
        /// The write pushed the month over the expected register count
        extra_pending: bool,
    },
    /// Value matched a stored slot within tolerance; nothing new written
    Duplicate {
        index: i64,
        /// The matched slot was manual and is now confirmed as OCR
        promoted_to_ocr: bool,
    },
    /// No slot could take the value
    Dropped,
}

/// Assigns incoming electric readings to canonical slots
pub struct ElectricReconciler<'a> {
    db: &'a Database,
}

impl<'a> ElectricReconciler<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Reconcile one OCR-extracted value into the month's slots.
    ///
    /// `explicit_index` is set when the caller knows which register was
    /// photographed; otherwise the slot is chosen by the sort rules.
    /// Re-submitting a value the month already holds is idempotent.
    pub fn reconcile(
        &self,
        apartment_id: i64,
        ym: &Ym,
        value: f64,
        explicit_index: Option<i64>,
    ) -> Result<ReconcileOutcome> {
        let conn = self.db.conn()?;

        conn.execute("BEGIN TRANSACTION", [])?;

        let result = (|| {
            let expected = electric_expected_in(&conn, apartment_id)?;
            let rows = electric_readings_in(&conn, apartment_id, ym)?;

            // A value we already hold confirms the stored slot instead of
            // occupying another one.
            if let Some(hit) = duplicate_hit(&rows, value, expected) {
                if hit.source != ReadingSource::Ocr {
                    promote_reading_to_ocr_in(&conn, hit.id, value)?;
                    debug!(
                        "Duplicate electric value {} for apartment {} {}: slot {} confirmed as OCR",
                        value, apartment_id, ym, hit.meter_index
                    );
                    return Ok(ReconcileOutcome::Duplicate {
                        index: hit.meter_index,
                        promoted_to_ocr: true,
                    });
                }
                debug!(
                    "Duplicate electric value {} for apartment {} {}: already in slot {}",
                    value, apartment_id, ym, hit.meter_index
                );
                return Ok(ReconcileOutcome::Duplicate {
                    index: hit.meter_index,
                    promoted_to_ocr: false,
                });
            }

            if let Some(requested) = explicit_index {
                return write_explicit_in(&conn, apartment_id, ym, requested, value, expected, &rows);
            }

            if rows.iter().any(|r| r.source == ReadingSource::Manual) {
                return manual_present_in(&conn, apartment_id, ym, value, expected, &rows);
            }

            auto_sort_in(&conn, apartment_id, ym, value, expected, &rows)
        })();

        match result {
            Ok(outcome) => {
                conn.execute("COMMIT", [])?;
                Ok(outcome)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Overwrite a slot with a human-entered value, then restore
    /// canonical order (admin and bot corrections).
    ///
    /// Returns the slot the value landed in after re-sorting.
    pub fn write_manual(
        &self,
        apartment_id: i64,
        ym: &Ym,
        meter_index: i64,
        value: f64,
    ) -> Result<i64> {
        let idx = meter_index.clamp(1, 3);
        let conn = self.db.conn()?;

        conn.execute("BEGIN TRANSACTION", [])?;

        let result = (|| {
            let expected = electric_expected_in(&conn, apartment_id)?;

            upsert_reading_in(
                &conn,
                &ReadingWrite::new(
                    apartment_id,
                    ym.clone(),
                    MeterType::Electric,
                    idx,
                    value,
                    ReadingSource::Manual,
                ),
            )?;

            if expected != 3 {
                return Ok(idx);
            }

            let mapping = normalize_slots_in(&conn, apartment_id, ym)?;
            Ok(mapping
                .iter()
                .find(|(_, v)| same_value(*v, value))
                .map(|(slot, _)| *slot)
                .unwrap_or(idx))
        })();

        match result {
            Ok(landed) => {
                conn.execute("COMMIT", [])?;
                Ok(landed)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Admin accepts the extra value: the apartment is billed on one more
    /// register from now on (capped at 3) and the month unblocks.
    ///
    /// Returns the new expected count, or `None` when nothing was pending.
    pub fn accept_extra(&self, apartment_id: i64, ym: &Ym) -> Result<Option<i64>> {
        let conn = self.db.conn()?;

        conn.execute("BEGIN TRANSACTION", [])?;

        let result = (|| {
            let (pending, snapshot) = extra_pending_in(&conn, apartment_id, ym)?;
            if !pending {
                return Ok(None);
            }

            let snapshot = match snapshot {
                Some(s) => clamp_expected(s),
                None => electric_expected_in(&conn, apartment_id)?,
            };
            let new_expected = (snapshot + 1).min(3);

            set_electric_expected_in(&conn, apartment_id, new_expected)?;
            clear_extra_pending_in(&conn, apartment_id, ym)?;
            Ok(Some(new_expected))
        })();

        match result {
            Ok(outcome) => {
                conn.execute("COMMIT", [])?;
                if let Some(n) = outcome {
                    info!(
                        "Accepted extra electric reading for apartment {} {}: now billed on {} registers",
                        apartment_id, ym, n
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Admin rejects the extra value: slots above the snapshotted expected
    /// count are deleted and the month unblocks.
    ///
    /// Returns the expected count that was kept.
    pub fn reject_extra(&self, apartment_id: i64, ym: &Ym) -> Result<i64> {
        let conn = self.db.conn()?;

        conn.execute("BEGIN TRANSACTION", [])?;

        let result = (|| {
            let (_, snapshot) = extra_pending_in(&conn, apartment_id, ym)?;
            let snapshot = match snapshot {
                Some(s) => clamp_expected(s),
                None => electric_expected_in(&conn, apartment_id)?,
            };

            delete_electric_above_in(&conn, apartment_id, ym, snapshot)?;
            clear_extra_pending_in(&conn, apartment_id, ym)?;
            Ok(snapshot)
        })();

        match result {
            Ok(snapshot) => {
                conn.execute("COMMIT", [])?;
                info!(
                    "Rejected extra electric reading for apartment {} {}: kept slots 1..{}",
                    apartment_id, ym, snapshot
                );
                Ok(snapshot)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }
}

/// Find the stored row the value confirms, if any.
///
/// When the apartment is billed on all three registers, a match in slot 3
/// wins over lower slots so that a late T3 photo confirms T3 rather than
/// re-confirming T1.
fn duplicate_hit(rows: &[MeterReading], value: f64, expected: i64) -> Option<&MeterReading> {
    let hits: Vec<&MeterReading> = rows
        .iter()
        .filter(|r| same_value(r.value, value))
        .collect();
    if hits.is_empty() {
        return None;
    }
    if expected >= 3 {
        if let Some(t3) = hits.iter().find(|r| r.meter_index == 3) {
            return Some(t3);
        }
    }
    hits.into_iter().next()
}

fn first_free_slot(rows: &[MeterReading]) -> Option<i64> {
    (1..=3).find(|i| !rows.iter().any(|r| r.meter_index == *i))
}

/// Canonical slot for each position of an ascending-sorted value list.
///
/// One value belongs to T1. With two, the smaller is T2 and the larger
/// T1. With three, T2 takes the minimum, T1 the middle and T3 the
/// maximum.
fn canonical_slots(count: usize) -> &'static [i64] {
    match count {
        1 => &[1],
        2 => &[2, 1],
        3 => &[2, 1, 3],
        _ => &[],
    }
}

/// Rewrite the month's electric rows into canonical slot order, keeping
/// each value's source and audit trail. Returns the (slot, value) layout
/// that was written, observed values first.
///
/// With exactly two observed values the day/night registers sum to the
/// total register, so slot 3 is filled with `min + max` as a manual
/// placeholder (no OCR trail). It does not satisfy the photo requirement
/// for billing; a later photo of the real T3 confirms it via the
/// duplicate path.
fn normalize_slots_in(conn: &Connection, apartment_id: i64, ym: &Ym) -> Result<Vec<(i64, f64)>> {
    let mut items = electric_readings_in(conn, apartment_id, ym)?;
    if items.is_empty() {
        return Ok(Vec::new());
    }
    items.sort_by(|a, b| a.value.partial_cmp(&b.value).unwrap_or(std::cmp::Ordering::Equal));

    let slots = canonical_slots(items.len());

    delete_electric_range_in(conn, apartment_id, ym)?;

    let mut mapping = Vec::with_capacity(items.len() + 1);
    for (slot, item) in slots.iter().zip(items.iter()) {
        upsert_reading_in(
            conn,
            &ReadingWrite {
                apartment_id,
                ym: ym.clone(),
                meter_type: MeterType::Electric,
                meter_index: *slot,
                value: item.value,
                source: item.source,
                ocr_value: item.ocr_value,
            },
        )?;
        mapping.push((*slot, item.value));
    }

    if items.len() == 2 {
        let derived = items[0].value + items[1].value;
        upsert_reading_in(
            conn,
            &ReadingWrite {
                apartment_id,
                ym: ym.clone(),
                meter_type: MeterType::Electric,
                meter_index: 3,
                value: derived,
                source: ReadingSource::Manual,
                ocr_value: None,
            },
        )?;
        mapping.push((3, derived));
        debug!(
            "Filled electric slot 3 for apartment {} {} with derived sum {}",
            apartment_id, ym, derived
        );
    }
    Ok(mapping)
}

/// Explicit-index write: the caller knows which register was read.
fn write_explicit_in(
    conn: &Connection,
    apartment_id: i64,
    ym: &Ym,
    requested: i64,
    value: f64,
    expected: i64,
    rows: &[MeterReading],
) -> Result<ReconcileOutcome> {
    let requested = requested.clamp(1, 3);

    if expected == 3 {
        // Never overwrite an occupied slot while a free one exists; the
        // re-sort below puts everything back in canonical order anyway.
        let mut target = requested;
        if rows.iter().any(|r| r.meter_index == target) {
            if let Some(free) = first_free_slot(rows) {
                target = free;
            }
        }

        upsert_reading_in(
            conn,
            &ReadingWrite::new(
                apartment_id,
                ym.clone(),
                MeterType::Electric,
                target,
                value,
                ReadingSource::Ocr,
            ),
        )?;

        let mapping = normalize_slots_in(conn, apartment_id, ym)?;
        let landed = mapping
            .iter()
            .find(|(_, v)| same_value(*v, value))
            .map(|(slot, _)| *slot)
            .unwrap_or(target);
        return Ok(ReconcileOutcome::Written {
            index: landed,
            extra_pending: false,
        });
    }

    upsert_reading_in(
        conn,
        &ReadingWrite::new(
            apartment_id,
            ym.clone(),
            MeterType::Electric,
            requested,
            value,
            ReadingSource::Ocr,
        ),
    )?;

    let extra = requested > expected && expected < 3;
    if extra {
        set_extra_pending_in(conn, apartment_id, ym, expected)?;
        info!(
            "Electric slot {} exceeds the {} expected for apartment {} {}: held for admin review",
            requested, expected, apartment_id, ym
        );
    }
    Ok(ReconcileOutcome::Written {
        index: requested,
        extra_pending: extra,
    })
}

/// A human already corrected this month: keep their slots where they are
/// and fill the first free one.
fn manual_present_in(
    conn: &Connection,
    apartment_id: i64,
    ym: &Ym,
    value: f64,
    expected: i64,
    rows: &[MeterReading],
) -> Result<ReconcileOutcome> {
    if let Some(free) = first_free_slot(rows) {
        upsert_reading_in(
            conn,
            &ReadingWrite::new(
                apartment_id,
                ym.clone(),
                MeterType::Electric,
                free,
                value,
                ReadingSource::Ocr,
            ),
        )?;

        let extra = free > expected && expected < 3;
        if extra {
            set_extra_pending_in(conn, apartment_id, ym, expected)?;
            info!(
                "Electric slot {} exceeds the {} expected for apartment {} {}: held for admin review",
                free, expected, apartment_id, ym
            );
        }
        return Ok(ReconcileOutcome::Written {
            index: free,
            extra_pending: extra,
        });
    }

    // All slots taken. A slot-3 value that never came from a photo may
    // still be replaced by one that did; an OCR-confirmed T3 stays.
    if let Some(slot3) = rows.iter().find(|r| r.meter_index == 3) {
        if slot3.source != ReadingSource::Ocr {
            upsert_reading_in(
                conn,
                &ReadingWrite::new(
                    apartment_id,
                    ym.clone(),
                    MeterType::Electric,
                    3,
                    value,
                    ReadingSource::Ocr,
                ),
            )?;
            return Ok(ReconcileOutcome::Written {
                index: 3,
                extra_pending: false,
            });
        }
    }

    debug!(
        "Electric value {} for apartment {} {} dropped: all slots occupied",
        value, apartment_id, ym
    );
    Ok(ReconcileOutcome::Dropped)
}

/// OCR-only month: rebuild the slot layout from all distinct values.
fn auto_sort_in(
    conn: &Connection,
    apartment_id: i64,
    ym: &Ym,
    value: f64,
    expected: i64,
    rows: &[MeterReading],
) -> Result<ReconcileOutcome> {
    // Distinct values within tolerance, smallest three kept
    let mut uniq: Vec<f64> = Vec::new();
    for v in rows.iter().map(|r| r.value).chain(std::iter::once(value)) {
        if !uniq.iter().any(|u| same_value(v, *u)) {
            uniq.push(v);
        }
    }
    uniq.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    uniq.truncate(3);

    let mut normal = uniq;
    let mut extra: Option<f64> = None;
    if normal.len() as i64 > expected && expected < 3 {
        extra = Some(normal[expected as usize]);
        normal.truncate(expected as usize);
    }

    let mut mapping: Vec<(i64, f64)> = canonical_slots(normal.len())
        .iter()
        .zip(normal.iter())
        .map(|(slot, v)| (*slot, *v))
        .collect();
    if let Some(v) = extra {
        mapping.push((expected + 1, v));
    }

    delete_electric_range_in(conn, apartment_id, ym)?;
    for (slot, v) in &mapping {
        upsert_reading_in(
            conn,
            &ReadingWrite::new(
                apartment_id,
                ym.clone(),
                MeterType::Electric,
                *slot,
                *v,
                ReadingSource::Ocr,
            ),
        )?;
    }

    if extra.is_some() {
        set_extra_pending_in(conn, apartment_id, ym, expected)?;
        info!(
            "Apartment {} {} sent more distinct electric values than the {} expected: held for admin review",
            apartment_id, ym, expected
        );
    } else {
        clear_extra_pending_in(conn, apartment_id, ym)?;
    }

    match mapping.iter().find(|(_, v)| same_value(*v, value)) {
        Some((slot, _)) => Ok(ReconcileOutcome::Written {
            index: *slot,
            extra_pending: extra.is_some(),
        }),
        None => {
            debug!(
                "Electric value {} for apartment {} {} dropped: outside the slot cap",
                value, apartment_id, ym
            );
            Ok(ReconcileOutcome::Dropped)
        }
    }
}
