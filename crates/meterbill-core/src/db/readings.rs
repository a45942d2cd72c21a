//! Meter reading storage
//!
//! One canonical row per (apartment, month, type, slot). Writes are
//! upserts with a single carve-out: an OCR write never downgrades a
//! manual row whose value it merely re-confirms, which keeps admin-entered
//! numbers stable when the same photo is processed again.
//!
//! The `_in` functions take an explicit connection so the reconciler can
//! run them inside one transaction with its delete/reinsert rewrite.

use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{same_value, MeterReading, MeterType, ReadingSource};
use crate::ym::Ym;

/// A reading write targeting one (apartment, month, type, slot) key
#[derive(Debug, Clone)]
pub struct ReadingWrite {
    pub apartment_id: i64,
    pub ym: Ym,
    pub meter_type: MeterType,
    /// Slot 1..3 for electric; 1 for water/sewer
    pub meter_index: i64,
    pub value: f64,
    pub source: ReadingSource,
    /// Original OCR value, kept for audit
    pub ocr_value: Option<f64>,
}

impl ReadingWrite {
    pub fn new(
        apartment_id: i64,
        ym: Ym,
        meter_type: MeterType,
        meter_index: i64,
        value: f64,
        source: ReadingSource,
    ) -> Self {
        Self {
            apartment_id,
            ym,
            meter_type,
            meter_index,
            value,
            source,
            ocr_value: if source == ReadingSource::Ocr {
                Some(value)
            } else {
                None
            },
        }
    }
}

/// Result of upserting a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingUpsertResult {
    /// New row created, contains its ID
    Inserted(i64),
    /// Existing row overwritten, contains its ID
    Updated(i64),
    /// OCR re-confirmed an unchanged manual value; row stays manual
    KeptManual(i64),
}

impl ReadingUpsertResult {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Updated(id) | Self::KeptManual(id) => *id,
        }
    }
}

const READING_COLS: &str =
    "id, apartment_id, ym, meter_type, meter_index, value, source, ocr_value, created_at, updated_at";

fn row_to_reading(row: &rusqlite::Row<'_>) -> rusqlite::Result<MeterReading> {
    let ym_str: String = row.get(2)?;
    let type_str: String = row.get(3)?;
    let source_str: String = row.get(6)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(MeterReading {
        id: row.get(0)?,
        apartment_id: row.get(1)?,
        // ym and type are validated on write
        ym: Ym::parse(&ym_str).unwrap_or_default(),
        meter_type: type_str.parse().unwrap_or(MeterType::Cold),
        meter_index: row.get(4)?,
        value: row.get(5)?,
        source: source_str.parse().unwrap_or(ReadingSource::Ocr),
        ocr_value: row.get(7)?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

/// Upsert a reading on an explicit connection.
///
/// An OCR write that matches an existing manual value within tolerance
/// leaves the row manual and only records the confirming OCR value.
pub fn upsert_reading_in(conn: &Connection, w: &ReadingWrite) -> Result<ReadingUpsertResult> {
    let existing: Option<(i64, f64, String)> = conn
        .query_row(
            "SELECT id, value, source FROM meter_readings
             WHERE apartment_id = ? AND ym = ? AND meter_type = ? AND meter_index = ?",
            params![
                w.apartment_id,
                w.ym.as_str(),
                w.meter_type.as_str(),
                w.meter_index
            ],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    if let Some((id, value, source)) = existing {
        let existing_source: ReadingSource = source.parse().unwrap_or_default();
        if w.source == ReadingSource::Ocr
            && existing_source == ReadingSource::Manual
            && same_value(value, w.value)
        {
            conn.execute(
                "UPDATE meter_readings
                 SET ocr_value = COALESCE(?, ocr_value), updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?",
                params![w.ocr_value, id],
            )?;
            return Ok(ReadingUpsertResult::KeptManual(id));
        }

        conn.execute(
            "UPDATE meter_readings
             SET value = ?, source = ?, ocr_value = COALESCE(?, ocr_value),
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![w.value, w.source.as_str(), w.ocr_value, id],
        )?;
        return Ok(ReadingUpsertResult::Updated(id));
    }

    conn.execute(
        "INSERT INTO meter_readings (apartment_id, ym, meter_type, meter_index, value, source, ocr_value)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            w.apartment_id,
            w.ym.as_str(),
            w.meter_type.as_str(),
            w.meter_index,
            w.value,
            w.source.as_str(),
            w.ocr_value
        ],
    )?;
    Ok(ReadingUpsertResult::Inserted(conn.last_insert_rowid()))
}

/// Mark a stored reading as OCR-confirmed (duplicate resubmission of a
/// manual value).
pub fn promote_reading_to_ocr_in(conn: &Connection, id: i64, ocr_value: f64) -> Result<()> {
    conn.execute(
        "UPDATE meter_readings
         SET source = 'ocr', ocr_value = COALESCE(ocr_value, ?), updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
        params![ocr_value, id],
    )?;
    Ok(())
}

/// Electric rows (slots 1..3) for one apartment-month, ordered by slot.
pub fn electric_readings_in(
    conn: &Connection,
    apartment_id: i64,
    ym: &Ym,
) -> Result<Vec<MeterReading>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM meter_readings
         WHERE apartment_id = ? AND ym = ? AND meter_type = 'electric'
           AND meter_index BETWEEN 1 AND 3
         ORDER BY meter_index",
        READING_COLS
    ))?;

    let readings = stmt
        .query_map(params![apartment_id, ym.as_str()], row_to_reading)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(readings)
}

/// Delete every electric slot row (1..3) for one apartment-month.
///
/// Only used inside the auto-sort rewrite transaction, immediately
/// followed by the canonical reinsert.
pub fn delete_electric_range_in(conn: &Connection, apartment_id: i64, ym: &Ym) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM meter_readings
         WHERE apartment_id = ? AND ym = ? AND meter_type = 'electric'
           AND meter_index BETWEEN 1 AND 3",
        params![apartment_id, ym.as_str()],
    )?;
    Ok(deleted)
}

/// Delete electric rows above a slot on an explicit connection.
pub fn delete_electric_above_in(
    conn: &Connection,
    apartment_id: i64,
    ym: &Ym,
    keep_max: i64,
) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM meter_readings
         WHERE apartment_id = ? AND ym = ? AND meter_type = 'electric'
           AND meter_index > ? AND meter_index BETWEEN 1 AND 3",
        params![apartment_id, ym.as_str(), keep_max],
    )?;
    Ok(deleted)
}

impl Database {
    /// Upsert a reading (see [`upsert_reading_in`])
    pub fn upsert_reading(&self, w: &ReadingWrite) -> Result<ReadingUpsertResult> {
        let conn = self.conn()?;
        upsert_reading_in(&conn, w)
    }

    /// Get one reading row by its full key
    pub fn get_reading(
        &self,
        apartment_id: i64,
        ym: &Ym,
        meter_type: MeterType,
        meter_index: i64,
    ) -> Result<Option<MeterReading>> {
        let conn = self.conn()?;
        let reading = conn
            .query_row(
                &format!(
                    "SELECT {} FROM meter_readings
                     WHERE apartment_id = ? AND ym = ? AND meter_type = ? AND meter_index = ?",
                    READING_COLS
                ),
                params![apartment_id, ym.as_str(), meter_type.as_str(), meter_index],
                row_to_reading,
            )
            .optional()?;
        Ok(reading)
    }

    /// Get just the stored value for a key, if any
    pub fn reading_value(
        &self,
        apartment_id: i64,
        ym: &Ym,
        meter_type: MeterType,
        meter_index: i64,
    ) -> Result<Option<f64>> {
        let conn = self.conn()?;
        let value: Option<f64> = conn
            .query_row(
                "SELECT value FROM meter_readings
                 WHERE apartment_id = ? AND ym = ? AND meter_type = ? AND meter_index = ?",
                params![apartment_id, ym.as_str(), meter_type.as_str(), meter_index],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Electric rows (slots 1..3) for one apartment-month, ordered by slot
    pub fn electric_readings(&self, apartment_id: i64, ym: &Ym) -> Result<Vec<MeterReading>> {
        let conn = self.conn()?;
        electric_readings_in(&conn, apartment_id, ym)
    }

    /// All readings for one apartment-month, ordered by type then slot
    pub fn list_readings_for_month(
        &self,
        apartment_id: i64,
        ym: &Ym,
    ) -> Result<Vec<MeterReading>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM meter_readings
             WHERE apartment_id = ? AND ym = ?
             ORDER BY meter_type, meter_index",
            READING_COLS
        ))?;

        let readings = stmt
            .query_map(params![apartment_id, ym.as_str()], row_to_reading)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    /// Delete electric rows above a slot (used when an admin rejects an
    /// extra reading; `keep_max` is the snapshotted expected count)
    pub fn delete_electric_above(
        &self,
        apartment_id: i64,
        ym: &Ym,
        keep_max: i64,
    ) -> Result<usize> {
        let conn = self.conn()?;
        delete_electric_above_in(&conn, apartment_id, ym, keep_max)
    }

    /// Find a stored reading for the month that nearly equals `value` but
    /// lives under a different (type, slot) key. The lowest key wins when
    /// several match.
    ///
    /// Ingest uses this to flag a photo that was probably submitted twice
    /// under two meter types.
    pub fn find_near_value(
        &self,
        apartment_id: i64,
        ym: &Ym,
        value: f64,
        tolerance: f64,
        exclude: (MeterType, i64),
    ) -> Result<Option<MeterReading>> {
        let conn = self.conn()?;
        let reading = conn
            .query_row(
                &format!(
                    "SELECT {} FROM meter_readings
                     WHERE apartment_id = ? AND ym = ?
                       AND ABS(value - ?) <= ?
                       AND NOT (meter_type = ? AND meter_index = ?)
                     ORDER BY meter_type, meter_index
                     LIMIT 1",
                    READING_COLS
                ),
                params![
                    apartment_id,
                    ym.as_str(),
                    value,
                    tolerance,
                    exclude.0.as_str(),
                    exclude.1
                ],
                row_to_reading,
            )
            .optional()?;
        Ok(reading)
    }
}
