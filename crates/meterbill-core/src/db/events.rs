//! Ingest audit trail
//!
//! Append-only record of every inbound submission. Rows are inserted at
//! stage `received` before any reading write and finalized afterwards
//! with the outcome and accumulated diagnostics. The billing core never
//! reads this table.

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{IngestEvent, IngestStage};
use crate::ym::Ym;

/// A new audit row, recorded before any write happens
#[derive(Debug, Clone)]
pub struct NewIngestEvent {
    pub apartment_id: i64,
    pub ym: Ym,
    pub chat_id: Option<i64>,
    /// SHA-256 of the submitted photo bytes, when the submission had one
    pub file_sha256: Option<String>,
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestEvent> {
    let ym_str: String = row.get(2)?;
    let stage_str: String = row.get(5)?;
    let created_at_str: String = row.get(8)?;

    Ok(IngestEvent {
        id: row.get(0)?,
        apartment_id: row.get(1)?,
        ym: Ym::parse(&ym_str).unwrap_or_default(),
        chat_id: row.get(3)?,
        file_sha256: row.get(4)?,
        stage: stage_str.parse().unwrap_or_default(),
        reading_written: row.get(6)?,
        diag_json: row.get(7)?,
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Record a submission at stage `received`, returning the event id
    pub fn insert_ingest_event(&self, event: &NewIngestEvent) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ingest_events (apartment_id, ym, chat_id, file_sha256, stage)
             VALUES (?, ?, ?, ?, 'received')",
            params![
                event.apartment_id,
                event.ym.as_str(),
                event.chat_id,
                event.file_sha256
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Finalize an audit row with the processing outcome
    pub fn finish_ingest_event(
        &self,
        id: i64,
        stage: IngestStage,
        reading_written: bool,
        diag_json: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE ingest_events
             SET stage = ?, reading_written = ?, diag_json = ?
             WHERE id = ?",
            params![stage.as_str(), reading_written, diag_json, id],
        )?;
        Ok(())
    }

    /// List audit rows for one apartment-month, newest first
    pub fn list_ingest_events(&self, apartment_id: i64, ym: &Ym) -> Result<Vec<IngestEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, apartment_id, ym, chat_id, file_sha256, stage, reading_written, diag_json, created_at
             FROM ingest_events
             WHERE apartment_id = ? AND ym = ?
             ORDER BY id DESC",
        )?;

        let events = stmt
            .query_map(params![apartment_id, ym.as_str()], row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Whether a photo with this content hash was already ingested for
    /// the apartment (duplicate photo submissions)
    pub fn ingest_hash_seen(&self, apartment_id: i64, file_sha256: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ingest_events WHERE apartment_id = ? AND file_sha256 = ?",
            params![apartment_id, file_sha256],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
