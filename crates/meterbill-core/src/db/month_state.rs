//! Per apartment-month reconciliation and billing state
//!
//! One row per (apartment, month), created lazily on first write. Holds
//! the extra-pending flag with its expected-count snapshot, the persisted
//! bill snapshot, and the approval/send stamps.

use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::MonthState;
use crate::ym::Ym;

const STATE_COLS: &str = "apartment_id, ym, electric_extra_pending, electric_expected_snapshot, \
     electric_extra_resolved_at, bill_pending, bill_last_json, bill_approved_at, bill_sent_at, \
     bill_sent_total";

fn row_to_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<MonthState> {
    let ym_str: String = row.get(1)?;
    let resolved_at: Option<String> = row.get(4)?;
    let approved_at: Option<String> = row.get(7)?;
    let sent_at: Option<String> = row.get(8)?;

    Ok(MonthState {
        apartment_id: row.get(0)?,
        ym: Ym::parse(&ym_str).unwrap_or_default(),
        electric_extra_pending: row.get(2)?,
        electric_expected_snapshot: row.get(3)?,
        electric_extra_resolved_at: resolved_at.map(|s| parse_datetime(&s)),
        bill_pending: row.get(5)?,
        bill_last_json: row.get(6)?,
        bill_approved_at: approved_at.map(|s| parse_datetime(&s)),
        bill_sent_at: sent_at.map(|s| parse_datetime(&s)),
        bill_sent_total: row.get(9)?,
    })
}

/// Raise the extra-pending flag on an explicit connection, snapshotting
/// the expected count the first time it is raised for the month.
pub fn set_extra_pending_in(
    conn: &Connection,
    apartment_id: i64,
    ym: &Ym,
    expected_snapshot: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO month_states (apartment_id, ym, electric_extra_pending, electric_expected_snapshot)
         VALUES (?, ?, 1, ?)
         ON CONFLICT(apartment_id, ym) DO UPDATE SET
             electric_extra_pending = 1,
             electric_expected_snapshot =
                 COALESCE(month_states.electric_expected_snapshot, excluded.electric_expected_snapshot),
             updated_at = CURRENT_TIMESTAMP",
        params![apartment_id, ym.as_str(), expected_snapshot],
    )?;
    Ok(())
}

/// Clear the extra-pending flag on an explicit connection.
pub fn clear_extra_pending_in(conn: &Connection, apartment_id: i64, ym: &Ym) -> Result<()> {
    conn.execute(
        "INSERT INTO month_states (apartment_id, ym, electric_extra_pending)
         VALUES (?, ?, 0)
         ON CONFLICT(apartment_id, ym) DO UPDATE SET
             electric_extra_pending = 0,
             electric_expected_snapshot = NULL,
             electric_extra_resolved_at = CURRENT_TIMESTAMP,
             updated_at = CURRENT_TIMESTAMP",
        params![apartment_id, ym.as_str()],
    )?;
    Ok(())
}

/// Read the extra-pending flag and its snapshot on an explicit connection.
pub fn extra_pending_in(
    conn: &Connection,
    apartment_id: i64,
    ym: &Ym,
) -> Result<(bool, Option<i64>)> {
    let row: Option<(bool, Option<i64>)> = conn
        .query_row(
            "SELECT electric_extra_pending, electric_expected_snapshot
             FROM month_states WHERE apartment_id = ? AND ym = ?",
            params![apartment_id, ym.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row.unwrap_or((false, None)))
}

impl Database {
    /// Get the state row for an apartment-month, if one exists
    pub fn get_month_state(&self, apartment_id: i64, ym: &Ym) -> Result<Option<MonthState>> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                &format!(
                    "SELECT {} FROM month_states WHERE apartment_id = ? AND ym = ?",
                    STATE_COLS
                ),
                params![apartment_id, ym.as_str()],
                row_to_state,
            )
            .optional()?;
        Ok(state)
    }

    /// Read the extra-pending flag and its expected-count snapshot
    pub fn extra_pending(&self, apartment_id: i64, ym: &Ym) -> Result<(bool, Option<i64>)> {
        let conn = self.conn()?;
        extra_pending_in(&conn, apartment_id, ym)
    }

    /// Raise the extra-pending flag (see [`set_extra_pending_in`])
    pub fn set_extra_pending(
        &self,
        apartment_id: i64,
        ym: &Ym,
        expected_snapshot: i64,
    ) -> Result<()> {
        let conn = self.conn()?;
        set_extra_pending_in(&conn, apartment_id, ym, expected_snapshot)
    }

    /// Clear the extra-pending flag (see [`clear_extra_pending_in`])
    pub fn clear_extra_pending(&self, apartment_id: i64, ym: &Ym) -> Result<()> {
        let conn = self.conn()?;
        clear_extra_pending_in(&conn, apartment_id, ym)
    }

    /// Persist the computed bill snapshot and the blocking diff items
    pub fn save_bill_snapshot(
        &self,
        apartment_id: i64,
        ym: &Ym,
        bill_last_json: &str,
        bill_pending: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO month_states (apartment_id, ym, bill_last_json, bill_pending)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(apartment_id, ym) DO UPDATE SET
                 bill_last_json = excluded.bill_last_json,
                 bill_pending = excluded.bill_pending,
                 updated_at = CURRENT_TIMESTAMP",
            params![apartment_id, ym.as_str(), bill_last_json, bill_pending],
        )?;
        Ok(())
    }

    /// Stamp explicit admin approval and clear the blocking items
    pub fn approve_bill(&self, apartment_id: i64, ym: &Ym) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO month_states (apartment_id, ym, bill_pending, bill_approved_at)
             VALUES (?, ?, '{}', CURRENT_TIMESTAMP)
             ON CONFLICT(apartment_id, ym) DO UPDATE SET
                 bill_pending = '{}',
                 bill_approved_at = CURRENT_TIMESTAMP,
                 updated_at = CURRENT_TIMESTAMP",
            params![apartment_id, ym.as_str()],
        )?;
        Ok(())
    }

    /// Drop a previously granted approval (components changed since)
    pub fn reset_bill_approval(&self, apartment_id: i64, ym: &Ym) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE month_states SET bill_approved_at = NULL, updated_at = CURRENT_TIMESTAMP
             WHERE apartment_id = ? AND ym = ?",
            params![apartment_id, ym.as_str()],
        )?;
        Ok(())
    }

    /// Stamp a successful send with the total that was delivered
    pub fn mark_bill_sent(&self, apartment_id: i64, ym: &Ym, total: f64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO month_states (apartment_id, ym, bill_sent_at, bill_sent_total)
             VALUES (?, ?, CURRENT_TIMESTAMP, ?)
             ON CONFLICT(apartment_id, ym) DO UPDATE SET
                 bill_sent_at = CURRENT_TIMESTAMP,
                 bill_sent_total = excluded.bill_sent_total,
                 updated_at = CURRENT_TIMESTAMP",
            params![apartment_id, ym.as_str(), total],
        )?;
        Ok(())
    }
}
