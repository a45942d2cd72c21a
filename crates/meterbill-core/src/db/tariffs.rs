//! Tariff table operations
//!
//! Tariff rows are keyed by `month_from` and stay effective until a later
//! row supersedes them. Resolution picks the latest `month_from` not
//! exceeding the target month; months before the first row resolve to
//! nothing (the caller degrades to a zero-rate tariff).

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::Tariff;
use crate::ym::Ym;

fn row_to_tariff(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tariff> {
    let month_from: String = row.get(0)?;
    Ok(Tariff {
        // month_from is validated on write
        month_from: Ym::parse(&month_from).unwrap_or_default(),
        cold: row.get(1)?,
        hot: row.get(2)?,
        electric: row.get(3)?,
        sewer: row.get(4)?,
        electric_t1: row.get(5)?,
        electric_t2: row.get(6)?,
        electric_t3: row.get(7)?,
    })
}

const TARIFF_COLS: &str = "month_from, cold, hot, electric, sewer, electric_t1, electric_t2, electric_t3";

impl Database {
    /// Insert or replace the tariff row for a month
    pub fn upsert_tariff(&self, tariff: &Tariff) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tariffs (month_from, cold, hot, electric, sewer, electric_t1, electric_t2, electric_t3)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(month_from) DO UPDATE SET
                 cold = excluded.cold,
                 hot = excluded.hot,
                 electric = excluded.electric,
                 sewer = excluded.sewer,
                 electric_t1 = excluded.electric_t1,
                 electric_t2 = excluded.electric_t2,
                 electric_t3 = excluded.electric_t3",
            params![
                tariff.month_from.as_str(),
                tariff.cold,
                tariff.hot,
                tariff.electric,
                tariff.sewer,
                tariff.electric_t1,
                tariff.electric_t2,
                tariff.electric_t3
            ],
        )?;
        Ok(())
    }

    /// Get the tariff row keyed exactly by `month_from`
    pub fn get_tariff(&self, month_from: &Ym) -> Result<Option<Tariff>> {
        let conn = self.conn()?;
        let tariff = conn
            .query_row(
                &format!("SELECT {} FROM tariffs WHERE month_from = ?", TARIFF_COLS),
                params![month_from.as_str()],
                row_to_tariff,
            )
            .ok();
        Ok(tariff)
    }

    /// Resolve the tariff row effective for a month: the latest
    /// `month_from` not exceeding it
    pub fn tariff_for_month(&self, ym: &Ym) -> Result<Option<Tariff>> {
        let conn = self.conn()?;
        let tariff = conn
            .query_row(
                &format!(
                    "SELECT {} FROM tariffs WHERE month_from <= ? ORDER BY month_from DESC LIMIT 1",
                    TARIFF_COLS
                ),
                params![ym.as_str()],
                row_to_tariff,
            )
            .ok();
        Ok(tariff)
    }

    /// List tariff history, oldest first
    pub fn list_tariffs(&self) -> Result<Vec<Tariff>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tariffs ORDER BY month_from",
            TARIFF_COLS
        ))?;

        let tariffs = stmt
            .query_map([], row_to_tariff)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tariffs)
    }
}
