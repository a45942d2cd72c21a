//! Apartment (billing unit) operations

use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{clamp_expected, Apartment};

/// Fields for creating or updating an apartment
#[derive(Debug, Clone, Default)]
pub struct NewApartment {
    pub title: String,
    pub tenant_name: Option<String>,
    pub address: Option<String>,
    pub note: Option<String>,
    pub ls_account: Option<String>,
    pub chat_id: Option<i64>,
    /// Defaults to 3 registers when unset
    pub electric_expected: Option<i64>,
}

fn row_to_apartment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Apartment> {
    let created_at_str: String = row.get(8)?;
    Ok(Apartment {
        id: row.get(0)?,
        title: row.get(1)?,
        tenant_name: row.get(2)?,
        address: row.get(3)?,
        note: row.get(4)?,
        ls_account: row.get(5)?,
        chat_id: row.get(6)?,
        electric_expected: clamp_expected(row.get(7)?),
        created_at: parse_datetime(&created_at_str),
    })
}

const APARTMENT_COLS: &str =
    "id, title, tenant_name, address, note, ls_account, chat_id, electric_expected, created_at";

/// Read the billed register count on an explicit connection.
///
/// Missing apartments resolve to the default of 3 registers, matching
/// the column default.
pub fn electric_expected_in(conn: &Connection, apartment_id: i64) -> Result<i64> {
    let expected: Option<i64> = conn
        .query_row(
            "SELECT electric_expected FROM apartments WHERE id = ?",
            params![apartment_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(clamp_expected(expected.unwrap_or(3)))
}

/// Set the billed register count on an explicit connection (clamped to 1..3).
pub fn set_electric_expected_in(conn: &Connection, apartment_id: i64, expected: i64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE apartments SET electric_expected = ? WHERE id = ?",
        params![clamp_expected(expected), apartment_id],
    )?;
    if updated == 0 {
        return Err(Error::NotFound(format!("apartment {}", apartment_id)));
    }
    Ok(())
}

impl Database {
    /// Create an apartment, returning its id
    pub fn create_apartment(&self, new: &NewApartment) -> Result<i64> {
        let conn = self.conn()?;
        let expected = clamp_expected(new.electric_expected.unwrap_or(3));
        conn.execute(
            "INSERT INTO apartments (title, tenant_name, address, note, ls_account, chat_id, electric_expected)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                new.title,
                new.tenant_name,
                new.address,
                new.note,
                new.ls_account,
                new.chat_id,
                expected
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get an apartment by ID
    pub fn get_apartment(&self, id: i64) -> Result<Option<Apartment>> {
        let conn = self.conn()?;
        let apartment = conn
            .query_row(
                &format!("SELECT {} FROM apartments WHERE id = ?", APARTMENT_COLS),
                params![id],
                row_to_apartment,
            )
            .ok();
        Ok(apartment)
    }

    /// Get an apartment by ID, erroring when it does not exist
    pub fn require_apartment(&self, id: i64) -> Result<Apartment> {
        self.get_apartment(id)?
            .ok_or_else(|| Error::NotFound(format!("apartment {}", id)))
    }

    /// Find the apartment bound to a chat
    pub fn find_apartment_by_chat(&self, chat_id: i64) -> Result<Option<Apartment>> {
        let conn = self.conn()?;
        let apartment = conn
            .query_row(
                &format!(
                    "SELECT {} FROM apartments WHERE chat_id = ? ORDER BY id LIMIT 1",
                    APARTMENT_COLS
                ),
                params![chat_id],
                row_to_apartment,
            )
            .ok();
        Ok(apartment)
    }

    /// List all apartments
    pub fn list_apartments(&self) -> Result<Vec<Apartment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM apartments ORDER BY id",
            APARTMENT_COLS
        ))?;

        let apartments = stmt
            .query_map([], row_to_apartment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(apartments)
    }

    /// Update an apartment's registry fields
    pub fn update_apartment(&self, id: i64, new: &NewApartment) -> Result<()> {
        let conn = self.conn()?;
        let expected = clamp_expected(new.electric_expected.unwrap_or(3));
        let updated = conn.execute(
            "UPDATE apartments
             SET title = ?, tenant_name = ?, address = ?, note = ?, ls_account = ?, chat_id = ?, electric_expected = ?
             WHERE id = ?",
            params![
                new.title,
                new.tenant_name,
                new.address,
                new.note,
                new.ls_account,
                new.chat_id,
                expected,
                id
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("apartment {}", id)));
        }
        Ok(())
    }

    /// Read the billed electricity register count for an apartment (1..3)
    pub fn electric_expected(&self, apartment_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        electric_expected_in(&conn, apartment_id)
    }

    /// Set the billed electricity register count (clamped to 1..3)
    pub fn set_electric_expected(&self, apartment_id: i64, expected: i64) -> Result<()> {
        let conn = self.conn()?;
        set_electric_expected_in(&conn, apartment_id, expected)
    }
}
