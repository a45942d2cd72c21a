//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `apartments` - Apartment (billing unit) registry
//! - `tariffs` - Tariff table and ordered month_from resolution
//! - `readings` - Canonical meter reading storage and upserts
//! - `month_state` - Per apartment-month reconciliation/billing state
//! - `events` - Append-only ingest audit trail

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod apartments;
mod events;
mod month_state;
mod readings;
mod tariffs;

pub use apartments::NewApartment;
pub use events::NewIngestEvent;
pub use readings::{ReadingUpsertResult, ReadingWrite};

// Connection-scoped variants for callers that compose several writes
// into one transaction (the reconciler).
pub(crate) use apartments::{electric_expected_in, set_electric_expected_in};
pub(crate) use month_state::{clear_extra_pending_in, extra_pending_in, set_extra_pending_in};
pub(crate) use readings::{
    delete_electric_above_in, delete_electric_range_in, electric_readings_in,
    promote_reading_to_ocr_in, upsert_reading_in,
};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "METERBILL_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path. This allows moving/renaming/restoring the database freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"meterbill-salt-1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    // Derive key using Argon2id
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    // Extract the hash portion for use as SQLCipher key (hex encoded)
    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `METERBILL_DB_KEY` environment variable to be set.
    /// The database will be encrypted using SQLCipher with a key derived
    /// from the passphrase via Argon2.
    ///
    /// Returns an error if `METERBILL_DB_KEY` is not set. Use
    /// `new_unencrypted()` for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: This creates an unencrypted database. Only use for development
    /// or testing. For production, use `new()` with `METERBILL_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Use with_init to set the key on every new connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!("/tmp/meterbill_test_{}.db", id);

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    ///
    /// Runs once at construction, before the database serves any traffic.
    /// All DDL is idempotent (`IF NOT EXISTS`), so repeated startups and
    /// concurrent first-runs are safe without any advisory locking.
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Performance pragmas for local storage (SSD/M.2 recommended)
            -- WAL mode: better concurrency, readers don't block writers
            -- Note: creates -wal and -shm sidecar files alongside the database
            PRAGMA journal_mode = WAL;

            -- Cache size: ~8MB (2000 pages * 4KB default page size)
            PRAGMA cache_size = 2000;

            -- Synchronous NORMAL: good balance of safety and performance
            -- FULL is safer but slower; NORMAL is safe for most power-loss scenarios
            PRAGMA synchronous = NORMAL;

            -- Store temp tables in memory (faster for complex queries)
            PRAGMA temp_store = MEMORY;

            -- Apartments (billing units)
            CREATE TABLE IF NOT EXISTS apartments (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                tenant_name TEXT,
                address TEXT,
                note TEXT,
                ls_account TEXT,                           -- personal account number on bills
                chat_id INTEGER,                           -- chat bound for submissions/delivery
                electric_expected INTEGER NOT NULL DEFAULT 3,  -- billed electricity registers (1..3)
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_apartments_chat ON apartments(chat_id);

            -- Tariffs (each row effective from month_from until superseded)
            CREATE TABLE IF NOT EXISTS tariffs (
                month_from TEXT PRIMARY KEY,               -- YYYY-MM
                cold REAL NOT NULL DEFAULT 0,
                hot REAL NOT NULL DEFAULT 0,
                electric REAL NOT NULL DEFAULT 0,
                sewer REAL NOT NULL DEFAULT 0,
                electric_t1 REAL,                          -- tier overrides; NULL falls back to electric
                electric_t2 REAL,
                electric_t3 REAL
            );

            -- Meter readings (one canonical value per apartment/month/type/slot)
            CREATE TABLE IF NOT EXISTS meter_readings (
                id INTEGER PRIMARY KEY,
                apartment_id INTEGER NOT NULL REFERENCES apartments(id) ON DELETE CASCADE,
                ym TEXT NOT NULL,                          -- YYYY-MM
                meter_type TEXT NOT NULL,                  -- cold, hot, electric, sewer
                meter_index INTEGER NOT NULL DEFAULT 1,    -- electric slot 1..3; water always 1
                value REAL NOT NULL,
                source TEXT NOT NULL DEFAULT 'ocr',        -- ocr, manual
                ocr_value REAL,                            -- original OCR value for audit
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(apartment_id, ym, meter_type, meter_index)
            );

            CREATE INDEX IF NOT EXISTS idx_readings_apartment_ym ON meter_readings(apartment_id, ym);
            CREATE INDEX IF NOT EXISTS idx_readings_type ON meter_readings(meter_type);

            -- Per apartment-month reconciliation and billing state
            CREATE TABLE IF NOT EXISTS month_states (
                apartment_id INTEGER NOT NULL REFERENCES apartments(id) ON DELETE CASCADE,
                ym TEXT NOT NULL,
                electric_extra_pending BOOLEAN NOT NULL DEFAULT 0,
                electric_expected_snapshot INTEGER,        -- expected count when pending was raised
                electric_extra_resolved_at DATETIME,
                bill_pending TEXT,                         -- JSON: blocking per-article diff items
                bill_last_json TEXT,                       -- JSON: last computed bill snapshot
                bill_approved_at DATETIME,
                bill_sent_at DATETIME,
                bill_sent_total REAL,                      -- total at last successful send (2dp)
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (apartment_id, ym)
            );

            -- Ingest audit events (append-only; never read by the billing core)
            CREATE TABLE IF NOT EXISTS ingest_events (
                id INTEGER PRIMARY KEY,
                apartment_id INTEGER NOT NULL REFERENCES apartments(id) ON DELETE CASCADE,
                ym TEXT NOT NULL,
                chat_id INTEGER,
                file_sha256 TEXT,                          -- SHA-256 of the submitted photo bytes
                stage TEXT NOT NULL DEFAULT 'received',    -- received, reading_written
                reading_written BOOLEAN NOT NULL DEFAULT 0,
                diag_json TEXT,                            -- JSON: warnings and parse diagnostics
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_ingest_events_apartment ON ingest_events(apartment_id, ym);
            CREATE INDEX IF NOT EXISTS idx_ingest_events_sha ON ingest_events(file_sha256);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
