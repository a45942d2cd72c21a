//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Meterbill - Reconcile meter readings and bill apartments
#[derive(Parser)]
#[command(name = "meterbill")]
#[command(about = "Self-hosted utility meter billing for landlords", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "meterbill.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set METERBILL_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status (encryption, size, etc.)
    Status,

    /// Manage apartments (add, list, show, set-expected, bind-chat)
    Apartment {
        #[command(subcommand)]
        action: Option<ApartmentAction>,
    },

    /// Manage tariffs (set, list, import)
    Tariff {
        #[command(subcommand)]
        action: Option<TariffAction>,
    },

    /// Submit and inspect meter readings
    Reading {
        #[command(subcommand)]
        action: ReadingAction,
    },

    /// Calculate, approve, and send monthly bills
    Bill {
        #[command(subcommand)]
        action: BillAction,
    },

    /// Resolve extra electric readings (accept, reject)
    Extra {
        #[command(subcommand)]
        action: ExtraAction,
    },
}

#[derive(Subcommand)]
pub enum ApartmentAction {
    /// Register an apartment
    Add {
        /// Display title (e.g., "Unit 12")
        title: String,

        /// Tenant name
        #[arg(long)]
        tenant: Option<String>,

        /// Street address
        #[arg(long)]
        address: Option<String>,

        /// Free-form note
        #[arg(long)]
        note: Option<String>,

        /// Personal account number printed on bills
        #[arg(long)]
        ls_account: Option<String>,

        /// Chat to bind for reading submission and bill delivery
        #[arg(long)]
        chat: Option<i64>,

        /// Electricity registers billed for this unit (1-3, default 3)
        #[arg(long)]
        expected: Option<i64>,
    },

    /// List apartments
    List,

    /// Show one apartment
    Show {
        /// Apartment ID
        id: i64,
    },

    /// Set how many electricity registers the unit is billed on
    SetExpected {
        /// Apartment ID
        id: i64,

        /// Register count (clamped to 1-3)
        expected: i64,
    },

    /// Bind a chat to an apartment
    BindChat {
        /// Apartment ID
        id: i64,

        /// Chat ID
        chat_id: i64,
    },
}

#[derive(Subcommand)]
pub enum TariffAction {
    /// Set the rates effective from a month (replaces that month's row)
    Set {
        /// First month the rates apply to (YYYY-MM)
        month_from: String,

        /// Cold water rate, roubles per cubic meter
        #[arg(long)]
        cold: f64,

        /// Hot water rate, roubles per cubic meter
        #[arg(long)]
        hot: f64,

        /// Electricity base rate, roubles per kWh
        #[arg(long)]
        electric: f64,

        /// Sewer rate, roubles per cubic meter
        #[arg(long)]
        sewer: f64,

        /// Tier 1 rate override, roubles per kWh
        #[arg(long)]
        t1: Option<f64>,

        /// Tier 2 rate override, roubles per kWh
        #[arg(long)]
        t2: Option<f64>,

        /// Tier 3 rate override, roubles per kWh
        #[arg(long)]
        t3: Option<f64>,
    },

    /// List tariff history
    List,

    /// Import tariff rows from CSV
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ReadingAction {
    /// Submit one reading through the ingest pipeline
    Submit {
        /// Apartment ID
        #[arg(short, long)]
        apartment: i64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,

        /// Meter type: cold, hot, electric, sewer
        #[arg(long)]
        meter: String,

        /// Reading value (comma decimal separator accepted)
        #[arg(long)]
        value: String,

        /// Electric register (1-3); omit to auto-sort
        #[arg(long)]
        index: Option<i64>,

        /// Record as OCR-sourced (photo-confirmed) instead of manual
        #[arg(long)]
        ocr: bool,

        /// Photo file to hash into the audit trail
        #[arg(long)]
        photo: Option<PathBuf>,
    },

    /// List stored readings for a month
    List {
        /// Apartment ID
        #[arg(short, long)]
        apartment: i64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Show the ingest audit trail for a month
    Events {
        /// Apartment ID
        #[arg(short, long)]
        apartment: i64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum BillAction {
    /// Calculate the bill for an apartment-month
    Calc {
        /// Apartment ID
        #[arg(short, long)]
        apartment: i64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,

        /// Print the full bill as JSON
        #[arg(long)]
        json: bool,
    },

    /// Approve a bill held for admin review
    Approve {
        /// Apartment ID
        #[arg(short, long)]
        apartment: i64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,

        /// Deliver the bill to the bound chat after approving
        #[arg(long)]
        send: bool,
    },

    /// Send the bill if payable and not yet delivered at this total
    Send {
        /// Apartment ID
        #[arg(short, long)]
        apartment: i64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Deliver the bill even though the T3 photo is missing
    SendWithoutT3 {
        /// Apartment ID
        #[arg(short, long)]
        apartment: i64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ExtraAction {
    /// Accept the extra electric reading and raise the register count
    Accept {
        /// Apartment ID
        #[arg(short, long)]
        apartment: i64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Reject extra electric readings and restore the expected layout
    Reject {
        /// Apartment ID
        #[arg(short, long)]
        apartment: i64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,
    },
}
