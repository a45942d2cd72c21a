//! Meterbill Core Library
//!
//! Shared functionality for the meterbill utility billing tool:
//! - Database access and migrations
//! - Month (YYYY-MM) parsing and arithmetic
//! - Electric slot reconciliation (duplicates, auto-sort, extra detection)
//! - Bill calculation with tariff resolution and diff-threshold gating
//! - Approval/send state machine with notification dedup
//! - Reading ingest pipeline with audit trail
//! - Tariff CSV import

pub mod approval;
pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod ingest;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod ym;

pub use approval::ApprovalManager;
pub use billing::{BillCalculator, BillComponents, BillReason, BillResult, ResolvedTariff};
pub use config::BillingConfig;
pub use db::Database;
pub use error::{Error, Result};
pub use import::{import_tariffs_csv, TariffImportStats};
pub use ingest::{CleanedReading, IngestOutcome, IngestPipeline};
pub use models::{Apartment, MeterReading, MeterType, MonthState, ReadingSource, Tariff};
pub use notify::{NoopSender, NotificationSender, TelegramSender};
pub use reconcile::{ElectricReconciler, ReconcileOutcome};
pub use ym::Ym;
