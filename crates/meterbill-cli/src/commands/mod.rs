//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `apartments` - Apartment registry commands (add, list, show, set-expected, bind-chat)
//! - `bills` - Bill commands (calc, approve, send) and extra-reading resolution
//! - `core` - Core commands (init, status) and shared utilities (open_db)
//! - `readings` - Reading submission and inspection commands
//! - `tariffs` - Tariff management commands (set, list, import)

pub mod apartments;
pub mod bills;
pub mod core;
pub mod readings;
pub mod tariffs;

// Re-export command functions for main.rs
pub use apartments::*;
pub use bills::*;
pub use core::*;
pub use readings::*;
pub use tariffs::*;

use anyhow::Result;
use chrono::{DateTime, Utc};
use meterbill_core::notify::{NoopSender, NotificationSender, TelegramSender};
use meterbill_core::ym::Ym;
use tracing::debug;

/// Truncate a string to a maximum number of characters, adding "..." if truncated.
///
/// Counts chars, not bytes: titles and tenant names are routinely Cyrillic.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format a stored timestamp for table output
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

/// Resolve an optional YYYY-MM argument, defaulting to the current month
pub fn resolve_month(month: Option<&str>) -> Result<Ym> {
    match month {
        Some(m) => Ok(Ym::parse(m)?),
        None => Ok(Ym::now()),
    }
}

/// Pick the configured bill transport: Telegram when the token is set,
/// otherwise a no-op sender that leaves bills unsent
pub fn sender_from_env() -> Box<dyn NotificationSender> {
    match TelegramSender::from_env() {
        Some(sender) => Box::new(sender),
        None => {
            debug!("No notification transport configured; bills stay unsent");
            Box::new(NoopSender)
        }
    }
}
