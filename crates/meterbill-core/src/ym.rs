//! Month (`YYYY-MM`) identifiers and arithmetic.
//!
//! Billing periods are keyed by calendar month. `Ym` wraps a validated
//! `YYYY-MM` string and provides the previous/offset-month arithmetic the
//! billing calculator needs for delta and threshold comparisons.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A validated `YYYY-MM` month identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ym(String);

impl Ym {
    /// Parse and validate a `YYYY-MM` string.
    pub fn parse(s: &str) -> Result<Self> {
        if is_valid_ym(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidMonth(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn year(&self) -> i32 {
        // Format is validated at construction
        self.0[0..4].parse().unwrap_or(0)
    }

    pub fn month(&self) -> u32 {
        self.0[5..7].parse().unwrap_or(1)
    }

    /// The current month in local time.
    pub fn now() -> Ym {
        Ym(chrono::Local::now().format("%Y-%m").to_string())
    }

    /// The month immediately before this one.
    pub fn prev(&self) -> Ym {
        self.add_months(-1)
    }

    /// Offset by a signed number of months.
    pub fn add_months(&self, delta: i32) -> Ym {
        let total = self.year() * 12 + (self.month() as i32 - 1) + delta;
        let year = total.div_euclid(12);
        let month = total.rem_euclid(12) + 1;
        Ym(format!("{:04}-{:02}", year, month))
    }
}

impl FromStr for Ym {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The epoch month, used as the fallback when a stored month fails to
/// parse (months are validated on every write, so this never surfaces
/// outside a corrupted row).
impl Default for Ym {
    fn default() -> Self {
        Ym("1970-01".to_string())
    }
}

impl fmt::Display for Ym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a string is a well-formed `YYYY-MM` month.
pub fn is_valid_ym(s: &str) -> bool {
    let re = Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("valid regex");
    re.is_match(s)
}
