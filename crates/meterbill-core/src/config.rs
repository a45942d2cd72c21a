//! Billing and ingest configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/meterbill/config/billing.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! On top of either layer, `METERBILL_DIFF_THRESHOLD_RUB` overrides the
//! diff threshold so a deployment can retune it without shipping a file.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/billing.toml");

/// Env var overriding the per-article diff threshold
pub const DIFF_THRESHOLD_ENV: &str = "METERBILL_DIFF_THRESHOLD_RUB";

/// Billing and ingest tuning
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Month-over-month diff per article (rubles) above which a bill is
    /// held for admin approval
    pub diff_threshold_rub: f64,
    /// Two submissions for different meter types closer than this are
    /// flagged as a likely duplicate photo
    pub cross_type_warn_tolerance: f64,
    /// Incoming electric readings carry a register index from the
    /// submission flow instead of being auto-sorted into slots
    pub explicit_electric_slots: bool,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            diff_threshold_rub: 500.0,
            cross_type_warn_tolerance: 0.0005,
            explicit_electric_slots: false,
        }
    }
}

impl BillingConfig {
    /// Load using the default override location
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load with a custom config path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        load_config(Some(&path))
    }
}

/// Default override location (~/.local/share/meterbill/config/billing.toml)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("meterbill").join("config").join("billing.toml"))
}

fn load_config(override_path: Option<&PathBuf>) -> Result<BillingConfig> {
    // Try override path first
    let content = if let Some(path) = override_path {
        if path.exists() {
            fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        } else {
            DEFAULT_CONFIG.to_string()
        }
    } else {
        // Check default override location
        if let Some(default_path) = default_config_path() {
            if default_path.exists() {
                fs::read_to_string(&default_path)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
            } else {
                DEFAULT_CONFIG.to_string()
            }
        } else {
            DEFAULT_CONFIG.to_string()
        }
    };

    let mut config = parse_config(&content)?;
    apply_env(&mut config);
    Ok(config)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    billing: Option<RawBilling>,
    ingest: Option<RawIngest>,
}

#[derive(Debug, Deserialize)]
struct RawBilling {
    diff_threshold_rub: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawIngest {
    cross_type_warn_tolerance: Option<f64>,
    explicit_electric_slots: Option<bool>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<BillingConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = BillingConfig::default();

    if let Some(billing) = raw.billing {
        if let Some(threshold) = billing.diff_threshold_rub {
            config.diff_threshold_rub = threshold;
        }
    }

    if let Some(ingest) = raw.ingest {
        if let Some(tolerance) = ingest.cross_type_warn_tolerance {
            config.cross_type_warn_tolerance = tolerance;
        }
        if let Some(explicit) = ingest.explicit_electric_slots {
            config.explicit_electric_slots = explicit;
        }
    }

    Ok(config)
}

fn apply_env(config: &mut BillingConfig) {
    if let Ok(raw) = std::env::var(DIFF_THRESHOLD_ENV) {
        match raw.trim().parse::<f64>() {
            Ok(v) => config.diff_threshold_rub = v,
            Err(_) => warn!("Ignoring unparsable {}: {}", DIFF_THRESHOLD_ENV, raw),
        }
    }
}
