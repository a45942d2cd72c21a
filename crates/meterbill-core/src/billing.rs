//! Monthly bill calculation
//!
//! Turns stored readings and tariffs into a `BillResult` for one
//! apartment-month:
//! - completeness first: cold/hot at slot 1 plus electric slots 1..N,
//!   where a required T3 counts only once photo-confirmed
//! - consumption deltas against the previous month, priced by the tariff
//!   effective for the billed month (T3 is never priced, it is a
//!   cross-check register)
//! - a month-over-month diff gate: any article that moved more than the
//!   configured threshold holds the bill for admin approval
//! - an idempotent snapshot persisted per month so approvals can be
//!   invalidated when the underlying numbers change
//!
//! Only `reason = ok` authorizes showing or sending a total.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BillingConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{MeterType, ReadingSource};
use crate::ym::Ym;

/// Maximum T1+T2 vs T3 divergence treated as agreement (meter units)
const T3_MISMATCH_EPS: f64 = 0.01;

/// Why a bill is or is not payable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillReason {
    /// Payable; the total may be shown and sent
    Ok,
    /// Readings are still outstanding; clients show what is missing
    MissingPhotos,
    /// Held for admin review; clients must not show a number
    PendingAdmin,
    /// First recorded month, nothing to diff against
    NoPrevMonth,
}

impl BillReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::MissingPhotos => "missing_photos",
            Self::PendingAdmin => "pending_admin",
            Self::NoPrevMonth => "no_prev_month",
        }
    }
}

impl std::fmt::Display for BillReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rates for one month with tier fallbacks already applied
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedTariff {
    /// Tariff row the rates came from; `None` means no tariff covers the
    /// month and everything bills at zero
    pub month_from: Option<Ym>,
    pub cold: f64,
    pub hot: f64,
    pub electric: f64,
    pub sewer: f64,
    pub electric_t1: f64,
    pub electric_t2: f64,
    pub electric_t3: f64,
}

impl ResolvedTariff {
    /// Resolve the tariff effective for `ym` (the most recent row with
    /// `month_from <= ym`). Tier rates fall back to the base electric
    /// rate when unset.
    pub fn resolve(db: &Database, ym: &Ym) -> Result<Self> {
        match db.tariff_for_month(ym)? {
            Some(t) => Ok(Self {
                month_from: Some(t.month_from.clone()),
                cold: t.cold,
                hot: t.hot,
                electric: t.electric,
                sewer: t.sewer,
                electric_t1: t.electric_t1.unwrap_or(t.electric),
                electric_t2: t.electric_t2.unwrap_or(t.electric),
                electric_t3: t.electric_t3.unwrap_or(t.electric),
            }),
            None => {
                warn!("No tariff covers {}; billing at zero rates", ym);
                Ok(Self {
                    month_from: None,
                    cold: 0.0,
                    hot: 0.0,
                    electric: 0.0,
                    sewer: 0.0,
                    electric_t1: 0.0,
                    electric_t2: 0.0,
                    electric_t3: 0.0,
                })
            }
        }
    }

    /// Rate for an electric tier register
    pub fn electric_rate(&self, tier: i64) -> f64 {
        match tier {
            1 => self.electric_t1,
            2 => self.electric_t2,
            3 => self.electric_t3,
            _ => self.electric,
        }
    }
}

/// Per-article ruble amounts for the billed month
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillComponents {
    pub cold_rub: f64,
    pub hot_rub: f64,
    pub sewer_rub: f64,
    pub electric_rub: f64,
    pub total_rub: f64,
}

/// The previous month's bill recomputed at current rates, for diffing.
/// Articles are `None` when that month lacks the readings to price them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrevComponents {
    pub prev_ym: Ym,
    pub cold_rub: Option<f64>,
    pub hot_rub: Option<f64>,
    pub sewer_rub: Option<f64>,
    pub electric_rub: Option<f64>,
    pub total_rub: Option<f64>,
}

/// One article whose month-over-month move exceeded the threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    pub cur_rub: f64,
    pub prev_rub: f64,
    pub diff_rub: f64,
}

/// A non-monetary warning attached to the bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFlag {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<f64>,
}

impl PendingFlag {
    fn duplicate_photos() -> Self {
        Self {
            code: "duplicate_photos".to_string(),
            message: "Обнаружены одинаковые показания (возможно отправили одно и то же фото). Нужна проверка.".to_string(),
            expected: None,
            raw: None,
        }
    }

    fn t3_mismatch(expected: Option<f64>, raw: Option<f64>) -> Self {
        Self {
            code: "t3_mismatch".to_string(),
            message: "Т3 не совпадает с суммой Т1+Т2. Т3 не участвует в расчёте, но нужна проверка.".to_string(),
            expected,
            raw,
        }
    }
}

/// T1+T2 vs T3 cross-check (informational; T3 is never billed)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct T3Info {
    /// T1 + T2, when both are present
    pub expected: Option<f64>,
    /// Stored T3 value
    pub raw: Option<f64>,
    pub mismatch: bool,
}

/// Persisted per-month snapshot (`bill_last_json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillSnapshot {
    pub ym: Ym,
    pub components: BillComponents,
    pub prev_components: Option<PrevComponents>,
    pub pending_items: BTreeMap<String, PendingItem>,
    pub pending_flags: Vec<PendingFlag>,
    pub t3: T3Info,
    pub threshold_rub: f64,
}

/// The outcome of one bill calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillResult {
    /// All readings needed for this month are present
    pub is_complete_photos: bool,
    /// Payable total, rounded to kopeks; `None` whenever `reason != ok`
    /// except for diff-gated bills, which keep their total visible to
    /// admins
    pub total_rub: Option<f64>,
    /// Outstanding reading keys (`cold`, `hot`, `electric_1`..)
    pub missing: Vec<String>,
    pub reason: BillReason,
    pub electric_expected: i64,
    pub extra_pending: bool,
    pub threshold_rub: f64,
    pub pending_items: BTreeMap<String, PendingItem>,
    pub pending_flags: Vec<PendingFlag>,
    pub t3: T3Info,
    pub prev_components: Option<PrevComponents>,
    pub approved_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl BillResult {
    fn unpayable(
        reason: BillReason,
        missing: Vec<String>,
        electric_expected: i64,
        extra_pending: bool,
        threshold_rub: f64,
    ) -> Self {
        Self {
            is_complete_photos: missing.is_empty(),
            total_rub: None,
            missing,
            reason,
            electric_expected,
            extra_pending,
            threshold_rub,
            pending_items: BTreeMap::new(),
            pending_flags: Vec::new(),
            t3: T3Info::default(),
            prev_components: None,
            approved_at: None,
            sent_at: None,
        }
    }
}

/// All readings of one apartment-month keyed by type and slot
struct MonthReadings {
    rows: HashMap<(MeterType, i64), (f64, ReadingSource)>,
}

impl MonthReadings {
    fn load(db: &Database, apartment_id: i64, ym: &Ym) -> Result<Self> {
        let mut rows = HashMap::new();
        for r in db.list_readings_for_month(apartment_id, ym)? {
            rows.insert((r.meter_type, r.meter_index), (r.value, r.source));
        }
        Ok(Self { rows })
    }

    fn value(&self, meter_type: MeterType, index: i64) -> Option<f64> {
        self.rows.get(&(meter_type, index)).map(|(v, _)| *v)
    }

    fn source(&self, meter_type: MeterType, index: i64) -> Option<ReadingSource> {
        self.rows.get(&(meter_type, index)).map(|(_, s)| *s)
    }
}

/// Computes monthly bills
pub struct BillCalculator<'a> {
    db: &'a Database,
    config: BillingConfig,
}

impl<'a> BillCalculator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            config: BillingConfig::default(),
        }
    }

    pub fn with_config(db: &'a Database, config: BillingConfig) -> Self {
        Self { db, config }
    }

    /// Calculate the bill for one apartment-month.
    ///
    /// Recomputing is idempotent: the same stored readings produce the
    /// same result and the same persisted snapshot.
    pub fn calculate(&self, apartment_id: i64, ym: &str) -> Result<BillResult> {
        self.calculate_with(apartment_id, ym, false)
    }

    /// Like [`calculate`](Self::calculate), but lets an admin override
    /// the requirement that T3 must be photo-confirmed.
    pub fn calculate_with(
        &self,
        apartment_id: i64,
        ym: &str,
        allow_missing_t3_photo: bool,
    ) -> Result<BillResult> {
        let threshold = self.config.diff_threshold_rub;

        let ym = match Ym::parse(ym.trim()) {
            Ok(ym) => ym,
            Err(_) => {
                return Ok(BillResult::unpayable(
                    BillReason::MissingPhotos,
                    vec!["invalid_ym".to_string()],
                    3,
                    false,
                    threshold,
                ));
            }
        };

        let electric_expected = self.db.electric_expected(apartment_id)?;
        let (extra_pending, _) = self.db.extra_pending(apartment_id, &ym)?;

        let cur = MonthReadings::load(self.db, apartment_id, &ym)?;

        // Completeness: cold/hot at slot 1 plus electric slots 1..N. A
        // required T3 counts only if it came from a photo, unless the
        // admin override says otherwise.
        let mut missing: Vec<String> = Vec::new();
        if cur.value(MeterType::Cold, 1).is_none() {
            missing.push("cold".to_string());
        }
        if cur.value(MeterType::Hot, 1).is_none() {
            missing.push("hot".to_string());
        }

        let required_electric: &[i64] = match electric_expected {
            1 => &[1],
            2 => &[1, 2],
            _ => &[1, 2, 3],
        };
        for &i in required_electric {
            match cur.value(MeterType::Electric, i) {
                None => missing.push(format!("electric_{}", i)),
                Some(_) => {
                    if i == 3
                        && !allow_missing_t3_photo
                        && cur.source(MeterType::Electric, 3) != Some(ReadingSource::Ocr)
                    {
                        missing.push("electric_3".to_string());
                    }
                }
            }
        }

        if !missing.is_empty() {
            return Ok(BillResult::unpayable(
                BillReason::MissingPhotos,
                missing,
                electric_expected,
                extra_pending,
                threshold,
            ));
        }

        // T3 cross-check. Informational only: T3 is an "everything"
        // register and never enters the total.
        let e1 = cur.value(MeterType::Electric, 1);
        let e2 = cur.value(MeterType::Electric, 2);
        let e3 = cur.value(MeterType::Electric, 3);
        let mut t3 = T3Info {
            expected: None,
            raw: e3,
            mismatch: false,
        };
        if let (Some(e1), Some(e2)) = (e1, e2) {
            let expected_sum = e1 + e2;
            t3.expected = Some(expected_sum);
            if let Some(raw) = e3 {
                t3.mismatch = (raw - expected_sum).abs() > T3_MISMATCH_EPS;
            }
        }

        if extra_pending {
            let mut result = BillResult::unpayable(
                BillReason::PendingAdmin,
                Vec::new(),
                electric_expected,
                true,
                threshold,
            );
            result.t3 = t3;
            result.pending_flags.push(PendingFlag::duplicate_photos());
            return Ok(result);
        }

        let prev_ym = ym.prev();
        let prev = MonthReadings::load(self.db, apartment_id, &prev_ym)?;

        let tariff = ResolvedTariff::resolve(self.db, &ym)?;

        let dc = safe_delta(cur.value(MeterType::Cold, 1), prev.value(MeterType::Cold, 1));
        let dh = safe_delta(cur.value(MeterType::Hot, 1), prev.value(MeterType::Hot, 1));

        // Sewer: without its own meter it tracks cold + hot consumption
        let ds = safe_delta(
            cur.value(MeterType::Sewer, 1),
            prev.value(MeterType::Sewer, 1),
        )
        .unwrap_or(dc.unwrap_or(0.0) + dh.unwrap_or(0.0));

        // Only T1 and T2 are priced
        let tariffed_electric = if electric_expected >= 3 {
            2
        } else {
            electric_expected
        };
        let mut re_sum = 0.0;
        for idx in 1..=tariffed_electric {
            if let Some(de) = safe_delta(
                cur.value(MeterType::Electric, idx),
                prev.value(MeterType::Electric, idx),
            ) {
                re_sum += de * tariff.electric_rate(idx);
            }
        }

        let rc = dc.unwrap_or(0.0) * tariff.cold;
        let rh = dh.unwrap_or(0.0) * tariff.hot;
        let rs = ds * tariff.sewer;

        let any_prev = prev.value(MeterType::Cold, 1).is_some()
            || prev.value(MeterType::Hot, 1).is_some()
            || (1..=electric_expected).any(|i| prev.value(MeterType::Electric, i).is_some());
        if !any_prev {
            let mut result = BillResult::unpayable(
                BillReason::NoPrevMonth,
                Vec::new(),
                electric_expected,
                false,
                threshold,
            );
            result.t3 = t3;
            return Ok(result);
        }

        let total = rc + rh + rs + re_sum;
        let components = BillComponents {
            cold_rub: round2(rc),
            hot_rub: round2(rh),
            sewer_rub: round2(rs),
            electric_rub: round2(re_sum),
            total_rub: round2(total),
        };

        // Recompute the previous month's bill at current rates so the
        // diff gate compares like with like
        let prevprev = MonthReadings::load(self.db, apartment_id, &prev_ym.prev())?;
        let prev_components =
            recompute_prev(&prev, &prevprev, &tariff, prev_ym.clone());

        let mut pending_items: BTreeMap<String, PendingItem> = BTreeMap::new();
        flag_item(&mut pending_items, threshold, "cold", components.cold_rub, prev_components.cold_rub);
        flag_item(&mut pending_items, threshold, "hot", components.hot_rub, prev_components.hot_rub);
        flag_item(&mut pending_items, threshold, "sewer", components.sewer_rub, prev_components.sewer_rub);
        flag_item(&mut pending_items, threshold, "electric", components.electric_rub, prev_components.electric_rub);
        flag_item(&mut pending_items, threshold, "total", components.total_rub, prev_components.total_rub);

        let mut pending_flags: Vec<PendingFlag> = Vec::new();
        if t3.mismatch {
            pending_flags.push(PendingFlag::t3_mismatch(t3.expected, t3.raw));
        }

        let state = self.db.get_month_state(apartment_id, &ym)?;
        let mut approved_at = state.as_ref().and_then(|s| s.bill_approved_at);
        let sent_at = state.as_ref().and_then(|s| s.bill_sent_at);
        let last_json = state.and_then(|s| s.bill_last_json);

        // An approval covers one exact component set: if the numbers
        // moved since, it no longer stands
        let mut reset_approval = false;
        if !pending_items.is_empty() && approved_at.is_some() {
            let last_components = last_json
                .as_deref()
                .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
                .and_then(|v| v.get("components").cloned());
            let cur_components = serde_json::to_value(components)?;
            if last_components.as_ref() != Some(&cur_components) {
                debug!(
                    "Bill components for apartment {} {} changed since approval; re-flagging",
                    apartment_id, ym
                );
                reset_approval = true;
                approved_at = None;
            }
        }

        let reason = if !pending_items.is_empty() && approved_at.is_none() {
            BillReason::PendingAdmin
        } else {
            BillReason::Ok
        };

        let snapshot = BillSnapshot {
            ym: ym.clone(),
            components,
            prev_components: Some(prev_components.clone()),
            pending_items: pending_items.clone(),
            pending_flags: pending_flags.clone(),
            t3,
            threshold_rub: threshold,
        };
        let snapshot_json = serde_json::to_string(&snapshot)?;
        let pending_json = if reason == BillReason::PendingAdmin {
            serde_json::to_string(&pending_items)?
        } else {
            "{}".to_string()
        };
        self.db
            .save_bill_snapshot(apartment_id, &ym, &snapshot_json, &pending_json)?;
        if reset_approval {
            self.db.reset_bill_approval(apartment_id, &ym)?;
        }

        Ok(BillResult {
            is_complete_photos: true,
            total_rub: Some(components.total_rub),
            missing: Vec::new(),
            reason,
            electric_expected,
            extra_pending: false,
            threshold_rub: threshold,
            pending_items,
            pending_flags,
            t3,
            prev_components: Some(prev_components),
            approved_at,
            sent_at,
        })
    }
}

/// Consumption between two readings; `None` when either side is absent
fn safe_delta(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(c), Some(p)) => Some(c - p),
        _ => None,
    }
}

/// Round to kopeks
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn recompute_prev(
    prev: &MonthReadings,
    prevprev: &MonthReadings,
    tariff: &ResolvedTariff,
    prev_ym: Ym,
) -> PrevComponents {
    let prev_dc = safe_delta(
        prev.value(MeterType::Cold, 1),
        prevprev.value(MeterType::Cold, 1),
    );
    let prev_dh = safe_delta(
        prev.value(MeterType::Hot, 1),
        prevprev.value(MeterType::Hot, 1),
    );

    // The sewer fallback needs both water deltas; with either missing
    // the article stays unknown rather than guessed
    let prev_ds = safe_delta(
        prev.value(MeterType::Sewer, 1),
        prevprev.value(MeterType::Sewer, 1),
    )
    .or(match (prev_dc, prev_dh) {
        (Some(c), Some(h)) => Some(c + h),
        _ => None,
    });

    let prev_de1 = safe_delta(
        prev.value(MeterType::Electric, 1),
        prevprev.value(MeterType::Electric, 1),
    );
    let prev_de2 = safe_delta(
        prev.value(MeterType::Electric, 2),
        prevprev.value(MeterType::Electric, 2),
    );

    let rc_prev = prev_dc.map(|d| d * tariff.cold);
    let rh_prev = prev_dh.map(|d| d * tariff.hot);
    let rs_prev = prev_ds.map(|d| d * tariff.sewer);
    let re_prev = if prev_de1.is_none() && prev_de2.is_none() {
        None
    } else {
        Some(
            prev_de1.unwrap_or(0.0) * tariff.electric_rate(1)
                + prev_de2.unwrap_or(0.0) * tariff.electric_rate(2),
        )
    };

    let total_prev = match (rc_prev, rh_prev, rs_prev, re_prev) {
        (Some(c), Some(h), Some(s), Some(e)) => Some(c + h + s + e),
        _ => None,
    };

    PrevComponents {
        prev_ym,
        cold_rub: rc_prev.map(round2),
        hot_rub: rh_prev.map(round2),
        sewer_rub: rs_prev.map(round2),
        electric_rub: re_prev.map(round2),
        total_rub: total_prev.map(round2),
    }
}

fn flag_item(
    items: &mut BTreeMap<String, PendingItem>,
    threshold: f64,
    name: &str,
    cur_rub: f64,
    prev_rub: Option<f64>,
) {
    let Some(prev_rub) = prev_rub else { return };
    let diff = cur_rub - prev_rub;
    if diff.abs() > threshold {
        items.insert(
            name.to_string(),
            PendingItem {
                cur_rub,
                prev_rub,
                diff_rub: round2(diff),
            },
        );
    }
}
