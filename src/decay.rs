//! Decay Engine (C3): exponential decay of accumulated usage, and the
//! scheduled-reset policy that computes the next reset boundary.

use chrono::{Datelike, NaiveDate, TimeZone, Utc};

use crate::config::ResetPeriod;
use crate::error::{PriorityError, Result};
use crate::qos::QosTable;
use crate::tree::SharesTree;

/// `apply(decay_factor)` (spec §4.3): multiplies `usage_raw` and
/// `grp_used_wall` by `decay_factor` on every association and QoS
/// record. Short-circuits on `1.0` (no-op success) and rejects `0.0` as
/// a configuration error for the caller's tick to abort on.
pub fn apply(tree: &mut SharesTree, qos: &mut QosTable, decay_factor: f64) -> Result<()> {
    if decay_factor == 1.0 {
        return Ok(());
    }
    if decay_factor == 0.0 {
        return Err(PriorityError::DegenerateDecayFactor);
    }
    for assoc in tree.iter_mut() {
        assoc.usage_raw *= decay_factor;
        assoc.grp_used_wall *= decay_factor;
    }
    for q in qos.iter_mut() {
        q.usage_raw *= decay_factor;
        q.grp_used_wall *= decay_factor;
    }
    Ok(())
}

/// `reset_all()` (spec §4.3): zeros `usage_raw`/`grp_used_wall` for every
/// association and QoS record, leaving structure intact.
pub fn reset_all(tree: &mut SharesTree, qos: &mut QosTable) {
    for assoc in tree.iter_mut() {
        assoc.usage_raw = 0.0;
        assoc.grp_used_wall = 0.0;
    }
    for q in qos.iter_mut() {
        q.usage_raw = 0.0;
        q.grp_used_wall = 0.0;
    }
}

/// Per-cycle decay applied, `decay_factor^dt` where `dt` is seconds since
/// the last tick (spec §4.3).
pub fn decay_factor_for_interval(base_decay_factor: f64, dt_secs: f64) -> f64 {
    base_decay_factor.powf(dt_secs)
}

fn midnight_of(epoch_secs: i64) -> NaiveDate {
    Utc.timestamp_opt(epoch_secs, 0)
        .single()
        .expect("valid timestamp")
        .date_naive()
}

fn to_epoch(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
        .timestamp()
}

fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + (date.month() as i32 - 1) + months;
    let year = total.div_euclid(12);
    let month = (total.rem_euclid(12)) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).expect("first-of-month is always valid")
}

/// Computes the next reset boundary by normalizing `last_reset` to
/// midnight (local time — modeled as UTC since timezone configuration is
/// an external concern) and advancing to the next period boundary:
/// weekly aligns to Sunday, monthly/quarterly/yearly advance calendar
/// fields to the first of the period. Returns `None` when no further
/// scheduled reset applies (`NONE`, or `NOW` after its one-shot fires).
pub fn next_reset(period: ResetPeriod, last_reset: i64) -> Option<i64> {
    match period {
        ResetPeriod::None => None,
        ResetPeriod::Now => Some(last_reset),
        ResetPeriod::Daily => {
            let midnight = midnight_of(last_reset);
            Some(to_epoch(midnight + chrono::Duration::days(1)))
        }
        ResetPeriod::Weekly => {
            let midnight = midnight_of(last_reset) + chrono::Duration::days(1);
            let days_until_sunday =
                (7 - midnight.weekday().num_days_from_sunday()) % 7;
            Some(to_epoch(midnight + chrono::Duration::days(days_until_sunday as i64)))
        }
        ResetPeriod::Monthly => Some(to_epoch(add_months(midnight_of(last_reset), 1))),
        ResetPeriod::Quarterly => Some(to_epoch(add_months(midnight_of(last_reset), 3))),
        ResetPeriod::Yearly => Some(to_epoch(add_months(midnight_of(last_reset), 12))),
    }
}
