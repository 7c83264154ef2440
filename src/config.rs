//! Recognized configuration options (spec §6) and their defaults, which
//! match the original plugin: no decay, no scheduled reset, a five minute
//! tick.

use serde::{Deserialize, Serialize};

/// Scheduled-reset policy for `reset_all` (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetPeriod {
    None,
    /// One-shot: reset on the next tick, then behave as `None`.
    Now,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

/// Bitset flags observed by the original plugin; only these two are
/// modeled, per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriorityFlags {
    pub ticket_based: bool,
    pub accrue_always: bool,
}

/// Privacy gate for the Query Service (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriorityPrivacyFlags {
    pub private_data_jobs: bool,
}

/// The five weighted factors plus niceness, per spec §4.5.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Weights {
    pub age: u32,
    pub fs: u32,
    pub js: u32,
    pub part: u32,
    pub qos: u32,
}

/// The fixed ticket pool size; not configurable (spec §6).
pub const MAX_TICKETS_POOL: u64 = u32::MAX as u64;

/// Defends the ticket-mode apportionment formula against a vanishing
/// `usage_efctv` denominator (spec §4.4, Design Notes open question 1).
pub const MIN_USAGE_FACTOR: f64 = 0.01;

/// `NICE_OFFSET` that job `nice` values are stored relative to (spec §4.5).
pub const NICE_OFFSET: i32 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// Seconds between decay ticks.
    pub calc_period_secs: u64,
    /// Half-life in seconds; `<= 0` disables decay.
    pub decay_half_life_secs: f64,
    pub reset_period: ResetPeriod,
    pub favor_small: bool,
    /// Seconds after which the age factor saturates at 1.0.
    pub max_age_secs: i64,
    pub weights: Weights,
    pub flags: PriorityFlags,
    pub privacy: PriorityPrivacyFlags,
    /// `None` disables recovery persistence (the `/dev/null` sink).
    pub state_save_location: Option<std::path::PathBuf>,
    /// Whether the configured accounting storage backend supports
    /// fair-share; `false` silently degrades `weights.fs` to 0 at init.
    pub accounting_storage_supported: bool,
    /// Number of CPUs in the cluster, used by the job-size factor.
    pub cluster_cpus: u32,
    /// Number of nodes in the cluster, used by the job-size factor.
    pub node_count: u32,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            calc_period_secs: 300,
            decay_half_life_secs: 0.0,
            reset_period: ResetPeriod::None,
            favor_small: false,
            max_age_secs: 7 * 24 * 3600,
            weights: Weights::default(),
            flags: PriorityFlags::default(),
            privacy: PriorityPrivacyFlags::default(),
            state_save_location: None,
            accounting_storage_supported: true,
            cluster_cpus: 1,
            node_count: 1,
        }
    }
}

impl PriorityConfig {
    /// `decay_factor = 1 - ln(2)/H`, the first-order approximation spec
    /// §4.3 specifies. Returns `None` when decay is disabled.
    pub fn base_decay_factor(&self) -> Option<f64> {
        if self.decay_half_life_secs <= 0.0 {
            None
        } else {
            Some(1.0 - std::f64::consts::LN_2 / self.decay_half_life_secs)
        }
    }
}
