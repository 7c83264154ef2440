//! Data model shared by every component of the priority subsystem:
//! associations (Shares Tree nodes), QoS records, job records, and the
//! per-job factor breakdown handed back to callers.

use serde::{Deserialize, Serialize};

/// Stable identifier for an association (account or user node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssocId(pub u32);

/// Stable identifier for a QoS record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QosId(pub u32);

/// Stable identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

/// Stable identifier for a user, independent of any one association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u32);

/// `shares_raw`: either a configured non-negative weight, or the
/// `USE_PARENT` sentinel meaning "inherit shares_norm/usage_norm from the
/// parent verbatim."
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shares {
    Value(u64),
    UseParent,
}

impl Shares {
    pub fn raw_or_zero(self) -> u64 {
        match self {
            Shares::Value(v) => v,
            Shares::UseParent => 0,
        }
    }

    pub fn is_use_parent(self) -> bool {
        matches!(self, Shares::UseParent)
    }
}

/// Whether an association is an internal account node or a leaf user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssocKind {
    Account,
    User,
}

/// One node of the Shares Tree.
///
/// `usage_efctv` uses `None` as the "uncomputed" sentinel for lazily
/// evaluated user leaves (spec calls for a discriminator rather than a
/// special float bit pattern).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub id: AssocId,
    pub name: String,
    pub account: String,
    pub user: Option<String>,
    pub kind: AssocKind,
    pub parent: Option<AssocId>,
    pub children: Vec<AssocId>,

    pub shares_raw: Shares,
    pub level_shares: u64,
    pub shares_norm: f64,

    pub usage_raw: f64,
    pub usage_norm: f64,
    pub usage_efctv: Option<f64>,

    pub grp_used_wall: f64,
    pub grp_used_cpu_run_secs: f64,

    pub active_seqno: u64,
    pub tickets: u64,
}

impl Association {
    pub fn new_root(id: AssocId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            account: "root".to_string(),
            user: None,
            kind: AssocKind::Account,
            parent: None,
            children: Vec::new(),
            shares_raw: Shares::Value(1),
            level_shares: 1,
            shares_norm: 1.0,
            usage_raw: 0.0,
            usage_norm: 0.0,
            usage_efctv: Some(0.0),
            grp_used_wall: 0.0,
            grp_used_cpu_run_secs: 0.0,
            active_seqno: 0,
            tickets: 0,
        }
    }

    pub fn new_child(
        id: AssocId,
        name: impl Into<String>,
        account: impl Into<String>,
        user: Option<String>,
        kind: AssocKind,
        parent: AssocId,
        shares_raw: Shares,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            account: account.into(),
            user,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            shares_raw,
            level_shares: 0,
            shares_norm: 0.0,
            usage_raw: 0.0,
            usage_norm: 0.0,
            usage_efctv: None,
            grp_used_wall: 0.0,
            grp_used_cpu_run_secs: 0.0,
            active_seqno: 0,
            tickets: 0,
        }
    }

    /// Saturating-subtract `amount` from the reserved-runtime counter,
    /// floored at zero per spec invariant 2.
    pub fn release_reservation(&mut self, amount: f64) {
        self.grp_used_cpu_run_secs = (self.grp_used_cpu_run_secs - amount).max(0.0);
    }
}

/// QoS record. Independent from the Shares Tree but carries the same
/// usage-accounting fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Qos {
    pub id: QosId,
    pub name: String,
    pub priority: u32,
    pub norm_priority: f64,
    /// Multiplier applied to usage charges. `0.0` disables all charging
    /// for jobs under this QoS.
    pub usage_factor: f64,
    pub usage_raw: f64,
    pub grp_used_wall: f64,
    pub grp_used_cpu_run_secs: f64,
}

impl Qos {
    pub fn new(id: QosId, name: impl Into<String>, priority: u32, norm_priority: f64) -> Self {
        Self {
            id,
            name: name.into(),
            priority,
            norm_priority,
            usage_factor: 1.0,
            usage_raw: 0.0,
            grp_used_wall: 0.0,
            grp_used_cpu_run_secs: 0.0,
        }
    }

    pub fn release_reservation(&mut self, amount: f64) {
        self.grp_used_cpu_run_secs = (self.grp_used_cpu_run_secs - amount).max(0.0);
    }
}

/// Job scheduling state, as observed from the controller's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Held,
    Other,
}

/// A partition reference attached to a job, used for the partition factor
/// and (when a job spans several partitions) the `priority_array`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionRef {
    pub name: String,
    pub priority: u32,
}

/// The subset of job detail fields the job-size and age factors read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetails {
    pub submit_time: i64,
    pub begin_time: Option<i64>,
    pub min_nodes: u32,
    pub min_cpus: u32,
    pub max_cpus: u32,
}

/// A job record as consumed by this subsystem. Owned by the external
/// controller; this crate only reads it and writes `priority`,
/// `priority_array`, and `prio_factors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub user_id: UserId,
    pub account: String,
    pub assoc_id: AssocId,
    pub qos_id: Option<QosId>,
    pub priority: u32,
    pub direct_set_prio: bool,
    pub nice: i32,
    pub details: JobDetails,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub total_cpus: Option<u32>,
    pub time_limit_minutes: Option<u32>,
    pub partitions: Vec<PartitionRef>,
    pub state: JobState,
    pub prio_factors: Option<PrioFactors>,
    pub priority_array: Option<Vec<u32>>,
}

impl Job {
    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    pub fn is_held(&self) -> bool {
        self.state == JobState::Held
    }
}

/// Per-job factor breakdown, all doubles in `[0, 1]` prior to weighting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrioFactors {
    pub priority_age: f64,
    pub priority_fs: f64,
    pub priority_js: f64,
    pub priority_part: f64,
    pub priority_qos: f64,
    pub nice: i32,
    pub job_id: JobId,
    pub user_id: UserId,
}

/// The tiny persisted recovery record: `{last_ran, last_reset}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub last_ran: i64,
    pub last_reset: i64,
}
