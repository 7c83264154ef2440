//! Multifactor job-priority subsystem for a batch resource manager:
//! hierarchical fair-share accounting, usage decay, and weighted
//! priority assignment for pending jobs.

pub mod accountant;
pub mod calculator;
pub mod config;
pub mod decay;
pub mod decay_loop;
pub mod error;
pub mod fairshare;
pub mod job_source;
pub mod manager;
pub mod qos;
pub mod query;
pub mod recovery;
#[cfg(test)]
mod test_support;
pub mod tree;
pub mod types;

pub use config::PriorityConfig;
pub use error::{PriorityError, Result};
pub use manager::PriorityManager;
pub use query::{QueryRequest, Requester};
pub use types::{
    AssocId, AssocKind, Association, Job, JobDetails, JobId, JobState, PartitionRef, PrioFactors,
    Qos, QosId, RecoveryRecord, Shares, UserId,
};
