//! The job-list interface this subsystem consumes (spec §6): an
//! iterable collection of job records guarded by the controller's own
//! read/write lock. The controller's job state machine is an external
//! collaborator (spec §1); this crate only depends on the trait below,
//! plus an in-memory test double for the integration tests.

use parking_lot::RwLock;

use crate::types::{Job, JobId};

/// Read-mostly access to the external job list: snapshot for iteration
/// under a read lock, targeted updates to `priority`/`prio_factors`/
/// `priority_array` under a write lock (spec §5's job-list lock).
pub trait JobSource: Send + Sync {
    fn snapshot(&self) -> Vec<Job>;
    fn apply_updates(&self, updates: Vec<Job>);
}

pub struct InMemoryJobSource {
    jobs: RwLock<Vec<Job>>,
}

impl InMemoryJobSource {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs: RwLock::new(jobs) }
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.read().iter().find(|j| j.job_id == id).cloned()
    }
}

impl JobSource for InMemoryJobSource {
    fn snapshot(&self) -> Vec<Job> {
        self.jobs.read().clone()
    }

    fn apply_updates(&self, updates: Vec<Job>) {
        let mut guard = self.jobs.write();
        for updated in updates {
            if let Some(slot) = guard.iter_mut().find(|j| j.job_id == updated.job_id) {
                *slot = updated;
            }
        }
    }
}
