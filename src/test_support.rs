//! Shared fixtures for unit tests across modules.
#![cfg(test)]

use crate::config::NICE_OFFSET;
use crate::types::{AssocId, Job, JobDetails, JobId, JobState, UserId};

pub fn pending_job(id: u64, assoc_id: AssocId) -> Job {
    Job {
        job_id: JobId(id),
        user_id: UserId(id as u32),
        account: "acct".to_string(),
        assoc_id,
        qos_id: None,
        priority: 0,
        direct_set_prio: false,
        // nice is stored relative to NICE_OFFSET; this value is neutral.
        nice: NICE_OFFSET,
        details: JobDetails {
            submit_time: 0,
            begin_time: None,
            min_nodes: 1,
            min_cpus: 1,
            max_cpus: 1,
        },
        start_time: None,
        end_time: None,
        total_cpus: Some(1),
        time_limit_minutes: Some(60),
        partitions: Vec::new(),
        state: JobState::Pending,
        prio_factors: None,
        priority_array: None,
    }
}

pub fn running_job(id: u64, assoc_id: AssocId, start_time: i64, total_cpus: u32, time_limit_minutes: u32) -> Job {
    let mut j = pending_job(id, assoc_id);
    j.state = JobState::Running;
    j.start_time = Some(start_time);
    j.total_cpus = Some(total_cpus);
    j.time_limit_minutes = Some(time_limit_minutes);
    j
}
