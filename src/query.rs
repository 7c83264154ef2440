//! Query Service (C8): per-pending-job factor breakdowns for operator
//! tooling.

use crate::config::PriorityConfig;
use crate::types::{Job, JobId, PrioFactors, UserId};

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub job_ids: Option<Vec<JobId>>,
    pub user_ids: Option<Vec<UserId>>,
}

/// The caller's identity, used for the `PRIVATE_DATA_JOBS` privacy gate.
/// Authentication and coordinator-role lookup are external collaborators
/// (spec §1); this crate takes the already-resolved facts.
#[derive(Debug, Clone)]
pub struct Requester {
    pub user_id: UserId,
    pub is_operator: bool,
    pub coordinator_accounts: Vec<String>,
}

/// `get_factors(req, requester_uid)` (spec §4.8). A job is included only
/// when it (a) has reached `begin_time`, (b) is not held, (c) is not
/// operator-overridden, and (d) passes any job-id/user-id filters.
/// A failure to produce a factor for one job (e.g. `prio_factors` not
/// yet computed) omits that entry rather than returning a partial one
/// (spec §7).
pub fn get_factors(
    config: &PriorityConfig,
    jobs: &[Job],
    req: &QueryRequest,
    requester: &Requester,
    now: i64,
) -> Vec<PrioFactors> {
    jobs.iter()
        .filter(|job| job.is_pending())
        .filter(|job| !job.is_held())
        .filter(|job| !job.direct_set_prio)
        .filter(|job| job.details.begin_time.map(|bt| bt <= now).unwrap_or(false))
        .filter(|job| match &req.job_ids {
            Some(ids) => ids.contains(&job.job_id),
            None => true,
        })
        .filter(|job| match &req.user_ids {
            Some(ids) => ids.contains(&job.user_id),
            None => true,
        })
        .filter(|job| visible_to(config, job, requester))
        .filter_map(|job| job.prio_factors)
        .collect()
}

fn visible_to(config: &PriorityConfig, job: &Job, requester: &Requester) -> bool {
    if !config.privacy.private_data_jobs || requester.is_operator {
        return true;
    }
    job.user_id == requester.user_id || requester.coordinator_accounts.contains(&job.account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pending_job;
    use crate::types::{AssocId, PrioFactors};

    fn job_with_factors(id: u64, user: u32, account: &str) -> Job {
        let mut j = pending_job(id, AssocId(1));
        j.user_id = UserId(user);
        j.account = account.to_string();
        j.details.begin_time = Some(0);
        j.prio_factors = Some(PrioFactors {
            priority_age: 0.0,
            priority_fs: 0.0,
            priority_js: 0.0,
            priority_part: 0.0,
            priority_qos: 0.0,
            nice: 0,
            job_id: j.job_id,
            user_id: j.user_id,
        });
        j
    }

    #[test]
    fn held_and_overridden_jobs_are_omitted() {
        let config = PriorityConfig::default();
        let mut held = job_with_factors(1, 1, "acct");
        held.state = crate::types::JobState::Held;
        let mut overridden = job_with_factors(2, 1, "acct");
        overridden.direct_set_prio = true;
        let jobs = vec![held, overridden];

        let requester = Requester { user_id: UserId(1), is_operator: true, coordinator_accounts: vec![] };
        let out = get_factors(&config, &jobs, &QueryRequest::default(), &requester, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn private_data_jobs_hides_others_from_non_operators() {
        let mut config = PriorityConfig::default();
        config.privacy.private_data_jobs = true;
        let jobs = vec![job_with_factors(1, 1, "acct"), job_with_factors(2, 2, "acct")];

        let requester = Requester { user_id: UserId(1), is_operator: false, coordinator_accounts: vec![] };
        let out = get_factors(&config, &jobs, &QueryRequest::default(), &requester, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, UserId(1));
    }

    #[test]
    fn coordinator_sees_their_account() {
        let mut config = PriorityConfig::default();
        config.privacy.private_data_jobs = true;
        let jobs = vec![job_with_factors(1, 2, "teamA")];

        let requester = Requester {
            user_id: UserId(1),
            is_operator: false,
            coordinator_accounts: vec!["teamA".to_string()],
        };
        let out = get_factors(&config, &jobs, &QueryRequest::default(), &requester, 0);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn job_id_and_user_id_filters_both_must_match() {
        let config = PriorityConfig::default();
        let jobs = vec![job_with_factors(1, 1, "acct"), job_with_factors(2, 2, "acct")];
        let requester = Requester { user_id: UserId(1), is_operator: true, coordinator_accounts: vec![] };

        let req = QueryRequest { job_ids: Some(vec![JobId(1)]), user_ids: Some(vec![UserId(2)]) };
        let out = get_factors(&config, &jobs, &req, &requester, 0);
        assert!(out.is_empty(), "job 1 doesn't match user filter, job 2 doesn't match job-id filter");
    }

    #[test]
    fn job_with_no_begin_time_is_omitted() {
        let config = PriorityConfig::default();
        let mut job = job_with_factors(1, 1, "acct");
        job.details.begin_time = None;
        let requester = Requester { user_id: UserId(1), is_operator: true, coordinator_accounts: vec![] };
        let out = get_factors(&config, &[job], &QueryRequest::default(), &requester, 0);
        assert!(out.is_empty(), "a job that has never reached begin_time must not be listed");
    }
}
