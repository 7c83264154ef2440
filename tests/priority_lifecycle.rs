//! End-to-end `init -> tick -> fini` exercise against an in-memory job
//! list, covering a couple of the documented scenarios: a pending job
//! gains priority from a completed tick, and a held job's priority is
//! left untouched.

use std::sync::Arc;
use std::time::Duration;

use priority_multifactor::config::{PriorityFlags, Weights};
use priority_multifactor::job_source::{InMemoryJobSource, JobSource};
use priority_multifactor::manager::PriorityManager;
use priority_multifactor::qos::QosTable;
use priority_multifactor::tree::SharesTree;
use priority_multifactor::types::{
    AssocId, AssocKind, Association, Job, JobDetails, JobId, JobState, Shares, UserId,
};
use priority_multifactor::PriorityConfig;

fn pending_job(id: u64, assoc_id: AssocId) -> Job {
    Job {
        job_id: JobId(id),
        user_id: UserId(id as u32),
        account: "acct".to_string(),
        assoc_id,
        qos_id: None,
        priority: 0,
        direct_set_prio: false,
        nice: priority_multifactor::config::NICE_OFFSET,
        details: JobDetails { submit_time: 0, begin_time: None, min_nodes: 1, min_cpus: 1, max_cpus: 1 },
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

fn one_user_tree() -> SharesTree {
    let root = Association::new_root(AssocId(0), "root");
    let user = Association::new_child(
        AssocId(1), "u", "acct", Some("u".into()), AssocKind::User, AssocId(0), Shares::Value(1),
    );
    SharesTree::build(root, vec![user]).unwrap()
}

#[tokio::test]
async fn pending_job_is_priced_and_held_job_is_untouched_across_a_tick() {
    let mut held = pending_job(2, AssocId(1));
    held.state = JobState::Held;
    held.priority = 0;

    let jobs = Arc::new(InMemoryJobSource::new(vec![pending_job(1, AssocId(1)), held]));

    let config = PriorityConfig {
        calc_period_secs: 1,
        flags: PriorityFlags { accrue_always: true, ..Default::default() },
        weights: Weights { age: 100, ..Default::default() },
        max_age_secs: 10,
        ..Default::default()
    };

    let mut manager = PriorityManager::init(config, Some(4), one_user_tree(), QosTable::new(), jobs.clone())
        .expect("init should succeed with a populated tree and known cluster CPU count");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let snapshot = jobs.snapshot();
    let priced = snapshot.iter().find(|j| j.job_id == JobId(1)).unwrap();
    let held = snapshot.iter().find(|j| j.job_id == JobId(2)).unwrap();

    assert!(priced.priority > 0, "pending job should gain priority from the age factor after a tick");
    assert_eq!(held.priority, 0, "held job priority must persist across ticks");
    assert!(held.prio_factors.is_none(), "held job factors are never recomputed");

    manager.fini().await;
}

#[tokio::test]
async fn init_is_fatal_without_a_known_cluster_cpu_count() {
    let jobs = Arc::new(InMemoryJobSource::new(Vec::new()));
    let result = PriorityManager::init(PriorityConfig::default(), None, one_user_tree(), QosTable::new(), jobs);
    assert!(result.is_err());
}

#[tokio::test]
async fn init_is_fatal_when_fair_share_is_weighted_but_no_associations_are_loaded() {
    let jobs = Arc::new(InMemoryJobSource::new(Vec::new()));
    let config = PriorityConfig { weights: Weights { fs: 1, ..Default::default() }, ..Default::default() };
    let root_only = SharesTree::build(Association::new_root(AssocId(0), "root"), Vec::new()).unwrap();
    let result = PriorityManager::init(config, Some(4), root_only, QosTable::new(), jobs);
    assert!(result.is_err());
}
