//! Usage Accountant (C2): charges elapsed CPU-seconds of running jobs to
//! the QoS and account chain, and maintains the reserved-runtime counter
//! that admission pre-credits against a job's time limit.

use crate::qos::QosTable;
use crate::tree::SharesTree;
use crate::types::Job;

/// Whether a charge was actually applied. The ticket-variant decay loop
/// only charges; the usage-variant loop additionally recomputes priority
/// only when a charge was `Processed` (spec §4.6 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    Processed,
    Skipped,
}

/// `charge(job, decay_factor, window_start, window_end)` (spec §4.2).
pub fn charge(
    tree: &mut SharesTree,
    qos: &mut QosTable,
    job: &Job,
    decay_factor: f64,
    window_start: i64,
    window_end: i64,
) -> ChargeOutcome {
    let start_time = match job.start_time {
        Some(t) => t,
        None => return ChargeOutcome::Skipped,
    };

    let start = window_start.max(start_time);
    let end = match job.end_time {
        Some(e) => window_end.min(e),
        None => window_end,
    };

    let run_delta = (end - start) as f64;
    if run_delta <= 0.0 {
        return ChargeOutcome::Skipped;
    }

    let total_cpus = job.total_cpus.unwrap_or(0) as f64;
    let time_limit_secs = job.time_limit_minutes.map(|m| m as f64 * 60.0).unwrap_or(f64::MAX);
    let time_limit_remaining_at_start = (time_limit_secs - (start - start_time) as f64).max(0.0);
    let cpu_run_delta = total_cpus * run_delta.min(time_limit_remaining_at_start);

    let mut run_decay = run_delta * decay_factor.powf(run_delta);
    let mut real_decay = run_decay * total_cpus;

    if let Some(qos_id) = job.qos_id {
        if let Some(q) = qos.get(qos_id) {
            if q.usage_factor == 0.0 {
                return ChargeOutcome::Skipped;
            }
            run_decay *= q.usage_factor;
            real_decay *= q.usage_factor;
        }
    }

    if let Some(qos_id) = job.qos_id {
        if let Some(q) = qos.get_mut(qos_id) {
            q.usage_raw += real_decay;
            q.grp_used_wall += run_decay;
            q.release_reservation(cpu_run_delta);
        }
    }

    for assoc_id in tree.ancestor_chain(job.assoc_id) {
        if let Some(a) = tree.get_mut(assoc_id) {
            a.usage_raw += real_decay;
            a.grp_used_wall += run_decay;
            a.release_reservation(cpu_run_delta);
        }
    }

    ChargeOutcome::Processed
}

/// `rewind_reservation(last_ran)` (spec §4.2 Initialization): for every
/// running job that started at or before `last_ran`, subtracts
/// `total_cpus * (last_ran - start_time)` from the reserved counters
/// along the QoS and ancestor chain. Reconciles admission having
/// re-added the job's full `total_cpus * time_limit` reservation across
/// a restart.
pub fn rewind_reservation(tree: &mut SharesTree, qos: &mut QosTable, jobs: &[Job], last_ran: i64) {
    for job in jobs {
        if !job.is_running() {
            continue;
        }
        let start_time = match job.start_time {
            Some(t) => t,
            None => continue,
        };
        if start_time > last_ran {
            continue;
        }
        let total_cpus = job.total_cpus.unwrap_or(0) as f64;
        let amount = total_cpus * (last_ran - start_time) as f64;
        if amount <= 0.0 {
            continue;
        }

        if let Some(qos_id) = job.qos_id {
            if let Some(q) = qos.get_mut(qos_id) {
                q.release_reservation(amount);
            }
        }
        for assoc_id in tree.ancestor_chain(job.assoc_id) {
            if let Some(a) = tree.get_mut(assoc_id) {
                a.release_reservation(amount);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::QosTable;
    use crate::test_support::running_job;
    use crate::types::{AssocId, AssocKind, Association, Qos, QosId, Shares};

    fn one_user_tree() -> SharesTree {
        let root = Association::new_root(AssocId(0), "root");
        let user = Association::new_child(
            AssocId(1), "u", "acct", Some("u".into()), AssocKind::User, AssocId(0), Shares::Value(1),
        );
        SharesTree::build(root, vec![user]).unwrap()
    }

    #[test]
    fn running_job_charge_matches_spec_scenario_5() {
        let mut tree = one_user_tree();
        let mut qos = QosTable::new();
        let job = running_job(1, AssocId(1), 0, 4, 10);

        let outcome = charge(&mut tree, &mut qos, &job, 1.0, 0, 300);
        assert_eq!(outcome, ChargeOutcome::Processed);

        let user = tree.get(AssocId(1)).unwrap();
        // grp_used_cpu_run_secs started at 0 and saturates at the floor.
        assert_eq!(user.grp_used_cpu_run_secs, 0.0);
        assert_eq!(user.usage_raw, 300.0 * 4.0 * 1f64.powf(300.0));

        let root = tree.root();
        assert_eq!(root.usage_raw, user.usage_raw);
    }

    #[test]
    fn zero_usage_factor_qos_skips_entire_charge() {
        let mut tree = one_user_tree();
        let mut qos = QosTable::new();
        let mut q = Qos::new(QosId(0), "free", 0, 0.0);
        q.usage_factor = 0.0;
        qos.insert(q);

        let mut job = running_job(1, AssocId(1), 0, 4, 10);
        job.qos_id = Some(QosId(0));

        let outcome = charge(&mut tree, &mut qos, &job, 1.0, 0, 300);
        assert_eq!(outcome, ChargeOutcome::Skipped);
        assert_eq!(tree.get(AssocId(1)).unwrap().usage_raw, 0.0);
    }

    #[test]
    fn reservation_never_goes_negative() {
        let mut tree = one_user_tree();
        tree.get_mut(AssocId(1)).unwrap().grp_used_cpu_run_secs = 10.0;
        tree.get_mut(AssocId(1)).unwrap().release_reservation(100.0);
        assert_eq!(tree.get(AssocId(1)).unwrap().grp_used_cpu_run_secs, 0.0);
    }

    #[test]
    fn rewind_reservation_releases_elapsed_admission_credit() {
        let mut tree = one_user_tree();
        tree.get_mut(AssocId(1)).unwrap().grp_used_cpu_run_secs = 4.0 * 600.0; // admission credited total_cpus*time_limit
        let mut qos = QosTable::new();
        let job = running_job(1, AssocId(1), 100, 4, 10);

        rewind_reservation(&mut tree, &mut qos, &[job], 400);
        // last_ran=400, start=100 -> elapsed 300s * 4 cpus = 1200 released
        assert_eq!(tree.get(AssocId(1)).unwrap().grp_used_cpu_run_secs, 4.0 * 600.0 - 1200.0);
    }
}
