//! Priority Calculator (C5): assembles the weighted factor sum into a
//! final integer priority for one job.

use crate::config::{PriorityConfig, NICE_OFFSET};
use crate::types::{Job, PrioFactors};

/// Inputs the calculator needs that live outside the job record itself:
/// the job's fair-share factor (already evaluated by the Fair-Share
/// Evaluator), its QoS's normalized priority, and the priorities of the
/// partition(s) it could run in.
pub struct CalculatorInputs {
    pub fs_factor: f64,
    pub qos_norm_priority: f64,
    /// `(partition_name, partition_priority)` for every partition the
    /// job lists; empty if the job is not partition-restricted.
    pub partitions: Vec<(String, u32)>,
    pub partition_max_priority: u32,
    pub node_count: u32,
}

fn age_factor(config: &PriorityConfig, job: &Job, now: i64) -> f64 {
    let t0 = if config.flags.accrue_always {
        Some(job.details.submit_time)
    } else {
        job.details.begin_time
    };
    let t0 = match t0 {
        Some(t) => t,
        None => return 0.0,
    };
    if config.max_age_secs <= 0 {
        return 0.0;
    }
    let diff = (now - t0).max(0) as f64;
    (diff / config.max_age_secs as f64).min(1.0)
}

fn job_size_factor(config: &PriorityConfig, job: &Job, node_count: u32) -> f64 {
    let cpu_cnt = job
        .total_cpus
        .or(Some(job.details.max_cpus))
        .filter(|&c| c > 0)
        .unwrap_or(job.details.min_cpus) as f64;

    let node_ratio = if node_count > 0 {
        job.details.min_nodes as f64 / node_count as f64
    } else {
        0.0
    };
    let cpu_ratio = if config.cluster_cpus > 0 {
        cpu_cnt / config.cluster_cpus as f64
    } else {
        0.0
    };

    let (node_ratio, cpu_ratio) = if config.favor_small {
        (1.0 - node_ratio, 1.0 - cpu_ratio)
    } else {
        (node_ratio, cpu_ratio)
    };

    ((node_ratio + cpu_ratio) / 2.0).clamp(0.0, 1.0)
}

fn weighted_sum(
    config: &PriorityConfig,
    age: f64,
    fs: f64,
    js: f64,
    part: f64,
    qos: f64,
    nice: i32,
) -> f64 {
    config.weights.age as f64 * age
        + config.weights.fs as f64 * fs
        + config.weights.js as f64 * js
        + config.weights.part as f64 * part
        + config.weights.qos as f64 * qos
        - (nice - NICE_OFFSET) as f64
}

/// `compute(job, now)` (spec §4.5). Mutates `job.prio_factors` (and
/// `job.priority_array` for multi-partition jobs) and returns the new
/// priority. Operator overrides (`direct_set_prio && priority > 0`) and
/// held jobs short-circuit without recomputing factors.
pub fn compute(config: &PriorityConfig, job: &mut Job, inputs: CalculatorInputs, now: i64) -> u32 {
    if job.direct_set_prio && job.priority > 0 {
        return job.priority;
    }
    if job.is_held() {
        return job.priority;
    }

    let age = age_factor(config, job, now);
    let js = job_size_factor(config, job, inputs.node_count);
    let fs = inputs.fs_factor;
    let qos = inputs.qos_norm_priority;

    let primary_part_norm = inputs
        .partitions
        .first()
        .map(|(_, p)| {
            if *p > 0 && inputs.partition_max_priority > 0 {
                *p as f64 / inputs.partition_max_priority as f64
            } else {
                0.0
            }
        })
        .unwrap_or(0.0);

    job.prio_factors = Some(PrioFactors {
        priority_age: age,
        priority_fs: fs,
        priority_js: js,
        priority_part: primary_part_norm,
        priority_qos: qos,
        nice: job.nice,
        job_id: job.job_id,
        user_id: job.user_id,
    });

    if inputs.partitions.len() > 1 {
        let mut array = Vec::with_capacity(inputs.partitions.len());
        for (_, part_priority) in &inputs.partitions {
            let part_norm = if *part_priority > 0 && inputs.partition_max_priority > 0 {
                *part_priority as f64 / inputs.partition_max_priority as f64
            } else {
                0.0
            };
            let raw = weighted_sum(config, age, fs, js, part_norm, qos, job.nice);
            array.push((raw.floor().max(1.0)) as u32);
        }
        let best = *array.iter().max().unwrap_or(&1);
        job.priority_array = Some(array);
        job.priority = best;
        return best;
    }

    job.priority_array = None;
    let raw = weighted_sum(config, age, fs, js, primary_part_norm, qos, job.nice);
    let priority = raw.floor().max(1.0) as u32;
    job.priority = priority;
    priority
}
