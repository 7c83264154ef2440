//! Decay Loop (C6): the single long-running background task that
//! orchestrates the Decay Engine, Usage Accountant, and Fair-Share
//! Evaluator on a periodic tick (spec §4.6).
//!
//! Lock ordering within a tick is always `decay_lock -> slurmctld ->
//! assoc_mgr`; this is the only place in the crate that ever holds more
//! than one lock at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::accountant::{self, ChargeOutcome};
use crate::calculator::{self, CalculatorInputs};
use crate::config::PriorityConfig;
use crate::decay;
use crate::error::Result;
use crate::fairshare::{self, FairShareMode};
use crate::job_source::JobSource;
use crate::qos::QosTable;
use crate::recovery::RecoveryStore;
use crate::tree::SharesTree;
use crate::types::RecoveryRecord;

fn fairshare_mode(config: &PriorityConfig) -> FairShareMode {
    if config.flags.ticket_based {
        FairShareMode::Ticket
    } else {
        FairShareMode::Exponential
    }
}

/// Everything one tick needs a write lock on. Held by `PriorityManager`
/// and shared with the loop task via `Arc`.
pub struct DecayState {
    pub tree: RwLock<SharesTree>,
    pub qos: RwLock<QosTable>,
    pub jobs: Arc<dyn JobSource>,
    pub recovery: RecoveryStore,
    pub config: RwLock<PriorityConfig>,
    /// The ticket pool size from the last `distribute_tickets` call, so
    /// an on-demand `priority_fs_for_job` outside the tick (manager's
    /// `set`) can normalize `tickets` the same way the loop does.
    pub max_tickets: RwLock<u64>,
}

pub struct DecayLoop {
    state: Arc<DecayState>,
    shutdown: Arc<AtomicBool>,
    running_decay: Arc<Mutex<bool>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl DecayLoop {
    pub fn new(state: Arc<DecayState>) -> Self {
        Self {
            state,
            shutdown: Arc::new(AtomicBool::new(false)),
            running_decay: Arc::new(Mutex::new(false)),
            handle: None,
        }
    }

    /// Spawns the background task. Only one loop may run against a given
    /// `DecayState` at a time; this is the crate's `running_decay` flag.
    pub fn start(&mut self, record: RecoveryRecord) -> Result<()> {
        {
            let mut running = self.running_decay.lock();
            if *running {
                return Err(crate::error::PriorityError::AlreadyRunning);
            }
            *running = true;
        }

        let state = self.state.clone();
        let shutdown = self.shutdown.clone();
        let running_decay = self.running_decay.clone();
        self.handle = Some(tokio::spawn(run_loop(state, shutdown, running_decay, record)));
        Ok(())
    }

    /// Signals the loop to stop and joins it. The loop checks `shutdown`
    /// at each of the three suspension points spec.md §5 names, so this
    /// returns without waiting for an entire extra tick period.
    pub async fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running_decay.lock()
    }
}

async fn run_loop(
    state: Arc<DecayState>,
    shutdown: Arc<AtomicBool>,
    running_decay: Arc<Mutex<bool>>,
    mut record: RecoveryRecord,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let tick_start = now();
        let config = state.config.read().clone();
        record = run_tick(&state, &config, tick_start, record);

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let elapsed = (now() - tick_start).max(0) as u64;
        let sleep_secs = config.calc_period_secs.saturating_sub(elapsed);
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(sleep_secs.max(1))) => {}
            _ = wait_for_shutdown(&shutdown) => { break; }
        }
    }

    *running_decay.lock() = false;
}

async fn wait_for_shutdown(shutdown: &AtomicBool) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Runs a single tick (spec §4.6 steps 1-7) and returns the record to
/// persist on the next tick's `Δt` computation.
fn run_tick(
    state: &DecayState,
    config: &PriorityConfig,
    tick_start: i64,
    record: RecoveryRecord,
) -> RecoveryRecord {
    let mode = fairshare_mode(config);
    let mut last_reset = record.last_reset;

    {
        let mut tree = state.tree.write();
        let mut qos = state.qos.write();

        // Step 1: scheduled reset.
        if let Some(next) = decay::next_reset(config.reset_period, last_reset) {
            if tick_start >= next {
                info!(tick = tick_start, "reset_all fired");
                decay::reset_all(&mut tree, &mut qos);
                last_reset = tick_start;
            }
        }

        // Step 2: recompute usage_efctv on account nodes.
        tree.walk_setting_effective(mode);

        // Step 3: decay.
        if record.last_ran != 0 {
            if let Some(base) = config.base_decay_factor() {
                let dt = (tick_start - record.last_ran).max(0) as f64;
                let real_decay = decay::decay_factor_for_interval(base, dt);
                if let Err(err) = decay::apply(&mut tree, &mut qos, real_decay) {
                    warn!(error = %err, "tick aborted: decay application failed");
                    return RecoveryRecord { last_ran: record.last_ran, last_reset };
                }
            }
        }
    }

    let jobs = state.jobs.snapshot();
    let mut updated = Vec::with_capacity(jobs.len());
    let mut jobs_charged = 0u32;
    let mut jobs_priced = 0u32;

    match mode {
        FairShareMode::Ticket => {
            {
                let mut tree = state.tree.write();
                fairshare::mark_active(&mut tree, &jobs);
            }
            {
                let mut tree = state.tree.write();
                let mut qos = state.qos.write();
                for job in &jobs {
                    if job.is_running() {
                        let base = config.base_decay_factor().unwrap_or(1.0);
                        let outcome = accountant::charge(&mut tree, &mut qos, job, base, record.last_ran.max(job.start_time.unwrap_or(tick_start)), tick_start);
                        if outcome == ChargeOutcome::Processed {
                            jobs_charged += 1;
                        }
                    }
                }
            }
            let max_tickets = {
                let mut tree = state.tree.write();
                tree.root_mut().tickets = crate::config::MAX_TICKETS_POOL;
                fairshare::distribute_tickets(&mut tree)
            };
            *state.max_tickets.write() = max_tickets;
            let mut tree = state.tree.write();
            let qos = state.qos.read();
            for mut job in jobs {
                if job.is_pending() && !job.is_held() {
                    let fs_factor = fairshare::priority_fs_for_job(mode, &mut tree, job.assoc_id, max_tickets);
                    price_job(config, &mut job, fs_factor, &qos, tick_start);
                    jobs_priced += 1;
                }
                updated.push(job);
            }
        }
        FairShareMode::Exponential => {
            let mut tree = state.tree.write();
            let mut qos_w = state.qos.write();
            for mut job in jobs {
                if job.is_running() {
                    let base = config.base_decay_factor().unwrap_or(1.0);
                    let outcome = accountant::charge(&mut tree, &mut qos_w, &job, base, record.last_ran.max(job.start_time.unwrap_or(tick_start)), tick_start);
                    if outcome != ChargeOutcome::Processed {
                        updated.push(job);
                        continue;
                    }
                    jobs_charged += 1;
                } else if job.is_pending() && !job.is_held() {
                    let fs_factor = fairshare::priority_fs_for_job(mode, &mut tree, job.assoc_id, 0);
                    price_job(config, &mut job, fs_factor, &qos_w, tick_start);
                    jobs_priced += 1;
                }
                updated.push(job);
            }
        }
    }

    state.jobs.apply_updates(updated);

    debug!(tick = tick_start, jobs_charged, jobs_priced, "tick complete");

    let new_record = RecoveryRecord { last_ran: tick_start, last_reset };
    if let Err(err) = state.recovery.write(new_record) {
        warn!(error = %err, "recovery_write failed");
    }
    new_record
}

fn price_job(
    config: &PriorityConfig,
    job: &mut crate::types::Job,
    fs_factor: f64,
    qos: &QosTable,
    now: i64,
) {
    let qos_norm_priority = job
        .qos_id
        .and_then(|id| qos.get(id))
        .map(|q| q.norm_priority)
        .unwrap_or(0.0);

    let partitions: Vec<(String, u32)> =
        job.partitions.iter().map(|p| (p.name.clone(), p.priority)).collect();
    let partition_max_priority = partitions.iter().map(|(_, p)| *p).max().unwrap_or(0);

    let inputs = CalculatorInputs {
        fs_factor,
        qos_norm_priority,
        partitions,
        partition_max_priority,
        node_count: config.node_count,
    };
    calculator::compute(config, job, inputs, now);
}
