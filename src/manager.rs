//! `PriorityManager` (§6): the crate's facade, analogous to this
//! codebase's `ResourceManager` coordinator
//! (`resource_manager::ResourceManager`). Owns the Shares Tree, QoS
//! table, decay-loop task handle, and recovery store; exposes exactly
//! the operation set spec.md §6 lists.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::calculator::{self, CalculatorInputs};
use crate::config::PriorityConfig;
use crate::decay_loop::{DecayLoop, DecayState};
use crate::error::{PriorityError, Result};
use crate::fairshare::FairShareMode;
use crate::job_source::JobSource;
use crate::qos::QosTable;
use crate::query::{self, QueryRequest, Requester};
use crate::recovery::RecoveryStore;
use crate::tree::SharesTree;
use crate::types::{AssocId, Job, PrioFactors};

pub struct PriorityManager {
    state: Arc<DecayState>,
    loop_handle: DecayLoop,
}

impl PriorityManager {
    /// `init(config, cluster_cpu_count)` (spec §6). Missing cluster CPU
    /// count, or a fair-share weight with no association data loaded, is
    /// fatal. An unsupported accounting storage backend instead degrades
    /// `weight_fs` to 0 and proceeds (spec §7).
    pub fn init(
        mut config: PriorityConfig,
        cluster_cpu_count: Option<u32>,
        tree: SharesTree,
        qos: QosTable,
        jobs: Arc<dyn JobSource>,
    ) -> Result<Self> {
        let cluster_cpus = cluster_cpu_count.ok_or_else(|| {
            PriorityError::MissingPrerequisite("cluster CPU count unknown".to_string())
        })?;

        if !config.accounting_storage_supported && config.weights.fs > 0 {
            warn!("accounting storage backend does not support fair-share; degrading weight_fs to 0");
            config.weights.fs = 0;
        }

        if config.weights.fs > 0 && tree.children_of(tree.root_id()).is_empty() {
            return Err(PriorityError::MissingPrerequisite(
                "weight_fs is set but no association data is loaded".to_string(),
            ));
        }

        config.cluster_cpus = cluster_cpus;

        let recovery = RecoveryStore::new(config.state_save_location.clone());
        let record = recovery.read();

        let jobs_snapshot = jobs.snapshot();
        let mut tree = tree;
        let mut qos = qos;
        crate::accountant::rewind_reservation(&mut tree, &mut qos, &jobs_snapshot, record.last_ran);

        let state = Arc::new(DecayState {
            tree: RwLock::new(tree),
            qos: RwLock::new(qos),
            jobs,
            recovery,
            config: RwLock::new(config),
            max_tickets: RwLock::new(0),
        });

        let mut loop_handle = DecayLoop::new(state.clone());
        loop_handle.start(record)?;
        info!("priority subsystem initialized");

        Ok(Self { state, loop_handle })
    }

    /// `fini()`: cancels and joins the decay loop.
    pub async fn fini(&mut self) {
        self.loop_handle.stop().await;
        info!("priority subsystem shut down");
    }

    fn mode(&self) -> FairShareMode {
        if self.state.config.read().flags.ticket_based {
            FairShareMode::Ticket
        } else {
            FairShareMode::Exponential
        }
    }

    /// `set(last_prio, job)`: recomputes one job's priority on demand
    /// (e.g. in response to an RPC), outside the tick cadence.
    pub fn set(&self, job: &mut Job, now: i64) -> u32 {
        let mode = self.mode();
        let config = self.state.config.read().clone();
        let mut tree = self.state.tree.write();
        let qos = self.state.qos.read();

        let fs_factor = if job.is_pending() {
            let max_tickets = *self.state.max_tickets.read();
            crate::fairshare::priority_fs_for_job(mode, &mut tree, job.assoc_id, max_tickets)
        } else {
            0.0
        };

        let qos_norm_priority = job.qos_id.and_then(|id| qos.get(id)).map(|q| q.norm_priority).unwrap_or(0.0);
        let partitions: Vec<(String, u32)> = job.partitions.iter().map(|p| (p.name.clone(), p.priority)).collect();
        let partition_max_priority = partitions.iter().map(|(_, p)| *p).max().unwrap_or(0);

        let inputs = CalculatorInputs {
            fs_factor,
            qos_norm_priority,
            partitions,
            partition_max_priority,
            node_count: config.node_count,
        };
        calculator::compute(&config, job, inputs, now)
    }

    /// `reconfig()`: signals the loop to reread config on its next tick.
    pub fn reconfig(&self, new_config: PriorityConfig) {
        *self.state.config.write() = new_config;
    }

    /// `set_assoc_usage(assoc)`.
    pub fn set_assoc_usage(&self, assoc_id: AssocId) {
        let mode = self.mode();
        self.state.tree.write().set_assoc_usage(assoc_id, mode);
    }

    /// `calc_fs_factor(usage_efctv, shares_norm)`.
    pub fn calc_fs_factor(&self, usage_efctv: f64, shares_norm: f64) -> f64 {
        crate::fairshare::calc_fs_factor(self.mode(), usage_efctv, shares_norm)
    }

    /// `get_priority_factors_list(req, uid)`.
    pub fn get_priority_factors_list(
        &self,
        req: &QueryRequest,
        requester: &Requester,
        now: i64,
    ) -> Vec<PrioFactors> {
        let config = self.state.config.read();
        let jobs = self.state.jobs.snapshot();
        query::get_factors(&config, &jobs, req, requester, now)
    }
}
