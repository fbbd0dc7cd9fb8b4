//! The scheduler facade.
//!
//! [`Scheduler`] owns all scheduler state: the descriptor table, the tag
//! order, the cached plan, the worker pool, and the profiler. There is no
//! global instance; whoever owns the simulation owns its scheduler.
//!
//! Registration marks the plan dirty; the next tick (or an explicit
//! [`Scheduler::prepare`]) rebuilds it. A failed rebuild leaves the previous
//! plan in place and the table dirty, so every later tick retries until the
//! registration set is fixed. Because every mutating method takes
//! `&mut self`, registration can never overlap a running tick.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::descriptor::{ModuleId, SystemDescriptor, SystemId, TickContext};
use crate::error::{BuildError, RegistryError, TickError};
use crate::executor::{CancelToken, ExecutionFailure, Executor, TickReport};
use crate::plan::{ExecutionPlan, Wave};
use crate::pool::{InlinePool, PoolError, ThreadPool, WorkerPool};
use crate::profile::SystemProfiler;
use crate::table::DescriptorTable;
use crate::tag::TagOrder;

/// Parallel system scheduler.
pub struct Scheduler {
    table: DescriptorTable,
    tags: TagOrder,
    /// The last successfully built plan.
    plan: ExecutionPlan,
    /// Whether the table or tag order changed since `plan` was built.
    dirty: bool,
    pool: Box<dyn WorkerPool>,
    profiler: Arc<SystemProfiler>,
}

impl Scheduler {
    /// Create a scheduler with its own worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] if the worker threads cannot be started.
    pub fn new(config: SchedulerConfig) -> Result<Self, PoolError> {
        let pool: Box<dyn WorkerPool> = if config.worker_threads == 0 {
            Box::new(InlinePool)
        } else {
            Box::new(ThreadPool::new(
                config.worker_threads,
                &config.thread_name_prefix,
            )?)
        };
        info!(workers = pool.worker_count(), "scheduler created");
        Ok(Self::with_pool(&config, pool))
    }

    /// Create a scheduler on top of an existing pool.
    #[must_use]
    pub fn with_pool(config: &SchedulerConfig, pool: Box<dyn WorkerPool>) -> Self {
        Self {
            table: DescriptorTable::new(),
            tags: TagOrder::new(),
            plan: ExecutionPlan::empty(),
            dirty: true,
            pool,
            profiler: Arc::new(SystemProfiler::new(config.profile_samples)),
        }
    }

    /// Create a scheduler that runs every system on the calling thread.
    #[must_use]
    pub fn inline() -> Self {
        Self::with_pool(&SchedulerConfig::default(), Box::new(InlinePool))
    }

    /// Register a system and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if the descriptor requests an
    /// id that is already registered.
    pub fn register(&mut self, descriptor: SystemDescriptor) -> Result<SystemId, RegistryError> {
        let name = descriptor.name().to_string();
        let id = self.table.register(descriptor)?;
        self.dirty = true;
        debug!(system = %id, name, "system registered");
        Ok(id)
    }

    /// Remove a system.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownSystem`] if no such system exists.
    pub fn unregister(&mut self, id: SystemId) -> Result<(), RegistryError> {
        let descriptor = self.table.unregister(id)?;
        self.plan.release(id);
        self.profiler.forget(id);
        self.dirty = true;
        debug!(system = %id, name = descriptor.name(), "system unregistered");
        Ok(())
    }

    /// Remove every system owned by `module` and return their ids.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownModule`] if the module owns nothing.
    pub fn unregister_module(&mut self, module: ModuleId) -> Result<Vec<SystemId>, RegistryError> {
        let removed = self.table.unregister_module(module)?;
        for &id in &removed {
            self.plan.release(id);
            self.profiler.forget(id);
        }
        self.dirty = true;
        info!(%module, systems = removed.len(), "module systems unregistered");
        Ok(removed)
    }

    /// Replace the tag order.
    pub fn set_tag_order(&mut self, order: TagOrder) {
        if order != self.tags {
            self.tags = order;
            self.dirty = true;
        }
    }

    #[must_use]
    pub fn tag_order(&self) -> &TagOrder {
        &self.tags
    }

    #[must_use]
    pub fn contains(&self, id: SystemId) -> bool {
        self.table.contains(id)
    }

    #[must_use]
    pub fn descriptor(&self, id: SystemId) -> Option<&SystemDescriptor> {
        self.table.get(id)
    }

    /// Ids of the systems owned by `module`, in registration order.
    #[must_use]
    pub fn systems_of(&self, module: ModuleId) -> Vec<SystemId> {
        self.table.systems_of(module)
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns `true` if the cached plan is out of date.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The waves of the cached plan. Does not rebuild.
    #[must_use]
    pub fn current_plan(&self) -> &[Wave] {
        self.plan.waves()
    }

    /// The cached plan. Does not rebuild.
    #[must_use]
    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Rebuild the plan if anything changed since the last build.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::CyclicDependency`]; the previous plan is kept.
    pub fn prepare(&mut self) -> Result<&ExecutionPlan, BuildError> {
        if self.dirty {
            self.rebuild()
        } else {
            Ok(&self.plan)
        }
    }

    /// Rebuild the plan unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::CyclicDependency`]; the previous plan is kept.
    pub fn rebuild(&mut self) -> Result<&ExecutionPlan, BuildError> {
        let snapshot = self.table.snapshot();
        let generation = self.plan.generation + 1;
        match ExecutionPlan::build(&snapshot, &self.tags, generation) {
            Ok(plan) => {
                info!(
                    generation,
                    waves = plan.waves().len(),
                    systems = plan.system_count(),
                    edges = plan.edges().len(),
                    "rebuilt execution plan"
                );
                self.plan = plan;
                self.dirty = false;
                Ok(&self.plan)
            }
            Err(err) => {
                error!(%err, kept_generation = self.plan.generation, "plan rebuild failed");
                Err(err)
            }
        }
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// - [`TickError::Build`] if the plan needed a rebuild and it failed;
    ///   nothing ran.
    /// - [`TickError::Execution`] if any system failed; the report inside
    ///   says what ran, what failed, and what was skipped.
    pub fn run_tick(&mut self, ctx: &TickContext) -> Result<TickReport, TickError> {
        self.run_tick_cancellable(ctx, &CancelToken::new())
    }

    /// Run one tick, checking `cancel` before each wave.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::run_tick`]. Cancellation itself is not an error.
    pub fn run_tick_cancellable(
        &mut self,
        ctx: &TickContext,
        cancel: &CancelToken,
    ) -> Result<TickReport, TickError> {
        self.prepare()?;

        let executor = Executor::new(self.pool.as_ref(), Arc::clone(&self.profiler));
        let report = executor.execute(&self.plan, ctx, cancel);

        debug!(
            tick_id = ctx.tick_id,
            waves = report.waves_run,
            completed = report.completed_count(),
            cancelled = report.cancelled,
            elapsed_us = report.elapsed.as_micros() as u64,
            "tick complete"
        );

        let failures = report.failures();
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(TickError::Execution(ExecutionFailure { failures, report }))
        }
    }

    /// Average run time of a system over the profiling window.
    #[must_use]
    pub fn average_runtime(&self, id: SystemId) -> Option<Duration> {
        self.profiler.average(id)
    }

    #[must_use]
    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    /// Number of pool workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("systems", &self.table.len())
            .field("generation", &self.plan.generation)
            .field("dirty", &self.dirty)
            .field("workers", &self.pool.worker_count())
            .finish_non_exhaustive()
    }
}
