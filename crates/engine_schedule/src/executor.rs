//! Tick execution — running a plan wave by wave.
//!
//! For each wave the executor hands every member to the worker pool and
//! then blocks the coordinating thread until all of them report back (the
//! wave barrier). Only then does the next wave start, so wave `i` fully
//! happens-before wave `i + 1`. A wave with a single runnable member skips
//! the pool and runs inline; members flagged `main_thread` always run
//! inline, alongside the pooled members of their wave.
//!
//! ## Failure policy
//!
//! A failing system never affects its wave siblings. A later system is
//! skipped when any of its direct predecessors failed or was skipped, which
//! amounts to "skip everything with a graph path from a failure". Systems
//! without such a path run normally.
//!
//! ## Cancellation
//!
//! A [`CancelToken`] is checked before each wave. Once it is set no further
//! wave starts; members already dispatched run to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::descriptor::{SystemId, TickContext};
use crate::error::SystemError;
use crate::plan::ExecutionPlan;
use crate::pool::{TaskError, UnitOfWork, WorkerPool, run_unit};
use crate::profile::SystemProfiler;

/// Cooperative cancellation flag for a running tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that no further wave is started.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another tick.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What happened to one system during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Ran and returned `Ok`.
    Completed,
    /// Ran and failed.
    Failed(SystemError),
    /// Not run because `blocked_by` failed upstream of it.
    Skipped { blocked_by: SystemId },
    /// Not run because the tick was cancelled before its wave.
    Cancelled,
}

/// Per-system entry of a [`TickReport`].
#[derive(Debug, Clone)]
pub struct SystemOutcome {
    pub id: SystemId,
    pub name: String,
    pub wave: usize,
    pub status: OutcomeStatus,
    /// Wall time of the run; `None` if it did not run or panicked.
    pub elapsed: Option<Duration>,
}

/// The result of one tick, in wave order.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick_id: u64,
    /// Generation of the plan that was executed.
    pub plan_generation: u64,
    pub outcomes: Vec<SystemOutcome>,
    /// Number of waves whose barrier was reached.
    pub waves_run: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl TickReport {
    /// Outcome of one system.
    #[must_use]
    pub fn outcome(&self, id: SystemId) -> Option<&SystemOutcome> {
        self.outcomes.iter().find(|outcome| outcome.id == id)
    }

    /// Systems that failed, in wave order.
    pub fn failed(&self) -> impl Iterator<Item = &SystemOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.status, OutcomeStatus::Failed(_)))
    }

    /// Number of systems that completed successfully.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == OutcomeStatus::Completed)
            .count()
    }

    /// Returns `true` if every system completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.completed_count() == self.outcomes.len()
    }

    /// Collect the failures with their wave context.
    #[must_use]
    pub fn failures(&self) -> Vec<SystemFailure> {
        self.failed()
            .filter_map(|outcome| {
                let OutcomeStatus::Failed(error) = &outcome.status else {
                    return None;
                };
                Some(SystemFailure {
                    id: outcome.id,
                    name: outcome.name.clone(),
                    wave: outcome.wave,
                    error: error.clone(),
                    siblings: self
                        .outcomes
                        .iter()
                        .filter(|o| o.wave == outcome.wave && o.id != outcome.id)
                        .map(|o| o.id)
                        .collect(),
                    skipped: self
                        .outcomes
                        .iter()
                        .filter(|o| o.status == OutcomeStatus::Skipped { blocked_by: outcome.id })
                        .map(|o| o.id)
                        .collect(),
                })
            })
            .collect()
    }
}

/// One failed system and what it affected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemFailure {
    pub id: SystemId,
    pub name: String,
    pub wave: usize,
    pub error: SystemError,
    /// Other members of the same wave (they were not affected).
    pub siblings: Vec<SystemId>,
    /// Later systems skipped because of this failure.
    pub skipped: Vec<SystemId>,
}

/// Aggregate error for a tick in which systems failed.
#[derive(Debug, thiserror::Error)]
#[error(
    "{} system(s) failed during tick {}: {}",
    .failures.len(),
    .report.tick_id,
    summarize(.failures)
)]
pub struct ExecutionFailure {
    pub failures: Vec<SystemFailure>,
    /// The full report, including the systems that did run.
    pub report: TickReport,
}

fn summarize(failures: &[SystemFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} `{}` in wave {}: {}", f.id, f.name, f.wave, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Drives one plan through one tick.
pub struct Executor<'a> {
    pool: &'a dyn WorkerPool,
    profiler: Arc<SystemProfiler>,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub fn new(pool: &'a dyn WorkerPool, profiler: Arc<SystemProfiler>) -> Self {
        Self { pool, profiler }
    }

    /// Execute every wave of `plan` for the tick described by `ctx`.
    pub fn execute(&self, plan: &ExecutionPlan, ctx: &TickContext, cancel: &CancelToken) -> TickReport {
        let started = Instant::now();
        let mut status: Vec<Option<OutcomeStatus>> = vec![None; plan.systems.len()];
        let mut elapsed: Vec<Option<Duration>> = vec![None; plan.systems.len()];
        let mut waves_run = 0;
        let mut cancelled = false;

        for (wave_idx, wave) in plan.waves.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(tick_id = ctx.tick_id, wave = wave_idx, "tick cancelled");
                cancelled = true;
                break;
            }

            let mut runnable = Vec::with_capacity(wave.nodes.len());
            for &node in &wave.nodes {
                let blocker = plan.systems[node]
                    .predecessors
                    .iter()
                    .find_map(|&pred| match &status[pred] {
                        Some(OutcomeStatus::Failed(_)) => Some(plan.systems[pred].id),
                        Some(OutcomeStatus::Skipped { blocked_by }) => Some(*blocked_by),
                        _ => None,
                    });
                match blocker {
                    Some(blocked_by) => status[node] = Some(OutcomeStatus::Skipped { blocked_by }),
                    None => runnable.push(node),
                }
            }

            debug!(
                tick_id = ctx.tick_id,
                wave = wave_idx,
                systems = runnable.len(),
                skipped = wave.nodes.len() - runnable.len(),
                "dispatching wave"
            );

            for (node, result) in self.dispatch(plan, &runnable, ctx) {
                let system = &plan.systems[node];
                elapsed[node] = self.profiler.last(system.id).filter(|_| {
                    !matches!(result, Err(TaskError::Panicked(_)))
                });
                status[node] = Some(match result {
                    Ok(()) => OutcomeStatus::Completed,
                    Err(err) => {
                        let error = system_error(err);
                        warn!(
                            tick_id = ctx.tick_id,
                            wave = wave_idx,
                            system = %system.id,
                            name = system.name,
                            %error,
                            "system failed"
                        );
                        OutcomeStatus::Failed(error)
                    }
                });
            }
            waves_run += 1;
        }

        let outcomes = plan
            .waves
            .iter()
            .enumerate()
            .flat_map(|(wave_idx, wave)| wave.nodes.iter().map(move |&node| (wave_idx, node)))
            .map(|(wave_idx, node)| SystemOutcome {
                id: plan.systems[node].id,
                name: plan.systems[node].name.clone(),
                wave: wave_idx,
                status: status[node].take().unwrap_or(OutcomeStatus::Cancelled),
                elapsed: elapsed[node],
            })
            .collect();

        TickReport {
            tick_id: ctx.tick_id,
            plan_generation: plan.generation,
            outcomes,
            waves_run,
            cancelled,
            elapsed: started.elapsed(),
        }
    }

    /// Run one wave's runnable members and wait for all of them.
    fn dispatch(
        &self,
        plan: &ExecutionPlan,
        runnable: &[usize],
        ctx: &TickContext,
    ) -> Vec<(usize, Result<(), TaskError>)> {
        if let [only] = runnable {
            return vec![(*only, run_unit(self.unit(plan, *only, ctx)))];
        }

        let (inline, pooled): (Vec<usize>, Vec<usize>) = runnable
            .iter()
            .partition(|&&node| plan.systems[node].main_thread);

        let handles = pooled
            .iter()
            .map(|&node| self.pool.submit(self.unit(plan, node, ctx)))
            .collect();

        let mut results: Vec<(usize, Result<(), TaskError>)> = inline
            .iter()
            .map(|&node| (node, run_unit(self.unit(plan, node, ctx))))
            .collect();

        // Barrier: every pooled member of this wave has finished past here.
        results.extend(pooled.into_iter().zip(self.pool.wait_all(handles)));
        results.sort_by_key(|&(node, _)| node);
        results
    }

    fn unit(&self, plan: &ExecutionPlan, node: usize, ctx: &TickContext) -> UnitOfWork {
        let system = &plan.systems[node];
        let id = system.id;
        let Some(body) = system.body.clone() else {
            let name = system.name.clone();
            return Box::new(move || -> anyhow::Result<()> {
                anyhow::bail!("system `{name}` was unregistered")
            });
        };
        let profiler = Arc::clone(&self.profiler);
        let ctx = *ctx;
        Box::new(move || {
            let start = Instant::now();
            let result = body.run(&ctx);
            profiler.record(id, start.elapsed());
            result
        })
    }
}

fn system_error(err: TaskError) -> SystemError {
    match err {
        TaskError::Failed(err) => SystemError::Failed(format!("{err:#}")),
        TaskError::Panicked(msg) => SystemError::Panicked(msg),
        TaskError::Disconnected => SystemError::Failed(TaskError::Disconnected.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use engine_component::ComponentTypeId;

    use super::*;
    use crate::descriptor::SystemDescriptor;
    use crate::pool::{InlinePool, ThreadPool};
    use crate::tag::TagOrder;

    const X: ComponentTypeId = ComponentTypeId(1);
    const Y: ComponentTypeId = ComponentTypeId(2);
    const Z: ComponentTypeId = ComponentTypeId(3);

    fn ok_system(id: u64) -> SystemDescriptor {
        SystemDescriptor::new(format!("s{id}"), |_: &TickContext| Ok(())).with_id(SystemId(id))
    }

    fn failing_system(id: u64) -> SystemDescriptor {
        SystemDescriptor::new(format!("s{id}"), |_: &TickContext| {
            Err(anyhow::anyhow!("out of ammo"))
        })
        .with_id(SystemId(id))
    }

    fn run(systems: &[SystemDescriptor], pool: &dyn WorkerPool) -> TickReport {
        let plan = ExecutionPlan::build(systems, &TagOrder::new(), 1).unwrap();
        let profiler = Arc::new(SystemProfiler::new(4));
        Executor::new(pool, profiler).execute(&plan, &TickContext::new(7, 0.016), &CancelToken::new())
    }

    #[test]
    fn test_all_systems_complete() {
        let systems = vec![ok_system(1).writes(X), ok_system(2).reads(X), ok_system(3).writes(Y)];
        let report = run(&systems, &InlinePool);
        assert!(report.is_success());
        assert_eq!(report.tick_id, 7);
        assert_eq!(report.waves_run, 2);
        assert!(!report.cancelled);
        assert!(report.outcomes.iter().all(|o| o.elapsed.is_some()));
    }

    #[test]
    fn test_failure_does_not_abort_siblings() {
        // Wave 0: 1 (fails) and 2 are independent.
        let systems = vec![failing_system(1).writes(X), ok_system(2).writes(Y)];
        let report = run(&systems, &InlinePool);
        assert_eq!(report.completed_count(), 1);
        assert_eq!(report.outcome(SystemId(2)).unwrap().status, OutcomeStatus::Completed);

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, SystemId(1));
        assert_eq!(failures[0].wave, 0);
        assert_eq!(failures[0].siblings, vec![SystemId(2)]);
        assert_eq!(
            failures[0].error,
            SystemError::Failed("out of ammo".to_string())
        );
    }

    #[test]
    fn test_failure_skips_dependents_only() {
        // 1 -> 2 -> 3 on X/Y, 4 -> 5 on Z; 1 fails.
        let systems = vec![
            failing_system(1).writes(X),
            ok_system(2).reads(X).writes(Y),
            ok_system(3).reads(Y),
            ok_system(4).writes(Z),
            ok_system(5).reads(Z),
        ];
        let report = run(&systems, &InlinePool);

        assert_eq!(
            report.outcome(SystemId(2)).unwrap().status,
            OutcomeStatus::Skipped { blocked_by: SystemId(1) }
        );
        assert_eq!(
            report.outcome(SystemId(3)).unwrap().status,
            OutcomeStatus::Skipped { blocked_by: SystemId(1) }
        );
        assert_eq!(report.outcome(SystemId(4)).unwrap().status, OutcomeStatus::Completed);
        assert_eq!(report.outcome(SystemId(5)).unwrap().status, OutcomeStatus::Completed);
        assert_eq!(report.failures()[0].skipped, vec![SystemId(2), SystemId(3)]);
    }

    #[test]
    fn test_panic_is_isolated() {
        let systems = vec![
            SystemDescriptor::new("panics", |_: &TickContext| -> anyhow::Result<()> {
                panic!("index out of bounds")
            })
            .writes(X)
            .with_id(SystemId(1)),
            ok_system(2).writes(Y),
        ];
        let pool = ThreadPool::new(2, "exec-test").unwrap();
        let report = run(&systems, &pool);
        let outcome = report.outcome(SystemId(1)).unwrap();
        assert_eq!(
            outcome.status,
            OutcomeStatus::Failed(SystemError::Panicked("index out of bounds".to_string()))
        );
        assert_eq!(outcome.elapsed, None);
        assert_eq!(report.outcome(SystemId(2)).unwrap().status, OutcomeStatus::Completed);
    }

    #[test]
    fn test_barrier_orders_waves() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |id: u64, delay_ms: u64| {
            let log = Arc::clone(&log);
            SystemDescriptor::new(format!("s{id}"), move |_: &TickContext| {
                std::thread::sleep(Duration::from_millis(delay_ms));
                log.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.push(id);
                Ok(())
            })
            .with_id(SystemId(id))
        };
        // Wave 0: 1 and 2 (slow) write X and Y; wave 1: 3 reads both.
        let systems = vec![
            make(1, 1).writes(X),
            make(2, 30).writes(Y),
            make(3, 0).reads(X).reads(Y),
        ];
        let pool = ThreadPool::new(4, "exec-test").unwrap();
        let report = run(&systems, &pool);
        assert!(report.is_success());
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2], 3, "wave 1 must start after wave 0 finished");
    }

    #[test]
    fn test_single_member_wave_runs_inline() {
        let caller = std::thread::current().id();
        let systems = vec![
            SystemDescriptor::new("solo", move |_: &TickContext| {
                anyhow::ensure!(std::thread::current().id() == caller, "ran off-thread");
                Ok(())
            })
            .with_id(SystemId(1)),
        ];
        let pool = ThreadPool::new(2, "exec-test").unwrap();
        assert!(run(&systems, &pool).is_success());
    }

    #[test]
    fn test_main_thread_member_runs_on_coordinator() {
        let caller = std::thread::current().id();
        let systems = vec![
            SystemDescriptor::new("ui", move |_: &TickContext| {
                anyhow::ensure!(std::thread::current().id() == caller, "ran off-thread");
                Ok(())
            })
            .main_thread()
            .with_id(SystemId(1)),
            ok_system(2),
            ok_system(3),
        ];
        let pool = ThreadPool::new(2, "exec-test").unwrap();
        let report = run(&systems, &pool);
        assert!(report.is_success(), "{report:?}");
    }

    #[test]
    fn test_cancel_between_waves() {
        let token = CancelToken::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let t = token.clone();
        let r = Arc::clone(&ran);
        let systems = vec![
            SystemDescriptor::new("first", move |_: &TickContext| {
                r.fetch_add(1, Ordering::SeqCst);
                t.cancel();
                Ok(())
            })
            .writes(X)
            .with_id(SystemId(1)),
            ok_system(2).reads(X),
        ];
        let plan = ExecutionPlan::build(&systems, &TagOrder::new(), 1).unwrap();
        let profiler = Arc::new(SystemProfiler::new(4));
        let report = Executor::new(&InlinePool, profiler).execute(&plan, &TickContext::new(1, 0.0), &token);

        assert!(report.cancelled);
        assert_eq!(report.waves_run, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(report.outcome(SystemId(2)).unwrap().status, OutcomeStatus::Cancelled);

        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_execution_failure_message() {
        let systems = vec![failing_system(4)];
        let report = run(&systems, &InlinePool);
        let failure = ExecutionFailure {
            failures: report.failures(),
            report,
        };
        assert_eq!(
            failure.to_string(),
            "1 system(s) failed during tick 7: System(4) `s4` in wave 0: system returned an error: out of ammo"
        );
    }
}
