//! Fixed-timestep tick loop.
//!
//! Each tick:
//!
//! 1. Rebuild the execution plan if the system set changed.
//! 2. Run the plan wave by wave on the scheduler's worker pool.
//! 3. Log failures, sleep out the rest of the tick budget, advance.
//!
//! A system failure is logged and the loop keeps going; the failing system
//! is retried on the next tick. A plan that cannot be built at all stops the
//! loop, since no later tick could do any better.

use std::time::{Duration, Instant};

use anyhow::Context;
use engine_schedule::{CancelToken, Scheduler, TickContext, TickError, TickReport};
use tracing::{debug, error, info, warn};

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl TickConfig {
    /// Time budget of one tick.
    ///
    /// # Errors
    ///
    /// Fails if `tick_rate` is not positive, or so small that one tick would
    /// not fit in a [`Duration`].
    pub fn tick_duration(&self) -> anyhow::Result<Duration> {
        anyhow::ensure!(
            self.tick_rate.is_finite() && self.tick_rate > 0.0,
            "tick rate must be a positive number, got {}",
            self.tick_rate
        );
        Duration::try_from_secs_f64(1.0 / self.tick_rate)
            .with_context(|| format!("tick rate {} is too low", self.tick_rate))
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

/// Totals over a run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    /// Ticks in which at least one system failed.
    pub failed_ticks: u64,
    /// Ticks that ran over their time budget.
    pub overruns: u64,
}

/// The tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    /// Current tick counter.
    tick_id: u64,
    config: TickConfig,
    tick_duration: Duration,
    scheduler: Scheduler,
    cancel: CancelToken,
}

impl TickLoop {
    /// Create a new tick loop around `scheduler`.
    ///
    /// # Errors
    ///
    /// Fails if the configured tick rate has no usable tick duration.
    pub fn new(config: TickConfig, scheduler: Scheduler) -> anyhow::Result<Self> {
        let tick_duration = config.tick_duration()?;
        Ok(Self {
            tick_id: 0,
            config,
            tick_duration,
            scheduler,
            cancel: CancelToken::new(),
        })
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Mutable access for registering and unregistering systems between
    /// ticks.
    #[allow(dead_code)]
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// A token that stops the loop after the current wave.
    #[allow(dead_code)]
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Propagates the scheduler's [`TickError`]. The tick counter advances
    /// either way.
    pub fn tick(&mut self, dt: f64) -> Result<TickReport, TickError> {
        self.tick_id += 1;
        let ctx = TickContext::new(self.tick_id, dt);

        debug!(
            tick_id = self.tick_id,
            dt,
            waves = self.scheduler.current_plan().len(),
            "tick start"
        );

        self.scheduler.run_tick_cancellable(&ctx, &self.cancel)
    }

    /// Run the tick loop for the configured number of ticks, or until
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Build`] if the plan cannot be built. System
    /// failures are logged, not returned.
    pub fn run(&mut self) -> Result<TickStats, TickError> {
        let tick_duration = self.tick_duration;
        let mut stats = TickStats::default();

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            workers = self.scheduler.worker_count(),
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            let dt = tick_duration.as_secs_f64();
            match self.tick(dt) {
                Ok(report) if report.cancelled => {
                    info!(tick_id = self.tick_id, "tick loop cancelled");
                    break;
                }
                Ok(_) => {}
                Err(TickError::Execution(failure)) => {
                    stats.failed_ticks += 1;
                    for f in &failure.failures {
                        error!(
                            tick_id = self.tick_id,
                            system = %f.id,
                            name = %f.name,
                            wave = f.wave,
                            skipped = f.skipped.len(),
                            error = %f.error,
                            "system failed"
                        );
                    }
                    if failure.report.cancelled {
                        break;
                    }
                }
                Err(err @ TickError::Build(_)) => {
                    error!(tick_id = self.tick_id, %err, "cannot build execution plan, stopping");
                    return Err(err);
                }
            }

            stats.ticks += 1;
            if self.config.max_ticks > 0 && stats.ticks >= self.config.max_ticks {
                info!(ticks = stats.ticks, failed = stats.failed_ticks, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                stats.overruns += 1;
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }

        Ok(stats)
    }
}
