//! Scheduler configuration.

/// Default number of run time samples kept per system.
pub const DEFAULT_PROFILE_SAMPLES: usize = 16;

/// Upper bound on the profiling window. Larger requests are clamped.
pub const MAX_PROFILE_SAMPLES: usize = 1024;

/// Default worker thread name prefix.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "ecs-worker";

/// Configuration for a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Worker threads in the pool. `0` runs everything on the calling
    /// thread.
    pub worker_threads: usize,
    /// Run time samples kept per system for averaging, clamped to
    /// `1..=MAX_PROFILE_SAMPLES`.
    pub profile_samples: usize,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        // Leave one core for the coordinating thread.
        let cores = std::thread::available_parallelism().map_or(1, usize::from);
        Self {
            worker_threads: cores.saturating_sub(1).max(1),
            profile_samples: DEFAULT_PROFILE_SAMPLES,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Override the worker thread count.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Override the profiling window.
    #[must_use]
    pub fn with_profile_samples(mut self, samples: usize) -> Self {
        self.profile_samples = samples;
        self
    }

    /// Override the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}
