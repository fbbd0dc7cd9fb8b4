//! Per-system run time tracking.
//!
//! Workers record how long each system took straight from the worker
//! thread, so the store is a concurrent map. Each system keeps a rolling
//! window of its most recent samples; the first sample fills the whole
//! window so the average is meaningful from the first tick on.

use std::time::Duration;

use dashmap::DashMap;

use crate::config::MAX_PROFILE_SAMPLES;
use crate::descriptor::SystemId;

#[derive(Debug, Clone)]
struct Profile {
    window: Vec<Duration>,
    next: usize,
    last: Duration,
}

impl Profile {
    fn new(samples: usize, first: Duration) -> Self {
        Self {
            window: vec![first; samples],
            next: 0,
            last: first,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.window[self.next] = elapsed;
        self.next = (self.next + 1) % self.window.len();
        self.last = elapsed;
    }

    fn average(&self) -> Duration {
        let total: Duration = self.window.iter().sum();
        // The window is never empty and never longer than MAX_PROFILE_SAMPLES.
        total / self.window.len() as u32
    }
}

/// Rolling run time statistics for every system that has run.
#[derive(Debug)]
pub struct SystemProfiler {
    samples: usize,
    profiles: DashMap<SystemId, Profile>,
}

impl SystemProfiler {
    /// Create a profiler keeping `samples` samples per system, clamped to
    /// `1..=MAX_PROFILE_SAMPLES`.
    #[must_use]
    pub fn new(samples: usize) -> Self {
        Self {
            samples: samples.clamp(1, MAX_PROFILE_SAMPLES),
            profiles: DashMap::new(),
        }
    }

    /// Record one run of `id`. Safe to call from any thread.
    pub fn record(&self, id: SystemId, elapsed: Duration) {
        self.profiles
            .entry(id)
            .and_modify(|profile| profile.record(elapsed))
            .or_insert_with(|| Profile::new(self.samples, elapsed));
    }

    /// Average over the sample window.
    #[must_use]
    pub fn average(&self, id: SystemId) -> Option<Duration> {
        self.profiles.get(&id).map(|profile| profile.average())
    }

    /// Most recent sample.
    #[must_use]
    pub fn last(&self, id: SystemId) -> Option<Duration> {
        self.profiles.get(&id).map(|profile| profile.last)
    }

    /// Samples kept per system.
    #[must_use]
    pub fn window(&self) -> usize {
        self.samples
    }

    /// Drop the statistics of `id`.
    pub fn forget(&self, id: SystemId) {
        self.profiles.remove(&id);
    }

    /// Number of systems with statistics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const ID: SystemId = SystemId(1);

    #[test]
    fn test_first_sample_fills_window() {
        let profiler = SystemProfiler::new(4);
        profiler.record(ID, Duration::from_millis(8));
        assert_eq!(profiler.average(ID), Some(Duration::from_millis(8)));
        assert_eq!(profiler.last(ID), Some(Duration::from_millis(8)));
    }

    #[test]
    fn test_window_rolls() {
        let profiler = SystemProfiler::new(2);
        profiler.record(ID, Duration::from_millis(10));
        profiler.record(ID, Duration::from_millis(20));
        // Window: [20, 10]
        assert_eq!(profiler.average(ID), Some(Duration::from_millis(15)));
        profiler.record(ID, Duration::from_millis(30));
        // Window: [20, 30]
        assert_eq!(profiler.average(ID), Some(Duration::from_millis(25)));
        assert_eq!(profiler.last(ID), Some(Duration::from_millis(30)));
    }

    #[test]
    fn test_window_size_is_clamped() {
        assert_eq!(SystemProfiler::new(0).window(), 1);
        assert_eq!(SystemProfiler::new(usize::MAX).window(), MAX_PROFILE_SAMPLES);

        let profiler = SystemProfiler::new(usize::MAX);
        profiler.record(ID, Duration::from_millis(3));
        profiler.record(ID, Duration::from_millis(3));
        assert_eq!(profiler.average(ID), Some(Duration::from_millis(3)));
    }

    #[test]
    fn test_forget() {
        let profiler = SystemProfiler::new(4);
        profiler.record(ID, Duration::from_millis(1));
        profiler.forget(ID);
        assert!(profiler.is_empty());
        assert_eq!(profiler.average(ID), None);
    }

    #[test]
    fn test_concurrent_recording() {
        let profiler = Arc::new(SystemProfiler::new(16));
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let profiler = Arc::clone(&profiler);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        profiler.record(SystemId(t), Duration::from_micros(5));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(profiler.len(), 4);
        assert_eq!(profiler.average(SystemId(2)), Some(Duration::from_micros(5)));
    }
}
