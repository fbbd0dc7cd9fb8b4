//! Worker pools: where system bodies actually run.
//!
//! The executor only needs two operations: hand a unit of work to the pool
//! and get a handle back, then block on a batch of handles. [`ThreadPool`]
//! does this with a fixed set of named threads fed through a `crossbeam`
//! channel; [`InlinePool`] runs each unit immediately on the caller, which
//! keeps tests deterministic and suits single-core targets.
//!
//! Panics are caught at the unit-of-work boundary, so a misbehaving system
//! never takes a worker thread down with it.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

/// A unit of work: one system invocation, already bound to its context.
pub type UnitOfWork = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Why a unit of work did not complete successfully.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The unit returned an error.
    #[error("{0:#}")]
    Failed(anyhow::Error),

    /// The unit panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The pool went away before reporting a result.
    #[error("worker pool shut down before the task completed")]
    Disconnected,
}

/// Errors creating a pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Completion handle for a submitted unit of work.
#[derive(Debug)]
pub struct TaskHandle {
    result: Receiver<Result<(), TaskError>>,
}

impl TaskHandle {
    /// A handle that is already complete.
    #[must_use]
    pub fn ready(result: Result<(), TaskError>) -> Self {
        let (tx, rx) = channel::bounded(1);
        // The receiver is alive, so the send cannot fail.
        let _ = tx.send(result);
        Self { result: rx }
    }

    /// Block until the unit has finished and return its result.
    ///
    /// # Errors
    ///
    /// Returns the unit's [`TaskError`], or [`TaskError::Disconnected`] if
    /// the pool dropped the unit.
    pub fn wait(self) -> Result<(), TaskError> {
        self.result.recv().unwrap_or(Err(TaskError::Disconnected))
    }
}

/// A fixed set of workers consuming units of work.
pub trait WorkerPool: Send + Sync {
    /// Queue a unit of work.
    fn submit(&self, unit: UnitOfWork) -> TaskHandle;

    /// Block until every handle has completed; results come back in the
    /// same order as the handles.
    fn wait_all(&self, handles: Vec<TaskHandle>) -> Vec<Result<(), TaskError>> {
        handles.into_iter().map(TaskHandle::wait).collect()
    }

    /// Number of units that can run at the same time.
    fn worker_count(&self) -> usize;
}

/// Run a unit of work, converting panics into [`TaskError::Panicked`].
///
/// # Errors
///
/// Returns [`TaskError::Failed`] or [`TaskError::Panicked`].
pub fn run_unit(unit: UnitOfWork) -> Result<(), TaskError> {
    match catch_unwind(AssertUnwindSafe(unit)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TaskError::Failed(err)),
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs every unit on the submitting thread, before `submit` returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlinePool;

impl WorkerPool for InlinePool {
    fn submit(&self, unit: UnitOfWork) -> TaskHandle {
        TaskHandle::ready(run_unit(unit))
    }

    fn worker_count(&self) -> usize {
        1
    }
}

struct Job {
    unit: UnitOfWork,
    reply: Sender<Result<(), TaskError>>,
}

/// A fixed-size pool of named worker threads.
///
/// Dropping the pool closes the queue and joins every worker; units already
/// queued still run.
#[derive(Debug)]
pub struct ThreadPool {
    queue: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Start `threads` workers named `{name_prefix}-{index}`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a thread cannot be started; workers
    /// started so far are shut down.
    pub fn new(threads: usize, name_prefix: &str) -> Result<Self, PoolError> {
        let (tx, rx) = channel::unbounded::<Job>();
        let mut pool = Self {
            queue: Some(tx),
            workers: Vec::with_capacity(threads),
        };

        for index in 0..threads.max(1) {
            let rx = rx.clone();
            let name = format!("{name_prefix}-{index}");
            let handle = std::thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(&rx))?;
            pool.workers.push(handle);
        }

        debug!(workers = pool.workers.len(), "worker pool started");
        Ok(pool)
    }
}

fn worker_loop(queue: &Receiver<Job>) {
    while let Ok(job) = queue.recv() {
        let result = run_unit(job.unit);
        // The submitter may have stopped waiting; nothing to do then.
        let _ = job.reply.send(result);
    }
}

impl WorkerPool for ThreadPool {
    fn submit(&self, unit: UnitOfWork) -> TaskHandle {
        let (reply, result) = channel::bounded(1);
        let Some(queue) = &self.queue else {
            return TaskHandle::ready(Err(TaskError::Disconnected));
        };
        if queue.send(Job { unit, reply }).is_err() {
            return TaskHandle::ready(Err(TaskError::Disconnected));
        }
        TaskHandle { result }
    }

    fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the queue ends each worker's receive loop.
        self.queue.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("worker thread exited with a panic");
            }
        }
        debug!("worker pool shut down");
    }
}
