//! Parallel system scheduler for the ECS engine.
//!
//! Systems declare which component types they read and write. The
//! scheduler turns those declarations into an execution plan: a list of
//! waves in which no two members touch the same data in a conflicting way.
//! Each tick runs the waves in order, every wave fanned out across a worker
//! pool, with a barrier between waves.
//!
//! ```ignore
//! let mut scheduler = Scheduler::new(SchedulerConfig::default())?;
//! scheduler.register(
//!     SystemDescriptor::new("integrate", |ctx| Ok(()))
//!         .reads(velocity)
//!         .writes(position),
//! )?;
//! scheduler.run_tick(&TickContext::new(1, 1.0 / 60.0))?;
//! ```
//!
//! Pipeline, one module per stage:
//!
//! - [`table`]: registered descriptors, in registration order
//! - [`conflict`]: pairwise data conflicts
//! - [`graph`]: directed ordering constraints and cycle detection
//! - [`plan`]: wave assignment
//! - [`executor`]: running a plan on a [`pool`]

pub mod config;
pub mod conflict;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod graph;
pub mod plan;
pub mod pool;
pub mod profile;
pub mod scheduler;
pub mod table;
pub mod tag;

pub use config::SchedulerConfig;
pub use descriptor::{
    EntityAccess, ModuleId, SequenceTag, SystemBody, SystemDescriptor, SystemFn, SystemId,
    TickContext,
};
pub use error::{BuildError, RegistryError, SystemError, TickError};
pub use executor::{
    CancelToken, ExecutionFailure, OutcomeStatus, SystemFailure, SystemOutcome, TickReport,
};
pub use graph::{ConflictEdge, EdgeReason};
pub use plan::{ExecutionPlan, Wave};
pub use pool::{InlinePool, PoolError, ThreadPool, WorkerPool};
pub use profile::SystemProfiler;
pub use scheduler::Scheduler;
pub use tag::TagOrder;
