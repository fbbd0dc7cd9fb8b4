//! Scheduler error types.
//!
//! Errors are split by the phase that raises them: registration
//! ([`RegistryError`]), plan construction ([`BuildError`]), and tick
//! execution ([`SystemError`], [`TickError`]).

use std::fmt;

use crate::descriptor::{ModuleId, SystemId};
use crate::executor::ExecutionFailure;

/// Registration-time errors. The table is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The requested id is already registered.
    #[error("system id {0} is already registered")]
    DuplicateId(SystemId),

    /// No system with this id is registered.
    #[error("unknown system {0}")]
    UnknownSystem(SystemId),

    /// No registered system is owned by this module.
    #[error("module {0} owns no registered systems")]
    UnknownModule(ModuleId),
}

/// Plan construction errors. The previous plan stays in effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The ordering constraints form a cycle through these systems, listed
    /// in edge order starting from the earliest registered member.
    #[error("cyclic dependency between systems: {}", CycleDisplay(.cycle))]
    CyclicDependency {
        /// Every system on the cycle.
        cycle: Vec<SystemId>,
    },
}

struct CycleDisplay<'a>(&'a [SystemId]);

impl fmt::Display for CycleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{id}")?;
        }
        if let Some(first) = self.0.first() {
            write!(f, " -> {first}")?;
        }
        Ok(())
    }
}

/// Why one system failed during a tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SystemError {
    /// The body returned an error (rendered with its cause chain).
    #[error("system returned an error: {0}")]
    Failed(String),

    /// The body panicked.
    #[error("system panicked: {0}")]
    Panicked(String),
}

/// Errors returned by [`Scheduler::run_tick`](crate::Scheduler::run_tick).
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The plan could not be rebuilt; nothing was executed.
    #[error("failed to build execution plan: {0}")]
    Build(#[from] BuildError),

    /// One or more systems failed.
    #[error("{0}")]
    Execution(ExecutionFailure),
}
