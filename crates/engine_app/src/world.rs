//! Demo world state shared by the demo systems.
//!
//! Every component type is one column behind its own lock. Systems lock
//! only the columns their descriptors declare, so the scheduler's conflict
//! rules are what keep two writers of the same column out of the same wave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use engine_component::Component;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity {
    pub dx: f64,
    pub dy: f64,
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health(pub f64);

impl Component for Health {
    fn type_name() -> &'static str {
        "Health"
    }
}

/// Name of the frame counter resource.
pub const FRAME_COUNTER: &str = "FrameCounter";

/// One locked column.
#[derive(Debug)]
pub struct Column<T>(RwLock<Vec<T>>);

impl<T> Column<T> {
    fn new(values: Vec<T>) -> Self {
        Self(RwLock::new(values))
    }

    /// Shared access. A poisoned column is still readable.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Struct-of-arrays world, indexed by entity.
#[derive(Debug)]
pub struct World {
    pub positions: Column<Position>,
    pub velocities: Column<Velocity>,
    pub health: Column<Health>,
    frames: AtomicU64,
}

impl World {
    /// Spawn `count` entities with deterministic starting values.
    #[must_use]
    pub fn with_entities(count: usize) -> Arc<Self> {
        let velocities = (0..count)
            .map(|i| Velocity {
                dx: 1.0 + i as f64,
                dy: 0.5,
            })
            .collect();
        Arc::new(Self {
            positions: Column::new(vec![Position::default(); count]),
            velocities: Column::new(velocities),
            health: Column::new(vec![Health(100.0); count]),
            frames: AtomicU64::new(0),
        })
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.read().len()
    }

    pub fn count_frame(&self) -> u64 {
        self.frames.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}
