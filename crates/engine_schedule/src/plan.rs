//! Wave planning — turning the conflict graph into an execution plan.
//!
//! The planner is a layered topological sort (Kahn's algorithm taken one
//! whole layer at a time), peeled from the sinks: every system whose
//! successors have all been placed goes into the wave before them. Each
//! system therefore sits in the latest wave its edges allow, independent
//! systems join the final wave, and the wave count equals the longest chain
//! of edges. Since every conflicting pair is joined by an edge, no wave
//! holds two conflicting systems.

use std::collections::HashMap;

use serde::Serialize;

use crate::conflict::extract_conflicts;
use crate::descriptor::{SystemDescriptor, SystemFn, SystemId};
use crate::error::BuildError;
use crate::graph::{ConflictEdge, ConflictGraph};
use crate::tag::TagOrder;

/// A set of systems that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wave {
    /// Member ids in registration order.
    pub members: Vec<SystemId>,
    /// Member positions in [`ExecutionPlan::systems`], parallel to `members`.
    #[serde(skip)]
    pub(crate) nodes: Vec<usize>,
}

impl Wave {
    /// Member ids in registration order.
    #[must_use]
    pub fn members(&self) -> &[SystemId] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: SystemId) -> bool {
        self.members.contains(&id)
    }
}

/// A system as the executor sees it.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedSystem {
    pub id: SystemId,
    pub name: String,
    /// Index of the wave the system runs in.
    pub wave: usize,
    pub main_thread: bool,
    /// Positions in [`ExecutionPlan::systems`] of direct predecessors.
    #[serde(skip)]
    pub(crate) predecessors: Vec<usize>,
    /// `None` once the system has been unregistered.
    #[serde(skip)]
    pub(crate) body: Option<SystemFn>,
}

/// Ordered waves covering every registered system exactly once.
///
/// Plans are immutable; a registration change produces a new plan with a
/// higher generation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    /// Incremented by the scheduler on every successful rebuild.
    pub generation: u64,
    pub waves: Vec<Wave>,
    /// Systems in registration order.
    pub systems: Vec<PlannedSystem>,
    /// Ordering edges, kept for diagnostics.
    pub edges: Vec<ConflictEdge>,
    #[serde(skip)]
    positions: HashMap<SystemId, usize>,
}

impl ExecutionPlan {
    /// An empty plan, used before the first rebuild.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            generation: 0,
            waves: Vec::new(),
            systems: Vec::new(),
            edges: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Run the full pipeline: extract conflicts, build and check the graph,
    /// plan waves.
    ///
    /// `systems` must be in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::CyclicDependency`] if the ordering constraints
    /// cannot be satisfied.
    pub fn build(
        systems: &[SystemDescriptor],
        tags: &TagOrder,
        generation: u64,
    ) -> Result<Self, BuildError> {
        let conflicts = extract_conflicts(systems);
        let graph = ConflictGraph::build(systems, &conflicts, tags)?;
        let layers = plan_waves(&graph);

        let mut planned: Vec<PlannedSystem> = systems
            .iter()
            .enumerate()
            .map(|(idx, desc)| PlannedSystem {
                id: desc.id(),
                name: desc.name().to_string(),
                wave: 0,
                main_thread: desc.is_main_thread(),
                predecessors: graph.predecessors(idx).to_vec(),
                body: Some(desc.body().clone()),
            })
            .collect();

        let waves = layers
            .into_iter()
            .enumerate()
            .map(|(wave_idx, nodes)| {
                for &node in &nodes {
                    planned[node].wave = wave_idx;
                }
                Wave {
                    members: nodes.iter().map(|&node| graph.id(node)).collect(),
                    nodes,
                }
            })
            .collect();

        let positions = planned
            .iter()
            .enumerate()
            .map(|(pos, sys)| (sys.id, pos))
            .collect();

        Ok(Self {
            generation,
            waves,
            systems: planned,
            edges: graph.edges(),
            positions,
        })
    }

    /// The waves in execution order.
    #[must_use]
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Ordering edges with their reasons.
    #[must_use]
    pub fn edges(&self) -> &[ConflictEdge] {
        &self.edges
    }

    /// Index of the wave `id` runs in.
    #[must_use]
    pub fn wave_of(&self, id: SystemId) -> Option<usize> {
        self.positions.get(&id).map(|&pos| self.systems[pos].wave)
    }

    /// The planned entry for `id`.
    #[must_use]
    pub fn system(&self, id: SystemId) -> Option<&PlannedSystem> {
        self.positions.get(&id).map(|&pos| &self.systems[pos])
    }

    /// Number of systems covered.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Drop the body of `id`, releasing whatever it captured. The wave
    /// layout is kept for inspection. Returns `true` if a body was held.
    pub(crate) fn release(&mut self, id: SystemId) -> bool {
        self.positions
            .get(&id)
            .and_then(|&pos| self.systems[pos].body.take())
            .is_some()
    }

    /// Returns `true` if the plan still holds the body of `id`.
    #[must_use]
    pub fn holds_body(&self, id: SystemId) -> bool {
        self.system(id).is_some_and(|sys| sys.body.is_some())
    }

    /// Wave membership as plain id lists, convenient for comparisons.
    #[must_use]
    pub fn wave_ids(&self) -> Vec<Vec<SystemId>> {
        self.waves.iter().map(|wave| wave.members.clone()).collect()
    }
}

/// Layered topological sort of an acyclic graph.
///
/// Each returned layer lists node indices in ascending (registration) order.
#[must_use]
pub fn plan_waves(graph: &ConflictGraph) -> Vec<Vec<usize>> {
    let mut out_degree: Vec<usize> = (0..graph.len())
        .map(|idx| graph.successors(idx).len())
        .collect();
    let mut current: Vec<usize> = (0..graph.len()).filter(|&idx| out_degree[idx] == 0).collect();
    let mut layers = Vec::new();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &node in &current {
            for &pred in graph.predecessors(node) {
                out_degree[pred] -= 1;
                if out_degree[pred] == 0 {
                    next.push(pred);
                }
            }
        }
        next.sort_unstable();
        layers.push(std::mem::replace(&mut current, next));
    }

    layers.reverse();
    layers
}
