//! Conflict graph — directed "must run before" edges between systems.
//!
//! Edges come from two sources:
//!
//! 1. **Data conflicts.** Each conflicting pair is directed by priority
//!    (higher runs first) and, on a tie, by registration order (earlier runs
//!    first).
//! 2. **Tag order.** Every system with tag `t1` gets an edge to every system
//!    with tag `t2` whenever `t1` precedes `t2`.
//!
//! Priority never creates an edge on its own and never overrides a tag
//! edge: if the tag order points against a data edge, the graph has a cycle
//! and the build fails. Duplicate edges collapse, keeping the first reason.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::error;

use crate::conflict::ConflictPair;
use crate::descriptor::{SequenceTag, SystemDescriptor, SystemId};
use crate::error::BuildError;
use crate::tag::TagOrder;

/// Why an edge exists, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeReason {
    /// Conflicting access, ordered by registration.
    DataConflict,
    /// Declared tag order.
    ExplicitTag,
    /// Conflicting access, ordered by differing priority.
    Priority,
}

/// A directed edge: `before` must finish before `after` starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConflictEdge {
    pub before: SystemId,
    pub after: SystemId,
    pub reason: EdgeReason,
}

/// An acyclic directed graph over the systems of one snapshot.
///
/// Nodes are snapshot indices, so node order is registration order.
#[derive(Debug, Clone)]
pub struct ConflictGraph {
    ids: Vec<SystemId>,
    edges: BTreeMap<(usize, usize), EdgeReason>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl ConflictGraph {
    /// Assemble the graph and reject it if it has a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::CyclicDependency`] naming every system on the
    /// first cycle found.
    pub fn build(
        systems: &[SystemDescriptor],
        conflicts: &[ConflictPair],
        tags: &TagOrder,
    ) -> Result<Self, BuildError> {
        let mut edges = BTreeMap::new();

        for pair in conflicts {
            let (a, b) = (&systems[pair.first], &systems[pair.second]);
            let edge = match a.priority().cmp(&b.priority()) {
                std::cmp::Ordering::Greater => ((pair.first, pair.second), EdgeReason::Priority),
                std::cmp::Ordering::Less => ((pair.second, pair.first), EdgeReason::Priority),
                std::cmp::Ordering::Equal => ((pair.first, pair.second), EdgeReason::DataConflict),
            };
            edges.entry(edge.0).or_insert(edge.1);
        }

        let mut groups: BTreeMap<SequenceTag, Vec<usize>> = BTreeMap::new();
        for (idx, system) in systems.iter().enumerate() {
            if let Some(tag) = system.tag() {
                groups.entry(tag).or_default().push(idx);
            }
        }
        for (&tag, members) in &groups {
            for later_tag in tags.reachable_from(tag) {
                let Some(later) = groups.get(&later_tag) else {
                    continue;
                };
                for &before in members {
                    for &after in later {
                        if before != after {
                            edges.entry((before, after)).or_insert(EdgeReason::ExplicitTag);
                        }
                    }
                }
            }
        }

        let n = systems.len();
        let mut successors = vec![Vec::new(); n];
        let mut predecessors = vec![Vec::new(); n];
        // BTreeMap iteration keeps both adjacency lists sorted.
        for &(before, after) in edges.keys() {
            successors[before].push(after);
            predecessors[after].push(before);
        }

        let graph = Self {
            ids: systems.iter().map(SystemDescriptor::id).collect(),
            edges,
            successors,
            predecessors,
        };

        if let Some(cycle) = graph.find_cycle() {
            let cycle: Vec<SystemId> = cycle.into_iter().map(|idx| graph.ids[idx]).collect();
            error!(?cycle, "conflict graph contains a cycle");
            return Err(BuildError::CyclicDependency { cycle });
        }
        Ok(graph)
    }

    /// Depth-first search with visiting/visited marks. Returns the node
    /// indices of the first cycle found, rotated to start at the smallest.
    fn find_cycle(&self) -> Option<Vec<usize>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            Visiting,
            Visited,
        }

        fn visit(
            node: usize,
            successors: &[Vec<usize>],
            marks: &mut [Mark],
            path: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            marks[node] = Mark::Visiting;
            path.push(node);
            for &next in &successors[node] {
                match marks[next] {
                    Mark::Visiting => {
                        let start = path.iter().position(|&n| n == next)?;
                        return Some(path[start..].to_vec());
                    }
                    Mark::Unvisited => {
                        if let Some(cycle) = visit(next, successors, marks, path) {
                            return Some(cycle);
                        }
                    }
                    Mark::Visited => {}
                }
            }
            path.pop();
            marks[node] = Mark::Visited;
            None
        }

        let mut marks = vec![Mark::Unvisited; self.ids.len()];
        let mut path = Vec::new();
        for node in 0..self.ids.len() {
            if marks[node] == Mark::Unvisited {
                if let Some(mut cycle) = visit(node, &self.successors, &mut marks, &mut path) {
                    let smallest = cycle
                        .iter()
                        .enumerate()
                        .min_by_key(|&(_, &n)| n)
                        .map_or(0, |(pos, _)| pos);
                    cycle.rotate_left(smallest);
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// System id of node `idx`.
    #[must_use]
    pub fn id(&self, idx: usize) -> SystemId {
        self.ids[idx]
    }

    /// Nodes that must run after `idx`, sorted.
    #[must_use]
    pub fn successors(&self, idx: usize) -> &[usize] {
        &self.successors[idx]
    }

    /// Nodes that must run before `idx`, sorted.
    #[must_use]
    pub fn predecessors(&self, idx: usize) -> &[usize] {
        &self.predecessors[idx]
    }

    /// Returns `true` if there is an edge `before -> after`.
    #[must_use]
    pub fn has_edge(&self, before: usize, after: usize) -> bool {
        self.edges.contains_key(&(before, after))
    }

    /// All edges as ids, ordered by (before, after) registration index.
    #[must_use]
    pub fn edges(&self) -> Vec<ConflictEdge> {
        self.edges
            .iter()
            .map(|(&(before, after), &reason)| ConflictEdge {
                before: self.ids[before],
                after: self.ids[after],
                reason,
            })
            .collect()
    }

    /// Systems reachable from `idx` by following edges, excluding `idx`.
    #[must_use]
    pub fn descendants(&self, idx: usize) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![idx];
        while let Some(node) = stack.pop() {
            for &next in &self.successors[node] {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use engine_component::ComponentTypeId;

    use super::*;
    use crate::conflict::extract_conflicts;
    use crate::descriptor::TickContext;

    const X: ComponentTypeId = ComponentTypeId(1);
    const T1: SequenceTag = SequenceTag(1);
    const T2: SequenceTag = SequenceTag(2);

    fn system(id: u64) -> SystemDescriptor {
        SystemDescriptor::new(format!("s{id}"), |_: &TickContext| Ok(())).with_id(SystemId(id))
    }

    fn build(systems: &[SystemDescriptor], tags: &TagOrder) -> Result<ConflictGraph, BuildError> {
        ConflictGraph::build(systems, &extract_conflicts(systems), tags)
    }

    #[test]
    fn test_write_write_follows_registration_order() {
        let systems = vec![system(1).writes(X), system(2).writes(X)];
        let graph = build(&systems, &TagOrder::new()).unwrap();
        assert_eq!(
            graph.edges(),
            vec![ConflictEdge {
                before: SystemId(1),
                after: SystemId(2),
                reason: EdgeReason::DataConflict,
            }]
        );
    }

    #[test]
    fn test_higher_priority_runs_first() {
        let systems = vec![system(1).writes(X), system(2).writes(X).with_priority(10)];
        let graph = build(&systems, &TagOrder::new()).unwrap();
        assert!(graph.has_edge(1, 0));
        assert!(!graph.has_edge(0, 1));
        assert_eq!(graph.edges()[0].reason, EdgeReason::Priority);
    }

    #[test]
    fn test_priority_alone_adds_no_edge() {
        let systems = vec![
            system(1).writes(X),
            system(2).writes(ComponentTypeId(2)).with_priority(10),
        ];
        let graph = build(&systems, &TagOrder::new()).unwrap();
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_tag_edges_between_groups() {
        let systems = vec![
            system(1).with_tag(T2),
            system(2).with_tag(T1),
            system(3).with_tag(T1),
        ];
        let graph = build(&systems, &TagOrder::new().before(T1, T2)).unwrap();
        assert_eq!(graph.predecessors(0), &[1, 2]);
        // Systems sharing a tag stay unordered.
        assert!(!graph.has_edge(1, 2));
        assert!(!graph.has_edge(2, 1));
        assert!(graph.edges().iter().all(|e| e.reason == EdgeReason::ExplicitTag));
    }

    #[test]
    fn test_tag_order_against_data_order_is_a_cycle() {
        let systems = vec![
            system(1).writes(X).with_tag(T1),
            system(2).reads(X).with_tag(T2),
        ];
        let err = build(&systems, &TagOrder::new().before(T2, T1)).unwrap_err();
        assert_eq!(
            err,
            BuildError::CyclicDependency {
                cycle: vec![SystemId(1), SystemId(2)]
            }
        );
    }

    #[test]
    fn test_priority_does_not_override_tag_order() {
        // Data says "2 first" by priority, tags say "1 first": a cycle.
        let systems = vec![
            system(1).writes(X).with_tag(T1),
            system(2).writes(X).with_tag(T2).with_priority(5),
        ];
        assert!(build(&systems, &TagOrder::new().before(T1, T2)).is_err());
    }

    #[test]
    fn test_cycle_lists_exactly_its_members() {
        // 1 -> 2 (data), 2 -> 3 (tag), 3 -> 2 (tag) ; 4 hangs off the side.
        let t3 = SequenceTag(3);
        let systems = vec![
            system(1).writes(X),
            system(2).reads(X).with_tag(T1),
            system(3).with_tag(t3),
            system(4).reads(X),
        ];
        let tags = TagOrder::new().before(T1, t3).before(t3, T1);
        let err = build(&systems, &tags).unwrap_err();
        assert_eq!(
            err,
            BuildError::CyclicDependency {
                cycle: vec![SystemId(2), SystemId(3)]
            }
        );
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let systems = vec![system(1).writes(X).with_tag(T1), system(2).reads(X).with_tag(T2)];
        let graph = build(&systems, &TagOrder::new().before(T1, T2)).unwrap();
        let edges = graph.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].reason, EdgeReason::DataConflict);
    }

    #[test]
    fn test_descendants() {
        let systems = vec![
            system(1).writes(X),
            system(2).reads(X).writes(ComponentTypeId(2)),
            system(3).reads(ComponentTypeId(2)),
            system(4).writes(ComponentTypeId(9)),
        ];
        let graph = build(&systems, &TagOrder::new()).unwrap();
        assert_eq!(graph.descendants(0), BTreeSet::from([1, 2]));
        assert!(graph.descendants(3).is_empty());
    }
}
