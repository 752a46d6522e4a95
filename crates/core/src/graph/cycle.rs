//! Searching strongly connected components for cycles of a given shape.
//!
//! Each cycle anomaly is described declaratively by a [`CycleSpec`]: which
//! relations its edges may use, which relation the search starts from, and
//! how many edges of certain relations it must (or may) contain. The search
//! is a breadth-first walk over `(vertex, counts)` states, so it finds a
//! shortest cycle that meets the counts.

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use super::digraph::DiGraph;
use super::rel::Rel;
use crate::anomaly::AnomalyType;
use crate::history::types::OpId;

/// Bounds on how many edges of `rel` a cycle contains. `max: None` is
/// unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count {
    pub rel: Rel,
    pub min: u8,
    pub max: Option<u8>,
}

const fn at_least(rel: Rel, min: u8) -> Count {
    Count {
        rel,
        min,
        max: None,
    }
}

const fn exactly(rel: Rel, n: u8) -> Count {
    Count {
        rel,
        min: n,
        max: Some(n),
    }
}

/// The shape of one cycle anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSpec {
    pub anomaly: AnomalyType,
    /// Relations the cycle's edges may use.
    pub rels: &'static [Rel],
    /// Every cycle of this shape contains an edge of this relation; the
    /// search starts from those edges.
    pub start: Rel,
    /// At most two count constraints.
    pub counts: &'static [Count],
}

const G0_RELS: &[Rel] = &[Rel::WW];
const G1C_RELS: &[Rel] = &[Rel::WW, Rel::WR];
const G2_RELS: &[Rel] = &[Rel::WW, Rel::WR, Rel::RW];
const G0_PROCESS_RELS: &[Rel] = &[Rel::WW, Rel::Process];
const G1C_PROCESS_RELS: &[Rel] = &[Rel::WW, Rel::WR, Rel::Process];
const G2_PROCESS_RELS: &[Rel] = &[Rel::WW, Rel::WR, Rel::RW, Rel::Process];
const G0_REALTIME_RELS: &[Rel] = &[Rel::WW, Rel::Process, Rel::Realtime];
const G1C_REALTIME_RELS: &[Rel] = &[Rel::WW, Rel::WR, Rel::Process, Rel::Realtime];
const G2_REALTIME_RELS: &[Rel] = &[Rel::WW, Rel::WR, Rel::RW, Rel::Process, Rel::Realtime];

/// Every cycle anomaly, in classification order.
pub const CYCLE_SPECS: [CycleSpec; 12] = [
    CycleSpec {
        anomaly: AnomalyType::G0,
        rels: G0_RELS,
        start: Rel::WW,
        counts: &[],
    },
    CycleSpec {
        anomaly: AnomalyType::G1c,
        rels: G1C_RELS,
        start: Rel::WR,
        counts: &[at_least(Rel::WR, 1)],
    },
    CycleSpec {
        anomaly: AnomalyType::GSingle,
        rels: G2_RELS,
        start: Rel::RW,
        counts: &[exactly(Rel::RW, 1)],
    },
    CycleSpec {
        anomaly: AnomalyType::G2Item,
        rels: G2_RELS,
        start: Rel::RW,
        counts: &[at_least(Rel::RW, 2)],
    },
    CycleSpec {
        anomaly: AnomalyType::G0Process,
        rels: G0_PROCESS_RELS,
        start: Rel::Process,
        counts: &[at_least(Rel::Process, 1)],
    },
    CycleSpec {
        anomaly: AnomalyType::G1cProcess,
        rels: G1C_PROCESS_RELS,
        start: Rel::Process,
        counts: &[at_least(Rel::Process, 1), at_least(Rel::WR, 1)],
    },
    CycleSpec {
        anomaly: AnomalyType::GSingleProcess,
        rels: G2_PROCESS_RELS,
        start: Rel::Process,
        counts: &[at_least(Rel::Process, 1), exactly(Rel::RW, 1)],
    },
    CycleSpec {
        anomaly: AnomalyType::G2ItemProcess,
        rels: G2_PROCESS_RELS,
        start: Rel::Process,
        counts: &[at_least(Rel::Process, 1), at_least(Rel::RW, 2)],
    },
    CycleSpec {
        anomaly: AnomalyType::G0Realtime,
        rels: G0_REALTIME_RELS,
        start: Rel::Realtime,
        counts: &[at_least(Rel::Realtime, 1)],
    },
    CycleSpec {
        anomaly: AnomalyType::G1cRealtime,
        rels: G1C_REALTIME_RELS,
        start: Rel::Realtime,
        counts: &[at_least(Rel::Realtime, 1), at_least(Rel::WR, 1)],
    },
    CycleSpec {
        anomaly: AnomalyType::GSingleRealtime,
        rels: G2_REALTIME_RELS,
        start: Rel::Realtime,
        counts: &[at_least(Rel::Realtime, 1), exactly(Rel::RW, 1)],
    },
    CycleSpec {
        anomaly: AnomalyType::G2ItemRealtime,
        rels: G2_REALTIME_RELS,
        start: Rel::Realtime,
        counts: &[at_least(Rel::Realtime, 1), at_least(Rel::RW, 2)],
    },
];

/// Per-constraint edge counts, saturating at 2.
type Counts = [u8; 2];

impl CycleSpec {
    /// The spec describing `anomaly`, if it is a cycle anomaly.
    #[must_use]
    pub fn of(anomaly: AnomalyType) -> Option<&'static Self> {
        CYCLE_SPECS.iter().find(|spec| spec.anomaly == anomaly)
    }

    /// Counts after taking an edge of `rel`, or `None` if that exceeds a
    /// maximum.
    fn step(&self, mut counts: Counts, rel: Rel) -> Option<Counts> {
        for (i, count) in self.counts.iter().enumerate() {
            if count.rel == rel {
                counts[i] = counts[i].saturating_add(1).min(2);
                if count.max.is_some_and(|max| counts[i] > max) {
                    return None;
                }
            }
        }
        Some(counts)
    }

    fn satisfied(&self, counts: Counts) -> bool {
        self.counts
            .iter()
            .enumerate()
            .all(|(i, count)| counts[i] >= count.min)
    }

    /// Whether a cycle made of edges labeled `rels` has this shape.
    #[must_use]
    pub fn matches(&self, rels: &[Rel]) -> bool {
        if !rels.contains(&self.start) || rels.iter().any(|rel| !self.rels.contains(rel)) {
            return false;
        }
        rels.iter()
            .try_fold([0; 2], |counts, &rel| self.step(counts, rel))
            .is_some_and(|counts| self.satisfied(counts))
    }
}

/// Classifies a cycle by the multiset of relations on its edges.
#[must_use]
pub fn classify(rels: &[Rel]) -> Option<AnomalyType> {
    CYCLE_SPECS
        .iter()
        .find(|spec| spec.matches(rels))
        .map(|spec| spec.anomaly)
}

/// An elementary cycle: `ops` starts and ends at the same op, and `rels[i]`
/// labels the edge `ops[i] -> ops[i + 1]`.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub ops: Vec<OpId>,
    pub rels: Vec<Rel>,
}

impl Cycle {
    fn is_simple(&self) -> bool {
        let body = &self.ops[..self.ops.len().saturating_sub(1)];
        let distinct: HashSet<&OpId> = body.iter().collect();
        distinct.len() == body.len()
    }
}

/// Finds one cycle of the given shape inside each strongly connected
/// component of the graph restricted to the shape's relations.
///
/// Components are visited in order of their smallest op, and start edges in
/// sorted order, so the result is deterministic.
#[must_use]
pub fn find_cycles(graph: &DiGraph<OpId>, spec: &CycleSpec) -> Vec<Cycle> {
    let projected = graph.project(spec.rels);
    let components = projected.strongly_connected_components();
    tracing::trace!(
        anomaly = %spec.anomaly,
        components = components.len(),
        "searching components"
    );
    components
        .iter()
        .filter_map(|component| find_cycle_in(&projected, component, spec))
        .collect()
}

fn find_cycle_in(graph: &DiGraph<OpId>, component: &[OpId], spec: &CycleSpec) -> Option<Cycle> {
    let members: HashSet<OpId> = component.iter().copied().collect();
    for &source in component {
        for (target, rel) in graph.sorted_outs(&source) {
            if rel != spec.start || !members.contains(&target) {
                continue;
            }
            if let Some(cycle) = search_from(graph, &members, spec, source, target) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Breadth-first search for a path `target ->* source` that closes the
/// start edge `source -> target` into a cycle of the right shape. Paths do
/// not run through `source`.
fn search_from(
    graph: &DiGraph<OpId>,
    members: &HashSet<OpId>,
    spec: &CycleSpec,
    source: OpId,
    target: OpId,
) -> Option<Cycle> {
    let initial = spec.step([0; 2], spec.start)?;
    if source == target {
        return spec.satisfied(initial).then(|| Cycle {
            ops: vec![source, source],
            rels: vec![spec.start],
        });
    }

    type State = (OpId, Counts);
    let root: State = (target, initial);
    let mut parents: HashMap<State, (State, Rel)> = HashMap::new();
    let mut seen: HashSet<State> = HashSet::new();
    let mut queue: VecDeque<State> = VecDeque::new();
    seen.insert(root);
    queue.push_back(root);

    while let Some(state) = queue.pop_front() {
        let (vertex, counts) = state;
        for (next, rel) in graph.sorted_outs(&vertex) {
            if !members.contains(&next) {
                continue;
            }
            let Some(next_counts) = spec.step(counts, rel) else {
                continue;
            };
            if next == source {
                if spec.satisfied(next_counts) {
                    let cycle = unwind(&parents, root, state, source, spec.start, rel);
                    if cycle.is_simple() {
                        return Some(cycle);
                    }
                }
                continue;
            }
            let next_state = (next, next_counts);
            if seen.insert(next_state) {
                parents.insert(next_state, (state, rel));
                queue.push_back(next_state);
            }
        }
    }
    None
}

/// Rebuilds `source -> root.0 ->* last.0 -> source` from parent pointers.
fn unwind(
    parents: &HashMap<(OpId, Counts), ((OpId, Counts), Rel)>,
    root: (OpId, Counts),
    last: (OpId, Counts),
    source: OpId,
    start: Rel,
    closing: Rel,
) -> Cycle {
    let mut ops = vec![source];
    let mut rels = vec![closing];
    let mut state = last;
    while state != root {
        ops.push(state.0);
        match parents.get(&state) {
            Some(&(parent, rel)) => {
                rels.push(rel);
                state = parent;
            }
            None => break,
        }
    }
    ops.push(root.0);
    rels.push(start);
    ops.push(source);
    ops.reverse();
    rels.reverse();
    Cycle { ops, rels }
}
