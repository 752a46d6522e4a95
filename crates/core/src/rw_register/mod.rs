//! Dependency inference for read-write register histories.
//!
//! Registers are overwritten, so reads reveal which write they observed but
//! not how writes are ordered. Each key gets a version graph: the initial
//! (`nil`) state precedes every written version, and [`GraphOption`] adds
//! edges from writes-follow-reads, process order or realtime order. Write
//! and anti-dependencies are then read off the version graph.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::anomaly::{Anomalies, Anomaly, AnomalyType, CyclicVersions, Explainer, Explanation};
use crate::consistency::opts::GraphOption;
use crate::graph::digraph::DiGraph;
use crate::graph::order::{process_graph, realtime_graph};
use crate::graph::rel::Rel;
use crate::history::error::Error;
use crate::history::types::{Key, Mop, Op, OpId, Value};
use crate::history::History;
use crate::list_append::explanation_key;

pub mod cases;

/// A register version; `None` is the initial state.
pub type Version = Option<i64>;

/// Value index: key, then written value, to the op that wrote it.
type ValueIndex = HashMap<Key, HashMap<i64, OpId>>;

/// External reads of an op: per key, the value the first read observed,
/// provided it came before any write of the key in the same op.
#[must_use]
pub fn ext_reads(op: &Op) -> BTreeMap<&Key, Version> {
    let mut written: BTreeSet<&Key> = BTreeSet::new();
    let mut reads = BTreeMap::new();
    for mop in &op.value {
        match mop {
            Mop::Read { key, value } => {
                if !written.contains(key) && !reads.contains_key(key) {
                    reads.insert(key, value.as_ref().and_then(Value::as_int));
                }
            }
            Mop::Write { key, .. } | Mop::Append { key, .. } => {
                written.insert(key);
            }
        }
    }
    reads
}

/// External writes of an op: per key, the last value written.
#[must_use]
pub fn ext_writes(op: &Op) -> BTreeMap<&Key, i64> {
    op.value
        .iter()
        .filter_map(|mop| match mop {
            Mop::Write { key, value } => Some((key, *value)),
            _ => None,
        })
        .collect()
}

fn lookup(index: &ValueIndex, key: &str, value: i64) -> Option<OpId> {
    index.get(key)?.get(&value).copied()
}

/// Indices and version graphs over a register history.
#[derive(Debug, Clone)]
pub struct Analysis<'a> {
    history: &'a History,
    /// Writes of ops that committed or may have committed.
    writers: ValueIndex,
    /// Writes of failed ops.
    failed: ValueIndex,
    /// Writes the same op overwrote before finishing.
    intermediate: ValueIndex,
    /// Committed ops by the version of a key they externally read.
    readers: HashMap<(Key, Version), Vec<OpId>>,
    versions: BTreeMap<Key, DiGraph<Version>>,
    /// Keys whose version graph is cyclic, with one offending cycle.
    cyclic: BTreeMap<Key, Vec<Version>>,
}

impl<'a> Analysis<'a> {
    /// Indexes the history and infers a version graph per key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateWrite`] when two writes (possibly by the same
    /// op) store the same value in the same key, and
    /// [`Error::UnsupportedMop`] for appends and list reads.
    pub fn new(history: &'a History, option: &GraphOption) -> Result<Self, Error> {
        let mut every: ValueIndex = HashMap::new();
        let mut writers: ValueIndex = HashMap::new();
        let mut failed: ValueIndex = HashMap::new();
        let mut intermediate: ValueIndex = HashMap::new();
        let mut readers: HashMap<(Key, Version), Vec<OpId>> = HashMap::new();
        let mut versions: BTreeMap<Key, DiGraph<Version>> = BTreeMap::new();

        for op in history.ops() {
            let mut last_write: HashMap<&Key, i64> = HashMap::new();
            for mop in &op.value {
                match mop {
                    Mop::Write { key, value } => {
                        let written = every.entry(key.clone()).or_default();
                        if let Some(&previous) = written.get(value) {
                            return Err(Error::DuplicateWrite {
                                key: key.clone(),
                                value: *value,
                                ops: [previous, op.index],
                            });
                        }
                        written.insert(*value, op.index);
                        let index = if op.may_have_committed() {
                            &mut writers
                        } else {
                            &mut failed
                        };
                        index.entry(key.clone()).or_default().insert(*value, op.index);
                        if let Some(previous) = last_write.insert(key, *value) {
                            if op.may_have_committed() {
                                intermediate
                                    .entry(key.clone())
                                    .or_default()
                                    .insert(previous, op.index);
                            }
                        }
                        if op.may_have_committed() {
                            versions
                                .entry(key.clone())
                                .or_default()
                                .link(None, Some(*value), Rel::WW);
                        }
                    }
                    Mop::Read {
                        value: None | Some(Value::Int(_)),
                        ..
                    } => {}
                    Mop::Read { .. } | Mop::Append { .. } => {
                        return Err(Error::UnsupportedMop {
                            op: op.index,
                            mop: mop.clone(),
                        });
                    }
                }
            }
            if op.is_ok() {
                for (key, version) in ext_reads(op) {
                    readers
                        .entry((key.clone(), version))
                        .or_default()
                        .push(op.index);
                    if let Some(value) = version {
                        versions
                            .entry(key.clone())
                            .or_default()
                            .link(None, Some(value), Rel::WW);
                    }
                }
            }
        }

        if option.wfr_keys {
            for op in history.oks() {
                let writes = ext_writes(op);
                for (key, read) in ext_reads(op) {
                    if let Some(&written) = writes.get(key) {
                        link_versions(&mut versions, key, read, Some(written));
                    }
                }
            }
        }
        if option.sequential_keys {
            link_ordered_versions(history, &process_graph(history), &mut versions);
        }
        if option.linearizable_keys {
            link_ordered_versions(history, &realtime_graph(history), &mut versions);
        }

        let cyclic: BTreeMap<Key, Vec<Version>> = versions
            .iter()
            .filter_map(|(key, graph)| {
                let component = graph.strongly_connected_components().into_iter().next()?;
                Some((key.clone(), component))
            })
            .collect();

        tracing::debug!(
            keys = versions.len(),
            cyclic = cyclic.len(),
            "inferred register version orders"
        );

        Ok(Self {
            history,
            writers,
            failed,
            intermediate,
            readers,
            versions,
            cyclic,
        })
    }

    #[must_use]
    pub const fn history(&self) -> &'a History {
        self.history
    }

    /// The op (committed or indeterminate) that wrote `value` to `key`.
    #[must_use]
    pub fn writer(&self, key: &str, value: i64) -> Option<OpId> {
        lookup(&self.writers, key, value)
    }

    /// The inferred version graph of `key`, unless it is cyclic.
    #[must_use]
    pub fn version_graph(&self, key: &str) -> Option<&DiGraph<Version>> {
        if self.cyclic.contains_key(key) {
            return None;
        }
        self.versions.get(key)
    }

    /// Version edges `(from, to)` of every acyclic key, in key order.
    fn version_edges(&self) -> Vec<(&Key, Version, i64)> {
        self.versions
            .iter()
            .filter(|(key, _)| !self.cyclic.contains_key(*key))
            .flat_map(|(key, graph)| {
                graph
                    .to_edge_list()
                    .into_iter()
                    .filter_map(move |(from, to, _)| Some((key, from, to?)))
            })
            .collect()
    }

    /// Write-write edges: the writer of a version precedes the writer of each
    /// version that follows it.
    #[must_use]
    pub fn ww_graph(&self) -> DiGraph<OpId> {
        let mut graph = DiGraph::default();
        for (key, from, to) in self.version_edges() {
            let Some(from) = from else {
                continue;
            };
            if let (Some(a), Some(b)) = (self.writer(key, from), self.writer(key, to)) {
                if a != b {
                    graph.link(a, b, Rel::WW);
                }
            }
        }
        graph
    }

    /// Write-read edges: the writer of a value precedes every committed op
    /// that externally read it.
    #[must_use]
    pub fn wr_graph(&self) -> DiGraph<OpId> {
        let mut graph = DiGraph::default();
        for op in self.history.oks() {
            for (key, version) in ext_reads(op) {
                let writer = version.and_then(|value| self.writer(key, value));
                if let Some(writer) = writer.filter(|&writer| writer != op.index) {
                    graph.link(writer, op.index, Rel::WR);
                }
            }
        }
        graph
    }

    /// Read-write anti-dependencies: a committed op that read a version
    /// precedes the writer of each version that follows it.
    #[must_use]
    pub fn rw_graph(&self) -> DiGraph<OpId> {
        let mut graph = DiGraph::default();
        for (key, from, to) in self.version_edges() {
            let Some(writer) = self.writer(key, to) else {
                continue;
            };
            let readers = self.readers.get(&(key.clone(), from));
            for &reader in readers.into_iter().flatten() {
                if reader != writer {
                    graph.link(reader, writer, Rel::RW);
                }
            }
        }
        graph
    }

    /// The union of the write-write, write-read and read-write graphs.
    #[must_use]
    pub fn graph(&self) -> DiGraph<OpId> {
        let mut graph = self.ww_graph();
        graph.union(&self.wr_graph());
        graph.union(&self.rw_graph());
        tracing::debug!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "rw-register dependency graph"
        );
        graph
    }

    /// Every non-cycle anomaly of the history, grouped by type.
    #[must_use]
    pub fn anomalies(&self) -> Anomalies {
        let mut anomalies = cases::all(self);
        let cyclic: Vec<Anomaly> = self
            .cyclic
            .iter()
            .map(|(key, versions)| {
                Anomaly::CyclicVersions(CyclicVersions {
                    key: key.clone(),
                    versions: versions.clone(),
                })
            })
            .collect();
        crate::anomaly::merge(&mut anomalies, AnomalyType::CyclicVersions, cyclic);
        anomalies
    }

    fn follows(&self, key: &str, from: Version, to: i64) -> bool {
        self.version_graph(key)
            .is_some_and(|graph| graph.has_edge(&from, &Some(to)))
    }
}

/// Links `from -> to` in the version graph of `key`, ignoring self-loops.
fn link_versions(
    versions: &mut BTreeMap<Key, DiGraph<Version>>,
    key: &Key,
    from: Version,
    to: Version,
) {
    if from != to {
        versions
            .entry(key.clone())
            .or_default()
            .link(from, to, Rel::WW);
    }
}

/// For every edge `a -> b` of an execution order, the last version `a`
/// left in each key precedes the first version `b` saw of it.
fn link_ordered_versions(
    history: &History,
    order: &DiGraph<OpId>,
    versions: &mut BTreeMap<Key, DiGraph<Version>>,
) {
    for (a, b, _) in order.to_edge_list() {
        let (Some(a), Some(b)) = (history.get(a), history.get(b)) else {
            continue;
        };
        let a_writes = ext_writes(a);
        let a_reads = ext_reads(a);
        let b_writes = ext_writes(b);
        let b_reads = ext_reads(b);
        let a_keys = a_writes.keys().chain(a_reads.keys());
        for key in a_keys.collect::<BTreeSet<_>>() {
            let last = a_writes
                .get(*key)
                .map(|&value| Some(value))
                .or_else(|| a_reads.get(*key).copied());
            let first = b_reads
                .get(*key)
                .copied()
                .or_else(|| b_writes.get(*key).map(|&value| Some(value)));
            if let (Some(last), Some(first)) = (last, first) {
                link_versions(versions, key, last, first);
            }
        }
    }
}

impl Explainer for Analysis<'_> {
    fn explain_pair(&self, a: &Op, b: &Op, rel: Rel) -> Option<Explanation> {
        let explanations: Vec<Explanation> = match rel {
            Rel::WW => {
                let b_writes = ext_writes(b);
                ext_writes(a)
                    .into_iter()
                    .filter_map(|(key, value)| {
                        let next = *b_writes.get(key)?;
                        self.follows(key, Some(value), next)
                            .then(|| Explanation::RegisterWW {
                                key: key.clone(),
                                value,
                                next,
                            })
                    })
                    .collect()
            }
            Rel::WR => ext_reads(b)
                .into_iter()
                .filter_map(|(key, version)| {
                    let value = version?;
                    (self.writer(key, value) == Some(a.index)).then(|| Explanation::RegisterWR {
                        key: key.clone(),
                        value,
                    })
                })
                .collect(),
            Rel::RW => {
                let b_writes = ext_writes(b);
                ext_reads(a)
                    .into_iter()
                    .filter_map(|(key, observed)| {
                        let next = *b_writes.get(key)?;
                        self.follows(key, observed, next)
                            .then(|| Explanation::RegisterRW {
                                key: key.clone(),
                                observed,
                                next,
                            })
                    })
                    .collect()
            }
            Rel::Process | Rel::Realtime => return None,
        };
        explanations
            .into_iter()
            .min_by(|x, y| explanation_key(x).cmp(&explanation_key(y)))
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::history::types::OpType;

    fn history(ops: Vec<Op>) -> History {
        let ops = ops
            .into_iter()
            .enumerate()
            .map(|(i, op)| op.with_index(i as u64))
            .collect();
        History::new(ops).unwrap()
    }

    fn edges(graph: &DiGraph<OpId>) -> Vec<(u64, u64, Rel)> {
        let mut edges: Vec<_> = graph
            .to_edge_list()
            .into_iter()
            .map(|(a, b, rel)| (a.0, b.0, rel))
            .collect();
        edges.sort();
        edges
    }

    #[test]
    fn test_ext_reads_and_writes() {
        let op = Op::ok(vec![
            Mop::read_int("x", 1),
            Mop::write("x", 2),
            Mop::read_int("x", 2),
            Mop::write("y", 3),
            Mop::read_int("y", 3),
            Mop::write("x", 4),
            Mop::read_nil("z"),
        ]);
        let reads = ext_reads(&op);
        assert_eq!(reads.len(), 2);
        assert_eq!(reads.get(&Key::from("x")), Some(&Some(1)));
        assert_eq!(reads.get(&Key::from("z")), Some(&None));
        let writes = ext_writes(&op);
        assert_eq!(writes.get(&Key::from("x")), Some(&4));
        assert_eq!(writes.get(&Key::from("y")), Some(&3));
    }

    #[test]
    fn test_initial_state_precedes_writes() {
        // T0 reads y's initial state and writes x; T1 does the reverse.
        let history = history(vec![
            Op::ok(vec![Mop::read_nil("y"), Mop::write("x", 1)]),
            Op::ok(vec![Mop::read_nil("x"), Mop::write("y", 1)]),
        ]);
        let analysis = Analysis::new(&history, &GraphOption::default()).unwrap();
        assert_eq!(
            edges(&analysis.graph()),
            vec![(0, 1, Rel::RW), (1, 0, Rel::RW)]
        );
    }

    #[test]
    fn test_wr_edges() {
        let history = history(vec![
            Op::ok(vec![Mop::write("x", 1)]),
            Op::ok(vec![Mop::read_int("x", 1)]),
            Op::new(OpType::Info, vec![Mop::read_int("x", 1)]),
        ]);
        let analysis = Analysis::new(&history, &GraphOption::default()).unwrap();
        assert_eq!(edges(&analysis.graph()), vec![(0, 1, Rel::WR)]);
    }

    #[test]
    fn test_no_ww_without_ordering_hints() {
        let history = history(vec![
            Op::ok(vec![Mop::write("x", 1)]).with_process(0),
            Op::ok(vec![Mop::write("x", 2)]).with_process(0),
        ]);
        let analysis = Analysis::new(&history, &GraphOption::default()).unwrap();
        assert!(analysis.ww_graph().to_edge_list().is_empty());

        let sequential = GraphOption {
            sequential_keys: true,
            ..GraphOption::default()
        };
        let analysis = Analysis::new(&history, &sequential).unwrap();
        assert_eq!(edges(&analysis.ww_graph()), vec![(0, 1, Rel::WW)]);
        assert_eq!(
            analysis.explain_pair(&history.ops()[0], &history.ops()[1], Rel::WW),
            Some(Explanation::RegisterWW {
                key: "x".into(),
                value: 1,
                next: 2,
            })
        );
    }

    #[test]
    fn test_writes_follow_reads() {
        let history = history(vec![
            Op::ok(vec![Mop::write("x", 1)]),
            Op::ok(vec![Mop::read_int("x", 1), Mop::write("x", 2)]),
        ]);
        let wfr = GraphOption {
            wfr_keys: true,
            ..GraphOption::default()
        };
        let analysis = Analysis::new(&history, &wfr).unwrap();
        assert_eq!(
            edges(&analysis.graph()),
            vec![(0, 1, Rel::WW), (0, 1, Rel::WR)]
        );
    }

    #[test]
    fn test_cyclic_versions() {
        // Process 0 sees 2 then 1; process 1 sees 1 then 2.
        let history = history(vec![
            Op::ok(vec![Mop::write("x", 1)]).with_process(2),
            Op::ok(vec![Mop::write("x", 2)]).with_process(3),
            Op::ok(vec![Mop::read_int("x", 2)]).with_process(0),
            Op::ok(vec![Mop::read_int("x", 1)]).with_process(0),
            Op::ok(vec![Mop::read_int("x", 1)]).with_process(1),
            Op::ok(vec![Mop::read_int("x", 2)]).with_process(1),
        ]);
        let sequential = GraphOption {
            sequential_keys: true,
            ..GraphOption::default()
        };
        let analysis = Analysis::new(&history, &sequential).unwrap();
        assert!(analysis.version_graph("x").is_none());
        assert!(analysis.ww_graph().to_edge_list().is_empty());
        let anomalies = analysis.anomalies();
        assert_eq!(
            anomalies[&AnomalyType::CyclicVersions],
            vec![Anomaly::CyclicVersions(CyclicVersions {
                key: "x".into(),
                versions: vec![Some(1), Some(2)],
            })]
        );
    }

    #[test]
    fn test_duplicate_write() {
        let history = history(vec![
            Op::ok(vec![Mop::write("x", 1)]),
            Op::new(OpType::Fail, vec![Mop::write("x", 1)]),
        ]);
        assert_eq!(
            Analysis::new(&history, &GraphOption::default()).unwrap_err(),
            Error::DuplicateWrite {
                key: "x".into(),
                value: 1,
                ops: [OpId(0), OpId(1)],
            }
        );
    }
}
