//! Dependency inference for list-append histories.
//!
//! Every key holds a list; transactions append unique integers and read the
//! whole list. Since every read returns the full sequence of appends, the
//! longest read of a key reveals its version order, from which write-write,
//! write-read and read-write dependencies follow directly.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::anomaly::{Anomalies, Explainer, Explanation};
use crate::graph::digraph::DiGraph;
use crate::graph::rel::Rel;
use crate::history::error::Error;
use crate::history::types::{Key, Mop, Op, OpId, OpType};
use crate::history::History;

pub mod cases;

/// Element index: key, then appended element, to the op that appended it.
type ElementIndex = HashMap<Key, HashMap<i64, OpId>>;

/// Indices over a list-append history shared by the graph builders, the
/// anomaly detectors and the explainer.
#[derive(Debug, Clone)]
pub struct Analysis<'a> {
    history: &'a History,
    /// Appends of ops that committed or may have committed.
    writers: ElementIndex,
    /// Appends of failed ops.
    failed: ElementIndex,
    /// Appends that the same op followed with another append to the key.
    intermediate: ElementIndex,
    /// The longest committed read of each key, in the key's order.
    longest: BTreeMap<Key, Vec<i64>>,
    /// Inferred version order of each key.
    orders: BTreeMap<Key, Vec<i64>>,
}

fn lookup(index: &ElementIndex, key: &str, element: i64) -> Option<OpId> {
    index.get(key)?.get(&element).copied()
}

impl<'a> Analysis<'a> {
    /// Indexes the appends and reads of `history`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateAppend`] when two appends (possibly by the
    /// same op) put the same element on the same key, and
    /// [`Error::UnsupportedMop`] for register writes or register reads.
    pub fn new(history: &'a History) -> Result<Self, Error> {
        let mut every: ElementIndex = HashMap::new();
        let mut writers: ElementIndex = HashMap::new();
        let mut failed: ElementIndex = HashMap::new();
        let mut intermediate: ElementIndex = HashMap::new();
        let mut longest: BTreeMap<Key, Vec<i64>> = BTreeMap::new();
        let mut appends_per_key: HashMap<&Key, Vec<&Op>> = HashMap::new();

        for op in history.ops() {
            let mut last_append: HashMap<&Key, i64> = HashMap::new();
            for mop in &op.value {
                match mop {
                    Mop::Append { key, value } => {
                        let appended = every.entry(key.clone()).or_default();
                        if let Some(&previous) = appended.get(value) {
                            return Err(Error::DuplicateAppend {
                                key: key.clone(),
                                value: *value,
                                ops: [previous, op.index],
                            });
                        }
                        appended.insert(*value, op.index);
                        let index = if op.may_have_committed() {
                            &mut writers
                        } else {
                            &mut failed
                        };
                        index.entry(key.clone()).or_default().insert(*value, op.index);
                        if let Some(previous) = last_append.insert(key, *value) {
                            if op.may_have_committed() {
                                intermediate
                                    .entry(key.clone())
                                    .or_default()
                                    .insert(previous, op.index);
                            }
                        }
                        appends_per_key.entry(key).or_default().push(op);
                    }
                    Mop::Read { key, .. } => {
                        let Some(elements) = mop.read_elements() else {
                            return Err(unsupported(op, mop));
                        };
                        if op.kind == OpType::Ok {
                            let best = longest.entry(key.clone()).or_default();
                            if elements.len() > best.len() {
                                *best = elements.to_vec();
                            }
                        }
                    }
                    Mop::Write { .. } => return Err(unsupported(op, mop)),
                }
            }
        }

        let mut orders = BTreeMap::new();
        for (key, appends) in &appends_per_key {
            let order = match longest.get(*key) {
                Some(read) if !read.is_empty() => read.clone(),
                _ => match appends.as_slice() {
                    [op] if op.is_ok() => op
                        .value
                        .iter()
                        .filter_map(|mop| match mop {
                            Mop::Append { key: k, value } if k == *key => Some(*value),
                            _ => None,
                        })
                        .take(1)
                        .collect(),
                    _ => Vec::new(),
                },
            };
            orders.insert((*key).clone(), order);
        }
        for (key, read) in &longest {
            orders.entry(key.clone()).or_insert_with(|| read.clone());
        }

        tracing::debug!(
            keys = orders.len(),
            appends = writers.values().map(HashMap::len).sum::<usize>(),
            "indexed list-append history"
        );

        Ok(Self {
            history,
            writers,
            failed,
            intermediate,
            longest,
            orders,
        })
    }

    #[must_use]
    pub const fn history(&self) -> &'a History {
        self.history
    }

    /// The inferred version order of `key`; empty when unknown.
    #[must_use]
    pub fn order(&self, key: &str) -> &[i64] {
        self.orders.get(key).map_or(&[], Vec::as_slice)
    }

    /// The op (committed or indeterminate) that appended `element` to `key`.
    #[must_use]
    pub fn writer(&self, key: &str, element: i64) -> Option<OpId> {
        lookup(&self.writers, key, element)
    }

    /// The element that follows the read value `elements` in `key`'s order.
    fn next_element(&self, key: &str, elements: &[i64]) -> Option<i64> {
        let order = self.order(key);
        let position = match elements.last() {
            None => 0,
            Some(last) => order.iter().position(|element| element == last)? + 1,
        };
        order.get(position).copied()
    }

    /// Write-write edges: each pair of adjacent elements in a key's order
    /// links the first appender to the second.
    #[must_use]
    pub fn ww_graph(&self) -> DiGraph<OpId> {
        let mut graph = DiGraph::default();
        for (key, order) in &self.orders {
            for pair in order.windows(2) {
                if let (Some(a), Some(b)) = (self.writer(key, pair[0]), self.writer(key, pair[1])) {
                    if a != b {
                        graph.link(a, b, Rel::WW);
                    }
                }
            }
        }
        graph
    }

    /// Write-read edges: the appender of the last element a committed read
    /// observed precedes the reader.
    #[must_use]
    pub fn wr_graph(&self) -> DiGraph<OpId> {
        let mut graph = DiGraph::default();
        for op in self.history.oks() {
            for mop in &op.value {
                let Mop::Read { key, .. } = mop else {
                    continue;
                };
                let last = mop.read_elements().and_then(<[i64]>::last);
                if let Some(writer) = last.and_then(|&element| self.writer(key, element)) {
                    if writer != op.index {
                        graph.link(writer, op.index, Rel::WR);
                    }
                }
            }
        }
        graph
    }

    /// Read-write anti-dependencies: a committed read precedes the op that
    /// appended the element right after the last one it observed.
    #[must_use]
    pub fn rw_graph(&self) -> DiGraph<OpId> {
        let mut graph = DiGraph::default();
        for op in self.history.oks() {
            for mop in &op.value {
                let Mop::Read { key, .. } = mop else {
                    continue;
                };
                let Some(elements) = mop.read_elements() else {
                    continue;
                };
                let next = self.next_element(key, elements);
                if let Some(writer) = next.and_then(|element| self.writer(key, element)) {
                    if writer != op.index {
                        graph.link(op.index, writer, Rel::RW);
                    }
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
            "list-append dependency graph"
        );
        graph
    }

    /// Every non-cycle anomaly of the history, grouped by type.
    #[must_use]
    pub fn anomalies(&self) -> Anomalies {
        cases::all(self)
    }

    fn explain_ww(&self, a: &Op, b: &Op) -> Option<Explanation> {
        a.value
            .iter()
            .filter_map(|mop| {
                let Mop::Append { key, value } = mop else {
                    return None;
                };
                let order = self.order(key);
                let position = order.iter().position(|element| element == value)?;
                let next = *order.get(position + 1)?;
                (self.writer(key, next) == Some(b.index)).then(|| Explanation::AppendWW {
                    key: key.clone(),
                    value: *value,
                    next,
                })
            })
            .min_by(|x, y| explanation_key(x).cmp(&explanation_key(y)))
    }

    fn explain_wr(&self, a: &Op, b: &Op) -> Option<Explanation> {
        b.value
            .iter()
            .filter_map(|mop| {
                let Mop::Read { key, .. } = mop else {
                    return None;
                };
                let value = *mop.read_elements()?.last()?;
                (self.writer(key, value) == Some(a.index)).then(|| Explanation::AppendWR {
                    key: key.clone(),
                    value,
                })
            })
            .min_by(|x, y| explanation_key(x).cmp(&explanation_key(y)))
    }

    fn explain_rw(&self, a: &Op, b: &Op) -> Option<Explanation> {
        a.value
            .iter()
            .filter_map(|mop| {
                let Mop::Read { key, .. } = mop else {
                    return None;
                };
                let elements = mop.read_elements()?;
                let next = self.next_element(key, elements)?;
                (self.writer(key, next) == Some(b.index)).then(|| Explanation::AppendRW {
                    key: key.clone(),
                    observed: elements.last().copied(),
                    next,
                })
            })
            .min_by(|x, y| explanation_key(x).cmp(&explanation_key(y)))
    }
}

fn unsupported(op: &Op, mop: &Mop) -> Error {
    Error::UnsupportedMop {
        op: op.index,
        mop: mop.clone(),
    }
}

/// The key an explanation is about, for picking among several.
pub(crate) fn explanation_key(explanation: &Explanation) -> Option<&Key> {
    match explanation {
        Explanation::AppendWW { key, .. }
        | Explanation::AppendWR { key, .. }
        | Explanation::AppendRW { key, .. }
        | Explanation::RegisterWW { key, .. }
        | Explanation::RegisterWR { key, .. }
        | Explanation::RegisterRW { key, .. } => Some(key),
        Explanation::Process { .. }
        | Explanation::Realtime { .. }
        | Explanation::Unexplained { .. } => None,
    }
}

impl Explainer for Analysis<'_> {
    fn explain_pair(&self, a: &Op, b: &Op, rel: Rel) -> Option<Explanation> {
        match rel {
            Rel::WW => self.explain_ww(a, b),
            Rel::WR => self.explain_wr(a, b),
            Rel::RW => self.explain_rw(a, b),
            Rel::Process | Rel::Realtime => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn history(ops: Vec<Op>) -> History {
        let ops = ops
            .into_iter()
            .enumerate()
            .map(|(i, op)| op.with_index(i as u64))
            .collect();
        History::new(ops).unwrap()
    }

    #[test]
    fn test_order_from_longest_read() {
        let history = history(vec![
            Op::ok(vec![Mop::append("x", 1)]),
            Op::ok(vec![Mop::append("x", 2)]),
            Op::ok(vec![Mop::read_list("x", vec![1])]),
            Op::ok(vec![Mop::read_list("x", vec![1, 2])]),
        ]);
        let analysis = Analysis::new(&history).unwrap();
        assert_eq!(analysis.order("x"), &[1, 2]);
        assert_eq!(analysis.writer("x", 2), Some(OpId(1)));
        assert_eq!(analysis.order("y"), &[] as &[i64]);
    }

    #[test]
    fn test_single_unread_append_is_ordered() {
        let history = history(vec![
            Op::ok(vec![Mop::read_nil("x")]),
            Op::ok(vec![Mop::append("x", 1)]),
        ]);
        let analysis = Analysis::new(&history).unwrap();
        assert_eq!(analysis.order("x"), &[1]);

        let history = self::history(vec![
            Op::ok(vec![Mop::read_nil("x")]),
            Op::ok(vec![Mop::append("x", 1)]),
            Op::ok(vec![Mop::append("x", 2)]),
        ]);
        let analysis = Analysis::new(&history).unwrap();
        assert!(analysis.order("x").is_empty());
        assert_eq!(analysis.graph(), DiGraph::default());
    }

    #[test]
    fn test_duplicate_append_in_one_op() {
        let history = history(vec![Op::ok(vec![
            Mop::append("x", 1),
            Mop::append("x", 1),
        ])]);
        assert_eq!(
            Analysis::new(&history).unwrap_err(),
            Error::DuplicateAppend {
                key: "x".into(),
                value: 1,
                ops: [OpId(0), OpId(0)],
            }
        );
    }

    #[test]
    fn test_register_mops_are_rejected() {
        let history = history(vec![Op::ok(vec![Mop::write("x", 1)])]);
        assert!(matches!(
            Analysis::new(&history),
            Err(Error::UnsupportedMop { op: OpId(0), .. })
        ));
        let history = self::history(vec![Op::ok(vec![Mop::read_int("x", 1)])]);
        assert!(matches!(
            Analysis::new(&history),
            Err(Error::UnsupportedMop { .. })
        ));
    }

    #[test]
    fn test_explain_picks_smallest_key() {
        let history = history(vec![
            Op::ok(vec![Mop::append("y", 1), Mop::append("x", 1)]),
            Op::ok(vec![Mop::read_list("y", vec![1]), Mop::read_list("x", vec![1])]),
        ]);
        let analysis = Analysis::new(&history).unwrap();
        let ops = history.ops();
        assert_eq!(
            analysis.explain_pair(&ops[0], &ops[1], Rel::WR),
            Some(Explanation::AppendWR {
                key: "x".into(),
                value: 1,
            })
        );
        assert_eq!(analysis.explain_pair(&ops[1], &ops[0], Rel::WR), None);
    }
}
