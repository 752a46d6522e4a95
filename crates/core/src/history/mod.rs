//! Operations, micro-operations and the completed history they form.

use alloc::vec::Vec;

use hashbrown::HashMap;

use self::error::Error;
use self::types::{Op, OpId, OpType};

pub mod display;
pub mod error;
pub mod types;

/// A completed history: every op carries its final outcome and its full list
/// of micro-operations, ordered by index.
///
/// The history owns the ops; graphs and anomalies refer to them through
/// [`OpId`] and resolve them with [`get`](Self::get).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct History {
    ops: Vec<Op>,
    positions: HashMap<OpId, usize>,
    /// Completion index to the index of its invocation.
    invocations: HashMap<OpId, OpId>,
}

impl History {
    /// Builds a completed history from raw records.
    ///
    /// Records are sorted by index. When the records contain `:invoke`
    /// entries, every invocation is paired with the next completion of the
    /// same process: an `:info` completion with no micro-operations inherits
    /// those of its invocation, and an invocation that never completes becomes
    /// an `:info` op. Histories without invocations are taken as already
    /// completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateIndex`] when two records share an index, and
    /// [`Error::MissingProcess`], [`Error::DoubleInvocation`] or
    /// [`Error::UnmatchedCompletion`] when invocations and completions cannot
    /// be paired.
    pub fn new(mut records: Vec<Op>) -> Result<Self, Error> {
        records.sort_by_key(|op| op.index);
        if let Some(pair) = records.windows(2).find(|pair| pair[0].index == pair[1].index) {
            return Err(Error::DuplicateIndex {
                index: pair[0].index,
            });
        }

        let record_count = records.len();
        let paired = records.iter().any(|op| op.kind == OpType::Invoke);
        let mut invocations = HashMap::new();

        let ops = if paired {
            let mut pending: HashMap<u64, Op> = HashMap::new();
            let mut ops = Vec::with_capacity(record_count / 2 + 1);
            for record in records {
                let process = record.process.ok_or(Error::MissingProcess {
                    index: record.index,
                })?;
                if record.kind == OpType::Invoke {
                    if let Some(first) = pending.get(&process) {
                        return Err(Error::DoubleInvocation {
                            process,
                            first: first.index,
                            second: record.index,
                        });
                    }
                    pending.insert(process, record);
                    continue;
                }
                let invoke = pending.remove(&process).ok_or(Error::UnmatchedCompletion {
                    index: record.index,
                })?;
                let mut completion = record;
                if completion.kind == OpType::Info && completion.value.is_empty() {
                    completion.value = invoke.value;
                }
                invocations.insert(completion.index, invoke.index);
                ops.push(completion);
            }
            for (_, mut invoke) in pending {
                tracing::trace!(index = %invoke.index, "invocation never completed");
                invoke.kind = OpType::Info;
                ops.push(invoke);
            }
            ops.sort_by_key(|op| op.index);
            ops
        } else {
            records
        };

        let positions = ops
            .iter()
            .enumerate()
            .map(|(position, op)| (op.index, position))
            .collect();

        tracing::debug!(records = record_count, ops = ops.len(), "completed history");

        Ok(Self {
            ops,
            positions,
            invocations,
        })
    }

    /// All completed ops, ordered by index.
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    #[must_use]
    pub fn get(&self, id: OpId) -> Option<&Op> {
        self.positions.get(&id).map(|&position| &self.ops[position])
    }

    /// Ops that committed.
    pub fn oks(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter().filter(|op| op.is_ok())
    }

    /// Index at which the op was invoked, if its invocation was recorded.
    #[must_use]
    pub fn invoked_at(&self, id: OpId) -> Option<OpId> {
        self.invocations.get(&id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::types::Mop;
    use super::*;

    fn invoke(index: u64, process: u64, value: Vec<Mop>) -> Op {
        Op::new(OpType::Invoke, value)
            .with_index(index)
            .with_process(process)
    }

    fn complete(kind: OpType, index: u64, process: u64, value: Vec<Mop>) -> Op {
        Op::new(kind, value).with_index(index).with_process(process)
    }

    #[test]
    fn test_completed_records_are_sorted() {
        let history = History::new(vec![
            Op::ok(vec![Mop::append("x", 2)]).with_index(2),
            Op::ok(vec![Mop::append("x", 1)]).with_index(1),
        ])
        .unwrap();
        let indices: Vec<_> = history.ops().iter().map(|op| op.index.0).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(history.invoked_at(OpId(2)), None);
    }

    #[test]
    fn test_duplicate_index() {
        let result = History::new(vec![
            Op::ok(vec![]).with_index(1),
            Op::ok(vec![]).with_index(1),
        ]);
        assert_eq!(result, Err(Error::DuplicateIndex { index: OpId(1) }));
    }

    #[test]
    fn test_pairing() {
        let history = History::new(vec![
            invoke(0, 0, vec![Mop::append("x", 1), Mop::read_nil("x")]),
            invoke(1, 1, vec![Mop::append("x", 2)]),
            complete(
                OpType::Ok,
                2,
                0,
                vec![Mop::append("x", 1), Mop::read_list("x", vec![1])],
            ),
            complete(OpType::Info, 3, 1, vec![]),
            invoke(4, 0, vec![Mop::read_nil("y")]),
        ])
        .unwrap();

        assert_eq!(history.len(), 3);
        let ok = history.get(OpId(2)).unwrap();
        assert!(ok.is_ok());
        assert_eq!(history.invoked_at(OpId(2)), Some(OpId(0)));

        let info = history.get(OpId(3)).unwrap();
        assert!(info.is_info());
        assert_eq!(info.value, vec![Mop::append("x", 2)]);
        assert_eq!(history.invoked_at(OpId(3)), Some(OpId(1)));

        let dangling = history.get(OpId(4)).unwrap();
        assert!(dangling.is_info());
        assert_eq!(dangling.value, vec![Mop::read_nil("y")]);
    }

    #[test]
    fn test_double_invocation() {
        let result = History::new(vec![
            invoke(0, 0, vec![Mop::append("x", 1)]),
            invoke(1, 0, vec![Mop::append("x", 2)]),
        ]);
        assert_eq!(
            result,
            Err(Error::DoubleInvocation {
                process: 0,
                first: OpId(0),
                second: OpId(1),
            })
        );
    }

    #[test]
    fn test_missing_process() {
        let result = History::new(vec![
            invoke(0, 0, vec![]),
            Op::ok(vec![]).with_index(1),
        ]);
        assert_eq!(result, Err(Error::MissingProcess { index: OpId(1) }));
    }

    #[test]
    fn test_unmatched_completion() {
        let result = History::new(vec![
            invoke(0, 0, vec![]),
            complete(OpType::Ok, 1, 1, vec![]),
        ]);
        assert_eq!(result, Err(Error::UnmatchedCompletion { index: OpId(1) }));
    }
}
