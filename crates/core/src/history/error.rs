use core::fmt::{Display, Formatter, Result};

use super::types::{Key, Mop, OpId};

/// Structural problems that make a history impossible to analyze.
///
/// These point at the tool that recorded the history rather than at the
/// database under test, so a run stops at the first one.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Two records share an index.
    DuplicateIndex { index: OpId },
    /// A record that needs a process (to pair invocations with completions)
    /// has none.
    MissingProcess { index: OpId },
    /// A process invoked a second operation before the first completed.
    DoubleInvocation {
        process: u64,
        first: OpId,
        second: OpId,
    },
    /// A completion arrived for a process with no pending invocation.
    UnmatchedCompletion { index: OpId },
    /// The same value was appended to a key more than once, so the appends
    /// cannot be told apart. `ops` may name the same op twice.
    DuplicateAppend { key: Key, value: i64, ops: [OpId; 2] },
    /// The same value was written to a register more than once.
    DuplicateWrite { key: Key, value: i64, ops: [OpId; 2] },
    /// The micro-operation cannot be analyzed by the selected workload.
    UnsupportedMop { op: OpId, mop: Mop },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::DuplicateIndex { index } => write!(f, "index {index} appears more than once"),
            Self::MissingProcess { index } => write!(f, "op {index} has no process"),
            Self::DoubleInvocation {
                process,
                first,
                second,
            } => write!(
                f,
                "process {process} invoked op {second} while op {first} was still pending"
            ),
            Self::UnmatchedCompletion { index } => {
                write!(f, "op {index} completes an invocation that never happened")
            }
            Self::DuplicateAppend { key, value, ops } => write!(
                f,
                "value {value} was appended to key {key} by both op {} and op {}",
                ops[0], ops[1]
            ),
            Self::DuplicateWrite { key, value, ops } => write!(
                f,
                "value {value} was written to key {key} by both op {} and op {}",
                ops[0], ops[1]
            ),
            Self::UnsupportedMop { op, mop } => {
                write!(f, "op {op} contains {mop}, which this workload cannot analyze")
            }
        }
    }
}

impl core::error::Error for Error {}
