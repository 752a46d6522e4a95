//! Turning a dependency cycle into a readable counterexample.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result, Write};

use super::AnomalyType;
use crate::graph::cycle::Cycle;
use crate::graph::rel::Rel;
use crate::history::types::{Key, Op, OpId};
use crate::history::History;

/// Why one transaction precedes another.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Explanation {
    /// `b` appended `next` right after `a` appended `value`.
    AppendWW { key: Key, value: i64, next: i64 },
    /// `b` read `a`'s append of `value` as the last element.
    AppendWR { key: Key, value: i64 },
    /// `a` read the list up to `observed` (nothing at all if `None`), and
    /// `b` appended the element that came next.
    AppendRW {
        key: Key,
        observed: Option<i64>,
        next: i64,
    },
    /// `b` overwrote `a`'s write of `value` with `next`.
    RegisterWW { key: Key, value: i64, next: i64 },
    /// `b` read `a`'s write of `value`.
    RegisterWR { key: Key, value: i64 },
    /// `a` read version `observed` (the initial state if `None`), and `b`
    /// installed the version that followed.
    RegisterRW {
        key: Key,
        observed: Option<i64>,
        next: i64,
    },
    /// Both ran on `process`, `a` first.
    Process { process: u64 },
    /// `a` completed before `b` was invoked.
    Realtime { completed: OpId, invoked: OpId },
    /// The edge exists but no micro-operation pins it down.
    Unexplained { rel: Rel },
}

impl Explanation {
    /// Renders why `a` precedes `b`, naming them as given.
    #[must_use]
    pub fn render(&self, a: &str, b: &str) -> String {
        match self {
            Self::AppendWW { key, value, next } => {
                format!("{b} appended {next} after {a} appended {value} to {key}")
            }
            Self::AppendWR { key, value } => {
                format!("{b} observed {a}'s append of {value} to key {key}")
            }
            Self::AppendRW {
                key,
                observed: None,
                next,
            } => format!(
                "{a} observed the initial (nil) state of {key}, which {b} created by appending {next}"
            ),
            Self::AppendRW {
                key,
                observed: Some(_),
                next,
            } => format!("{a} did not observe {b}'s append of {next} to {key}"),
            Self::RegisterWW { key, value, next } => format!(
                "{a} set key {key} to {value}, and {b} set it to {next}, which came later in the version order"
            ),
            Self::RegisterWR { key, value } => {
                format!("{b} observed {a}'s write of {value} to key {key}")
            }
            Self::RegisterRW {
                key,
                observed,
                next,
            } => {
                let observed = observed.map_or_else(|| String::from("nil"), |v| format!("{v}"));
                format!(
                    "{a} read key {key} = {observed}, and {b} set it to {next}, which came later in the version order"
                )
            }
            Self::Process { process } => format!("process {process} executed {a} before {b}"),
            Self::Realtime { completed, invoked } => format!(
                "{a} completed at index {completed}, before the invocation of {b}, at index {invoked}"
            ),
            Self::Unexplained { rel } => format!("{a} has a {rel} dependency on {b}"),
        }
    }
}

/// Justifies single edges of a dependency graph.
///
/// Implementations return the justification for `a -> b` under `rel`, or
/// `None` if they cannot produce one. When several keys justify the same
/// edge, the smallest key wins, so explanations are reproducible.
pub trait Explainer {
    fn explain_pair(&self, a: &Op, b: &Op, rel: Rel) -> Option<Explanation>;
}

/// Explains process and realtime edges from the history itself.
#[derive(Debug, Clone, Copy)]
pub struct OrderExplainer<'a> {
    pub history: &'a History,
}

impl Explainer for OrderExplainer<'_> {
    fn explain_pair(&self, a: &Op, b: &Op, rel: Rel) -> Option<Explanation> {
        match rel {
            Rel::Process => {
                let process = a.process?;
                (b.process == Some(process)).then_some(Explanation::Process { process })
            }
            Rel::Realtime => {
                let invoked = self.history.invoked_at(b.index)?;
                (a.index < invoked).then_some(Explanation::Realtime {
                    completed: a.index,
                    invoked,
                })
            }
            Rel::WW | Rel::WR | Rel::RW => None,
        }
    }
}

impl<E: Explainer + ?Sized> Explainer for &E {
    fn explain_pair(&self, a: &Op, b: &Op, rel: Rel) -> Option<Explanation> {
        (**self).explain_pair(a, b, rel)
    }
}

/// Tries each explainer in turn.
impl<A: Explainer, B: Explainer> Explainer for (A, B) {
    fn explain_pair(&self, a: &Op, b: &Op, rel: Rel) -> Option<Explanation> {
        self.0
            .explain_pair(a, b, rel)
            .or_else(|| self.1.explain_pair(a, b, rel))
    }
}

/// A cycle anomaly: the ops along the cycle (first equals last), one
/// explanation per step, and the anomaly the cycle instantiates.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleExplainerResult {
    pub cycle: Vec<Op>,
    pub steps: Vec<Explanation>,
    pub anomaly: AnomalyType,
}

impl CycleExplainerResult {
    /// Resolves the ops of `cycle` in `history` and explains each step.
    ///
    /// Returns `None` if an op on the cycle is not part of the history.
    #[must_use]
    pub fn new(
        history: &History,
        cycle: &Cycle,
        anomaly: AnomalyType,
        explainer: &impl Explainer,
    ) -> Option<Self> {
        let ops = cycle
            .ops
            .iter()
            .map(|&id| history.get(id).cloned())
            .collect::<Option<Vec<Op>>>()?;
        let steps = ops
            .windows(2)
            .zip(&cycle.rels)
            .map(|(pair, &rel)| {
                explainer
                    .explain_pair(&pair[0], &pair[1], rel)
                    .unwrap_or(Explanation::Unexplained { rel })
            })
            .collect();
        Some(Self {
            cycle: ops,
            steps,
            anomaly,
        })
    }

    /// The multi-line narrative: the transactions involved, then why each
    /// precedes the next, ending in the contradiction.
    #[must_use]
    pub fn explanation(&self) -> String {
        let distinct = self.cycle.len().saturating_sub(1);
        let name = |i: usize| format!("T{}", i % distinct.max(1) + 1);

        let mut text = String::from("Let:\n");
        for (i, op) in self.cycle.iter().take(distinct).enumerate() {
            let _ = writeln!(text, "  {} = {op}", name(i));
        }
        text.push_str("\nThen:");
        let last = self.steps.len().saturating_sub(1);
        for (i, step) in self.steps.iter().enumerate() {
            let (a, b) = (name(i), name(i + 1));
            let because = step.render(&a, &b);
            if i == last {
                let _ = write!(
                    text,
                    "\n  - However, {a} < {b}, because {because}: a contradiction!"
                );
            } else {
                let _ = write!(text, "\n  - {a} < {b}, because {because}.");
            }
        }
        text
    }
}

impl Display for CycleExplainerResult {
    fn fmt(&self, f: &mut Formatter) -> Result {
        writeln!(f, "{} cycle:", self.anomaly)?;
        f.write_str(&self.explanation())
    }
}
