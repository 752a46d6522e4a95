//! Anomalies of register histories that need no dependency graph.

use alloc::vec::Vec;

use hashbrown::HashMap;

use super::{lookup, Analysis, Version};
use crate::anomaly::{
    merge, Anomalies, Anomaly, AnomalyType, Expected, G1Conflict, InternalConflict,
};
use crate::history::types::{Key, Mop, Op, Value};

/// Runs every detector.
#[must_use]
pub fn all(analysis: &Analysis) -> Anomalies {
    let mut anomalies = Anomalies::new();
    merge(&mut anomalies, AnomalyType::G1a, g1a_cases(analysis));
    merge(&mut anomalies, AnomalyType::G1b, g1b_cases(analysis));
    merge(&mut anomalies, AnomalyType::Internal, internal_cases(analysis));
    tracing::debug!(
        types = anomalies.len(),
        "rw-register anomalies without cycles"
    );
    anomalies
}

/// Committed reads that observed a written value.
fn committed_reads<'a>(
    analysis: &Analysis<'a>,
) -> impl Iterator<Item = (&'a Op, &'a Mop, i64)> {
    analysis.history().oks().flat_map(|op| {
        op.value.iter().filter_map(move |mop| match mop {
            Mop::Read {
                value: Some(Value::Int(value)),
                ..
            } => Some((op, mop, *value)),
            _ => None,
        })
    })
}

fn conflicts(
    analysis: &Analysis,
    index: &super::ValueIndex,
    reader_may_be_writer: bool,
) -> Vec<Anomaly> {
    let history = analysis.history();
    committed_reads(analysis)
        .filter_map(|(op, mop, value)| {
            let writer = lookup(index, mop.key(), value)
                .filter(|&id| reader_may_be_writer || id != op.index)
                .and_then(|id| history.get(id))?;
            Some(Anomaly::G1(G1Conflict {
                op: op.clone(),
                mop: mop.clone(),
                writer: writer.clone(),
                element: value,
            }))
        })
        .collect()
}

/// Aborted reads: a committed read of a value only a failed op wrote.
#[must_use]
pub fn g1a_cases(analysis: &Analysis) -> Vec<Anomaly> {
    conflicts(analysis, &analysis.failed, true)
}

/// Intermediate reads: a committed read of a value that its writer
/// overwrote before committing.
#[must_use]
pub fn g1b_cases(analysis: &Analysis) -> Vec<Anomaly> {
    conflicts(analysis, &analysis.intermediate, false)
}

/// Internal inconsistencies: a committed read that disagrees with the
/// transaction's own earlier read or write of the key.
#[must_use]
pub fn internal_cases(analysis: &Analysis) -> Vec<Anomaly> {
    let mut cases = Vec::new();
    for op in analysis.history().oks() {
        let mut known: HashMap<&Key, Version> = HashMap::new();
        for mop in &op.value {
            match mop {
                Mop::Write { key, value } => {
                    known.insert(key, Some(*value));
                }
                Mop::Read { key, value } => {
                    let observed = value.as_ref().and_then(Value::as_int);
                    if let Some(&expected) = known.get(key) {
                        if expected != observed {
                            cases.push(Anomaly::Internal(InternalConflict {
                                op: op.clone(),
                                mop: mop.clone(),
                                expected: Expected::Mop(Mop::read(
                                    key.clone(),
                                    expected.map(Value::Int),
                                )),
                            }));
                        }
                    }
                    known.insert(key, observed);
                }
                Mop::Append { .. } => {}
            }
        }
    }
    cases
}
