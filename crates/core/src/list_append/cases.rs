//! Anomalies of list-append histories that need no dependency graph.
//!
//! Only committed reads are examined: an indeterminate op may have observed
//! anything.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use hashbrown::HashMap;

use super::{lookup, Analysis};
use crate::anomaly::{
    merge, Anomalies, Anomaly, AnomalyType, DuplicateElements, Expected, G1Conflict,
    IncompatibleOrder, InternalConflict,
};
use crate::history::types::{Key, Mop, Op};

/// Runs every detector.
#[must_use]
pub fn all(analysis: &Analysis) -> Anomalies {
    let mut anomalies = Anomalies::new();
    merge(&mut anomalies, AnomalyType::G1a, g1a_cases(analysis));
    merge(&mut anomalies, AnomalyType::G1b, g1b_cases(analysis));
    merge(&mut anomalies, AnomalyType::Internal, internal_cases(analysis));
    merge(
        &mut anomalies,
        AnomalyType::IncompatibleOrder,
        incompatible_order_cases(analysis),
    );
    merge(
        &mut anomalies,
        AnomalyType::DuplicateElements,
        duplicate_element_cases(analysis),
    );
    tracing::debug!(
        types = anomalies.len(),
        "list-append anomalies without cycles"
    );
    anomalies
}

/// Committed reads paired with the elements they observed.
fn committed_reads<'a>(
    analysis: &Analysis<'a>,
) -> impl Iterator<Item = (&'a Op, &'a Mop, &'a [i64])> {
    analysis.history().oks().flat_map(|op| {
        op.value
            .iter()
            .filter_map(move |mop| Some((op, mop, mop.read_elements()?)))
    })
}

/// Aborted reads: every element of a committed read that a failed op
/// appended.
#[must_use]
pub fn g1a_cases(analysis: &Analysis) -> Vec<Anomaly> {
    let history = analysis.history();
    let mut cases = Vec::new();
    for (op, mop, elements) in committed_reads(analysis) {
        for &element in elements {
            let writer =
                lookup(&analysis.failed, mop.key(), element).and_then(|id| history.get(id));
            if let Some(writer) = writer {
                cases.push(Anomaly::G1(G1Conflict {
                    op: op.clone(),
                    mop: mop.clone(),
                    writer: writer.clone(),
                    element,
                }));
            }
        }
    }
    cases
}

/// Intermediate reads: a committed read whose last element another op
/// appended and then followed with a further append to the same key.
#[must_use]
pub fn g1b_cases(analysis: &Analysis) -> Vec<Anomaly> {
    let history = analysis.history();
    let mut cases = Vec::new();
    for (op, mop, elements) in committed_reads(analysis) {
        let Some(&element) = elements.last() else {
            continue;
        };
        let writer = lookup(&analysis.intermediate, mop.key(), element)
            .filter(|&id| id != op.index)
            .and_then(|id| history.get(id));
        if let Some(writer) = writer {
            cases.push(Anomaly::G1(G1Conflict {
                op: op.clone(),
                mop: mop.clone(),
                writer: writer.clone(),
                element,
            }));
        }
    }
    cases
}

/// What a transaction knows about a key from its own earlier
/// micro-operations.
enum Known {
    /// It read the key, then appended these: the exact list.
    Exactly(Vec<i64>),
    /// It appended these without reading first: the list ends with them.
    Suffix(Vec<i64>),
}

/// Internal inconsistencies: a committed read that disagrees with what the
/// same transaction read and appended before it.
#[must_use]
pub fn internal_cases(analysis: &Analysis) -> Vec<Anomaly> {
    let mut cases = Vec::new();
    for op in analysis.history().oks() {
        let mut known: HashMap<&Key, Known> = HashMap::new();
        for mop in &op.value {
            match mop {
                Mop::Append { key, value } => match known.get_mut(key) {
                    Some(Known::Exactly(elements) | Known::Suffix(elements)) => {
                        elements.push(*value);
                    }
                    None => {
                        known.insert(key, Known::Suffix(alloc::vec![*value]));
                    }
                },
                Mop::Read { key, .. } => {
                    let Some(elements) = mop.read_elements() else {
                        continue;
                    };
                    let expected = match known.get(key) {
                        Some(Known::Exactly(expected)) if expected.as_slice() != elements => {
                            Some(Expected::Elements(expected.clone()))
                        }
                        Some(Known::Suffix(suffix)) if !elements.ends_with(suffix) => {
                            Some(Expected::EndingWith(suffix.clone()))
                        }
                        _ => None,
                    };
                    if let Some(expected) = expected {
                        cases.push(Anomaly::Internal(InternalConflict {
                            op: op.clone(),
                            mop: mop.clone(),
                            expected,
                        }));
                    }
                    known.insert(key, Known::Exactly(elements.to_vec()));
                }
                Mop::Write { .. } => {}
            }
        }
    }
    cases
}

/// Keys whose committed reads are not all prefixes of the longest one. One
/// anomaly per key, listing every distinct value read.
#[must_use]
pub fn incompatible_order_cases(analysis: &Analysis) -> Vec<Anomaly> {
    let mut reads: BTreeMap<&Key, BTreeSet<(usize, &[i64])>> = BTreeMap::new();
    for (_, mop, elements) in committed_reads(analysis) {
        if !elements.is_empty() {
            reads
                .entry(mop.key())
                .or_default()
                .insert((elements.len(), elements));
        }
    }
    reads
        .into_iter()
        .filter_map(|(key, values)| {
            let longest = analysis.longest.get(key)?;
            let compatible = values
                .iter()
                .all(|(_, elements)| longest.starts_with(elements));
            (!compatible).then(|| {
                Anomaly::IncompatibleOrder(IncompatibleOrder {
                    key: key.clone(),
                    values: values
                        .into_iter()
                        .map(|(_, elements)| elements.to_vec())
                        .collect(),
                })
            })
        })
        .collect()
}

/// Committed reads that observed some element more than once.
#[must_use]
pub fn duplicate_element_cases(analysis: &Analysis) -> Vec<Anomaly> {
    let mut cases = Vec::new();
    for (op, mop, elements) in committed_reads(analysis) {
        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for &element in elements {
            *counts.entry(element).or_default() += 1;
        }
        counts.retain(|_, count| *count > 1);
        if !counts.is_empty() {
            cases.push(Anomaly::DuplicateElements(DuplicateElements {
                op: op.clone(),
                mop: mop.clone(),
                duplicates: counts,
            }));
        }
    }
    cases
}
