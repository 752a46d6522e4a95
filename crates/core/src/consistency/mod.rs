//! Checking a history against consistency models and anomaly types.

use alloc::vec::Vec;

use self::error::Error;
use self::model::{Violations, ALWAYS_PROHIBITED};
use self::opts::{GraphOption, Opts, Workload};
use self::result::CheckResult;
use crate::anomaly::explain::OrderExplainer;
use crate::anomaly::{merge, Anomalies, Anomaly, CycleExplainerResult, Explainer, Explanation};
use crate::graph::cycle::{find_cycles, CycleSpec};
use crate::graph::digraph::DiGraph;
use crate::graph::order::{process_graph, realtime_graph};
use crate::graph::rel::Rel;
use crate::history::types::{Op, OpId};
use crate::history::History;
use crate::{list_append, rw_register};

pub mod error;
pub mod model;
pub mod opts;
pub mod result;

/// The analyzer selected by a [`Workload`].
#[derive(Debug)]
enum Analyzer<'a> {
    ListAppend(list_append::Analysis<'a>),
    RwRegister(rw_register::Analysis<'a>),
}

impl<'a> Analyzer<'a> {
    fn new(
        workload: Workload,
        history: &'a History,
        option: &GraphOption,
    ) -> Result<Self, Error> {
        Ok(match workload {
            Workload::ListAppend => Self::ListAppend(list_append::Analysis::new(history)?),
            Workload::RwRegister => {
                Self::RwRegister(rw_register::Analysis::new(history, option)?)
            }
        })
    }

    fn graph(&self) -> DiGraph<OpId> {
        match self {
            Self::ListAppend(analysis) => analysis.graph(),
            Self::RwRegister(analysis) => analysis.graph(),
        }
    }

    fn anomalies(&self) -> Anomalies {
        match self {
            Self::ListAppend(analysis) => analysis.anomalies(),
            Self::RwRegister(analysis) => analysis.anomalies(),
        }
    }
}

impl Explainer for Analyzer<'_> {
    fn explain_pair(&self, a: &Op, b: &Op, rel: Rel) -> Option<Explanation> {
        match self {
            Self::ListAppend(analysis) => analysis.explain_pair(a, b, rel),
            Self::RwRegister(analysis) => analysis.explain_pair(a, b, rel),
        }
    }
}

/// Checks a history of completed (or invoke/complete) operation records.
///
/// The records are interpreted according to `workload`. Every anomaly found
/// is reported, but only the anomaly types requested in `opts`, those
/// prohibited by its consistency models, and anomalies no model allows make
/// the result invalid. Cycle anomalies are only searched for when checked.
///
/// # Errors
///
/// Returns [`Error::History`] if the records do not form a well-formed
/// history for the workload: duplicate indices, unmatched invocations,
/// duplicate appends or writes, or micro-operations of the wrong workload.
pub fn check(workload: Workload, opts: &Opts, records: Vec<Op>) -> Result<CheckResult, Error> {
    tracing::debug!(records = records.len(), %workload, "checking history");

    let history = History::new(records)?;
    let analyzer = Analyzer::new(workload, &history, &opts.graph_option)?;
    let checked = opts.checked_anomalies();

    let mut graph = analyzer.graph();
    if checked.iter().any(|anomaly| anomaly.needs_process_order()) {
        graph.union(&process_graph(&history));
    }
    if checked.iter().any(|anomaly| anomaly.needs_realtime_order()) {
        graph.union(&realtime_graph(&history));
    }

    let mut anomalies = analyzer.anomalies();
    let explainer = (&analyzer, OrderExplainer { history: &history });
    for &anomaly in &checked {
        let Some(spec) = CycleSpec::of(anomaly) else {
            continue;
        };
        let cycles: Vec<Anomaly> = find_cycles(&graph, spec)
            .iter()
            .filter_map(|cycle| CycleExplainerResult::new(&history, cycle, anomaly, &explainer))
            .map(Anomaly::Cycle)
            .collect();
        tracing::debug!(%anomaly, cycles = cycles.len(), "cycle search");
        merge(&mut anomalies, anomaly, cycles);
    }

    let anomaly_types: Vec<_> = anomalies.keys().copied().collect();
    let valid = !anomaly_types
        .iter()
        .any(|anomaly| checked.contains(anomaly) || ALWAYS_PROHIBITED.contains(anomaly));
    let mut impossible_models: Vec<_> = opts
        .models()
        .into_iter()
        .filter(|model| model.violated_by(&anomalies))
        .collect();
    impossible_models.sort();
    impossible_models.dedup();
    let Violations { not, also_not } = Violations::of(&anomalies);

    tracing::debug!(valid, anomalies = ?anomaly_types, "verdict");

    Ok(CheckResult {
        valid,
        anomaly_types,
        anomalies,
        impossible_models,
        not,
        also_not,
    })
}
