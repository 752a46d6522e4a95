//! List-append scenarios: graph inference, anomaly detection and
//! explanations.
mod common;

use cyclops_core::anomaly::{Anomaly, AnomalyType, Explanation};
use cyclops_core::graph::rel::Rel;
use cyclops_core::history::error::Error as HistoryError;
use cyclops_core::history::types::{Op, OpId};
use cyclops_core::history::History;
use cyclops_core::list_append::Analysis;
use cyclops_core::{check, CheckResult, Model, Opts, Workload};

/// Sorted `(from, to, rel)` edges of the list-append dependency graph.
fn edges(ops: Vec<Op>) -> Vec<(u64, u64, Rel)> {
    let history = History::new(ops).unwrap();
    let analysis = Analysis::new(&history).unwrap();
    let mut edges: Vec<_> = analysis
        .graph()
        .to_edge_list()
        .into_iter()
        .map(|(a, b, rel)| (a.0, b.0, rel))
        .collect();
    edges.sort();
    edges
}

fn check_list_append(opts: &Opts, ops: Vec<Op>) -> CheckResult {
    check(Workload::ListAppend, opts, ops).unwrap()
}

// -- Graph inference -------------------------------------------------------

#[test]
fn ww_edges_follow_the_longest_read() {
    let h = history![
        op!(ok [append x 1]),
        op!(ok [append x 2]),
        op!(ok [append x 3]),
        op!(ok [r x [1 2 3]]),
    ];
    let history = History::new(h).unwrap();
    let analysis = Analysis::new(&history).unwrap();
    let mut ww = analysis.ww_graph().to_edge_list();
    ww.sort();
    assert_eq!(
        ww,
        vec![(OpId(0), OpId(1), Rel::WW), (OpId(1), OpId(2), Rel::WW)]
    );
}

#[test]
fn wr_edges_link_the_last_element() {
    let h = history![
        op!(ok [append x 1]),
        op!(ok [r x [1]]),
        op!(ok [append x 2]),
        op!(ok [r x [1 2]]),
    ];
    let history = History::new(h).unwrap();
    let analysis = Analysis::new(&history).unwrap();
    let mut wr = analysis.wr_graph().to_edge_list();
    wr.sort();
    assert_eq!(
        wr,
        vec![(OpId(0), OpId(1), Rel::WR), (OpId(2), OpId(3), Rel::WR)]
    );
}

#[test]
fn graph_of_small_histories() {
    assert_eq!(
        edges(history![op!(ok [append x 1]), op!(ok [r x [1]])]),
        vec![(0, 1, Rel::WR)]
    );
    assert_eq!(
        edges(history![
            op!(ok [r x nil]),
            op!(ok [append x 1]),
            op!(ok [r x [1]]),
        ]),
        vec![(0, 1, Rel::RW), (1, 2, Rel::WR)]
    );
    assert_eq!(
        edges(history![
            op!(ok [append x 2]),
            op!(ok [append x 1]),
            op!(ok [r x [1 2]]),
        ]),
        vec![(0, 2, Rel::WR), (1, 0, Rel::WW)]
    );
}

#[test]
fn graph_over_several_keys() {
    let h = history![
        op!(ok [append z 1] [append x 1] [append y 1]),
        op!(ok [r x [1]] [append y 2]),
        op!(ok [r y [1 2]] [append z 3]),
        op!(ok [r z [1 3]]),
    ];
    assert_eq!(
        edges(h),
        vec![
            (0, 1, Rel::WW),
            (0, 1, Rel::WR),
            (0, 2, Rel::WW),
            (1, 2, Rel::WR),
            (2, 3, Rel::WR),
        ]
    );
}

#[test]
fn conflicting_orders_give_mutual_ww_edges() {
    let h = history![
        op!(ok [append x 1] [append y 1]),
        op!(ok [append x 2] [append y 2]),
        op!(ok [r x [1 2]] [r y [2 1]]),
    ];
    assert_eq!(
        edges(h),
        vec![
            (0, 1, Rel::WW),
            (0, 2, Rel::WR),
            (1, 0, Rel::WW),
            (1, 2, Rel::WR),
        ]
    );
}

#[test]
fn indeterminate_ops_write_but_do_not_read() {
    let h = history![
        op!(info [append x 2] [r y nil]),
        op!(ok [append x 1] [append y 1]),
        op!(ok [r x [1 2]] [r y [1]]),
    ];
    assert_eq!(
        edges(h),
        vec![(0, 2, Rel::WR), (1, 0, Rel::WW), (1, 2, Rel::WR)]
    );
}

#[test]
fn unobserved_indeterminate_appends_float() {
    assert!(edges(history![op!(ok [r x nil]), op!(info [append x 1])]).is_empty());
    assert_eq!(
        edges(history![
            op!(ok [append x 1]),
            op!(info [append x 2]),
            op!(ok [r x [1]]),
        ]),
        vec![(0, 2, Rel::WR)]
    );
}

#[test]
fn unread_appends_are_ordered_only_when_alone() {
    assert_eq!(
        edges(history![op!(ok [r x nil]), op!(ok [append x 1])]),
        vec![(0, 1, Rel::RW)]
    );
    assert!(edges(history![
        op!(ok [r x nil]),
        op!(ok [append x 1]),
        op!(ok [append x 2]),
    ])
    .is_empty());
}

#[test]
fn duplicate_appends_are_fatal() {
    let h = history![
        op!(ok [append x 1] [r y nil]),
        op!(ok [append y 2] [append x 1]),
    ];
    let history = History::new(h).unwrap();
    assert_eq!(
        Analysis::new(&history).unwrap_err(),
        HistoryError::DuplicateAppend {
            key: "x".into(),
            value: 1,
            ops: [OpId(0), OpId(1)],
        }
    );
}

#[test]
fn ww_chain_is_a_single_path() {
    let h = history![
        op!(ok [append x 3]),
        op!(ok [append x 1]),
        op!(ok [append x 4]),
        op!(ok [append x 2]),
        op!(ok [r x [1 2 3 4]]),
    ];
    let history = History::new(h).unwrap();
    let analysis = Analysis::new(&history).unwrap();
    let ww = analysis.ww_graph();
    assert_eq!(ww.edge_count(), 3);
    for writer in [OpId(1), OpId(3), OpId(0)] {
        assert_eq!(ww.sorted_outs(&writer).len(), 1);
    }
    assert!(ww.sorted_outs(&OpId(2)).is_empty());
    assert!(!ww.has_cycle());
}

// -- Checker -----------------------------------------------------------------

#[test]
fn g0_over_two_keys() {
    let h = history![
        op!(ok [append x 1] [append y 1]),
        op!(ok [append x 2] [append y 2]),
        op!(ok [r x [1 2]] [r y [2 1]]),
    ];
    let opts = Opts::from_names(&[] as &[&str], &["G0"]).unwrap();
    let result = check_list_append(&opts, h);

    assert!(!result.valid);
    assert_eq!(result.anomaly_types, vec![AnomalyType::G0]);
    assert!(result.impossible_models.is_empty());
    assert_eq!(result.not, vec![Model::ReadUncommitted]);

    let [Anomaly::Cycle(cycle)] = result.anomalies[&AnomalyType::G0].as_slice() else {
        panic!("expected one G0 cycle");
    };
    let ids: Vec<_> = cycle.cycle.iter().map(Op::id).collect();
    assert_eq!(ids, vec![OpId(0), OpId(1), OpId(0)]);
    assert_eq!(
        cycle.steps,
        vec![
            Explanation::AppendWW {
                key: "x".into(),
                value: 1,
                next: 2,
            },
            Explanation::AppendWW {
                key: "y".into(),
                value: 2,
                next: 1,
            },
        ]
    );
}

#[test]
fn mutual_initial_state_reads_are_g2_item() {
    let h = history![
        op!(ok [r x nil] [append y 1]),
        op!(ok [r y nil] [append x 1]),
        op!(ok [r x [1]] [r y [1]]),
    ];
    let result = check_list_append(&Opts::default(), h);

    assert!(!result.valid);
    assert_eq!(result.anomaly_types, vec![AnomalyType::G2Item]);
    assert_eq!(result.impossible_models, vec![Model::Serializable]);
    assert_eq!(result.not, vec![Model::RepeatableRead]);

    let [Anomaly::Cycle(cycle)] = result.anomalies[&AnomalyType::G2Item].as_slice() else {
        panic!("expected one G2-item cycle");
    };
    assert_eq!(
        cycle.explanation(),
        "Let:
  T1 = {:type :ok, :value [[:r x nil] [:append y 1]], :index 0}
  T2 = {:type :ok, :value [[:r y nil] [:append x 1]], :index 1}

Then:
  - T1 < T2, because T1 observed the initial (nil) state of x, which T2 created by appending 1.
  - However, T2 < T1, because T2 observed the initial (nil) state of y, which T1 created by appending 1: a contradiction!"
    );
}

#[test]
fn snapshot_isolation_allows_write_skew() {
    let h = history![
        op!(ok [r x nil] [append y 1]),
        op!(ok [r y nil] [append x 1]),
        op!(ok [r x [1]] [r y [1]]),
    ];
    let opts = Opts::from_names(&["snapshot-isolation"], &[] as &[&str]).unwrap();
    let result = check_list_append(&opts, h);
    assert!(result.valid);
    assert!(result.anomalies.is_empty());
}

#[test]
fn g1c_cycle_through_reads() {
    let h = history![
        op!(ok [append x 1] [r y [1]]),
        op!(ok [append y 1] [r x [1]]),
    ];
    let opts = Opts::from_names(&["read-committed"], &[] as &[&str]).unwrap();
    let result = check_list_append(&opts, h);
    assert!(!result.valid);
    assert_eq!(result.anomaly_types, vec![AnomalyType::G1c]);
    assert_eq!(result.impossible_models, vec![Model::ReadCommitted]);
    assert_eq!(result.not, vec![Model::ReadCommitted]);
}

#[test]
fn aborted_read_is_always_reported() {
    let h = history![
        op!(fail [append x 1]),
        op!(ok [r x [1]] [append x 2]),
        op!(ok [r x [1 2]] [r y [3]]),
    ];
    let opts = Opts::from_names(&[] as &[&str], &["G0"]).unwrap();
    let result = check_list_append(&opts, h);
    assert_eq!(result.anomaly_types, vec![AnomalyType::G1a]);
    assert_eq!(result.anomalies[&AnomalyType::G1a].len(), 2);
}

#[test]
fn internal_and_incompatible_orders_are_invalid() {
    let h = history![
        op!(ok [append x 1]),
        op!(ok [append x 2]),
        op!(ok [r x [1 2]]),
        op!(ok [r x [2 1]]),
        op!(ok [append y 3] [r y [4]]),
    ];
    let opts = Opts::from_names(&[] as &[&str], &["G1a"]).unwrap();
    let result = check_list_append(&opts, h);
    assert!(!result.valid);
    assert_eq!(
        result.anomaly_types,
        vec![AnomalyType::Internal, AnomalyType::IncompatibleOrder]
    );
    assert_eq!(result.not, vec![Model::ReadUncommitted]);
}

#[test]
fn explanations_are_deterministic() {
    let build = || {
        history![
            op!(ok @0 [r x nil] [append y 1] [append z 1]),
            op!(ok @1 [r y nil] [r z nil] [append x 1]),
            op!(ok @2 [r x [1]] [r y [1]] [r z [1]]),
        ]
    };
    let first = check_list_append(&Opts::default(), build()).to_string();
    let second = check_list_append(&Opts::default(), build()).to_string();
    assert_eq!(first, second);
    assert!(first.contains("initial (nil) state of y"));
}

#[test]
fn empty_history_is_valid() {
    let result = check_list_append(&Opts::default(), Vec::new());
    assert!(result.valid);
    assert!(result.anomalies.is_empty());
    assert!(result.impossible_models.is_empty());
}
