//! Orders that come from how the history was executed rather than from the
//! data: process order and realtime order.

use alloc::vec::Vec;

use hashbrown::HashMap;

use super::digraph::DiGraph;
use super::rel::Rel;
use crate::history::types::OpId;
use crate::history::History;

/// Links each committed op to the next committed op of the same process.
#[must_use]
pub fn process_graph(history: &History) -> DiGraph<OpId> {
    let mut graph = DiGraph::default();
    let mut last: HashMap<u64, OpId> = HashMap::new();
    for op in history.oks() {
        let Some(process) = op.process else {
            continue;
        };
        if let Some(previous) = last.insert(process, op.index) {
            graph.link(previous, op.index, Rel::Process);
        }
    }
    tracing::trace!(edges = graph.edge_count(), "process graph");
    graph
}

/// Links `a -> b` whenever committed op `a` completed before committed op `b`
/// was invoked. An op whose invocation was not recorded may have been invoked
/// before anything else, so no edge leads into it.
///
/// Only the transitive reduction is emitted: a sweep over invocation and
/// completion events keeps the frontier of completed ops not yet superseded
/// by a later completion that itself follows them.
#[must_use]
pub fn realtime_graph(history: &History) -> DiGraph<OpId> {
    // (position, completion?, op)
    let mut events: Vec<(OpId, bool, OpId)> = Vec::new();
    let mut graph = DiGraph::default();
    for op in history.oks() {
        match history.invoked_at(op.index) {
            Some(invoked) => events.push((invoked, false, op.index)),
            None => graph.add_vertex(op.index),
        }
        events.push((op.index, true, op.index));
    }
    events.sort_unstable();

    let mut frontier: Vec<OpId> = Vec::new();
    let mut predecessors: HashMap<OpId, Vec<OpId>> = HashMap::new();
    for (_, completion, op) in events {
        if completion {
            if let Some(before) = predecessors.remove(&op) {
                frontier.retain(|done| !before.contains(done));
            }
            frontier.push(op);
        } else {
            for &done in &frontier {
                graph.link(done, op, Rel::Realtime);
            }
            graph.add_vertex(op);
            predecessors.insert(op, frontier.clone());
        }
    }
    tracing::trace!(edges = graph.edge_count(), "realtime graph");
    graph
}
