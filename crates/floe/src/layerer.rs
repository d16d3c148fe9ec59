//! Layer Assigner: gives every node a rank so that flow edges point from
//! lower to higher ranks wherever possible. Cycle breaking, connector splits
//! and a virtual root turn the graph into a connected DAG for the rank
//! solver. Afterwards the helpers are removed again, reversals are undone,
//! lonely end events are pulled next to their neighbor and the ranks are
//! made dense.

use rustc_hash::FxHashMap;

use crate::elements::NodeKind;
use crate::error::Result;
use crate::graphlib::EdgeKey;
use crate::model::{
    DummyKind, is_flatwise_branch, is_flatwise_only, is_straight_branch,
};
use crate::{EdgeLabel, FlowGraph, NodeLabel, acyclic, rank, transformer, util};

pub const WEIGHT_DEFAULT_EDGE: f64 = 3.0;
pub const WEIGHT_DEFAULT_EDGE_IN_SUBPROCESS: f64 = 5.0;

const MIN_LENGTH_DEFAULT_EDGE: usize = 1;
const MIN_LENGTH_FLATWISE_BRANCH: usize = 0;

/// Assigns a rank to every node. The graph comes back structurally unchanged
/// even on error; only the rank fields and the edge weight/minlen fields are
/// written.
pub fn run(g: &mut FlowGraph) -> Result<()> {
    acyclic::run(g)?;

    // Snapshot per-node branch directions before the splits change the
    // out-edge sets.
    let branch_types = out_edge_branch_types(g);
    let connectors = transformer::split_connectors(g);
    assign_edge_weights(g, &branch_types);
    let super_root = insert_super_root(g);

    let ranked = rank::run(g);

    g.remove_node(&super_root);
    let merged = transformer::merge_connectors(g, connectors);
    acyclic::undo(g);
    ranked?;
    merged?;

    for v in g.node_ids() {
        if is_degree_one_node(g, &v) {
            handle_degree_one_node(g, &v);
        }
    }

    let layers = normalize(g);
    tracing::debug!(layers, "layer assignment done");
    Ok(())
}

fn out_edge_branch_types(g: &FlowGraph) -> FxHashMap<String, u8> {
    let mut types = FxHashMap::default();
    for v in g.node_ids() {
        let mut mask = 0u8;
        for e in g.out_edges(&v, None) {
            mask |= g.edge_by_key(&e).map(|l| l.direction).unwrap_or_default();
        }
        types.insert(v, mask);
    }
    types
}

/// Weight and minimum length for every edge except connector halves, which
/// carry theirs from the split.
fn assign_edge_weights(g: &mut FlowGraph, branch_types: &FxHashMap<String, u8>) {
    let allow_flatwise = g.graph().options.allow_flatwise_edges;

    for e in g.edge_keys() {
        let target_is_connector = g
            .node(&e.w)
            .is_some_and(|n| n.dummy == Some(DummyKind::Connector));
        if target_is_connector {
            continue;
        }

        let weight = if contained_in_subprocess(g, &e) {
            WEIGHT_DEFAULT_EDGE_IN_SUBPROCESS
        } else {
            WEIGHT_DEFAULT_EDGE
        };
        let minlen = edge_min_length(g, &e, allow_flatwise, branch_types);

        if let Some(label) = g.edge_mut_by_key(&e) {
            label.weight = weight;
            label.minlen = minlen;
        }
    }
}

fn edge_min_length(
    g: &FlowGraph,
    e: &EdgeKey,
    allow_flatwise: bool,
    branch_types: &FxHashMap<String, u8>,
) -> usize {
    let (direction, grouped) = g
        .edge_by_key(e)
        .map(|l| (l.direction, l.target_group.is_some()))
        .unwrap_or_default();

    if is_flatwise_connector_grouping_edge(g, e) && !is_straight_branch(direction) {
        MIN_LENGTH_FLATWISE_BRANCH
    } else if is_first_grouping_edge_to_succeeding_layers(g, e) {
        MIN_LENGTH_FLATWISE_BRANCH
    } else if !allow_flatwise
        || !is_flatwise_branch(direction)
        || is_flatwise_only(branch_types.get(&e.w).copied().unwrap_or_default())
        || grouped
    {
        MIN_LENGTH_DEFAULT_EDGE
    } else {
        MIN_LENGTH_FLATWISE_BRANCH
    }
}

/// A sideways branch that joins a grouping structure may stay in its
/// source's layer; the bend into the bus absorbs the direction change.
fn is_flatwise_connector_grouping_edge(g: &FlowGraph, e: &EdgeKey) -> bool {
    let source_dummy = g.node(&e.v).and_then(|n| n.dummy);
    let target_dummy = g.node(&e.w).and_then(|n| n.dummy);
    let source_original = !matches!(
        source_dummy,
        Some(DummyKind::GroupPreceding | DummyKind::GroupSucceeding)
    );
    let target_original = !matches!(
        target_dummy,
        Some(DummyKind::GroupPreceding | DummyKind::GroupSucceeding)
    );

    (g.in_degree(&e.w) > 1
        && source_original
        && target_dummy == Some(DummyKind::GroupPreceding))
        || (g.out_degree(&e.v) > 1
            && target_original
            && source_dummy == Some(DummyKind::GroupSucceeding))
}

fn is_first_grouping_edge_to_succeeding_layers(g: &FlowGraph, e: &EdgeKey) -> bool {
    let source_original = !g.node(&e.v).is_some_and(|n| n.is_grouping_dummy());
    source_original
        && g.node(&e.w).and_then(|n| n.dummy) == Some(DummyKind::GroupSucceeding)
}

fn contained_in_subprocess(g: &FlowGraph, e: &EdgeKey) -> bool {
    let (Some(source_parent), Some(target_parent)) = (g.parent(&e.v), g.parent(&e.w)) else {
        return false;
    };
    source_parent == target_parent
        && g.node(source_parent).is_some_and(|n| n.kind == NodeKind::Group)
}

/// Connects every source to a virtual root so the rank network is one
/// component. Pinned start events get a heavy zero-length tie to the root,
/// which holds them in the first layer.
fn insert_super_root(g: &mut FlowGraph) -> String {
    let pin = g.graph().options.pin_start_events;
    let ids = g.node_ids();
    let root = util::add_dummy_node(g, NodeLabel::default(), "_root");

    for v in ids {
        if g.in_degree(&v) > 0 {
            continue;
        }
        let weight = if pin && g.node(&v).is_some_and(|n| n.kind.is_start_event()) {
            100.0
        } else {
            0.0
        };
        g.set_edge_with_label(
            root.clone(),
            v,
            EdgeLabel {
                weight,
                minlen: 0,
                ..Default::default()
            },
        );
    }
    root
}

fn is_degree_one_node(g: &FlowGraph, v: &str) -> bool {
    g.node_edges(v).len() == 1
}

/// An end event hanging off a busy node reads better in that node's own
/// layer; the router then draws the edge flat. Only applies when the
/// neighbor has capacity on the relevant side.
fn handle_degree_one_node(g: &mut FlowGraph, v: &str) {
    let Some(node) = g.node(v) else {
        return;
    };
    if !node.kind.is_event() || node.kind.is_start_event() {
        return;
    }

    let edges = g.node_edges(v);
    let Some(real) = edges.first() else {
        return;
    };
    let opposite = if real.w == v {
        real.v.clone()
    } else {
        real.w.clone()
    };

    let rank = |g: &FlowGraph, v: &str| util::rank_of(g, v).unwrap_or_default();

    let mut same_layer = 0usize;
    let mut opposite_out = 0usize;
    let mut opposite_in = 0usize;
    for e in g.out_edges(&opposite, None) {
        if e == *real {
            continue;
        }
        let diff = rank(g, &e.v) - rank(g, &e.w);
        if diff > 0 {
            opposite_in += 1;
        } else if diff == 0 {
            same_layer += 1;
        } else {
            opposite_out += 1;
        }
    }
    for e in g.in_edges(&opposite, None) {
        if e == *real {
            continue;
        }
        let diff = rank(g, &e.v) - rank(g, &e.w);
        if diff > 0 {
            opposite_out += 1;
        } else if diff == 0 {
            same_layer += 1;
        } else {
            opposite_in += 1;
        }
    }

    let pull = (real.w == v && same_layer < 2 && opposite_out >= 1 && opposite_in <= 2)
        || (real.v == v && same_layer < 2 && opposite_in >= 1 && opposite_out <= 2);
    if pull {
        let opposite_rank = util::rank_of(g, &opposite);
        if let Some(label) = g.node_mut(v) {
            label.rank = opposite_rank;
        }
    }
}

/// Removes empty layers and shifts the lowest layer to zero. Returns the
/// layer count.
fn normalize(g: &mut FlowGraph) -> usize {
    let mut nodes: Vec<(i32, String)> = g
        .node_ids()
        .into_iter()
        .filter_map(|v| util::rank_of(g, &v).map(|r| (r, v)))
        .collect();
    if nodes.is_empty() {
        return 0;
    }
    nodes.sort_by_key(|(r, _)| *r);

    let mut last = nodes[0].0;
    let mut dense = 0i32;
    for (r, v) in nodes {
        if r != last {
            dense += 1;
            last = r;
        }
        if let Some(label) = g.node_mut(&v) {
            label.rank = Some(dense);
        }
    }
    (dense + 1) as usize
}
