//! Port-side decisions once sequencing within layers is fixed.
//!
//! Three passes over the sequenced graph, in order: same-layer stubs and
//! still-ambiguous flatwise edges get sides from their sequence positions,
//! then the alignment result pins critical edges straight while pushing
//! their siblings to the layer extremes, and finally cross-lane message
//! flows are forced onto the lane-facing side of their activity endpoints.
//! A later decision may overwrite an earlier one; ends the caller pinned
//! with a fixed candidate or a cross-flow port are never touched.

use std::cmp::Ordering;

use rustc_hash::FxHashSet;

use crate::alignment::{self, EdgeLengths};
use crate::graphlib::EdgeKey;
use crate::model::{DummyKind, Orientation, PortSide};
use crate::{EdgeLabel, FlowGraph, util};

pub fn run(g: &mut FlowGraph, lengths: &EdgeLengths) {
    optimize_same_layer_stubs(g);
    optimize_flatwise_edges(g);
    optimize_for_alignment(g, lengths);
    optimize_message_nodes(g);

    tracing::debug!(
        decided = g
            .edge_keys()
            .iter()
            .filter(|e| {
                g.edge_by_key(e)
                    .is_some_and(|l| l.source_port.is_some() || l.target_port.is_some())
            })
            .count(),
        "port sides assigned"
    );
}

/// In-edges of `v` ordered by source position; ties fall back to the port
/// sides at either end.
pub(crate) fn sorted_in_edges(g: &FlowGraph, v: &str) -> Vec<EdgeKey> {
    let mut edges = g.in_edges(v, None);
    edges.sort_by(|a, b| position_edge_cmp(g, true, a, b));
    edges
}

/// Out-edges of `v` ordered by target position.
pub(crate) fn sorted_out_edges(g: &FlowGraph, v: &str) -> Vec<EdgeKey> {
    let mut edges = g.out_edges(v, None);
    edges.sort_by(|a, b| position_edge_cmp(g, false, a, b));
    edges
}

/// Orders edges between the same layers by the position of the varying end,
/// breaking ties by the port side at the specified end, then at the opposite
/// end. The low side sorts first, the high side last, everything else is
/// neutral.
fn position_edge_cmp(g: &FlowGraph, at_source: bool, a: &EdgeKey, b: &EdgeKey) -> Ordering {
    let (na, nb) = if at_source { (&a.v, &b.v) } else { (&a.w, &b.w) };
    let by_position = util::order_of(g, na)
        .unwrap_or(0)
        .cmp(&util::order_of(g, nb).unwrap_or(0));
    if by_position != Ordering::Equal {
        return by_position;
    }

    let orientation = g.graph().options.orientation;
    let side_rank = |e: &EdgeKey, source_end: bool| -> u8 {
        let side = g.edge_by_key(e).and_then(|l| {
            if source_end {
                l.source_port
            } else {
                l.target_port
            }
        });
        match side {
            Some(s) if s == orientation.low_side() => 0,
            Some(s) if s == orientation.high_side() => 2,
            _ => 1,
        }
    };
    side_rank(a, at_source)
        .cmp(&side_rank(b, at_source))
        .then_with(|| side_rank(a, !at_source).cmp(&side_rank(b, !at_source)))
}

fn set_port(g: &mut FlowGraph, e: &EdgeKey, at_source: bool, side: PortSide) {
    if let Some(label) = g.edge_mut_by_key(e) {
        if at_source {
            label.source_port = Some(side);
        } else {
            label.target_port = Some(side);
        }
    }
}

fn set_optimized_port(
    g: &mut FlowGraph,
    e: &EdgeKey,
    at_source: bool,
    side: PortSide,
    orientation: Orientation,
) {
    if !is_at_preferred_port(g, e, at_source, orientation) {
        set_port(g, e, at_source, side);
    }
}

/// An end already sits at its preferred port when the edge (or, for chain
/// segments, the replaced original) carries a fixed candidate or a
/// cross-flow port there.
fn is_at_preferred_port(g: &FlowGraph, e: &EdgeKey, at_source: bool, o: Orientation) -> bool {
    let Some(label) = g.edge_by_key(e) else {
        return false;
    };
    let end_preferred = |l: &EdgeLabel, at_source: bool| {
        let (candidates, port) = if at_source {
            (&l.source_candidates, l.source_port)
        } else {
            (&l.target_candidates, l.target_port)
        };
        candidates.iter().any(|c| c.is_fixed()) || port.is_some_and(|p| o.is_flatwise(p))
    };
    if let Some((orig, stash)) = stashed_original(g, e) {
        let end_node = if at_source { &e.v } else { &e.w };
        end_preferred(stash, *end_node == orig.v)
    } else {
        end_preferred(label, at_source)
    }
}

/// Original key and stashed label for segments whose dummy endpoint holds
/// the replaced edge. Edges moved by the grouping keep their own label and
/// resolve to themselves.
fn stashed_original<'a>(g: &'a FlowGraph, e: &EdgeKey) -> Option<(&'a EdgeKey, &'a EdgeLabel)> {
    let orig = g.edge_by_key(e)?.original_edge.as_ref()?;
    for endpoint in [&e.v, &e.w] {
        if let Some(node) = g.node(endpoint) {
            if node.is_dummy() && node.edge_obj.as_ref() == Some(orig) {
                if let Some(stash) = node.edge_label.as_ref() {
                    return Some((orig, stash));
                }
            }
        }
    }
    None
}

/// Halves pointing into a same-layer collector attach on the side facing
/// the other endpoint, at both of their ends.
fn optimize_same_layer_stubs(g: &mut FlowGraph) {
    let orientation = g.graph().options.orientation;
    for e in g.edge_keys() {
        let is_stub = g
            .node(&e.w)
            .is_some_and(|n| n.dummy == Some(DummyKind::SameLayer));
        if !is_stub {
            continue;
        }
        let Some(side) = preferred_stub_side(g, &e, orientation) else {
            continue;
        };
        set_port(g, &e, true, side);
        set_port(g, &e, false, side);
    }
}

fn preferred_stub_side(g: &FlowGraph, half: &EdgeKey, orientation: Orientation) -> Option<PortSide> {
    let orig = g.node(&half.w)?.edge_obj.as_ref()?;
    let at_orig_source = half.v == orig.v;
    let s_pos = util::order_of(g, &orig.v).unwrap_or(0);
    let t_pos = util::order_of(g, &orig.w).unwrap_or(0);
    if (s_pos < t_pos) == at_orig_source {
        Some(orientation.high_side())
    } else {
        Some(orientation.low_side())
    }
}

/// Splits every node's still-ambiguous flatwise edges between the two
/// cross-flow sides, first half low, second half high, in position order
/// among all undecided edges of that side.
fn optimize_flatwise_edges(g: &mut FlowGraph) {
    let orientation = g.graph().options.orientation;
    for v in g.node_ids() {
        distribute_flatwise_edges(g, &v, true, orientation);
        distribute_flatwise_edges(g, &v, false, orientation);
    }
}

fn distribute_flatwise_edges(
    g: &mut FlowGraph,
    v: &str,
    at_source: bool,
    orientation: Orientation,
) {
    let edges = if at_source {
        g.out_edges(v, None)
    } else {
        g.in_edges(v, None)
    };

    let mut flatwise: FxHashSet<EdgeKey> = FxHashSet::default();
    let mut merged: Vec<EdgeKey> = Vec::new();
    for e in edges {
        let Some(label) = g.edge_by_key(&e) else {
            continue;
        };
        if label.has_flatwise_port(at_source, orientation) {
            continue;
        }
        if label.has_flatwise_candidates(at_source, orientation) {
            flatwise.insert(e.clone());
        }
        merged.push(e);
    }
    if flatwise.is_empty() {
        return;
    }

    // The opposite end varies, so that is what the order goes by.
    merged.sort_by(|a, b| position_edge_cmp(g, !at_source, a, b));
    let half = merged.len() / 2;
    for (i, e) in merged.iter().enumerate() {
        if flatwise.contains(e) {
            let side = if i < half {
                orientation.low_side()
            } else {
                orientation.high_side()
            };
            set_port(g, e, at_source, side);
        }
    }
}

/// Pins every special node's critical edges straight and pushes the
/// remaining extremes outward; parallels of a critical edge with a
/// cross-flow port mirror that side at their opposite end.
fn optimize_for_alignment(g: &mut FlowGraph, lengths: &EdgeLengths) {
    let orientation = g.graph().options.orientation;
    for v in g.node_ids() {
        if !alignment::is_special_node(g, &v) || g.node_edges(&v).len() < 2 {
            continue;
        }
        let ins = sorted_in_edges(g, &v);
        let outs = sorted_out_edges(g, &v);
        let critical_in = critical_in_edge(g, &v, lengths);
        let critical_out = critical_out_edge(g, &v, lengths);

        if critical_in.is_some() || critical_out.is_some() {
            optimize_with_critical_edges(
                g,
                &v,
                &ins,
                &outs,
                critical_in.as_ref(),
                critical_out.as_ref(),
                orientation,
            );
        } else if ins.len() + outs.len() > 2 {
            optimize_without_critical_edges(g, &v, &ins, &outs, orientation);
        }

        if let Some(ci) = &critical_in {
            for e in &ins {
                if e != ci && e.v == ci.v {
                    let mirrored = g
                        .edge_by_key(e)
                        .and_then(|l| l.target_port)
                        .filter(|p| orientation.is_flatwise(*p));
                    if let Some(side) = mirrored {
                        set_port(g, e, true, side);
                    }
                }
            }
        }
        if let Some(co) = &critical_out {
            for e in &outs {
                if e != co && e.w == co.w {
                    let mirrored = g
                        .edge_by_key(e)
                        .and_then(|l| l.source_port)
                        .filter(|p| orientation.is_flatwise(*p));
                    if let Some(side) = mirrored {
                        set_port(g, e, false, side);
                    }
                }
            }
        }
    }
}

/// In-edge from the node's alignment partner, longest one on ties.
fn critical_in_edge(g: &FlowGraph, v: &str, lengths: &EdgeLengths) -> Option<EdgeKey> {
    let partner = g.node(v).and_then(|n| n.align_with.clone())?;
    let mut best: Option<EdgeKey> = None;
    for e in g.in_edges(v, None) {
        if e.v != partner {
            continue;
        }
        let better = match &best {
            Some(b) => lengths.get(b).copied().unwrap_or(0) < lengths.get(&e).copied().unwrap_or(0),
            None => true,
        };
        if better {
            best = Some(e);
        }
    }
    best
}

/// Out-edge to a node aligned with this one, longest one on ties.
fn critical_out_edge(g: &FlowGraph, v: &str, lengths: &EdgeLengths) -> Option<EdgeKey> {
    let mut best: Option<EdgeKey> = None;
    for e in g.out_edges(v, None) {
        if g.node(&e.w).and_then(|n| n.align_with.as_deref()) != Some(v) {
            continue;
        }
        let better = match &best {
            Some(b) => lengths.get(b).copied().unwrap_or(0) < lengths.get(&e).copied().unwrap_or(0),
            None => true,
        };
        if better {
            best = Some(e);
        }
    }
    best
}

fn optimize_without_critical_edges(
    g: &mut FlowGraph,
    v: &str,
    ins: &[EdgeKey],
    outs: &[EdgeKey],
    orientation: Orientation,
) {
    let low = orientation.low_side();
    let high = orientation.high_side();

    if outs.len() > ins.len() {
        let (Some(first_out), Some(last_out)) = (outs.first(), outs.last()) else {
            return;
        };
        if !has_same_layer_edge(g, v, true)
            && !is_at_preferred_port(g, first_out, true, orientation)
            && (outs.len() != 2
                || !is_to_high_partition(g, &first_out.v, &first_out.w)
                || has_same_layer_edge(g, v, false))
        {
            set_port(g, first_out, true, low);
        }
        if !has_same_layer_edge(g, v, false)
            && !is_at_preferred_port(g, last_out, true, orientation)
            && (outs.len() != 2 || !is_to_low_partition(g, &last_out.v, &last_out.w))
        {
            set_port(g, last_out, true, high);
        }
    } else {
        let (Some(first_in), Some(last_in)) = (ins.first(), ins.last()) else {
            return;
        };
        let degree = ins.len() + outs.len();
        if !has_same_layer_edge(g, v, true)
            && !is_at_preferred_port(g, first_in, false, orientation)
            && (degree != 3
                || !is_to_high_partition(g, &first_in.w, &first_in.v)
                || has_same_layer_edge(g, v, false))
        {
            set_port(g, first_in, false, low);
        }
        if !has_same_layer_edge(g, v, false)
            && !is_at_preferred_port(g, last_in, false, orientation)
            && (degree != 3 || !is_to_low_partition(g, &last_in.w, &last_in.v))
        {
            set_port(g, last_in, false, high);
        }
    }
}

fn optimize_with_critical_edges(
    g: &mut FlowGraph,
    v: &str,
    ins: &[EdgeKey],
    outs: &[EdgeKey],
    critical_in: Option<&EdgeKey>,
    critical_out: Option<&EdgeKey>,
    orientation: Orientation,
) {
    let low = orientation.low_side();
    let high = orientation.high_side();
    let first_in = ins.first();
    let last_in = ins.last();
    let first_out = outs.first();
    let last_out = outs.last();
    let degree = ins.len() + outs.len();

    if degree == 3 && outs.len() == 2 && critical_out.is_none() {
        // Lone critical in-edge, two free out-edges.
        let (Some(first_out), Some(last_out)) = (first_out, last_out) else {
            return;
        };
        if (!is_to_high_partition(g, &first_out.v, &first_out.w) && is_back_edge(g, first_out))
            || is_to_low_partition(g, &first_out.v, &first_out.w)
        {
            set_optimized_port(g, first_out, true, low, orientation);
            if (!is_to_low_partition(g, &last_out.v, &last_out.w) && is_back_edge(g, last_out))
                || is_to_high_partition(g, &last_out.v, &last_out.w)
            {
                set_optimized_port(g, last_out, true, high, orientation);
            }
        } else {
            set_optimized_port(g, last_out, true, high, orientation);
        }
    } else if degree == 3 && ins.len() == 2 && critical_in.is_none() {
        // Lone critical out-edge, two free in-edges.
        let (Some(first_in), Some(last_in)) = (first_in, last_in) else {
            return;
        };
        if (!is_to_high_partition(g, &first_in.w, &first_in.v) && is_back_edge(g, first_in))
            || is_to_low_partition(g, &first_in.w, &first_in.v)
        {
            set_optimized_port(g, first_in, false, low, orientation);
            if (!is_to_high_partition(g, &last_in.w, &last_in.v) && is_back_edge(g, last_in))
                || is_to_low_partition(g, &last_in.w, &last_in.v)
            {
                set_optimized_port(g, last_in, false, high, orientation);
            }
        } else {
            set_optimized_port(g, last_in, false, high, orientation);
        }
    } else if critical_in.is_none() || (outs.len() > ins.len() && critical_out.is_some()) {
        if !has_same_layer_edge(g, v, true) {
            if first_out != critical_out {
                if let Some(e) = first_out {
                    set_optimized_port(g, e, true, low, orientation);
                }
            } else if let Some(e) = first_in {
                if Some(e) != critical_in && ins.len() > 1 {
                    set_optimized_port(g, e, false, low, orientation);
                }
            }
        }
        if !has_same_layer_edge(g, v, false) {
            if last_out != critical_out {
                if let Some(e) = last_out {
                    set_optimized_port(g, e, true, high, orientation);
                }
            } else if let Some(e) = last_in {
                if Some(e) != critical_in && ins.len() > 1 {
                    set_optimized_port(g, e, false, high, orientation);
                }
            }
        }
    } else {
        if !has_same_layer_edge(g, v, true) {
            if first_in != critical_in {
                if let Some(e) = first_in {
                    set_optimized_port(g, e, false, low, orientation);
                }
            } else if let Some(e) = first_out {
                if Some(e) != critical_out && outs.len() > 1 {
                    set_optimized_port(g, e, true, low, orientation);
                }
            }
        }
        if !has_same_layer_edge(g, v, false) {
            if last_in != critical_in {
                if let Some(e) = last_in {
                    set_optimized_port(g, e, false, high, orientation);
                }
            } else if let Some(e) = last_out {
                if Some(e) != critical_out && outs.len() > 1 {
                    set_optimized_port(g, e, true, high, orientation);
                }
            }
        }
    }
}

/// Cross-lane message flows leave their activity endpoints on the side
/// facing the other lane; the last word on those ends.
fn optimize_message_nodes(g: &mut FlowGraph) {
    let orientation = g.graph().options.orientation;
    let low = orientation.low_side();
    let high = orientation.high_side();

    for e in g.edge_keys() {
        let Some(label) = g.edge_by_key(&e) else {
            continue;
        };
        if !label.kind.is_message_flow() {
            continue;
        }
        let orig = label.original_edge.clone().unwrap_or_else(|| e.clone());
        let source_lane = g.node(&orig.v).and_then(|n| n.lane);
        let target_lane = g.node(&orig.w).and_then(|n| n.lane);
        let (Some(s_lane), Some(t_lane)) = (source_lane, target_lane) else {
            continue;
        };
        if s_lane == t_lane {
            continue;
        }

        let toward = |at_orig_source: bool| {
            if at_orig_source == (s_lane < t_lane) {
                high
            } else {
                low
            }
        };
        let eligible_v = g
            .node(&e.v)
            .is_some_and(|n| !n.is_dummy() && n.kind.is_activity());
        let eligible_w = g
            .node(&e.w)
            .is_some_and(|n| !n.is_dummy() && n.kind.is_activity());
        if eligible_v {
            let side = toward(e.v == orig.v);
            set_port(g, &e, true, side);
        }
        if eligible_w {
            let side = toward(e.w == orig.v);
            set_port(g, &e, false, side);
        }
    }
}

/// Same-layer edge from `v` toward lower (`low`) or higher positions, seen
/// through the collector registry.
fn has_same_layer_edge(g: &FlowGraph, v: &str, low: bool) -> bool {
    let Some(pos) = util::order_of(g, v) else {
        return false;
    };
    g.graph().same_layer_dummies.iter().any(|d| {
        let Some(key) = g.node(d).and_then(|n| n.edge_obj.as_ref()) else {
            return false;
        };
        let other = if key.v == v {
            &key.w
        } else if key.w == v {
            &key.v
        } else {
            return false;
        };
        match util::order_of(g, other) {
            Some(other_pos) => {
                if low {
                    other_pos < pos
                } else {
                    other_pos > pos
                }
            }
            None => false,
        }
    })
}

fn is_to_low_partition(g: &FlowGraph, from: &str, to: &str) -> bool {
    match (
        g.node(from).and_then(|n| n.lane),
        g.node(to).and_then(|n| n.lane),
    ) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}

fn is_to_high_partition(g: &FlowGraph, from: &str, to: &str) -> bool {
    match (
        g.node(from).and_then(|n| n.lane),
        g.node(to).and_then(|n| n.lane),
    ) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    }
}

/// After the cycle breaker's undo, a back edge is simply one pointing
/// against the rank order.
fn is_back_edge(g: &FlowGraph, e: &EdgeKey) -> bool {
    util::rank_of(g, &e.v).unwrap_or(0) > util::rank_of(g, &e.w).unwrap_or(0)
}
