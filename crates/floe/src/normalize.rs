//! Expands the ranked graph so that sequencing only ever sees unit spans:
//! an edge crossing several ranks becomes a chain of bend dummies, an edge
//! between equal ranks becomes a same-layer dummy with both endpoints
//! pointing into it. [`undo`] collapses the artifacts and concatenates the
//! routed segments back onto the replaced edges.

use crate::graphlib::EdgeKey;
use crate::model::{DummyKind, Point};
use crate::{EdgeLabel, FlowGraph, NodeLabel, util};

pub fn run(g: &mut FlowGraph) {
    g.graph_mut().dummy_chains.clear();
    g.graph_mut().same_layer_dummies.clear();
    for e in g.edge_keys() {
        normalize_edge(g, e);
    }
}

fn normalize_edge(g: &mut FlowGraph, e: EdgeKey) {
    if e.is_self_loop() {
        return;
    }
    let v_rank = g.node(&e.v).and_then(|n| n.rank).unwrap_or(0);
    let w_rank = g.node(&e.w).and_then(|n| n.rank).unwrap_or(0);
    let Some(mut label) = g.edge_by_key(&e).cloned() else {
        return;
    };

    if v_rank == w_rank {
        split_same_layer(g, e, label);
        return;
    }
    // Unit spans, forward or backward, go to the engine untouched.
    let step = (w_rank - v_rank).signum();
    if w_rank == v_rank + step {
        return;
    }

    g.remove_edge_key(&e);
    label.points.clear();

    let lane = shared_lane(g, &e);
    let mut prev = e.v.clone();
    let mut first_dummy = true;
    let mut r = v_rank + step;

    while r != w_rank {
        let dummy_id = util::add_dummy_node(
            g,
            NodeLabel {
                rank: Some(r),
                lane,
                dummy: Some(DummyKind::Bend),
                edge_obj: Some(e.clone()),
                edge_label: Some(label.clone()),
                ..Default::default()
            },
            "_b",
        );
        if first_dummy {
            first_dummy = false;
            g.graph_mut().dummy_chains.push(dummy_id.clone());
        }
        g.set_edge_named(
            prev,
            dummy_id.clone(),
            e.name.clone(),
            Some(segment_label(&e, &label)),
        );
        prev = dummy_id;
        r += step;
    }

    g.set_edge_named(prev, e.w.clone(), e.name.clone(), Some(segment_label(&e, &label)));
}

/// Both halves point into the dummy; the shape (in-degree 2, out-degree 0)
/// is what the port optimizer keys on after sequencing.
fn split_same_layer(g: &mut FlowGraph, e: EdgeKey, label: EdgeLabel) {
    g.remove_edge_key(&e);

    let rank = g.node(&e.v).and_then(|n| n.rank);
    let lane = shared_lane(g, &e);
    let dummy_id = util::add_dummy_node(
        g,
        NodeLabel {
            rank,
            lane,
            dummy: Some(DummyKind::SameLayer),
            edge_obj: Some(e.clone()),
            edge_label: Some(label.clone()),
            ..Default::default()
        },
        "_s",
    );
    g.graph_mut().same_layer_dummies.push(dummy_id.clone());

    let mut half = segment_label(&e, &label);
    half.minlen = 0;
    g.set_edge_named(e.v.clone(), dummy_id.clone(), e.name.clone(), Some(half.clone()));
    g.set_edge_named(e.w.clone(), dummy_id, e.name.clone(), Some(half));
}

fn segment_label(e: &EdgeKey, label: &EdgeLabel) -> EdgeLabel {
    EdgeLabel {
        kind: label.kind,
        weight: label.weight,
        direction: label.direction,
        original_edge: Some(e.clone()),
        ..Default::default()
    }
}

fn shared_lane(g: &FlowGraph, e: &EdgeKey) -> Option<usize> {
    let v_lane = g.node(&e.v).and_then(|n| n.lane);
    let w_lane = g.node(&e.w).and_then(|n| n.lane);
    if v_lane == w_lane { v_lane } else { None }
}

pub fn undo(g: &mut FlowGraph) {
    let chains = g.graph().dummy_chains.clone();
    for start in chains {
        collapse_chain(g, &start);
    }
    g.graph_mut().dummy_chains.clear();

    let dummies = g.graph().same_layer_dummies.clone();
    for dummy in dummies {
        merge_same_layer(g, &dummy);
    }
    g.graph_mut().same_layer_dummies.clear();
}

fn collapse_chain(g: &mut FlowGraph, start: &str) {
    let Some(start_node) = g.node(start) else {
        return;
    };
    let Some(mut orig_label) = start_node.edge_label.clone() else {
        return;
    };
    let Some(edge_obj) = start_node.edge_obj.clone() else {
        return;
    };

    // Port decisions made after sequencing live on the outermost segments.
    if let Some(key) = g.in_edges(start, None).first() {
        orig_label.source_port = g.edge_by_key(key).and_then(|l| l.source_port);
    }

    let mut v = start.to_string();
    while let Some(node) = g.node(&v) {
        if node.dummy.is_none() {
            break;
        }
        let w = g
            .successors(&v)
            .first()
            .map(|s| s.to_string())
            .unwrap_or_default();
        if let (Some(x), Some(y)) = (node.x, node.y) {
            orig_label.points.push(Point { x, y });
        }
        if !w.is_empty() && g.node(&w).is_some_and(|n| n.dummy.is_none()) {
            if let Some(key) = g.out_edges(&v, Some(&w)).first() {
                orig_label.target_port = g.edge_by_key(key).and_then(|l| l.target_port);
            }
        }
        g.remove_node(&v);
        v = w;
        if v.is_empty() {
            break;
        }
    }

    g.set_edge_key(edge_obj, orig_label);
}

fn merge_same_layer(g: &mut FlowGraph, dummy: &str) {
    let Some(node) = g.node(dummy) else {
        return;
    };
    let Some(mut orig_label) = node.edge_label.clone() else {
        return;
    };
    let Some(edge_obj) = node.edge_obj.clone() else {
        return;
    };
    let anchor = match (node.x, node.y) {
        (Some(x), Some(y)) => Some(Point { x, y }),
        _ => None,
    };

    // Forward half runs source-to-dummy, the other half target-to-dummy.
    let mut forward: Vec<Point> = Vec::new();
    let mut backward: Vec<Point> = Vec::new();
    for key in g.in_edges(dummy, None) {
        let Some(half) = g.edge_by_key(&key) else {
            continue;
        };
        if key.v == edge_obj.v {
            forward = half.points.clone();
            orig_label.source_port = half.source_port;
        } else {
            backward = half.points.clone();
            orig_label.target_port = half.source_port;
        }
    }

    orig_label.points = forward;
    if let Some(p) = anchor {
        if orig_label.points.last() != Some(&p) {
            orig_label.points.push(p);
        }
    }
    orig_label.points.extend(backward.into_iter().rev());

    g.remove_node(dummy);
    g.set_edge_key(edge_obj, orig_label);
}
