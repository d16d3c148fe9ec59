//! Decides which nodes should sit on one straight line once sequencing
//! within layers is fixed.
//!
//! A second constraint network is built over the sequenced graph: every
//! alignable edge pulls its endpoints toward a common "alignment layer"
//! through an absorber gadget, same-layer neighbours are kept at least one
//! alignment layer apart, and a global source/sink pair lets swim-lane
//! pressure lean whole nodes toward one lane edge. The network goes through
//! the same rank solver as the layerer; the resulting per-node alignment
//! layer is then turned into an `align_with` forest consumed by the port
//! optimizer.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::Result;
use crate::graphlib::{EdgeKey, Graph, GraphOptions, alg};
use crate::model::{DummyKind, Orientation, is_straight_branch};
use crate::{EdgeLabel, FlowGraph, NodeLabel, ports, rank, util};

/// Edge lengths steering the longest-path priority pass; the port optimizer
/// reuses them to break ties between critical-edge candidates.
pub type EdgeLengths = FxHashMap<EdgeKey, i64>;

const LENGTH_ZERO: i64 = 0;
const LENGTH_BASIC_DUMMY: i64 = 1;
const LENGTH_BASIC: i64 = 5;

pub const PRIORITY_LOW: f64 = 1.0;
pub const PRIORITY_BASIC: f64 = 3.0;
pub const PRIORITY_HIGH: f64 = 5000.0;

/// Which lane edge a node's cross-lane edges pull it toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaneLean {
    Low,
    High,
}

/// Computes `align_layer` and `align_with` for every node and returns the
/// edge lengths so the port optimizer can rank critical-edge candidates.
///
/// With swim lanes present the computation runs once per lane; nodes without
/// a lane are left unaligned so cross-lane lines never form.
pub fn run(g: &mut FlowGraph) -> Result<EdgeLengths> {
    for v in g.node_ids() {
        if let Some(label) = g.node_mut(&v) {
            label.align_layer = None;
            label.align_with = None;
        }
    }

    let alignable = mark_alignable(g);
    let lengths = determine_edge_lengths(g, &alignable);
    let priorities = determine_edge_priorities(g, &alignable, &lengths);

    let mut lanes: Vec<usize> = g
        .node_ids()
        .iter()
        .filter_map(|v| g.node(v).and_then(|n| n.lane))
        .collect();
    lanes.sort_unstable();
    lanes.dedup();

    if lanes.is_empty() {
        let scope = partition_scope(g, None);
        align_partition(g, &scope, &alignable, &priorities)?;
    } else {
        for lane in lanes {
            let scope = partition_scope(g, Some(lane));
            if scope.len() < 2 {
                continue;
            }
            align_partition(g, &scope, &alignable, &priorities)?;
        }
    }

    tracing::debug!(
        aligned = g
            .node_ids()
            .iter()
            .filter(|v| g.node(v).is_some_and(|n| n.align_with.is_some()))
            .count(),
        "alignment computed"
    );
    Ok(lengths)
}

/// Nodes taking part in one alignment computation. Same-layer collector
/// dummies never align; their edges enter the network through the
/// same-layer connector rule instead.
fn partition_scope(g: &FlowGraph, lane: Option<usize>) -> Vec<String> {
    g.node_ids()
        .into_iter()
        .filter(|v| {
            let Some(node) = g.node(v) else {
                return false;
            };
            if node.dummy == Some(DummyKind::SameLayer) {
                return false;
            }
            match lane {
                Some(lane) => node.lane == Some(lane),
                None => true,
            }
        })
        .collect()
}

fn mark_alignable(g: &FlowGraph) -> FxHashMap<EdgeKey, bool> {
    let orientation = g.graph().options.orientation;
    g.edge_keys()
        .into_iter()
        .map(|e| {
            let ok = is_alignable(g, orientation, &e);
            (e, ok)
        })
        .collect()
}

fn is_alignable(g: &FlowGraph, orientation: Orientation, e: &EdgeKey) -> bool {
    if e.is_self_loop() || touches_collector(g, e) {
        return false;
    }
    let Some(label) = g.edge_by_key(e) else {
        return false;
    };
    if label.kind.is_message_flow() {
        return false;
    }
    if label.has_flatwise_port(true, orientation)
        || label.has_flatwise_port(false, orientation)
        || label.has_flatwise_candidates(true, orientation)
        || label.has_flatwise_candidates(false, orientation)
    {
        return false;
    }
    let source_lane = g.node(&e.v).and_then(|n| n.lane);
    if let Some(lane) = source_lane {
        if g.node(&e.w).and_then(|n| n.lane) != Some(lane) {
            return false;
        }
    }
    match g.parent(&e.v) {
        Some(parent) => g.parent(&e.w) == Some(parent),
        None => true,
    }
}

fn touches_collector(g: &FlowGraph, e: &EdgeKey) -> bool {
    let collector = |v: &str| g.node(v).is_some_and(|n| n.dummy == Some(DummyKind::SameLayer));
    collector(&e.v) || collector(&e.w)
}

fn is_real_edge(g: &FlowGraph, e: &EdgeKey) -> bool {
    let real = |v: &str| g.node(v).is_some_and(|n| !n.is_dummy());
    real(&e.v) && real(&e.w)
}

/// Real node that may anchor an alignment line.
pub(crate) fn is_special_node(g: &FlowGraph, v: &str) -> bool {
    g.node(v)
        .is_some_and(|n| !n.is_dummy() && !n.kind.is_annotation())
}

/// Base lengths plus branch penalties at decision-like nodes. The penalties
/// steer the longest-path pass toward the visually straight-through pair of
/// edges at every 3-or-more-way branch or join.
fn determine_edge_lengths(g: &FlowGraph, alignable: &FxHashMap<EdgeKey, bool>) -> EdgeLengths {
    let orientation = g.graph().options.orientation;
    let mut lengths: EdgeLengths = FxHashMap::default();

    for e in g.edge_keys() {
        let Some(label) = g.edge_by_key(&e) else {
            continue;
        };
        let len = if label.has_flatwise_port(true, orientation)
            || label.has_flatwise_port(false, orientation)
        {
            LENGTH_ZERO
        } else if is_real_edge(g, &e) {
            LENGTH_BASIC
        } else {
            LENGTH_BASIC_DUMMY
        };
        lengths.insert(e, len);
    }

    let penalty = LENGTH_BASIC + g.node_count() as i64;
    let high_penalty = penalty * 8;

    for v in g.node_ids() {
        if !is_special_node(g, &v) || g.node_edges(&v).len() < 3 {
            continue;
        }
        let ins = ports::sorted_in_edges(g, &v);
        let outs = ports::sorted_out_edges(g, &v);

        if ins.len() == 2 && outs.len() == 2 {
            let alignable_edge = |e: &EdgeKey| alignable.get(e).copied().unwrap_or(false);
            let (first_in, last_in) = (&ins[0], &ins[1]);
            let (first_out, last_out) = (&outs[0], &outs[1]);
            // A pairing is blocked as soon as either of its edges cannot align.
            let prevent_first_in = !alignable_edge(first_in) || !alignable_edge(last_out);
            let prevent_first_out = !alignable_edge(first_out) || !alignable_edge(last_in);
            if !prevent_first_in || !prevent_first_out {
                if prevent_first_in {
                    lengths.insert(first_in.clone(), 0);
                    lengths.insert(last_out.clone(), 0);
                }
                if prevent_first_out {
                    lengths.insert(first_out.clone(), 0);
                    lengths.insert(last_in.clone(), 0);
                }
                let len = |e: &EdgeKey| lengths.get(e).copied().unwrap_or(0);
                let winners = if len(first_in) + len(last_out) > len(last_in) + len(first_out) {
                    [first_in, last_out]
                } else {
                    [last_in, first_out]
                };
                for e in winners {
                    *lengths.entry(e.clone()).or_insert(0) += high_penalty;
                }
                continue;
            }
        }

        let mut has_straight = false;
        for e in ins.iter().chain(outs.iter()) {
            let direction = g.edge_by_key(e).map(|l| l.direction).unwrap_or(0);
            if is_straight_branch(direction) {
                has_straight = true;
                *lengths.entry(e.clone()).or_insert(0) += penalty;
            }
        }
        if !has_straight {
            let larger = if outs.len() >= ins.len() { &outs } else { &ins };
            for e in larger.iter().skip(1).take(larger.len().saturating_sub(2)) {
                *lengths.entry(e.clone()).or_insert(0) += penalty;
            }
        }
    }

    lengths
}

/// Longest alignable chains win the high priority; everything else keeps the
/// basic one. Chains are extracted greedily per connected component, hiding
/// the nodes of each extracted path before looking for the next.
fn determine_edge_priorities(
    g: &FlowGraph,
    alignable: &FxHashMap<EdgeKey, bool>,
    lengths: &EdgeLengths,
) -> FxHashMap<EdgeKey, f64> {
    let mut priority: FxHashMap<EdgeKey, f64> = g
        .edge_keys()
        .into_iter()
        .map(|e| (e, PRIORITY_BASIC))
        .collect();

    let mut hidden: FxHashSet<String> = FxHashSet::default();
    for component in alignable_components(g, alignable) {
        loop {
            let path = longest_visible_path(g, &component, &hidden, alignable, lengths);
            if path.is_empty() {
                break;
            }
            for e in &path {
                priority.insert(e.clone(), PRIORITY_HIGH);
                hidden.insert(e.v.clone());
                hidden.insert(e.w.clone());
            }
        }
    }
    priority
}

/// Connected components over alignable edges only.
fn alignable_components(g: &FlowGraph, alignable: &FxHashMap<EdgeKey, bool>) -> Vec<Vec<String>> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut components = Vec::new();
    for v in g.node_ids() {
        if !seen.insert(v.clone()) {
            continue;
        }
        let mut component = vec![v.clone()];
        let mut queue: VecDeque<String> = VecDeque::from([v]);
        while let Some(x) = queue.pop_front() {
            for e in g.node_edges(&x) {
                if !alignable.get(&e).copied().unwrap_or(false) {
                    continue;
                }
                let other = if e.v == x { e.w } else { e.v };
                if seen.insert(other.clone()) {
                    component.push(other.clone());
                    queue.push_back(other);
                }
            }
        }
        components.push(component);
    }
    components
}

/// Longest path over the still-visible part of one component, orienting
/// every edge from its lower-rank endpoint so reversed-back cycle edges
/// cannot loop the walk.
fn longest_visible_path(
    g: &FlowGraph,
    component: &[String],
    hidden: &FxHashSet<String>,
    alignable: &FxHashMap<EdgeKey, bool>,
    lengths: &EdgeLengths,
) -> Vec<EdgeKey> {
    type Best = (i64, usize, Option<EdgeKey>);

    fn descend(
        g: &FlowGraph,
        v: &str,
        hidden: &FxHashSet<String>,
        alignable: &FxHashMap<EdgeKey, bool>,
        lengths: &EdgeLengths,
        memo: &mut FxHashMap<String, Best>,
    ) -> Best {
        if let Some(best) = memo.get(v) {
            return best.clone();
        }
        memo.insert(v.to_string(), (0, 0, None));

        let mut best: Best = (0, 0, None);
        for e in g.node_edges(v) {
            if !alignable.get(&e).copied().unwrap_or(false)
                || hidden.contains(&e.v)
                || hidden.contains(&e.w)
            {
                continue;
            }
            let v_rank = util::rank_of(g, &e.v).unwrap_or(0);
            let w_rank = util::rank_of(g, &e.w).unwrap_or(0);
            let (tail, head) = if v_rank < w_rank {
                (&e.v, &e.w)
            } else if w_rank < v_rank {
                (&e.w, &e.v)
            } else {
                continue;
            };
            if tail != v {
                continue;
            }
            let head = head.clone();
            let (total, hops, _) = descend(g, &head, hidden, alignable, lengths, memo);
            let length = lengths.get(&e).copied().unwrap_or(0);
            let candidate = (total + length, hops + 1);
            if candidate.0 > best.0 || (candidate.0 == best.0 && candidate.1 > best.1) {
                best = (candidate.0, candidate.1, Some(e));
            }
        }
        memo.insert(v.to_string(), best.clone());
        best
    }

    let mut memo: FxHashMap<String, Best> = FxHashMap::default();
    let mut start: Option<(i64, usize, String)> = None;
    for v in component {
        if hidden.contains(v) {
            continue;
        }
        let (total, hops, _) = descend(g, v, hidden, alignable, lengths, &mut memo);
        if hops == 0 {
            continue;
        }
        let better = match &start {
            Some((best_total, best_hops, _)) => {
                total > *best_total || (total == *best_total && hops > *best_hops)
            }
            None => true,
        };
        if better {
            start = Some((total, hops, v.clone()));
        }
    }

    let Some((_, _, mut v)) = start else {
        return Vec::new();
    };
    let mut path = Vec::new();
    while let Some((_, _, Some(e))) = memo.get(&v).cloned() {
        v = if e.v == v { e.w.clone() } else { e.v.clone() };
        path.push(e);
    }
    path
}

fn add_connector(
    network: &mut FlowGraph,
    seq: &mut usize,
    v: &str,
    w: &str,
    minlen: usize,
    weight: f64,
) -> EdgeKey {
    let key = EdgeKey::new(v, w, Some(format!("_c{}", *seq)));
    *seq += 1;
    network.set_edge_key(
        key.clone(),
        EdgeLabel {
            minlen,
            weight,
            ..Default::default()
        },
    );
    key
}

/// Builds and solves the alignment network for one partition, then writes
/// `align_layer`/`align_with` back onto the partition's nodes.
fn align_partition(
    g: &mut FlowGraph,
    scope: &[String],
    alignable: &FxHashMap<EdgeKey, bool>,
    priorities: &FxHashMap<EdgeKey, f64>,
) -> Result<()> {
    let orientation = g.graph().options.orientation;
    let in_scope: FxHashSet<&str> = scope.iter().map(String::as_str).collect();

    let mut network: FlowGraph = Graph::new(GraphOptions {
        directed: true,
        multigraph: true,
        compound: false,
    });
    for v in scope {
        network.set_node(v.clone(), NodeLabel::default());
    }
    let mut seq = 0usize;

    // Alignable edges pull both endpoints toward a shared absorber node.
    for e in g.edge_keys() {
        if e.is_self_loop()
            || !in_scope.contains(e.v.as_str())
            || !in_scope.contains(e.w.as_str())
            || !alignable.get(&e).copied().unwrap_or(false)
        {
            continue;
        }
        let absorber = util::add_dummy_node(&mut network, NodeLabel::default(), "_abs");
        let weight = priorities.get(&e).copied().unwrap_or(PRIORITY_BASIC);
        add_connector(&mut network, &mut seq, &e.v, &absorber, 0, weight);
        add_connector(&mut network, &mut seq, &e.w, &absorber, 0, weight);
    }

    // Same-layer edges keep their endpoints at least one alignment layer
    // apart, ordered by sequence position.
    for dummy in &g.graph().same_layer_dummies {
        let Some(key) = g.node(dummy).and_then(|n| n.edge_obj.clone()) else {
            continue;
        };
        if !in_scope.contains(key.v.as_str()) || !in_scope.contains(key.w.as_str()) {
            continue;
        }
        let v_order = util::order_of(g, &key.v).unwrap_or(0);
        let w_order = util::order_of(g, &key.w).unwrap_or(0);
        let (from, to) = if v_order <= w_order {
            (&key.v, &key.w)
        } else {
            (&key.w, &key.v)
        };
        add_connector(&mut network, &mut seq, from, to, 1, PRIORITY_BASIC);
    }

    // So do in-layer neighbours that are not otherwise connected.
    let mut by_position: Vec<&String> = scope.iter().collect();
    by_position.sort_by_key(|v| {
        (
            util::rank_of(g, v).unwrap_or(0),
            util::order_of(g, v).unwrap_or(0),
        )
    });
    for pair in by_position.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if util::rank_of(g, a) != util::rank_of(g, b) {
            continue;
        }
        if network.out_edges(a, Some(b)).is_empty() {
            add_connector(&mut network, &mut seq, a, b, 1, 0.0);
        }
    }

    // Edges already pinned to a cross-flow side order their endpoints
    // instead of aligning them, unless something else aligns the target.
    let mut weak_connectors: FxHashSet<EdgeKey> = FxHashSet::default();
    let low = orientation.low_side();
    let high = orientation.high_side();
    for e in g.edge_keys() {
        if e.is_self_loop()
            || !in_scope.contains(e.v.as_str())
            || !in_scope.contains(e.w.as_str())
            || alignable.get(&e).copied().unwrap_or(false)
        {
            continue;
        }
        let target_aligned = g
            .in_edges(&e.w, None)
            .iter()
            .any(|k| alignable.get(k).copied().unwrap_or(false));
        if target_aligned {
            continue;
        }
        let Some(label) = g.edge_by_key(&e) else {
            continue;
        };
        let (from, to) = if label.source_port == Some(low) || label.target_port == Some(high) {
            (&e.w, &e.v)
        } else if label.source_port == Some(high) || label.target_port == Some(low) {
            (&e.v, &e.w)
        } else {
            continue;
        };
        let key = add_connector(&mut network, &mut seq, from, to, 1, PRIORITY_BASIC);
        weak_connectors.insert(key);
    }

    // The ordering connectors may have closed a cycle; drop the weak ones
    // first, an arbitrary cycle edge as a last resort.
    loop {
        let Some(cycle) = alg::find_cycles(&network)
            .into_iter()
            .find(|c| c.len() > 1)
        else {
            break;
        };
        let members: FxHashSet<&str> = cycle.iter().map(String::as_str).collect();
        let inside: Vec<EdgeKey> = network
            .edge_keys()
            .into_iter()
            .filter(|k| members.contains(k.v.as_str()) && members.contains(k.w.as_str()))
            .collect();
        let victim = inside
            .iter()
            .find(|k| weak_connectors.contains(k))
            .or_else(|| inside.first())
            .cloned();
        let Some(victim) = victim else {
            break;
        };
        network.remove_edge_key(&victim);
    }

    // Swim-lane pressure: a cheaper path to the source pulls a node low,
    // to the sink high.
    let source = util::add_dummy_node(&mut network, NodeLabel::default(), "_src");
    let sink = util::add_dummy_node(&mut network, NodeLabel::default(), "_snk");
    for v in scope {
        let lean = lane_lean(g, v);
        let sink_weight = if lean == LaneLean::High { PRIORITY_LOW } else { 0.0 };
        let source_weight = if lean == LaneLean::Low { PRIORITY_LOW } else { 0.0 };
        add_connector(&mut network, &mut seq, v, &sink, 0, sink_weight);
        add_connector(&mut network, &mut seq, &source, v, 0, source_weight);
    }

    rank::run(&mut network)?;

    // Alignment layers are kept doubled so the bend offset stays integral.
    let mut doubled: FxHashMap<String, i64> = FxHashMap::default();
    for v in scope {
        let layer = util::rank_of(&network, v).unwrap_or(0) as i64;
        doubled.insert(v.clone(), 2 * layer);
    }

    adjust_bend_chains(g, scope, &in_scope, &mut doubled);

    let mut ordered: Vec<&String> = scope.iter().collect();
    ordered.sort_by_key(|v| {
        (
            doubled.get(v.as_str()).copied(),
            util::rank_of(g, v),
            util::order_of(g, v),
        )
    });
    for pair in ordered.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if doubled.get(a.as_str()) == doubled.get(b.as_str()) {
            if let Some(label) = g.node_mut(b) {
                label.align_with = Some(a.clone());
            }
        }
    }
    for v in scope {
        if let (Some(&layer), Some(label)) = (doubled.get(v.as_str()), g.node_mut(v)) {
            label.align_layer = Some(layer as f64 / 2.0);
        }
    }
    Ok(())
}

/// Offsets whole bend chains by half a layer when neither chain end aligns
/// with a real node, so bends never pretend to sit on a node's line.
fn adjust_bend_chains(
    g: &FlowGraph,
    scope: &[String],
    in_scope: &FxHashSet<&str>,
    doubled: &mut FxHashMap<String, i64>,
) {
    let is_bend = |v: &str| g.node(v).is_some_and(|n| n.is_bend());
    let mut seen: FxHashSet<String> = FxHashSet::default();

    for v in scope {
        if !is_bend(v) || seen.contains(v.as_str()) {
            continue;
        }
        let Some(&base) = doubled.get(v.as_str()) else {
            continue;
        };
        let mut chain = vec![v.clone()];
        seen.insert(v.clone());
        let mut aligns_with_node = false;

        let mut cursor = first_scope_edge(g, v, in_scope, true);
        while let Some(e) = cursor.take() {
            let up = e.v.clone();
            if is_bend(&up) && doubled.get(up.as_str()) == Some(&base) {
                seen.insert(up.clone());
                chain.push(up.clone());
                cursor = first_scope_edge(g, &up, in_scope, true);
            } else if !is_bend(&up) {
                aligns_with_node |= doubled.get(up.as_str()) == Some(&base);
            }
        }

        let mut cursor = first_scope_edge(g, v, in_scope, false);
        while let Some(e) = cursor.take() {
            let down = e.w.clone();
            if is_bend(&down) && doubled.get(down.as_str()) == Some(&base) {
                seen.insert(down.clone());
                chain.push(down.clone());
                cursor = first_scope_edge(g, &down, in_scope, false);
            } else if !is_bend(&down) {
                aligns_with_node |= doubled.get(down.as_str()) == Some(&base);
            }
        }

        if !aligns_with_node {
            for d in &chain {
                if let Some(layer) = doubled.get_mut(d.as_str()) {
                    *layer -= 1;
                }
            }
        }
    }
}

fn first_scope_edge(
    g: &FlowGraph,
    v: &str,
    in_scope: &FxHashSet<&str>,
    upstream: bool,
) -> Option<EdgeKey> {
    if upstream {
        g.in_edges(v, None)
            .into_iter()
            .find(|e| in_scope.contains(e.v.as_str()))
    } else {
        g.out_edges(v, None)
            .into_iter()
            .find(|e| in_scope.contains(e.w.as_str()))
    }
}

/// Counts a node's edges into lower vs. higher lanes; same-layer edges count
/// through their collector's provenance.
fn lane_lean(g: &FlowGraph, v: &str) -> LaneLean {
    let lane = g.node(v).and_then(|n| n.lane);
    let mut low = 0usize;
    let mut high = 0usize;
    {
        let mut count = |other: &str| {
            if let (Some(own), Some(theirs)) = (lane, g.node(other).and_then(|n| n.lane)) {
                if theirs < own {
                    low += 1;
                } else if theirs > own {
                    high += 1;
                }
            }
        };
        for e in g.node_edges(v) {
            let other = if e.v == v { &e.w } else { &e.v };
            count(other);
        }
        for dummy in &g.graph().same_layer_dummies {
            let Some(key) = g.node(dummy).and_then(|n| n.edge_obj.as_ref()) else {
                continue;
            };
            if key.v == v {
                count(&key.w);
            } else if key.w == v {
                count(&key.v);
            }
        }
    }
    if low > high {
        LaneLean::Low
    } else if high > low {
        LaneLean::High
    } else if g.graph().options.orientation.is_horizontal() {
        LaneLean::High
    } else {
        LaneLean::Low
    }
}
