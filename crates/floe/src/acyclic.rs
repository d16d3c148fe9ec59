//! Cycle Breaker: reverses a small set of flow edges so ranking sees a DAG.
//!
//! Message flows, associations and self loops are taken out of the graph for
//! the duration of `run` — they never constrain layering. A BFS layering from
//! the flow sources estimates each node's depth; edges running from deeper to
//! shallower nodes are likely back-edges and get a low weight, so the reversal
//! loop prefers them when it breaks a cycle.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::graphlib::{EdgeKey, alg};
use crate::{EdgeLabel, FlowGraph, util};

const WEIGHT_BACK_EDGE: f64 = 1.0;
const WEIGHT_FORWARD_EDGE: f64 = 5.0;

/// Breaks every cycle of the flow subgraph by reversing its cheapest edge.
/// Returns the reversed edges under their new keys; `undo` restores them.
pub fn run(g: &mut FlowGraph) -> Result<Vec<EdgeKey>> {
    let mut hidden: Vec<(EdgeKey, EdgeLabel)> = Vec::new();
    for key in g.edge_keys() {
        let Some(label) = g.edge_by_key(&key) else {
            continue;
        };
        if !label.kind.is_flow() || key.is_self_loop() {
            hidden.push((key.clone(), label.clone()));
            g.remove_edge_key(&key);
        }
    }
    let hidden_keys: FxHashSet<EdgeKey> = hidden.iter().map(|(k, _)| k.clone()).collect();

    let mut weights = edge_weights(g);
    let mut reversed: Vec<EdgeKey> = Vec::new();
    let cap = g.edge_count() + 1;
    let mut iterations = 0usize;

    loop {
        let cycles = alg::find_cycles(g);
        let Some(cycle) = cycles.first() else { break };
        if iterations >= cap {
            for (key, label) in hidden {
                g.set_edge_key(key, label);
            }
            return Err(Error::CycleBreakerStalled { iterations });
        }
        iterations += 1;

        let members: FxHashSet<&str> = cycle.iter().map(|v| v.as_str()).collect();
        let mut best: Option<(EdgeKey, f64)> = None;
        for v in cycle {
            for key in g.out_edges(v, None) {
                if key.is_self_loop() || !members.contains(key.w.as_str()) {
                    continue;
                }
                let weight = weights.get(&key).copied().unwrap_or(WEIGHT_FORWARD_EDGE);
                if best.as_ref().is_none_or(|(_, w)| weight < *w) {
                    best = Some((key, weight));
                }
            }
        }
        let Some((key, weight)) = best else { break };
        let new_key = reverse_edge(g, &key, &hidden_keys);
        weights.insert(new_key.clone(), weight);
        reversed.push(new_key);
    }

    tracing::debug!(reversed = reversed.len(), "cycle breaking done");
    for (key, label) in hidden {
        g.set_edge_key(key, label);
    }
    Ok(reversed)
}

/// Restores every edge the breaker reversed, under its original key.
pub fn undo(g: &mut FlowGraph) {
    for key in g.edge_keys() {
        let Some(label) = g.edge_by_key(&key) else {
            continue;
        };
        if !label.reversed {
            continue;
        }
        let mut label = label.clone();
        g.remove_edge_key(&key);
        let forward_name = label.forward_name.take();
        label.reversed = false;
        label.points.reverse();
        g.set_edge_named(key.w, key.v, forward_name, Some(label));
    }
}

fn edge_weights(g: &FlowGraph) -> FxHashMap<EdgeKey, f64> {
    let depth = bfs_depths(g);
    let mut weights = FxHashMap::default();
    for key in g.edge_keys() {
        let dv = depth.get(&key.v).copied().unwrap_or(0);
        let dw = depth.get(&key.w).copied().unwrap_or(0);
        let weight = if dv >= dw {
            WEIGHT_BACK_EDGE
        } else {
            WEIGHT_FORWARD_EDGE
        };
        weights.insert(key, weight);
    }
    weights
}

fn bfs_depths(g: &FlowGraph) -> FxHashMap<String, usize> {
    let mut depth: FxHashMap<String, usize> = FxHashMap::default();
    let mut queue: VecDeque<String> = VecDeque::new();
    for v in g.sources() {
        depth.insert(v.clone(), 0);
        queue.push_back(v);
    }
    while let Some(v) = queue.pop_front() {
        let next = depth.get(&v).copied().unwrap_or(0) + 1;
        for w in g.successors(&v) {
            if !depth.contains_key(w) {
                depth.insert(w.to_string(), next);
                queue.push_back(w.to_string());
            }
        }
    }
    depth
}

/// Flips one edge in place. Reversing an edge that is already marked reversed
/// restores it instead, so a double reversal round-trips.
fn reverse_edge(g: &mut FlowGraph, key: &EdgeKey, hidden: &FxHashSet<EdgeKey>) -> EdgeKey {
    let mut label = g.edge_by_key(key).cloned().unwrap_or_default();
    g.remove_edge_key(key);

    if label.reversed {
        let forward_name = label.forward_name.take();
        label.reversed = false;
        let new_key = EdgeKey::new(key.w.clone(), key.v.clone(), forward_name);
        g.set_edge_key(new_key.clone(), label);
        return new_key;
    }

    label.reversed = true;
    label.forward_name = key.name.clone();

    let mut name = key.name.clone();
    let collides = |g: &FlowGraph, name: &Option<String>| {
        let candidate = EdgeKey::new(key.w.clone(), key.v.clone(), name.clone());
        g.edge_by_key(&candidate).is_some() || hidden.contains(&candidate)
    };
    while collides(g, &name) {
        name = Some(format!("rev{}", util::unique_id()));
    }

    let new_key = EdgeKey::new(key.w.clone(), key.v.clone(), name);
    g.set_edge_key(new_key.clone(), label);
    new_key
}
