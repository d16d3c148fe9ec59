use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{FlowGraph, NodeLabel};

static UNIQUE: AtomicUsize = AtomicUsize::new(0);

/// Process-wide counter for generated node/edge names.
pub fn unique_id() -> usize {
    UNIQUE.fetch_add(1, Ordering::SeqCst)
}

/// Inserts `label` under the first free id derived from `prefix` and returns
/// that id.
pub fn add_dummy_node(g: &mut FlowGraph, label: NodeLabel, prefix: &str) -> String {
    if !g.has_node(prefix) {
        g.set_node(prefix, label);
        return prefix.to_string();
    }
    for i in 1usize.. {
        let v = format!("{prefix}{i}");
        if !g.has_node(&v) {
            g.set_node(&v, label.clone());
            return v;
        }
    }
    unreachable!()
}

pub fn rank_of(g: &FlowGraph, v: &str) -> Option<i32> {
    g.node(v).and_then(|n| n.rank)
}

pub fn order_of(g: &FlowGraph, v: &str) -> Option<usize> {
    g.node(v).and_then(|n| n.order)
}

/// Nodes bucketed by rank (index 0 = lowest rank), each bucket sorted by
/// sequence order with insertion order as the tie-break. Nodes without a rank
/// are skipped.
pub fn build_layer_matrix(g: &FlowGraph) -> Vec<Vec<String>> {
    let mut ranked: Vec<(i32, usize, usize, String)> = Vec::new();
    for (pos, id) in g.node_ids().into_iter().enumerate() {
        let Some(rank) = rank_of(g, &id) else { continue };
        let order = order_of(g, &id).unwrap_or(pos);
        ranked.push((rank, order, pos, id));
    }
    let Some(min_rank) = ranked.iter().map(|r| r.0).min() else {
        return Vec::new();
    };
    let max_rank = ranked.iter().map(|r| r.0).max().unwrap_or(min_rank);

    let mut matrix: Vec<Vec<(usize, usize, String)>> =
        vec![Vec::new(); (max_rank - min_rank + 1) as usize];
    for (rank, order, pos, id) in ranked {
        matrix[(rank - min_rank) as usize].push((order, pos, id));
    }
    matrix
        .into_iter()
        .map(|mut layer| {
            layer.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
            layer.into_iter().map(|(_, _, id)| id).collect()
        })
        .collect()
}
