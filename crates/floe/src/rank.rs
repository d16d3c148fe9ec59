//! Rank assignment: minimize total weighted edge length subject to
//! `rank(target) - rank(source) >= minlen(edge)`.
//!
//! Both the Layerer and the Alignment Calculator feed their constraint
//! networks through this module. The solver is the classic network simplex
//! over a tight spanning tree, seeded by a longest-path ranking.

use crate::FlowGraph;
use crate::error::{Error, Result};
use crate::graphlib::alg;

/// Ranks `g` in place with the network simplex. The graph must be acyclic
/// apart from self loops (those never enter the solver); a residual
/// multi-node cycle is a broken precondition and fails the invocation.
pub fn run(g: &mut FlowGraph) -> Result<()> {
    if g.node_count() == 0 {
        return Ok(());
    }
    if let Some(cycle) = alg::find_cycles(g).into_iter().find(|c| c.len() > 1) {
        return Err(Error::ResidualCycle {
            node: cycle.first().cloned().unwrap_or_default(),
        });
    }
    network_simplex::network_simplex(g)
}

pub mod util {
    use rustc_hash::FxHashMap;

    use crate::graphlib::{EdgeKey, Graph, GraphOptions};
    use crate::{EdgeLabel, FlowGraph};

    /// Seeds every node with a feasible rank: sinks at 0, everything else as
    /// high as its out-edges allow.
    pub fn longest_path(g: &mut FlowGraph) {
        fn dfs(v: &str, g: &mut FlowGraph, memo: &mut FxHashMap<String, i32>) -> i32 {
            if let Some(&rank) = memo.get(v) {
                return rank;
            }
            // Mark before recursing; harmless for DAGs, terminates otherwise.
            memo.insert(v.to_string(), 0);

            let mut rank: Option<i32> = None;
            for e in g.out_edges(v, None) {
                let minlen = g.edge_by_key(&e).map(|l| l.minlen as i32).unwrap_or(1);
                let candidate = dfs(&e.w, g, memo) - minlen;
                rank = Some(rank.map_or(candidate, |r| r.min(candidate)));
            }

            let rank = rank.unwrap_or(0);
            if let Some(label) = g.node_mut(v) {
                label.rank = Some(rank);
            }
            memo.insert(v.to_string(), rank);
            rank
        }

        let mut memo: FxHashMap<String, i32> = FxHashMap::default();
        for v in g.sources() {
            dfs(&v, g, &mut memo);
        }
    }

    /// How much longer the edge is than it has to be.
    pub fn slack(g: &FlowGraph, e: &EdgeKey) -> i32 {
        let v_rank = g.node(&e.v).and_then(|n| n.rank).unwrap_or_default();
        let w_rank = g.node(&e.w).and_then(|n| n.rank).unwrap_or_default();
        let minlen = g.edge_by_key(e).map(|l| l.minlen as i32).unwrap_or(1);
        w_rank - v_rank - minlen
    }

    /// Collapses the multigraph into one edge per node pair: weights add up,
    /// the strictest minlen wins, self loops drop out. Rank labels computed on
    /// the result can be copied back by node id.
    pub fn simplify(g: &FlowGraph) -> FlowGraph {
        let mut simplified: FlowGraph = Graph::new(GraphOptions {
            multigraph: false,
            compound: false,
            ..Default::default()
        });
        simplified.set_graph(g.graph().clone());

        for v in g.node_ids() {
            if let Some(label) = g.node(&v) {
                simplified.set_node(v, label.clone());
            }
        }
        for e in g.edge_keys() {
            if e.is_self_loop() {
                continue;
            }
            let label = g.edge_by_key(&e).cloned().unwrap_or_default();
            match simplified.edge_mut(&e.v, &e.w, None) {
                Some(merged) => {
                    merged.weight += label.weight;
                    merged.minlen = merged.minlen.max(label.minlen);
                }
                None => {
                    simplified.set_edge_with_label(
                        e.v.clone(),
                        e.w.clone(),
                        EdgeLabel {
                            weight: label.weight,
                            minlen: label.minlen,
                            ..Default::default()
                        },
                    );
                }
            }
        }

        simplified
    }
}

pub mod tree {
    /// Spanning-tree bookkeeping for the simplex: postorder interval
    /// `low..=lim` plus the parent link of the rooted tree.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct TreeNodeLabel {
        pub low: i32,
        pub lim: i32,
        pub parent: Option<String>,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct TreeEdgeLabel {
        pub cutvalue: f64,
    }

    pub type TreeGraph =
        crate::graphlib::Graph<TreeNodeLabel, TreeEdgeLabel, ()>;
}

pub mod feasible_tree {
    use super::tree::{TreeGraph, TreeNodeLabel};
    use super::util;
    use crate::FlowGraph;
    use crate::error::{Error, Result};
    use crate::graphlib::{EdgeKey, Graph, GraphOptions};

    /// Grows a spanning tree of tight edges, shifting the tree's ranks until
    /// every node is reached. The graph must be connected.
    pub fn feasible_tree(g: &mut FlowGraph) -> Result<TreeGraph> {
        let mut t: TreeGraph = Graph::new(GraphOptions {
            directed: false,
            ..Default::default()
        });

        let Some(start) = g.nodes().next().map(|s| s.to_string()) else {
            return Ok(t);
        };
        let size = g.node_count();
        t.set_node(start, TreeNodeLabel::default());

        while tight_tree(&mut t, g) < size {
            let Some(edge) = find_min_slack_edge(&t, g) else {
                let outside = g
                    .node_ids()
                    .into_iter()
                    .find(|v| !t.has_node(v))
                    .unwrap_or_default();
                return Err(Error::DisconnectedNetwork { node: outside });
            };
            let slack = util::slack(g, &edge);
            let delta = if t.has_node(&edge.v) { slack } else { -slack };
            for v in t.node_ids() {
                if let Some(label) = g.node_mut(&v) {
                    label.rank = Some(label.rank.unwrap_or_default() + delta);
                }
            }
        }

        Ok(t)
    }

    /// Pulls every node reachable over slack-0 edges into the tree; returns
    /// the tree size.
    fn tight_tree(t: &mut TreeGraph, g: &FlowGraph) -> usize {
        let mut stack: Vec<String> = t.node_ids();
        while let Some(v) = stack.pop() {
            for e in g.node_edges(&v) {
                let w = if v == e.v { e.w.as_str() } else { e.v.as_str() };
                if !t.has_node(w) && util::slack(g, &e) == 0 {
                    t.set_node(w.to_string(), TreeNodeLabel::default());
                    t.set_edge(v.clone(), w.to_string());
                    stack.push(w.to_string());
                }
            }
        }
        t.node_count()
    }

    fn find_min_slack_edge(t: &TreeGraph, g: &FlowGraph) -> Option<EdgeKey> {
        let mut best: Option<(i32, EdgeKey)> = None;
        for e in g.edges() {
            if t.has_node(&e.v) == t.has_node(&e.w) {
                continue;
            }
            let edge_slack = util::slack(g, e);
            if best.as_ref().is_none_or(|(s, _)| edge_slack < *s) {
                best = Some((edge_slack, e.clone()));
            }
        }
        best.map(|(_, e)| e)
    }
}

pub mod network_simplex {
    use rustc_hash::FxHashSet;

    use super::feasible_tree::feasible_tree;
    use super::tree::{TreeGraph, TreeNodeLabel};
    use super::util;
    use crate::FlowGraph;
    use crate::error::{Error, Result};
    use crate::graphlib::{EdgeKey, alg};

    pub fn network_simplex(g: &mut FlowGraph) -> Result<()> {
        let mut simplified = util::simplify(g);
        util::longest_path(&mut simplified);
        let mut t = feasible_tree(&mut simplified)?;
        init_low_lim_values(&mut t, None);
        init_cut_values(&mut t, &simplified);

        while let Some(e) = leave_edge(&t) {
            let f = enter_edge(&t, &simplified, &e)?;
            exchange_edges(&mut t, &mut simplified, &e, &f);
        }

        for v in g.node_ids() {
            if let Some(rank) = simplified.node(&v).and_then(|n| n.rank) {
                if let Some(label) = g.node_mut(&v) {
                    label.rank = Some(rank);
                }
            }
        }
        Ok(())
    }

    /// Roots the tree and numbers nodes with postorder `low`/`lim` intervals,
    /// so subtree membership is one comparison.
    pub fn init_low_lim_values(t: &mut TreeGraph, root: Option<&str>) {
        let Some(root) = root
            .map(|s| s.to_string())
            .or_else(|| t.nodes().next().map(|s| s.to_string()))
        else {
            return;
        };

        let mut visited: FxHashSet<String> = FxHashSet::default();
        dfs_low_lim(t, &mut visited, 1, &root, None);
    }

    fn dfs_low_lim(
        t: &mut TreeGraph,
        visited: &mut FxHashSet<String>,
        mut next_lim: i32,
        v: &str,
        parent: Option<&str>,
    ) -> i32 {
        let low = next_lim;
        visited.insert(v.to_string());

        let neighbors: Vec<String> = t.neighbors(v).into_iter().map(|s| s.to_string()).collect();
        for w in neighbors {
            if !visited.contains(&w) {
                next_lim = dfs_low_lim(t, visited, next_lim, &w, Some(v));
            }
        }

        if let Some(label) = t.node_mut(v) {
            label.low = low;
            label.lim = next_lim;
            label.parent = parent.map(|p| p.to_string());
        }
        next_lim + 1
    }

    pub fn init_cut_values(t: &mut TreeGraph, g: &FlowGraph) {
        let roots: Vec<&str> = t.nodes().collect();
        let mut vs = alg::postorder(t, &roots);
        vs.pop(); // the root has no parent edge
        for v in vs {
            let cutvalue = calc_cut_value(t, g, &v);
            let Some(parent) = t.node(&v).and_then(|l| l.parent.clone()) else {
                continue;
            };
            if let Some(edge) = t.edge_mut(&v, &parent, None) {
                edge.cutvalue = cutvalue;
            }
        }
    }

    /// Weight crossing the tree edge (child, parent) from the tail component
    /// toward the head component, folding in the children's cut values.
    pub fn calc_cut_value(t: &TreeGraph, g: &FlowGraph, child: &str) -> f64 {
        let Some(parent) = t.node(child).and_then(|l| l.parent.clone()) else {
            return 0.0;
        };

        // Direction of the underlying graph edge.
        let mut child_is_tail = true;
        let mut graph_edge = g.edge(child, &parent, None);
        if graph_edge.is_none() {
            child_is_tail = false;
            graph_edge = g.edge(&parent, child, None);
        }
        let mut cut_value = graph_edge.map(|l| l.weight).unwrap_or_default();

        for e in g.node_edges(child) {
            let is_out_edge = e.v == child;
            let other = if is_out_edge { e.w.as_str() } else { e.v.as_str() };
            if other == parent {
                continue;
            }

            let points_to_head = is_out_edge == child_is_tail;
            let other_weight = g.edge_by_key(&e).map(|l| l.weight).unwrap_or_default();
            cut_value += if points_to_head {
                other_weight
            } else {
                -other_weight
            };

            if t.has_edge(child, other, None) {
                let other_cut = t
                    .edge(child, other, None)
                    .map(|l| l.cutvalue)
                    .unwrap_or_default();
                cut_value += if points_to_head { -other_cut } else { other_cut };
            }
        }

        cut_value
    }

    pub fn leave_edge(t: &TreeGraph) -> Option<EdgeKey> {
        t.edges()
            .find(|e| t.edge_by_key(e).is_some_and(|l| l.cutvalue < 0.0))
            .cloned()
    }

    pub fn enter_edge(t: &TreeGraph, g: &FlowGraph, edge: &EdgeKey) -> Result<EdgeKey> {
        let mut v = edge.v.clone();
        let mut w = edge.w.clone();
        if !g.has_edge(&v, &w, None) {
            std::mem::swap(&mut v, &mut w);
        }

        let v_label = t.node(&v).cloned().unwrap_or_default();
        let w_label = t.node(&w).cloned().unwrap_or_default();
        let (tail_label, flip) = if v_label.lim > w_label.lim {
            (&w_label, true)
        } else {
            (&v_label, false)
        };

        let mut best: Option<(i32, EdgeKey)> = None;
        for e in g.edges() {
            let v_desc = t
                .node(&e.v)
                .is_some_and(|l| in_subtree(l, tail_label));
            let w_desc = t
                .node(&e.w)
                .is_some_and(|l| in_subtree(l, tail_label));
            if flip == v_desc && flip != w_desc {
                let s = util::slack(g, e);
                if best.as_ref().is_none_or(|(bs, _)| s < *bs) {
                    best = Some((s, e.clone()));
                }
            }
        }

        best.map(|(_, e)| e).ok_or_else(|| Error::DisconnectedNetwork {
            node: edge.v.clone(),
        })
    }

    pub fn exchange_edges(t: &mut TreeGraph, g: &mut FlowGraph, e: &EdgeKey, f: &EdgeKey) {
        t.remove_edge(&e.v, &e.w, None);
        t.set_edge(f.v.clone(), f.w.clone());
        init_low_lim_values(t, None);
        init_cut_values(t, g);
        update_ranks(t, g);
    }

    fn update_ranks(t: &TreeGraph, g: &mut FlowGraph) {
        let Some(root) = t
            .node_ids()
            .into_iter()
            .find(|v| t.node(v).is_some_and(|l| l.parent.is_none()))
            .or_else(|| t.nodes().next().map(|v| v.to_string()))
        else {
            return;
        };

        for v in alg::preorder(t, &[root.as_str()]).into_iter().skip(1) {
            let Some(parent) = t.node(&v).and_then(|l| l.parent.clone()) else {
                continue;
            };
            let (minlen, flipped) = match g.edge(&v, &parent, None) {
                Some(e) => (e.minlen as i32, false),
                None => (
                    g.edge(&parent, &v, None).map(|e| e.minlen as i32).unwrap_or(1),
                    true,
                ),
            };
            let parent_rank = g.node(&parent).and_then(|n| n.rank).unwrap_or_default();
            let rank = if flipped {
                parent_rank + minlen
            } else {
                parent_rank - minlen
            };
            if let Some(label) = g.node_mut(&v) {
                label.rank = Some(rank);
            }
        }
    }

    fn in_subtree(v_label: &TreeNodeLabel, root_label: &TreeNodeLabel) -> bool {
        root_label.low <= v_label.lim && v_label.lim <= root_label.lim
    }
}
