//! Rewrites the input graph into the form the layout engine can layer and
//! route: port candidates for preferred edge directions, connector splits
//! for message and association edges, and in-edge grouping structures
//! ("buses") for edges that share a target. Every rewrite is reversible;
//! [`undo_grouping`] restores the original topology and concatenates the
//! routed path segments back onto the original edges.

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::graphlib::EdgeKey;
use crate::model::{
    DIR_AGAINST_THE_FLOW, DIR_FLATWISE, DIR_LEFT_IN_FLOW, DIR_RIGHT_IN_FLOW, DIR_WITH_THE_FLOW,
    DummyKind, Orientation, Point, PortCandidate, PortSide, direction_side, is_straight_branch,
};
use crate::{EdgeLabel, FlowGraph, NodeLabel, util};

pub const DUMMY_NODE_SIZE: f64 = 2.0;

/// Connector halves keep message/association edges from stretching the
/// layering: both halves point into the split node and carry no length.
pub const WEIGHT_MESSAGE_FLOW: f64 = 3.0;
pub const WEIGHT_ASSOCIATION: f64 = 2.0;

/// Translates the caller's preferred-direction masks into source port
/// candidates. A node with several left or several right branches gets
/// flatwise candidates instead, which reads better than forcing all of
/// them onto one side.
pub fn configure_preferred_directions(g: &mut FlowGraph) {
    let orientation = g.graph().options.orientation;

    for v in g.node_ids() {
        let mut left_count = 0;
        let mut right_count = 0;
        let out = g.out_edges(&v, None);

        for e in &out {
            let dir = g.edge_by_key(e).map(|l| l.direction).unwrap_or_default();
            if dir == DIR_LEFT_IN_FLOW {
                left_count += 1;
            } else if dir == DIR_RIGHT_IN_FLOW {
                right_count += 1;
            }
            let candidates = direction_candidates(dir, orientation);
            if let Some(label) = g.edge_mut_by_key(e) {
                label.source_candidates = candidates;
            }
        }

        if left_count <= 1 && right_count <= 1 {
            continue;
        }
        for e in &out {
            let dir = g.edge_by_key(e).map(|l| l.direction).unwrap_or_default();
            if dir == DIR_LEFT_IN_FLOW || dir == DIR_RIGHT_IN_FLOW {
                let candidates = direction_candidates(DIR_FLATWISE, orientation);
                if let Some(label) = g.edge_mut_by_key(e) {
                    label.source_candidates = candidates;
                }
            }
        }
    }
}

fn direction_candidates(mask: u8, orientation: Orientation) -> Vec<PortCandidate> {
    let mut out = Vec::new();
    for bit in [
        DIR_WITH_THE_FLOW,
        DIR_AGAINST_THE_FLOW,
        DIR_LEFT_IN_FLOW,
        DIR_RIGHT_IN_FLOW,
    ] {
        if mask & bit != 0 {
            if let Some(side) = direction_side(orientation, bit) {
                out.push(PortCandidate::Side(side));
            }
        }
    }
    out
}

/// One fixed candidate on the border of the edge's source or target node.
fn strong_port_candidate(
    g: &FlowGraph,
    e: &EdgeKey,
    at_source: bool,
    dir: u8,
) -> Vec<PortCandidate> {
    let orientation = g.graph().options.orientation;
    let node = if at_source { &e.v } else { &e.w };
    let (width, height) = g
        .node(node)
        .map(|n| (n.width, n.height))
        .unwrap_or_default();

    let side = direction_side(orientation, dir).unwrap_or(PortSide::North);
    let (dx, dy) = match side {
        PortSide::North => (0.0, -0.5 * height),
        PortSide::South => (0.0, 0.5 * height),
        PortSide::East => (0.5 * width, 0.0),
        PortSide::West => (-0.5 * width, 0.0),
    };
    vec![PortCandidate::Fixed { side, dx, dy }]
}

/// Replaces every message/association edge with a split node and two
/// zero-length halves pointing into it, so these edge kinds never force
/// extra layers. Returns the split node ids for [`merge_connectors`].
pub fn split_connectors(g: &mut FlowGraph) -> Vec<String> {
    let mut dummies = Vec::new();

    for e in g.edge_keys() {
        let Some(label) = g.edge_by_key(&e).cloned() else {
            continue;
        };
        let weight = if label.kind.is_message_flow() {
            WEIGHT_MESSAGE_FLOW
        } else if label.kind.is_association() {
            WEIGHT_ASSOCIATION
        } else {
            continue;
        };

        g.remove_edge_key(&e);
        let dummy_id = util::add_dummy_node(
            g,
            NodeLabel {
                dummy: Some(DummyKind::Connector),
                edge_obj: Some(e.clone()),
                edge_label: Some(label.clone()),
                ..Default::default()
            },
            "_c",
        );

        let half = EdgeLabel {
            kind: label.kind,
            weight,
            minlen: 0,
            original_edge: Some(e.clone()),
            ..Default::default()
        };
        g.set_edge_named(e.v.clone(), dummy_id.clone(), e.name.clone(), Some(half.clone()));
        g.set_edge_named(e.w.clone(), dummy_id.clone(), e.name.clone(), Some(half));
        dummies.push(dummy_id);
    }

    dummies
}

/// Removes the split nodes and brings the original edges back.
pub fn merge_connectors(g: &mut FlowGraph, dummies: Vec<String>) -> Result<()> {
    for dummy in dummies {
        let Some(node) = g.node(&dummy) else {
            return Err(Error::MalformedDummy {
                node: dummy,
                detail: "connector split node disappeared".to_string(),
            });
        };
        let (Some(edge_obj), Some(label)) = (node.edge_obj.clone(), node.edge_label.clone())
        else {
            return Err(Error::MalformedDummy {
                node: dummy,
                detail: "connector split node lost its edge".to_string(),
            });
        };
        g.remove_node(&dummy);
        g.set_edge_key(edge_obj, label);
    }
    Ok(())
}

/// Builds bus and grouping structures for in-edges that share a target
/// group. Requires ranks; without them only plain group ids are assigned.
pub fn run_grouping(g: &mut FlowGraph) {
    let lists = grouping_lists(g);
    if lists.is_empty() {
        return;
    }

    let has_ranks = g
        .node_ids()
        .iter()
        .all(|v| util::rank_of(g, v).is_some());

    let mut to_reverse: Vec<EdgeKey> = Vec::new();
    for list in lists {
        if list.is_empty() {
            continue;
        }

        if !has_ranks {
            let target = list[0].w.clone();
            for e in &list {
                if let Some(label) = g.edge_mut_by_key(e) {
                    label.target_group = Some(target.clone());
                }
            }
            continue;
        }

        let (preceding, succeeding) = in_edges_by_layer(g, list);
        GroupingBuilder::preceding(g).do_grouping(&preceding);
        GroupingBuilder::succeeding(g, &mut to_reverse).do_grouping(&succeeding);
    }

    for e in to_reverse {
        reverse_for_grouping(g, &e);
    }

    tracing::debug!(
        dummies = g
            .node_ids()
            .iter()
            .filter(|v| g.node(v).is_some_and(|n| n.is_grouping_dummy()))
            .count(),
        "configured in-edge grouping"
    );
}

/// Edges that carry a target group id, partitioned by (group id, target).
fn grouping_lists(g: &FlowGraph) -> Vec<Vec<EdgeKey>> {
    let mut by_group: Vec<(String, Vec<EdgeKey>)> = Vec::new();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();

    for e in g.edges() {
        let Some(id) = g.edge_by_key(e).and_then(|l| l.target_group.clone()) else {
            continue;
        };
        match index.get(&id) {
            Some(&i) => by_group[i].1.push(e.clone()),
            None => {
                index.insert(id.clone(), by_group.len());
                by_group.push((id, vec![e.clone()]));
            }
        }
    }

    let node_pos: FxHashMap<String, usize> = g
        .node_ids()
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, i))
        .collect();

    let mut lists = Vec::new();
    for (_, mut edges) in by_group {
        edges.sort_by_key(|e| node_pos.get(&e.w).copied().unwrap_or(usize::MAX));
        let mut current: Vec<EdgeKey> = Vec::new();
        for e in edges {
            if current.last().is_some_and(|prev| prev.w != e.w) {
                lists.push(std::mem::take(&mut current));
            }
            current.push(e);
        }
        if !current.is_empty() {
            lists.push(current);
        }
    }
    lists
}

/// Sorts the grouped in-edges by source rank and splits them at the
/// target's rank. Both halves come back most-distant layer first.
fn in_edges_by_layer(g: &FlowGraph, mut list: Vec<EdgeKey>) -> (Vec<Vec<EdgeKey>>, Vec<Vec<EdgeKey>>) {
    list.sort_by_key(|e| rank_of(g, &e.v));

    let reference = rank_of(g, &list[0].w);
    let mut preceding: Vec<Vec<EdgeKey>> = Vec::new();
    let mut succeeding: Vec<Vec<EdgeKey>> = Vec::new();

    let mut previous_layer = i32::MIN;
    for e in list {
        let layer = rank_of(g, &e.v);
        let side = if layer <= reference {
            &mut preceding
        } else {
            &mut succeeding
        };
        if layer != previous_layer || side.is_empty() {
            side.push(Vec::new());
            previous_layer = layer;
        }
        if let Some(last) = side.last_mut() {
            last.push(e);
        }
    }

    succeeding.reverse();
    (preceding, succeeding)
}

fn rank_of(g: &FlowGraph, v: &str) -> i32 {
    util::rank_of(g, v).unwrap_or_default()
}

/// Shared machinery for the two grouping directions. Edges built for the
/// succeeding side are collected and reversed afterwards; port candidates
/// travel with their ends, group ids are written for the post-reversal
/// orientation directly.
struct GroupingBuilder<'a, 'r> {
    g: &'a mut FlowGraph,
    kind: DummyKind,
    to_reverse: Option<&'r mut Vec<EdgeKey>>,
}

impl<'a, 'r> GroupingBuilder<'a, 'r> {
    fn preceding(g: &'a mut FlowGraph) -> Self {
        Self {
            g,
            kind: DummyKind::GroupPreceding,
            to_reverse: None,
        }
    }

    fn succeeding(g: &'a mut FlowGraph, to_reverse: &'r mut Vec<EdgeKey>) -> Self {
        Self {
            g,
            kind: DummyKind::GroupSucceeding,
            to_reverse: Some(to_reverse),
        }
    }

    fn is_succeeding(&self) -> bool {
        self.kind == DummyKind::GroupSucceeding
    }

    fn do_grouping(mut self, layers: &[Vec<EdgeKey>]) {
        let Some(last) = layers.last().and_then(|l| l.first()) else {
            return;
        };
        let neighbor_rank = rank_of(self.g, &last.v);

        let non_bus = self.create_bus(layers);
        if non_bus.len() == 1 {
            self.handle_single_edge_grouping(&non_bus[0]);
        } else if non_bus.len() > 1 {
            self.create_grouping(non_bus, neighbor_rank);
        }
    }

    /// Fuses singleton layers into a chain of per-layer dummies carrying one
    /// synthetic edge toward the target; stops at the first layer with more
    /// than one edge. Straight branches ride along to the next fuse point
    /// instead of bending into the dummy of their own layer.
    fn create_bus(&mut self, layers: &[Vec<EdgeKey>]) -> Vec<EdgeKey> {
        let target = layers[0][0].w.clone();
        let mut non_singleton: Vec<EdgeKey> = Vec::new();
        let mut unfinished: Vec<EdgeKey> = Vec::new();

        for layer in layers {
            if non_singleton.is_empty() && layer.len() == 1 {
                let edge = layer[0].clone();

                if unfinished.is_empty() {
                    unfinished.push(edge);
                    continue;
                }

                let layer_dummy = self.create_dummy_node(rank_of(self.g, &edge.v));

                let group_unfinished = unfinished.len() > 1;
                for e in &mut unfinished {
                    let moved = self.change_edge_target(e.clone(), &layer_dummy);
                    if group_unfinished {
                        self.set_group_id(&moved, &layer_dummy);
                    }
                    *e = moved;
                }
                unfinished.clear();

                let trunk = EdgeKey::new(layer_dummy.clone(), target.clone(), None::<String>);
                self.g
                    .set_edge_with_label(layer_dummy.clone(), target.clone(), EdgeLabel::default());
                self.create_bus_port_candidate(&trunk);
                unfinished.push(trunk);

                let straight = self
                    .g
                    .edge_by_key(&edge)
                    .map(|l| is_straight_branch(l.direction))
                    .unwrap_or_default();
                if straight {
                    unfinished.push(edge);
                } else {
                    self.change_edge_target(edge, &layer_dummy);
                }
            } else {
                non_singleton.extend(layer.iter().cloned());
            }
        }

        non_singleton.extend(unfinished);
        non_singleton
    }

    fn handle_single_edge_grouping(&mut self, e: &EdgeKey) {
        if self.is_succeeding()
            && self
                .g
                .node(&e.v)
                .is_some_and(|n| n.is_grouping_dummy())
        {
            self.push_reverse(e.clone());
        }
        let candidates = strong_port_candidate(self.g, e, false, DIR_AGAINST_THE_FLOW);
        if let Some(label) = self.g.edge_mut_by_key(e) {
            label.target_candidates = candidates;
        }
    }

    fn create_grouping(&mut self, mut non_bus: Vec<EdgeKey>, neighbor_rank: i32) {
        if !self.is_succeeding() {
            let group_id = non_bus[0].w.clone();
            for e in &non_bus {
                self.set_group_id(e, &group_id);
                let candidates = strong_port_candidate(self.g, e, false, DIR_AGAINST_THE_FLOW);
                if let Some(label) = self.g.edge_mut_by_key(e) {
                    label.target_candidates = candidates;
                }
            }
            return;
        }

        let target = self.prepare_for_grouping(&mut non_bus);
        for e in non_bus {
            let grouping_edge = if rank_of(self.g, &e.v) == neighbor_rank {
                e
            } else {
                let layer_dummy = self.create_dummy_node(neighbor_rank);
                self.change_edge_target(e, &layer_dummy);
                let key = EdgeKey::new(layer_dummy.clone(), target.clone(), None::<String>);
                self.g
                    .set_edge_with_label(layer_dummy, target.clone(), EdgeLabel::default());
                key
            };

            self.push_reverse(grouping_edge.clone());
            self.set_group_id(&grouping_edge, &target);
            let candidates =
                strong_port_candidate(self.g, &grouping_edge, false, DIR_WITH_THE_FLOW);
            if let Some(label) = self.g.edge_mut_by_key(&grouping_edge) {
                label.target_candidates = candidates;
            }
        }
    }

    /// Grouping attaches best to a same-layer dummy next to the original
    /// target; all non-bus edges are re-routed through it.
    fn prepare_for_grouping(&mut self, non_bus: &mut [EdgeKey]) -> String {
        let original_target = non_bus[0].w.clone();
        let target = self.create_dummy_node(rank_of(self.g, &original_target));

        let flat = EdgeKey::new(original_target.clone(), target.clone(), None::<String>);
        self.g
            .set_edge_with_label(original_target, target.clone(), EdgeLabel::default());
        let candidates = strong_port_candidate(self.g, &flat, true, DIR_AGAINST_THE_FLOW);
        if let Some(label) = self.g.edge_mut_by_key(&flat) {
            label.source_candidates = candidates;
        }

        for e in non_bus.iter_mut() {
            *e = self.change_edge_target_plain(e.clone(), &target);
        }
        target
    }

    fn create_dummy_node(&mut self, rank: i32) -> String {
        util::add_dummy_node(
            self.g,
            NodeLabel {
                width: DUMMY_NODE_SIZE,
                height: DUMMY_NODE_SIZE,
                rank: Some(rank),
                dummy: Some(self.kind),
                ..Default::default()
            },
            "_g",
        )
    }

    /// Moves the edge onto a new target, carrying its label and recording
    /// provenance. The succeeding builder also schedules the reversal.
    fn change_edge_target(&mut self, e: EdgeKey, new_target: &str) -> EdgeKey {
        let moved = self.change_edge_target_plain(e, new_target);
        self.push_reverse(moved.clone());
        moved
    }

    fn change_edge_target_plain(&mut self, e: EdgeKey, new_target: &str) -> EdgeKey {
        let mut label = self.g.edge_by_key(&e).cloned().unwrap_or_default();
        if label.original_edge.is_none() {
            label.original_edge = Some(e.clone());
        }
        self.g.remove_edge_key(&e);
        let moved = EdgeKey::new(e.v, new_target, e.name);
        self.g.set_edge_key(moved.clone(), label);
        moved
    }

    fn push_reverse(&mut self, e: EdgeKey) {
        if let Some(list) = self.to_reverse.as_deref_mut() {
            list.push(e);
        }
    }

    fn set_group_id(&mut self, e: &EdgeKey, id: &str) {
        let succeeding = self.is_succeeding();
        if let Some(label) = self.g.edge_mut_by_key(e) {
            if succeeding {
                label.source_group = Some(id.to_string());
            } else {
                label.target_group = Some(id.to_string());
            }
        }
    }

    fn create_bus_port_candidate(&mut self, e: &EdgeKey) {
        if self.is_succeeding() {
            let candidates = strong_port_candidate(self.g, e, true, DIR_AGAINST_THE_FLOW);
            if let Some(label) = self.g.edge_mut_by_key(e) {
                label.source_candidates = candidates;
            }
        } else {
            let candidates = strong_port_candidate(self.g, e, true, DIR_WITH_THE_FLOW);
            if let Some(label) = self.g.edge_mut_by_key(e) {
                label.source_candidates = candidates;
            }
        }
    }
}

/// Flips an edge built for the succeeding side. Port candidates are stored
/// by their current end, so they move with the endpoints.
fn reverse_for_grouping(g: &mut FlowGraph, e: &EdgeKey) {
    let Some(mut label) = g.edge_by_key(e).cloned() else {
        return;
    };
    g.remove_edge_key(e);

    std::mem::swap(&mut label.source_candidates, &mut label.target_candidates);
    label.flipped_for_grouping = true;

    g.set_edge_named(e.w.clone(), e.v.clone(), e.name.clone(), Some(label));
}

/// Removes every grouping dummy, re-links its edges to the original
/// endpoints and concatenates the path segments. Chains telescope because
/// dummies are visited in creation order.
pub fn undo_grouping(g: &mut FlowGraph) -> Result<()> {
    for id in g.node_ids() {
        let kind = g.node(&id).and_then(|n| n.dummy);
        match kind {
            Some(DummyKind::GroupPreceding) => restore_preceding(g, &id)?,
            Some(DummyKind::GroupSucceeding) => restore_succeeding(g, &id)?,
            _ => {}
        }
    }
    Ok(())
}

fn dummy_center(g: &FlowGraph, id: &str) -> Option<Point> {
    let node = g.node(id)?;
    match (node.x, node.y) {
        (Some(x), Some(y)) => Some(Point { x, y }),
        _ => None,
    }
}

fn restore_preceding(g: &mut FlowGraph, id: &str) -> Result<()> {
    let out = g.out_edges(id, None);
    if out.len() != 1 {
        return Err(Error::MalformedDummy {
            node: id.to_string(),
            detail: format!("expected one out-edge on a bus node, found {}", out.len()),
        });
    }
    let out_key = out[0].clone();
    let out_label = g.edge_by_key(&out_key).cloned().unwrap_or_default();

    let mut out_path = out_label.points.clone();
    if let (Some(center), Some(first)) = (dummy_center(g, id), out_path.first_mut()) {
        *first = center;
    }

    for in_key in g.in_edges(id, None) {
        let mut label = g.edge_by_key(&in_key).cloned().unwrap_or_default();
        label.points.pop();
        label.points.extend(out_path.iter().copied());
        label.target_port = out_label.target_port;
        label.original_edge = None;

        g.remove_edge_key(&in_key);
        g.set_edge_named(in_key.v, out_key.w.clone(), in_key.name, Some(label));
    }

    g.remove_node(id);
    Ok(())
}

fn restore_succeeding(g: &mut FlowGraph, id: &str) -> Result<()> {
    let ins = g.in_edges(id, None);
    if ins.len() != 1 {
        return Err(Error::MalformedDummy {
            node: id.to_string(),
            detail: format!("expected one in-edge on a bus node, found {}", ins.len()),
        });
    }
    let in_key = ins[0].clone();
    let in_label = g.edge_by_key(&in_key).cloned().unwrap_or_default();
    let in_from_original = g.node(&in_key.v).is_some_and(|n| !n.is_grouping_dummy());

    let mut in_path = in_label.points.clone();
    if let (Some(center), Some(last)) = (dummy_center(g, id), in_path.last_mut()) {
        *last = center;
    }

    for out_key in g.out_edges(id, None) {
        let out_to_original = g.node(&out_key.w).is_some_and(|n| !n.is_grouping_dummy());
        let mut label = g.edge_by_key(&out_key).cloned().unwrap_or_default();

        let mut combined = in_path.clone();
        combined.extend(label.points.iter().skip(1).copied());

        g.remove_edge_key(&out_key);
        if in_from_original && out_to_original {
            // Both ends are original again, so the pre-layout reversal is
            // taken back here.
            combined.reverse();
            make_orthogonal(&mut combined);
            label.points = combined;
            label.flipped_for_grouping = false;
            label.original_edge = None;
            std::mem::swap(&mut label.source_candidates, &mut label.target_candidates);
            std::mem::swap(&mut label.source_port, &mut label.target_port);
            g.set_edge_named(out_key.w, in_key.v.clone(), out_key.name, Some(label));
        } else {
            make_orthogonal(&mut combined);
            label.points = combined;
            g.set_edge_named(in_key.v.clone(), out_key.w, out_key.name, Some(label));
        }
    }

    g.remove_node(id);
    Ok(())
}

const ORTHOGONAL_EPS: f64 = 0.01;

fn is_orthogonal(p1: Point, p2: Point) -> bool {
    (p1.x - p2.x).abs() < ORTHOGONAL_EPS || (p1.y - p2.y).abs() < ORTHOGONAL_EPS
}

fn corner_between(p1: Point, p2: Point) -> Point {
    if (p1.x - p2.x).abs() < (p1.y - p2.y).abs() {
        Point { x: p2.x, y: p1.y }
    } else {
        Point { x: p1.x, y: p2.y }
    }
}

/// Re-snaps the first and last joint to axis alignment when concatenation
/// produced a diagonal segment.
fn make_orthogonal(points: &mut Vec<Point>) {
    if points.len() < 2 {
        return;
    }

    let (p1, p2) = (points[0], points[1]);
    if !is_orthogonal(p1, p2) {
        points.insert(1, corner_between(p2, p1));
    }

    let n = points.len();
    let (q1, q2) = (points[n - 2], points[n - 1]);
    if !is_orthogonal(q1, q2) {
        points.insert(n - 1, corner_between(q1, q2));
    }
}

/// Drops path points that sit on the straight line between their
/// neighbors. Self loops keep their bends.
pub fn remove_collinear_bends(g: &mut FlowGraph) {
    for e in g.edge_keys() {
        if e.is_self_loop() {
            continue;
        }
        let Some(label) = g.edge_mut_by_key(&e) else {
            continue;
        };
        let points = &mut label.points;
        let mut i = 1;
        while i + 1 < points.len() {
            let (a, b, c) = (points[i - 1], points[i], points[i + 1]);
            let area = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
            if area.abs() < ORTHOGONAL_EPS {
                points.remove(i);
            } else {
                i += 1;
            }
        }
    }
}
