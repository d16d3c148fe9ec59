use floe::alignment;
use floe::elements::EdgeKind;
use floe::graphlib::{EdgeKey, Graph, GraphOptions};
use floe::model::DummyKind;
use floe::{EdgeLabel, FlowGraph, GraphLabel, NodeLabel, PortSide, normalize};

fn new_graph() -> FlowGraph {
    let mut g: FlowGraph = Graph::new(GraphOptions {
        multigraph: true,
        ..Default::default()
    });
    g.set_graph(GraphLabel::default());
    g.set_default_node_label(NodeLabel::default);
    g.set_default_edge_label(EdgeLabel::default);
    g
}

fn ranked_node(rank: i32) -> NodeLabel {
    NodeLabel {
        rank: Some(rank),
        ..Default::default()
    }
}

fn lane_node(rank: i32, lane: usize) -> NodeLabel {
    NodeLabel {
        rank: Some(rank),
        lane: Some(lane),
        ..Default::default()
    }
}

fn align_layer(g: &FlowGraph, v: &str) -> f64 {
    g.node(v).unwrap().align_layer.unwrap()
}

fn align_with(g: &FlowGraph, v: &str) -> Option<String> {
    g.node(v).unwrap().align_with.clone()
}

#[test]
fn run_aligns_a_straight_chain_into_one_layer() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(1));
    g.set_node("c", ranked_node(2));
    g.set_edge("a", "b");
    g.set_edge("b", "c");

    alignment::run(&mut g).unwrap();

    assert_eq!(align_layer(&g, "a"), align_layer(&g, "b"));
    assert_eq!(align_layer(&g, "b"), align_layer(&g, "c"));
    assert_eq!(align_with(&g, "a"), None);
    assert_eq!(align_with(&g, "b"), Some("a".to_string()));
    assert_eq!(align_with(&g, "c"), Some("b".to_string()));
}

#[test]
fn run_separates_same_rank_neighbors_by_one_layer() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(0));

    alignment::run(&mut g).unwrap();

    assert_eq!(align_layer(&g, "b") - align_layer(&g, "a"), 1.0);
    assert_eq!(align_with(&g, "a"), None);
    assert_eq!(align_with(&g, "b"), None);
}

#[test]
fn run_leaves_single_node_lanes_unaligned() {
    let mut g = new_graph();
    g.set_node(
        "alone",
        NodeLabel {
            lane: Some(0),
            rank: Some(0),
            align_layer: Some(9.0),
            align_with: Some("stale".to_string()),
            ..Default::default()
        },
    );
    g.set_node("b", lane_node(0, 1));
    g.set_node("c", lane_node(1, 1));
    g.set_edge("b", "c");

    alignment::run(&mut g).unwrap();

    let label = g.node("alone").unwrap();
    assert_eq!(label.align_layer, None);
    assert_eq!(label.align_with, None);
    assert_eq!(align_with(&g, "c"), Some("b".to_string()));
}

#[test]
fn run_aligns_each_lane_independently() {
    let mut g = new_graph();
    g.set_node("p0", lane_node(0, 0));
    g.set_node("p1", lane_node(1, 0));
    g.set_node("q0", lane_node(0, 1));
    g.set_node("q1", lane_node(1, 1));
    g.set_edge("p0", "p1");
    g.set_edge("q0", "q1");
    g.set_edge("p1", "q0");

    alignment::run(&mut g).unwrap();

    assert_eq!(align_with(&g, "p1"), Some("p0".to_string()));
    assert_eq!(align_with(&g, "q1"), Some("q0".to_string()));
    assert!(g.node("p0").unwrap().align_layer.is_some());
    assert!(g.node("q0").unwrap().align_layer.is_some());
}

#[test]
fn run_gives_the_longest_chain_the_straight_line() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(1));
    g.set_node("c", ranked_node(2));
    g.set_node("d", ranked_node(2));
    g.set_edge("a", "b");
    g.set_edge("b", "c");
    g.set_edge("b", "d");

    alignment::run(&mut g).unwrap();

    assert_eq!(align_with(&g, "b"), Some("a".to_string()));
    assert_eq!(align_with(&g, "c"), Some("b".to_string()));
    assert_eq!(align_with(&g, "d"), None);
    assert_eq!(align_layer(&g, "d"), align_layer(&g, "c") + 1.0);
}

#[test]
fn run_measures_real_spans_longer_than_dummy_spans() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(1));
    g.set_node(
        "d",
        NodeLabel {
            rank: Some(2),
            dummy: Some(DummyKind::Bend),
            ..Default::default()
        },
    );
    g.set_node("f", ranked_node(2));
    g.set_edge("a", "b");
    g.set_edge("b", "d");
    g.set_edge_with_label(
        "b",
        "f",
        EdgeLabel {
            source_port: Some(PortSide::East),
            ..Default::default()
        },
    );

    let lengths = alignment::run(&mut g).unwrap();

    assert_eq!(lengths.get(&EdgeKey::new("a", "b", None::<String>)), Some(&5));
    assert_eq!(lengths.get(&EdgeKey::new("b", "d", None::<String>)), Some(&1));
    assert_eq!(lengths.get(&EdgeKey::new("b", "f", None::<String>)), Some(&0));
}

#[test]
fn run_offsets_a_bend_chain_that_aligns_with_no_node() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(1));
    g.set_node("c", ranked_node(2));
    g.set_node(
        "d",
        NodeLabel {
            rank: Some(1),
            dummy: Some(DummyKind::Bend),
            ..Default::default()
        },
    );
    g.set_edge("a", "b");
    g.set_edge("b", "c");
    g.set_edge("a", "d");
    g.set_edge("d", "c");

    alignment::run(&mut g).unwrap();

    assert_eq!(align_with(&g, "b"), Some("a".to_string()));
    assert_eq!(align_with(&g, "c"), Some("b".to_string()));
    assert_eq!(align_with(&g, "d"), None);
    assert_eq!(align_layer(&g, "d"), align_layer(&g, "b") + 0.5);
}

#[test]
fn run_orders_endpoints_of_side_pinned_edges_instead_of_aligning() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(1));
    g.set_edge_with_label(
        "a",
        "b",
        EdgeLabel {
            source_port: Some(PortSide::West),
            ..Default::default()
        },
    );

    alignment::run(&mut g).unwrap();

    assert_eq!(align_layer(&g, "a"), align_layer(&g, "b") + 1.0);
    assert_eq!(align_with(&g, "a"), None);
    assert_eq!(align_with(&g, "b"), None);
}

#[test]
fn run_keeps_message_endpoints_free_to_separate() {
    let mut g = new_graph();
    g.set_node("p", ranked_node(0));
    g.set_node("q", ranked_node(0));
    g.set_node("r", ranked_node(1));
    g.set_edge_with_label(
        "p",
        "q",
        EdgeLabel {
            kind: EdgeKind::MessageFlow,
            ..Default::default()
        },
    );
    g.set_edge("p", "r");

    alignment::run(&mut g).unwrap();

    // The in-layer neighbor rule still separates p and q; the message edge
    // itself never pulls them onto one line.
    assert_eq!(align_layer(&g, "q"), align_layer(&g, "p") + 1.0);
}

#[test]
fn run_builds_an_align_with_forest_without_cycles() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(1));
    g.set_node("c", ranked_node(2));
    g.set_node("d", ranked_node(2));
    g.set_node("e", ranked_node(3));
    g.set_node(
        "bend",
        NodeLabel {
            rank: Some(2),
            dummy: Some(DummyKind::Bend),
            ..Default::default()
        },
    );
    g.set_node("f", ranked_node(3));
    g.set_edge("a", "b");
    g.set_edge("b", "c");
    g.set_edge("b", "d");
    g.set_edge("c", "e");
    g.set_edge("b", "bend");
    g.set_edge("bend", "f");
    g.set_edge_with_label(
        "d",
        "f",
        EdgeLabel {
            source_port: Some(PortSide::East),
            ..Default::default()
        },
    );
    g.set_edge_with_label(
        "c",
        "d",
        EdgeLabel {
            kind: EdgeKind::MessageFlow,
            ..Default::default()
        },
    );

    alignment::run(&mut g).unwrap();

    // Every align-with chain must walk up to a root; a repeat of the start
    // node would mean the partner relation closed a cycle.
    let cap = g.node_count();
    for start in g.node_ids() {
        let mut v = start.clone();
        let mut hops = 0usize;
        while let Some(partner) = align_with(&g, &v) {
            assert_ne!(partner, start, "align-with cycle through {start}");
            hops += 1;
            assert!(hops <= cap, "align-with chain from {start} does not end");
            v = partner;
        }
    }
}

#[test]
fn run_separates_same_layer_endpoints_by_sequence_position() {
    let mut g = new_graph();
    g.set_node(
        "a",
        NodeLabel {
            rank: Some(1),
            order: Some(0),
            ..Default::default()
        },
    );
    g.set_node(
        "b",
        NodeLabel {
            rank: Some(1),
            order: Some(1),
            ..Default::default()
        },
    );
    g.set_edge("a", "b");
    normalize::run(&mut g);

    alignment::run(&mut g).unwrap();

    assert_eq!(align_layer(&g, "b"), align_layer(&g, "a") + 1.0);
    let collector = g.graph().same_layer_dummies[0].clone();
    let label = g.node(&collector).unwrap();
    assert_eq!(label.align_layer, None);
    assert_eq!(label.align_with, None);
}
