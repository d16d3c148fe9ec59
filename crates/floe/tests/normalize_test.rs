use floe::elements::EdgeKind;
use floe::graphlib::{Graph, GraphOptions};
use floe::model::DummyKind;
use floe::normalize;
use floe::{EdgeLabel, FlowGraph, GraphLabel, NodeLabel, Point, PortSide};

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

#[test]
fn run_does_not_change_a_unit_span_edge() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(1));
    g.set_edge("a", "b");

    normalize::run(&mut g);

    assert!(g.has_edge("a", "b", None));
    assert_eq!(g.node_count(), 2);
    assert!(g.graph().dummy_chains.is_empty());
}

#[test]
fn run_splits_a_two_layer_edge_into_two_segments() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(2));
    g.set_edge("a", "b");

    normalize::run(&mut g);

    let sucs = g.successors("a");
    assert_eq!(sucs.len(), 1);
    let dummy = sucs[0].to_string();
    let label = g.node(&dummy).unwrap();
    assert_eq!(label.dummy, Some(DummyKind::Bend));
    assert_eq!(label.rank, Some(1));
    assert_eq!(g.successors(&dummy), vec!["b"]);
    assert_eq!(g.graph().dummy_chains, vec![dummy]);
}

#[test]
fn run_chains_one_bend_per_crossed_layer() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(4));
    g.set_edge("a", "b");

    normalize::run(&mut g);

    let bends = g
        .node_ids()
        .iter()
        .filter(|v| g.node(v).is_some_and(|n| n.is_bend()))
        .count();
    assert_eq!(bends, 3);
    assert_eq!(g.graph().dummy_chains.len(), 1);
}

#[test]
fn run_segments_carry_kind_and_provenance() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(2));
    g.set_edge_with_label(
        "a",
        "b",
        EdgeLabel {
            kind: EdgeKind::MessageFlow,
            weight: 3.0,
            ..Default::default()
        },
    );

    normalize::run(&mut g);

    let dummy = g.successors("a")[0].to_string();
    let segment = g.edge("a", &dummy, None).unwrap();
    assert_eq!(segment.kind, EdgeKind::MessageFlow);
    assert_eq!(segment.weight, 3.0);
    assert_eq!(
        segment.original_edge.as_ref().map(|e| e.w.as_str()),
        Some("b")
    );
    let stash = g.node(&dummy).unwrap();
    assert_eq!(stash.edge_label.as_ref().unwrap().kind, EdgeKind::MessageFlow);
}

#[test]
fn run_replaces_a_same_layer_edge_with_a_collector() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(1));
    g.set_node("b", ranked_node(1));
    g.set_edge("a", "b");

    normalize::run(&mut g);

    assert!(!g.has_edge("a", "b", None));
    assert_eq!(g.graph().same_layer_dummies.len(), 1);
    let collector = g.graph().same_layer_dummies[0].clone();
    let label = g.node(&collector).unwrap();
    assert_eq!(label.dummy, Some(DummyKind::SameLayer));
    assert_eq!(label.rank, Some(1));
    assert_eq!(g.in_degree(&collector), 2);
    assert_eq!(g.out_degree(&collector), 0);
    assert_eq!(g.edge("a", &collector, None).unwrap().minlen, 0);
    assert_eq!(g.edge("b", &collector, None).unwrap().minlen, 0);
}

#[test]
fn run_leaves_self_loops_alone() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_edge("a", "a");

    normalize::run(&mut g);

    assert!(g.has_edge("a", "a", None));
    assert_eq!(g.node_count(), 1);
}

#[test]
fn undo_reverses_the_run_operation() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(3));
    g.set_edge("a", "b");

    normalize::run(&mut g);
    normalize::undo(&mut g);

    assert_eq!(g.node_count(), 2);
    assert!(g.has_edge("a", "b", None));
    assert!(g.graph().dummy_chains.is_empty());
}

#[test]
fn undo_collects_bend_coordinates_into_points() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(3));
    g.set_edge("a", "b");

    normalize::run(&mut g);

    let first = g.successors("a")[0].to_string();
    let second = g.successors(&first)[0].to_string();
    g.node_mut(&first).unwrap().x = Some(5.0);
    g.node_mut(&first).unwrap().y = Some(10.0);
    g.node_mut(&second).unwrap().x = Some(5.0);
    g.node_mut(&second).unwrap().y = Some(40.0);

    normalize::undo(&mut g);

    assert_eq!(
        g.edge("a", "b", None).unwrap().points,
        vec![Point { x: 5.0, y: 10.0 }, Point { x: 5.0, y: 40.0 }]
    );
}

#[test]
fn undo_carries_port_decisions_from_the_outermost_segments() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(2));
    g.set_edge("a", "b");

    normalize::run(&mut g);

    let dummy = g.successors("a")[0].to_string();
    g.edge_mut("a", &dummy, None).unwrap().source_port = Some(PortSide::East);
    g.edge_mut(&dummy, "b", None).unwrap().target_port = Some(PortSide::West);

    normalize::undo(&mut g);

    let label = g.edge("a", "b", None).unwrap();
    assert_eq!(label.source_port, Some(PortSide::East));
    assert_eq!(label.target_port, Some(PortSide::West));
}

#[test]
fn undo_merges_same_layer_halves_back_into_one_edge() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(1));
    g.set_node("b", ranked_node(1));
    g.set_edge("a", "b");

    normalize::run(&mut g);

    let collector = g.graph().same_layer_dummies[0].clone();
    g.node_mut(&collector).unwrap().x = Some(50.0);
    g.node_mut(&collector).unwrap().y = Some(20.0);
    {
        let half = g.edge_mut("a", &collector, None).unwrap();
        half.points = vec![Point { x: 10.0, y: 20.0 }];
        half.source_port = Some(PortSide::East);
    }
    {
        let half = g.edge_mut("b", &collector, None).unwrap();
        half.points = vec![Point { x: 90.0, y: 20.0 }];
        half.source_port = Some(PortSide::West);
    }

    normalize::undo(&mut g);

    assert_eq!(g.node_count(), 2);
    let label = g.edge("a", "b", None).unwrap();
    assert_eq!(
        label.points,
        vec![
            Point { x: 10.0, y: 20.0 },
            Point { x: 50.0, y: 20.0 },
            Point { x: 90.0, y: 20.0 },
        ]
    );
    assert_eq!(label.source_port, Some(PortSide::East));
    assert_eq!(label.target_port, Some(PortSide::West));
    assert!(g.graph().same_layer_dummies.is_empty());
}

#[test]
fn undo_restores_multi_edges_between_the_same_nodes() {
    let mut g = new_graph();
    g.set_node("a", ranked_node(0));
    g.set_node("b", ranked_node(2));
    g.set_edge_named("a", "b", Some("x"), Some(EdgeLabel::default()));
    g.set_edge_named("a", "b", Some("y"), Some(EdgeLabel::default()));

    normalize::run(&mut g);
    assert!(!g.has_edge("a", "b", Some("x")));

    normalize::undo(&mut g);

    assert!(g.has_edge("a", "b", Some("x")));
    assert!(g.has_edge("a", "b", Some("y")));
    assert_eq!(g.node_count(), 2);
}
