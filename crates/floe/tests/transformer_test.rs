use floe::elements::EdgeKind;
use floe::graphlib::{EdgeKey, Graph, GraphOptions};
use floe::model::{DIR_LEFT_IN_FLOW, DIR_WITH_THE_FLOW, DummyKind};
use floe::transformer;
use floe::{EdgeLabel, FlowGraph, GraphLabel, NodeLabel, Point, PortCandidate, PortSide};

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

fn grouped_edge() -> EdgeLabel {
    EdgeLabel {
        target_group: Some("bus".to_string()),
        ..Default::default()
    }
}

fn grouping_dummies(g: &FlowGraph) -> Vec<String> {
    g.node_ids()
        .into_iter()
        .filter(|v| g.node(v).is_some_and(|n| n.is_grouping_dummy()))
        .collect()
}

#[test]
fn configure_preferred_directions_maps_single_branches_to_sides() {
    let mut g = new_graph();
    g.set_edge_with_label(
        "d",
        "left",
        EdgeLabel {
            direction: DIR_LEFT_IN_FLOW,
            ..Default::default()
        },
    );
    g.set_edge_with_label(
        "d",
        "down",
        EdgeLabel {
            direction: DIR_WITH_THE_FLOW,
            ..Default::default()
        },
    );
    g.set_edge("d", "plain");

    transformer::configure_preferred_directions(&mut g);

    assert_eq!(
        g.edge("d", "left", None).unwrap().source_candidates,
        vec![PortCandidate::Side(PortSide::East)]
    );
    assert_eq!(
        g.edge("d", "down", None).unwrap().source_candidates,
        vec![PortCandidate::Side(PortSide::South)]
    );
    assert!(g.edge("d", "plain", None).unwrap().source_candidates.is_empty());
}

#[test]
fn configure_preferred_directions_relaxes_a_crowded_side() {
    let mut g = new_graph();
    for w in ["l1", "l2"] {
        g.set_edge_with_label(
            "d",
            w,
            EdgeLabel {
                direction: DIR_LEFT_IN_FLOW,
                ..Default::default()
            },
        );
    }
    g.set_edge_with_label(
        "d",
        "down",
        EdgeLabel {
            direction: DIR_WITH_THE_FLOW,
            ..Default::default()
        },
    );

    transformer::configure_preferred_directions(&mut g);

    let flatwise = vec![
        PortCandidate::Side(PortSide::East),
        PortCandidate::Side(PortSide::West),
    ];
    assert_eq!(g.edge("d", "l1", None).unwrap().source_candidates, flatwise);
    assert_eq!(g.edge("d", "l2", None).unwrap().source_candidates, flatwise);
    assert_eq!(
        g.edge("d", "down", None).unwrap().source_candidates,
        vec![PortCandidate::Side(PortSide::South)]
    );
}

#[test]
fn split_connectors_places_a_zero_length_split_between_the_endpoints() {
    let mut g = new_graph();
    g.set_edge_with_label(
        "p",
        "q",
        EdgeLabel {
            kind: EdgeKind::MessageFlow,
            ..Default::default()
        },
    );

    let dummies = transformer::split_connectors(&mut g);

    assert_eq!(dummies.len(), 1);
    assert!(!g.has_edge("p", "q", None));
    let dummy = &dummies[0];
    let node = g.node(dummy).unwrap();
    assert_eq!(node.dummy, Some(DummyKind::Connector));
    assert_eq!(node.edge_label.as_ref().unwrap().kind, EdgeKind::MessageFlow);

    let half = g.edge("p", dummy, None).unwrap();
    assert_eq!(half.weight, transformer::WEIGHT_MESSAGE_FLOW);
    assert_eq!(half.minlen, 0);
    assert_eq!(
        half.original_edge,
        Some(EdgeKey::new("p", "q", None::<String>))
    );
    assert!(g.has_edge("q", dummy, None));
}

#[test]
fn split_connectors_weighs_associations_lighter() {
    let mut g = new_graph();
    g.set_edge_with_label(
        "a",
        "note",
        EdgeLabel {
            kind: EdgeKind::Association,
            ..Default::default()
        },
    );

    let dummies = transformer::split_connectors(&mut g);

    let half = g.edge("a", &dummies[0], None).unwrap();
    assert_eq!(half.weight, transformer::WEIGHT_ASSOCIATION);
}

#[test]
fn split_connectors_leaves_sequence_flows_alone() {
    let mut g = new_graph();
    g.set_edge("a", "b");

    let dummies = transformer::split_connectors(&mut g);

    assert!(dummies.is_empty());
    assert!(g.has_edge("a", "b", None));
    assert_eq!(g.node_count(), 2);
}

#[test]
fn merge_connectors_restores_the_original_edge() {
    let mut g = new_graph();
    g.set_edge_with_label(
        "p",
        "q",
        EdgeLabel {
            kind: EdgeKind::MessageFlow,
            ..Default::default()
        },
    );

    let dummies = transformer::split_connectors(&mut g);
    transformer::merge_connectors(&mut g, dummies).unwrap();

    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge("p", "q", None).unwrap().kind, EdgeKind::MessageFlow);
}

#[test]
fn merge_connectors_reports_a_vanished_split_node() {
    let mut g = new_graph();
    g.set_edge_with_label(
        "p",
        "q",
        EdgeLabel {
            kind: EdgeKind::MessageFlow,
            ..Default::default()
        },
    );

    let dummies = transformer::split_connectors(&mut g);
    g.remove_node(&dummies[0]);

    assert!(transformer::merge_connectors(&mut g, dummies).is_err());
}

#[test]
fn run_grouping_without_ranks_only_normalizes_group_ids() {
    let mut g = new_graph();
    g.set_edge_with_label("a", "t", grouped_edge());
    g.set_edge_with_label("b", "t", grouped_edge());

    transformer::run_grouping(&mut g);

    assert_eq!(g.node_count(), 3);
    assert_eq!(
        g.edge("a", "t", None).unwrap().target_group,
        Some("t".to_string())
    );
    assert_eq!(
        g.edge("b", "t", None).unwrap().target_group,
        Some("t".to_string())
    );
}

#[test]
fn run_grouping_pins_a_single_grouped_edge_to_the_targets_border() {
    let mut g = new_graph();
    g.set_node("s", ranked_node(0));
    g.set_node(
        "t",
        NodeLabel {
            rank: Some(1),
            height: 40.0,
            ..Default::default()
        },
    );
    g.set_edge_with_label("s", "t", grouped_edge());

    transformer::run_grouping(&mut g);

    assert_eq!(g.node_count(), 2);
    assert_eq!(
        g.edge("s", "t", None).unwrap().target_candidates,
        vec![PortCandidate::Fixed {
            side: PortSide::North,
            dx: 0.0,
            dy: -20.0,
        }]
    );
}

fn bus_graph() -> FlowGraph {
    let mut g = new_graph();
    g.set_node("s0", ranked_node(0));
    g.set_node("s1", ranked_node(1));
    g.set_node("s3", ranked_node(3));
    g.set_node("t", ranked_node(4));
    g.set_edge_with_label("s0", "t", grouped_edge());
    g.set_edge_with_label("s1", "t", grouped_edge());
    g.set_edge_with_label("s3", "t", grouped_edge());
    g
}

#[test]
fn run_grouping_builds_a_bus_chain_over_singleton_layers() {
    let mut g = bus_graph();

    transformer::run_grouping(&mut g);

    let dummies = grouping_dummies(&g);
    assert_eq!(dummies.len(), 2);
    let (d_a, d_b) = (dummies[0].as_str(), dummies[1].as_str());
    assert_eq!(g.node(d_a).unwrap().rank, Some(1));
    assert_eq!(g.node(d_b).unwrap().rank, Some(3));

    assert_eq!(g.successors("s0"), vec![d_a]);
    assert_eq!(g.successors("s1"), vec![d_a]);
    assert_eq!(g.successors(d_a), vec![d_b]);
    assert_eq!(g.successors("s3"), vec![d_b]);
    assert_eq!(g.successors(d_b), vec!["t"]);
    assert_eq!(g.in_degree("t"), 1);

    assert_eq!(
        g.edge("s0", d_a, None).unwrap().original_edge,
        Some(EdgeKey::new("s0", "t", None::<String>))
    );
}

#[test]
fn undo_grouping_telescopes_the_bus_back_onto_the_sources() {
    let mut g = bus_graph();
    transformer::run_grouping(&mut g);

    let dummies = grouping_dummies(&g);
    let (d_a, d_b) = (dummies[0].clone(), dummies[1].clone());
    {
        let node = g.node_mut(&d_a).unwrap();
        node.x = Some(100.0);
        node.y = Some(50.0);
    }
    {
        let node = g.node_mut(&d_b).unwrap();
        node.x = Some(100.0);
        node.y = Some(150.0);
    }
    g.edge_mut("s0", &d_a, None).unwrap().points =
        vec![Point { x: 10.0, y: 0.0 }, Point { x: 100.0, y: 50.0 }];
    g.edge_mut("s1", &d_a, None).unwrap().points =
        vec![Point { x: 20.0, y: 50.0 }, Point { x: 100.0, y: 50.0 }];
    g.edge_mut(&d_a, &d_b, None).unwrap().points =
        vec![Point { x: 100.0, y: 50.0 }, Point { x: 100.0, y: 150.0 }];
    g.edge_mut("s3", &d_b, None).unwrap().points =
        vec![Point { x: 30.0, y: 150.0 }, Point { x: 100.0, y: 150.0 }];
    g.edge_mut(&d_b, "t", None).unwrap().points =
        vec![Point { x: 100.0, y: 150.0 }, Point { x: 100.0, y: 200.0 }];

    transformer::undo_grouping(&mut g).unwrap();

    assert_eq!(g.node_count(), 4);
    assert_eq!(g.in_degree("t"), 3);
    assert_eq!(
        g.edge("s0", "t", None).unwrap().points,
        vec![
            Point { x: 10.0, y: 0.0 },
            Point { x: 100.0, y: 50.0 },
            Point { x: 100.0, y: 150.0 },
            Point { x: 100.0, y: 200.0 },
        ]
    );
    assert_eq!(
        g.edge("s3", "t", None).unwrap().points,
        vec![
            Point { x: 30.0, y: 150.0 },
            Point { x: 100.0, y: 150.0 },
            Point { x: 100.0, y: 200.0 },
        ]
    );
    assert!(g.edge("s0", "t", None).unwrap().original_edge.is_none());
}

fn succeeding_graph() -> FlowGraph {
    let mut g = new_graph();
    g.set_node(
        "t",
        NodeLabel {
            rank: Some(0),
            height: 40.0,
            ..Default::default()
        },
    );
    g.set_node("a", ranked_node(1));
    g.set_node("b", ranked_node(1));
    g.set_edge_with_label("a", "t", grouped_edge());
    g.set_edge_with_label("b", "t", grouped_edge());
    g
}

#[test]
fn run_grouping_reverses_succeeding_edges_through_a_flat_dummy() {
    let mut g = succeeding_graph();

    transformer::run_grouping(&mut g);

    let dummies = grouping_dummies(&g);
    assert_eq!(dummies.len(), 1);
    let d_t = dummies[0].as_str();
    assert_eq!(g.node(d_t).unwrap().dummy, Some(DummyKind::GroupSucceeding));

    assert_eq!(g.successors("t"), vec![d_t]);
    assert_eq!(g.in_degree("t"), 0);
    assert!(!g.has_edge("a", "t", None));
    assert!(g.has_edge(d_t, "a", None));
    assert!(g.has_edge(d_t, "b", None));

    let reversed = g.edge(d_t, "a", None).unwrap();
    assert!(reversed.flipped_for_grouping);
    assert_eq!(
        reversed.original_edge,
        Some(EdgeKey::new("a", "t", None::<String>))
    );
    assert_eq!(
        g.edge("t", d_t, None).unwrap().source_candidates,
        vec![PortCandidate::Fixed {
            side: PortSide::North,
            dx: 0.0,
            dy: -20.0,
        }]
    );
}

#[test]
fn run_grouping_keeps_bus_candidates_on_their_ends_through_reversal() {
    let mut g = new_graph();
    g.set_node(
        "t",
        NodeLabel {
            rank: Some(0),
            height: 40.0,
            ..Default::default()
        },
    );
    g.set_node("s1", ranked_node(1));
    g.set_node("s2", ranked_node(2));
    g.set_node("s4", ranked_node(4));
    g.set_edge_with_label("s1", "t", grouped_edge());
    g.set_edge_with_label("s2", "t", grouped_edge());
    g.set_edge_with_label("s4", "t", grouped_edge());

    transformer::run_grouping(&mut g);

    let dummies = grouping_dummies(&g);
    assert_eq!(dummies.len(), 2);
    let (d_far, d_near) = (dummies[0].as_str(), dummies[1].as_str());
    assert_eq!(g.node(d_far).unwrap().rank, Some(2));
    assert_eq!(g.node(d_near).unwrap().rank, Some(1));

    // The bus chain points away from the target after the reversal pass.
    assert!(g.has_edge("t", d_near, None));
    assert!(g.has_edge(d_near, d_far, None));
    assert!(g.has_edge(d_far, "s4", None));

    let dummy_anchor = vec![PortCandidate::Fixed {
        side: PortSide::North,
        dx: 0.0,
        dy: -0.5 * transformer::DUMMY_NODE_SIZE,
    }];

    // The trunk between the two dummies was retargeted before reversal; its
    // candidate stays anchored at the far dummy it was built on.
    let trunk = g.edge(d_near, d_far, None).unwrap();
    assert!(trunk.source_candidates.is_empty());
    assert_eq!(trunk.target_candidates, dummy_anchor);

    let head = g.edge("t", d_near, None).unwrap();
    assert_eq!(
        head.source_candidates,
        vec![PortCandidate::Fixed {
            side: PortSide::North,
            dx: 0.0,
            dy: -20.0,
        }]
    );
    assert_eq!(head.target_candidates, dummy_anchor);
}

#[test]
fn undo_grouping_restores_reversed_succeeding_edges() {
    let mut g = succeeding_graph();
    transformer::run_grouping(&mut g);

    let d_t = grouping_dummies(&g)[0].clone();
    {
        let node = g.node_mut(&d_t).unwrap();
        node.x = Some(60.0);
        node.y = Some(0.0);
    }
    g.edge_mut("t", &d_t, None).unwrap().points =
        vec![Point { x: 40.0, y: 0.0 }, Point { x: 60.0, y: 0.0 }];
    g.edge_mut(&d_t, "a", None).unwrap().points =
        vec![Point { x: 60.0, y: 0.0 }, Point { x: 60.0, y: 50.0 }];
    g.edge_mut(&d_t, "b", None).unwrap().points = vec![
        Point { x: 60.0, y: 0.0 },
        Point { x: 90.0, y: 0.0 },
        Point { x: 90.0, y: 50.0 },
    ];

    transformer::undo_grouping(&mut g).unwrap();

    assert_eq!(g.node_count(), 3);
    assert_eq!(g.in_degree("t"), 2);

    let restored = g.edge("a", "t", None).unwrap();
    assert!(!restored.flipped_for_grouping);
    assert!(restored.original_edge.is_none());
    assert_eq!(
        restored.points,
        vec![
            Point { x: 60.0, y: 50.0 },
            Point { x: 60.0, y: 0.0 },
            Point { x: 40.0, y: 0.0 },
        ]
    );
    assert_eq!(
        g.edge("b", "t", None).unwrap().points,
        vec![
            Point { x: 90.0, y: 50.0 },
            Point { x: 90.0, y: 0.0 },
            Point { x: 60.0, y: 0.0 },
            Point { x: 40.0, y: 0.0 },
        ]
    );
}

#[test]
fn remove_collinear_bends_drops_inline_points() {
    let mut g = new_graph();
    g.set_edge("a", "b");
    g.edge_mut("a", "b", None).unwrap().points = vec![
        Point { x: 0.0, y: 0.0 },
        Point { x: 0.0, y: 50.0 },
        Point { x: 0.0, y: 100.0 },
        Point { x: 40.0, y: 100.0 },
    ];

    transformer::remove_collinear_bends(&mut g);

    assert_eq!(
        g.edge("a", "b", None).unwrap().points,
        vec![
            Point { x: 0.0, y: 0.0 },
            Point { x: 0.0, y: 100.0 },
            Point { x: 40.0, y: 100.0 },
        ]
    );
}

#[test]
fn remove_collinear_bends_keeps_self_loop_bends() {
    let mut g = new_graph();
    g.set_edge("a", "a");
    g.edge_mut("a", "a", None).unwrap().points = vec![
        Point { x: 0.0, y: 0.0 },
        Point { x: 0.0, y: 10.0 },
        Point { x: 0.0, y: 20.0 },
    ];

    transformer::remove_collinear_bends(&mut g);

    assert_eq!(g.edge("a", "a", None).unwrap().points.len(), 3);
}
