use floe::elements::{self, EdgeKind, NodeKind, TypeTags};
use floe::graphlib::{EdgeKey, Graph, GraphOptions};
use floe::{EdgeLabel, FlowGraph, GraphLabel, NodeLabel};

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

#[test]
fn untagged_elements_default_to_undefined() {
    let tags = TypeTags::default();

    assert_eq!(elements::classify_node(&tags, "anything"), NodeKind::Undefined);
    assert_eq!(
        elements::classify_edge(&tags, &EdgeKey::new("a", "b", None::<String>)),
        EdgeKind::Undefined
    );
}

#[test]
fn tagged_elements_keep_their_kind() {
    let mut tags = TypeTags::default();
    tags.node("start", NodeKind::StartEvent)
        .node("work", NodeKind::Process);
    tags.edge(
        EdgeKey::new("start", "work", None::<String>),
        EdgeKind::SequenceFlow,
    );

    assert_eq!(elements::classify_node(&tags, "start"), NodeKind::StartEvent);
    assert_eq!(elements::classify_node(&tags, "work"), NodeKind::Process);
    assert_eq!(
        elements::classify_edge(&tags, &EdgeKey::new("start", "work", None::<String>)),
        EdgeKind::SequenceFlow
    );
}

#[test]
fn untyped_edges_touching_an_annotation_become_associations() {
    let mut tags = TypeTags::default();
    tags.node("note", NodeKind::Annotation);

    assert_eq!(
        elements::classify_edge(&tags, &EdgeKey::new("work", "note", None::<String>)),
        EdgeKind::Association
    );
    assert_eq!(
        elements::classify_edge(&tags, &EdgeKey::new("note", "work", None::<String>)),
        EdgeKind::Association
    );
}

#[test]
fn typed_edges_touching_an_annotation_keep_their_tag() {
    let mut tags = TypeTags::default();
    tags.node("note", NodeKind::Annotation);
    tags.edge(
        EdgeKey::new("work", "note", None::<String>),
        EdgeKind::MessageFlow,
    );

    assert_eq!(
        elements::classify_edge(&tags, &EdgeKey::new("work", "note", None::<String>)),
        EdgeKind::MessageFlow
    );
}

#[test]
fn run_caches_kinds_on_the_graph_labels() {
    let mut g = new_graph();
    g.set_edge("start", "work");
    g.set_edge("work", "note");

    let mut tags = TypeTags::default();
    tags.node("start", NodeKind::StartEvent)
        .node("work", NodeKind::Process)
        .node("note", NodeKind::Annotation);
    tags.edge(
        EdgeKey::new("start", "work", None::<String>),
        EdgeKind::SequenceFlow,
    );

    elements::run(&mut g, &tags);

    assert_eq!(g.node("start").unwrap().kind, NodeKind::StartEvent);
    assert_eq!(g.node("work").unwrap().kind, NodeKind::Process);
    assert_eq!(g.node("note").unwrap().kind, NodeKind::Annotation);
    assert_eq!(
        g.edge("start", "work", None).unwrap().kind,
        EdgeKind::SequenceFlow
    );
    assert_eq!(
        g.edge("work", "note", None).unwrap().kind,
        EdgeKind::Association
    );
}

#[test]
fn flow_membership_covers_sequence_and_untyped_edges() {
    assert!(EdgeKind::SequenceFlow.is_flow());
    assert!(EdgeKind::Undefined.is_flow());
    assert!(!EdgeKind::MessageFlow.is_flow());
    assert!(!EdgeKind::Association.is_flow());
}

#[test]
fn activity_covers_processes_data_and_groups() {
    assert!(NodeKind::Process.is_activity());
    assert!(NodeKind::Data.is_activity());
    assert!(NodeKind::Group.is_activity());
    assert!(!NodeKind::Event.is_activity());
    assert!(!NodeKind::Decision.is_activity());
}
