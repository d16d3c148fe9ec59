use floe_graphlib::{EdgeKey, Graph, GraphOptions, alg};

fn directed() -> Graph<(), i32, ()> {
    Graph::new(GraphOptions::default())
}

#[test]
fn nodes_keep_their_insertion_order() {
    let mut g: Graph<i32, (), ()> = Graph::new(GraphOptions::default());
    g.set_node("c", 1);
    g.set_node("a", 2);
    g.set_node("b", 3);

    assert_eq!(g.node_ids(), vec!["c", "a", "b"]);
    assert_eq!(g.node_count(), 3);
}

#[test]
fn set_edge_creates_missing_endpoints_with_default_labels() {
    let mut g = directed();
    g.set_edge("a", "b");

    assert!(g.has_node("a"));
    assert!(g.has_node("b"));
    assert!(g.has_edge("a", "b", None));
    assert_eq!(g.edge("a", "b", None), Some(&0));
}

#[test]
fn set_edge_with_label_overwrites_an_existing_edge() {
    let mut g = directed();
    g.set_edge_with_label("a", "b", 1);
    g.set_edge_with_label("a", "b", 2);

    assert_eq!(g.edge_count(), 1);
    assert_eq!(g.edge("a", "b", None), Some(&2));
}

#[test]
fn named_edges_are_distinct_in_a_multigraph() {
    let mut g: Graph<(), i32, ()> = Graph::new(GraphOptions {
        multigraph: true,
        ..Default::default()
    });
    g.set_edge_named("a", "b", Some("x"), Some(1));
    g.set_edge_named("a", "b", Some("y"), Some(2));
    g.set_edge_named("a", "b", None::<&str>, Some(3));

    assert_eq!(g.edge_count(), 3);
    assert_eq!(g.edge("a", "b", Some("x")), Some(&1));
    assert_eq!(g.edge("a", "b", Some("y")), Some(&2));
    assert_eq!(g.edge("a", "b", None), Some(&3));
    assert_eq!(g.out_edges("a", None).len(), 3);
}

#[test]
fn edge_keys_round_trip_through_set_edge_key() {
    let mut g = directed();
    let key = EdgeKey::new("a", "b", None::<String>);
    g.set_edge_key(key.clone(), 7);

    assert_eq!(g.edge_by_key(&key), Some(&7));
    g.remove_edge_key(&key);
    assert!(!g.has_edge("a", "b", None));
    assert!(g.has_node("a"));
}

#[test]
fn remove_node_removes_incident_edges() {
    let mut g = directed();
    g.set_path(&["a", "b", "c"]);
    g.remove_node("b");

    assert!(!g.has_node("b"));
    assert_eq!(g.edge_count(), 0);
    assert_eq!(g.node_ids(), vec!["a", "c"]);
}

#[test]
fn out_edges_can_filter_by_target() {
    let mut g = directed();
    g.set_edge("a", "b");
    g.set_edge("a", "c");

    assert_eq!(g.out_edges("a", None).len(), 2);
    let filtered = g.out_edges("a", Some("c"));
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].w, "c");
    assert_eq!(g.in_edges("c", Some("a")).len(), 1);
}

#[test]
fn node_edges_lists_in_edges_before_out_edges() {
    let mut g = directed();
    g.set_edge("a", "b");
    g.set_edge("b", "c");

    let edges = g.node_edges("b");
    assert_eq!(edges.len(), 2);
    assert_eq!((edges[0].v.as_str(), edges[0].w.as_str()), ("a", "b"));
    assert_eq!((edges[1].v.as_str(), edges[1].w.as_str()), ("b", "c"));
}

#[test]
fn node_edges_reports_a_self_loop_once() {
    let mut g = directed();
    g.set_edge("a", "a");
    g.set_edge("a", "b");

    assert_eq!(g.node_edges("a").len(), 2);
}

#[test]
fn degrees_and_neighbors_respect_direction() {
    let mut g = directed();
    g.set_edge("a", "b");
    g.set_edge("c", "b");

    assert_eq!(g.in_degree("b"), 2);
    assert_eq!(g.out_degree("b"), 0);
    assert_eq!(g.successors("a"), vec!["b"]);
    assert_eq!(g.predecessors("a"), Vec::<&str>::new());
    let mut neighbors = g.neighbors("b");
    neighbors.sort();
    assert_eq!(neighbors, vec!["a", "c"]);
}

#[test]
fn sources_are_nodes_without_in_edges() {
    let mut g = directed();
    g.set_path(&["a", "b", "c"]);
    g.ensure_node("d");

    assert_eq!(g.sources(), vec!["a", "d"]);
}

#[test]
fn undirected_edges_are_symmetric() {
    let mut g: Graph<(), i32, ()> = Graph::new(GraphOptions {
        directed: false,
        ..Default::default()
    });
    g.set_edge_with_label("b", "a", 7);

    assert!(g.has_edge("a", "b", None));
    assert!(g.has_edge("b", "a", None));
    assert_eq!(g.edge("a", "b", None), Some(&7));
    assert_eq!(g.edge("b", "a", None), Some(&7));
}

#[test]
fn compound_graphs_track_parents_and_children() {
    let mut g: Graph<(), (), ()> = Graph::new(GraphOptions {
        compound: true,
        ..Default::default()
    });
    g.ensure_node("group");
    g.set_parent("a", "group");
    g.set_parent("b", "group");
    g.ensure_node("free");

    assert_eq!(g.parent("a"), Some("group"));
    assert_eq!(g.parent("free"), None);
    let mut children = g.children("group");
    children.sort();
    assert_eq!(children, vec!["a", "b"]);
    let mut roots = g.children_root();
    roots.sort();
    assert_eq!(roots, vec!["free", "group"]);
}

#[test]
fn components_group_weakly_connected_nodes() {
    let mut g = directed();
    g.set_path(&["a", "b"]);
    g.set_path(&["c", "d"]);
    g.ensure_node("e");

    let mut components: Vec<Vec<String>> = alg::components(&g);
    for c in &mut components {
        c.sort();
    }
    components.sort();
    assert_eq!(
        components,
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string(), "d".to_string()],
            vec!["e".to_string()],
        ]
    );
}

#[test]
fn is_acyclic_detects_directed_cycles() {
    let mut g = directed();
    g.set_path(&["a", "b", "c"]);
    assert!(alg::is_acyclic(&g));

    g.set_edge("c", "a");
    assert!(!alg::is_acyclic(&g));
}

#[test]
fn find_cycles_reports_sccs_and_self_loops() {
    let mut g = directed();
    g.set_edge("a", "b");
    g.set_edge("b", "a");
    g.set_edge("c", "c");
    g.set_edge("b", "d");

    let mut cycles = alg::find_cycles(&g);
    for c in &mut cycles {
        c.sort();
    }
    cycles.sort();
    assert_eq!(
        cycles,
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
        ]
    );
}

#[test]
fn preorder_visits_a_root_before_its_descendants() {
    let mut g = directed();
    g.set_edge("a", "b");
    g.set_edge("a", "c");
    g.set_edge("b", "d");

    let order = alg::preorder(&g, &["a"]);
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], "a");
    assert_eq!(order[1], "b");
    assert_eq!(order[2], "d");

    let post = alg::postorder(&g, &["a"]);
    assert_eq!(post.len(), 4);
    assert_eq!(post[3], "a");
    assert_eq!(post[0], "d");
}
