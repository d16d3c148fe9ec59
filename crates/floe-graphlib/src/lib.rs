//! Graph container APIs used by `floe`.
//!
//! A directed multigraph keyed by `String` node ids. Node and edge storage is
//! insertion-ordered so that every iteration order (and therefore every layout
//! decision built on top of it) is deterministic. In/out adjacency is kept as
//! incrementally maintained index lists per node.

use rustc_hash::FxBuildHasher;
use std::hash::{Hash, Hasher};

type HashMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;

#[derive(Debug, Clone, Copy)]
pub struct GraphOptions {
    pub multigraph: bool,
    pub compound: bool,
    pub directed: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            multigraph: false,
            compound: false,
            directed: true,
        }
    }
}

/// Identity of an edge: tail, head and (for multigraphs) an optional name.
#[derive(Debug, Clone)]
pub struct EdgeKey {
    pub v: String,
    pub w: String,
    pub name: Option<String>,
}

impl EdgeKey {
    pub fn new(
        v: impl Into<String>,
        w: impl Into<String>,
        name: Option<impl Into<String>>,
    ) -> Self {
        Self {
            v: v.into(),
            w: w.into(),
            name: name.map(Into::into),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.v == self.w
    }
}

impl PartialEq for EdgeKey {
    fn eq(&self, other: &Self) -> bool {
        self.v == other.v && self.w == other.w && self.name == other.name
    }
}

impl Eq for EdgeKey {}

impl Hash for EdgeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.v.hash(state);
        self.w.hash(state);
        self.name.hash(state);
    }
}

#[derive(Debug, Clone)]
struct NodeEntry<N> {
    id: String,
    label: N,
}

#[derive(Debug, Clone)]
struct EdgeEntry<E> {
    key: EdgeKey,
    label: E,
}

pub struct Graph<N, E, G>
where
    N: Default + 'static,
    E: Default + 'static,
    G: Default,
{
    options: GraphOptions,

    graph_label: G,
    default_node_label: Box<dyn Fn() -> N + Send + Sync>,
    default_edge_label: Box<dyn Fn() -> E + Send + Sync>,

    nodes: Vec<NodeEntry<N>>,
    node_index: HashMap<String, usize>,

    edges: Vec<EdgeEntry<E>>,
    edge_index: HashMap<EdgeKey, usize>,

    // Insertion-ordered incident edge keys per node.
    outs: HashMap<String, Vec<EdgeKey>>,
    ins: HashMap<String, Vec<EdgeKey>>,

    parent: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
}

impl<N, E, G> Graph<N, E, G>
where
    N: Default + 'static,
    E: Default + 'static,
    G: Default,
{
    pub fn new(options: GraphOptions) -> Self {
        Self {
            options,
            graph_label: G::default(),
            default_node_label: Box::new(N::default),
            default_edge_label: Box::new(E::default),
            nodes: Vec::new(),
            node_index: HashMap::default(),
            edges: Vec::new(),
            edge_index: HashMap::default(),
            outs: HashMap::default(),
            ins: HashMap::default(),
            parent: HashMap::default(),
            children: HashMap::default(),
        }
    }

    pub fn options(&self) -> GraphOptions {
        self.options
    }

    pub fn set_graph(&mut self, label: G) -> &mut Self {
        self.graph_label = label;
        self
    }

    pub fn graph(&self) -> &G {
        &self.graph_label
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph_label
    }

    pub fn set_default_node_label<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> N + Send + Sync + 'static,
    {
        self.default_node_label = Box::new(f);
        self
    }

    pub fn set_default_edge_label<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> E + Send + Sync + 'static,
    {
        self.default_edge_label = Box::new(f);
        self
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn set_node(&mut self, id: impl Into<String>, label: N) -> &mut Self {
        let id = id.into();
        if let Some(&idx) = self.node_index.get(&id) {
            self.nodes[idx].label = label;
            return self;
        }
        let idx = self.nodes.len();
        self.nodes.push(NodeEntry {
            id: id.clone(),
            label,
        });
        self.node_index.insert(id, idx);
        self
    }

    pub fn ensure_node(&mut self, id: impl Into<String>) -> &mut Self {
        let id = id.into();
        if self.node_index.contains_key(&id) {
            return self;
        }
        let label = (self.default_node_label)();
        self.set_node(id, label)
    }

    pub fn node(&self, id: &str) -> Option<&N> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx].label)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut N> {
        self.node_index
            .get(id)
            .copied()
            .map(move |idx| &mut self.nodes[idx].label)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Nodes with no in-edges, in insertion order.
    pub fn sources(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| self.ins.get(&n.id).is_none_or(|e| e.is_empty()))
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeKey> {
        self.edges.iter().map(|e| &e.key)
    }

    pub fn edge_keys(&self) -> Vec<EdgeKey> {
        self.edges.iter().map(|e| e.key.clone()).collect()
    }

    // Undirected edges are stored under the lexically smaller endpoint first.
    fn make_key(&self, v: &str, w: &str, name: Option<&str>) -> EdgeKey {
        let (v, w) = if self.options.directed || v <= w {
            (v, w)
        } else {
            (w, v)
        };
        EdgeKey {
            v: v.to_string(),
            w: w.to_string(),
            name: if self.options.multigraph {
                name.map(|s| s.to_string())
            } else {
                None
            },
        }
    }

    pub fn set_edge(&mut self, v: impl Into<String>, w: impl Into<String>) -> &mut Self {
        self.set_edge_named(v, w, None::<String>, None)
    }

    pub fn set_edge_with_label(
        &mut self,
        v: impl Into<String>,
        w: impl Into<String>,
        label: E,
    ) -> &mut Self {
        self.set_edge_named(v, w, None::<String>, Some(label))
    }

    pub fn set_edge_named(
        &mut self,
        v: impl Into<String>,
        w: impl Into<String>,
        name: Option<impl Into<String>>,
        label: Option<E>,
    ) -> &mut Self {
        let (v, w) = {
            let v = v.into();
            let w = w.into();
            if self.options.directed || v <= w {
                (v, w)
            } else {
                (w, v)
            }
        };
        self.ensure_node(v.clone());
        self.ensure_node(w.clone());

        let name = if self.options.multigraph {
            name.map(Into::into)
        } else {
            None
        };
        let key = EdgeKey { v, w, name };

        if let Some(&idx) = self.edge_index.get(&key) {
            if let Some(label) = label {
                self.edges[idx].label = label;
            }
            return self;
        }

        let idx = self.edges.len();
        self.edges.push(EdgeEntry {
            key: key.clone(),
            label: label.unwrap_or_else(|| (self.default_edge_label)()),
        });
        self.outs
            .entry(key.v.clone())
            .or_default()
            .push(key.clone());
        self.ins.entry(key.w.clone()).or_default().push(key.clone());
        self.edge_index.insert(key, idx);
        self
    }

    pub fn set_edge_key(&mut self, key: EdgeKey, label: E) -> &mut Self {
        self.set_edge_named(key.v, key.w, key.name, Some(label))
    }

    pub fn set_path(&mut self, nodes: &[&str]) -> &mut Self {
        for pair in nodes.windows(2) {
            self.set_edge(pair[0], pair[1]);
        }
        self
    }

    pub fn has_edge(&self, v: &str, w: &str, name: Option<&str>) -> bool {
        self.edge_index.contains_key(&self.make_key(v, w, name))
    }

    pub fn edge(&self, v: &str, w: &str, name: Option<&str>) -> Option<&E> {
        self.edge_by_key(&self.make_key(v, w, name))
    }

    pub fn edge_mut(&mut self, v: &str, w: &str, name: Option<&str>) -> Option<&mut E> {
        let key = self.make_key(v, w, name);
        self.edge_mut_by_key(&key)
    }

    pub fn edge_by_key(&self, key: &EdgeKey) -> Option<&E> {
        self.edge_index.get(key).map(|&idx| &self.edges[idx].label)
    }

    pub fn edge_mut_by_key(&mut self, key: &EdgeKey) -> Option<&mut E> {
        self.edge_index
            .get(key)
            .copied()
            .map(move |idx| &mut self.edges[idx].label)
    }

    pub fn remove_edge(&mut self, v: &str, w: &str, name: Option<&str>) -> bool {
        let key = self.make_key(v, w, name);
        self.remove_edge_key(&key)
    }

    pub fn remove_edge_key(&mut self, key: &EdgeKey) -> bool {
        let Some(idx) = self.edge_index.remove(key) else {
            return false;
        };
        self.edges.remove(idx);
        // Entries after `idx` shifted down by one.
        for (i, e) in self.edges.iter().enumerate().skip(idx) {
            self.edge_index.insert(e.key.clone(), i);
        }
        if let Some(out) = self.outs.get_mut(&key.v) {
            out.retain(|k| k != key);
        }
        if let Some(inn) = self.ins.get_mut(&key.w) {
            inn.retain(|k| k != key);
        }
        true
    }

    pub fn remove_node(&mut self, id: &str) -> bool {
        if !self.node_index.contains_key(id) {
            return false;
        }

        for key in self.node_edges(id) {
            self.remove_edge_key(&key);
        }

        let idx = self.node_index.remove(id).unwrap_or_default();
        self.nodes.remove(idx);
        for (i, n) in self.nodes.iter().enumerate().skip(idx) {
            self.node_index.insert(n.id.clone(), i);
        }
        self.outs.remove(id);
        self.ins.remove(id);

        if let Some(parent) = self.parent.remove(id) {
            if let Some(ch) = self.children.get_mut(&parent) {
                ch.retain(|c| c != id);
            }
        }
        if let Some(ch) = self.children.remove(id) {
            for child in ch {
                self.parent.remove(&child);
            }
        }

        true
    }

    pub fn out_edges(&self, v: &str, w: Option<&str>) -> Vec<EdgeKey> {
        self.outs
            .get(v)
            .map(|keys| {
                keys.iter()
                    .filter(|k| w.is_none_or(|w| k.w == w))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn in_edges(&self, v: &str, w: Option<&str>) -> Vec<EdgeKey> {
        self.ins
            .get(v)
            .map(|keys| {
                keys.iter()
                    .filter(|k| w.is_none_or(|w| k.v == w))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All incident edges, in-edges first; self loops are listed once.
    pub fn node_edges(&self, v: &str) -> Vec<EdgeKey> {
        let mut out = self.in_edges(v, None);
        for key in self.out_edges(v, None) {
            if !key.is_self_loop() {
                out.push(key);
            }
        }
        out
    }

    pub fn out_degree(&self, v: &str) -> usize {
        self.outs.get(v).map_or(0, |keys| keys.len())
    }

    pub fn in_degree(&self, v: &str) -> usize {
        self.ins.get(v).map_or(0, |keys| keys.len())
    }

    pub fn successors(&self, v: &str) -> Vec<&str> {
        if !self.options.directed {
            return self.adjacent_nodes(v);
        }
        self.outs
            .get(v)
            .map(|keys| keys.iter().map(|k| k.w.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn predecessors(&self, v: &str) -> Vec<&str> {
        if !self.options.directed {
            return self.adjacent_nodes(v);
        }
        self.ins
            .get(v)
            .map(|keys| keys.iter().map(|k| k.v.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn neighbors(&self, v: &str) -> Vec<&str> {
        if !self.options.directed {
            return self.adjacent_nodes(v);
        }
        let mut out: Vec<&str> = Vec::new();
        for w in self.successors(v) {
            if !out.contains(&w) {
                out.push(w);
            }
        }
        for u in self.predecessors(v) {
            if !out.contains(&u) {
                out.push(u);
            }
        }
        out
    }

    fn adjacent_nodes(&self, v: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for key in self.outs.get(v).into_iter().flatten() {
            if !out.contains(&key.w.as_str()) {
                out.push(key.w.as_str());
            }
        }
        for key in self.ins.get(v).into_iter().flatten() {
            if !out.contains(&key.v.as_str()) {
                out.push(key.v.as_str());
            }
        }
        out
    }

    pub fn set_parent(&mut self, child: impl Into<String>, parent: impl Into<String>) -> &mut Self {
        if !self.options.compound {
            return self;
        }
        let child = child.into();
        let parent = parent.into();
        self.ensure_node(child.clone());
        self.ensure_node(parent.clone());
        if let Some(prev) = self.parent.insert(child.clone(), parent.clone()) {
            if let Some(ch) = self.children.get_mut(&prev) {
                ch.retain(|c| c != &child);
            }
        }
        let entry = self.children.entry(parent).or_default();
        if !entry.contains(&child) {
            entry.push(child);
        }
        self
    }

    pub fn parent(&self, child: &str) -> Option<&str> {
        self.parent.get(child).map(|s| s.as_str())
    }

    pub fn children(&self, parent: &str) -> Vec<&str> {
        self.children
            .get(parent)
            .map(|v| v.iter().map(|s| s.as_str()).collect::<Vec<_>>())
            .unwrap_or_default()
    }

    pub fn children_root(&self) -> Vec<&str> {
        if !self.options.compound {
            return self.nodes().collect();
        }
        self.nodes
            .iter()
            .filter(|n| !self.parent.contains_key(&n.id))
            .map(|n| n.id.as_str())
            .collect()
    }
}

pub mod alg {
    use super::Graph;
    use std::collections::VecDeque;

    use rustc_hash::{FxHashMap, FxHashSet};

    /// Depth-first preorder over `successors`, visiting roots in the given
    /// order. On undirected graphs this walks the whole neighborhood.
    pub fn preorder<N, E, G>(g: &Graph<N, E, G>, roots: &[&str]) -> Vec<String>
    where
        N: Default + 'static,
        E: Default + 'static,
        G: Default,
    {
        traverse(g, roots, true)
    }

    pub fn postorder<N, E, G>(g: &Graph<N, E, G>, roots: &[&str]) -> Vec<String>
    where
        N: Default + 'static,
        E: Default + 'static,
        G: Default,
    {
        traverse(g, roots, false)
    }

    fn traverse<N, E, G>(g: &Graph<N, E, G>, roots: &[&str], pre: bool) -> Vec<String>
    where
        N: Default + 'static,
        E: Default + 'static,
        G: Default,
    {
        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut out: Vec<String> = Vec::new();
        for root in roots {
            if visited.contains(*root) {
                continue;
            }
            let mut stack: Vec<(String, usize)> = vec![((*root).to_string(), 0)];
            while let Some((v, next)) = stack.pop() {
                if next == 0 {
                    if !visited.insert(v.clone()) {
                        continue;
                    }
                    if pre {
                        out.push(v.clone());
                    }
                }
                let succs = g.successors(&v);
                if next < succs.len() {
                    let w = succs[next].to_string();
                    stack.push((v, next + 1));
                    if !visited.contains(&w) {
                        stack.push((w, 0));
                    }
                } else if !pre {
                    out.push(v);
                }
            }
        }
        out
    }

    /// Weakly connected components, each in BFS discovery order; components
    /// themselves ordered by their first node's insertion order.
    pub fn components<N, E, G>(g: &Graph<N, E, G>) -> Vec<Vec<String>>
    where
        N: Default + 'static,
        E: Default + 'static,
        G: Default,
    {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut out: Vec<Vec<String>> = Vec::new();

        for start in g.node_ids() {
            if !seen.insert(start.clone()) {
                continue;
            }
            let mut comp: Vec<String> = Vec::new();
            let mut queue: VecDeque<String> = VecDeque::new();
            queue.push_back(start);
            while let Some(v) = queue.pop_front() {
                for n in g.successors(&v).into_iter().chain(g.predecessors(&v)) {
                    if seen.insert(n.to_string()) {
                        queue.push_back(n.to_string());
                    }
                }
                comp.push(v);
            }
            out.push(comp);
        }

        out
    }

    /// `true` when the directed graph has no cycle (self loops included).
    pub fn is_acyclic<N, E, G>(g: &Graph<N, E, G>) -> bool
    where
        N: Default + 'static,
        E: Default + 'static,
        G: Default,
    {
        // Iterative DFS with a three-color marking.
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let mut color: FxHashMap<String, u8> = FxHashMap::default();
        for root in g.node_ids() {
            if color.get(&root).copied().unwrap_or(WHITE) != WHITE {
                continue;
            }
            let mut stack: Vec<(String, usize)> = vec![(root, 0)];
            while let Some((v, next)) = stack.pop() {
                if next == 0 {
                    color.insert(v.clone(), GRAY);
                }
                let succs = g.successors(&v);
                if next < succs.len() {
                    let w = succs[next].to_string();
                    stack.push((v, next + 1));
                    match color.get(&w).copied().unwrap_or(WHITE) {
                        GRAY => return false,
                        WHITE => stack.push((w, 0)),
                        _ => {}
                    }
                } else {
                    color.insert(v, BLACK);
                }
            }
        }
        true
    }

    /// Strongly connected components with more than one node, plus self
    /// loops, as `find_cycles`-style node lists. Members are sorted by node
    /// insertion order and the list by first member, so results are stable.
    pub fn find_cycles<N, E, G>(g: &Graph<N, E, G>) -> Vec<Vec<String>>
    where
        N: Default + 'static,
        E: Default + 'static,
        G: Default,
    {
        let node_ids = g.node_ids();
        let order: FxHashMap<&str, usize> = node_ids
            .iter()
            .enumerate()
            .map(|(i, v)| (v.as_str(), i))
            .collect();

        // Tarjan, iterative: each frame is (node, next-successor-position).
        let mut index: usize = 0;
        let mut indices: FxHashMap<String, usize> = FxHashMap::default();
        let mut lowlink: FxHashMap<String, usize> = FxHashMap::default();
        let mut on_stack: FxHashSet<String> = FxHashSet::default();
        let mut scc_stack: Vec<String> = Vec::new();
        let mut sccs: Vec<Vec<String>> = Vec::new();

        for root in &node_ids {
            if indices.contains_key(root) {
                continue;
            }
            let mut work: Vec<(String, usize)> = vec![(root.clone(), 0)];
            while let Some((v, next)) = work.pop() {
                if next == 0 {
                    indices.insert(v.clone(), index);
                    lowlink.insert(v.clone(), index);
                    index += 1;
                    scc_stack.push(v.clone());
                    on_stack.insert(v.clone());
                }
                let succs = g.successors(&v);
                if next < succs.len() {
                    let w = succs[next].to_string();
                    if indices.contains_key(&w) {
                        if on_stack.contains(&w) {
                            let low = lowlink[&v].min(indices[&w]);
                            lowlink.insert(v.clone(), low);
                        }
                        work.push((v, next + 1));
                    } else {
                        work.push((v, next + 1));
                        work.push((w, 0));
                    }
                } else {
                    if lowlink[&v] == indices[&v] {
                        let mut scc: Vec<String> = Vec::new();
                        loop {
                            let Some(w) = scc_stack.pop() else { break };
                            on_stack.remove(&w);
                            let done = w == v;
                            scc.push(w);
                            if done {
                                break;
                            }
                        }
                        sccs.push(scc);
                    }
                    if let Some((parent, _)) = work.last() {
                        let low = lowlink[parent.as_str()].min(lowlink[&v]);
                        lowlink.insert(parent.clone(), low);
                    }
                }
            }
        }

        let mut cycles: Vec<Vec<String>> = Vec::new();
        for mut scc in sccs {
            if scc.len() > 1 {
                scc.sort_by_key(|v| order.get(v.as_str()).copied().unwrap_or(usize::MAX));
                cycles.push(scc);
            } else if !g.out_edges(&scc[0], Some(&scc[0])).is_empty() {
                cycles.push(scc);
            }
        }
        cycles.sort_by(|a, b| {
            let ai = a.first().and_then(|v| order.get(v.as_str())).copied();
            let bi = b.first().and_then(|v| order.get(v.as_str())).copied();
            ai.cmp(&bi)
        });
        cycles
    }
}
