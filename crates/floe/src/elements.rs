//! Element Classifier: maps nodes and edges to flowchart semantic types.
//!
//! Types come from caller-supplied tag maps and are resolved once per layout
//! invocation; the resulting enums are cached on the working-graph labels so
//! later stages never consult the maps again.

use rustc_hash::FxHashMap;

use crate::FlowGraph;
use crate::graphlib::EdgeKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Undefined,
    Event,
    StartEvent,
    EndEvent,
    Decision,
    Process,
    Group,
    Annotation,
    Data,
    Pool,
}

impl NodeKind {
    /// Process-like nodes: plain processes, data stores and sub-process groups.
    pub fn is_activity(self) -> bool {
        matches!(self, NodeKind::Process | NodeKind::Data | NodeKind::Group)
    }

    pub fn is_event(self) -> bool {
        matches!(
            self,
            NodeKind::Event | NodeKind::StartEvent | NodeKind::EndEvent
        )
    }

    pub fn is_start_event(self) -> bool {
        self == NodeKind::StartEvent
    }

    pub fn is_annotation(self) -> bool {
        self == NodeKind::Annotation
    }

    pub fn is_undefined(self) -> bool {
        self == NodeKind::Undefined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeKind {
    #[default]
    Undefined,
    SequenceFlow,
    MessageFlow,
    Association,
}

impl EdgeKind {
    pub fn is_sequence_flow(self) -> bool {
        self == EdgeKind::SequenceFlow
    }

    pub fn is_message_flow(self) -> bool {
        self == EdgeKind::MessageFlow
    }

    pub fn is_association(self) -> bool {
        self == EdgeKind::Association
    }

    pub fn is_undefined(self) -> bool {
        self == EdgeKind::Undefined
    }

    /// Edges that take part in flow layering. Untyped edges count as flow;
    /// message flows and associations are split off before ranking.
    pub fn is_flow(self) -> bool {
        matches!(self, EdgeKind::SequenceFlow | EdgeKind::Undefined)
    }
}

/// Caller-supplied semantic tags keyed by node id / edge key.
#[derive(Debug, Clone, Default)]
pub struct TypeTags {
    pub nodes: FxHashMap<String, NodeKind>,
    pub edges: FxHashMap<EdgeKey, EdgeKind>,
}

impl TypeTags {
    pub fn node(&mut self, id: impl Into<String>, kind: NodeKind) -> &mut Self {
        self.nodes.insert(id.into(), kind);
        self
    }

    pub fn edge(&mut self, key: EdgeKey, kind: EdgeKind) -> &mut Self {
        self.edges.insert(key, kind);
        self
    }
}

pub fn classify_node(tags: &TypeTags, id: &str) -> NodeKind {
    tags.nodes.get(id).copied().unwrap_or_default()
}

/// Edge classification. An untyped edge with an annotation endpoint is taken
/// for an association: constraint-derived helper edges lose their tags, and
/// annotation attachments are the only untyped edges that must not act as
/// sequence flow.
pub fn classify_edge(tags: &TypeTags, key: &EdgeKey) -> EdgeKind {
    let kind = tags.edges.get(key).copied().unwrap_or_default();
    if kind.is_undefined()
        && (classify_node(tags, &key.v).is_annotation() || classify_node(tags, &key.w).is_annotation())
    {
        return EdgeKind::Association;
    }
    kind
}

/// Resolves every element's type once and caches it on the labels.
pub fn run(g: &mut FlowGraph, tags: &TypeTags) {
    for id in g.node_ids() {
        let kind = classify_node(tags, &id);
        if let Some(label) = g.node_mut(&id) {
            label.kind = kind;
        }
    }
    for key in g.edge_keys() {
        let kind = classify_edge(tags, &key);
        if let Some(label) = g.edge_mut_by_key(&key) {
            label.kind = kind;
        }
    }
}

