//! Label types shared by every pipeline stage.
//!
//! The working graph is a `floe_graphlib::Graph<NodeLabel, EdgeLabel, GraphLabel>`.
//! Computed attributes (rank, order, coordinates, alignment) are Option-typed
//! and filled in as the phases run; everything is `Clone` so stages can stash
//! labels for exact restoration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::elements::{EdgeKind, NodeKind};
use crate::graphlib::EdgeKey;

/// Main flow axis of the drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    TopToBottom,
    LeftToRight,
}

/// Compass side an edge port attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortSide {
    North,
    South,
    East,
    West,
}

impl Orientation {
    /// Side toward lower in-layer positions.
    pub fn low_side(self) -> PortSide {
        match self {
            Orientation::TopToBottom => PortSide::West,
            Orientation::LeftToRight => PortSide::North,
        }
    }

    /// Side toward higher in-layer positions.
    pub fn high_side(self) -> PortSide {
        match self {
            Orientation::TopToBottom => PortSide::East,
            Orientation::LeftToRight => PortSide::South,
        }
    }

    /// Whether the side runs across the flow axis.
    pub fn is_flatwise(self, side: PortSide) -> bool {
        side == self.low_side() || side == self.high_side()
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Orientation::LeftToRight)
    }
}

/// Preferred-direction bits, relative to the flow axis.
pub const DIR_WITH_THE_FLOW: u8 = 0x1;
pub const DIR_AGAINST_THE_FLOW: u8 = 0x2;
pub const DIR_LEFT_IN_FLOW: u8 = 0x4;
pub const DIR_RIGHT_IN_FLOW: u8 = 0x8;
pub const DIR_STRAIGHT: u8 = DIR_WITH_THE_FLOW | DIR_AGAINST_THE_FLOW;
pub const DIR_FLATWISE: u8 = DIR_LEFT_IN_FLOW | DIR_RIGHT_IN_FLOW;

/// Whether the mask names a left or right attachment at all.
pub fn is_flatwise_branch(mask: u8) -> bool {
    mask & DIR_FLATWISE != 0
}

/// Whether the mask names a with-flow or against-flow attachment at all.
pub fn is_straight_branch(mask: u8) -> bool {
    mask & DIR_STRAIGHT != 0
}

/// A mask that allows flatwise attachments but no straight ones.
pub fn is_flatwise_only(mask: u8) -> bool {
    mask != 0 && mask & DIR_STRAIGHT == 0
}

/// Maps one direction bit to the side it means under the given orientation.
pub fn direction_side(orientation: Orientation, direction: u8) -> Option<PortSide> {
    match orientation {
        Orientation::TopToBottom => match direction {
            DIR_AGAINST_THE_FLOW => Some(PortSide::North),
            DIR_WITH_THE_FLOW => Some(PortSide::South),
            DIR_LEFT_IN_FLOW => Some(PortSide::East),
            DIR_RIGHT_IN_FLOW => Some(PortSide::West),
            _ => None,
        },
        Orientation::LeftToRight => match direction {
            DIR_AGAINST_THE_FLOW => Some(PortSide::West),
            DIR_WITH_THE_FLOW => Some(PortSide::East),
            DIR_LEFT_IN_FLOW => Some(PortSide::North),
            DIR_RIGHT_IN_FLOW => Some(PortSide::South),
            _ => None,
        },
    }
}

/// One allowed attachment for an edge end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortCandidate {
    /// Anywhere on the side.
    Side(PortSide),
    /// A fixed point, offset from the node center.
    Fixed { side: PortSide, dx: f64, dy: f64 },
}

impl PortCandidate {
    pub fn side(&self) -> PortSide {
        match *self {
            PortCandidate::Side(side) => side,
            PortCandidate::Fixed { side, .. } => side,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, PortCandidate::Fixed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Role of a node inserted by the pipeline itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyKind {
    /// Split node for a message/association edge during ranking.
    Connector,
    /// Bus node collecting grouped in-edges from layers above the target.
    GroupPreceding,
    /// Bus node collecting grouped in-edges from layers below the target.
    GroupSucceeding,
    /// Bend of a long edge, one per crossed layer.
    Bend,
    /// Collector for a same-layer edge; two in-edges, no out-edge.
    SameLayer,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeLabel {
    pub kind: NodeKind,
    pub width: f64,
    pub height: f64,
    /// Swim-lane (column/row partition) index, if the diagram has lanes.
    pub lane: Option<usize>,

    pub rank: Option<i32>,
    pub order: Option<usize>,
    pub x: Option<f64>,
    pub y: Option<f64>,

    pub align_layer: Option<f64>,
    pub align_with: Option<String>,

    pub dummy: Option<DummyKind>,
    /// Provenance: the original edge this dummy stands in for.
    pub edge_obj: Option<EdgeKey>,
    /// Stashed label of that edge, reattached on restore.
    pub edge_label: Option<EdgeLabel>,
}

impl NodeLabel {
    pub fn is_dummy(&self) -> bool {
        self.dummy.is_some()
    }

    pub fn is_grouping_dummy(&self) -> bool {
        matches!(
            self.dummy,
            Some(DummyKind::GroupPreceding) | Some(DummyKind::GroupSucceeding)
        )
    }

    pub fn is_bend(&self) -> bool {
        self.dummy == Some(DummyKind::Bend)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeLabel {
    pub kind: EdgeKind,

    /// Ranking constraint: `rank(target) - rank(source) >= minlen`.
    pub minlen: usize,
    pub weight: f64,

    /// Preferred-direction mask supplied by the caller, `0` when unset.
    pub direction: u8,

    /// Cycle-breaker bookkeeping.
    pub reversed: bool,
    pub forward_name: Option<String>,
    /// Set when the transformer flipped this edge for succeeding-layer grouping.
    pub flipped_for_grouping: bool,

    /// Engine-facing grouping ids produced by the transformer.
    pub source_group: Option<String>,
    pub target_group: Option<String>,

    pub source_candidates: Vec<PortCandidate>,
    pub target_candidates: Vec<PortCandidate>,
    pub source_port: Option<PortSide>,
    pub target_port: Option<PortSide>,

    /// Provenance: original edge, on edges whose endpoint is a dummy.
    pub original_edge: Option<EdgeKey>,

    /// Label boxes to reserve space for, as (width, height).
    pub label_sizes: Vec<(f64, f64)>,

    pub points: Vec<Point>,
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Default for EdgeLabel {
    fn default() -> Self {
        Self {
            kind: EdgeKind::default(),
            minlen: 1,
            weight: 1.0,
            direction: 0,
            reversed: false,
            forward_name: None,
            flipped_for_grouping: false,
            source_group: None,
            target_group: None,
            source_candidates: Vec::new(),
            target_candidates: Vec::new(),
            source_port: None,
            target_port: None,
            original_edge: None,
            label_sizes: Vec::new(),
            points: Vec::new(),
            extras: BTreeMap::new(),
        }
    }
}

impl EdgeLabel {
    /// A flatwise candidate set allows both cross-flow sides at that end.
    pub fn has_flatwise_candidates(&self, at_source: bool, orientation: Orientation) -> bool {
        let candidates = if at_source {
            &self.source_candidates
        } else {
            &self.target_candidates
        };
        candidates.iter().any(|c| c.side() == orientation.low_side())
            && candidates.iter().any(|c| c.side() == orientation.high_side())
    }

    pub fn has_flatwise_port(&self, at_source: bool, orientation: Orientation) -> bool {
        let port = if at_source {
            self.source_port
        } else {
            self.target_port
        };
        port.is_some_and(|side| orientation.is_flatwise(side))
    }
}

/// Layout options; tuning values mirror the original flowchart defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    pub orientation: Orientation,
    pub allow_flatwise_edges: bool,
    /// Pin start events to the first layer.
    pub pin_start_events: bool,
    pub lane_insets: f64,
    pub min_edge_distance: f64,
    pub min_edge_length: f64,
    pub min_label_distance: f64,
    pub min_node_distance: f64,
    pub min_pool_distance: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            orientation: Orientation::TopToBottom,
            allow_flatwise_edges: true,
            pin_start_events: false,
            lane_insets: 10.0,
            min_edge_distance: 15.0,
            min_edge_length: 30.0,
            min_label_distance: 20.0,
            min_node_distance: 30.0,
            min_pool_distance: 30.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphLabel {
    pub options: LayoutOptions,
    /// First dummy of every bend chain, in creation order.
    pub dummy_chains: Vec<String>,
    /// Same-layer collector dummies, in creation order.
    pub same_layer_dummies: Vec<String>,
}
