//! Contract with the hierarchical layout engine.
//!
//! The pipeline owns classification, cycle breaking, layering, alignment and
//! port sides; the engine owns in-layer sequencing and the geometric routing
//! pass. Engines are consumed only through the [`Engine`] trait, and the
//! routing phase receives [`RoutingHints`] with per-edge length descriptors
//! sized so every label fits along its edge.

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::graphlib::EdgeKey;
use crate::{FlowGraph, labels};

/// Shortest first and last edge segments the router may produce.
const MIN_SEGMENT_LENGTH: f64 = 15.0;

/// An external hierarchical layout engine.
///
/// `sequence` assigns every node its position within its layer, `route`
/// produces node coordinates and edge paths. Both run on the transformed
/// working graph; dummies are ordinary nodes from the engine's point of
/// view.
pub trait Engine {
    /// Orders the nodes of every layer, writing in-layer positions.
    fn sequence(&mut self, g: &mut FlowGraph) -> Result<()>;

    /// Generic engine-side port-list pass between layering and sequencing.
    /// The default does nothing.
    fn optimize_port_lists(&mut self, g: &mut FlowGraph) -> Result<()> {
        let _ = g;
        Ok(())
    }

    /// Assigns coordinates and edge paths, honoring decided port sides and
    /// the per-edge descriptors in `hints`.
    fn route(&mut self, g: &mut FlowGraph, hints: &RoutingHints) -> Result<()>;
}

/// Routing bounds for one edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDescriptor {
    pub min_length: f64,
    pub min_first_segment: f64,
    pub min_last_segment: f64,
    pub min_distance: f64,
}

/// Everything the routing phase needs besides the graph itself.
#[derive(Debug, Clone, Default)]
pub struct RoutingHints {
    pub descriptors: FxHashMap<EdgeKey, EdgeDescriptor>,
    /// Share of [`labels::profit`] in the engine's label placement.
    pub label_profit_ratio: f64,
}

impl RoutingHints {
    /// Builds per-edge descriptors from the edges' label sizes. The extent
    /// along the flow axis of every label must fit on the edge, with node
    /// and inter-label clearance on top; labels of cross-flow edge kinds
    /// count with their other extent.
    pub fn new(g: &FlowGraph) -> Self {
        let options = &g.graph().options;
        let horizontal = options.orientation.is_horizontal();

        let mut descriptors = FxHashMap::default();
        for e in g.edge_keys() {
            let Some(label) = g.edge_by_key(&e) else {
                continue;
            };
            let mut min_length = 0.0;
            for &(width, height) in &label.label_sizes {
                let along_flow = if horizontal { width } else { height };
                let across_flow = if horizontal { height } else { width };
                min_length += if label.kind.is_flow() {
                    along_flow
                } else {
                    across_flow
                };
            }
            if !label.label_sizes.is_empty() {
                min_length += options.min_node_distance
                    + (label.label_sizes.len() - 1) as f64 * options.min_label_distance;
            }

            descriptors.insert(
                e,
                EdgeDescriptor {
                    min_length: min_length.max(options.min_edge_length),
                    min_first_segment: MIN_SEGMENT_LENGTH,
                    min_last_segment: MIN_SEGMENT_LENGTH,
                    min_distance: options.min_edge_distance,
                },
            );
        }

        RoutingHints {
            descriptors,
            label_profit_ratio: labels::PROFIT_MODEL_RATIO,
        }
    }
}
