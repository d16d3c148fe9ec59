#![forbid(unsafe_code)]

//! Flowchart-aware layout pipeline around a hierarchical layout engine.
//!
//! The engine itself (crossing minimization, coordinate assignment, routing)
//! stays external behind [`engine::Engine`]; this crate owns everything
//! flowchart-specific around it:
//! - element classification from caller-supplied type tags,
//! - cycle breaking and weighted rank assignment,
//! - message/association splitting and in-edge bus grouping,
//! - node alignment and port-side optimization after sequencing,
//! - exact restoration of the original topology with routed paths.
//!
//! Phases run strictly in order; [`stage::run`] drives one full invocation
//! over a working graph that the caller owns exclusively for its duration.

pub use floe_graphlib as graphlib;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod acyclic;
pub mod alignment;
pub mod elements;
pub mod engine;
pub mod error;
pub mod labels;
pub mod layerer;
pub mod model;
pub mod normalize;
pub mod ports;
pub mod rank;
pub mod stage;
pub mod transformer;
pub mod util;

pub use elements::{EdgeKind, NodeKind, TypeTags};
pub use engine::{Engine, RoutingHints};
pub use error::{Error, Result};
pub use model::{
    DummyKind, EdgeLabel, GraphLabel, LayoutOptions, NodeLabel, Orientation, Point, PortCandidate,
    PortSide,
};
pub use stage::{LayoutContext, Phase};

/// Working graph every phase mutates in place.
pub type FlowGraph = graphlib::Graph<NodeLabel, EdgeLabel, GraphLabel>;
