//! Label placement scoring for the routing engine.
//!
//! Node labels prefer to stay where they are, then the axis-parallel sides,
//! then the corners. Edge labels prefer to sit near the source end of their
//! routed path. The engine mixes these profits into its own greedy candidate
//! selection at [`PROFIT_MODEL_RATIO`].

use crate::elements::EdgeKind;
use crate::model::Point;

const MIN_PREFERRED_PLACEMENT_DISTANCE: f64 = 3.0;
const MAX_PREFERRED_PLACEMENT_DISTANCE: f64 = 40.0;

/// Share of these profits in the engine's greedy label selection.
pub const PROFIT_MODEL_RATIO: f64 = 0.25;

/// Discrete node label positions relative to the owner node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLabelPosition {
    Center,
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl NodeLabelPosition {
    fn is_side(self) -> bool {
        matches!(
            self,
            NodeLabelPosition::North
                | NodeLabelPosition::South
                | NodeLabelPosition::East
                | NodeLabelPosition::West
        )
    }

    fn is_corner(self) -> bool {
        matches!(
            self,
            NodeLabelPosition::NorthEast
                | NodeLabelPosition::NorthWest
                | NodeLabelPosition::SouthEast
                | NodeLabelPosition::SouthWest
        )
    }
}

/// Axis-aligned candidate box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// A placement the engine scores during greedy selection.
#[derive(Debug, Clone)]
pub enum LabelCandidate {
    Node {
        candidate: NodeLabelPosition,
        original: NodeLabelPosition,
    },
    Edge {
        bounds: Rect,
        path: Vec<Point>,
        kind: EdgeKind,
    },
}

pub fn profit(candidate: &LabelCandidate) -> f64 {
    match candidate {
        LabelCandidate::Node {
            candidate,
            original,
        } => node_label_profit(*candidate, *original),
        LabelCandidate::Edge { bounds, path, kind } => edge_label_profit(bounds, path, *kind),
    }
}

/// Staying put is best, sides are nearly as good, corners a little worse,
/// anything else is worthless.
pub fn node_label_profit(candidate: NodeLabelPosition, original: NodeLabelPosition) -> f64 {
    if candidate == original {
        1.0
    } else if candidate.is_side() {
        0.95
    } else if candidate.is_corner() {
        0.9
    } else {
        0.0
    }
}

/// Scores an edge label box against its edge's routed path. Only flow edges
/// are scored; profit falls off linearly with the distance from the source
/// point, drops to nothing beyond the preferred distance, and is halved for
/// boxes that crowd the source point itself.
pub fn edge_label_profit(candidate: &Rect, path: &[Point], kind: EdgeKind) -> f64 {
    if !kind.is_flow() {
        return 0.0;
    }
    let Some(&source) = path.first() else {
        return 0.0;
    };
    let max_preferred = MAX_PREFERRED_PLACEMENT_DISTANCE.max(path_length(path) * 0.2);
    let dist = distance_to_rect(candidate, source);

    if dist > max_preferred {
        0.0
    } else if dist < MIN_PREFERRED_PLACEMENT_DISTANCE {
        0.5
    } else {
        1.0 - dist / max_preferred
    }
}

/// Total polyline length.
pub fn path_length(path: &[Point]) -> f64 {
    path.windows(2)
        .map(|s| {
            let dx = s[1].x - s[0].x;
            let dy = s[1].y - s[0].y;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// Distance from `q` to the closest border segment of `r`, zero inside.
pub fn distance_to_rect(r: &Rect, q: Point) -> f64 {
    if r.contains(q) {
        return 0.0;
    }
    let upper_left = Point { x: r.x, y: r.y };
    let lower_left = Point {
        x: r.x,
        y: r.y + r.height,
    };
    let lower_right = Point {
        x: r.x + r.width,
        y: r.y + r.height,
    };
    let upper_right = Point {
        x: r.x + r.width,
        y: r.y,
    };

    let sides = [
        (upper_left, lower_left),
        (upper_right, lower_right),
        (upper_left, upper_right),
        (lower_left, lower_right),
    ];
    sides
        .iter()
        .map(|&(a, b)| segment_distance(a, b, q))
        .fold(f64::MAX, f64::min)
}

/// Distance from `q` to the segment between `p1` and `p2`. Falls back to the
/// nearer endpoint when the projection leaves the segment.
fn segment_distance(p1: Point, p2: Point, q: Point) -> f64 {
    let x2 = p2.x - p1.x;
    let y2 = p2.y - p1.y;
    let mut px = q.x - p1.x;
    let mut py = q.y - p1.y;

    let proj_squared;
    if px * x2 + py * y2 <= 0.0 {
        proj_squared = 0.0;
    } else {
        px = x2 - px;
        py = y2 - py;
        let tmp = px * x2 + py * y2;
        proj_squared = if tmp <= 0.0 {
            0.0
        } else {
            tmp * tmp / (x2 * x2 + y2 * y2)
        };
    }

    let squared = px * px + py * py - proj_squared;
    if squared < 0.0 { 0.0 } else { squared.sqrt() }
}
