use rstar::{RTree, RTreeObject, AABB};

use crate::types::Point;
use crate::viewport::Viewport;

/// Point wrapper with a degenerate (zero-size) spatial envelope
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedPoint(pub Point);

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.0.x, self.0.y])
    }
}

/// R-Tree over ground-plane points for per-frame window queries
///
/// # Architecture
/// - Bulk-loaded once, never mutated afterwards
/// - Window queries cost O(log n + k) for k hits, so the zoomed panel stays
///   cheap however large the map is
pub struct PointIndex {
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    pub fn new() -> Self {
        PointIndex { tree: RTree::new() }
    }

    pub fn from_points(points: Vec<Point>) -> Self {
        let items = points.into_iter().map(IndexedPoint).collect();
        PointIndex {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Points inside `vp`, edges included
    pub fn within(&self, vp: &Viewport) -> impl Iterator<Item = &Point> + '_ {
        let envelope = AABB::from_corners([vp.xmin, vp.ymin], [vp.xmax, vp.ymax]);
        self.tree.locate_in_envelope(&envelope).map(|p| &p.0)
    }

    /// Every indexed point, in tree order
    pub fn iter(&self) -> impl Iterator<Item = &Point> + '_ {
        self.tree.iter().map(|p| &p.0)
    }
}

impl Default for PointIndex {
    fn default() -> Self {
        Self::new()
    }
}
