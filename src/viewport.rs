use geo::{BoundingRect, MultiPoint};
use serde::{Deserialize, Serialize};

use crate::trajectory::TrajectoryStore;
use crate::types::{PoseSample, Point};

/// Margin used when the trajectory has no extent at all (single sample or
/// a vehicle that never moved)
pub const MIN_MARGIN: f64 = 1.0;

/// Default margin as a fraction of the trajectory's longer side
pub const DEFAULT_MARGIN_RATIO: f64 = 0.1;

/// Axis-aligned plot extent in meters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Viewport {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Viewport {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    /// Fixed extent for the whole-trajectory panel.
    ///
    /// The bounding box grows by `margin_ratio × max(xrange, yrange)` on every
    /// side so both axes get the same padding. A zero-extent trajectory falls
    /// back to `MIN_MARGIN`.
    pub fn global_extent(store: &TrajectoryStore, margin_ratio: f64) -> Self {
        let (bbox, scale) = bounding_box(store);
        let margin = margin_ratio * scale;
        let margin = if margin > 0.0 { margin } else { MIN_MARGIN };

        Viewport {
            xmin: bbox.xmin - margin,
            xmax: bbox.xmax + margin,
            ymin: bbox.ymin - margin,
            ymax: bbox.ymax + margin,
        }
    }

    /// Square window of side `2 × zoom_size` centered on `pose`
    pub fn local_extent(pose: &PoseSample, zoom_size: f64) -> Self {
        Viewport {
            xmin: pose.x - zoom_size,
            xmax: pose.x + zoom_size,
            ymin: pose.y - zoom_size,
            ymax: pose.y + zoom_size,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) * 0.5,
            (self.ymin + self.ymax) * 0.5,
        )
    }

    /// Inclusive on all edges
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.xmin && p.x <= self.xmax && p.y >= self.ymin && p.y <= self.ymax
    }
}

/// Longer side of the trajectory's bounding box in meters
pub fn long_scale(store: &TrajectoryStore) -> f64 {
    bounding_box(store).1
}

fn bounding_box(store: &TrajectoryStore) -> (Viewport, f64) {
    let points: MultiPoint<f64> = store
        .samples()
        .iter()
        .map(PoseSample::xy)
        .collect::<Vec<_>>()
        .into();

    // Store is non-empty, so the rect always exists
    let first = store.first();
    let bbox = points
        .bounding_rect()
        .map(|r| Viewport::new(r.min().x, r.max().x, r.min().y, r.max().y))
        .unwrap_or_else(|| Viewport::new(first.x, first.x, first.y, first.y));

    let scale = bbox.width().max(bbox.height());
    (bbox, scale)
}
