use serde::{Deserialize, Serialize};

/// One timestamped pose of the replayed vehicle.
///
/// Position in meters, orientation in radians. Only `yaw` is consumed by the
/// renderer (heading arrow); roll and pitch pass through unused.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl PoseSample {
    /// Pose with position only (zero orientation)
    pub fn at(timestamp: f64, x: f64, y: f64) -> Self {
        Self {
            timestamp,
            x,
            y,
            z: 0.0,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
        }
    }

    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Unit heading vector from yaw
    pub fn heading(&self) -> (f64, f64) {
        (self.yaw.cos(), self.yaw.sin())
    }
}

/// A point-cloud point projected onto the ground plane
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

impl From<[f64; 3]> for Point {
    fn from(p: [f64; 3]) -> Self {
        Point { x: p[0], y: p[1] }
    }
}
