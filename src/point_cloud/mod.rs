pub mod index;
pub mod pcd;
pub mod voxel;

use std::path::Path;

pub use index::{IndexedPoint, PointIndex};
pub use pcd::{parse_pcd, read_pcd};
pub use voxel::{effective_leaf, voxel_downsample, MIN_LEAF_SIZE};

use crate::error::Result;
use crate::types::Point;
use crate::viewport::Viewport;

/// Ground-plane reference map drawn under the trajectory.
///
/// Built once from any number of PCD files, optionally voxel-downsampled,
/// and only read afterwards.
pub struct PointCloud {
    index: PointIndex,
    leaf: Option<f64>,
}

impl PointCloud {
    pub fn empty() -> Self {
        PointCloud {
            index: PointIndex::new(),
            leaf: None,
        }
    }

    pub fn from_points(points: Vec<Point>) -> Self {
        PointCloud {
            index: PointIndex::from_points(points),
            leaf: None,
        }
    }

    /// Merge all `paths`, then downsample with cell edge `max(leaf_size, 0.1)`.
    ///
    /// `leaf_size <= 0` keeps every point. No paths gives an empty cloud.
    pub fn load<P: AsRef<Path>>(paths: &[P], leaf_size: f64) -> Result<Self> {
        let merged = read_merged(paths)?;
        Ok(Self::from_raw(&merged, leaf_size))
    }

    /// Downsample already-read 3-D points and index their ground projection
    pub fn from_raw(raw: &[[f64; 3]], leaf_size: f64) -> Self {
        if raw.is_empty() {
            return Self::empty();
        }

        let leaf = effective_leaf(leaf_size);
        let points = match leaf {
            Some(leaf) => voxel_downsample(raw, leaf),
            None => raw.to_vec(),
        };

        log::info!(
            "Point cloud: {} points -> {} (leaf {})",
            raw.len(),
            points.len(),
            leaf.map(|l| format!("{:.3} m", l))
                .unwrap_or_else(|| "off".to_string())
        );

        PointCloud {
            index: PointIndex::from_points(points.into_iter().map(Point::from).collect()),
            leaf,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Cell edge used when the cloud was downsampled
    pub fn leaf(&self) -> Option<f64> {
        self.leaf
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> + '_ {
        self.index.iter()
    }

    /// All points inside `vp` (edges included); empty when nothing matches
    pub fn range_query(&self, vp: &Viewport) -> Vec<Point> {
        self.index.within(vp).copied().collect()
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::empty()
    }
}

/// Read and concatenate the finite points of every PCD in `paths`
pub fn read_merged<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<[f64; 3]>> {
    let mut merged: Vec<[f64; 3]> = Vec::new();
    for path in paths {
        let pts = read_pcd(path.as_ref())?;
        log::debug!("{}: {} points", path.as_ref().display(), pts.len());
        merged.extend(pts);
    }
    if !paths.is_empty() {
        log::info!("Read {} points from {} PCD files", merged.len(), paths.len());
    }
    Ok(merged)
}
