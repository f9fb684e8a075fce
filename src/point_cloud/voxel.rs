use std::collections::HashMap;

/// Smallest cell edge accepted for downsampling, in meters
pub const MIN_LEAF_SIZE: f64 = 0.1;

/// Cell edge actually used for a requested leaf size, or `None` when
/// downsampling is disabled (`leaf_size <= 0`)
pub fn effective_leaf(leaf_size: f64) -> Option<f64> {
    if leaf_size > 0.0 {
        Some(leaf_size.max(MIN_LEAF_SIZE))
    } else {
        None
    }
}

/// Voxel-grid downsampling: every occupied cubic cell of edge `leaf` is
/// replaced by the mean of the points inside it.
///
/// The grid is anchored at the origin, and a cell mean always lies inside its
/// own cell, so running the filter again at the same leaf keeps the count.
pub fn voxel_downsample(points: &[[f64; 3]], leaf: f64) -> Vec<[f64; 3]> {
    if points.is_empty() || leaf <= 0.0 {
        return points.to_vec();
    }

    let mut cells: HashMap<[i64; 3], ([f64; 3], usize)> = HashMap::with_capacity(points.len() / 4);
    for p in points {
        let key = p.map(|v| (v / leaf).floor() as i64);
        let (sum, n) = cells.entry(key).or_insert(([0.0; 3], 0));
        for (s, v) in sum.iter_mut().zip(p.iter()) {
            *s += v;
        }
        *n += 1;
    }

    cells
        .into_values()
        .map(|(sum, n)| sum.map(|s| s / n as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<[f64; 3]> {
        let mut pts = Vec::new();
        for i in 0..40 {
            for j in 0..40 {
                pts.push([i as f64 * 0.037, j as f64 * 0.053 - 1.0, (i * j % 7) as f64 * 0.01]);
            }
        }
        pts
    }

    #[test]
    fn test_effective_leaf_floor() {
        assert_eq!(effective_leaf(0.0), None);
        assert_eq!(effective_leaf(-1.0), None);
        assert_eq!(effective_leaf(0.02), Some(MIN_LEAF_SIZE));
        assert_eq!(effective_leaf(0.36), Some(0.36));
    }

    #[test]
    fn test_merges_points_in_one_cell() {
        let pts = vec![[0.1, 0.1, 0.0], [0.3, 0.5, 0.0], [0.2, 0.3, 0.0]];
        let out = voxel_downsample(&pts, 1.0);
        assert_eq!(out.len(), 1);
        assert!((out[0][0] - 0.2).abs() < 1e-12);
        assert!((out[0][1] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_separate_cells_stay_separate() {
        let pts = vec![[0.5, 0.5, 0.0], [1.5, 0.5, 0.0], [-0.5, 0.5, 0.0]];
        assert_eq!(voxel_downsample(&pts, 1.0).len(), 3);
    }

    #[test]
    fn test_reduces_count() {
        let pts = grid_points();
        let out = voxel_downsample(&pts, 0.25);
        assert!(out.len() < pts.len());
        assert!(!out.is_empty());
    }

    #[test]
    fn test_reapplying_does_not_grow() {
        let pts = grid_points();
        for leaf in [0.1, 0.25, 0.7] {
            let once = voxel_downsample(&pts, leaf);
            let twice = voxel_downsample(&once, leaf);
            assert!(twice.len() <= once.len(), "leaf {}", leaf);
        }
    }

    #[test]
    fn test_empty_and_disabled() {
        assert!(voxel_downsample(&[], 0.5).is_empty());
        let pts = grid_points();
        assert_eq!(voxel_downsample(&pts, 0.0).len(), pts.len());
    }
}
