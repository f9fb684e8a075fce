//! Planar speed derived from consecutive pose samples.
//!
//! Speed is the ground-plane displacement between samples `i-1` and `i`
//! divided by their time delta. Duplicate timestamps make that undefined;
//! the replay reports zero for such frames instead of aborting.

use crate::error::{AnimeError, Result};
use crate::trajectory::TrajectoryStore;
use crate::types::PoseSample;

pub const MS_TO_KMH: f64 = 3.6;

/// Raw planar speed in m/s between two samples
pub fn planar_speed(prev: &PoseSample, cur: &PoseSample, index: usize) -> Result<f64> {
    let dt = cur.timestamp - prev.timestamp;
    if dt <= 0.0 {
        return Err(AnimeError::DivisionUndefined { index });
    }
    let dx = cur.x - prev.x;
    let dy = cur.y - prev.y;
    Ok((dx * dx + dy * dy).sqrt() / dt)
}

/// Speed at sample `index` in km/h.
///
/// Zero for the first sample and for zero-duration steps.
pub fn speed_kmh(store: &TrajectoryStore, index: usize) -> Result<f64> {
    let cur = store.sample_at(index)?;
    if index == 0 {
        return Ok(0.0);
    }
    let prev = store.sample_at(index - 1)?;

    match planar_speed(prev, cur, index) {
        Ok(v) => Ok(v * MS_TO_KMH),
        Err(AnimeError::DivisionUndefined { index }) => {
            log::debug!("Zero time delta at sample {}, reporting 0 km/h", index);
            Ok(0.0)
        }
        Err(e) => Err(e),
    }
}
