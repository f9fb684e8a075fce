use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnimeError, Result};
use crate::viewport::DEFAULT_MARGIN_RATIO;

/// Frame side limits in pixels
pub const MIN_FRAME_SIDE: u32 = 64;
pub const MAX_FRAME_SIDE: u32 = 8192;

/// Container written in save mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Gif,
    Mp4,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "gif",
            OutputFormat::Mp4 => "mp4",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = AnimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gif" => Ok(OutputFormat::Gif),
            "mp4" => Ok(OutputFormat::Mp4),
            other => Err(AnimeError::Config(format!(
                "unknown output format '{}' (expected gif or mp4)",
                other
            ))),
        }
    }
}

/// Replay settings. Every field has a default, so a JSON override file only
/// needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimeConfig {
    /// Samples skipped between rendered frames
    pub step: usize,
    /// Half side of the zoomed window in meters
    pub zoom_size: f64,
    pub zoom_enabled: bool,
    /// Frame size in pixels
    pub width: u32,
    pub height: u32,
    /// Global cloud leaf = factor × longer trajectory side
    pub global_leaf_factor: f64,
    /// Local cloud leaf = factor × zoom window side
    pub local_leaf_factor: f64,
    pub margin_ratio: f64,
    pub format: OutputFormat,
}

impl Default for AnimeConfig {
    fn default() -> Self {
        Self {
            step: 10,
            zoom_size: 60.0,
            zoom_enabled: true,
            width: 1920,
            height: 1080,
            global_leaf_factor: 0.003,
            local_leaf_factor: 0.003,
            margin_ratio: DEFAULT_MARGIN_RATIO,
            format: OutputFormat::Gif,
        }
    }
}

impl AnimeConfig {
    /// Load overrides from a JSON file on top of the defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| AnimeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
            .map_err(|e| AnimeError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AnimeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(AnimeError::Config("step must be at least 1".to_string()));
        }
        if !(self.zoom_size > 0.0) {
            return Err(AnimeError::Config(format!(
                "zoom_size must be positive, got {}",
                self.zoom_size
            )));
        }
        let sides = MIN_FRAME_SIDE..=MAX_FRAME_SIDE;
        if !sides.contains(&self.width) || !sides.contains(&self.height) {
            return Err(AnimeError::Config(format!(
                "frame size {}x{} outside {}..={} pixels per side",
                self.width, self.height, MIN_FRAME_SIDE, MAX_FRAME_SIDE
            )));
        }
        if !(self.margin_ratio >= 0.0) {
            return Err(AnimeError::Config("margin_ratio must not be negative".to_string()));
        }
        Ok(())
    }

    /// Side length of the zoomed window in meters
    pub fn zoom_window(&self) -> f64 {
        self.zoom_size * 2.0
    }

    pub fn global_leaf(&self, long_scale: f64) -> f64 {
        long_scale * self.global_leaf_factor
    }

    pub fn local_leaf(&self) -> f64 {
        self.zoom_window() * self.local_leaf_factor
    }
}

/// Check a user play rate; rates above 100 still work but are unusually fast
pub fn validate_play_rate(play_rate: f64) -> Result<f64> {
    if !(play_rate > 0.0) || !play_rate.is_finite() {
        return Err(AnimeError::Config(format!(
            "play_rate must be a positive number, got {}",
            play_rate
        )));
    }
    if play_rate > 100.0 {
        log::warn!("play_rate {} is above the usual maximum of 100", play_rate);
    }
    Ok(play_rate)
}
