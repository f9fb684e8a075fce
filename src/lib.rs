//! Animated 2-D replay of a recorded trajectory over a reference point cloud.

pub mod animation;
pub mod config;
pub mod error;
pub mod kinematics;
pub mod output;
pub mod point_cloud;
pub mod render;
pub mod trajectory;
pub mod types;
pub mod viewport;

pub use animation::{playback_interval, AnimationDriver, FrameSequence, FrameSource};
pub use config::{validate_play_rate, AnimeConfig, OutputFormat};
pub use error::{AnimeError, Result};
pub use output::{FrameSink, OutputMode, OutputTarget};
pub use point_cloud::PointCloud;
pub use render::{FrameRenderer, RenderMode, RenderState};
pub use trajectory::{base_name, TrajectoryStore};
pub use types::{Point, PoseSample};
pub use viewport::Viewport;
