use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use traj_anime::output::{FrameSink, WindowSink};
use traj_anime::point_cloud::read_merged;
use traj_anime::viewport::long_scale;
use traj_anime::{
    base_name, playback_interval, validate_play_rate, AnimationDriver, AnimeConfig,
    FrameRenderer, FrameSequence, OutputFormat, OutputMode, OutputTarget, PointCloud,
    TrajectoryStore,
};

#[derive(Parser, Debug)]
#[command(name = "traj_anime")]
#[command(about = "Replay a trajectory over a point cloud map as an animation", long_about = None)]
struct Args {
    /// show (interactive window) or save (GIF / MP4 file)
    #[arg(value_name = "MODE")]
    mode: OutputMode,

    /// Replay speed; 1 advances one frame every 100 ms
    #[arg(value_name = "PLAY_RATE")]
    play_rate: f64,

    /// Pose CSV (.csv or .csv.gz)
    #[arg(value_name = "TRAJECTORY")]
    trajectory: PathBuf,

    /// Optional output directory followed by PCD map files
    #[arg(value_name = "OUTPUT_DIR_OR_PCD")]
    rest: Vec<PathBuf>,

    /// Saved file format (gif, mp4)
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Samples between frames
    #[arg(long)]
    step: Option<usize>,

    /// Half side of the zoomed window in meters
    #[arg(long)]
    zoom_size: Option<f64>,

    /// Draw only the global panel
    #[arg(long, default_value_t = false)]
    no_zoom: bool,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// JSON file with setting overrides
    #[arg(long)]
    config: Option<PathBuf>,
}

/// The output directory is optional, so a leading `.pcd` argument is already
/// a map file
fn split_output_dir(rest: &[PathBuf]) -> (Option<PathBuf>, Vec<PathBuf>) {
    match rest.split_first() {
        Some((first, tail)) if !is_pcd(first) => (Some(first.clone()), tail.to_vec()),
        _ => (None, rest.to_vec()),
    }
}

fn is_pcd(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("pcd"))
        .unwrap_or(false)
}

fn trajectory_dir(trajectory: &Path) -> PathBuf {
    match trajectory.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// File overrides first, then command-line flags
fn build_config(args: &Args) -> Result<AnimeConfig> {
    let mut config = match &args.config {
        Some(path) => AnimeConfig::from_json_file(path)?,
        None => AnimeConfig::default(),
    };
    if let Some(format) = args.format {
        config.format = format;
    }
    if let Some(step) = args.step {
        config.step = step;
    }
    if let Some(zoom) = args.zoom_size {
        config.zoom_size = zoom;
    }
    if args.no_zoom {
        config.zoom_enabled = false;
    }
    if let Some(w) = args.width {
        config.width = w;
    }
    if let Some(h) = args.height {
        config.height = h;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = build_config(&args).context("Invalid settings")?;
    let play_rate = validate_play_rate(args.play_rate)?;
    let (output_dir, pcds) = split_output_dir(&args.rest);

    let store = TrajectoryStore::load(&args.trajectory)
        .with_context(|| format!("Failed to load {}", args.trajectory.display()))?;
    let name = base_name(&args.trajectory);

    let target = match args.mode {
        OutputMode::Save => {
            let dir = output_dir.unwrap_or_else(|| trajectory_dir(&args.trajectory));
            Some(OutputTarget::prepare(&dir, &args.trajectory, config.format)?)
        }
        OutputMode::Show => {
            if let Some(dir) = output_dir {
                log::warn!("Ignoring output directory {} in show mode", dir.display());
            }
            None
        }
    };

    let raw = read_merged(&pcds).context("Failed to load point cloud")?;
    let global_cloud = PointCloud::from_raw(&raw, config.global_leaf(long_scale(&store)));
    let local_cloud = if config.zoom_enabled {
        PointCloud::from_raw(&raw, config.local_leaf())
    } else {
        PointCloud::empty()
    };
    drop(raw);

    println!("traj: {}", name);
    println!("samples: {}", store.len());
    println!("step: {}", config.step);
    println!("zoom size: {} m", config.zoom_size);
    for (label, cloud) in [("global", &global_cloud), ("local", &local_cloud)] {
        if let Some(leaf) = cloud.leaf() {
            println!("{} cloud: {} points (leaf {:.3} m)", label, cloud.len(), leaf);
        }
    }

    let renderer = FrameRenderer::new(&store, &global_cloud, &local_cloud, &config, &name);
    let driver = AnimationDriver::new(FrameSequence::new(store.len(), config.step)?);

    let mut sink: Box<dyn FrameSink> = match &target {
        Some(target) => target.open_sink(play_rate, renderer.frame_size())?,
        None => Box::new(WindowSink::new(
            &format!("traj_anime - {}", name),
            playback_interval(play_rate)?,
        )),
    };
    driver.run(&renderer, sink.as_mut())?;

    if let Some(target) = target {
        println!("saved: {}", target.path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run(Args::parse())
}
