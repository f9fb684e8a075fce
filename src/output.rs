//! Frame destinations: an interactive window, a GIF file or an MP4 file
//! encoded by an external `ffmpeg`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use minifb::{Key, Window, WindowOptions};
use plotters::coord::Shift;
use plotters::element::BitMapElement;
use plotters::prelude::*;

use crate::config::OutputFormat;
use crate::error::{AnimeError, Result};
use crate::trajectory::base_name;

/// What the CLI mode word asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    Show,
    Save,
}

impl std::str::FromStr for OutputMode {
    type Err = AnimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "show" => Ok(OutputMode::Show),
            "save" => Ok(OutputMode::Save),
            other => Err(AnimeError::Config(format!(
                "unknown mode '{}' (expected show or save)",
                other
            ))),
        }
    }
}

/// Whether the replay should keep going after a frame was pushed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Consumer of rendered frames, in replay order
pub trait FrameSink {
    fn begin(&mut self, total: usize) -> Result<()>;

    /// `rgb` is packed 8-bit RGB, `width × height × 3` bytes
    fn push_frame(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Flow>;

    fn finish(&mut self) -> Result<()>;
}

/// `<output_dir>/<trajectory base name>_anime.<ext>`
pub fn output_path(output_dir: &Path, trajectory: &Path, format: OutputFormat) -> PathBuf {
    output_dir.join(format!(
        "{}_anime.{}",
        base_name(trajectory),
        format.extension()
    ))
}

/// Frame rate of a saved file; one trajectory sample step per 100 ms of
/// replay at rate 1
pub fn save_fps(play_rate: f64) -> u32 {
    ((play_rate * 10.0).round() as u32).max(1)
}

/// Checked destination of a saved animation
#[derive(Clone, Debug)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub format: OutputFormat,
}

impl OutputTarget {
    /// Resolve the output file and make sure its directory takes writes.
    ///
    /// Runs before any frame is rendered so a bad directory fails fast.
    pub fn prepare(output_dir: &Path, trajectory: &Path, format: OutputFormat) -> Result<Self> {
        let meta = fs::metadata(output_dir)
            .map_err(|e| AnimeError::output_write(output_dir, e.to_string()))?;
        if !meta.is_dir() {
            return Err(AnimeError::output_write(output_dir, "not a directory"));
        }

        let scratch = output_dir.join(".traj_anime_write_check");
        fs::File::create(&scratch)
            .and_then(|mut f| f.write_all(b"ok"))
            .map_err(|e| AnimeError::output_write(output_dir, e.to_string()))?;
        let _ = fs::remove_file(&scratch);

        let path = output_path(output_dir, trajectory, format);
        log::info!("Saving animation to {}", path.display());
        Ok(OutputTarget { path, format })
    }

    pub fn open_sink(&self, play_rate: f64, frame_size: (u32, u32)) -> Result<Box<dyn FrameSink>> {
        let fps = save_fps(play_rate);
        Ok(match self.format {
            OutputFormat::Gif => Box::new(GifSink::new(&self.path, frame_size, 1000 / fps)),
            OutputFormat::Mp4 => Box::new(Mp4Sink::new(&self.path, frame_size, fps)),
        })
    }
}

/// Packed RGB to minifb's 0RGB words
pub fn to_minifb_buffer(rgb: &[u8]) -> Vec<u32> {
    rgb.chunks_exact(3)
        .map(|p| (255u32 << 24) | ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32)
        .collect()
}

fn check_frame(rgb: &[u8], width: u32, height: u32) -> Result<()> {
    let expected = width as usize * height as usize * 3;
    if rgb.len() != expected {
        return Err(AnimeError::Render(format!(
            "frame buffer has {} bytes, expected {} for {}x{}",
            rgb.len(),
            expected,
            width,
            height
        )));
    }
    Ok(())
}

/// Interactive playback window
pub struct WindowSink {
    title: String,
    interval: Duration,
    window: Option<Window>,
    last_frame: Option<(Vec<u32>, usize, usize)>,
    next_due: Option<Instant>,
}

impl WindowSink {
    pub fn new(title: &str, interval: Duration) -> Self {
        WindowSink {
            title: title.to_string(),
            interval,
            window: None,
            last_frame: None,
            next_due: None,
        }
    }

    fn closed(window: &Window) -> bool {
        !window.is_open() || window.is_key_down(Key::Escape)
    }
}

impl FrameSink for WindowSink {
    fn begin(&mut self, total: usize) -> Result<()> {
        log::debug!("Opening playback window for {} frames", total);
        Ok(())
    }

    fn push_frame(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Flow> {
        check_frame(rgb, width, height)?;
        let (w, h) = (width as usize, height as usize);

        if self.window.is_none() {
            let window = Window::new(&self.title, w, h, WindowOptions::default())
                .map_err(|e| AnimeError::Render(format!("cannot open window: {}", e)))?;
            self.window = Some(window);
        }
        let Some(window) = self.window.as_mut() else {
            return Ok(Flow::Stop);
        };
        if Self::closed(window) {
            return Ok(Flow::Stop);
        }

        if let Some(due) = self.next_due {
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + self.interval);

        let buffer = to_minifb_buffer(rgb);
        window
            .update_with_buffer(&buffer, w, h)
            .map_err(|e| AnimeError::Render(e.to_string()))?;
        self.last_frame = Some((buffer, w, h));
        Ok(Flow::Continue)
    }

    /// Keep the final frame up until the viewer closes the window
    fn finish(&mut self) -> Result<()> {
        let (Some(window), Some((buffer, w, h))) = (self.window.as_mut(), self.last_frame.as_ref())
        else {
            return Ok(());
        };
        while !Self::closed(window) {
            window
                .update_with_buffer(buffer, *w, *h)
                .map_err(|e| AnimeError::Render(e.to_string()))?;
            thread::sleep(Duration::from_millis(16));
        }
        self.window = None;
        Ok(())
    }
}

/// Animated GIF through the plotters bitmap backend
pub struct GifSink {
    path: PathBuf,
    size: (u32, u32),
    delay_ms: u32,
    root: Option<DrawingArea<BitMapBackend<'static>, Shift>>,
}

impl GifSink {
    pub fn new(path: &Path, size: (u32, u32), delay_ms: u32) -> Self {
        GifSink {
            path: path.to_path_buf(),
            size,
            delay_ms,
            root: None,
        }
    }

    fn write_err<E: std::fmt::Display>(&self, e: E) -> AnimeError {
        AnimeError::output_write(&self.path, e.to_string())
    }
}

impl FrameSink for GifSink {
    fn begin(&mut self, total: usize) -> Result<()> {
        let backend = BitMapBackend::gif(self.path.clone(), self.size, self.delay_ms)
            .map_err(|e| self.write_err(e))?;
        self.root = Some(backend.into_drawing_area());
        log::debug!("GIF encoder ready for {} frames", total);
        Ok(())
    }

    fn push_frame(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Flow> {
        check_frame(rgb, width, height)?;
        if (width, height) != self.size {
            return Err(AnimeError::Render(format!(
                "frame is {}x{}, GIF is {}x{}",
                width, height, self.size.0, self.size.1
            )));
        }
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| AnimeError::output_write(&self.path, "encoder not started"))?;

        let image = BitMapElement::with_owned_buffer((0, 0), (width, height), rgb.to_vec())
            .ok_or_else(|| AnimeError::Render("frame buffer size mismatch".to_string()))?;
        root.draw(&image).map_err(|e| self.write_err(e))?;
        root.present().map_err(|e| self.write_err(e))?;
        Ok(Flow::Continue)
    }

    fn finish(&mut self) -> Result<()> {
        // Dropping the backend closes the file
        self.root = None;
        Ok(())
    }
}

/// MP4 via an `ffmpeg` child reading raw rgb24 frames on stdin
pub struct Mp4Sink {
    path: PathBuf,
    size: (u32, u32),
    fps: u32,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl Mp4Sink {
    pub fn new(path: &Path, size: (u32, u32), fps: u32) -> Self {
        Mp4Sink {
            path: path.to_path_buf(),
            size,
            fps,
            child: None,
            stdin: None,
        }
    }

    fn ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", self.size.0, self.size.1),
            "-framerate".into(),
            self.fps.to_string(),
            "-i".into(),
            "-".into(),
            "-vf".into(),
            // yuv420p needs even dimensions
            "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            self.path.to_string_lossy().into_owned(),
        ]
    }
}

impl FrameSink for Mp4Sink {
    fn begin(&mut self, total: usize) -> Result<()> {
        let mut child = Command::new("ffmpeg")
            .args(self.ffmpeg_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| AnimeError::output_write(&self.path, format!("cannot run ffmpeg: {}", e)))?;
        self.stdin = child.stdin.take();
        self.child = Some(child);
        log::debug!("ffmpeg started for {} frames at {} fps", total, self.fps);
        Ok(())
    }

    fn push_frame(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Flow> {
        check_frame(rgb, width, height)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AnimeError::output_write(&self.path, "ffmpeg not started"))?;
        stdin
            .write_all(rgb)
            .map_err(|e| AnimeError::output_write(&self.path, format!("ffmpeg pipe: {}", e)))?;
        Ok(Flow::Continue)
    }

    fn finish(&mut self) -> Result<()> {
        // Closing stdin lets ffmpeg flush and exit
        self.stdin = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| AnimeError::output_write(&self.path, e.to_string()))?;
        if !status.success() {
            return Err(AnimeError::output_write(
                &self.path,
                format!("ffmpeg exited with {}", status),
            ));
        }
        Ok(())
    }
}
