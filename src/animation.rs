use std::io::{self, Write};
use std::time::Duration;

use crate::error::{AnimeError, Result};
use crate::output::{Flow, FrameSink};
use crate::render::{FrameRenderer, RenderState};
use crate::trajectory::TrajectoryStore;

/// Sample indices visited by the replay: `start, start + stride, ... < len`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSequence {
    pub start: usize,
    pub stride: usize,
    pub len: usize,
}

impl FrameSequence {
    pub fn new(len: usize, stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(AnimeError::Config("frame stride must be at least 1".to_string()));
        }
        Ok(FrameSequence {
            start: 0,
            stride,
            len,
        })
    }

    /// Number of frames, `ceil((len - start) / stride)`
    pub fn count(&self) -> usize {
        let span = self.len.saturating_sub(self.start);
        span.div_ceil(self.stride)
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> {
        (self.start..self.len).step_by(self.stride)
    }
}

/// Delay between displayed frames: 100 ms at rate 1
pub fn playback_interval(play_rate: f64) -> Result<Duration> {
    if !(play_rate > 0.0) || !play_rate.is_finite() {
        return Err(AnimeError::Config(format!(
            "play_rate must be positive, got {}",
            play_rate
        )));
    }
    Ok(Duration::from_secs_f64(0.1 / play_rate))
}

/// Anything that turns a replay state into a packed RGB frame
pub trait FrameSource {
    fn frame_size(&self) -> (u32, u32);

    fn store(&self) -> &TrajectoryStore;

    fn render_frame(&self, state: &RenderState) -> Result<Vec<u8>>;
}

impl FrameSource for FrameRenderer<'_> {
    fn frame_size(&self) -> (u32, u32) {
        FrameRenderer::frame_size(self)
    }

    fn store(&self) -> &TrajectoryStore {
        FrameRenderer::store(self)
    }

    fn render_frame(&self, state: &RenderState) -> Result<Vec<u8>> {
        self.render_rgb(state)
    }
}

/// Walks the frame sequence once and feeds every frame to a sink
pub struct AnimationDriver {
    sequence: FrameSequence,
    progress: bool,
}

impl AnimationDriver {
    pub fn new(sequence: FrameSequence) -> Self {
        AnimationDriver {
            sequence,
            progress: true,
        }
    }

    /// Turn off the `frame / total` counter on stdout
    pub fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }

    /// Render and deliver every frame in order. Returns the number of frames
    /// delivered, which is short of the total when the sink asks to stop.
    pub fn run<S, K>(&self, source: &S, sink: &mut K) -> Result<usize>
    where
        S: FrameSource,
        K: FrameSink + ?Sized,
    {
        let total = self.sequence.count();
        let (w, h) = source.frame_size();
        let mut state = RenderState::default();
        let mut delivered = 0;

        sink.begin(total)?;
        for (n, index) in self.sequence.indices().enumerate() {
            state.advance(source.store(), index)?;
            let rgb = source.render_frame(&state)?;
            if self.progress {
                print_progress(n + 1, total);
            }

            let flow = sink.push_frame(&rgb, w, h)?;
            delivered += 1;
            if flow == Flow::Stop {
                log::info!("Replay stopped by viewer at frame {} / {}", n + 1, total);
                break;
            }
        }
        if self.progress {
            println!();
        }
        sink.finish()?;

        log::info!("Delivered {} of {} frames", delivered, total);
        Ok(delivered)
    }
}

fn print_progress(current: usize, total: usize) {
    let mut out = io::stdout();
    let _ = write!(out, "\r {} / {}", current, total);
    let _ = out.flush();
}
