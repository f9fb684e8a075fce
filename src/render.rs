//! Per-frame drawing of the global and zoomed panels with plotters.

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::config::AnimeConfig;
use crate::error::{AnimeError, Result};
use crate::kinematics::speed_kmh;
use crate::point_cloud::PointCloud;
use crate::trajectory::TrajectoryStore;
use crate::types::{Point, PoseSample};
use crate::viewport::Viewport;

const CHART_MARGIN: u32 = 20;
const X_LABEL_AREA: u32 = 50;
const Y_LABEL_AREA: u32 = 70;
const TITLE_FONT: u32 = 28;
const OVERLAY_FONT: u32 = 22;

/// Heading arrow length as a fraction of the panel width
const ARROW_SCALE: f64 = 0.04;

/// Panel layout, fixed for the whole replay
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    GlobalOnly,
    GlobalPlusZoom,
}

impl RenderMode {
    /// The zoom panel needs both the flag and something to show in it
    pub fn select(zoom_enabled: bool, local_cloud: &PointCloud) -> Self {
        if zoom_enabled && !local_cloud.is_empty() {
            RenderMode::GlobalPlusZoom
        } else {
            RenderMode::GlobalOnly
        }
    }

    pub fn panels(&self) -> usize {
        match self {
            RenderMode::GlobalOnly => 1,
            RenderMode::GlobalPlusZoom => 2,
        }
    }
}

/// Replay state threaded from one frame to the next
#[derive(Clone, Debug, Default)]
pub struct RenderState {
    /// Planar positions of samples `0..=frame`
    pub prefix: Vec<(f64, f64)>,
    pub frame: usize,
}

impl RenderState {
    /// Move to `frame`, appending only the samples not seen yet
    pub fn advance(&mut self, store: &TrajectoryStore, frame: usize) -> Result<()> {
        store.extend_prefix(&mut self.prefix, frame)?;
        self.frame = frame;
        Ok(())
    }
}

/// Shaft and head polylines of a heading arrow, in data coordinates
#[derive(Clone, Debug, PartialEq)]
pub struct Arrow {
    pub shaft: [(f64, f64); 2],
    pub head: [(f64, f64); 3],
}

pub fn heading_arrow(pose: &PoseSample, length: f64) -> Arrow {
    let (hx, hy) = pose.heading();
    let tip = (pose.x + hx * length, pose.y + hy * length);

    let barb = length * 0.3;
    let spread = std::f64::consts::PI * 5.0 / 6.0;
    let side = |angle: f64| {
        let a = pose.yaw + angle;
        (tip.0 + a.cos() * barb, tip.1 + a.sin() * barb)
    };

    Arrow {
        shaft: [(pose.x, pose.y), tip],
        head: [side(spread), tip, side(-spread)],
    }
}

pub fn global_title(name: &str) -> String {
    format!("traj:{}  plot", name)
}

pub fn zoom_title(zoom_size: f64) -> String {
    let side = zoom_size * 2.0;
    format!("Zoomed plot ({}[m] x {}[m])", side, side)
}

pub fn overlay_lines(elapsed: f64, speed_kmh: f64) -> [String; 2] {
    [
        format!("{:.2} [sec]", elapsed),
        format!("velocity: {:.2} [km/h]", speed_kmh),
    ]
}

/// Pixel size of the plotting rectangle left inside a titled panel once the
/// chart margin and label areas are taken out
pub fn plot_area_size(panel_w: u32, panel_h: u32) -> (u32, u32) {
    (
        panel_w.saturating_sub(Y_LABEL_AREA + 2 * CHART_MARGIN),
        panel_h.saturating_sub(X_LABEL_AREA + 2 * CHART_MARGIN),
    )
}

/// Where a panel's chart goes: exact axis limits plus the padding that
/// centres a plotting rectangle with one meter per pixel ratio on both axes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PanelLayout {
    pub limits: Viewport,
    pub pad_x: u32,
    pub pad_y: u32,
    /// Final plotting rectangle in pixels
    pub plot: (u32, u32),
}

/// Shrink the plotting rectangle of a `panel_w × panel_h` titled panel to
/// the aspect of `extent`; the limits themselves never change
pub fn panel_layout(extent: Viewport, panel_w: u32, panel_h: u32) -> PanelLayout {
    let (pw, ph) = plot_area_size(panel_w, panel_h);
    let (ew, eh) = (extent.width(), extent.height());
    let (mut plot_w, mut plot_h) = (pw, ph);

    if pw > 0 && ph > 0 && ew > 0.0 && eh > 0.0 {
        let target = ew / eh;
        if pw as f64 / ph as f64 > target {
            plot_w = ((ph as f64 * target).round() as u32).clamp(1, pw);
        } else {
            plot_h = ((pw as f64 / target).round() as u32).clamp(1, ph);
        }
    }

    PanelLayout {
        limits: extent,
        pad_x: (pw - plot_w) / 2,
        pad_y: (ph - plot_h) / 2,
        plot: (plot_w, plot_h),
    }
}

fn backend_err<E: std::fmt::Display>(e: E) -> AnimeError {
    AnimeError::Render(e.to_string())
}

enum PanelCloud<'p> {
    Points(&'p [Point]),
    Indexed(&'p PointCloud),
}

impl PanelCloud<'_> {
    /// Points inside the final axis limits
    fn visible(&self, vp: &Viewport) -> Vec<Point> {
        match self {
            PanelCloud::Points(points) => {
                points.iter().copied().filter(|p| vp.contains(p)).collect()
            }
            PanelCloud::Indexed(cloud) => cloud.range_query(vp),
        }
    }
}

struct Panel<'p> {
    title: String,
    extent: Viewport,
    cloud: PanelCloud<'p>,
    trail: &'p [(f64, f64)],
    pose: &'p PoseSample,
    heading: bool,
}

/// Draws replay frames for one trajectory and its clouds
pub struct FrameRenderer<'a> {
    store: &'a TrajectoryStore,
    local_cloud: &'a PointCloud,
    global_points: Vec<Point>,
    global_extent: Viewport,
    config: &'a AnimeConfig,
    mode: RenderMode,
    name: String,
}

impl<'a> FrameRenderer<'a> {
    pub fn new(
        store: &'a TrajectoryStore,
        global_cloud: &'a PointCloud,
        local_cloud: &'a PointCloud,
        config: &'a AnimeConfig,
        name: &str,
    ) -> Self {
        let global_extent = Viewport::global_extent(store, config.margin_ratio);
        let mode = RenderMode::select(config.zoom_enabled, local_cloud);
        log::info!(
            "Render layout {:?}, global extent x[{:.1}, {:.1}] y[{:.1}, {:.1}]",
            mode,
            global_extent.xmin,
            global_extent.xmax,
            global_extent.ymin,
            global_extent.ymax
        );

        FrameRenderer {
            store,
            local_cloud,
            global_points: global_cloud.points().copied().collect(),
            global_extent,
            config,
            mode,
            name: name.to_string(),
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn store(&self) -> &TrajectoryStore {
        self.store
    }

    pub fn global_extent(&self) -> Viewport {
        self.global_extent
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Clear `root` and draw the frame for `state`. Returns the layout of
    /// every drawn panel, global first.
    pub fn draw<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, Shift>,
        state: &RenderState,
    ) -> Result<Vec<PanelLayout>> {
        let pose = self.store.sample_at(state.frame)?;
        root.fill(&WHITE).map_err(backend_err)?;

        let panels = root.split_evenly((1, self.mode.panels()));
        let mut layouts = Vec::with_capacity(panels.len());

        let global = Panel {
            title: global_title(&self.name),
            extent: self.global_extent,
            cloud: PanelCloud::Points(&self.global_points),
            trail: &state.prefix,
            pose,
            heading: self.store.has_heading(),
        };
        layouts.push(draw_panel(&panels[0], &global)?);

        if self.store.has_time() {
            let elapsed = self.store.elapsed(state.frame)?;
            let speed = speed_kmh(self.store, state.frame)?;
            draw_overlay(&panels[0], &overlay_lines(elapsed, speed))?;
        }

        if let Some(zoom_area) = panels.get(1) {
            let zoom = Panel {
                title: zoom_title(self.config.zoom_size),
                extent: Viewport::local_extent(pose, self.config.zoom_size),
                cloud: PanelCloud::Indexed(self.local_cloud),
                trail: &state.prefix,
                pose,
                heading: self.store.has_heading(),
            };
            layouts.push(draw_panel(zoom_area, &zoom)?);
        }

        log::trace!("Drew frame {}", state.frame);
        Ok(layouts)
    }

    /// Render the frame into a packed RGB buffer of `frame_size()`
    pub fn render_rgb(&self, state: &RenderState) -> Result<Vec<u8>> {
        let (w, h) = self.frame_size();
        let mut buf = vec![0u8; w as usize * h as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
            self.draw(&root, state)?;
            root.present().map_err(backend_err)?;
        }
        Ok(buf)
    }
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
) -> Result<PanelLayout> {
    let inner = area
        .titled(&panel.title, ("sans-serif", TITLE_FONT))
        .map_err(backend_err)?;
    let (w, h) = inner.dim_in_pixel();
    let layout = panel_layout(panel.extent, w, h);
    let vp = layout.limits;
    let padded = inner.margin(layout.pad_y, layout.pad_y, layout.pad_x, layout.pad_x);

    let mut chart = ChartBuilder::on(&padded)
        .margin(CHART_MARGIN)
        .x_label_area_size(X_LABEL_AREA)
        .y_label_area_size(Y_LABEL_AREA)
        .build_cartesian_2d(vp.xmin..vp.xmax, vp.ymin..vp.ymax)
        .map_err(backend_err)?;

    chart
        .configure_mesh()
        .x_desc("x [m]")
        .y_desc("y [m]")
        .light_line_style(RGBColor(230, 230, 230))
        .draw()
        .map_err(backend_err)?;

    let cloud = panel.cloud.visible(&vp);
    if cloud.is_empty() {
        log::debug!("No cloud points inside '{}'", panel.title);
    } else {
        chart
            .draw_series(
                cloud
                    .iter()
                    .map(|p| Circle::new((p.x, p.y), 1, BLACK.mix(0.2).filled())),
            )
            .map_err(backend_err)?;
    }

    // Past samples outside the axis limits would bleed into the label area
    chart
        .draw_series(
            panel
                .trail
                .iter()
                .filter(|&&(x, y)| vp.contains(&Point::new(x, y)))
                .map(|&(x, y)| Circle::new((x, y), 2, BLUE.filled())),
        )
        .map_err(backend_err)?
        .label("trajectory")
        .legend(|(x, y)| Circle::new((x, y), 3, BLUE.filled()));

    let pose = panel.pose;
    chart
        .draw_series(std::iter::once(Cross::new(
            (pose.x, pose.y),
            6,
            RED.stroke_width(2),
        )))
        .map_err(backend_err)?
        .label("current_point")
        .legend(|(x, y)| Cross::new((x, y), 4, RED.stroke_width(2)));

    if panel.heading {
        let arrow = heading_arrow(pose, panel.extent.width() * ARROW_SCALE);
        chart
            .draw_series([
                PathElement::new(arrow.shaft.to_vec(), BLACK.stroke_width(2)),
                PathElement::new(arrow.head.to_vec(), BLACK.stroke_width(2)),
            ])
            .map_err(backend_err)?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(backend_err)?;
    Ok(layout)
}

/// Elapsed time and speed, right-aligned in the panel's title band
fn draw_overlay<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, lines: &[String]) -> Result<()> {
    let (w, _) = area.dim_in_pixel();
    let style = ("sans-serif", OVERLAY_FONT)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Right, VPos::Top));

    for (row, line) in lines.iter().enumerate() {
        let y = 4 + row as i32 * (OVERLAY_FONT as i32 + 2);
        area.draw(&Text::new(line.as_str(), (w as i32 - 12, y), style.clone()))
            .map_err(backend_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::PoseSchema;
    use approx::assert_relative_eq;

    #[test]
    fn test_mode_without_cloud_is_global_only() {
        let empty = PointCloud::empty();
        assert_eq!(RenderMode::select(true, &empty), RenderMode::GlobalOnly);
        assert_eq!(RenderMode::select(true, &empty).panels(), 1);

        let cloud = PointCloud::from_points(vec![Point::new(1.0, 2.0)]);
        assert_eq!(RenderMode::select(true, &cloud), RenderMode::GlobalPlusZoom);
        assert_eq!(RenderMode::select(false, &cloud), RenderMode::GlobalOnly);
    }

    #[test]
    fn test_arrow_points_along_yaw() {
        let mut pose = PoseSample::at(0.0, 10.0, 5.0);
        pose.yaw = std::f64::consts::FRAC_PI_2;

        let arrow = heading_arrow(&pose, 4.0);
        assert_eq!(arrow.shaft[0], (10.0, 5.0));
        assert_relative_eq!(arrow.shaft[1].0, 10.0, epsilon = 1e-9);
        assert_relative_eq!(arrow.shaft[1].1, 9.0, epsilon = 1e-9);

        // Barbs fall back behind the tip, one on each side
        let (l, r) = (arrow.head[0], arrow.head[2]);
        assert!(l.1 < 9.0 && r.1 < 9.0);
        assert_relative_eq!(l.0 - 10.0, -(r.0 - 10.0), epsilon = 1e-9);
    }

    #[test]
    fn test_titles_and_overlay() {
        assert_eq!(global_title("run_01"), "traj:run_01  plot");
        assert_eq!(zoom_title(60.0), "Zoomed plot (120[m] x 120[m])");
        assert_eq!(zoom_title(2.5), "Zoomed plot (5[m] x 5[m])");

        let [t, v] = overlay_lines(12.345, 36.0);
        assert_eq!(t, "12.35 [sec]");
        assert_eq!(v, "velocity: 36.00 [km/h]");
    }

    #[test]
    fn test_plot_area_never_underflows() {
        assert_eq!(plot_area_size(10, 10), (0, 0));
        let (w, h) = plot_area_size(960, 1040);
        assert_eq!(w, 960 - Y_LABEL_AREA - 2 * CHART_MARGIN);
        assert_eq!(h, 1040 - X_LABEL_AREA - 2 * CHART_MARGIN);
    }

    #[test]
    fn test_panel_layout_keeps_limits_and_shrinks_plot() {
        let extent = Viewport::new(-10.0, 110.0, -10.0, 20.0);
        let layout = panel_layout(extent, 1920, 1030);
        assert_eq!(layout.limits, extent);

        let (pw, ph) = plot_area_size(1920, 1030);
        let (w, h) = layout.plot;
        assert_eq!(w, pw);
        assert!(h < ph);
        assert_relative_eq!(w as f64 / h as f64, 4.0, epsilon = 0.02);
        assert_eq!(layout.pad_x, 0);
        assert_eq!(layout.pad_y, (ph - h) / 2);

        // Square zoom window in a tall panel stays square
        let zoom = Viewport::new(-60.0, 60.0, -60.0, 60.0);
        let layout = panel_layout(zoom, 960, 1030);
        assert_eq!(layout.limits, zoom);
        assert!(layout.plot.0.abs_diff(layout.plot.1) <= 1);
        assert_eq!(layout.pad_x, 0);
    }

    fn small_config(zoom_enabled: bool) -> AnimeConfig {
        AnimeConfig {
            width: 400,
            height: 300,
            zoom_enabled,
            ..AnimeConfig::default()
        }
    }

    /// Count non-white pixels in a rectangle of a packed RGB frame
    fn ink(buf: &[u8], width: u32, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> usize {
        let mut n = 0;
        for y in ys {
            for x in xs.clone() {
                let i = (y as usize * width as usize + x as usize) * 3;
                if buf[i..i + 3] != [255, 255, 255] {
                    n += 1;
                }
            }
        }
        n
    }

    /// North-bound run along x = 0, 100 m long
    fn tall_store(schema: PoseSchema) -> TrajectoryStore {
        let samples = (0..=10)
            .map(|i| {
                let mut p = PoseSample::at(i as f64, 0.0, i as f64 * 10.0);
                p.yaw = std::f64::consts::FRAC_PI_2;
                p
            })
            .collect();
        TrajectoryStore::from_samples(samples, schema).unwrap()
    }

    fn grid_cloud(center: (f64, f64), half: f64) -> PointCloud {
        let mut points = Vec::new();
        for i in -10..=10 {
            for j in -10..=10 {
                let (dx, dy) = (i as f64 * half / 10.0, j as f64 * half / 10.0);
                points.push(Point::new(center.0 + dx, center.1 + dy));
            }
        }
        PointCloud::from_points(points)
    }

    #[test]
    fn test_drawn_limits_match_viewports() {
        let samples = vec![PoseSample::at(0.0, 0.0, 0.0), PoseSample::at(1.0, 100.0, 10.0)];
        let store = TrajectoryStore::from_samples(samples, PoseSchema::FULL).unwrap();
        let global = PointCloud::empty();
        let local = grid_cloud((100.0, 10.0), 50.0);
        let config = small_config(true);
        let renderer = FrameRenderer::new(&store, &global, &local, &config, "b");
        assert_eq!(renderer.mode(), RenderMode::GlobalPlusZoom);

        let mut state = RenderState::default();
        state.advance(&store, 1).unwrap();

        let mut buf = vec![0u8; 400 * 300 * 3];
        let layouts = {
            let root = BitMapBackend::with_buffer(&mut buf, (400, 300)).into_drawing_area();
            renderer.draw(&root, &state).unwrap()
        };
        assert_eq!(layouts.len(), 2);

        let g = layouts[0].limits;
        assert_eq!(g, renderer.global_extent());
        assert_relative_eq!(g.xmin, -10.0);
        assert_relative_eq!(g.xmax, 110.0);
        assert_relative_eq!(g.ymin, -10.0);
        assert_relative_eq!(g.ymax, 20.0);

        let pose = store.sample_at(1).unwrap();
        assert_eq!(layouts[1].limits, Viewport::local_extent(pose, 60.0));
        assert_relative_eq!(layouts[1].limits.width(), 120.0);
        assert_relative_eq!(layouts[1].limits.height(), 120.0);
    }

    #[test]
    fn test_render_rgb_zoom_panel_fills_right_half() {
        let store = tall_store(PoseSchema::POSITION_ONLY);
        let global = PointCloud::empty();
        let local = grid_cloud((0.0, 50.0), 60.0);

        // Right half, below the title band
        let right = (300..400, 60..300);

        let config = small_config(true);
        let zoomed = FrameRenderer::new(&store, &global, &local, &config, "t");
        assert_eq!(zoomed.mode(), RenderMode::GlobalPlusZoom);
        let mut state = RenderState::default();
        state.advance(&store, 5).unwrap();
        let buf = zoomed.render_rgb(&state).unwrap();
        assert_eq!(buf.len(), 400 * 300 * 3);
        assert!(ink(&buf, 400, right.0.clone(), right.1.clone()) > 0);

        // The global plot of a tall track is a narrow centred strip
        let config = small_config(false);
        let single = FrameRenderer::new(&store, &global, &local, &config, "t");
        assert_eq!(single.mode(), RenderMode::GlobalOnly);
        let buf = single.render_rgb(&state).unwrap();
        assert_eq!(buf.len(), 400 * 300 * 3);
        assert_eq!(ink(&buf, 400, right.0, right.1), 0);
    }

    #[test]
    fn test_overlay_only_with_timestamps() {
        let global = PointCloud::empty();
        let local = PointCloud::empty();
        let config = small_config(false);
        let corner = (320..400, 0..50);

        let timed = tall_store(PoseSchema::FULL);
        let renderer = FrameRenderer::new(&timed, &global, &local, &config, "t");
        let mut state = RenderState::default();
        state.advance(&timed, 3).unwrap();
        let buf = renderer.render_rgb(&state).unwrap();
        assert!(ink(&buf, 400, corner.0.clone(), corner.1.clone()) > 0);

        let untimed = tall_store(PoseSchema::POSITION_ONLY);
        let renderer = FrameRenderer::new(&untimed, &global, &local, &config, "t");
        let buf = renderer.render_rgb(&state).unwrap();
        assert_eq!(ink(&buf, 400, corner.0, corner.1), 0);
    }

    #[test]
    fn test_render_state_grows_incrementally() {
        let samples = (0..5)
            .map(|i| PoseSample::at(i as f64, i as f64, 0.0))
            .collect();
        let store = TrajectoryStore::from_samples(samples, PoseSchema::FULL).unwrap();

        let mut state = RenderState::default();
        state.advance(&store, 0).unwrap();
        assert_eq!(state.prefix.len(), 1);
        state.advance(&store, 3).unwrap();
        assert_eq!(state.prefix.len(), 4);
        assert_eq!(state.frame, 3);
        assert_eq!(state.prefix, store.prefix_up_to(3).unwrap());
        assert!(state.advance(&store, 5).is_err());
    }
}
