//! Software canvas implementing the validation [`Display`].

use crate::text::TextCache;
use ab_glyph::FontVec;
use anyhow::{Result, anyhow};
use gazeval_core::{Bounds, Position};
use gazeval_timing::{FrameStats, SharedTimer, TimingStats};
use gazeval_validation::{Display, Rgba, TargetStim, UnitConverter, Units};
use std::io;
use std::path::Path;
use std::time::Duration;
use tiny_skia::{
    Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};
use tracing::debug;

const GAZE_CURSOR_RADIUS_PX: f32 = 10.0;
const GAZE_CURSOR_COLOR: Rgba = [0, 255, 0, 200];

fn paint(color: Rgba) -> Paint<'static> {
    let mut p = Paint::default();
    p.set_color(Color::from_rgba8(color[0], color[1], color[2], color[3]));
    p.anti_alias = true;
    p
}

/// Draws into an off-screen back buffer; [`Display::flip`] swaps it with the
/// front buffer the host window reads from.
pub struct SkiaDisplay {
    width: u32,
    height: u32,
    converter: UnitConverter,
    timer: SharedTimer,
    canvas: Pixmap,
    front: Pixmap,
    clear_buffer: Vec<u8>,
    text_cache: Option<TextCache>,
    gaze_cursor_color: Rgba,
    pacing: Option<Duration>,
    stats: FrameStats,
}

impl SkiaDisplay {
    /// A canvas covering the converter's full screen.
    pub fn new(converter: UnitConverter, timer: SharedTimer, background: Rgba) -> Result<Self> {
        let m = converter.monitor();
        let (width, height) = (m.width_px, m.height_px);
        let mut canvas =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("invalid canvas size {width}x{height}"))?;
        canvas.fill(Color::from_rgba8(background[0], background[1], background[2], 255));
        let clear_buffer = canvas.data().to_vec();
        Ok(Self {
            width,
            height,
            converter,
            timer,
            front: canvas.clone(),
            canvas,
            clear_buffer,
            text_cache: None,
            gaze_cursor_color: GAZE_CURSOR_COLOR,
            pacing: None,
            stats: FrameStats::default(),
        })
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.text_cache = Some(TextCache::new(font));
        self
    }

    pub fn with_gaze_cursor_color(mut self, color: Rgba) -> Self {
        self.gaze_cursor_color = color;
        self
    }

    /// Sleep one refresh interval on every flip. Used when nothing else
    /// (such as a vsync'd present) paces the frames.
    pub fn with_frame_pacing(mut self, refresh_hz: f64) -> Self {
        self.pacing = (refresh_hz > 0.0).then(|| Duration::from_secs_f64(1.0 / refresh_hz));
        self
    }

    /// RGBA bytes of the last presented frame. The canvas is opaque, so the
    /// premultiplied data is also straight alpha.
    pub fn front_frame(&self) -> &[u8] {
        self.front.data()
    }

    pub fn converter(&self) -> &UnitConverter {
        &self.converter
    }

    pub fn back_buffer(&self) -> &Pixmap {
        &self.canvas
    }

    pub fn timing_stats(&self) -> TimingStats {
        self.stats.calibration_stats()
    }

    /// Display units to canvas pixels (origin top left, y down).
    pub fn to_canvas(&self, p: Position) -> (f32, f32) {
        let px = self.converter.to_pix(p);
        (
            (self.width as f64 / 2.0 + px.x) as f32,
            (self.height as f64 / 2.0 - px.y) as f32,
        )
    }

    fn length_px(&self, v: f64) -> f32 {
        self.converter.length_to_pix(v) as f32
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Rgba) {
        if radius <= 0.0 {
            return;
        }
        let mut pb = PathBuilder::new();
        pb.push_circle(center.0, center.1, radius);
        if let Some(path) = pb.finish() {
            self.canvas
                .fill_path(&path, &paint(color), FillRule::Winding, Transform::identity(), None);
        }
    }

    fn stroke_circle(&mut self, center: (f32, f32), radius: f32, width: f32, color: Rgba) {
        if radius <= 0.0 || width <= 0.0 {
            return;
        }
        let mut pb = PathBuilder::new();
        pb.push_circle(center.0, center.1, radius);
        if let Some(path) = pb.finish() {
            let stroke = Stroke {
                width,
                ..Stroke::default()
            };
            self.canvas
                .stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
        }
    }
}

impl Display for SkiaDisplay {
    fn bounds(&self) -> Bounds {
        self.converter.bounds()
    }

    fn pixel_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn units(&self) -> Units {
        self.converter.units()
    }

    fn draw_target(&mut self, target: &TargetStim) {
        let c = self.to_canvas(target.pos);
        let outer = self.length_px(target.radius);
        self.fill_circle(c, outer, target.fill_color);
        self.stroke_circle(c, outer, target.edge_width, target.edge_color);
        if target.dot_radius > 0.0 && target.dot_radius < target.radius {
            let inner = self.length_px(target.dot_radius);
            self.fill_circle(c, inner, target.dot_color);
        }
    }

    fn draw_gaze_cursor(&mut self, pos: Position) {
        let c = self.to_canvas(pos);
        self.stroke_circle(c, GAZE_CURSOR_RADIUS_PX, 2.0, self.gaze_cursor_color);
        self.fill_circle(c, 2.0, self.gaze_cursor_color);
    }

    fn draw_sample(&mut self, pos: Position, radius: f64, color: Rgba) {
        let c = self.to_canvas(pos);
        let r = self.length_px(radius).max(1.0);
        self.fill_circle(c, r, color);
    }

    fn draw_text(&mut self, text: &str, pos: Position, height_px: f32, color: Rgba) {
        let (x, y) = self.to_canvas(pos);
        let Some(cache) = self.text_cache.as_mut() else {
            return;
        };
        let Some(pm) = cache.get_or_render(text, height_px, color) else {
            return;
        };
        let x0 = (x - pm.width() as f32 * 0.5).round() as i32;
        let y0 = (y - pm.height() as f32 * 0.5).round() as i32;
        self.canvas.draw_pixmap(
            x0,
            y0,
            (*pm).as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    fn flip(&mut self) -> f64 {
        if let Some(d) = self.pacing {
            self.timer.sleep(d);
        }
        std::mem::swap(&mut self.canvas, &mut self.front);
        self.canvas.data_mut().copy_from_slice(&self.clear_buffer);
        let t = self.timer.now();
        self.stats.record_flip(t);
        t
    }

    fn save_frame(&mut self, path: &Path) -> io::Result<()> {
        debug!(path = %path.display(), "saving frame");
        self.front.save_png(path).map_err(io::Error::other)
    }
}
