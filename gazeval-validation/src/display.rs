use crate::units::Units;
use gazeval_core::{Bounds, Position};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

pub type Rgba = [u8; 4];

/// Doughnut shaped fixation target. Sizes are in display units except
/// `edge_width`, which is always pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetStim {
    pub pos: Position,
    pub radius: f64,
    pub dot_radius: f64,
    pub fill_color: Rgba,
    pub edge_color: Rgba,
    pub dot_color: Rgba,
    pub edge_width: f32,
}

impl Default for TargetStim {
    fn default() -> Self {
        Self {
            pos: Position::ORIGIN,
            radius: 20.0,
            dot_radius: 5.0,
            fill_color: [191, 191, 191, 255],
            edge_color: [255, 255, 255, 255],
            dot_color: [0, 0, 0, 255],
            edge_width: 2.0,
        }
    }
}

impl TargetStim {
    /// Radius the contract phase shrinks to.
    pub fn inner_radius(&self) -> f64 {
        if self.dot_radius > 0.0 {
            self.dot_radius
        } else {
            self.radius / 2.0
        }
    }
}

/// Window the validation sequence draws into.
///
/// Coordinates are display units centered on the screen, y up. Drawing
/// calls accumulate into a back buffer that [`Display::flip`] presents.
pub trait Display {
    /// (left, top, right, bottom) in display units.
    fn bounds(&self) -> Bounds;

    fn pixel_size(&self) -> (u32, u32);

    fn units(&self) -> Units;

    fn draw_target(&mut self, target: &TargetStim);

    fn draw_gaze_cursor(&mut self, pos: Position);

    /// Filled marker for one gaze sample on the results screen.
    fn draw_sample(&mut self, pos: Position, radius: f64, color: Rgba);

    /// Centered text; `height_px` is the line height in pixels.
    fn draw_text(&mut self, text: &str, pos: Position, height_px: f32, color: Rgba);

    /// Presents the back buffer, blocking until it is on screen, and starts
    /// a blank one. Returns the flip time in seconds on the shared clock.
    fn flip(&mut self) -> f64;

    /// Lets the host window system process its queue.
    fn pump_events(&mut self) {}

    /// Writes the last presented frame as an image.
    fn save_frame(&mut self, path: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("frame capture not supported ({})", path.display()),
        ))
    }
}
