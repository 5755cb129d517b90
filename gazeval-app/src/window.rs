//! Fullscreen winit window presenting the software canvas through pixels.
//!
//! The procedure owns the control flow, so the event loop is pumped from
//! inside [`Display::flip`] and [`Display::pump_events`] instead of being
//! handed over to `run_app`.

use crate::session::{self, SessionOptions};
use anyhow::{Result, anyhow, bail};
use gazeval_core::{Bounds, DeviceEvent, DeviceId, KeyboardEvent, Position};
use gazeval_render::SkiaDisplay;
use gazeval_timing::{HighPrecisionTimer, SharedTimer, Timer};
use gazeval_validation::sim::{GazeTarget, ObservedDisplay};
use gazeval_validation::{
    Display, EventBus, EventSource, MonitorGeometry, Rgba, TargetStim, UnitConverter, Units,
    ValidationConfig,
};
use pixels::{Pixels, SurfaceTexture};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowId};

type KeyQueue = Rc<RefCell<VecDeque<KeyboardEvent>>>;

const OPEN_POLL: Duration = Duration::from_millis(16);

/// Keyboard fed by the window's key events.
pub struct WindowKeyboard {
    queue: KeyQueue,
    reporting: bool,
}

impl EventSource for WindowKeyboard {
    fn get_events(&mut self) -> Vec<DeviceEvent> {
        let events: Vec<_> = self.queue.borrow_mut().drain(..).collect();
        if !self.reporting {
            return Vec::new();
        }
        events.into_iter().map(DeviceEvent::Keyboard).collect()
    }

    fn clear_events(&mut self) {
        self.queue.borrow_mut().clear();
    }

    fn enable_event_reporting(&mut self, enabled: bool) {
        self.reporting = enabled;
    }

    fn is_reporting_events(&self) -> bool {
        self.reporting
    }
}

/// Lower-case key names as used in configs, e.g. `space`, `escape`, `g`.
fn key_name(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Space => "space",
        KeyCode::Escape => "escape",
        KeyCode::Enter => "return",
        KeyCode::Tab => "tab",
        KeyCode::Backspace => "backspace",
        KeyCode::ArrowLeft => "left",
        KeyCode::ArrowRight => "right",
        KeyCode::ArrowUp => "up",
        KeyCode::ArrowDown => "down",
        _ => {
            let debug = format!("{code:?}");
            return debug
                .strip_prefix("Key")
                .or_else(|| debug.strip_prefix("Digit"))
                .map(str::to_ascii_lowercase);
        }
    };
    Some(name.to_string())
}

struct WindowHost {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    size: Option<PhysicalSize<u32>>,
    refresh_rate: Option<f64>,
    keys: KeyQueue,
    timer: SharedTimer,
    closed: bool,
    error: Option<anyhow::Error>,
}

impl WindowHost {
    fn new(timer: SharedTimer, keys: KeyQueue) -> Self {
        Self {
            window: None,
            pixels: None,
            size: None,
            refresh_rate: None,
            keys,
            timer,
            closed: false,
            error: None,
        }
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("Gaze Validation")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();

        println!("Display Configuration:");
        println!("  Physical size: {}×{}", physical_size.width, physical_size.height);
        println!("  Scale factor: {:.2}", window.scale_factor());
        if let Some(refresh_rate) = self.refresh_rate {
            println!("  Refresh rate: {:.1} Hz", refresh_rate);
        }

        let surface_texture = SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(physical_size.width, physical_size.height, surface_texture)?);
        self.size = Some(physical_size);

        window.set_cursor_visible(false);
        self.window = Some(window);
        Ok(())
    }

    fn push_key(&self, name: String, state: ElementState) {
        let t = self.timer.now();
        let event = match state {
            ElementState::Pressed => KeyboardEvent::press(t, name),
            ElementState::Released => KeyboardEvent::release(t, name),
        };
        self.keys.borrow_mut().push_back(event);
    }
}

impl ApplicationHandler for WindowHost {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!(error = %e, "failed to create window and surface");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                // closing the window counts as the terminate key
                self.closed = true;
                self.push_key("escape".to_string(), ElementState::Pressed);
                self.push_key("escape".to_string(), ElementState::Released);
            }
            WindowEvent::KeyboardInput { event, .. } if !event.repeat => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(name) = key_name(code) {
                        self.push_key(name, event.state);
                    }
                }
            }
            WindowEvent::Resized(sz) => {
                if self.size != Some(sz) {
                    warn!(width = sz.width, height = sz.height, "window resized; frames are no longer presented");
                }
            }
            _ => {}
        }
    }
}

pub struct WindowDisplay {
    event_loop: EventLoop<()>,
    host: WindowHost,
    canvas: SkiaDisplay,
    timer: SharedTimer,
}

impl WindowDisplay {
    /// Opens the window and sizes the canvas to it. `monitor` supplies the
    /// physical width and viewing distance; its pixel size is replaced by the
    /// window's.
    pub fn open(
        timer: SharedTimer,
        units: Units,
        mut monitor: MonitorGeometry,
        font: Option<&Path>,
    ) -> Result<(Self, WindowKeyboard)> {
        let mut event_loop = EventLoop::new()?;
        let keys = KeyQueue::default();
        let mut host = WindowHost::new(timer.clone(), keys.clone());

        while host.pixels.is_none() {
            let status = event_loop.pump_app_events(Some(OPEN_POLL), &mut host);
            if let Some(e) = host.error.take() {
                return Err(e);
            }
            if let PumpStatus::Exit(code) = status {
                bail!("event loop exited with code {code} before the window opened");
            }
        }
        let size = host.size.ok_or_else(|| anyhow!("window has no size"))?;
        monitor.width_px = size.width;
        monitor.height_px = size.height;

        let converter = UnitConverter::new(units, monitor)?;
        let canvas = session::skia_display(converter, timer.clone(), font)?;
        let keyboard = WindowKeyboard {
            queue: keys,
            reporting: true,
        };
        Ok((
            Self {
                event_loop,
                host,
                canvas,
                timer,
            },
            keyboard,
        ))
    }

    pub fn canvas(&self) -> &SkiaDisplay {
        &self.canvas
    }

    fn present(&mut self) {
        let Some(pixels) = self.host.pixels.as_mut() else {
            return;
        };
        let frame = pixels.frame_mut();
        let front = self.canvas.front_frame();
        if frame.len() != front.len() {
            debug!(frame = frame.len(), canvas = front.len(), "frame size mismatch, skipping present");
            return;
        }
        frame.copy_from_slice(front);
        if let Err(e) = pixels.render() {
            warn!(error = %e, "present failed");
        }
    }
}

impl Display for WindowDisplay {
    fn bounds(&self) -> Bounds {
        self.canvas.bounds()
    }

    fn pixel_size(&self) -> (u32, u32) {
        self.canvas.pixel_size()
    }

    fn units(&self) -> Units {
        self.canvas.units()
    }

    fn draw_target(&mut self, target: &TargetStim) {
        self.canvas.draw_target(target)
    }

    fn draw_gaze_cursor(&mut self, pos: Position) {
        self.canvas.draw_gaze_cursor(pos)
    }

    fn draw_sample(&mut self, pos: Position, radius: f64, color: Rgba) {
        self.canvas.draw_sample(pos, radius, color)
    }

    fn draw_text(&mut self, text: &str, pos: Position, height_px: f32, color: Rgba) {
        self.canvas.draw_text(text, pos, height_px, color)
    }

    /// Swaps the canvas and presents it; `pixels` blocks on vsync, so the
    /// returned time is taken after the frame is queued for scan-out.
    fn flip(&mut self) -> f64 {
        self.canvas.flip();
        self.present();
        let t = self.timer.now();
        self.pump_events();
        t
    }

    fn pump_events(&mut self) {
        let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.host);
        if let PumpStatus::Exit(code) = status {
            debug!(code, "event loop exit requested");
            self.host.closed = true;
        }
    }

    fn save_frame(&mut self, path: &Path) -> io::Result<()> {
        self.canvas.save_frame(path)
    }
}

impl Drop for WindowDisplay {
    fn drop(&mut self) {
        if let Some(window) = &self.host.window {
            window.set_cursor_visible(true);
        }
    }
}

pub fn run(config: ValidationConfig, opts: &SessionOptions) -> Result<Option<bool>> {
    let timer = HighPrecisionTimer::shared();
    let (window, keyboard) = WindowDisplay::open(timer.clone(), opts.units, config.monitor, opts.font.as_deref())?;

    let mut config = config;
    config.monitor = *window.canvas().converter().monitor();

    let bus = EventBus::new(timer.clone());
    bus.add_device(DeviceId::Keyboard, keyboard);
    let gaze = GazeTarget::default();
    session::attach_devices(&bus, timer, gaze.clone(), opts)?;

    let mut display = ObservedDisplay::new(window, gaze);
    let outcome = session::run_validation(&mut display, &bus, config, &opts.output)?;
    if display.inner().host.closed {
        info!("window closed");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_match_config_names() {
        assert_eq!(key_name(KeyCode::Space).as_deref(), Some("space"));
        assert_eq!(key_name(KeyCode::Escape).as_deref(), Some("escape"));
        assert_eq!(key_name(KeyCode::KeyG).as_deref(), Some("g"));
        assert_eq!(key_name(KeyCode::Digit3).as_deref(), Some("3"));
        assert_eq!(key_name(KeyCode::F1), None);
    }
}
