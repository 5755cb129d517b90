//! Simulated devices for headless runs and tests.
//!
//! The simulated tracker looks at whatever target the display last
//! presented; [`ObservedDisplay`] publishes that position on every flip.

use crate::device::EventSource;
use crate::display::{Display, Rgba, TargetStim};
use crate::error::ConfigError;
use crate::units::{UnitConverter, Units};
use gazeval_core::{Bounds, DeviceEvent, EyePoint, EyeSample, Gaze, KeyboardEvent, Position};
use gazeval_timing::SharedTimer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

/// Where the simulated eye is looking: the target on screen, if any.
pub type GazeTarget = Rc<Cell<Option<Position>>>;

/// Status written for samples without usable gaze.
pub const STATUS_LOST: i32 = 2;

struct AutoPress {
    key: String,
    interval: f64,
    next: f64,
}

/// Keyboard that replays a fixed script against the shared clock. Events
/// are released once the clock reaches their timestamp.
pub struct ScriptedKeyboard {
    timer: SharedTimer,
    script: VecDeque<KeyboardEvent>,
    auto: Option<AutoPress>,
    reporting: bool,
}

impl ScriptedKeyboard {
    pub fn new(timer: SharedTimer, mut events: Vec<KeyboardEvent>) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            timer,
            script: events.into(),
            auto: None,
            reporting: true,
        }
    }

    /// Presses and releases `key` every `interval` seconds, starting one
    /// interval from now.
    pub fn autopress(timer: SharedTimer, key: &str, interval: Duration) -> Self {
        let interval = interval.as_secs_f64().max(1e-3);
        let next = timer.now() + interval;
        Self {
            timer,
            script: VecDeque::new(),
            auto: Some(AutoPress {
                key: key.to_string(),
                interval,
                next,
            }),
            reporting: true,
        }
    }

    pub fn push(&mut self, event: KeyboardEvent) {
        self.script.push_back(event);
    }

    fn due(&mut self) -> Vec<DeviceEvent> {
        let now = self.timer.now();
        let mut out = Vec::new();
        while self.script.front().is_some_and(|e| e.time <= now) {
            if let Some(e) = self.script.pop_front() {
                out.push(DeviceEvent::Keyboard(e));
            }
        }
        if let Some(auto) = self.auto.as_mut() {
            while auto.next <= now {
                out.push(DeviceEvent::Keyboard(KeyboardEvent::press(auto.next, auto.key.clone())));
                out.push(DeviceEvent::Keyboard(KeyboardEvent::release(auto.next, auto.key.clone())));
                auto.next += auto.interval;
            }
        }
        out
    }
}

impl EventSource for ScriptedKeyboard {
    fn get_events(&mut self) -> Vec<DeviceEvent> {
        let events = self.due();
        if self.reporting { events } else { Vec::new() }
    }

    fn clear_events(&mut self) {
        self.due();
    }

    fn enable_event_reporting(&mut self, enabled: bool) {
        self.reporting = enabled;
    }

    fn is_reporting_events(&self) -> bool {
        self.reporting
    }
}

/// Eye tracker that fixates the presented target with Gaussian jitter, a
/// constant bias and random sample loss.
pub struct SimulatedTracker {
    timer: SharedTimer,
    target: GazeTarget,
    period: f64,
    noise: Option<Normal<f64>>,
    bias: Position,
    dropout: f64,
    binocular: bool,
    rng: StdRng,
    next_time: Option<f64>,
    reporting: bool,
}

impl SimulatedTracker {
    pub fn new(timer: SharedTimer, target: GazeTarget, rate_hz: f64) -> Result<Self, ConfigError> {
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(ConfigError::Simulation(format!("sample rate {rate_hz} Hz")));
        }
        Ok(Self {
            timer,
            target,
            period: 1.0 / rate_hz,
            noise: None,
            bias: Position::ORIGIN,
            dropout: 0.0,
            binocular: false,
            rng: StdRng::from_rng(&mut rand::rng()),
            next_time: None,
            reporting: false,
        })
    }

    /// Per-axis jitter in display units.
    pub fn with_noise(mut self, std: f64) -> Result<Self, ConfigError> {
        self.noise = if std > 0.0 {
            Some(Normal::new(0.0, std).map_err(|e| ConfigError::Simulation(format!("gaze noise {std}: {e}")))?)
        } else {
            None
        };
        Ok(self)
    }

    pub fn with_bias(mut self, bias: Position) -> Self {
        self.bias = bias;
        self
    }

    /// Probability in `[0, 1]` that a sample is reported as lost.
    pub fn with_dropout(mut self, p: f64) -> Self {
        self.dropout = p.clamp(0.0, 1.0);
        self
    }

    pub fn binocular(mut self, on: bool) -> Self {
        self.binocular = on;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn jitter(&mut self) -> f64 {
        match &self.noise {
            Some(n) => n.sample(&mut self.rng),
            None => 0.0,
        }
    }

    fn eye(&mut self, p: Position) -> EyePoint {
        let x = p.x + self.bias.x + self.jitter();
        let y = p.y + self.bias.y + self.jitter();
        EyePoint::new(x, y, 4.0)
    }

    fn sample_at(&mut self, time: f64) -> EyeSample {
        let lost = self.dropout > 0.0 && self.rng.random_bool(self.dropout);
        match self.target.get() {
            Some(p) if !lost => {
                let gaze = if self.binocular {
                    Gaze::Binocular {
                        left: self.eye(p),
                        right: self.eye(p),
                    }
                } else {
                    Gaze::Monocular(self.eye(p))
                };
                EyeSample {
                    time,
                    status: 0,
                    gaze,
                }
            }
            _ => {
                let none = EyePoint::new(0.0, 0.0, 0.0);
                EyeSample {
                    time,
                    status: STATUS_LOST,
                    gaze: if self.binocular {
                        Gaze::Binocular {
                            left: none,
                            right: none,
                        }
                    } else {
                        Gaze::Monocular(none)
                    },
                }
            }
        }
    }
}

impl EventSource for SimulatedTracker {
    fn get_events(&mut self) -> Vec<DeviceEvent> {
        if !self.reporting {
            return Vec::new();
        }
        let now = self.timer.now();
        let mut t = self.next_time.unwrap_or(now);
        let mut out = Vec::new();
        while t <= now {
            out.push(DeviceEvent::Sample(self.sample_at(t)));
            t += self.period;
        }
        self.next_time = Some(t);
        out
    }

    fn clear_events(&mut self) {
        self.next_time = None;
    }

    fn enable_event_reporting(&mut self, enabled: bool) {
        if enabled && !self.reporting {
            self.next_time = None;
        }
        self.reporting = enabled;
    }

    fn is_reporting_events(&self) -> bool {
        self.reporting
    }
}

/// Wraps a display and publishes the presented target position to a
/// [`GazeTarget`].
pub struct ObservedDisplay<D> {
    inner: D,
    target: GazeTarget,
    pending: Option<Position>,
}

impl<D: Display> ObservedDisplay<D> {
    pub fn new(inner: D, target: GazeTarget) -> Self {
        Self {
            inner,
            target,
            pending: None,
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }
}

impl<D: Display> Display for ObservedDisplay<D> {
    fn bounds(&self) -> Bounds {
        self.inner.bounds()
    }

    fn pixel_size(&self) -> (u32, u32) {
        self.inner.pixel_size()
    }

    fn units(&self) -> Units {
        self.inner.units()
    }

    fn draw_target(&mut self, target: &TargetStim) {
        self.pending = Some(target.pos);
        self.inner.draw_target(target)
    }

    fn draw_gaze_cursor(&mut self, pos: Position) {
        self.inner.draw_gaze_cursor(pos)
    }

    fn draw_sample(&mut self, pos: Position, radius: f64, color: Rgba) {
        self.inner.draw_sample(pos, radius, color)
    }

    fn draw_text(&mut self, text: &str, pos: Position, height_px: f32, color: Rgba) {
        self.inner.draw_text(text, pos, height_px, color)
    }

    fn flip(&mut self) -> f64 {
        let t = self.inner.flip();
        self.target.set(self.pending.take());
        t
    }

    fn pump_events(&mut self) {
        self.inner.pump_events()
    }

    fn save_frame(&mut self, path: &Path) -> io::Result<()> {
        self.inner.save_frame(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Target(TargetStim),
    GazeCursor(Position),
    Sample(Position),
    Text(String),
}

/// Display that records draw calls instead of rendering. Each flip sleeps
/// one frame interval on the shared timer.
pub struct RecordingDisplay {
    timer: SharedTimer,
    converter: UnitConverter,
    frame_interval: Duration,
    back: Vec<DrawCall>,
    pub frames: Vec<(f64, Vec<DrawCall>)>,
}

impl RecordingDisplay {
    pub fn new(timer: SharedTimer, converter: UnitConverter, refresh_hz: f64) -> Self {
        Self {
            timer,
            converter,
            frame_interval: Duration::from_secs_f64(1.0 / refresh_hz.max(1.0)),
            back: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn flip_count(&self) -> usize {
        self.frames.len()
    }
}

impl Display for RecordingDisplay {
    fn bounds(&self) -> Bounds {
        self.converter.bounds()
    }

    fn pixel_size(&self) -> (u32, u32) {
        let m = self.converter.monitor();
        (m.width_px, m.height_px)
    }

    fn units(&self) -> Units {
        self.converter.units()
    }

    fn draw_target(&mut self, target: &TargetStim) {
        self.back.push(DrawCall::Target(*target));
    }

    fn draw_gaze_cursor(&mut self, pos: Position) {
        self.back.push(DrawCall::GazeCursor(pos));
    }

    fn draw_sample(&mut self, pos: Position, _radius: f64, _color: Rgba) {
        self.back.push(DrawCall::Sample(pos));
    }

    fn draw_text(&mut self, text: &str, _pos: Position, _height_px: f32, _color: Rgba) {
        self.back.push(DrawCall::Text(text.to_string()));
    }

    fn flip(&mut self) -> f64 {
        self.timer.sleep(self.frame_interval);
        let t = self.timer.now();
        self.frames.push((t, std::mem::take(&mut self.back)));
        t
    }
}
