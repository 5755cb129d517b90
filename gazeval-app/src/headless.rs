//! Runs the whole procedure against a simulated clock. Every sleep advances
//! the clock instantly, so a full validation finishes in well under a second.

use crate::session::{self, SessionOptions};
use anyhow::Result;
use gazeval_core::DeviceId;
use gazeval_timing::{ManualTimer, SharedTimer, Timer};
use gazeval_validation::sim::{GazeTarget, ObservedDisplay, ScriptedKeyboard};
use gazeval_validation::{EventBus, UnitConverter, ValidationConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub fn run(config: ValidationConfig, opts: &SessionOptions, refresh_hz: f64, press_interval: f64) -> Result<Option<bool>> {
    let clock = ManualTimer::new(0.0);
    let timer: SharedTimer = Arc::new(clock.clone());
    let converter = UnitConverter::new(opts.units, config.monitor)?;

    let bus = EventBus::new(timer.clone());
    bus.add_device(
        DeviceId::Keyboard,
        ScriptedKeyboard::autopress(timer.clone(), "space", Duration::from_secs_f64(press_interval.max(0.01))),
    );
    let gaze = GazeTarget::default();
    session::attach_devices(&bus, timer.clone(), gaze.clone(), opts)?;

    let canvas = session::skia_display(converter, timer, opts.font.as_deref())?.with_frame_pacing(refresh_hz);
    let mut display = ObservedDisplay::new(canvas, gaze);

    let outcome = session::run_validation(&mut display, &bus, config, &opts.output)?;
    let stats = display.inner().timing_stats();
    info!(
        simulated_secs = clock.now(),
        fps = stats.effective_fps,
        jitter_ms = stats.jitter_ns / 1e6,
        "headless run finished"
    );
    Ok(outcome)
}
