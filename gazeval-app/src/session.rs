use anyhow::{Context, Result};
use gazeval_core::{DeviceId, MessageEvent};
use gazeval_render::{SkiaDisplay, load_font};
use gazeval_timing::SharedTimer;
use gazeval_validation::sim::{GazeTarget, SimulatedTracker};
use gazeval_validation::{Display, EventBus, UnitConverter, Units, ValidationConfig, ValidationProcedure};
use std::path::{Path, PathBuf};
use tracing::{info, trace};

const BACKGROUND: [u8; 4] = [128, 128, 128, 255];

pub struct SessionOptions {
    pub units: Units,
    pub output: PathBuf,
    pub font: Option<PathBuf>,
    pub tracker_rate: f64,
    pub noise: f64,
    pub dropout: f64,
    pub seed: Option<u64>,
}

pub fn load_config(path: Option<&Path>) -> Result<ValidationConfig> {
    let Some(path) = path else {
        return Ok(ValidationConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: ValidationConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    info!(path = %path.display(), "loaded validation config");
    Ok(config)
}

pub fn skia_display(converter: UnitConverter, timer: SharedTimer, font: Option<&Path>) -> Result<SkiaDisplay> {
    let display = SkiaDisplay::new(converter, timer, BACKGROUND)?;
    Ok(match font {
        Some(path) => display.with_font(load_font(path)?),
        None => display,
    })
}

/// Registers a simulated tracker looking at whatever target `gaze` holds,
/// and a message sink that traces every experiment message.
pub fn attach_devices(bus: &EventBus, timer: SharedTimer, gaze: GazeTarget, opts: &SessionOptions) -> Result<()> {
    let mut tracker = SimulatedTracker::new(timer, gaze, opts.tracker_rate)?
        .with_noise(opts.noise)?
        .with_dropout(opts.dropout)
        .binocular(true);
    if let Some(seed) = opts.seed {
        tracker = tracker.seed(seed);
    }
    bus.add_device(DeviceId::Tracker, tracker);
    bus.set_message_sink(|m: &MessageEvent| {
        trace!(time = m.time, category = %m.category, text = %m.text, "message");
    });
    Ok(())
}

/// Runs the procedure and writes the results file. `None` when the user
/// terminated the run.
pub fn run_validation<D: Display + ?Sized>(
    win: &mut D,
    bus: &EventBus,
    config: ValidationConfig,
    output: &Path,
) -> Result<Option<bool>> {
    let mut procedure = ValidationProcedure::new(win, bus, config)?;
    let Some(results) = procedure.run() else {
        return Ok(None);
    };
    for line in results.report_lines() {
        println!("{line}");
    }
    results
        .save_json(output)
        .with_context(|| format!("writing results {}", output.display()))?;
    info!(path = %output.display(), "results written");
    Ok(Some(results.passed))
}
