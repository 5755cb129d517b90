//! The full validation run: optional intro screen, the target sequence,
//! accuracy analysis and the results screen.

use crate::accuracy::AccuracyReducer;
use crate::config::ValidationConfig;
use crate::device::EventBus;
use crate::display::{Display, Rgba, TargetStim};
use crate::error::ConfigError;
use crate::renderer::TargetRenderer;
use crate::results::{CalculationStatus, ValidationResults};
use crate::trigger::{KeyboardTrigger, Trigger, TriggerSpec, triggers_from};
use crate::units::{UnitConverter, Units};
use gazeval_core::{DeviceId, KeyEdge, Position};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const RESULTS_CATEGORY: &str = "VALIDATION";
const CONTINUE_KEY: &str = "space";
const POLL_INTERVAL: Duration = Duration::from_millis(1);

const PASSED_COLOR: Rgba = [0, 200, 0, 255];
const FAILED_COLOR: Rgba = [220, 0, 0, 255];
const INVALID_SAMPLE_COLOR: Rgba = [128, 128, 128, 255];

pub struct ValidationProcedure<'w, D: Display + ?Sized> {
    win: &'w mut D,
    bus: EventBus,
    config: ValidationConfig,
    converter: UnitConverter,
    reducer: AccuracyReducer,
    renderer: TargetRenderer,
    results: Option<ValidationResults>,
}

fn key_option(key: &str) -> Option<&str> {
    (!key.is_empty()).then_some(key)
}

impl<'w, D: Display + ?Sized> ValidationProcedure<'w, D> {
    /// Builds the grid and trigger set from `config`. Triggers come from
    /// `config.triggers`, else a press trigger per `progress_on_key`, else a
    /// time trigger of `animation.target_duration`.
    pub fn new(win: &'w mut D, bus: &EventBus, config: ValidationConfig) -> Result<Self, ConfigError> {
        let spec = match config.triggers.clone() {
            Some(t) => TriggerSpec::try_from(t)?,
            None if !config.progress_on_key.is_empty() => TriggerSpec::Triggers(
                config
                    .progress_on_key
                    .iter()
                    .map(|k| Box::new(KeyboardTrigger::new(bus, k, true)) as Box<dyn Trigger>)
                    .collect(),
            ),
            None => TriggerSpec::Delay(config.animation.target_duration),
        };
        Self::with_triggers(win, bus, config, spec)
    }

    /// Like [`ValidationProcedure::new`] with an explicit trigger set.
    pub fn with_triggers(
        win: &'w mut D,
        bus: &EventBus,
        config: ValidationConfig,
        triggers: TriggerSpec,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let converter = UnitConverter::new(win.units(), config.monitor)?;
        let mut grid =
            config
                .positions
                .build(win.bounds(), config.position_noise_std, config.seed)?;
        if config.randomize_positions {
            grid.randomize();
        }
        let triggers = triggers_from(triggers, bus)?;
        let reducer = AccuracyReducer::from_config(&config)?;

        info!(
            positions = grid.len(),
            units = %converter.units(),
            triggers = triggers.len(),
            "validation procedure configured"
        );

        let renderer = TargetRenderer::new(config.target, grid, triggers, bus)
            .with_category(&config.message_category)
            .with_terminate_key(key_option(&config.terminate_key))
            .with_gaze_cursor_key(key_option(&config.gaze_cursor_key));

        Ok(Self {
            win,
            bus: bus.clone(),
            config,
            converter,
            reducer,
            renderer,
            results: None,
        })
    }

    pub fn renderer(&self) -> &TargetRenderer {
        &self.renderer
    }

    pub fn converter(&self) -> &UnitConverter {
        &self.converter
    }

    pub fn validation_results(&self) -> Option<&ValidationResults> {
        self.results.as_ref()
    }

    /// Runs every stage. `None` if the user terminated at the intro screen
    /// or during the sequence.
    pub fn run(&mut self) -> Option<&ValidationResults> {
        self.results = None;

        if self.config.show_intro_screen && !self.show_intro_screen() {
            info!("validation cancelled at intro screen");
            return None;
        }

        info!("validation sequence starting");
        if !self.renderer.display(&mut *self.win, &self.config.animation) {
            return None;
        }
        self.bus.clear_all();

        let results = self.build_results();
        for line in results.report_lines() {
            self.bus.send_message(&line, RESULTS_CATEGORY, None);
        }
        info!(
            passed = results.passed,
            failed = results.positions_failed_processing,
            mean_error = ?results.mean_error,
            units = %results.reporting_unit_type,
            "validation analysed"
        );
        self.results = Some(results);

        if self.config.show_results_screen {
            self.show_results_screen();
        }
        self.results.as_ref()
    }

    fn show_intro_screen(&mut self) -> bool {
        let terminate = self.config.terminate_key.clone();
        let keys = [CONTINUE_KEY, terminate.as_str()];
        let color = self.config.text_color;
        let line = self.converter.length_from_pix(40.0);
        self.bus.clear_all();
        loop {
            self.win.draw_text(&self.config.intro_text, Position::ORIGIN, 32.0, color);
            self.win.draw_text(
                "Press SPACE to start, ESCAPE to exit.",
                Position::new(0.0, -line),
                24.0,
                color,
            );
            self.win.flip();
            self.win.pump_events();
            match self.bus.next_key(&keys, KeyEdge::Release) {
                Some(k) if k == terminate => return false,
                Some(_) => return true,
                None => {}
            }
        }
    }

    fn build_results(&self) -> ValidationResults {
        let display_units = self.converter.units();
        let reporting = if self.config.results_in_degrees {
            Units::Deg
        } else {
            display_units
        };

        let mut data = self.renderer.get_sample_message_data();
        if reporting != display_units {
            debug!(from = %display_units, to = %reporting, "converting samples");
            for position in data.iter_mut() {
                for s in position.iter_mut() {
                    *s = s.map_positions(|p| self.converter.convert(p, reporting));
                }
            }
        }

        let summary = self.reducer.reduce(&data);
        let (w, h) = self.win.pixel_size();
        ValidationResults::new(
            display_units,
            self.win.bounds(),
            [w, h],
            self.renderer.positions().pass_positions(),
            reporting,
            summary,
        )
    }

    fn show_results_screen(&mut self) {
        let terminate = self.config.terminate_key.clone();
        let gaze_key = self.config.gaze_cursor_key.clone();
        let keys = [CONTINUE_KEY, terminate.as_str(), gaze_key.as_str()];

        let restore_tracker =
            self.bus.has_device(DeviceId::Tracker) && !self.bus.is_reporting(DeviceId::Tracker);
        if restore_tracker {
            self.bus.enable_reporting(DeviceId::Tracker, true);
        }
        self.bus.clear_all();

        let timer = self.bus.timer();
        let mut show_gaze = self.renderer.display_gaze();
        let mut dirty = true;
        let mut saved = false;
        loop {
            if dirty || show_gaze {
                self.draw_results(show_gaze);
                self.win.flip();
                dirty = false;
                if !saved {
                    saved = true;
                    if let Some(path) = self.config.save_results_screen.clone() {
                        match self.win.save_frame(&path) {
                            Ok(()) => info!(path = %path.display(), "results screen saved"),
                            Err(e) => warn!(path = %path.display(), error = %e, "could not save results screen"),
                        }
                    }
                }
            } else {
                timer.sleep(POLL_INTERVAL);
            }
            self.win.pump_events();
            match self.bus.next_key(&keys, KeyEdge::Press) {
                Some(k) if !gaze_key.is_empty() && k == gaze_key => {
                    show_gaze = !show_gaze;
                    dirty = true;
                }
                Some(_) => break,
                None => {}
            }
            // only the latest gaze sample matters here
            self.bus.drain(DeviceId::Tracker);
        }

        if restore_tracker {
            self.bus.enable_reporting(DeviceId::Tracker, false);
        }
        self.bus.clear_all();
    }

    fn draw_results(&mut self, show_gaze: bool) {
        let Some(results) = self.results.as_ref() else {
            return;
        };
        let display_units = self.converter.units();
        let to_display = |p: Position| -> Position {
            match UnitConverter::new(results.reporting_unit_type, *self.converter.monitor()) {
                Ok(c) => c.convert(p, display_units),
                Err(_) => p,
            }
        };

        let text_color = self.config.text_color;
        let line = self.converter.length_from_pix(24.0);
        let sample_radius = self.converter.length_from_pix(2.0);
        let target = self.config.target;

        for pos in &results.target_positions {
            self.win.draw_target(&TargetStim { pos: *pos, ..target });
        }

        for r in &results.position_results {
            for s in &r.samples.used {
                let color = if r.calculation_status == CalculationStatus::Passed {
                    self.config.gaze_cursor_color
                } else {
                    INVALID_SAMPLE_COLOR
                };
                self.win.draw_sample(to_display(s.gaze.average()), sample_radius, color);
            }
            let Some(pos) = results.target_positions.get(r.index) else {
                continue;
            };
            let label_pos = Position::new(pos.x, pos.y - target.radius - line);
            match (r.calculation_status, r.error) {
                (CalculationStatus::Passed, Some(e)) => self.win.draw_text(
                    &format!("{:.2} {}", e.mean, results.reporting_unit_type),
                    label_pos,
                    18.0,
                    PASSED_COLOR,
                ),
                _ => self.win.draw_text("FAILED", label_pos, 18.0, FAILED_COLOR),
            }
        }

        let bounds = self.win.bounds();
        let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
        let summary = format!(
            "Accuracy Validation {}: min {}, max {}, mean {} {}",
            if results.passed { "PASSED" } else { "FAILED" },
            fmt(results.min_error),
            fmt(results.max_error),
            fmt(results.mean_error),
            results.reporting_unit_type
        );
        self.win.draw_text(
            &summary,
            Position::new(0.0, bounds.top - line * 1.5),
            24.0,
            text_color,
        );
        self.win.draw_text(
            "Press SPACE to continue, G to toggle the gaze cursor.",
            Position::new(0.0, bounds.bottom + line * 1.5),
            18.0,
            text_color,
        );

        if show_gaze {
            if let Some(g) = self.bus.last_gaze() {
                self.win.draw_gaze_cursor(g);
            }
        }
    }
}
