use crate::display::{Rgba, TargetStim};
use crate::error::ConfigError;
use crate::grid::{GridBuilder, GridPreset, Margins, PositionGrid};
use crate::trigger::TriggerSpec;
use crate::units::MonitorGeometry;
use gazeval_core::{Bounds, Position};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Target motion and resize settings for one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationOptions {
    /// Glide between positions instead of jumping.
    pub enable: bool,
    /// Seconds spent moving (or blank) between positions.
    pub target_delay: f64,
    /// Seconds spent expanding and contracting at each position.
    pub target_duration: f64,
    /// Radius multiplier for the expand phase; ignored unless > 1.
    pub expand_scale: Option<f64>,
    pub contract_target: bool,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            enable: true,
            target_delay: 1.0,
            target_duration: 1.0,
            expand_scale: None,
            contract_target: true,
        }
    }
}

impl AnimationOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("target_delay", self.target_delay),
            ("target_duration", self.target_duration),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::Animation(format!("{name} must be >= 0, got {v}")));
            }
        }
        if let Some(s) = self.expand_scale {
            if !s.is_finite() || s <= 0.0 {
                return Err(ConfigError::Animation(format!(
                    "expand_scale must be > 0, got {s}"
                )));
            }
        }
        Ok(())
    }

    fn expands(&self) -> bool {
        self.expand_scale.is_some_and(|s| s > 1.0)
    }

    /// (expand, contract) phase durations. Both configured split the target
    /// duration in half.
    pub fn phase_durations(&self) -> (Option<f64>, Option<f64>) {
        let d = self.target_duration;
        let (expand, contract) = match (self.expands(), self.contract_target) {
            (true, true) => (Some(d / 2.0), Some(d / 2.0)),
            (false, true) => (None, Some(d)),
            (true, false) => (Some(d), None),
            (false, false) => (None, None),
        };
        let nonzero = |v: Option<f64>| v.filter(|d| *d > 0.0);
        (nonzero(expand), nonzero(contract))
    }
}

/// Auto-generated grid options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// (columns, rows).
    pub shape: Option<[usize; 2]>,
    pub pos_count: Option<usize>,
    pub margins: Margins,
    pub scale: [f64; 2],
    pub first_pos_index: usize,
    pub repeat_first_pos: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            shape: Some([3, 3]),
            pos_count: None,
            margins: Margins::default(),
            scale: [0.85, 0.85],
            first_pos_index: 4,
            repeat_first_pos: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PositionsConfig {
    /// `THREE_POINTS`, `FIVE_POINTS`, `NINE_POINTS`, `THIRTEEN_POINTS` or
    /// `SEVENTEEN_POINTS`.
    Preset(String),
    Pairs(Vec<[f64; 2]>),
    Columns { x: Vec<f64>, y: Vec<f64> },
    Grid(GridConfig),
}

impl Default for PositionsConfig {
    fn default() -> Self {
        PositionsConfig::Preset(GridPreset::NinePoints.name().to_string())
    }
}

impl PositionsConfig {
    pub fn build(
        &self,
        bounds: Bounds,
        noise_std: Option<[f64; 2]>,
        seed: Option<u64>,
    ) -> Result<PositionGrid, ConfigError> {
        let mut builder = GridBuilder::new(bounds);
        builder = match self {
            PositionsConfig::Preset(name) => {
                let preset: GridPreset = name.parse()?;
                builder.positions(preset.positions(bounds)?)
            }
            PositionsConfig::Pairs(pairs) => {
                builder.positions(pairs.iter().map(|[x, y]| Position::new(*x, *y)))
            }
            PositionsConfig::Columns { x, y } => builder.columns(x.clone(), y.clone()),
            PositionsConfig::Grid(g) => {
                let mut b = builder
                    .margins(g.margins)
                    .scale_xy(g.scale[0], g.scale[1])
                    .first_pos_index(g.first_pos_index)
                    .repeat_first_pos(g.repeat_first_pos);
                if let Some([cols, rows]) = g.shape {
                    b = b.shape(cols, rows);
                }
                if let Some(n) = g.pos_count {
                    b = b.pos_count(n);
                }
                b
            }
        };
        if let Some([h, v]) = noise_std {
            builder = builder.noise_std_xy(h, v);
        }
        if let Some(seed) = seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }
}

/// Trigger shorthand as it appears in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerConfig {
    Delay(f64),
    Key(String),
    Keys(Vec<String>),
    Unsupported(serde_json::Value),
}

impl TryFrom<TriggerConfig> for TriggerSpec {
    type Error = ConfigError;

    fn try_from(cfg: TriggerConfig) -> Result<Self, Self::Error> {
        match cfg {
            TriggerConfig::Delay(d) => Ok(TriggerSpec::Delay(d)),
            TriggerConfig::Key(k) => Ok(TriggerSpec::Key(k)),
            TriggerConfig::Keys(k) => Ok(TriggerSpec::Keys(k)),
            TriggerConfig::Unsupported(v) => Err(ConfigError::Trigger(v.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub positions: PositionsConfig,
    pub randomize_positions: bool,
    /// Per-axis jitter standard deviation in display units.
    pub position_noise_std: Option<[f64; 2]>,
    /// Seed for shuffling and jitter; random when unset.
    pub seed: Option<u64>,
    pub target: TargetStim,
    pub animation: AnimationOptions,
    pub accuracy_period_start: f64,
    pub accuracy_period_stop: f64,
    /// Positions whose good-sample share (in whole percent) falls below
    /// this fail.
    pub min_valid_sample_percent: f64,
    /// Keys that advance the target, on press. Empty falls back to a time
    /// trigger of `animation.target_duration`.
    pub progress_on_key: Vec<String>,
    /// Overrides `progress_on_key` when set.
    pub triggers: Option<TriggerConfig>,
    pub terminate_key: String,
    pub gaze_cursor_key: String,
    pub gaze_cursor_color: Rgba,
    pub text_color: Rgba,
    pub show_intro_screen: bool,
    pub intro_text: String,
    pub show_results_screen: bool,
    pub save_results_screen: Option<PathBuf>,
    pub results_in_degrees: bool,
    pub message_category: String,
    pub monitor: MonitorGeometry,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            positions: PositionsConfig::default(),
            randomize_positions: true,
            position_noise_std: None,
            seed: None,
            target: TargetStim::default(),
            animation: AnimationOptions::default(),
            accuracy_period_start: 0.55,
            accuracy_period_stop: 0.15,
            min_valid_sample_percent: 1.0,
            progress_on_key: vec!["space".to_string()],
            triggers: None,
            terminate_key: "escape".to_string(),
            gaze_cursor_key: "g".to_string(),
            gaze_cursor_color: [0, 255, 0, 200],
            text_color: [255, 255, 255, 255],
            show_intro_screen: false,
            intro_text: "Ready to Start Validation Procedure.".to_string(),
            show_results_screen: true,
            save_results_screen: None,
            results_in_degrees: false,
            message_category: String::new(),
            monitor: MonitorGeometry::default(),
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (start, stop) = (self.accuracy_period_start, self.accuracy_period_stop);
        if !(start.is_finite() && stop.is_finite() && stop >= 0.0 && start >= stop) {
            return Err(ConfigError::AccuracyWindow { start, stop });
        }
        self.animation.validate()?;
        self.monitor.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_split() {
        let mut a = AnimationOptions {
            target_duration: 2.0,
            ..AnimationOptions::default()
        };
        assert_eq!(a.phase_durations(), (None, Some(2.0)));
        a.expand_scale = Some(3.0);
        assert_eq!(a.phase_durations(), (Some(1.0), Some(1.0)));
        a.contract_target = false;
        assert_eq!(a.phase_durations(), (Some(2.0), None));
        a.expand_scale = Some(0.5);
        assert_eq!(a.phase_durations(), (None, None));
    }

    #[test]
    fn parses_partial_json() {
        let cfg: ValidationConfig = serde_json::from_str(
            r#"{
                "positions": [[0, 0], [100, 0], [100, 100]],
                "triggers": 1.5,
                "animation": { "expand_scale": 2.0 },
                "accuracy_period_start": 0.4
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.positions, PositionsConfig::Pairs(vec![[0.0, 0.0], [100.0, 0.0], [100.0, 100.0]]));
        assert_eq!(cfg.triggers, Some(TriggerConfig::Delay(1.5)));
        assert!(cfg.animation.contract_target);
        assert_eq!(cfg.accuracy_period_stop, 0.15);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn positions_forms() {
        let b = Bounds::centered(1000.0, 800.0);
        let preset: PositionsConfig = serde_json::from_str(r#""FIVE_POINTS""#).unwrap();
        assert_eq!(preset.build(b, None, None).unwrap().len(), 5);

        let cols: PositionsConfig =
            serde_json::from_str(r#"{ "x": [1, 2, 3], "y": [4, 5, 6] }"#).unwrap();
        assert_eq!(cols.build(b, None, None).unwrap().len(), 3);

        let grid: PositionsConfig =
            serde_json::from_str(r#"{ "shape": [4, 2], "scale": [1, 1], "first_pos_index": 0 }"#)
                .unwrap();
        assert_eq!(grid.build(b, None, Some(1)).unwrap().len(), 8);

        let bad = PositionsConfig::Preset("TWO_POINTS".into());
        assert_eq!(
            bad.build(b, None, None).err(),
            Some(ConfigError::UnknownPreset("TWO_POINTS".into()))
        );
    }

    #[test]
    fn unsupported_trigger_shape() {
        let cfg: TriggerConfig = serde_json::from_str(r#"{ "after": 3 }"#).unwrap();
        assert!(matches!(
            TriggerSpec::try_from(cfg),
            Err(ConfigError::Trigger(_))
        ));
        let keys: TriggerConfig = serde_json::from_str(r#"["space", "return"]"#).unwrap();
        assert!(matches!(TriggerSpec::try_from(keys), Ok(TriggerSpec::Keys(k)) if k.len() == 2));
    }

    #[test]
    fn accuracy_window_checked() {
        let cfg = ValidationConfig {
            accuracy_period_start: 0.1,
            accuracy_period_stop: 0.2,
            ..ValidationConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::AccuracyWindow {
                start: 0.1,
                stop: 0.2
            })
        );
    }
}
