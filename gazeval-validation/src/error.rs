use thiserror::Error;

/// Rejected construction parameters. Raised before any drawing or device
/// I/O happens.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("grid scale must be in (0, 1], got {0}")]
    Scale(f64),
    #[error("{side} margin {margin} exceeds half the window {dimension} ({half})")]
    Margin {
        side: &'static str,
        dimension: &'static str,
        margin: f64,
        half: f64,
    },
    #[error("grid needs an explicit position list, a shape, or a position count")]
    NoPositions,
    #[error("position list columns differ in length ({xs} x values, {ys} y values)")]
    ColumnLength { xs: usize, ys: usize },
    #[error("first position index {index} is out of range for {len} positions")]
    FirstPosIndex { index: usize, len: usize },
    #[error("unsupported positions preset {0:?}")]
    UnknownPreset(String),
    #[error("position noise standard deviation must be finite and >= 0, got {0}")]
    Noise(f64),
    #[error("unsupported trigger specification: {0}")]
    Trigger(String),
    #[error("accuracy period start ({start}) must be >= stop ({stop}) and both >= 0")]
    AccuracyWindow { start: f64, stop: f64 },
    #[error("invalid monitor geometry: {0}")]
    Monitor(String),
    #[error("unknown display unit {0:?}")]
    Unit(String),
    #[error("invalid animation option: {0}")]
    Animation(String),
    #[error("invalid simulated device setting: {0}")]
    Simulation(String),
}
