pub mod timer;

pub use timer::{FrameStats, HighPrecisionTimer, ManualTimer, SharedTimer, Timer, TimingStats};
