pub mod accuracy;
pub mod config;
pub mod correlate;
pub mod device;
pub mod display;
pub mod error;
pub mod grid;
pub mod procedure;
pub mod renderer;
pub mod results;
pub mod sim;
pub mod trigger;
pub mod units;

pub use accuracy::{AccuracyReducer, AccuracySummary};
pub use config::{AnimationOptions, GridConfig, PositionsConfig, TriggerConfig, ValidationConfig};
pub use correlate::{CorrelatedSample, TimedMessage};
pub use device::{EventBus, EventSource, MessageSink};
pub use display::{Display, Rgba, TargetStim};
pub use error::ConfigError;
pub use grid::{GridBuilder, GridPreset, Margins, PositionGrid};
pub use procedure::ValidationProcedure;
pub use renderer::{TargetPositionRecord, TargetRenderer};
pub use results::{CalculationStatus, ErrorStats, PositionResult, ValidationResults};
pub use trigger::{
    Condition, Delay, DeviceEventTrigger, KeyboardTrigger, TimeTrigger, Trigger, TriggerContext,
    TriggerSpec, triggers_from,
};
pub use units::{MonitorGeometry, UnitConverter, Units};
