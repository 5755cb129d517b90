pub mod event;
pub mod message;
pub mod position;
pub mod state;

pub use event::{
    AttrValue, DeviceEvent, DeviceId, EventType, EyePoint, EyeSample, Gaze, KeyEdge,
    KeyboardEvent, MessageEvent, TIME_TRIGGER_EVENT_ID,
};
pub use message::{FieldSchema, FieldType, MessageKind, MessageParseError, SequenceMessage};
pub use position::{Bounds, Position};
pub use state::{Motion, Resize, TargetState};
