use crate::position::Position;
use serde::{Deserialize, Serialize};

/// Event type id reported for triggers that fire on elapsed time rather
/// than on a device event.
pub const TIME_TRIGGER_EVENT_ID: u8 = 255;

/// Identity of an event-producing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceId {
    Keyboard,
    Mouse,
    Tracker,
    Experiment,
}

impl DeviceId {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceId::Keyboard => "keyboard",
            DeviceId::Mouse => "mouse",
            DeviceId::Tracker => "tracker",
            DeviceId::Experiment => "experiment",
        }
    }
}

/// Numeric event type ids, matching the ids the server process assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    KeyboardPress = 22,
    KeyboardRelease = 23,
    MonocularEyeSample = 51,
    BinocularEyeSample = 52,
    Message = 151,
}

impl EventType {
    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            22 => Some(EventType::KeyboardPress),
            23 => Some(EventType::KeyboardRelease),
            51 => Some(EventType::MonocularEyeSample),
            52 => Some(EventType::BinocularEyeSample),
            151 => Some(EventType::Message),
            _ => None,
        }
    }

    pub fn is_sample(self) -> bool {
        matches!(
            self,
            EventType::MonocularEyeSample | EventType::BinocularEyeSample
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyEdge {
    Press,
    Release,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardEvent {
    pub time: f64,
    pub edge: KeyEdge,
    /// Lower-case key name, e.g. `"space"`, `"escape"`, `"g"`.
    pub key: String,
}

impl KeyboardEvent {
    pub fn press(time: f64, key: impl Into<String>) -> Self {
        Self {
            time,
            edge: KeyEdge::Press,
            key: key.into(),
        }
    }

    pub fn release(time: f64, key: impl Into<String>) -> Self {
        Self {
            time,
            edge: KeyEdge::Release,
            key: key.into(),
        }
    }
}

/// Gaze position and pupil size reported for one eye.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EyePoint {
    pub x: f64,
    pub y: f64,
    pub pupil_size: f64,
}

impl EyePoint {
    pub const fn new(x: f64, y: f64, pupil_size: f64) -> Self {
        Self { x, y, pupil_size }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gaze {
    Monocular(EyePoint),
    Binocular { left: EyePoint, right: EyePoint },
}

impl Gaze {
    /// Single gaze point; binocular samples average both eyes.
    pub fn average(&self) -> Position {
        match self {
            Gaze::Monocular(eye) => eye.position(),
            Gaze::Binocular { left, right } => {
                Position::new((left.x + right.x) / 2.0, (left.y + right.y) / 2.0)
            }
        }
    }

    pub fn is_binocular(&self) -> bool {
        matches!(self, Gaze::Binocular { .. })
    }

    /// Applies `f` to every eye position, keeping pupil sizes.
    pub fn map_positions(&self, mut f: impl FnMut(Position) -> Position) -> Gaze {
        let conv = |eye: &EyePoint, f: &mut dyn FnMut(Position) -> Position| {
            let p = f(eye.position());
            EyePoint::new(p.x, p.y, eye.pupil_size)
        };
        match self {
            Gaze::Monocular(eye) => Gaze::Monocular(conv(eye, &mut f)),
            Gaze::Binocular { left, right } => Gaze::Binocular {
                left: conv(left, &mut f),
                right: conv(right, &mut f),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeSample {
    pub time: f64,
    /// Device status flags; 0 means the sample carries usable gaze data.
    pub status: i32,
    pub gaze: Gaze,
}

impl EyeSample {
    pub fn is_valid(&self) -> bool {
        self.status == 0
    }

    pub fn event_type(&self) -> EventType {
        if self.gaze.is_binocular() {
            EventType::BinocularEyeSample
        } else {
            EventType::MonocularEyeSample
        }
    }
}

/// A free-text, timestamped experiment message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub time: f64,
    pub category: String,
    pub text: String,
}

/// Attribute value used when matching events against trigger conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

/// Raw event as delivered by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    Keyboard(KeyboardEvent),
    Sample(EyeSample),
    Message(MessageEvent),
}

impl DeviceEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            DeviceEvent::Keyboard(k) => match k.edge {
                KeyEdge::Press => EventType::KeyboardPress,
                KeyEdge::Release => EventType::KeyboardRelease,
            },
            DeviceEvent::Sample(s) => s.event_type(),
            DeviceEvent::Message(_) => EventType::Message,
        }
    }

    pub fn time(&self) -> f64 {
        match self {
            DeviceEvent::Keyboard(k) => k.time,
            DeviceEvent::Sample(s) => s.time,
            DeviceEvent::Message(m) => m.time,
        }
    }

    pub fn device(&self) -> DeviceId {
        match self {
            DeviceEvent::Keyboard(_) => DeviceId::Keyboard,
            DeviceEvent::Sample(_) => DeviceId::Tracker,
            DeviceEvent::Message(_) => DeviceId::Experiment,
        }
    }

    /// Looks up a named attribute for condition matching.
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        match (self, name) {
            (_, "time") => Some(AttrValue::Float(self.time())),
            (_, "type") => Some(AttrValue::Int(self.event_type().id() as i64)),
            (DeviceEvent::Keyboard(k), "key") => Some(AttrValue::Text(k.key.clone())),
            (DeviceEvent::Sample(s), "status") => Some(AttrValue::Int(s.status as i64)),
            (DeviceEvent::Sample(s), "gaze_x") => Some(AttrValue::Float(s.gaze.average().x)),
            (DeviceEvent::Sample(s), "gaze_y") => Some(AttrValue::Float(s.gaze.average().y)),
            (DeviceEvent::Message(m), "text") => Some(AttrValue::Text(m.text.clone())),
            (DeviceEvent::Message(m), "category") => Some(AttrValue::Text(m.category.clone())),
            _ => None,
        }
    }

    pub fn as_keyboard(&self) -> Option<&KeyboardEvent> {
        match self {
            DeviceEvent::Keyboard(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_sample(&self) -> Option<&EyeSample> {
        match self {
            DeviceEvent::Sample(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            DeviceEvent::Message(m) => Some(m),
            _ => None,
        }
    }
}
