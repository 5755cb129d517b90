//! Structured sequence messages.
//!
//! The target renderer logs its own state transitions as one-line text
//! messages (`START_DRAW 0 -1.0000,-1.0000 0.0000,0.0000`, ...). The
//! correlator reads them back. Layouts are fixed by [`SCHEMA_V1`].

use crate::position::Position;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const SCHEMA_VERSION: u32 = 1;

/// `from` coordinates written for the first position of a sequence. On
/// decode only `index` decides whether a previous position exists, so a real
/// previous target at (-1, -1) survives.
pub const NO_PREVIOUS_POSITION: Position = Position::new(-1.0, -1.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    BeginSequence,
    DoneSequence,
    NextPosTrig,
    StartDraw,
    SyncTime,
    ExpandSize,
    ContractSize,
    PosUpdate,
    TargetPos,
}

impl MessageKind {
    pub fn token(self) -> &'static str {
        match self {
            MessageKind::BeginSequence => "BEGIN_SEQUENCE",
            MessageKind::DoneSequence => "DONE_SEQUENCE",
            MessageKind::NextPosTrig => "NEXT_POS_TRIG",
            MessageKind::StartDraw => "START_DRAW",
            MessageKind::SyncTime => "SYNCTIME",
            MessageKind::ExpandSize => "EXPAND_SIZE",
            MessageKind::ContractSize => "CONTRACT_SIZE",
            MessageKind::PosUpdate => "POS_UPDATE",
            MessageKind::TargetPos => "TARGET_POS",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        SCHEMA_V1
            .iter()
            .map(|s| s.kind)
            .find(|k| k.token() == token)
    }

    pub fn schema(self) -> &'static FieldSchema {
        // every kind has exactly one row
        &SCHEMA_V1[SCHEMA_V1
            .iter()
            .position(|s| s.kind == self)
            .unwrap_or_default()]
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
}

/// One row of the message layout table: which keyword, whether multi-value
/// fields are comma joined, and the flattened field types after the keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    pub kind: MessageKind,
    pub comma_joined: bool,
    pub fields: &'static [FieldType],
}

use FieldType::{Float, Int};

pub const SCHEMA_V1: [FieldSchema; 9] = [
    FieldSchema {
        kind: MessageKind::BeginSequence,
        comma_joined: false,
        fields: &[Int],
    },
    FieldSchema {
        kind: MessageKind::DoneSequence,
        comma_joined: false,
        fields: &[Int],
    },
    FieldSchema {
        kind: MessageKind::NextPosTrig,
        comma_joined: false,
        fields: &[Int, Float],
    },
    FieldSchema {
        kind: MessageKind::StartDraw,
        comma_joined: true,
        fields: &[Int, Float, Float, Float, Float],
    },
    FieldSchema {
        kind: MessageKind::SyncTime,
        comma_joined: true,
        fields: &[Int, Float, Float, Float, Float],
    },
    FieldSchema {
        kind: MessageKind::ExpandSize,
        comma_joined: false,
        fields: &[Float, Float],
    },
    FieldSchema {
        kind: MessageKind::ContractSize,
        comma_joined: false,
        fields: &[Float, Float],
    },
    FieldSchema {
        kind: MessageKind::PosUpdate,
        comma_joined: true,
        fields: &[Float, Float],
    },
    FieldSchema {
        kind: MessageKind::TargetPos,
        comma_joined: true,
        fields: &[Float, Float],
    },
];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MessageParseError {
    #[error("empty message")]
    Empty,
    #[error("unknown message keyword {0:?}")]
    UnknownKind(String),
    #[error("{kind} expects {expected} fields, found {found}")]
    FieldCount {
        kind: MessageKind,
        expected: usize,
        found: usize,
    },
    #[error("{kind} field {index} is not a valid number: {value:?}")]
    InvalidField {
        kind: MessageKind,
        index: usize,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequenceMessage {
    BeginSequence {
        count: usize,
    },
    DoneSequence {
        count: usize,
    },
    NextPosTrig {
        event_type_id: u8,
        event_time: f64,
    },
    StartDraw {
        index: usize,
        from: Option<Position>,
        to: Position,
    },
    SyncTime {
        index: usize,
        from: Option<Position>,
        to: Position,
    },
    ExpandSize {
        radius: f64,
        original: f64,
    },
    ContractSize {
        radius: f64,
        original: f64,
    },
    PosUpdate(Position),
    TargetPos(Position),
}

impl SequenceMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SequenceMessage::BeginSequence { .. } => MessageKind::BeginSequence,
            SequenceMessage::DoneSequence { .. } => MessageKind::DoneSequence,
            SequenceMessage::NextPosTrig { .. } => MessageKind::NextPosTrig,
            SequenceMessage::StartDraw { .. } => MessageKind::StartDraw,
            SequenceMessage::SyncTime { .. } => MessageKind::SyncTime,
            SequenceMessage::ExpandSize { .. } => MessageKind::ExpandSize,
            SequenceMessage::ContractSize { .. } => MessageKind::ContractSize,
            SequenceMessage::PosUpdate(_) => MessageKind::PosUpdate,
            SequenceMessage::TargetPos(_) => MessageKind::TargetPos,
        }
    }

    /// The target position a message establishes, if any.
    pub fn target_position(&self) -> Option<Position> {
        match self {
            SequenceMessage::StartDraw { to, .. } | SequenceMessage::SyncTime { to, .. } => {
                Some(*to)
            }
            SequenceMessage::PosUpdate(p) | SequenceMessage::TargetPos(p) => Some(*p),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn decode(text: &str) -> Result<Self, MessageParseError> {
        text.parse()
    }
}

fn write_pair(f: &mut fmt::Formatter<'_>, p: Position) -> fmt::Result {
    write!(f, "{:.4},{:.4}", p.x, p.y)
}

impl fmt::Display for SequenceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        match self {
            SequenceMessage::BeginSequence { count } | SequenceMessage::DoneSequence { count } => {
                write!(f, " {count}")
            }
            SequenceMessage::NextPosTrig {
                event_type_id,
                event_time,
            } => write!(f, " {event_type_id} {event_time:.3}"),
            SequenceMessage::StartDraw { index, from, to }
            | SequenceMessage::SyncTime { index, from, to } => {
                write!(f, " {index} ")?;
                write_pair(f, from.unwrap_or(NO_PREVIOUS_POSITION))?;
                f.write_str(" ")?;
                write_pair(f, *to)
            }
            SequenceMessage::ExpandSize { radius, original }
            | SequenceMessage::ContractSize { radius, original } => {
                write!(f, " {radius:.4} {original:.4}")
            }
            SequenceMessage::PosUpdate(p) | SequenceMessage::TargetPos(p) => {
                f.write_str(" ")?;
                write_pair(f, *p)
            }
        }
    }
}

enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    fn float(&self) -> f64 {
        match *self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
        }
    }

    fn int(&self) -> i64 {
        match *self {
            Value::Int(v) => v,
            Value::Float(v) => v as i64,
        }
    }
}

fn parse_fields(schema: &FieldSchema, rest: &[&str]) -> Result<Vec<Value>, MessageParseError> {
    let raw: Vec<&str> = if schema.comma_joined {
        rest.iter().flat_map(|t| t.split(',')).collect()
    } else {
        rest.to_vec()
    };
    if raw.len() != schema.fields.len() {
        return Err(MessageParseError::FieldCount {
            kind: schema.kind,
            expected: schema.fields.len(),
            found: raw.len(),
        });
    }
    raw.iter()
        .zip(schema.fields)
        .enumerate()
        .map(|(index, (value, ty))| {
            let invalid = || MessageParseError::InvalidField {
                kind: schema.kind,
                index,
                value: value.to_string(),
            };
            match ty {
                FieldType::Int => value.parse().map(Value::Int).map_err(|_| invalid()),
                FieldType::Float => value.parse().map(Value::Float).map_err(|_| invalid()),
            }
        })
        .collect()
}

impl FromStr for SequenceMessage {
    type Err = MessageParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let (&keyword, rest) = tokens.split_first().ok_or(MessageParseError::Empty)?;
        let kind = MessageKind::from_token(keyword)
            .ok_or_else(|| MessageParseError::UnknownKind(keyword.to_string()))?;
        let v = parse_fields(kind.schema(), rest)?;

        let msg = match kind {
            MessageKind::BeginSequence => SequenceMessage::BeginSequence {
                count: v[0].int().max(0) as usize,
            },
            MessageKind::DoneSequence => SequenceMessage::DoneSequence {
                count: v[0].int().max(0) as usize,
            },
            MessageKind::NextPosTrig => SequenceMessage::NextPosTrig {
                event_type_id: v[0].int().clamp(0, u8::MAX as i64) as u8,
                event_time: v[1].float(),
            },
            MessageKind::StartDraw | MessageKind::SyncTime => {
                let index = v[0].int().max(0) as usize;
                let from = (index > 0).then(|| Position::new(v[1].float(), v[2].float()));
                let to = Position::new(v[3].float(), v[4].float());
                if kind == MessageKind::StartDraw {
                    SequenceMessage::StartDraw { index, from, to }
                } else {
                    SequenceMessage::SyncTime { index, from, to }
                }
            }
            MessageKind::ExpandSize => SequenceMessage::ExpandSize {
                radius: v[0].float(),
                original: v[1].float(),
            },
            MessageKind::ContractSize => SequenceMessage::ContractSize {
                radius: v[0].float(),
                original: v[1].float(),
            },
            MessageKind::PosUpdate => {
                SequenceMessage::PosUpdate(Position::new(v[0].float(), v[1].float()))
            }
            MessageKind::TargetPos => {
                SequenceMessage::TargetPos(Position::new(v[0].float(), v[1].float()))
            }
        };
        Ok(msg)
    }
}
