//! Joins recorded gaze samples with the target state that was on screen
//! when each sample was taken.

use crate::renderer::TargetPositionRecord;
use gazeval_core::message::NO_PREVIOUS_POSITION;
use gazeval_core::{
    DeviceEvent, DeviceId, EyeSample, Gaze, MessageKind, Position, SequenceMessage, TargetState,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A decoded sequence message with its log time.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedMessage {
    pub time: f64,
    pub category: String,
    pub msg: SequenceMessage,
}

/// One gaze sample joined with the message bracket it fell in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedSample {
    pub position_index: usize,
    /// Index of the (last, next) message pair within the position's list.
    pub bracket_index: usize,
    pub last_msg_time: f64,
    pub last_msg_kind: MessageKind,
    pub next_msg_time: f64,
    pub next_msg_kind: MessageKind,
    pub target: Position,
    pub state: TargetState,
    pub time: f64,
    pub status: i32,
    pub gaze: Gaze,
}

impl CorrelatedSample {
    pub fn is_valid(&self) -> bool {
        self.status == 0
    }

    /// Applies `f` to the target and every eye position.
    pub fn map_positions(&self, mut f: impl FnMut(Position) -> Position) -> Self {
        Self {
            target: f(self.target),
            gaze: self.gaze.map_positions(&mut f),
            ..*self
        }
    }
}

/// Target position and state rebuilt from the message stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetTracker {
    pub target: Position,
    pub state: TargetState,
}

impl Default for TargetTracker {
    fn default() -> Self {
        Self {
            target: NO_PREVIOUS_POSITION,
            state: TargetState::UNKNOWN,
        }
    }
}

impl TargetTracker {
    pub fn apply(&mut self, msg: &SequenceMessage) {
        match msg {
            SequenceMessage::StartDraw { .. } => self.state = self.state.settle(),
            SequenceMessage::SyncTime { to, .. } => {
                self.state = self.state.settle();
                self.target = *to;
            }
            SequenceMessage::PosUpdate(p) => {
                self.state = self.state.start_moving();
                self.target = *p;
            }
            SequenceMessage::TargetPos(p) => {
                self.state = self.state.arrive();
                self.target = *p;
            }
            SequenceMessage::ExpandSize { .. } => self.state = self.state.expanding(),
            SequenceMessage::ContractSize { .. } => self.state = self.state.contracting(),
            SequenceMessage::BeginSequence { .. }
            | SequenceMessage::DoneSequence { .. }
            | SequenceMessage::NextPosTrig { .. } => {}
        }
    }
}

/// Decodes the sequence messages among `events`, in time order. Messages
/// that are not sequence messages are skipped.
pub fn parse_messages(events: &[DeviceEvent]) -> Vec<TimedMessage> {
    let mut out: Vec<TimedMessage> = events
        .iter()
        .filter_map(DeviceEvent::as_message)
        .filter_map(|m| match SequenceMessage::decode(&m.text) {
            Ok(msg) => Some(TimedMessage {
                time: m.time,
                category: m.category.clone(),
                msg,
            }),
            Err(e) => {
                trace!(text = %m.text, error = %e, "skipping message");
                None
            }
        })
        .collect();
    out.sort_by(|a, b| a.time.total_cmp(&b.time));
    out
}

/// Gaze samples among `events`, in time order.
pub fn samples(events: &[DeviceEvent]) -> Vec<EyeSample> {
    let mut out: Vec<EyeSample> = events.iter().filter_map(DeviceEvent::as_sample).copied().collect();
    out.sort_by(|a, b| a.time.total_cmp(&b.time));
    out
}

/// Per-position message lists. A list that opens with a `NEXT_POS_TRIG`
/// gets that message moved to the end of the previous list.
pub fn message_lists(records: &[TargetPositionRecord]) -> Vec<Vec<TimedMessage>> {
    let mut lists: Vec<Vec<TimedMessage>> = records
        .iter()
        .map(|r| parse_messages(r.device_events(DeviceId::Experiment)))
        .collect();
    for i in 1..lists.len() {
        let late = lists[i]
            .first()
            .is_some_and(|m| m.msg.kind() == MessageKind::NextPosTrig);
        if late {
            let msg = lists[i].remove(0);
            trace!(position = i, "moving late NEXT_POS_TRIG back");
            lists[i - 1].push(msg);
        }
    }
    lists
}

/// Assigns every sample in `[last.time, next.time)` of some consecutive
/// message pair to that pair. Samples outside all pairs are dropped. The
/// tracker carries target state over from earlier positions.
pub fn correlate_position(
    position_index: usize,
    messages: &[TimedMessage],
    samples: &[EyeSample],
    tracker: &mut TargetTracker,
) -> Vec<CorrelatedSample> {
    let mut out = Vec::with_capacity(samples.len());
    let mut cursor = 0;
    for (bracket_index, pair) in messages.windows(2).enumerate() {
        let (last, next) = (&pair[0], &pair[1]);
        tracker.apply(&last.msg);
        while cursor < samples.len() && samples[cursor].time < last.time {
            cursor += 1;
        }
        while cursor < samples.len() && samples[cursor].time < next.time {
            let s = &samples[cursor];
            out.push(CorrelatedSample {
                position_index,
                bracket_index,
                last_msg_time: last.time,
                last_msg_kind: last.msg.kind(),
                next_msg_time: next.time,
                next_msg_kind: next.msg.kind(),
                target: tracker.target,
                state: tracker.state,
                time: s.time,
                status: s.status,
                gaze: s.gaze,
            });
            cursor += 1;
        }
    }
    if let Some(last) = messages.last() {
        tracker.apply(&last.msg);
    }
    out
}

/// Correlates every position of a `display` run.
pub fn correlate(records: &[TargetPositionRecord]) -> Vec<Vec<CorrelatedSample>> {
    let lists = message_lists(records);
    let mut tracker = TargetTracker::default();
    records
        .iter()
        .zip(&lists)
        .enumerate()
        .map(|(i, (record, messages))| {
            let s = samples(record.device_events(DeviceId::Tracker));
            correlate_position(i, messages, &s, &mut tracker)
        })
        .collect()
}
