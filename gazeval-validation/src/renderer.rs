//! Target presentation.
//!
//! [`TargetRenderer::display`] walks the position grid. At every position it
//! animates the target into place, logs a structured message for each state
//! change, waits for a trigger and stores every device event seen in the
//! meantime in a per-position [`TargetPositionRecord`].

use crate::config::AnimationOptions;
use crate::correlate::{self, CorrelatedSample};
use crate::device::EventBus;
use crate::display::{Display, TargetStim};
use crate::grid::PositionGrid;
use crate::trigger::{Trigger, TriggerContext, first_fired};
use gazeval_core::{DeviceEvent, DeviceId, Position, SequenceMessage};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const PUMP_INTERVAL: f64 = 0.250;
const SETTLE: Duration = Duration::from_millis(25);

pub const TERMINATED_MESSAGE: &str = "VALIDATION TERMINATED BY USER";

/// Events observed while the target was at one position.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPositionRecord {
    pub from: Option<Position>,
    pub to: Position,
    pub events: BTreeMap<DeviceId, Vec<DeviceEvent>>,
}

impl TargetPositionRecord {
    pub fn device_events(&self, id: DeviceId) -> &[DeviceEvent] {
        self.events.get(&id).map_or(&[], Vec::as_slice)
    }
}

/// `60 (t^5/10 - t^4/4 + t^3/6)`: slow start and stop, 0 at 0 and 1 at 1.
pub fn s_curve(t: f64) -> f64 {
    60.0 * (t.powi(5) / 10.0 - t.powi(4) / 4.0 + t.powi(3) / 6.0)
}

pub struct TargetRenderer {
    target: TargetStim,
    positions: PositionGrid,
    triggers: Vec<Box<dyn Trigger>>,
    bus: EventBus,
    store_events_for: Vec<DeviceId>,
    category: String,
    terminate_key: Option<String>,
    gaze_cursor_key: Option<String>,
    display_gaze: bool,
    terminate_requested: bool,
    target_data: Vec<TargetPositionRecord>,
}

impl TargetRenderer {
    /// Stores events for the keyboard, tracker and experiment stream by
    /// default, whichever the bus has.
    pub fn new(
        target: TargetStim,
        positions: PositionGrid,
        triggers: Vec<Box<dyn Trigger>>,
        bus: &EventBus,
    ) -> Self {
        let store_events_for = [DeviceId::Keyboard, DeviceId::Tracker, DeviceId::Experiment]
            .into_iter()
            .filter(|d| bus.has_device(*d))
            .collect();
        Self {
            target,
            positions,
            triggers,
            bus: bus.clone(),
            store_events_for,
            category: String::new(),
            terminate_key: Some("escape".to_string()),
            gaze_cursor_key: Some("g".to_string()),
            display_gaze: false,
            terminate_requested: false,
            target_data: Vec::new(),
        }
    }

    pub fn with_store_events_for(mut self, devices: Vec<DeviceId>) -> Self {
        self.store_events_for = devices;
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_terminate_key(mut self, key: Option<&str>) -> Self {
        self.terminate_key = key.map(str::to_string);
        self
    }

    pub fn with_gaze_cursor_key(mut self, key: Option<&str>) -> Self {
        self.gaze_cursor_key = key.map(str::to_string);
        self
    }

    pub fn target(&self) -> &TargetStim {
        &self.target
    }

    pub fn positions(&self) -> &PositionGrid {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut PositionGrid {
        &mut self.positions
    }

    pub fn target_data(&self) -> &[TargetPositionRecord] {
        &self.target_data
    }

    pub fn display_gaze(&self) -> bool {
        self.display_gaze
    }

    pub fn set_display_gaze(&mut self, on: bool) {
        self.display_gaze = on;
    }

    pub fn gaze_cursor_key(&self) -> Option<&str> {
        self.gaze_cursor_key.as_deref()
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate_requested
    }

    /// Presents the target at every grid position. Returns `false` if the
    /// terminate key ended the sequence early; the partial records are kept
    /// but should not be analysed.
    pub fn display<D: Display + ?Sized>(&mut self, win: &mut D, opts: &AnimationOptions) -> bool {
        self.target_data.clear();
        self.terminate_requested = false;
        self.positions.reset();

        let count = self.positions.base_positions().len();
        self.bus.clear_all();
        self.send(&SequenceMessage::BeginSequence { count }, None);
        info!(count, "target sequence started");

        let mut turn_rec_off = Vec::new();
        for d in &self.store_events_for {
            if !self.bus.is_reporting(*d) {
                self.bus.enable_reporting(*d, true);
                turn_rec_off.push(*d);
            }
        }

        let timer = self.bus.timer();
        timer.sleep(SETTLE);

        let initial_radius = self.target.radius;
        let mut prev = None;
        let mut index = 0;
        while let Some(pos) = self.positions.next() {
            self.target_data.push(TargetPositionRecord {
                from: prev,
                to: pos,
                events: self
                    .store_events_for
                    .iter()
                    .map(|d| (*d, Vec::new()))
                    .collect(),
            });
            self.add_device_events(win);
            if self.terminate_requested {
                break;
            }
            self.target.radius = initial_radius;
            self.move_to(win, index, pos, prev, opts);
            prev = Some(pos);
            self.add_device_events(win);
            if self.terminate_requested {
                break;
            }
            index += 1;
        }
        self.positions.reset();
        self.target.radius = initial_radius;
        for d in turn_rec_off {
            self.bus.enable_reporting(d, false);
        }

        if self.terminate_requested {
            warn!(completed = index, "target sequence terminated by user");
            self.bus.send_message(TERMINATED_MESSAGE, &self.category, None);
            return false;
        }

        self.send(&SequenceMessage::DoneSequence { count }, None);
        timer.sleep(SETTLE);
        self.add_device_events(win);
        self.bus.clear_all();
        info!(count, "target sequence done");
        true
    }

    /// Moves the target from `from` to `to`, settles it and blocks until a
    /// trigger fires or the terminate key is seen.
    pub fn move_to<D: Display + ?Sized>(
        &mut self,
        win: &mut D,
        index: usize,
        to: Position,
        from: Option<Position>,
        opts: &AnimationOptions,
    ) {
        self.send(&SequenceMessage::StartDraw { index, from, to }, None);

        let Some(flip_time) = self.animate_target(win, to, from, opts) else {
            return;
        };
        self.send(&SequenceMessage::SyncTime { index, from, to }, Some(flip_time));
        debug!(index, x = to.x, y = to.y, "target settled");
        // presses made while the target was still moving must not end the dwell
        for d in self.triggers.iter().filter_map(|t| t.device()) {
            self.bus.open_trigger_window(d, flip_time);
        }

        let timer = self.bus.timer();
        let mut last_pump = flip_time;
        while !self.has_trigger_fired(win, flip_time) {
            let now = timer.now();
            if now - last_pump >= PUMP_INTERVAL {
                win.pump_events();
                last_pump = now;
            }
            if self.display_gaze {
                self.draw(win);
                win.flip();
            } else {
                timer.sleep(POLL_INTERVAL);
            }
            if self.check_for_terminate() {
                return;
            }
            self.check_for_toggle_gaze(win);
        }
    }

    /// Joined sample/state data for the last `display` run, one list per
    /// position.
    pub fn get_sample_message_data(&self) -> Vec<Vec<CorrelatedSample>> {
        correlate::correlate(&self.target_data)
    }

    fn send(&self, msg: &SequenceMessage, time: Option<f64>) -> f64 {
        self.bus.send_message(&msg.encode(), &self.category, time)
    }

    fn draw<D: Display + ?Sized>(&mut self, win: &mut D) {
        win.draw_target(&self.target);
        if self.display_gaze {
            if let Some(gaze) = self.bus.last_gaze() {
                win.draw_gaze_cursor(gaze);
            }
        }
    }

    fn animate_target<D: Display + ?Sized>(
        &mut self,
        win: &mut D,
        to: Position,
        from: Option<Position>,
        opts: &AnimationOptions,
    ) -> Option<f64> {
        let timer = self.bus.timer();
        let delay = opts.target_delay;

        if let Some(from) = from {
            if opts.enable {
                let start = timer.now();
                while timer.now() - start <= delay {
                    let t = if delay > 0.0 {
                        ((timer.now() - start) / delay).clamp(0.0, 1.0)
                    } else {
                        1.0
                    };
                    let p = from.lerp(to, s_curve(t));
                    self.target.pos = p;
                    self.draw(win);
                    let flip_time = win.flip();
                    self.send(&SequenceMessage::PosUpdate(p), Some(flip_time));
                    self.add_device_events(win);
                    if self.terminate_requested {
                        return None;
                    }
                }
            } else {
                let flip_time = win.flip();
                while timer.now() < flip_time + delay {
                    self.add_device_events(win);
                    if self.terminate_requested {
                        return None;
                    }
                    timer.sleep(POLL_INTERVAL);
                }
            }
        }

        self.target.pos = to;
        self.draw(win);
        let mut flip_time = win.flip();
        self.send(&SequenceMessage::TargetPos(to), Some(flip_time));
        self.add_device_events(win);

        let initial_radius = self.target.radius;
        let (expand, contract) = opts.phase_durations();

        if let Some(duration) = expand {
            let expanded = initial_radius * opts.expand_scale.unwrap_or(1.0);
            let start = timer.now();
            let end = flip_time + duration;
            while flip_time < end {
                let mu = ((flip_time - start) / duration).clamp(0.0, 1.0);
                let radius = initial_radius * (1.0 - mu) + expanded * mu;
                self.target.radius = radius;
                self.draw(win);
                flip_time = win.flip();
                self.send(
                    &SequenceMessage::ExpandSize {
                        radius,
                        original: initial_radius,
                    },
                    Some(flip_time),
                );
                self.add_device_events(win);
                if self.terminate_requested {
                    return None;
                }
            }
        }

        if let Some(duration) = contract {
            let start = timer.now();
            let end = flip_time + duration;
            let start_radius = self.target.radius;
            let stop_radius = self.target.inner_radius();
            while flip_time < end {
                let mu = ((flip_time - start) / duration).clamp(0.0, 1.0);
                let radius = start_radius * (1.0 - mu) + stop_radius * mu;
                self.target.radius = radius;
                self.draw(win);
                flip_time = win.flip();
                self.send(
                    &SequenceMessage::ContractSize {
                        radius,
                        original: initial_radius,
                    },
                    Some(flip_time),
                );
                self.add_device_events(win);
                if self.terminate_requested {
                    return None;
                }
            }
        }
        Some(flip_time)
    }

    fn has_trigger_fired<D: Display + ?Sized>(&mut self, win: &mut D, start_time: f64) -> bool {
        let ctx = TriggerContext {
            now: self.bus.now(),
            start_time: Some(start_time),
        };
        let fired = first_fired(&mut self.triggers, &ctx);

        // trigger devices that are not stored still need their queue drained
        for d in self.triggers.iter().filter_map(|t| t.device()) {
            if !self.store_events_for.contains(&d) {
                self.bus.drain(d);
            }
        }
        self.add_device_events(win);

        let Some(i) = fired else {
            return false;
        };
        let trig = &self.triggers[i];
        let event_type_id = trig.event_type_id();
        let event_time = trig.triggering_time().unwrap_or(ctx.now);
        self.send(
            &SequenceMessage::NextPosTrig {
                event_type_id,
                event_time,
            },
            None,
        );
        debug!(trigger = i, event_type_id, event_time, "next position triggered");
        for t in self.triggers.iter_mut() {
            t.reset_trigger();
        }
        // NEXT_POS_TRIG belongs to the position it ends
        self.add_device_events(win);
        true
    }

    fn add_device_events<D: Display + ?Sized>(&mut self, win: &mut D) {
        if self.check_for_terminate() {
            return;
        }
        self.check_for_toggle_gaze(win);
        let Some(record) = self.target_data.last_mut() else {
            return;
        };
        for d in &self.store_events_for {
            let events = self.bus.drain(*d);
            record.events.entry(*d).or_default().extend(events);
        }
    }

    fn check_for_terminate(&mut self) -> bool {
        if !self.terminate_requested {
            if let Some(key) = &self.terminate_key {
                self.terminate_requested = self.bus.key_pressed(key);
            }
        }
        self.terminate_requested
    }

    fn check_for_toggle_gaze<D: Display + ?Sized>(&mut self, win: &mut D) -> bool {
        let toggled = self
            .gaze_cursor_key
            .as_deref()
            .is_some_and(|key| self.bus.take_key_press(key));
        if toggled {
            self.display_gaze = !self.display_gaze;
            debug!(on = self.display_gaze, "gaze cursor toggled");
            self.draw(win);
            win.flip();
        }
        self.display_gaze
    }
}
