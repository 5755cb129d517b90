//! Device collaborators and the event bus shared by triggers and the
//! target renderer.

use gazeval_core::{DeviceEvent, DeviceId, KeyEdge, MessageEvent, Position};
use gazeval_timing::SharedTimer;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::debug;

/// A device that buffers events between polls. `get_events` must never
/// block.
pub trait EventSource {
    fn get_events(&mut self) -> Vec<DeviceEvent>;
    fn clear_events(&mut self);
    fn enable_event_reporting(&mut self, enabled: bool);
    fn is_reporting_events(&self) -> bool;
}

/// Receives every experiment message as it is sent, e.g. to forward it to a
/// data file or a remote server.
pub trait MessageSink {
    fn send_message_event(&mut self, message: &MessageEvent);
}

impl<F> MessageSink for F
where
    F: FnMut(&MessageEvent),
{
    fn send_message_event(&mut self, message: &MessageEvent) {
        self(message)
    }
}

struct DeviceSlot {
    /// `None` for the experiment message stream, which the bus feeds itself.
    source: Option<Box<dyn EventSource>>,
    /// Fetched but not yet handed to a position record.
    unrecorded: Vec<DeviceEvent>,
    /// Shared trigger buffer; events stay here until a trigger on this
    /// device is reset.
    candidates: Vec<DeviceEvent>,
    watched: bool,
}

impl DeviceSlot {
    fn new(source: Option<Box<dyn EventSource>>) -> Self {
        Self {
            source,
            unrecorded: Vec::new(),
            candidates: Vec::new(),
            watched: false,
        }
    }

    fn deliver(&mut self, events: Vec<DeviceEvent>) {
        if self.watched {
            self.candidates.extend(events.iter().cloned());
        }
        self.unrecorded.extend(events);
    }
}

struct BusState {
    slots: BTreeMap<DeviceId, DeviceSlot>,
    sink: Option<Box<dyn MessageSink>>,
    timer: SharedTimer,
    pressed: BTreeSet<String>,
    last_gaze: Option<Position>,
}

impl BusState {
    fn fetch(&mut self, id: DeviceId) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        let Some(source) = slot.source.as_mut() else {
            return;
        };
        let events = source.get_events();
        if events.is_empty() {
            return;
        }
        for e in &events {
            match e {
                DeviceEvent::Keyboard(k) if k.edge == KeyEdge::Press => {
                    self.pressed.insert(k.key.clone());
                }
                DeviceEvent::Sample(s) if s.is_valid() => self.last_gaze = Some(s.gaze.average()),
                _ => {}
            }
        }
        slot.deliver(events);
    }
}

/// Owned hub for every device the validation run reads from.
///
/// Cloning gives another handle to the same bus. Everything runs on one
/// thread, so the handles share state through `Rc<RefCell<_>>`.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<RefCell<BusState>>,
}

impl EventBus {
    pub fn new(timer: SharedTimer) -> Self {
        let mut slots = BTreeMap::new();
        slots.insert(DeviceId::Experiment, DeviceSlot::new(None));
        Self {
            inner: Rc::new(RefCell::new(BusState {
                slots,
                sink: None,
                timer,
                pressed: BTreeSet::new(),
                last_gaze: None,
            })),
        }
    }

    pub fn add_device(&self, id: DeviceId, source: impl EventSource + 'static) {
        self.inner
            .borrow_mut()
            .slots
            .insert(id, DeviceSlot::new(Some(Box::new(source))));
    }

    pub fn set_message_sink(&self, sink: impl MessageSink + 'static) {
        self.inner.borrow_mut().sink = Some(Box::new(sink));
    }

    pub fn has_device(&self, id: DeviceId) -> bool {
        self.inner.borrow().slots.contains_key(&id)
    }

    pub fn timer(&self) -> SharedTimer {
        self.inner.borrow().timer.clone()
    }

    pub fn now(&self) -> f64 {
        self.inner.borrow().timer.now()
    }

    /// Logs an experiment message. The message is stamped with `time` (or
    /// the current time), forwarded to the sink and queued on the experiment
    /// stream before this returns.
    pub fn send_message(&self, text: &str, category: &str, time: Option<f64>) -> f64 {
        let mut state = self.inner.borrow_mut();
        let time = time.unwrap_or_else(|| state.timer.now());
        let message = MessageEvent {
            time,
            category: category.to_string(),
            text: text.to_string(),
        };
        if let Some(sink) = state.sink.as_mut() {
            sink.send_message_event(&message);
        }
        if let Some(slot) = state.slots.get_mut(&DeviceId::Experiment) {
            slot.deliver(vec![DeviceEvent::Message(message)]);
        }
        time
    }

    /// Marks `id` as watched by a trigger so fetched events are also kept
    /// as trigger candidates.
    pub fn watch(&self, id: DeviceId) {
        if let Some(slot) = self.inner.borrow_mut().slots.get_mut(&id) {
            slot.watched = true;
        }
    }

    /// Polls `id` and returns every trigger candidate buffered for it.
    pub fn candidates(&self, id: DeviceId) -> Vec<DeviceEvent> {
        let mut state = self.inner.borrow_mut();
        state.fetch(id);
        state
            .slots
            .get(&id)
            .map(|s| s.candidates.clone())
            .unwrap_or_default()
    }

    pub fn drop_candidates(&self, id: DeviceId) {
        if let Some(slot) = self.inner.borrow_mut().slots.get_mut(&id) {
            slot.candidates.clear();
        }
    }

    /// Polls `id` and forgets every trigger candidate older than `since`.
    /// Events stay unrecorded, so the position record still gets them.
    pub fn open_trigger_window(&self, id: DeviceId, since: f64) {
        let mut state = self.inner.borrow_mut();
        state.fetch(id);
        if let Some(slot) = state.slots.get_mut(&id) {
            let before = slot.candidates.len();
            slot.candidates.retain(|e| e.time() >= since);
            let dropped = before - slot.candidates.len();
            if dropped > 0 {
                debug!(device = id.name(), dropped, "stale trigger candidates dropped");
            }
        }
    }

    /// Polls `id` and hands over every event not yet recorded.
    pub fn drain(&self, id: DeviceId) -> Vec<DeviceEvent> {
        let mut state = self.inner.borrow_mut();
        state.fetch(id);
        state
            .slots
            .get_mut(&id)
            .map(|s| std::mem::take(&mut s.unrecorded))
            .unwrap_or_default()
    }

    /// Whether `key` was pressed since the last [`EventBus::clear_all`].
    /// Does not consume anything.
    pub fn key_pressed(&self, key: &str) -> bool {
        let mut state = self.inner.borrow_mut();
        state.fetch(DeviceId::Keyboard);
        state.pressed.iter().any(|k| k == key)
    }

    /// Like [`EventBus::key_pressed`] but forgets the press.
    pub fn take_key_press(&self, key: &str) -> bool {
        let mut state = self.inner.borrow_mut();
        state.fetch(DeviceId::Keyboard);
        state.pressed.remove(key)
    }

    /// Drains the keyboard and returns the first of `keys` seen on `edge`.
    pub fn next_key(&self, keys: &[&str], edge: KeyEdge) -> Option<String> {
        self.drain(DeviceId::Keyboard)
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::Keyboard(k) if k.edge == edge => Some(k.key),
                _ => None,
            })
            .find(|k| keys.contains(&k.as_str()))
    }

    pub fn is_reporting(&self, id: DeviceId) -> bool {
        let state = self.inner.borrow();
        match state.slots.get(&id) {
            Some(DeviceSlot {
                source: Some(src), ..
            }) => src.is_reporting_events(),
            Some(_) => true,
            None => false,
        }
    }

    pub fn enable_reporting(&self, id: DeviceId, enabled: bool) {
        if let Some(src) = self
            .inner
            .borrow_mut()
            .slots
            .get_mut(&id)
            .and_then(|s| s.source.as_mut())
        {
            debug!(device = id.name(), enabled, "event reporting");
            src.enable_event_reporting(enabled);
        }
    }

    /// Discards everything buffered on every device.
    pub fn clear_all(&self) {
        let mut state = self.inner.borrow_mut();
        for slot in state.slots.values_mut() {
            if let Some(src) = slot.source.as_mut() {
                src.clear_events();
            }
            slot.unrecorded.clear();
            slot.candidates.clear();
        }
        state.pressed.clear();
    }

    /// Most recent valid gaze position seen on the tracker.
    pub fn last_gaze(&self) -> Option<Position> {
        let mut state = self.inner.borrow_mut();
        state.fetch(DeviceId::Tracker);
        state.last_gaze
    }
}
