//! Conditions that advance the target to its next position.

use crate::device::EventBus;
use crate::error::ConfigError;
use gazeval_core::{AttrValue, DeviceEvent, DeviceId, EventType, TIME_TRIGGER_EVENT_ID};
use tracing::debug;

/// Values a trigger may consult when polled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TriggerContext {
    pub now: f64,
    /// Reference time for delay based triggers, usually the flip time at
    /// which the target settled.
    pub start_time: Option<f64>,
}

pub trait Trigger {
    fn triggered(&mut self, ctx: &TriggerContext) -> bool;

    fn triggering_event(&self) -> Option<&DeviceEvent>;

    fn triggering_time(&self) -> Option<f64>;

    /// Clears the last fire. Device triggers also drop the shared event
    /// buffer for their device.
    fn reset_last_triggered_info(&mut self);

    /// Clears the last fire and the fire count.
    fn reset_trigger(&mut self);

    /// Device this trigger reads events from, if any.
    fn device(&self) -> Option<DeviceId> {
        None
    }

    /// Event type id reported in `NEXT_POS_TRIG`.
    fn event_type_id(&self) -> u8 {
        self.triggering_event()
            .map_or(TIME_TRIGGER_EVENT_ID, |e| e.event_type().id())
    }
}

/// Polls `triggers` in order and returns the index of the first that fires.
/// Later triggers are not polled once one has fired.
pub fn first_fired(triggers: &mut [Box<dyn Trigger>], ctx: &TriggerContext) -> Option<usize> {
    triggers.iter_mut().position(|t| t.triggered(ctx))
}

/// Fire bookkeeping shared by every trigger kind.
#[derive(Debug, Clone, Default, PartialEq)]
struct FireState {
    /// `None` fires without limit; `Some(n)` allows `n + 1` fires.
    repeat_count: Option<u32>,
    fired: u32,
    last_event: Option<DeviceEvent>,
    last_time: Option<f64>,
}

impl FireState {
    fn new(repeat_count: Option<u32>) -> Self {
        Self {
            repeat_count,
            ..Self::default()
        }
    }

    fn exhausted(&self) -> bool {
        matches!(self.repeat_count, Some(n) if self.fired > n)
    }

    fn fire(&mut self, time: f64, event: Option<DeviceEvent>) {
        self.fired += 1;
        self.last_time = Some(time);
        self.last_event = event;
    }

    fn clear_last(&mut self) {
        self.last_event = None;
        self.last_time = None;
    }
}

pub enum Delay {
    Fixed(f64),
    /// Evaluated on every poll.
    Dynamic(Box<dyn FnMut() -> f64>),
}

impl Delay {
    fn seconds(&mut self) -> f64 {
        match self {
            Delay::Fixed(d) => *d,
            Delay::Dynamic(f) => f(),
        }
    }
}

impl From<f64> for Delay {
    fn from(d: f64) -> Self {
        Delay::Fixed(d)
    }
}

/// Fires once `delay` seconds have passed since its start time.
///
/// The start time is, in order: the one given at construction, the one in
/// the poll context, or the time of the first poll after a reset.
pub struct TimeTrigger {
    start_time: Option<f64>,
    first_poll: Option<f64>,
    delay: Delay,
    state: FireState,
}

impl TimeTrigger {
    pub fn new(delay: impl Into<Delay>) -> Self {
        Self {
            start_time: None,
            first_poll: None,
            delay: delay.into(),
            state: FireState::new(Some(0)),
        }
    }

    pub fn with_start_time(mut self, start: f64) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn with_repeat_count(mut self, repeat: Option<u32>) -> Self {
        self.state.repeat_count = repeat;
        self
    }
}

impl Trigger for TimeTrigger {
    fn triggered(&mut self, ctx: &TriggerContext) -> bool {
        if self.state.exhausted() {
            return false;
        }
        let start = match self.start_time.or(ctx.start_time).or(self.first_poll) {
            Some(s) => s,
            None => *self.first_poll.insert(ctx.now),
        };
        if ctx.now - start >= self.delay.seconds() {
            self.state.fire(ctx.now, None);
            return true;
        }
        false
    }

    fn triggering_event(&self) -> Option<&DeviceEvent> {
        None
    }

    fn triggering_time(&self) -> Option<f64> {
        self.state.last_time
    }

    fn reset_last_triggered_info(&mut self) {
        self.state.clear_last();
    }

    fn reset_trigger(&mut self) {
        self.reset_last_triggered_info();
        self.state.fired = 0;
        self.first_poll = None;
    }
}

/// Attribute requirement on a device event.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(AttrValue),
    OneOf(Vec<AttrValue>),
}

impl Condition {
    fn holds(&self, value: &AttrValue) -> bool {
        match self {
            Condition::Equals(v) => v == value,
            Condition::OneOf(vs) => vs.contains(value),
        }
    }
}

/// Fires on the first buffered event of a device matching an event type and
/// every attribute condition.
pub struct DeviceEventTrigger {
    bus: EventBus,
    device: DeviceId,
    event_type: EventType,
    conditions: Vec<(String, Condition)>,
    state: FireState,
}

impl DeviceEventTrigger {
    pub fn new(bus: &EventBus, device: DeviceId, event_type: EventType) -> Self {
        bus.watch(device);
        Self {
            bus: bus.clone(),
            device,
            event_type,
            conditions: Vec::new(),
            state: FireState::new(None),
        }
    }

    pub fn with_condition(mut self, attribute: &str, condition: Condition) -> Self {
        self.conditions.push((attribute.to_string(), condition));
        self
    }

    pub fn with_repeat_count(mut self, repeat: Option<u32>) -> Self {
        self.state.repeat_count = repeat;
        self
    }

    fn matches(&self, event: &DeviceEvent) -> bool {
        event.event_type() == self.event_type
            && self.conditions.iter().all(|(name, cond)| {
                event
                    .attribute(name)
                    .is_some_and(|value| cond.holds(&value))
            })
    }
}

impl Trigger for DeviceEventTrigger {
    fn triggered(&mut self, _ctx: &TriggerContext) -> bool {
        if self.state.exhausted() {
            return false;
        }
        let hit = self
            .bus
            .candidates(self.device)
            .into_iter()
            .find(|e| self.matches(e));
        match hit {
            Some(event) => {
                self.state.fire(event.time(), Some(event));
                true
            }
            None => false,
        }
    }

    fn triggering_event(&self) -> Option<&DeviceEvent> {
        self.state.last_event.as_ref()
    }

    fn triggering_time(&self) -> Option<f64> {
        self.state.last_time
    }

    fn reset_last_triggered_info(&mut self) {
        self.state.clear_last();
        self.bus.drop_candidates(self.device);
    }

    fn reset_trigger(&mut self) {
        self.reset_last_triggered_info();
        self.state.fired = 0;
    }

    fn device(&self) -> Option<DeviceId> {
        Some(self.device)
    }
}

/// A device trigger bound to one keyboard key.
pub struct KeyboardTrigger {
    key: String,
    inner: DeviceEventTrigger,
}

impl KeyboardTrigger {
    pub fn new(bus: &EventBus, key: &str, on_press: bool) -> Self {
        let event_type = if on_press {
            EventType::KeyboardPress
        } else {
            EventType::KeyboardRelease
        };
        Self {
            key: key.to_string(),
            inner: DeviceEventTrigger::new(bus, DeviceId::Keyboard, event_type)
                .with_condition("key", Condition::Equals(AttrValue::from(key))),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Trigger for KeyboardTrigger {
    fn triggered(&mut self, ctx: &TriggerContext) -> bool {
        self.inner.triggered(ctx)
    }

    fn triggering_event(&self) -> Option<&DeviceEvent> {
        self.inner.triggering_event()
    }

    fn triggering_time(&self) -> Option<f64> {
        self.inner.triggering_time()
    }

    fn reset_last_triggered_info(&mut self) {
        self.inner.reset_last_triggered_info()
    }

    fn reset_trigger(&mut self) {
        self.inner.reset_trigger()
    }

    fn device(&self) -> Option<DeviceId> {
        self.inner.device()
    }
}

/// Shorthand accepted wherever a trigger set is configured.
pub enum TriggerSpec {
    /// One time trigger with this delay in seconds.
    Delay(f64),
    /// One release-edge keyboard trigger.
    Key(String),
    /// One release-edge keyboard trigger per key.
    Keys(Vec<String>),
    Triggers(Vec<Box<dyn Trigger>>),
}

pub fn triggers_from(
    spec: TriggerSpec,
    bus: &EventBus,
) -> Result<Vec<Box<dyn Trigger>>, ConfigError> {
    let key_trigger = |key: &str| -> Result<Box<dyn Trigger>, ConfigError> {
        if key.is_empty() {
            return Err(ConfigError::Trigger("empty key name".into()));
        }
        Ok(Box::new(KeyboardTrigger::new(bus, key, false)))
    };
    let triggers = match spec {
        TriggerSpec::Delay(d) if d.is_finite() && d >= 0.0 => {
            vec![Box::new(TimeTrigger::new(d)) as Box<dyn Trigger>]
        }
        TriggerSpec::Delay(d) => {
            return Err(ConfigError::Trigger(format!("invalid delay {d}")));
        }
        TriggerSpec::Key(k) => vec![key_trigger(&k)?],
        TriggerSpec::Keys(keys) => keys
            .iter()
            .map(|k| key_trigger(k))
            .collect::<Result<Vec<_>, _>>()?,
        TriggerSpec::Triggers(list) => list,
    };
    if triggers.is_empty() {
        return Err(ConfigError::Trigger("no triggers given".into()));
    }
    debug!(count = triggers.len(), "triggers configured");
    Ok(triggers)
}
