//! Whole runs on a simulated clock: recorded display, scripted keyboard and a
//! tracker that looks at whatever target was last presented.

use approx::assert_relative_eq;
use gazeval_core::{
    DeviceId, KeyboardEvent, MessageEvent, MessageKind, Position, SequenceMessage, TargetState,
};
use gazeval_timing::{ManualTimer, SharedTimer};
use gazeval_validation::renderer::TERMINATED_MESSAGE;
use gazeval_validation::sim::{DrawCall, GazeTarget, ObservedDisplay, RecordingDisplay, ScriptedKeyboard, SimulatedTracker};
use gazeval_validation::{
    AnimationOptions, CalculationStatus, EventBus, GridConfig, MonitorGeometry, PositionsConfig,
    TriggerConfig, TriggerSpec, UnitConverter, Units, ValidationConfig, ValidationProcedure,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

const MONITOR: MonitorGeometry = MonitorGeometry {
    width_cm: 53.0,
    distance_cm: 60.0,
    width_px: 800,
    height_px: 600,
};

struct Rig {
    timer: SharedTimer,
    bus: EventBus,
    display: ObservedDisplay<RecordingDisplay>,
    log: Rc<RefCell<Vec<MessageEvent>>>,
}

fn rig(keys: Vec<KeyboardEvent>, bias: Position) -> Rig {
    let timer: SharedTimer = Arc::new(ManualTimer::new(0.0));
    let bus = EventBus::new(timer.clone());
    bus.add_device(DeviceId::Keyboard, ScriptedKeyboard::new(timer.clone(), keys));

    let gaze = GazeTarget::default();
    let tracker = SimulatedTracker::new(timer.clone(), gaze.clone(), 500.0)
        .unwrap()
        .with_bias(bias)
        .seed(7);
    bus.add_device(DeviceId::Tracker, tracker);

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink_log = log.clone();
    bus.set_message_sink(move |m: &MessageEvent| sink_log.borrow_mut().push(m.clone()));

    let conv = UnitConverter::new(Units::Pix, MONITOR).unwrap();
    let display = ObservedDisplay::new(RecordingDisplay::new(timer.clone(), conv, 60.0), gaze);
    Rig {
        timer,
        bus,
        display,
        log,
    }
}

fn config() -> ValidationConfig {
    ValidationConfig {
        positions: PositionsConfig::Pairs(vec![[0.0, 0.0], [200.0, 0.0], [-200.0, 100.0]]),
        randomize_positions: false,
        animation: AnimationOptions {
            enable: true,
            target_delay: 0.3,
            target_duration: 0.4,
            expand_scale: None,
            contract_target: true,
        },
        accuracy_period_start: 0.4,
        accuracy_period_stop: 0.05,
        show_intro_screen: false,
        show_results_screen: false,
        monitor: MONITOR,
        ..ValidationConfig::default()
    }
}

fn sequence_kinds(log: &[MessageEvent]) -> Vec<MessageKind> {
    log.iter()
        .filter_map(|m| SequenceMessage::decode(&m.text).ok())
        .map(|m| m.kind())
        .collect()
}

fn sequence(log: &[MessageEvent]) -> Vec<(f64, SequenceMessage)> {
    log.iter()
        .filter_map(|m| SequenceMessage::decode(&m.text).ok().map(|s| (m.time, s)))
        .collect()
}

/// Kinds with consecutive repeats collapsed.
fn phases(log: &[MessageEvent]) -> Vec<MessageKind> {
    let mut kinds = sequence_kinds(log);
    kinds.dedup();
    kinds
}

fn animation(enable: bool, expand_scale: Option<f64>, contract_target: bool) -> AnimationOptions {
    AnimationOptions {
        enable,
        target_delay: 0.3,
        target_duration: 0.4,
        expand_scale,
        contract_target,
    }
}

#[test]
fn biased_gaze_is_measured_at_every_position() {
    let mut rig = rig(Vec::new(), Position::new(3.0, 4.0));
    let mut procedure =
        ValidationProcedure::with_triggers(&mut rig.display, &rig.bus, config(), TriggerSpec::Delay(0.5)).unwrap();
    let results = procedure.run().cloned().unwrap();

    assert!(results.passed);
    assert_eq!(results.position_count, 3);
    assert_eq!(results.positions_failed_processing, 0);
    assert_eq!(results.display_units, Units::Pix);
    assert_eq!(results.reporting_unit_type, Units::Pix);
    assert_eq!(
        results.target_positions,
        vec![
            Position::new(0.0, 0.0),
            Position::new(200.0, 0.0),
            Position::new(-200.0, 100.0)
        ]
    );

    for (r, target) in results.position_results.iter().zip(&results.target_positions) {
        assert_eq!(r.calculation_status, CalculationStatus::Passed);
        assert_eq!(r.target_position, Some(*target));
        assert_relative_eq!(r.valid_filtered_sample_perc, 100.0);
        assert!(r.samples.used.len() > 100);
        let e = r.error.unwrap();
        assert_relative_eq!(e.mean, 5.0, epsilon = 1e-9);
        assert_relative_eq!(e.mean_x, -3.0, epsilon = 1e-9);
        assert_relative_eq!(e.mean_y, -4.0, epsilon = 1e-9);
        assert!(r.left_eye_error.is_none());
    }
    assert_relative_eq!(results.mean_error.unwrap(), 5.0, epsilon = 1e-9);

    let log = rig.log.borrow();
    let kinds = sequence_kinds(&log);
    assert_eq!(kinds.first(), Some(&MessageKind::BeginSequence));
    assert_eq!(kinds.last(), Some(&MessageKind::DoneSequence));
    let count = |k: MessageKind| kinds.iter().filter(|x| **x == k).count();
    assert_eq!(count(MessageKind::StartDraw), 3);
    assert_eq!(count(MessageKind::SyncTime), 3);
    assert_eq!(count(MessageKind::NextPosTrig), 3);
    assert_eq!(count(MessageKind::TargetPos), 3);
    // no glide into the first position
    assert!(count(MessageKind::PosUpdate) > 0);
    let first_update = kinds.iter().position(|k| *k == MessageKind::PosUpdate);
    let first_trig = kinds.iter().position(|k| *k == MessageKind::NextPosTrig);
    assert!(first_trig < first_update);

    // flip-stamped messages never run ahead of the clock
    assert!(log.windows(2).all(|w| w[0].time <= w[1].time + 1e-9));

    let report: Vec<&MessageEvent> = log.iter().filter(|m| m.category == "VALIDATION").collect();
    assert_eq!(report.len(), 2 + 3);
    assert!(report[0].text.starts_with("VALIDATION RESULTS passed=true positions=3 failed=0"));
    assert!(report[2].text.starts_with("VALIDATION POSITION 0 PASSED"));
}

#[test]
fn results_can_be_reported_in_degrees() {
    let one_deg = MONITOR.deg_to_pix(1.0);
    let mut rig = rig(Vec::new(), Position::new(one_deg, 0.0));
    let cfg = ValidationConfig {
        results_in_degrees: true,
        ..config()
    };
    let mut procedure =
        ValidationProcedure::with_triggers(&mut rig.display, &rig.bus, cfg, TriggerSpec::Delay(0.5)).unwrap();
    let results = procedure.run().unwrap();

    assert_eq!(results.display_units, Units::Pix);
    assert_eq!(results.reporting_unit_type, Units::Deg);
    assert!(results.passed);
    for r in &results.position_results {
        assert_relative_eq!(r.error.unwrap().mean, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn terminate_key_abandons_the_run() {
    let mut rig = rig(vec![KeyboardEvent::press(1.0, "escape")], Position::ORIGIN);
    let mut procedure =
        ValidationProcedure::with_triggers(&mut rig.display, &rig.bus, config(), TriggerSpec::Delay(0.5)).unwrap();
    assert!(procedure.run().is_none());
    assert!(procedure.validation_results().is_none());
    assert!(procedure.renderer().terminate_requested());
    let records = procedure.renderer().target_data().len();
    assert!((1..3).contains(&records));

    let log = rig.log.borrow();
    assert_eq!(log.last().map(|m| m.text.as_str()), Some(TERMINATED_MESSAGE));
    assert!(!sequence_kinds(&log).contains(&MessageKind::DoneSequence));
    assert!(log.iter().all(|m| m.category != "VALIDATION"));
}

#[test]
fn intro_and_results_screens_wait_for_space() {
    let mut rig = rig(Vec::new(), Position::ORIGIN);
    rig.bus.add_device(
        DeviceId::Keyboard,
        ScriptedKeyboard::autopress(rig.timer.clone(), "space", Duration::from_millis(250)),
    );
    let cfg = ValidationConfig {
        show_intro_screen: true,
        show_results_screen: true,
        progress_on_key: Vec::new(),
        triggers: Some(TriggerConfig::Delay(0.5)),
        ..config()
    };
    let intro_text = cfg.intro_text.clone();
    let mut procedure = ValidationProcedure::new(&mut rig.display, &rig.bus, cfg).unwrap();
    assert!(procedure.run().is_some_and(|r| r.passed));
    drop(procedure);

    let frames = &rig.display.inner().frames;
    let first_text = frames
        .iter()
        .flat_map(|(_, calls)| calls)
        .find_map(|c| match c {
            DrawCall::Text(t) => Some(t.clone()),
            _ => None,
        });
    assert_eq!(first_text, Some(intro_text));

    // the results screen is the last frame: every target plus the used samples
    let (_, last) = frames.last().unwrap();
    let targets = last.iter().filter(|c| matches!(c, DrawCall::Target(_))).count();
    let samples = last.iter().filter(|c| matches!(c, DrawCall::Sample(_))).count();
    assert_eq!(targets, 3);
    assert!(samples > 0);
}

#[test]
fn presses_during_animation_do_not_end_the_dwell() {
    // 1.5 lands in the second position's contract phase
    let presses = [1.0, 1.5, 3.0, 4.5]
        .into_iter()
        .map(|t| KeyboardEvent::press(t, "space"))
        .collect();
    let mut rig = rig(presses, Position::ORIGIN);
    let cfg = ValidationConfig {
        progress_on_key: vec!["space".to_string()],
        triggers: None,
        ..config()
    };
    let mut procedure = ValidationProcedure::new(&mut rig.display, &rig.bus, cfg).unwrap();
    let results = procedure.run().cloned().unwrap();
    assert!(results.passed);
    for r in &results.position_results {
        assert!(r.samples.used.len() > 100);
    }
    drop(procedure);

    let log = rig.log.borrow();
    let mut settled = Vec::new();
    let mut fired = Vec::new();
    for (time, msg) in sequence(&log) {
        match msg {
            SequenceMessage::SyncTime { .. } => settled.push(time),
            SequenceMessage::NextPosTrig { event_time, .. } => fired.push(event_time),
            _ => {}
        }
    }
    assert_eq!(fired, vec![1.0, 3.0, 4.5]);
    assert_eq!(settled.len(), 3);
    assert!(settled.iter().zip(&fired).all(|(s, f)| s <= f));
    assert!(settled[1] > 1.5);
}

#[test]
fn expanding_target_grows_then_contracts() {
    let mut rig = rig(Vec::new(), Position::ORIGIN);
    let cfg = ValidationConfig {
        animation: animation(true, Some(1.5), true),
        ..config()
    };
    let original = cfg.target.radius;
    let mut procedure =
        ValidationProcedure::with_triggers(&mut rig.display, &rig.bus, cfg, TriggerSpec::Delay(0.5)).unwrap();
    assert!(procedure.run().is_some_and(|r| r.passed));

    use MessageKind::*;
    let glide = [StartDraw, PosUpdate, TargetPos, ExpandSize, ContractSize, SyncTime, NextPosTrig];
    let mut expected = vec![BeginSequence, StartDraw, TargetPos, ExpandSize, ContractSize, SyncTime, NextPosTrig];
    expected.extend(glide);
    expected.extend(glide);
    expected.push(DoneSequence);
    assert_eq!(phases(&rig.log.borrow()), expected);

    let seq = sequence(&rig.log.borrow());
    let expand: Vec<f64> = seq
        .iter()
        .filter_map(|(_, m)| match m {
            SequenceMessage::ExpandSize { radius, .. } => Some(*radius),
            _ => None,
        })
        .collect();
    assert!(expand.len() > 3);
    assert!(expand.windows(2).all(|w| w[0] <= w[1]));
    assert!(expand.iter().all(|r| *r >= original - 1e-4 && *r <= original * 1.5 + 1e-4));

    let data = procedure.renderer().get_sample_message_data();
    assert_eq!(data.len(), 3);
    for position in &data {
        assert!(position.windows(2).all(|w| w[0].bracket_index <= w[1].bracket_index));
        let has = |flag: u8| position.iter().any(|s| s.state.bits() & flag != 0);
        assert!(has(TargetState::EXPANDING));
        assert!(has(TargetState::CONTRACTING));
        assert!(position.iter().all(|s| {
            let bits = s.state.bits();
            bits & TargetState::EXPANDING == 0 || bits & TargetState::CONTRACTING == 0
        }));
    }
}

#[test]
fn disabled_animation_blanks_then_jumps() {
    let mut rig = rig(Vec::new(), Position::ORIGIN);
    let cfg = ValidationConfig {
        animation: animation(false, None, false),
        ..config()
    };
    let mut procedure =
        ValidationProcedure::with_triggers(&mut rig.display, &rig.bus, cfg, TriggerSpec::Delay(0.5)).unwrap();
    assert!(procedure.run().is_some_and(|r| r.passed));
    let data = procedure.renderer().get_sample_message_data();
    for position in &data {
        assert!(position.windows(2).all(|w| w[0].bracket_index <= w[1].bracket_index));
        assert!(position.iter().all(|s| s.state.bits() == TargetState::STATIONARY));
    }
    drop(procedure);

    let log = rig.log.borrow();
    let kinds = phases(&log);
    assert!(!kinds.contains(&MessageKind::PosUpdate));
    assert!(!kinds.contains(&MessageKind::ExpandSize));
    assert!(!kinds.contains(&MessageKind::ContractSize));

    let seq = sequence(&log);
    let time_of = |kind: MessageKind, index: usize| {
        seq.iter()
            .filter(|(_, m)| m.kind() == kind)
            .nth(index)
            .map(|(t, _)| *t)
            .unwrap()
    };
    for i in 1..3 {
        let start = time_of(MessageKind::StartDraw, i);
        let shown = time_of(MessageKind::TargetPos, i);
        assert!(shown - start >= 0.3);
        assert_eq!(time_of(MessageKind::SyncTime, i), shown);
    }
    // the delay is spent on a blank frame
    assert!(rig.display.inner().frames.iter().any(|(_, calls)| calls.is_empty()));
}

#[test]
fn repeated_first_position_closes_the_sequence() {
    let mut rig = rig(Vec::new(), Position::ORIGIN);
    let cfg = ValidationConfig {
        positions: PositionsConfig::Grid(GridConfig {
            shape: Some([3, 1]),
            first_pos_index: 1,
            repeat_first_pos: true,
            ..GridConfig::default()
        }),
        ..config()
    };
    let mut procedure =
        ValidationProcedure::with_triggers(&mut rig.display, &rig.bus, cfg, TriggerSpec::Delay(0.5)).unwrap();
    assert!(procedure.run().is_some());
    let records = procedure.renderer().target_data();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].to, records[3].to);
    assert_eq!(records[0].from, None);
    assert_eq!(records[3].from, Some(records[2].to));
    drop(procedure);

    let seq = sequence(&rig.log.borrow());
    let counts: Vec<usize> = seq
        .iter()
        .filter_map(|(_, m)| match m {
            SequenceMessage::BeginSequence { count } | SequenceMessage::DoneSequence { count } => Some(*count),
            _ => None,
        })
        .collect();
    // the repeat is not a position of its own
    assert_eq!(counts, vec![3, 3]);
    let draws = seq.iter().filter(|(_, m)| m.kind() == MessageKind::StartDraw).count();
    assert_eq!(draws, 4);
}

#[test]
fn gaze_key_toggles_the_cursor_overlay() {
    let mut rig = rig(vec![KeyboardEvent::press(0.6, "g")], Position::ORIGIN);
    let mut procedure =
        ValidationProcedure::with_triggers(&mut rig.display, &rig.bus, config(), TriggerSpec::Delay(0.5)).unwrap();
    assert!(procedure.run().is_some());
    assert!(procedure.renderer().display_gaze());
    drop(procedure);

    let frames = &rig.display.inner().frames;
    let with_cursor: Vec<f64> = frames
        .iter()
        .filter(|(_, calls)| calls.iter().any(|c| matches!(c, DrawCall::GazeCursor(_))))
        .map(|(t, _)| *t)
        .collect();
    assert!(with_cursor.len() > 10);
    assert!(with_cursor.iter().all(|t| *t >= 0.6));
    // the cursor is drawn on every frame once toggled on
    let first = with_cursor[0];
    assert!(frames
        .iter()
        .filter(|(t, _)| *t >= first)
        .all(|(_, calls)| calls.iter().any(|c| matches!(c, DrawCall::GazeCursor(_)))));
}
