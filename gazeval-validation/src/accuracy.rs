//! Per-position gaze error statistics.

use crate::config::ValidationConfig;
use crate::correlate::CorrelatedSample;
use crate::error::ConfigError;
use crate::results::{CalculationStatus, ErrorStats, PositionResult, SampleStages};
use gazeval_core::{Gaze, Position};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyReducer {
    period_start: f64,
    period_stop: f64,
    min_valid_sample_percent: f64,
}

/// Reduced statistics for every position of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracySummary {
    pub position_results: Vec<PositionResult>,
    pub positions_failed_processing: usize,
    /// Smallest per-position minimum; `None` when every position failed.
    pub min_error: Option<f64>,
    pub max_error: Option<f64>,
    /// Mean of the per-position mean errors.
    pub mean_error: Option<f64>,
    pub passed: bool,
}

/// Error of one gaze point against the target: signed `target - gaze` per
/// axis and the distance.
fn error(target: Position, gaze: Position) -> (f64, f64, f64) {
    let dx = target.x - gaze.x;
    let dy = target.y - gaze.y;
    (dx, dy, dx.hypot(dy))
}

impl AccuracyReducer {
    /// `period_start` and `period_stop` are seconds before the last
    /// stationary sample.
    pub fn new(
        period_start: f64,
        period_stop: f64,
        min_valid_sample_percent: f64,
    ) -> Result<Self, ConfigError> {
        if !(period_start.is_finite()
            && period_stop.is_finite()
            && period_stop >= 0.0
            && period_start >= period_stop)
        {
            return Err(ConfigError::AccuracyWindow {
                start: period_start,
                stop: period_stop,
            });
        }
        Ok(Self {
            period_start,
            period_stop,
            min_valid_sample_percent,
        })
    }

    pub fn from_config(config: &ValidationConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.accuracy_period_start,
            config.accuracy_period_stop,
            config.min_valid_sample_percent,
        )
    }

    /// `(from, to)` of the scoring window ending `period_stop` before `last`.
    pub fn window(&self, last: f64) -> (f64, f64) {
        (last - self.period_start, last - self.period_stop)
    }

    fn in_window(&self, t: f64, (lo, hi): (f64, f64)) -> bool {
        // a zero stop keeps the final sample
        t >= lo && (t < hi || (self.period_stop <= 0.0 && t <= hi))
    }

    pub fn reduce_position(&self, index: usize, samples: &[CorrelatedSample]) -> PositionResult {
        let stationary: Vec<CorrelatedSample> = samples
            .iter()
            .filter(|s| s.state.is_settled())
            .copied()
            .collect();

        let window = stationary.last().map(|s| self.window(s.time));
        let time_filtered: Vec<CorrelatedSample> = match window {
            Some(w) => stationary
                .iter()
                .filter(|s| self.in_window(s.time, w))
                .copied()
                .collect(),
            None => Vec::new(),
        };
        let used: Vec<CorrelatedSample> =
            time_filtered.iter().filter(|s| s.is_valid()).copied().collect();

        let perc = if time_filtered.is_empty() {
            0.0
        } else {
            used.len() as f64 / time_filtered.len() as f64 * 100.0
        };

        let target_position = samples
            .iter()
            .rev()
            .find(|s| s.state.is_settled())
            .or(samples.last())
            .map(|s| s.target);
        let time_range = |v: &[CorrelatedSample]| match (v.first(), v.last()) {
            (Some(a), Some(b)) => Some([a.time, b.time]),
            _ => None,
        };

        let mut result = PositionResult {
            index,
            calculation_status: CalculationStatus::Failed,
            target_position,
            sample_time_range: time_range(samples),
            filter_samples_time_range: window.map(|(lo, hi)| [lo, hi]),
            valid_filtered_sample_perc: perc,
            error: None,
            left_eye_error: None,
            right_eye_error: None,
            samples: SampleStages::default(),
        };

        if used.is_empty() || perc < self.min_valid_sample_percent {
            warn!(position = index, valid_percent = perc, "position failed processing");
        } else {
            let mut avg = Vec::with_capacity(used.len());
            let mut left = Vec::new();
            let mut right = Vec::new();
            for s in &used {
                match s.gaze {
                    Gaze::Monocular(eye) => avg.push(error(s.target, eye.position())),
                    Gaze::Binocular { left: l, right: r } => {
                        let el = error(s.target, l.position());
                        let er = error(s.target, r.position());
                        avg.push((
                            (el.0 + er.0) / 2.0,
                            (el.1 + er.1) / 2.0,
                            (el.2 + er.2) / 2.0,
                        ));
                        left.push(el);
                        right.push(er);
                    }
                }
            }
            result.calculation_status = CalculationStatus::Passed;
            result.error = ErrorStats::from_errors(&avg);
            result.left_eye_error = ErrorStats::from_errors(&left);
            result.right_eye_error = ErrorStats::from_errors(&right);
            if let Some(e) = &result.error {
                debug!(position = index, mean = e.mean, min = e.min, max = e.max, "position reduced");
            }
        }

        result.samples = SampleStages {
            all: samples.to_vec(),
            stationary,
            time_filtered,
            used,
        };
        result
    }

    /// Reduces every position; the input is not modified, so repeated calls
    /// give identical results.
    pub fn reduce(&self, data: &[Vec<CorrelatedSample>]) -> AccuracySummary {
        let position_results: Vec<PositionResult> = data
            .iter()
            .enumerate()
            .map(|(i, samples)| self.reduce_position(i, samples))
            .collect();

        let failed = position_results
            .iter()
            .filter(|r| r.calculation_status == CalculationStatus::Failed)
            .count();
        let stats: Vec<&ErrorStats> = position_results.iter().filter_map(|r| r.error.as_ref()).collect();
        let min_error = stats.iter().map(|e| e.min).reduce(f64::min);
        let max_error = stats.iter().map(|e| e.max).reduce(f64::max);
        let mean_error = if stats.is_empty() {
            None
        } else {
            Some(stats.iter().map(|e| e.mean).sum::<f64>() / stats.len() as f64)
        };

        AccuracySummary {
            position_results,
            positions_failed_processing: failed,
            min_error,
            max_error,
            mean_error,
            passed: failed == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gazeval_core::{EyePoint, MessageKind, TargetState};

    fn cs(time: f64, state: u8, status: i32, gaze: Gaze) -> CorrelatedSample {
        CorrelatedSample {
            position_index: 0,
            bracket_index: 0,
            last_msg_time: 0.0,
            last_msg_kind: MessageKind::SyncTime,
            next_msg_time: 10.0,
            next_msg_kind: MessageKind::NextPosTrig,
            target: Position::ORIGIN,
            state: TargetState::from_bits(state).unwrap(),
            time,
            status,
            gaze,
        }
    }

    fn mono(x: f64, y: f64) -> Gaze {
        Gaze::Monocular(EyePoint::new(x, y, 4.0))
    }

    #[test]
    fn window_is_trailing_and_half_open() {
        let r = AccuracyReducer::new(0.55, 0.15, 1.0).unwrap();
        let samples: Vec<_> = (0..=10)
            .map(|i| cs(i as f64 * 0.1, 1, 0, mono(0.0, 0.0)))
            .collect();
        let p = r.reduce_position(0, &samples);
        let times: Vec<f64> = p.samples.time_filtered.iter().map(|s| s.time).collect();
        // last = 1.0, window [0.45, 0.85)
        assert_eq!(times.len(), 4);
        assert_relative_eq!(times[0], 0.5);
        assert_relative_eq!(times[3], 0.8);
    }

    #[test]
    fn moving_and_resizing_samples_excluded() {
        let r = AccuracyReducer::new(10.0, 0.0, 1.0).unwrap();
        let samples = vec![
            cs(0.0, TargetState::MOVING, 0, mono(50.0, 0.0)),
            cs(0.1, TargetState::STATIONARY | TargetState::CONTRACTING, 0, mono(50.0, 0.0)),
            cs(0.2, TargetState::STATIONARY, 0, mono(3.0, 4.0)),
        ];
        let p = r.reduce_position(0, &samples);
        assert_eq!(p.samples.stationary.len(), 1);
        assert_relative_eq!(p.error.unwrap().mean, 5.0);
        assert_relative_eq!(p.error.unwrap().mean_x, -3.0);
    }

    #[test]
    fn binocular_error_averages_eyes() {
        let r = AccuracyReducer::new(1.0, 0.0, 1.0).unwrap();
        let g = Gaze::Binocular {
            left: EyePoint::new(3.0, 4.0, 4.0),
            right: EyePoint::new(-1.0, 0.0, 4.0),
        };
        let p = r.reduce_position(0, &[cs(0.0, 1, 0, g)]);
        assert_relative_eq!(p.left_eye_error.unwrap().mean, 5.0);
        assert_relative_eq!(p.right_eye_error.unwrap().mean, 1.0);
        assert_relative_eq!(p.error.unwrap().mean, 3.0);
    }

    #[test]
    fn threshold_is_tunable() {
        // 1 good of 3
        let samples = vec![
            cs(0.0, 1, 2, mono(0.0, 0.0)),
            cs(0.1, 1, 2, mono(0.0, 0.0)),
            cs(0.2, 1, 0, mono(0.0, 0.0)),
        ];
        let lenient = AccuracyReducer::new(1.0, 0.0, 1.0).unwrap();
        assert_eq!(
            lenient.reduce_position(0, &samples).calculation_status,
            CalculationStatus::Passed
        );
        let strict = AccuracyReducer::new(1.0, 0.0, 50.0).unwrap();
        assert_eq!(
            strict.reduce_position(0, &samples).calculation_status,
            CalculationStatus::Failed
        );
    }

    #[test]
    fn run_summary_mean_of_means() {
        let r = AccuracyReducer::new(1.0, 0.0, 1.0).unwrap();
        let data = vec![
            vec![cs(0.0, 1, 0, mono(1.0, 0.0))],
            vec![cs(0.0, 1, 0, mono(3.0, 0.0)), cs(0.1, 1, 0, mono(3.0, 0.0))],
            vec![],
        ];
        let s = r.reduce(&data);
        assert_eq!(s.positions_failed_processing, 1);
        assert!(!s.passed);
        assert_relative_eq!(s.mean_error.unwrap(), 2.0);
        assert_eq!(s.min_error, Some(1.0));
        assert_eq!(s.max_error, Some(3.0));
    }

    #[test]
    fn rejects_inverted_window() {
        assert!(AccuracyReducer::new(0.1, 0.2, 1.0).is_err());
        assert!(AccuracyReducer::new(0.5, -0.1, 1.0).is_err());
    }
}
