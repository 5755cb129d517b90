//! The results tree produced by one validation run.

use crate::accuracy::AccuracySummary;
use crate::correlate::CorrelatedSample;
use crate::units::Units;
use gazeval_core::{Bounds, Position};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationStatus {
    Passed,
    Failed,
}

/// min/max/mean/stdev of the distance error plus the mean signed
/// `target - gaze` error per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
    pub mean_x: f64,
    pub mean_y: f64,
}

impl ErrorStats {
    /// `errors` holds `(dx, dy, distance)` triples. Population stdev.
    pub fn from_errors(errors: &[(f64, f64, f64)]) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        let n = errors.len() as f64;
        let mean = errors.iter().map(|e| e.2).sum::<f64>() / n;
        let var = errors.iter().map(|e| (e.2 - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            min: errors.iter().map(|e| e.2).fold(f64::INFINITY, f64::min),
            max: errors.iter().map(|e| e.2).fold(f64::NEG_INFINITY, f64::max),
            mean,
            stdev: var.sqrt(),
            mean_x: errors.iter().map(|e| e.0).sum::<f64>() / n,
            mean_y: errors.iter().map(|e| e.1).sum::<f64>() / n,
        })
    }
}

/// Samples kept after each filter stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStages {
    pub all: Vec<CorrelatedSample>,
    pub stationary: Vec<CorrelatedSample>,
    pub time_filtered: Vec<CorrelatedSample>,
    pub used: Vec<CorrelatedSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionResult {
    pub index: usize,
    pub calculation_status: CalculationStatus,
    /// Settled target position seen in the samples.
    pub target_position: Option<Position>,
    pub sample_time_range: Option<[f64; 2]>,
    pub filter_samples_time_range: Option<[f64; 2]>,
    pub valid_filtered_sample_perc: f64,
    /// Distance error; binocular samples average both eyes.
    pub error: Option<ErrorStats>,
    pub left_eye_error: Option<ErrorStats>,
    pub right_eye_error: Option<ErrorStats>,
    pub samples: SampleStages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResults {
    pub display_units: Units,
    pub display_bounds: Bounds,
    pub display_pix: [u32; 2],
    pub position_count: usize,
    /// Intended positions, in presentation order.
    pub target_positions: Vec<Position>,
    pub position_results: Vec<PositionResult>,
    pub positions_failed_processing: usize,
    pub reporting_unit_type: Units,
    pub min_error: Option<f64>,
    pub max_error: Option<f64>,
    pub mean_error: Option<f64>,
    pub passed: bool,
}

impl ValidationResults {
    pub fn new(
        display_units: Units,
        display_bounds: Bounds,
        display_pix: [u32; 2],
        target_positions: Vec<Position>,
        reporting_unit_type: Units,
        summary: AccuracySummary,
    ) -> Self {
        Self {
            display_units,
            display_bounds,
            display_pix,
            position_count: target_positions.len(),
            target_positions,
            position_results: summary.position_results,
            positions_failed_processing: summary.positions_failed_processing,
            reporting_unit_type,
            min_error: summary.min_error,
            max_error: summary.max_error,
            mean_error: summary.mean_error,
            passed: summary.passed,
        }
    }

    /// Text lines logged under the `VALIDATION` category.
    pub fn report_lines(&self) -> Vec<String> {
        let fmt = |v: Option<f64>| v.map_or_else(|| "nan".to_string(), |v| format!("{v:.4}"));
        let mut lines = vec![
            format!(
                "VALIDATION RESULTS passed={} positions={} failed={} units={}",
                self.passed, self.position_count, self.positions_failed_processing, self.reporting_unit_type
            ),
            format!(
                "VALIDATION ERROR min={} max={} mean={}",
                fmt(self.min_error),
                fmt(self.max_error),
                fmt(self.mean_error)
            ),
        ];
        for r in &self.position_results {
            let status = match r.calculation_status {
                CalculationStatus::Passed => "PASSED",
                CalculationStatus::Failed => "FAILED",
            };
            lines.push(format!(
                "VALIDATION POSITION {} {} min={} max={} mean={} stdev={}",
                r.index,
                status,
                fmt(r.error.map(|e| e.min)),
                fmt(r.error.map(|e| e.max)),
                fmt(r.error.map(|e| e.mean)),
                fmt(r.error.map(|e| e.stdev)),
            ));
        }
        lines
    }

    pub fn save_json(&self, path: &Path) -> io::Result<()> {
        let w = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(w, self).map_err(io::Error::other)
    }
}
