//! Feature engineering pipeline.
//!
//! The same [`FeaturePipeline`] runs when training data is produced and when
//! live windows are scored, so the derived columns match exactly between
//! the two. The pipeline is an ordered list of pure [`FeatureStep`]s:
//!
//! 1. rows are sorted oldest first (stable on equal timestamps);
//! 2. each step computes one derived column, or is skipped when any of its
//!    source columns is absent (nothing is fabricated);
//! 3. rows are restored newest first;
//! 4. every remaining `NaN` cell is replaced by `0.0`.
//!
//! The fill value is part of the contract with the trained model: the
//! model saw zeros wherever a rolling window was too short or a column was
//! missing, and must keep seeing them.

use crate::frame::Frame;
use log::debug;
use serde::{Deserialize, Serialize};

/// Value written into every missing cell after the derived columns exist.
pub const MISSING_FILL: f64 = 0.0;

/// Window length of the rolling statistics.
pub const ROLLING_WINDOW: usize = 5;

/// Minimum valid observations in a rolling window.
pub const ROLLING_MIN_PERIODS: usize = 1;

pub const MOTOR_RPM_COLUMNS: [&str; 4] = [
    "motor_rpm_1",
    "motor_rpm_2",
    "motor_rpm_3",
    "motor_rpm_4",
];
pub const MOTOR_TEMP_COLUMNS: [&str; 4] = [
    "motor_temp_1",
    "motor_temp_2",
    "motor_temp_3",
    "motor_temp_4",
];
pub const ALTITUDE_COLUMNS: [&str; 3] = ["altitude", "gps_alt", "lidar_altitude"];

/// One derived column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureStep {
    /// Sample standard deviation across columns, per row.
    RowStd { output: String, sources: Vec<String> },
    /// Mean across columns, per row.
    RowMean { output: String, sources: Vec<String> },
    /// Element-wise product of two columns.
    Product {
        output: String,
        left: String,
        right: String,
    },
    /// Trailing sample standard deviation over time-ordered rows.
    RollingStd {
        output: String,
        source: String,
        window: usize,
        min_periods: usize,
    },
}

impl FeatureStep {
    pub fn row_std(output: &str, sources: &[&str]) -> Self {
        FeatureStep::RowStd {
            output: output.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn row_mean(output: &str, sources: &[&str]) -> Self {
        FeatureStep::RowMean {
            output: output.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn product(output: &str, left: &str, right: &str) -> Self {
        FeatureStep::Product {
            output: output.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn rolling_std(output: &str, source: &str) -> Self {
        FeatureStep::RollingStd {
            output: output.to_string(),
            source: source.to_string(),
            window: ROLLING_WINDOW,
            min_periods: ROLLING_MIN_PERIODS,
        }
    }

    /// Name of the column this step produces.
    pub fn output(&self) -> &str {
        match self {
            FeatureStep::RowStd { output, .. }
            | FeatureStep::RowMean { output, .. }
            | FeatureStep::Product { output, .. }
            | FeatureStep::RollingStd { output, .. } => output,
        }
    }

    /// Columns this step reads.
    pub fn sources(&self) -> Vec<&str> {
        match self {
            FeatureStep::RowStd { sources, .. } | FeatureStep::RowMean { sources, .. } => {
                sources.iter().map(String::as_str).collect()
            }
            FeatureStep::Product { left, right, .. } => vec![left, right],
            FeatureStep::RollingStd { source, .. } => vec![source],
        }
    }

    /// Compute the column over `frame`, whose rows must be oldest first.
    ///
    /// Returns `None` when a source column is absent.
    pub fn compute(&self, frame: &Frame) -> Option<Vec<f64>> {
        if !frame.has_all(&self.sources()) {
            return None;
        }

        match self {
            FeatureStep::RowStd { sources, .. } => {
                let cols = columns(frame, sources)?;
                Some(row_wise(frame.len(), &cols, sample_std))
            }
            FeatureStep::RowMean { sources, .. } => {
                let cols = columns(frame, sources)?;
                Some(row_wise(frame.len(), &cols, mean))
            }
            FeatureStep::Product { left, right, .. } => {
                let l = frame.column(left)?;
                let r = frame.column(right)?;
                Some(l.iter().zip(r).map(|(a, b)| a * b).collect())
            }
            FeatureStep::RollingStd {
                source,
                window,
                min_periods,
                ..
            } => {
                let values = frame.column(source)?;
                Some(rolling_std(values, *window, *min_periods))
            }
        }
    }
}

fn columns<'a>(frame: &'a Frame, names: &[String]) -> Option<Vec<&'a [f64]>> {
    names.iter().map(|n| frame.column(n)).collect()
}

/// Apply `f` to the present cells of each row. Missing cells are skipped, so
/// a row keeps a value as long as enough of its sources reported.
fn row_wise(rows: usize, cols: &[&[f64]], f: fn(&[f64]) -> f64) -> Vec<f64> {
    let mut buf = Vec::with_capacity(cols.len());
    (0..rows)
        .map(|i| {
            buf.clear();
            buf.extend(cols.iter().map(|c| c[i]).filter(|v| !v.is_nan()));
            f(&buf)
        })
        .collect()
}

/// Arithmetic mean; `NaN` if any value is missing or the slice is empty.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
///
/// `NaN` for fewer than two values or if any value is missing.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (n - 1) as f64).sqrt()
}

/// Trailing rolling sample standard deviation.
///
/// Missing observations inside a window are skipped; windows with fewer
/// than `min_periods` valid observations (or fewer than two) yield `NaN`.
pub fn rolling_std(values: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut buf = Vec::with_capacity(window);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            buf.clear();
            buf.extend(values[start..=i].iter().copied().filter(|v| !v.is_nan()));
            if buf.len() < min_periods {
                f64::NAN
            } else {
                sample_std(&buf)
            }
        })
        .collect()
}

/// Output of the pipeline: rows newest first, no missing cells.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredFrame {
    frame: Frame,
    source_rows: Vec<usize>,
    derived: Vec<String>,
}

impl EngineeredFrame {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Row `k` of the engineered frame came from input row `source_rows()[k]`.
    pub fn source_rows(&self) -> &[usize] {
        &self.source_rows
    }

    /// Derived columns that were actually produced, in pipeline order.
    pub fn derived(&self) -> &[String] {
        &self.derived
    }

    pub fn is_derived(&self, name: &str) -> bool {
        self.derived.iter().any(|d| d == name)
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }
}

/// Ordered list of feature steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePipeline {
    steps: Vec<FeatureStep>,
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl FeaturePipeline {
    /// Pipeline with explicit steps.
    pub fn new(steps: Vec<FeatureStep>) -> Self {
        Self { steps }
    }

    /// The pipeline the shipped models are trained with.
    pub fn standard() -> Self {
        Self::new(vec![
            FeatureStep::row_std("motor_rpm_std", &MOTOR_RPM_COLUMNS),
            FeatureStep::row_mean("motor_rpm_mean", &MOTOR_RPM_COLUMNS),
            FeatureStep::row_std("motor_temp_std", &MOTOR_TEMP_COLUMNS),
            FeatureStep::row_std("alt_disagreement_std", &ALTITUDE_COLUMNS),
            FeatureStep::product("power_draw", "battery_voltage", "battery_current"),
            FeatureStep::rolling_std("roll_accel_z_std", "accel_z"),
            FeatureStep::rolling_std("roll_gyro_x_std", "gyro_x"),
        ])
    }

    pub fn steps(&self) -> &[FeatureStep] {
        &self.steps
    }

    /// Names of every column this pipeline can derive.
    pub fn outputs(&self) -> Vec<&str> {
        self.steps.iter().map(FeatureStep::output).collect()
    }

    /// Run the pipeline over a window in any row order.
    pub fn run(&self, frame: &Frame) -> EngineeredFrame {
        let ascending = frame.oldest_first_order();
        let mut work = frame.reorder(&ascending);
        let mut derived = Vec::new();

        for step in &self.steps {
            match step.compute(&work) {
                Some(values) => {
                    // Lengths always match: the step read columns of `work`.
                    if work.insert_column(step.output(), values).is_ok() {
                        derived.push(step.output().to_string());
                    }
                }
                None => debug!(
                    "Skipping {}: missing one of {:?}",
                    step.output(),
                    step.sources()
                ),
            }
        }

        let descending = work.newest_first_order();
        let mut out = work.reorder(&descending);
        out.fill_missing(MISSING_FILL);

        let source_rows = descending.iter().map(|&k| ascending[k]).collect();

        EngineeredFrame {
            frame: out,
            source_rows,
            derived,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn motor_frame() -> Frame {
        let mut f = Frame::new(vec![1, 2]);
        f.insert_column("motor_rpm_1", vec![1000.0, 5000.0]).unwrap();
        f.insert_column("motor_rpm_2", vec![2000.0, 0.0]).unwrap();
        f.insert_column("motor_rpm_3", vec![3000.0, 5000.0]).unwrap();
        f.insert_column("motor_rpm_4", vec![4000.0, 5000.0]).unwrap();
        f
    }

    #[test]
    fn test_sample_std() {
        assert_relative_eq!(sample_std(&[1.0, 2.0, 3.0, 4.0]), 1.2909944487358056);
        assert!(sample_std(&[1.0]).is_nan());
        assert!(sample_std(&[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn test_rolling_std_warm_up() {
        let out = rolling_std(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 5, 1);
        assert!(out[0].is_nan());
        assert_relative_eq!(out[1], 0.7071067811865476);
        assert_relative_eq!(out[4], 1.5811388300841898);
        // Window slides: 2..=6
        assert_relative_eq!(out[5], 1.5811388300841898);
    }

    #[test]
    fn test_rolling_std_skips_missing() {
        let out = rolling_std(&[1.0, f64::NAN, 3.0], 5, 1);
        assert!(out[1].is_nan());
        assert_relative_eq!(out[2], 1.4142135623730951);
    }

    #[test]
    fn test_rolling_std_min_periods() {
        let out = rolling_std(&[1.0, 2.0, 3.0], 5, 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_relative_eq!(out[2], 1.0);
    }

    #[test]
    fn test_motor_aggregates() {
        let eng = FeaturePipeline::standard().run(&motor_frame());
        // Newest first: row 0 is timestamp 2.
        let mean = eng.frame().column("motor_rpm_mean").unwrap();
        assert_relative_eq!(mean[0], 3750.0);
        assert_relative_eq!(mean[1], 2500.0);
        let std = eng.frame().column("motor_rpm_std").unwrap();
        assert_relative_eq!(std[0], 2500.0);
        assert!(eng.is_derived("motor_rpm_std"));
        assert!(!eng.is_derived("motor_temp_std"));
        assert!(!eng.frame().has_column("power_draw"));
    }

    #[test]
    fn test_newest_first_output() {
        let mut f = Frame::new(vec![10, 30, 20]);
        f.insert_column("accel_z", vec![0.1, 0.3, 0.2]).unwrap();
        let eng = FeaturePipeline::standard().run(&f);
        assert_eq!(eng.frame().timestamps(), &[30, 20, 10]);
        assert_eq!(eng.source_rows(), &[1, 2, 0]);
        assert_eq!(eng.frame().column("accel_z").unwrap(), &[0.3, 0.2, 0.1]);
    }

    #[test]
    fn test_rolling_follows_time_not_input_order() {
        let mut f = Frame::new(vec![3, 1, 2]);
        f.insert_column("gyro_x", vec![3.0, 1.0, 2.0]).unwrap();
        let eng = FeaturePipeline::standard().run(&f);
        let roll = eng.frame().column("roll_gyro_x_std").unwrap();
        // Rows newest first: t=3 sees [1,2,3], t=2 sees [1,2], t=1 sees [1].
        assert_relative_eq!(roll[0], 1.0);
        assert_relative_eq!(roll[1], 0.7071067811865476);
        assert_eq!(roll[2], MISSING_FILL);
    }

    #[test]
    fn test_missing_source_skips_step() {
        let mut f = Frame::new(vec![1, 2]);
        f.insert_column("altitude", vec![100.0, 110.0]).unwrap();
        f.insert_column("gps_alt", vec![101.0, 109.0]).unwrap();
        let eng = FeaturePipeline::standard().run(&f);
        assert!(!eng.frame().has_column("alt_disagreement_std"));
        assert!(eng.derived().is_empty());
    }

    #[test]
    fn test_row_std_skips_missing_source() {
        let mut f = Frame::new(vec![1, 2]);
        f.insert_column("altitude", vec![100.0, 100.0]).unwrap();
        f.insert_column("gps_alt", vec![110.0, 110.0]).unwrap();
        f.insert_column("lidar_altitude", vec![100.0, f64::NAN]).unwrap();
        let eng = FeaturePipeline::standard().run(&f);
        let std = eng.frame().column("alt_disagreement_std").unwrap();
        // Newest first: t=2 lacks lidar and uses the two remaining sources.
        assert_relative_eq!(std[0], 7.0710678118654755);
        assert_relative_eq!(std[1], 5.773502691896258);
    }

    #[test]
    fn test_row_aggregates_need_enough_values() {
        let mut f = Frame::new(vec![1]);
        f.insert_column("motor_rpm_1", vec![4000.0]).unwrap();
        for name in ["motor_rpm_2", "motor_rpm_3", "motor_rpm_4"] {
            f.insert_column(name, vec![f64::NAN]).unwrap();
        }
        let eng = FeaturePipeline::standard().run(&f);
        assert_eq!(eng.frame().column("motor_rpm_mean").unwrap(), &[4000.0]);
        assert_eq!(eng.frame().column("motor_rpm_std").unwrap(), &[MISSING_FILL]);
    }

    #[test]
    fn test_fill_covers_raw_columns() {
        let mut f = Frame::new(vec![1, 2]);
        f.insert_column("lidar_altitude", vec![f64::NAN, 5.0]).unwrap();
        let eng = FeaturePipeline::standard().run(&f);
        assert_eq!(eng.frame().column("lidar_altitude").unwrap(), &[5.0, 0.0]);
    }

    #[test]
    fn test_empty_window() {
        let eng = FeaturePipeline::standard().run(&Frame::new(Vec::new()));
        assert!(eng.is_empty());
        assert!(eng.source_rows().is_empty());
    }

    #[test]
    fn test_pipeline_serializes() {
        let json = serde_json::to_string(&FeaturePipeline::standard()).unwrap();
        assert!(json.contains("\"kind\":\"rolling_std\""));
        let back: FeaturePipeline = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FeaturePipeline::standard());
    }
}
