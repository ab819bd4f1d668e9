//! Columnar view over a window of telemetry.
//!
//! A [`Frame`] holds one timestamp per row plus named numeric columns.
//! Columns are optional: a column exists only when at least one row
//! carries a value for it. Missing cells are stored as `NaN` until the
//! feature pipeline fills them.

use crate::error::FeatureError;
use crate::record::{TelemetryRecord, CATEGORICAL_COLUMNS};
use std::collections::{BTreeMap, BTreeSet};

/// Window of rows stored column by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    timestamps: Vec<i64>,
    columns: BTreeMap<String, Vec<f64>>,
    categorical: BTreeSet<String>,
}

impl Frame {
    /// Create a frame with the given row timestamps and no columns.
    pub fn new(timestamps: Vec<i64>) -> Self {
        Self {
            timestamps,
            columns: BTreeMap::new(),
            categorical: BTreeSet::new(),
        }
    }

    /// Build a frame from records, keeping their order.
    pub fn from_records(records: &[TelemetryRecord]) -> Self {
        let mut frame = Frame::new(records.iter().map(|r| r.timestamp).collect());

        for name in CATEGORICAL_COLUMNS {
            frame.categorical.insert(name.to_string());
        }

        if records.is_empty() {
            return frame;
        }

        let mut columns: BTreeMap<&'static str, Vec<Option<f64>>> = BTreeMap::new();
        for record in records {
            for (name, value) in record.numeric_channels() {
                columns
                    .entry(name)
                    .or_insert_with(|| Vec::with_capacity(records.len()))
                    .push(value);
            }
        }

        for (name, values) in columns {
            if values.iter().any(Option::is_some) {
                frame.columns.insert(
                    name.to_string(),
                    values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
                );
            }
        }

        frame
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Whether every named column is present.
    pub fn has_all(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.has_column(n))
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Numeric column names in lexical order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Insert or replace a numeric column.
    pub fn insert_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), FeatureError> {
        if values.len() != self.len() {
            return Err(FeatureError::WidthMismatch {
                stage: "frame",
                expected: self.len(),
                actual: values.len(),
            });
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    /// Remove a numeric column, returning its values.
    pub fn remove_column(&mut self, name: &str) -> Option<Vec<f64>> {
        self.columns.remove(name)
    }

    /// Declare a column name as text-valued.
    pub fn mark_categorical(&mut self, name: &str) {
        self.categorical.insert(name.to_string());
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.categorical.contains(name)
    }

    /// Row indices sorted by timestamp, oldest first. Ties keep input order.
    pub fn oldest_first_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.timestamps[i]);
        order
    }

    /// Row indices sorted by timestamp, newest first. Ties keep input order.
    pub fn newest_first_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.timestamps[i]));
        order
    }

    /// New frame whose row `k` is row `order[k]` of this frame.
    pub fn reorder(&self, order: &[usize]) -> Frame {
        let timestamps = order.iter().map(|&i| self.timestamps[i]).collect();
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| (name.clone(), order.iter().map(|&i| values[i]).collect()))
            .collect();

        Frame {
            timestamps,
            columns,
            categorical: self.categorical.clone(),
        }
    }

    /// Replace every `NaN` cell with `value`.
    pub fn fill_missing(&mut self, value: f64) {
        for values in self.columns.values_mut() {
            for v in values.iter_mut() {
                if v.is_nan() {
                    *v = value;
                }
            }
        }
    }

    /// Count of `NaN` cells across all columns.
    pub fn missing_count(&self) -> usize {
        self.columns
            .values()
            .map(|values| values.iter().filter(|v| v.is_nan()).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record_at(ts: i64) -> TelemetryRecord {
        let time = Utc.timestamp_opt(ts, 0).unwrap();
        TelemetryRecord::grounded(time, "M001")
    }

    #[test]
    fn test_from_records_keeps_order() {
        let records = vec![record_at(30), record_at(10), record_at(20)];
        let frame = Frame::from_records(&records);
        assert_eq!(frame.timestamps(), &[30, 10, 20]);
        assert_eq!(frame.len(), 3);
        assert!(frame.has_all(&["motor_rpm_1", "altitude", "gps_alt"]));
        assert!(frame.is_categorical("mode"));
    }

    #[test]
    fn test_absent_sensor_drops_column() {
        let mut records = vec![record_at(1), record_at(2)];
        for r in &mut records {
            r.lidar_altitude = None;
        }
        let frame = Frame::from_records(&records);
        assert!(!frame.has_column("lidar_altitude"));
        assert!(frame.has_column("altitude"));
    }

    #[test]
    fn test_partially_missing_sensor_is_nan() {
        let mut records = vec![record_at(1), record_at(2)];
        records[1].gps_alt = None;
        let frame = Frame::from_records(&records);
        let col = frame.column("gps_alt").unwrap();
        assert_eq!(col[0], 0.0);
        assert!(col[1].is_nan());
        assert_eq!(frame.missing_count(), 1);
    }

    #[test]
    fn test_ordering_is_stable() {
        let frame = Frame::new(vec![5, 3, 5, 1]);
        assert_eq!(frame.oldest_first_order(), vec![3, 1, 0, 2]);
        assert_eq!(frame.newest_first_order(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_reorder_moves_columns() {
        let mut frame = Frame::new(vec![1, 2, 3]);
        frame.insert_column("x", vec![10.0, 20.0, 30.0]).unwrap();
        let reordered = frame.reorder(&[2, 0, 1]);
        assert_eq!(reordered.timestamps(), &[3, 1, 2]);
        assert_eq!(reordered.column("x").unwrap(), &[30.0, 10.0, 20.0]);
    }

    #[test]
    fn test_insert_rejects_wrong_length() {
        let mut frame = Frame::new(vec![1, 2]);
        assert!(frame.insert_column("x", vec![1.0]).is_err());
    }

    #[test]
    fn test_fill_missing() {
        let mut frame = Frame::new(vec![1, 2]);
        frame.insert_column("x", vec![f64::NAN, 2.0]).unwrap();
        frame.fill_missing(0.0);
        assert_eq!(frame.column("x").unwrap(), &[0.0, 2.0]);
        assert_eq!(frame.missing_count(), 0);
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::from_records(&[]);
        assert!(frame.is_empty());
        assert_eq!(frame.column_names().count(), 0);
    }
}
