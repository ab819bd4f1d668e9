// UAVWatch Sim - Batch datasets
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Offline batch generation and CSV import/export.
//!
//! A batch is a sequence of complete flight cycles. Each cycle is a fresh
//! mission from the ground, offset slightly in position and time from the
//! previous one, and anomalies are spread over the whole batch by a
//! [`RateController`](crate::injector::RateController) so the realized
//! count lands close to the requested ratio.

use crate::flight::{FlightSimulator, MissionProfile};
use crate::injector::{AnomalyInjector, InjectorConfig};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::info;
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use uavwatch::TelemetryRecord;

/// Degrees added to latitude and longitude for each successive cycle.
pub const CYCLE_POSITION_OFFSET: f64 = 0.02;

/// Minutes between cycle start times.
pub const CYCLE_SPACING_MINUTES: i64 = 10;

/// Default start of the first cycle (2024-01-01T00:00:00Z).
const DEFAULT_START: i64 = 1_704_067_200;

/// Dataset error types.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty dataset")]
    Empty,
}

/// Batch generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Complete flight cycles to generate.
    pub cycles: usize,
    /// Point budget per cycle.
    pub points_per_cycle: usize,
    /// Fraction of all points that should carry an anomaly.
    pub anomaly_ratio: f64,
    pub seed: u64,
    /// Start of the first cycle.
    pub start_time: DateTime<Utc>,
    pub injector: InjectorConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            cycles: 30,
            points_per_cycle: 600,
            anomaly_ratio: 0.20,
            seed: 42,
            start_time: Utc.timestamp_opt(DEFAULT_START, 0).single().unwrap_or_default(),
            injector: InjectorConfig::batch(),
        }
    }
}

impl BatchConfig {
    pub fn with_cycles(mut self, cycles: usize) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn with_points_per_cycle(mut self, points: usize) -> Self {
        self.points_per_cycle = points;
        self
    }

    pub fn with_anomaly_ratio(mut self, ratio: f64) -> Self {
        self.anomaly_ratio = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = start;
        self
    }

    /// Total point budget of the batch.
    pub fn total_points(&self) -> usize {
        self.cycles * self.points_per_cycle
    }
}

/// Outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_rows: usize,
    pub cycles: usize,
    pub target_anomalies: usize,
    pub actual_anomalies: usize,
    /// Injected anomalies over total rows.
    pub anomaly_ratio: f64,
    /// Injected anomalies per event tag.
    pub distribution: BTreeMap<String, usize>,
    pub max_altitude: f64,
}

impl BatchSummary {
    pub fn to_json(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// Records of a generated batch, in generation order.
#[derive(Debug, Clone)]
pub struct BatchDataset {
    records: Vec<TelemetryRecord>,
    summary: BatchSummary,
}

impl BatchDataset {
    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TelemetryRecord> {
        self.records
    }

    pub fn summary(&self) -> &BatchSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Export to a CSV file with one column per record field.
    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let file = File::create(path)?;
        write_csv(BufWriter::new(file), &self.records)
    }
}

/// Write records as CSV with a header row. Absent sensors are empty cells.
pub fn write_csv<W: Write>(writer: W, records: &[TelemetryRecord]) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read records from a CSV file written by [`write_csv`].
pub fn read_csv(path: impl AsRef<Path>) -> Result<Vec<TelemetryRecord>, DatasetError> {
    let file = File::open(path)?;
    read_csv_from(BufReader::new(file))
}

pub fn read_csv_from<R: Read>(reader: R) -> Result<Vec<TelemetryRecord>, DatasetError> {
    let mut reader = csv::Reader::from_reader(reader);
    let records = reader
        .deserialize()
        .collect::<Result<Vec<TelemetryRecord>, csv::Error>>()?;
    if records.is_empty() {
        return Err(DatasetError::Empty);
    }
    Ok(records)
}

/// Generate a complete batch. The same config always yields the same batch.
pub fn generate_batch(config: &BatchConfig) -> BatchDataset {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let profile = MissionProfile::batch(config.points_per_cycle);
    let total = config.total_points();
    let mut injector =
        AnomalyInjector::batch(config.injector.clone(), total, config.anomaly_ratio);
    let target = injector.target().unwrap_or(0);

    info!(
        "Generating {} cycles x {} points, target {} anomalies",
        config.cycles, config.points_per_cycle, target
    );

    let mut records = Vec::with_capacity(total);
    let mut distribution = BTreeMap::new();

    for cycle in 1..=config.cycles {
        let index = (cycle - 1) as i64;
        let start = config.start_time + Duration::minutes(CYCLE_SPACING_MINUTES * index);
        let mut template = TelemetryRecord::grounded(start, &format!("M{:03}", cycle));
        template.gps_lat += index as f64 * CYCLE_POSITION_OFFSET;
        template.gps_lon += index as f64 * CYCLE_POSITION_OFFSET;

        let mut sim = FlightSimulator::resume(profile.clone(), template, &mut rng);
        for point in 0..config.points_per_cycle {
            if sim.is_dwell_complete() {
                break;
            }
            let mut record = sim.step(start + Duration::seconds(point as i64), &mut rng);
            if injector.maybe_inject(&mut record, &mut rng).is_some() {
                *distribution.entry(record.event.clone()).or_insert(0) += 1;
            }
            records.push(record);
        }
        info!("Cycle {}/{} complete, {} rows so far", cycle, config.cycles, records.len());
    }

    let actual = injector.injected();
    let summary = BatchSummary {
        total_rows: records.len(),
        cycles: config.cycles,
        target_anomalies: target,
        actual_anomalies: actual,
        anomaly_ratio: if records.is_empty() {
            0.0
        } else {
            actual as f64 / records.len() as f64
        },
        distribution,
        max_altitude: records.iter().map(|r| r.altitude).fold(0.0, f64::max),
    };

    BatchDataset { records, summary }
}
