// UAVWatch Server - Offline training
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fit model artifacts from a batch CSV.
//!
//! The whole stream is engineered first so rolling features see the same
//! history they see at serving time; only then are anomalous rows dropped.

use crate::error::ServerError;
use nalgebra::DMatrix;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use uavwatch::scorer::align;
use uavwatch::{FeaturePipeline, FeatureSet, Frame, LofParams, ModelBundle, TelemetryRecord};
use uavwatch_sim::read_csv;

/// Trainer options.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub csv: PathBuf,
    pub model_dir: PathBuf,
    /// Upper bound on training rows after subsampling.
    pub max_samples: usize,
    pub n_neighbors: usize,
    pub contamination: Option<f64>,
}

impl TrainOptions {
    pub fn new(csv: impl Into<PathBuf>, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            csv: csv.into(),
            model_dir: model_dir.into(),
            max_samples: 5000,
            n_neighbors: 20,
            contamination: None,
        }
    }
}

/// What a training run used.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    pub total_rows: usize,
    pub nominal_rows: usize,
    pub training_rows: usize,
    pub features: usize,
}

/// Train from `options.csv` and write artifacts to `options.model_dir`.
pub fn run(options: &TrainOptions) -> Result<TrainReport, ServerError> {
    let records = read_csv(&options.csv)?;
    info!("Loaded {} rows from {}", records.len(), options.csv.display());
    let (bundle, report) = fit(&records, options)?;
    bundle.save(&options.model_dir)?;
    info!(
        "Saved {} features to {}",
        report.features,
        options.model_dir.display()
    );
    Ok(report)
}

/// Engineer, keep nominal rows, subsample, fit.
pub fn fit(
    records: &[TelemetryRecord],
    options: &TrainOptions,
) -> Result<(ModelBundle, TrainReport), ServerError> {
    let features = FeatureSet::standard();
    let engineered = FeaturePipeline::standard().run(&Frame::from_records(records));
    let aligned = align(engineered.frame(), &features)?;
    if !aligned.defaulted.is_empty() {
        warn!("Training columns filled with zero: {:?}", aligned.defaulted);
    }

    let nominal: Vec<usize> = engineered
        .source_rows()
        .iter()
        .enumerate()
        .filter(|(_, &source)| !records[source].has_event())
        .map(|(row, _)| row)
        .collect();
    if nominal.is_empty() {
        return Err(ServerError::NoTrainingRows);
    }

    let cap = options.max_samples.max(1);
    let stride = (nominal.len() + cap - 1) / cap;
    let selected: Vec<usize> = nominal.iter().copied().step_by(stride).collect();
    info!(
        "Training on {} of {} nominal rows (stride {})",
        selected.len(),
        nominal.len(),
        stride
    );

    let x = DMatrix::from_fn(selected.len(), features.len(), |i, j| {
        aligned.matrix[(selected[i], j)]
    });

    let mut params = LofParams::default().with_neighbors(options.n_neighbors);
    if let Some(c) = options.contamination {
        params = params.with_contamination(c);
    }
    let report = TrainReport {
        total_rows: records.len(),
        nominal_rows: nominal.len(),
        training_rows: selected.len(),
        features: features.len(),
    };
    let bundle = ModelBundle::fit(features, &x, &params)?;
    Ok((bundle, report))
}
