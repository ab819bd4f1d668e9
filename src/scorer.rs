//! Anomaly scoring.
//!
//! Aligns an [`EngineeredFrame`] to the model's [`FeatureSet`], applies the
//! frozen scaler and classifier, and returns one [`Verdict`] per row.

use crate::error::FeatureError;
use crate::features::{EngineeredFrame, FeaturePipeline};
use crate::frame::Frame;
use crate::model::{FeatureSet, ModelBundle, OUTLIER};
use crate::record::{ScoredRecord, TelemetryRecord};
use log::warn;
use nalgebra::DMatrix;
use std::sync::Arc;

/// Classification of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    /// Index of the row in the window handed to the pipeline.
    pub row: usize,
    pub timestamp: i64,
    pub is_anomaly: bool,
    /// Negated decision value: positive exactly when flagged.
    pub anomaly_score: f64,
}

/// Feature matrix in [`FeatureSet`] order.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub matrix: DMatrix<f64>,
    /// Feature names absent from the frame and filled with zero.
    pub defaulted: Vec<String>,
}

/// Select and order columns of `frame` per `features`.
///
/// Absent columns become zero. Naming a categorical column, or meeting a
/// non-finite value, is an error.
pub fn align(frame: &Frame, features: &FeatureSet) -> Result<Alignment, FeatureError> {
    let categorical: Vec<String> = features
        .names()
        .iter()
        .filter(|n| frame.is_categorical(n))
        .cloned()
        .collect();
    if !categorical.is_empty() {
        return Err(FeatureError::NonNumeric {
            stage: "align",
            columns: categorical,
        });
    }

    let rows = frame.len();
    let mut matrix = DMatrix::<f64>::zeros(rows, features.len());
    let mut defaulted = Vec::new();

    for (j, name) in features.names().iter().enumerate() {
        let Some(values) = frame.column(name) else {
            defaulted.push(name.clone());
            continue;
        };
        for (i, &v) in values.iter().enumerate() {
            if !v.is_finite() {
                return Err(FeatureError::NonFinite {
                    stage: "align",
                    column: name.clone(),
                    row: i,
                });
            }
            matrix[(i, j)] = v;
        }
    }

    Ok(Alignment { matrix, defaulted })
}

/// Stateless scorer over a shared model bundle.
#[derive(Debug, Clone)]
pub struct Scorer {
    bundle: Arc<ModelBundle>,
    pipeline: FeaturePipeline,
}

impl Scorer {
    /// Scorer using the standard feature pipeline.
    pub fn new(bundle: Arc<ModelBundle>) -> Self {
        Self::with_pipeline(bundle, FeaturePipeline::standard())
    }

    pub fn with_pipeline(bundle: Arc<ModelBundle>, pipeline: FeaturePipeline) -> Self {
        Self { bundle, pipeline }
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    /// Verdicts for every row of `engineered`, newest first.
    pub fn score(&self, engineered: &EngineeredFrame) -> Result<Vec<Verdict>, FeatureError> {
        if engineered.is_empty() {
            return Ok(Vec::new());
        }

        let features = self.bundle.features();
        let aligned = align(engineered.frame(), features)?;
        if !aligned.defaulted.is_empty() {
            warn!(
                "Features missing from window, defaulted to 0: {:?}",
                aligned.defaulted
            );
        }

        let scaled = self.bundle.scaler().transform(&aligned.matrix)?;
        let classifier = self.bundle.classifier();
        let labels = classifier.predict(&scaled)?;
        let decision = classifier.decision_function(&scaled)?;

        let timestamps = engineered.frame().timestamps();
        Ok(engineered
            .source_rows()
            .iter()
            .zip(labels.into_iter().zip(decision))
            .enumerate()
            .map(|(k, (&row, (label, d)))| Verdict {
                row,
                timestamp: timestamps[k],
                is_anomaly: label == OUTLIER,
                anomaly_score: -d,
            })
            .collect())
    }

    /// Engineer and score a window of records, returning them newest first
    /// with their own verdicts attached.
    pub fn score_records(
        &self,
        records: &[TelemetryRecord],
    ) -> Result<Vec<ScoredRecord>, FeatureError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let engineered = self.pipeline.run(&Frame::from_records(records));
        let verdicts = self.score(&engineered)?;

        Ok(verdicts
            .into_iter()
            .map(|v| ScoredRecord {
                record: records[v.row].clone(),
                is_anomaly: u8::from(v.is_anomaly),
                anomaly_score: v.anomaly_score,
            })
            .collect())
    }
}
