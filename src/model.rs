//! Trained-model artifacts.
//!
//! A [`ModelBundle`] holds the ordered [`FeatureSet`], a fitted
//! [`StandardScaler`] and a fitted novelty classifier. It is loaded once at
//! startup, validated, and then shared read-only (wrap it in an `Arc`).
//!
//! Artifacts live as three JSON files in one directory:
//!
//! | file                 | content                                   |
//! |----------------------|-------------------------------------------|
//! | `feature_names.json` | ordered list of column names              |
//! | `scaler.json`        | `{"mean": [...], "scale": [...]}`         |
//! | `classifier.json`    | `{"type": "local_outlier_factor", ...}`   |

use crate::error::{ConfigError, FeatureError, Result};
use crate::features::FeaturePipeline;
use nalgebra::DMatrix;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

pub const FEATURES_FILE: &str = "feature_names.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";

/// Prediction sentinel for an outlier.
pub const OUTLIER: i8 = -1;
/// Prediction sentinel for an inlier.
pub const INLIER: i8 = 1;

/// Raw numeric channels the shipped models are trained on.
pub const TRAINING_CHANNELS: [&str; 35] = [
    "altitude",
    "gps_alt",
    "ground_speed",
    "airspeed",
    "vertical_speed",
    "heading",
    "pitch",
    "roll",
    "yaw",
    "accel_x",
    "accel_y",
    "accel_z",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "battery_level",
    "battery_voltage",
    "battery_current",
    "temperature_battery",
    "motor_rpm_1",
    "motor_rpm_2",
    "motor_rpm_3",
    "motor_rpm_4",
    "motor_temp_1",
    "motor_temp_2",
    "motor_temp_3",
    "motor_temp_4",
    "throttle_position",
    "payload_weight",
    "lidar_altitude",
    "obstacle_distance",
    "sat_count",
    "gps_fix_type",
    "link_quality",
    "signal_strength",
];

/// Ordered list of columns a model was trained on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FeatureSet {
    names: Vec<String>,
}

impl FeatureSet {
    /// Validate and wrap a list of names.
    pub fn new<I, S>(names: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(ConfigError::EmptyFeatureSet);
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateFeature(name.clone()));
            }
        }
        Ok(Self { names })
    }

    /// Training channels followed by every column of the standard pipeline.
    pub fn standard() -> Self {
        let names = TRAINING_CHANNELS
            .iter()
            .map(|s| s.to_string())
            .chain(
                FeaturePipeline::standard()
                    .outputs()
                    .into_iter()
                    .map(String::from),
            )
            .collect();
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

impl<'de> Deserialize<'de> for FeatureSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let names = Vec::<String>::deserialize(deserializer)?;
        FeatureSet::new(names).map_err(serde::de::Error::custom)
    }
}

/// Affine per-feature transform with frozen parameters.
pub trait FeatureScaler: fmt::Debug + Send + Sync {
    /// Width the scaler was fitted on.
    fn n_features(&self) -> usize;

    fn transform(&self, x: &DMatrix<f64>) -> std::result::Result<DMatrix<f64>, FeatureError>;
}

/// Binary novelty classifier.
///
/// Decision values are negative for outliers.
pub trait NoveltyClassifier: fmt::Debug + Send + Sync {
    /// Width the classifier was fitted on.
    fn n_features(&self) -> usize;

    /// Continuous separation score per row.
    fn decision_function(&self, x: &DMatrix<f64>) -> std::result::Result<Vec<f64>, FeatureError>;

    /// [`OUTLIER`] or [`INLIER`] per row.
    fn predict(&self, x: &DMatrix<f64>) -> std::result::Result<Vec<i8>, FeatureError> {
        Ok(self
            .decision_function(x)?
            .into_iter()
            .map(classify)
            .collect())
    }
}

/// Sentinel for one decision value.
pub fn classify(decision: f64) -> i8 {
    if decision < 0.0 {
        OUTLIER
    } else {
        INLIER
    }
}

fn check_width(
    stage: &'static str,
    expected: usize,
    x: &DMatrix<f64>,
) -> std::result::Result<(), FeatureError> {
    if x.ncols() != expected {
        return Err(FeatureError::WidthMismatch {
            stage,
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}

/// `(x - mean) / scale`, per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on the rows of `x` (population standard deviation).
    pub fn fit(x: &DMatrix<f64>) -> std::result::Result<Self, ConfigError> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ConfigError::InvalidParameter(
                "cannot fit a scaler on an empty matrix".into(),
            ));
        }

        let n = x.nrows() as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());

        for column in x.column_iter() {
            let m = column.sum() / n;
            let var = column.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            mean.push(m);
            scale.push(Self::guard_scale(var.sqrt()));
        }

        Ok(Self { mean, scale })
    }

    fn guard_scale(s: f64) -> f64 {
        if s == 0.0 || !s.is_finite() {
            1.0
        } else {
            s
        }
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.mean.len() != self.scale.len() {
            return Err(ConfigError::DimensionMismatch {
                component: "scaler scale",
                expected: self.mean.len(),
                actual: self.scale.len(),
            });
        }
        if self.mean.iter().chain(&self.scale).any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidParameter(
                "scaler parameters must be finite".into(),
            ));
        }
        Ok(())
    }
}

impl FeatureScaler for StandardScaler {
    fn n_features(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, x: &DMatrix<f64>) -> std::result::Result<DMatrix<f64>, FeatureError> {
        check_width("scale", self.n_features(), x)?;
        Ok(DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
            (x[(i, j)] - self.mean[j]) / Self::guard_scale(self.scale[j])
        }))
    }
}

/// Parameters for fitting a [`LocalOutlierFactor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LofParams {
    pub n_neighbors: usize,
    /// Expected outlier share of the training data; `None` uses a fixed
    /// offset of [`LocalOutlierFactor::DEFAULT_OFFSET`].
    pub contamination: Option<f64>,
}

impl Default for LofParams {
    fn default() -> Self {
        Self {
            n_neighbors: 20,
            contamination: None,
        }
    }
}

impl LofParams {
    pub fn with_neighbors(mut self, k: usize) -> Self {
        self.n_neighbors = k;
        self
    }

    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = Some(contamination);
        self
    }
}

/// Local outlier factor in novelty mode.
///
/// Keeps the training points with their k-distance and local reachability
/// density; queries are compared against those frozen values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOutlierFactor {
    pub n_neighbors: usize,
    pub offset: f64,
    pub training: Vec<Vec<f64>>,
    pub k_distance: Vec<f64>,
    pub lrd: Vec<f64>,
}

impl LocalOutlierFactor {
    /// Offset used when no contamination is given.
    pub const DEFAULT_OFFSET: f64 = -1.5;

    const LRD_EPSILON: f64 = 1e-10;

    /// Fit on already-scaled rows.
    pub fn fit(x: &DMatrix<f64>, params: &LofParams) -> std::result::Result<Self, ConfigError> {
        let n = x.nrows();
        if n < 2 {
            return Err(ConfigError::InvalidParameter(format!(
                "local outlier factor needs at least 2 samples, got {}",
                n
            )));
        }
        if params.n_neighbors == 0 {
            return Err(ConfigError::InvalidParameter(
                "n_neighbors must be positive".into(),
            ));
        }
        if let Some(c) = params.contamination {
            if !(c > 0.0 && c <= 0.5) {
                return Err(ConfigError::InvalidParameter(format!(
                    "contamination must be in (0, 0.5], got {}",
                    c
                )));
            }
        }

        let k = params.n_neighbors.min(n - 1);
        let training: Vec<Vec<f64>> = (0..n).map(|i| row(x, i)).collect();

        let neighbours: Vec<Vec<(f64, usize)>> = (0..n)
            .map(|i| nearest(&training, &training[i], k, Some(i)))
            .collect();

        let k_distance: Vec<f64> = neighbours
            .iter()
            .map(|nb| nb.last().map(|(d, _)| *d).unwrap_or(0.0))
            .collect();

        let lrd: Vec<f64> = neighbours
            .iter()
            .map(|nb| local_reachability(nb, &k_distance))
            .collect();

        let offset = match params.contamination {
            None => Self::DEFAULT_OFFSET,
            Some(c) => {
                let mut scores: Vec<f64> = neighbours
                    .iter()
                    .zip(&lrd)
                    .map(|(nb, &own)| outlier_score(nb, &lrd, own))
                    .collect();
                scores.sort_by(f64::total_cmp);
                percentile(&scores, 100.0 * c)
            }
        };

        Ok(Self {
            n_neighbors: k,
            offset,
            training,
            k_distance,
            lrd,
        })
    }

    /// Negated local outlier factor; lower is more abnormal.
    pub fn score_samples(&self, x: &DMatrix<f64>) -> std::result::Result<Vec<f64>, FeatureError> {
        check_width("classify", self.n_features(), x)?;
        Ok((0..x.nrows())
            .map(|i| {
                let query = row(x, i);
                let nb = nearest(&self.training, &query, self.n_neighbors, None);
                let own = local_reachability(&nb, &self.k_distance);
                outlier_score(&nb, &self.lrd, own)
            })
            .collect())
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let n = self.training.len();
        if n == 0 {
            return Err(ConfigError::InvalidParameter(
                "classifier has no training points".into(),
            ));
        }
        if self.n_neighbors == 0 || self.n_neighbors > n {
            return Err(ConfigError::InvalidParameter(format!(
                "n_neighbors {} outside 1..={}",
                self.n_neighbors, n
            )));
        }
        for (component, len) in [
            ("classifier k_distance", self.k_distance.len()),
            ("classifier lrd", self.lrd.len()),
        ] {
            if len != n {
                return Err(ConfigError::DimensionMismatch {
                    component,
                    expected: n,
                    actual: len,
                });
            }
        }
        let width = self.training[0].len();
        if let Some(bad) = self.training.iter().find(|r| r.len() != width) {
            return Err(ConfigError::DimensionMismatch {
                component: "classifier training row",
                expected: width,
                actual: bad.len(),
            });
        }
        Ok(())
    }
}

impl NoveltyClassifier for LocalOutlierFactor {
    fn n_features(&self) -> usize {
        self.training.first().map(Vec::len).unwrap_or(0)
    }

    fn decision_function(&self, x: &DMatrix<f64>) -> std::result::Result<Vec<f64>, FeatureError> {
        Ok(self
            .score_samples(x)?
            .into_iter()
            .map(|s| s - self.offset)
            .collect())
    }
}

fn row(x: &DMatrix<f64>, i: usize) -> Vec<f64> {
    x.row(i).iter().copied().collect()
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p - q).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// `k` nearest points as `(distance, index)`, closest first. Ties break on
/// index so results do not depend on sort stability.
fn nearest(points: &[Vec<f64>], query: &[f64], k: usize, skip: Option<usize>) -> Vec<(f64, usize)> {
    let mut all: Vec<(f64, usize)> = points
        .iter()
        .enumerate()
        .filter(|(j, _)| Some(*j) != skip)
        .map(|(j, p)| (euclidean(query, p), j))
        .collect();
    all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    all.truncate(k);
    all
}

fn local_reachability(neighbours: &[(f64, usize)], k_distance: &[f64]) -> f64 {
    if neighbours.is_empty() {
        return 1.0 / LocalOutlierFactor::LRD_EPSILON;
    }
    let mean_reach = neighbours
        .iter()
        .map(|&(d, j)| d.max(k_distance[j]))
        .sum::<f64>()
        / neighbours.len() as f64;
    1.0 / (mean_reach + LocalOutlierFactor::LRD_EPSILON)
}

fn outlier_score(neighbours: &[(f64, usize)], lrd: &[f64], own: f64) -> f64 {
    if neighbours.is_empty() {
        return -1.0;
    }
    let mean_lrd = neighbours.iter().map(|&(_, j)| lrd[j]).sum::<f64>() / neighbours.len() as f64;
    -mean_lrd / own
}

/// Linear-interpolated percentile of sorted values, `p` in `[0, 100]`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Serialized classifier, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    LocalOutlierFactor(LocalOutlierFactor),
}

impl ClassifierArtifact {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        match self {
            ClassifierArtifact::LocalOutlierFactor(lof) => lof.validate(),
        }
    }
}

impl NoveltyClassifier for ClassifierArtifact {
    fn n_features(&self) -> usize {
        match self {
            ClassifierArtifact::LocalOutlierFactor(lof) => lof.n_features(),
        }
    }

    fn decision_function(&self, x: &DMatrix<f64>) -> std::result::Result<Vec<f64>, FeatureError> {
        match self {
            ClassifierArtifact::LocalOutlierFactor(lof) => lof.decision_function(x),
        }
    }

    fn predict(&self, x: &DMatrix<f64>) -> std::result::Result<Vec<i8>, FeatureError> {
        match self {
            ClassifierArtifact::LocalOutlierFactor(lof) => lof.predict(x),
        }
    }
}

/// Feature set, scaler and classifier, validated together.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle {
    features: FeatureSet,
    scaler: StandardScaler,
    classifier: ClassifierArtifact,
}

impl ModelBundle {
    /// Assemble a bundle, checking that all widths agree.
    pub fn new(
        features: FeatureSet,
        scaler: StandardScaler,
        classifier: ClassifierArtifact,
    ) -> std::result::Result<Self, ConfigError> {
        scaler.validate()?;
        classifier.validate()?;

        let expected = features.len();
        if scaler.n_features() != expected {
            return Err(ConfigError::DimensionMismatch {
                component: "scaler",
                expected: scaler.n_features(),
                actual: expected,
            });
        }
        if classifier.n_features() != expected {
            return Err(ConfigError::DimensionMismatch {
                component: "classifier",
                expected: classifier.n_features(),
                actual: expected,
            });
        }

        Ok(Self {
            features,
            scaler,
            classifier,
        })
    }

    /// Fit a scaler and a local outlier factor on raw (unscaled) rows whose
    /// columns follow `features`.
    pub fn fit(
        features: FeatureSet,
        x: &DMatrix<f64>,
        params: &LofParams,
    ) -> std::result::Result<Self, ConfigError> {
        if x.ncols() != features.len() {
            return Err(ConfigError::DimensionMismatch {
                component: "training matrix",
                expected: x.ncols(),
                actual: features.len(),
            });
        }
        let scaler = StandardScaler::fit(x)?;
        let scaled = scaler
            .transform(x)
            .map_err(|e| ConfigError::InvalidParameter(e.to_string()))?;
        let lof = LocalOutlierFactor::fit(&scaled, params)?;
        Self::new(features, scaler, ClassifierArtifact::LocalOutlierFactor(lof))
    }

    /// Load and validate the three artifacts from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let features: FeatureSet = read_artifact(&dir.join(FEATURES_FILE))?;
        let scaler: StandardScaler = read_artifact(&dir.join(SCALER_FILE))?;
        let classifier: ClassifierArtifact = read_artifact(&dir.join(CLASSIFIER_FILE))?;
        Self::new(features, scaler, classifier)
    }

    /// Write the three artifacts into `dir`, creating it if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        fs::write(dir.join(FEATURES_FILE), serde_json::to_vec_pretty(&self.features)?)?;
        fs::write(dir.join(SCALER_FILE), serde_json::to_vec(&self.scaler)?)?;
        fs::write(dir.join(CLASSIFIER_FILE), serde_json::to_vec(&self.classifier)?)?;
        Ok(())
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn scaler(&self) -> &dyn FeatureScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &dyn NoveltyClassifier {
        &self.classifier
    }
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> std::result::Result<T, ConfigError> {
    let display = path.display().to_string();
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::MissingArtifact {
            path: display.clone(),
        },
        _ => ConfigError::MalformedArtifact {
            path: display.clone(),
            reason: e.to_string(),
        },
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ConfigError::MalformedArtifact {
        path: display,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> DMatrix<f64> {
        // 5 x 5 lattice in the unit square
        DMatrix::from_fn(25, 2, |i, j| {
            if j == 0 {
                (i % 5) as f64 * 0.25
            } else {
                (i / 5) as f64 * 0.25
            }
        })
    }

    #[test]
    fn test_feature_set_validation() {
        assert!(matches!(
            FeatureSet::new(Vec::<String>::new()),
            Err(ConfigError::EmptyFeatureSet)
        ));
        assert!(matches!(
            FeatureSet::new(["a", "b", "a"]),
            Err(ConfigError::DuplicateFeature(name)) if name == "a"
        ));
        let set = FeatureSet::new(["a", "b"]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("b"));
    }

    #[test]
    fn test_standard_feature_set() {
        let set = FeatureSet::standard();
        assert_eq!(set.len(), 42);
        assert_eq!(set.names()[0], "altitude");
        assert_eq!(set.names()[41], "roll_gyro_x_std");
        assert!(!set.contains("mode"));
    }

    #[test]
    fn test_scaler_fit_transform() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 5.0, 2.0, 5.0, 3.0, 5.0]);
        let scaler = StandardScaler::fit(&x).unwrap();
        assert_relative_eq!(scaler.mean[0], 2.0);
        assert_relative_eq!(scaler.scale[0], (2.0f64 / 3.0).sqrt());
        // Constant column keeps unit scale.
        assert_eq!(scaler.scale[1], 1.0);

        let t = scaler.transform(&x).unwrap();
        assert_relative_eq!(t[(1, 0)], 0.0);
        assert_relative_eq!(t[(0, 1)], 0.0);
    }

    #[test]
    fn test_scaler_rejects_width() {
        let scaler = StandardScaler {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        let x = DMatrix::zeros(1, 2);
        assert!(matches!(
            scaler.transform(&x),
            Err(FeatureError::WidthMismatch { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn test_lof_separates_far_point() {
        let lof =
            LocalOutlierFactor::fit(&grid(), &LofParams::default().with_neighbors(5)).unwrap();
        let queries = DMatrix::from_row_slice(2, 2, &[0.5, 0.5, 10.0, 10.0]);
        let decision = lof.decision_function(&queries).unwrap();
        assert!(decision[0] > 0.0);
        assert!(decision[1] < 0.0);
        assert_eq!(lof.predict(&queries).unwrap(), vec![INLIER, OUTLIER]);
    }

    #[test]
    fn test_lof_inlier_score_near_one() {
        let lof =
            LocalOutlierFactor::fit(&grid(), &LofParams::default().with_neighbors(4)).unwrap();
        let centre = DMatrix::from_row_slice(1, 2, &[0.5, 0.5]);
        let score = lof.score_samples(&centre).unwrap()[0];
        assert!(score < -0.5 && score > -1.5, "score {}", score);
    }

    #[test]
    fn test_lof_contamination_offset() {
        let params = LofParams::default().with_neighbors(5).with_contamination(0.1);
        let lof = LocalOutlierFactor::fit(&grid(), &params).unwrap();
        assert!(lof.offset < -0.5);
        assert!(lof.offset > LocalOutlierFactor::DEFAULT_OFFSET);
    }

    #[test]
    fn test_lof_rejects_bad_params() {
        let one = DMatrix::zeros(1, 2);
        assert!(LocalOutlierFactor::fit(&one, &LofParams::default()).is_err());
        let bad = LofParams::default().with_contamination(0.9);
        assert!(LocalOutlierFactor::fit(&grid(), &bad).is_err());
    }

    #[test]
    fn test_lof_caps_neighbours() {
        let x = DMatrix::from_row_slice(3, 1, &[0.0, 1.0, 2.0]);
        let lof = LocalOutlierFactor::fit(&x, &LofParams::default()).unwrap();
        assert_eq!(lof.n_neighbors, 2);
    }

    #[test]
    fn test_percentile() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile(&v, 0.0), 1.0);
        assert_relative_eq!(percentile(&v, 50.0), 2.5);
        assert_relative_eq!(percentile(&v, 100.0), 4.0);
    }

    #[test]
    fn test_bundle_dimension_mismatch() {
        let features = FeatureSet::new(["a", "b", "c"]).unwrap();
        let x = DMatrix::from_fn(10, 2, |i, j| (i * (j + 1)) as f64);
        assert!(matches!(
            ModelBundle::fit(features, &x, &LofParams::default()),
            Err(ConfigError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_bundle_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let features = FeatureSet::new(["x", "y"]).unwrap();
        let bundle =
            ModelBundle::fit(features, &grid(), &LofParams::default().with_neighbors(5)).unwrap();
        bundle.save(dir.path()).unwrap();

        let json = fs::read_to_string(dir.path().join(CLASSIFIER_FILE)).unwrap();
        assert!(json.contains("\"type\":\"local_outlier_factor\""));

        let loaded = ModelBundle::load(dir.path()).unwrap();
        assert_eq!(loaded, bundle);
    }

    #[test]
    fn test_load_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ModelBundle::load(dir.path()),
            Err(ConfigError::MissingArtifact { .. })
        ));
    }

    #[test]
    fn test_load_rejects_duplicate_features() {
        let dir = tempfile::tempdir().unwrap();
        let features = FeatureSet::new(["x", "y"]).unwrap();
        let bundle = ModelBundle::fit(features, &grid(), &LofParams::default()).unwrap();
        bundle.save(dir.path()).unwrap();
        fs::write(dir.path().join(FEATURES_FILE), "[\"x\", \"x\"]").unwrap();
        assert!(matches!(
            ModelBundle::load(dir.path()),
            Err(ConfigError::MalformedArtifact { .. })
        ));
    }

    #[test]
    fn test_load_rejects_narrow_scaler() {
        let dir = tempfile::tempdir().unwrap();
        let features = FeatureSet::new(["x", "y"]).unwrap();
        let bundle = ModelBundle::fit(features, &grid(), &LofParams::default()).unwrap();
        bundle.save(dir.path()).unwrap();
        fs::write(dir.path().join(SCALER_FILE), "{\"mean\":[0.0],\"scale\":[1.0]}").unwrap();
        assert!(matches!(
            ModelBundle::load(dir.path()),
            Err(ConfigError::DimensionMismatch { component: "scaler", .. })
        ));
    }
}
