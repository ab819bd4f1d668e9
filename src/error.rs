//! Error types for UAVWatch
//!
//! This module defines all error types used throughout the library.
//! Empty input windows are never an error: every operation returns an
//! empty, valid result for them.

use thiserror::Error;

/// Result type alias for UAVWatch operations
pub type Result<T> = std::result::Result<T, UavError>;

/// Main error type for UAVWatch operations
#[derive(Error, Debug)]
pub enum UavError {
    /// Model artifacts are missing or inconsistent
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A requested feature cannot be built from the window
    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    /// Durable store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading or validating model artifacts.
///
/// These are fatal at startup: the scoring path must not activate.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Artifact file not found
    #[error("Missing model artifact: {path}")]
    MissingArtifact { path: String },

    /// Artifact file exists but could not be parsed
    #[error("Malformed model artifact {path}: {reason}")]
    MalformedArtifact { path: String, reason: String },

    /// Feature set is empty
    #[error("Feature set is empty")]
    EmptyFeatureSet,

    /// Feature set lists the same column twice
    #[error("Duplicate feature name: {0}")]
    DuplicateFeature(String),

    /// Scaler or classifier width differs from the feature set
    #[error("{component} expects {expected} features, feature set has {actual}")]
    DimensionMismatch {
        component: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Fitting parameters are unusable
    #[error("Invalid model parameter: {0}")]
    InvalidParameter(String),
}

/// Data-shape errors: the running pipeline cannot produce what the model
/// was trained on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// Feature names resolve to non-numeric columns
    #[error("stage {stage}: columns {columns:?} are categorical and cannot be scored")]
    NonNumeric {
        stage: &'static str,
        columns: Vec<String>,
    },

    /// A value could not be represented after alignment
    #[error("stage {stage}: non-finite value in column {column} at row {row}")]
    NonFinite {
        stage: &'static str,
        column: String,
        row: usize,
    },

    /// Matrix width does not match the fitted component
    #[error("stage {stage}: expected {expected} columns, got {actual}")]
    WidthMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors from the durable store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another connection holds a conflicting lock; callers retry on their
    /// own polling cadence
    #[error("Store busy: {0}")]
    Busy(String),

    /// A stored row could not be decoded into a record
    #[error("Invalid row in column {column}: {reason}")]
    InvalidRow { column: String, reason: String },

    /// Underlying SQLite failure
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl StoreError {
    /// Whether the caller should simply retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, ref msg)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Busy(msg.clone().unwrap_or_else(|| "database is locked".into()))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for UavError {
    fn from(err: rusqlite::Error) -> Self {
        UavError::Store(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::DimensionMismatch {
            component: "scaler",
            expected: 3,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "scaler expects 3 features, feature set has 4"
        );
    }

    #[test]
    fn test_feature_error_names_columns() {
        let err: UavError = FeatureError::NonNumeric {
            stage: "align",
            columns: vec!["mode".into()],
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("align"));
        assert!(msg.contains("mode"));
    }

    #[test]
    fn test_busy_is_transient() {
        assert!(StoreError::Busy("locked".into()).is_transient());
        assert!(!StoreError::InvalidRow {
            column: "altitude".into(),
            reason: "bad".into()
        }
        .is_transient());
    }
}
