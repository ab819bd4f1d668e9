//! # UAVWatch - UAV telemetry novelty scoring
//!
//! Feature engineering and anomaly scoring for multi-sensor UAV telemetry,
//! with the same transformation applied when training data is produced and
//! when live windows are scored.
//!
//! ## Key Features
//!
//! - **Typed records**: one [`TelemetryRecord`] per tick, optional auxiliary sensors
//! - **Ordered feature pipeline**: pure steps, causal rolling windows, zero fill
//! - **Frozen models**: scaler and local outlier factor loaded once and shared
//! - **Append-only store**: SQLite in WAL mode, readers never block the producer
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::{TimeZone, Utc};
//! use nalgebra::DMatrix;
//! use uavwatch::{FeatureSet, LofParams, ModelBundle, Scorer, TelemetryRecord};
//!
//! // Fit a small model on nominal motor speeds
//! let features = FeatureSet::new(["motor_rpm_mean"]).unwrap();
//! let nominal = DMatrix::from_fn(20, 1, |i, _| 5000.0 + i as f64 * 10.0);
//! let bundle = ModelBundle::fit(features, &nominal, &LofParams::default()).unwrap();
//! let scorer = Scorer::new(Arc::new(bundle));
//!
//! // Score a window with one stalled motor set
//! let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let mut ok = TelemetryRecord::grounded(t0, "M001");
//! ok.set_motor_rpms([5100.0; 4]);
//! let mut stalled = ok.clone();
//! stalled.timestamp += 1;
//! stalled.set_motor_rpms([0.0; 4]);
//!
//! let scored = scorer.score_records(&[ok, stalled]).unwrap();
//! assert!(scored[0].flagged());
//! assert!(!scored[1].flagged());
//! ```
//!
//! ## Modules
//!
//! - [`record`]: Telemetry record and status enums
//! - [`frame`]: Columnar window with optional columns
//! - [`features`]: Feature engineering pipeline
//! - [`model`]: Feature set, scaler, classifier, artifact IO
//! - [`scorer`]: Alignment and scoring
//! - [`store`]: Append-only telemetry store
//! - [`service`]: Scored window, statistics, anomalies

// Modules
pub mod error;
pub mod features;
pub mod frame;
pub mod model;
pub mod record;
pub mod scorer;
pub mod service;
pub mod store;

// Re-exports for convenient access
pub use error::{ConfigError, FeatureError, Result, StoreError, UavError};
pub use features::{EngineeredFrame, FeaturePipeline, FeatureStep};
pub use frame::Frame;
pub use model::{
    ClassifierArtifact, FeatureScaler, FeatureSet, LocalOutlierFactor, LofParams, ModelBundle,
    NoveltyClassifier, StandardScaler,
};
pub use record::{FlightMode, FlightPhase, ScoredRecord, SystemStatus, TelemetryRecord};
pub use scorer::{Scorer, Verdict};
pub use service::{Health, ServiceConfig, TelemetryService, TelemetryStats};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::{MemoryStore, TelemetryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
