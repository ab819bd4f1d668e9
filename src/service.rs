//! Read-side service: retrieve a window, engineer, score.
//!
//! Nothing is cached between calls; each query pulls a fresh window from
//! the store and recomputes every feature.

use crate::error::Result;
use crate::record::{FlightMode, FlightPhase, ScoredRecord};
use crate::scorer::Scorer;
use crate::store::TelemetryStore;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Window sizes used by the read API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Rows returned by [`TelemetryService::scored`] when no limit is given.
    pub display_limit: usize,
    /// Rows summarized by [`TelemetryService::stats`].
    pub stats_window: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            display_limit: 150,
            stats_window: 1000,
        }
    }
}

impl ServiceConfig {
    pub fn with_display_limit(mut self, limit: usize) -> Self {
        self.display_limit = limit;
        self
    }

    pub fn with_stats_window(mut self, window: usize) -> Self {
        self.stats_window = window;
        self
    }
}

/// Aggregates over the most recent window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryStats {
    /// Rows in the whole store.
    pub total_records: u64,
    /// Percentage of the window flagged anomalous.
    pub anomaly_rate: f64,
    pub avg_altitude: f64,
    pub avg_battery: f64,
    pub current_phase: Option<FlightPhase>,
    pub current_mode: Option<FlightMode>,
}

impl TelemetryStats {
    fn empty(total_records: u64) -> Self {
        Self {
            total_records,
            anomaly_rate: 0.0,
            avg_altitude: 0.0,
            avg_battery: 0.0,
            current_phase: None,
            current_mode: None,
        }
    }

    /// Summarize a scored window ordered newest first.
    pub fn from_window(total_records: u64, window: &[ScoredRecord]) -> Self {
        let Some(latest) = window.first() else {
            return Self::empty(total_records);
        };
        let n = window.len() as f64;
        let flagged = window.iter().filter(|s| s.flagged()).count() as f64;
        Self {
            total_records,
            anomaly_rate: flagged / n * 100.0,
            avg_altitude: window.iter().map(|s| s.record.altitude).sum::<f64>() / n,
            avg_battery: window.iter().map(|s| s.record.battery_level).sum::<f64>() / n,
            current_phase: Some(latest.record.phase),
            current_mode: Some(latest.record.mode),
        }
    }
}

/// Liveness report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub database: bool,
    pub model_loaded: bool,
    pub feature_count: usize,
}

/// Scored access to a telemetry store.
#[derive(Debug)]
pub struct TelemetryService<S> {
    store: Mutex<S>,
    scorer: Scorer,
    config: ServiceConfig,
}

impl<S: TelemetryStore> TelemetryService<S> {
    pub fn new(store: S, scorer: Scorer, config: ServiceConfig) -> Self {
        Self {
            store: Mutex::new(store),
            scorer,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn store(&self) -> MutexGuard<'_, S> {
        // The store holds no invariant a panicking reader could break.
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Most recent `limit` records (default: display limit), newest first,
    /// each with its verdict.
    pub fn scored(&self, limit: Option<usize>) -> Result<Vec<ScoredRecord>> {
        let limit = limit.unwrap_or(self.config.display_limit);
        let window = self.store().latest(limit)?;
        debug!("Scoring window of {} records", window.len());
        Ok(self.scorer.score_records(&window)?)
    }

    /// Only the flagged records of the window.
    pub fn anomalies(&self, limit: Option<usize>) -> Result<Vec<ScoredRecord>> {
        Ok(self
            .scored(limit)?
            .into_iter()
            .filter(ScoredRecord::flagged)
            .collect())
    }

    /// Aggregates over the stats window.
    pub fn stats(&self) -> Result<TelemetryStats> {
        let (total, window) = {
            let store = self.store();
            (store.count()?, store.latest(self.config.stats_window)?)
        };
        let scored = self.scorer.score_records(&window)?;
        Ok(TelemetryStats::from_window(total, &scored))
    }

    pub fn health(&self) -> Health {
        let database = self.store().count().is_ok();
        Health {
            status: "healthy".to_string(),
            database,
            model_loaded: true,
            feature_count: self.scorer.bundle().features().len(),
        }
    }
}
