// UAVWatch Server - Configuration
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Application configuration.
//!
//! Values come from an optional JSON file; command-line flags override them.

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uavwatch::ServiceConfig;
use uavwatch_sim::{MissionProfile, DEFAULT_MISSION_ID};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub model_dir: PathBuf,
    /// Rows returned by `/api/telemetry` without a limit.
    pub display_limit: usize,
    /// Rows summarized by `/api/stats`.
    pub stats_window: usize,
    pub port: u16,
    pub producer_interval_ms: u64,
    pub mission_id: String,
    pub mission: MissionProfile,
    pub streaming_anomaly_probability: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/uav_telemetry.db"),
            model_dir: PathBuf::from("models"),
            display_limit: 150,
            stats_window: 1000,
            port: 5000,
            producer_interval_ms: 1000,
            mission_id: DEFAULT_MISSION_ID.to_string(),
            mission: MissionProfile::live(),
            streaming_anomaly_probability: 0.05,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ServerError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let error = |reason: String| ServerError::ConfigFile {
            path: path.display().to_string(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| error(e.to_string()))
    }

    pub fn service(&self) -> ServiceConfig {
        ServiceConfig::default()
            .with_display_limit(self.display_limit)
            .with_stats_window(self.stats_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.display_limit, 150);
        assert_eq!(config.stats_window, 1000);
        assert_eq!(config.service().display_limit, 150);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"port": 8080, "mission": {{"target_altitude": 1200.0}}}}"#).unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.mission.target_altitude, 1200.0);
        assert_eq!(config.mission.climb_rate, MissionProfile::live().climb_rate);
        assert_eq!(config.stats_window, 1000);
    }

    #[test]
    fn test_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ServerError::ConfigFile { .. }));
    }
}
