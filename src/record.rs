//! Telemetry record types
//!
//! A [`TelemetryRecord`] is one row of the telemetry stream: created by the
//! flight simulator, optionally mutated by the anomaly injector, then
//! persisted and never mutated again.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format of the `dt` column.
pub const DATETIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Format of the `date` column.
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// Columns holding text rather than numbers.
pub const CATEGORICAL_COLUMNS: [&str; 7] = [
    "dt",
    "date",
    "phase",
    "mode",
    "system_status",
    "mission_id",
    "event",
];

/// Mission segment of the flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlightPhase {
    Climb,
    Cruise,
    Descend,
    Landed,
}

impl FlightPhase {
    /// Whether the aircraft is in the air.
    pub fn is_airborne(self) -> bool {
        !matches!(self, FlightPhase::Landed)
    }

    /// Phase that normally follows this one.
    pub fn next(self) -> FlightPhase {
        match self {
            FlightPhase::Climb => FlightPhase::Cruise,
            FlightPhase::Cruise => FlightPhase::Descend,
            FlightPhase::Descend => FlightPhase::Landed,
            FlightPhase::Landed => FlightPhase::Climb,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlightPhase::Climb => "CLIMB",
            FlightPhase::Cruise => "CRUISE",
            FlightPhase::Descend => "DESCEND",
            FlightPhase::Landed => "LANDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLIMB" => Some(FlightPhase::Climb),
            "CRUISE" => Some(FlightPhase::Cruise),
            "DESCEND" => Some(FlightPhase::Descend),
            "LANDED" => Some(FlightPhase::Landed),
            _ => None,
        }
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Autopilot mode reported by the flight controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightMode {
    Auto,
    #[serde(rename = "RTL")]
    Rtl,
    Manual,
}

impl FlightMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FlightMode::Auto => "Auto",
            FlightMode::Rtl => "RTL",
            FlightMode::Manual => "Manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Auto" => Some(FlightMode::Auto),
            "RTL" => Some(FlightMode::Rtl),
            "Manual" => Some(FlightMode::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health summary string carried by every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SystemStatus {
    Landed,
    Normal,
    Warning,
    Error,
}

impl SystemStatus {
    /// Battery below this level reports `Warning`.
    pub const WARNING_BATTERY: f64 = 15.0;
    /// Battery below this level reports `Error`.
    pub const ERROR_BATTERY: f64 = 7.0;

    /// Status derived from phase and battery level alone.
    pub fn derive(phase: FlightPhase, battery_level: f64) -> Self {
        if phase == FlightPhase::Landed {
            SystemStatus::Landed
        } else if battery_level < Self::ERROR_BATTERY {
            SystemStatus::Error
        } else if battery_level < Self::WARNING_BATTERY {
            SystemStatus::Warning
        } else {
            SystemStatus::Normal
        }
    }

    /// Raise the status to at least `level`, never lowering it.
    pub fn elevate(self, level: SystemStatus) -> Self {
        self.max(level)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SystemStatus::Landed => "Landed",
            SystemStatus::Normal => "Normal",
            SystemStatus::Warning => "Warning",
            SystemStatus::Error => "Error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Landed" => Some(SystemStatus::Landed),
            "Normal" => Some(SystemStatus::Normal),
            "Warning" => Some(SystemStatus::Warning),
            "Error" => Some(SystemStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry sample.
///
/// Auxiliary sensors (`gps_alt`, `lidar_altitude`, `obstacle_distance`)
/// may be absent on some airframes and are therefore optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: i64,
    pub dt: String,
    pub date: String,
    pub altitude: f64,
    pub gps_alt: Option<f64>,
    pub gps_lat: f64,
    pub gps_lon: f64,
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
    pub ground_speed: f64,
    pub airspeed: f64,
    pub vertical_speed: f64,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    pub battery_level: f64,
    pub battery_voltage: f64,
    pub battery_current: f64,
    pub temperature_battery: f64,
    pub motor_rpm_1: f64,
    pub motor_rpm_2: f64,
    pub motor_rpm_3: f64,
    pub motor_rpm_4: f64,
    pub motor_temp_1: f64,
    pub motor_temp_2: f64,
    pub motor_temp_3: f64,
    pub motor_temp_4: f64,
    pub throttle_position: f64,
    pub payload_weight: f64,
    pub lidar_altitude: Option<f64>,
    pub obstacle_distance: Option<f64>,
    pub sat_count: i64,
    pub gps_fix_type: i64,
    pub link_quality: f64,
    pub signal_strength: f64,
    pub phase: FlightPhase,
    pub mode: FlightMode,
    pub system_status: SystemStatus,
    pub mission_id: String,
    pub waypoint_id: i64,
    pub event: String,
}

impl TelemetryRecord {
    /// Number of numeric columns exposed by [`numeric_channels`](Self::numeric_channels).
    pub const NUMERIC_COLUMNS: usize = 38;

    /// A vehicle sitting on the ground with a full battery.
    pub fn grounded(time: DateTime<Utc>, mission_id: &str) -> Self {
        let mut record = Self {
            timestamp: 0,
            dt: String::new(),
            date: String::new(),
            altitude: 0.0,
            gps_alt: Some(0.0),
            gps_lat: -7.27,
            gps_lon: 112.74,
            heading: 90.0,
            pitch: 0.0,
            roll: 0.0,
            yaw: 90.0,
            ground_speed: 0.0,
            airspeed: 0.0,
            vertical_speed: 0.0,
            accel_x: 0.0,
            accel_y: 0.0,
            accel_z: 0.0,
            gyro_x: 0.0,
            gyro_y: 0.0,
            gyro_z: 0.0,
            battery_level: 100.0,
            battery_voltage: 14.8,
            battery_current: 0.0,
            temperature_battery: 25.0,
            motor_rpm_1: 0.0,
            motor_rpm_2: 0.0,
            motor_rpm_3: 0.0,
            motor_rpm_4: 0.0,
            motor_temp_1: 25.0,
            motor_temp_2: 25.0,
            motor_temp_3: 25.0,
            motor_temp_4: 25.0,
            throttle_position: 0.0,
            payload_weight: 0.0,
            lidar_altitude: Some(0.0),
            obstacle_distance: Some(100.0),
            sat_count: 10,
            gps_fix_type: 3,
            link_quality: 80.0,
            signal_strength: -80.0,
            phase: FlightPhase::Landed,
            mode: FlightMode::Auto,
            system_status: SystemStatus::Landed,
            mission_id: mission_id.to_string(),
            waypoint_id: 0,
            event: String::new(),
        };
        record.set_time(time);
        record
    }

    /// Set `timestamp`, `dt` and `date` from one instant.
    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.timestamp = time.timestamp();
        self.dt = time.format(DATETIME_FORMAT).to_string();
        self.date = time.format(DATE_FORMAT).to_string();
    }

    /// Instant of this record, if the timestamp is representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }

    pub fn motor_rpms(&self) -> [f64; 4] {
        [
            self.motor_rpm_1,
            self.motor_rpm_2,
            self.motor_rpm_3,
            self.motor_rpm_4,
        ]
    }

    pub fn motor_temps(&self) -> [f64; 4] {
        [
            self.motor_temp_1,
            self.motor_temp_2,
            self.motor_temp_3,
            self.motor_temp_4,
        ]
    }

    /// Mutable access to motor `index` (1-based) as `(rpm, temp)`.
    pub fn motor_mut(&mut self, index: usize) -> Option<(&mut f64, &mut f64)> {
        match index {
            1 => Some((&mut self.motor_rpm_1, &mut self.motor_temp_1)),
            2 => Some((&mut self.motor_rpm_2, &mut self.motor_temp_2)),
            3 => Some((&mut self.motor_rpm_3, &mut self.motor_temp_3)),
            4 => Some((&mut self.motor_rpm_4, &mut self.motor_temp_4)),
            _ => None,
        }
    }

    pub fn set_motor_rpms(&mut self, rpms: [f64; 4]) {
        self.motor_rpm_1 = rpms[0];
        self.motor_rpm_2 = rpms[1];
        self.motor_rpm_3 = rpms[2];
        self.motor_rpm_4 = rpms[3];
    }

    pub fn set_motor_temps(&mut self, temps: [f64; 4]) {
        self.motor_temp_1 = temps[0];
        self.motor_temp_2 = temps[1];
        self.motor_temp_3 = temps[2];
        self.motor_temp_4 = temps[3];
    }

    /// Whether the injector or the controller tagged this record.
    pub fn has_event(&self) -> bool {
        !self.event.is_empty()
    }

    /// All numeric columns in store order (timestamp excluded).
    pub fn numeric_channels(&self) -> [(&'static str, Option<f64>); Self::NUMERIC_COLUMNS] {
        [
            ("altitude", Some(self.altitude)),
            ("gps_alt", self.gps_alt),
            ("gps_lat", Some(self.gps_lat)),
            ("gps_lon", Some(self.gps_lon)),
            ("heading", Some(self.heading)),
            ("pitch", Some(self.pitch)),
            ("roll", Some(self.roll)),
            ("yaw", Some(self.yaw)),
            ("ground_speed", Some(self.ground_speed)),
            ("airspeed", Some(self.airspeed)),
            ("vertical_speed", Some(self.vertical_speed)),
            ("accel_x", Some(self.accel_x)),
            ("accel_y", Some(self.accel_y)),
            ("accel_z", Some(self.accel_z)),
            ("gyro_x", Some(self.gyro_x)),
            ("gyro_y", Some(self.gyro_y)),
            ("gyro_z", Some(self.gyro_z)),
            ("battery_level", Some(self.battery_level)),
            ("battery_voltage", Some(self.battery_voltage)),
            ("battery_current", Some(self.battery_current)),
            ("temperature_battery", Some(self.temperature_battery)),
            ("motor_rpm_1", Some(self.motor_rpm_1)),
            ("motor_rpm_2", Some(self.motor_rpm_2)),
            ("motor_rpm_3", Some(self.motor_rpm_3)),
            ("motor_rpm_4", Some(self.motor_rpm_4)),
            ("motor_temp_1", Some(self.motor_temp_1)),
            ("motor_temp_2", Some(self.motor_temp_2)),
            ("motor_temp_3", Some(self.motor_temp_3)),
            ("motor_temp_4", Some(self.motor_temp_4)),
            ("throttle_position", Some(self.throttle_position)),
            ("payload_weight", Some(self.payload_weight)),
            ("lidar_altitude", self.lidar_altitude),
            ("obstacle_distance", self.obstacle_distance),
            ("sat_count", Some(self.sat_count as f64)),
            ("gps_fix_type", Some(self.gps_fix_type as f64)),
            ("link_quality", Some(self.link_quality)),
            ("signal_strength", Some(self.signal_strength)),
            ("waypoint_id", Some(self.waypoint_id as f64)),
        ]
    }
}

/// A record annotated by the scorer. Derived on every query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: TelemetryRecord,
    /// 1 when the classifier flags the record as an outlier.
    pub is_anomaly: u8,
    /// Higher means more anomalous; positive exactly when flagged.
    pub anomaly_score: f64,
}

impl ScoredRecord {
    pub fn flagged(&self) -> bool {
        self.is_anomaly == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_grounded_template() {
        let r = TelemetryRecord::grounded(t0(), "M001");
        assert_eq!(r.phase, FlightPhase::Landed);
        assert_eq!(r.battery_level, 100.0);
        assert_eq!(r.dt, "2024/02/01 12:30:05");
        assert_eq!(r.date, "2024/02/01");
        assert_eq!(r.time(), Some(t0()));
        assert!(!r.has_event());
    }

    #[test]
    fn test_phase_cycle() {
        let mut p = FlightPhase::Climb;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(p);
            p = p.next();
        }
        assert_eq!(
            seen,
            vec![
                FlightPhase::Climb,
                FlightPhase::Cruise,
                FlightPhase::Descend,
                FlightPhase::Landed
            ]
        );
        assert_eq!(p, FlightPhase::Climb);
        assert_eq!(FlightPhase::parse("CRUISE"), Some(FlightPhase::Cruise));
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(
            SystemStatus::derive(FlightPhase::Landed, 3.0),
            SystemStatus::Landed
        );
        assert_eq!(
            SystemStatus::derive(FlightPhase::Cruise, 50.0),
            SystemStatus::Normal
        );
        assert_eq!(
            SystemStatus::derive(FlightPhase::Cruise, 14.9),
            SystemStatus::Warning
        );
        assert_eq!(
            SystemStatus::derive(FlightPhase::Descend, 6.5),
            SystemStatus::Error
        );
    }

    #[test]
    fn test_elevate_never_lowers() {
        assert_eq!(
            SystemStatus::Error.elevate(SystemStatus::Warning),
            SystemStatus::Error
        );
        assert_eq!(
            SystemStatus::Normal.elevate(SystemStatus::Warning),
            SystemStatus::Warning
        );
    }

    #[test]
    fn test_motor_access() {
        let mut r = TelemetryRecord::grounded(t0(), "M001");
        if let Some((rpm, temp)) = r.motor_mut(2) {
            *rpm = 0.0;
            *temp = 150.0;
        }
        assert_eq!(r.motor_temps(), [25.0, 150.0, 25.0, 25.0]);
        assert!(r.motor_mut(5).is_none());
    }

    #[test]
    fn test_numeric_channels_cover_optional_sensors() {
        let mut r = TelemetryRecord::grounded(t0(), "M001");
        r.lidar_altitude = None;
        let channels = r.numeric_channels();
        let lidar = channels.iter().find(|(n, _)| *n == "lidar_altitude");
        assert_eq!(lidar, Some(&("lidar_altitude", None)));
        assert_eq!(channels.len(), TelemetryRecord::NUMERIC_COLUMNS);
    }

    #[test]
    fn test_json_uses_wire_names() {
        let r = TelemetryRecord::grounded(t0(), "M001");
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"phase\":\"LANDED\""));
        assert!(json.contains("\"system_status\":\"Landed\""));
        assert!(json.contains("\"mode\":\"Auto\""));
    }

    #[test]
    fn test_scored_record_flattens() {
        let scored = ScoredRecord {
            record: TelemetryRecord::grounded(t0(), "M001"),
            is_anomaly: 1,
            anomaly_score: 0.4,
        };
        let value = serde_json::to_value(&scored).unwrap();
        assert_eq!(value["is_anomaly"], 1);
        assert_eq!(value["mission_id"], "M001");
        assert!(scored.flagged());
    }
}
