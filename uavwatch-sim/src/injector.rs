// UAVWatch Sim - Anomaly injection
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Anomaly injection.
//!
//! The injector is consulted once per simulated record and never fires on
//! the ground. Two modes exist:
//!
//! - **Streaming**: a fixed per-tick probability and a weighted choice of
//!   archetype. Battery archetypes are skipped when the battery is already
//!   near the low-battery threshold.
//! - **Batch**: a [`RateController`] steers the firing probability so the
//!   realized anomaly count converges on an exact target.
//!
//! Exactly one archetype fires per triggered tick. Every archetype writes
//! an `event` tag and raises `system_status`.

use crate::signals::Span;
use log::debug;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uavwatch::{SystemStatus, TelemetryRecord};

/// Anomaly archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// One motor stops and overheats.
    MotorFailure,
    /// Altitude jumps, dependent altitude sources follow.
    SensorGlitch,
    /// Sudden loss of charge.
    BatteryDrop,
    /// Link, signal and satellites collapse.
    CommunicationLoss,
    /// Position jumps and fix degrades.
    GpsDrift,
    /// Large accelerometer and gyroscope excursions.
    ImuSpike,
    /// All motors and the battery run hot.
    Overheating,
    /// Speeds collapse with a strong sink rate.
    StallWarning,
    /// Motor speeds scaled up.
    HighVibration,
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 9] = [
        AnomalyKind::MotorFailure,
        AnomalyKind::SensorGlitch,
        AnomalyKind::BatteryDrop,
        AnomalyKind::CommunicationLoss,
        AnomalyKind::GpsDrift,
        AnomalyKind::ImuSpike,
        AnomalyKind::Overheating,
        AnomalyKind::StallWarning,
        AnomalyKind::HighVibration,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AnomalyKind::MotorFailure => "motor_failure",
            AnomalyKind::SensorGlitch => "sensor_glitch",
            AnomalyKind::BatteryDrop => "battery_drop",
            AnomalyKind::CommunicationLoss => "communication_loss",
            AnomalyKind::GpsDrift => "gps_drift",
            AnomalyKind::ImuSpike => "imu_spike",
            AnomalyKind::Overheating => "overheating",
            AnomalyKind::StallWarning => "stall_warning",
            AnomalyKind::HighVibration => "high_vibration",
        }
    }

    /// Status the record is raised to.
    pub fn severity(self) -> SystemStatus {
        match self {
            AnomalyKind::MotorFailure
            | AnomalyKind::CommunicationLoss
            | AnomalyKind::Overheating => SystemStatus::Error,
            _ => SystemStatus::Warning,
        }
    }

    /// Whether the archetype drains the battery.
    pub fn affects_battery(self) -> bool {
        matches!(self, AnomalyKind::BatteryDrop)
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Injection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorConfig {
    /// Per-tick firing probability in streaming mode.
    pub streaming_probability: f64,
    /// Archetype weights in streaming mode.
    pub streaming_weights: Vec<(AnomalyKind, f64)>,
    /// Battery level below which battery archetypes are skipped.
    pub battery_guard: f64,
    /// Battery never drops below this level.
    pub battery_floor: f64,
    /// Multiplier on the batch firing probability.
    pub boost: f64,
    /// Altitude offset of a sensor glitch.
    pub glitch_offset: Span,
    /// Charge lost in a battery drop.
    pub battery_drop: Span,
    pub full_voltage: f64,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self::streaming()
    }
}

impl InjectorConfig {
    /// Live producer settings.
    pub fn streaming() -> Self {
        Self {
            streaming_probability: 0.05,
            streaming_weights: vec![
                (AnomalyKind::MotorFailure, 2.0),
                (AnomalyKind::SensorGlitch, 2.0),
                (AnomalyKind::BatteryDrop, 1.0),
            ],
            battery_guard: 30.0,
            battery_floor: 5.0,
            boost: 1.2,
            glitch_offset: Span::new(50.0, 150.0),
            battery_drop: Span::new(10.0, 20.0),
            full_voltage: 14.8,
        }
    }

    /// Offline dataset settings: larger magnitudes.
    pub fn batch() -> Self {
        Self {
            glitch_offset: Span::new(100.0, 300.0),
            battery_drop: Span::new(20.0, 40.0),
            ..Self::streaming()
        }
    }

    pub fn with_streaming_probability(mut self, p: f64) -> Self {
        self.streaming_probability = p;
        self
    }

    pub fn with_boost(mut self, boost: f64) -> Self {
        self.boost = boost;
        self
    }
}

/// Closed-loop controller that converges on an exact anomaly count.
///
/// Every point is counted, airborne or not; only airborne points may fire.
/// The firing probability is `remaining_anomalies / remaining_points`
/// times a boost, clamped to `[0, 1]`, and drops to zero once the target
/// is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateController {
    total_points: usize,
    target: usize,
    boost: f64,
    seen: usize,
    fired: usize,
}

impl RateController {
    pub fn new(total_points: usize, ratio: f64, boost: f64) -> Self {
        let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            total_points,
            target: (total_points as f64 * ratio).floor() as usize,
            boost: boost.max(0.0),
            seen: 0,
            fired: 0,
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn fired(&self) -> usize {
        self.fired
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn remaining_points(&self) -> usize {
        self.total_points.saturating_sub(self.seen)
    }

    pub fn remaining_anomalies(&self) -> usize {
        self.target.saturating_sub(self.fired)
    }

    /// Firing probability for the next point.
    pub fn probability(&self) -> f64 {
        let points = self.remaining_points();
        if points == 0 {
            return 0.0;
        }
        (self.remaining_anomalies() as f64 / points as f64 * self.boost).clamp(0.0, 1.0)
    }

    /// Count one point and decide whether it fires.
    pub fn should_fire(&mut self, airborne: bool, rng: &mut (impl Rng + ?Sized)) -> bool {
        let p = self.probability();
        self.seen += 1;
        if !airborne || p <= 0.0 {
            return false;
        }
        let fire = rng.gen_bool(p);
        if fire {
            self.fired += 1;
        }
        fire
    }

    /// Fired anomalies over points seen so far.
    pub fn realized_ratio(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.fired as f64 / self.seen as f64
        }
    }
}

/// How the injector decides to fire.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectionMode {
    Streaming,
    Batch(RateController),
}

/// Mutates records with anomaly archetypes.
#[derive(Debug, Clone)]
pub struct AnomalyInjector {
    config: InjectorConfig,
    mode: InjectionMode,
    injected: usize,
}

impl AnomalyInjector {
    pub fn streaming(config: InjectorConfig) -> Self {
        Self {
            config,
            mode: InjectionMode::Streaming,
            injected: 0,
        }
    }

    /// Batch injector targeting `floor(total_points * ratio)` anomalies.
    pub fn batch(config: InjectorConfig, total_points: usize, ratio: f64) -> Self {
        let controller = RateController::new(total_points, ratio, config.boost);
        Self {
            config,
            mode: InjectionMode::Batch(controller),
            injected: 0,
        }
    }

    pub fn config(&self) -> &InjectorConfig {
        &self.config
    }

    pub fn mode(&self) -> &InjectionMode {
        &self.mode
    }

    /// Anomaly count a batch injector aims for.
    pub fn target(&self) -> Option<usize> {
        match &self.mode {
            InjectionMode::Batch(controller) => Some(controller.target()),
            InjectionMode::Streaming => None,
        }
    }

    /// Anomalies injected so far.
    pub fn injected(&self) -> usize {
        self.injected
    }

    /// Decide for one record and mutate it when an anomaly fires.
    pub fn maybe_inject(
        &mut self,
        record: &mut TelemetryRecord,
        rng: &mut (impl Rng + ?Sized),
    ) -> Option<AnomalyKind> {
        let airborne = record.phase.is_airborne();

        let kind = match &mut self.mode {
            InjectionMode::Batch(controller) => {
                if !controller.should_fire(airborne, rng) {
                    return None;
                }
                *AnomalyKind::ALL.choose(rng)?
            }
            InjectionMode::Streaming => {
                if !airborne || !rng.gen_bool(self.config.streaming_probability.clamp(0.0, 1.0)) {
                    return None;
                }
                self.pick_streaming(record.battery_level, rng)?
            }
        };

        apply(kind, record, &self.config, rng);
        self.injected += 1;
        debug!(
            "Injected {} at {} ({} so far)",
            kind, record.dt, self.injected
        );
        Some(kind)
    }

    fn pick_streaming(
        &self,
        battery_level: f64,
        rng: &mut (impl Rng + ?Sized),
    ) -> Option<AnomalyKind> {
        let guard = battery_level < self.config.battery_guard;
        let choices: Vec<(AnomalyKind, f64)> = self
            .config
            .streaming_weights
            .iter()
            .filter(|(kind, _)| !(guard && kind.affects_battery()))
            .copied()
            .collect();
        choices
            .choose_weighted(rng, |(_, weight)| *weight)
            .ok()
            .map(|(kind, _)| *kind)
    }
}

/// Apply one archetype to `record`.
pub fn apply(
    kind: AnomalyKind,
    record: &mut TelemetryRecord,
    config: &InjectorConfig,
    rng: &mut (impl Rng + ?Sized),
) {
    let event = match kind {
        AnomalyKind::MotorFailure => {
            let motor = rng.gen_range(1..=4);
            if let Some((rpm, temp)) = record.motor_mut(motor) {
                *rpm = 0.0;
                *temp = 150.0;
            }
            format!("Motor {} Failure", motor)
        }
        AnomalyKind::SensorGlitch => {
            let offset = config.glitch_offset.sample(rng);
            record.altitude += offset;
            if record.gps_alt.is_some() {
                record.gps_alt = Some(record.altitude + Span::symmetric(50.0).sample(rng));
            }
            if let Some(lidar) = record.lidar_altitude.as_mut() {
                *lidar += offset;
            }
            "Altitude Sensor Glitch".to_string()
        }
        AnomalyKind::BatteryDrop => {
            record.battery_level =
                (record.battery_level - config.battery_drop.sample(rng)).max(config.battery_floor);
            record.battery_voltage = config.full_voltage * (record.battery_level / 100.0)
                - Span::new(1.0, 3.0).sample(rng);
            "Sudden Battery Drop".to_string()
        }
        AnomalyKind::CommunicationLoss => {
            record.link_quality = Span::new(0.0, 10.0).sample(rng);
            record.signal_strength = Span::new(-120.0, -100.0).sample(rng);
            record.sat_count = rng.gen_range(0..=3);
            "Communication Loss".to_string()
        }
        AnomalyKind::GpsDrift => {
            record.gps_lat += Span::symmetric(0.1).sample(rng);
            record.gps_lon += Span::symmetric(0.1).sample(rng);
            record.gps_fix_type = 1;
            "GPS Drift".to_string()
        }
        AnomalyKind::ImuSpike => {
            let accel = Span::symmetric(10.0);
            let gyro = Span::symmetric(1.0);
            record.accel_x = accel.sample(rng);
            record.accel_y = accel.sample(rng);
            record.accel_z = accel.sample(rng);
            record.gyro_x = gyro.sample(rng);
            record.gyro_y = gyro.sample(rng);
            record.gyro_z = gyro.sample(rng);
            "IMU Sensor Spike".to_string()
        }
        AnomalyKind::Overheating => {
            let heat = Span::new(30.0, 60.0);
            let temps = record.motor_temps().map(|t| t + heat.sample(rng));
            record.set_motor_temps(temps);
            record.temperature_battery += Span::new(20.0, 40.0).sample(rng);
            "System Overheating".to_string()
        }
        AnomalyKind::StallWarning => {
            record.airspeed = Span::new(0.0, 5.0).sample(rng);
            record.ground_speed = Span::new(0.0, 5.0).sample(rng);
            record.vertical_speed = Span::new(-10.0, -5.0).sample(rng);
            "Stall Warning".to_string()
        }
        AnomalyKind::HighVibration => {
            let factor = Span::new(1.2, 1.5);
            let rpms = record.motor_rpms().map(|r| r * factor.sample(rng));
            record.set_motor_rpms(rpms);
            "High Vibration".to_string()
        }
    };

    record.event = event;
    record.system_status = record.system_status.elevate(kind.severity());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use uavwatch::FlightPhase;

    fn airborne() -> TelemetryRecord {
        let mut r =
            TelemetryRecord::grounded(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(), "M001");
        r.phase = FlightPhase::Cruise;
        r.system_status = SystemStatus::Normal;
        r.altitude = 5000.0;
        r.gps_alt = Some(5001.0);
        r.lidar_altitude = Some(5000.2);
        r.set_motor_rpms([5000.0; 4]);
        r.set_motor_temps([60.0; 4]);
        r.battery_level = 80.0;
        r
    }

    #[test]
    fn test_motor_failure() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut r = airborne();
        apply(AnomalyKind::MotorFailure, &mut r, &InjectorConfig::batch(), &mut rng);
        let failed: Vec<usize> = (0..4).filter(|&i| r.motor_rpms()[i] == 0.0).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(r.motor_temps()[failed[0]], 150.0);
        assert_eq!(r.event, format!("Motor {} Failure", failed[0] + 1));
        assert_eq!(r.system_status, SystemStatus::Error);
    }

    #[test]
    fn test_glitch_propagates_to_altitude_sources() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut r = airborne();
        apply(AnomalyKind::SensorGlitch, &mut r, &InjectorConfig::batch(), &mut rng);
        let offset = r.altitude - 5000.0;
        assert!((100.0..=300.0).contains(&offset));
        assert!((r.gps_alt.unwrap() - r.altitude).abs() <= 50.0);
        assert!((r.lidar_altitude.unwrap() - 5000.2 - offset).abs() < 1e-9);
        assert_eq!(r.system_status, SystemStatus::Warning);
    }

    #[test]
    fn test_battery_drop_respects_floor() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut r = airborne();
        r.battery_level = 12.0;
        apply(AnomalyKind::BatteryDrop, &mut r, &InjectorConfig::batch(), &mut rng);
        assert_eq!(r.battery_level, 5.0);
        assert_eq!(r.event, "Sudden Battery Drop");
    }

    #[test]
    fn test_severity_never_lowers() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut r = airborne();
        r.system_status = SystemStatus::Error;
        apply(AnomalyKind::GpsDrift, &mut r, &InjectorConfig::batch(), &mut rng);
        assert_eq!(r.system_status, SystemStatus::Error);
        assert_eq!(r.gps_fix_type, 1);
    }

    #[test]
    fn test_every_archetype_tags_event() {
        let mut rng = StdRng::seed_from_u64(5);
        for kind in AnomalyKind::ALL {
            let mut r = airborne();
            apply(kind, &mut r, &InjectorConfig::batch(), &mut rng);
            assert!(r.has_event(), "{} left no event", kind);
            assert!(r.system_status >= SystemStatus::Warning);
        }
    }

    #[test]
    fn test_never_fires_on_ground() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut injector =
            AnomalyInjector::streaming(InjectorConfig::streaming().with_streaming_probability(1.0));
        let mut r = airborne();
        r.phase = FlightPhase::Landed;
        for _ in 0..100 {
            assert!(injector.maybe_inject(&mut r, &mut rng).is_none());
        }
        assert_eq!(injector.injected(), 0);
    }

    #[test]
    fn test_streaming_skips_battery_when_low() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut injector =
            AnomalyInjector::streaming(InjectorConfig::streaming().with_streaming_probability(1.0));
        for _ in 0..300 {
            let mut r = airborne();
            r.battery_level = 28.0;
            let kind = injector.maybe_inject(&mut r, &mut rng).unwrap();
            assert_ne!(kind, AnomalyKind::BatteryDrop);
        }
    }

    #[test]
    fn test_streaming_weights() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut injector =
            AnomalyInjector::streaming(InjectorConfig::streaming().with_streaming_probability(1.0));
        let mut drops = 0;
        for _ in 0..5000 {
            let mut r = airborne();
            if injector.maybe_inject(&mut r, &mut rng) == Some(AnomalyKind::BatteryDrop) {
                drops += 1;
            }
        }
        // Expected share 1/5.
        assert!((800..=1200).contains(&drops), "battery drops: {}", drops);
    }

    #[test]
    fn test_controller_probability_bounds() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut c = RateController::new(10, 0.9, 1.2);
        assert_eq!(c.target(), 9);
        while c.remaining_points() > 0 {
            let p = c.probability();
            assert!((0.0..=1.0).contains(&p));
            c.should_fire(true, &mut rng);
        }
        assert_eq!(c.probability(), 0.0);
        assert!(c.fired() <= c.target());
    }

    #[test]
    fn test_controller_counts_grounded_points() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut c = RateController::new(100, 0.2, 1.2);
        for _ in 0..10 {
            assert!(!c.should_fire(false, &mut rng));
        }
        assert_eq!(c.seen(), 10);
        assert_eq!(c.fired(), 0);
        assert_eq!(c.remaining_points(), 90);
    }

    #[test]
    fn test_controller_converges() {
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut c = RateController::new(1000, 0.20, 1.2);
            for _ in 0..1000 {
                c.should_fire(true, &mut rng);
            }
            let fired = c.fired() as i64;
            assert!((fired - 200).abs() <= 30, "seed {}: {}", seed, fired);
        }
    }
}
