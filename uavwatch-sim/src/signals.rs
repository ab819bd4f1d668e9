// UAVWatch Sim - Signal generators
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Stateless, phase-conditioned signal generators.
//!
//! Each generator draws one tick of a sensor group from an explicit random
//! source. Ground values are returned when the vehicle is not airborne.

use rand::prelude::*;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};

/// Metres per degree used to integrate GPS position.
pub const METRES_PER_DEGREE: f64 = 111_000.0;

/// Ambient temperature motors cool down to.
pub const AMBIENT_TEMP: f64 = 25.0;

/// Closed interval a value is drawn from uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub low: f64,
    pub high: f64,
}

impl Span {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// `[-half_width, half_width]`
    pub const fn symmetric(half_width: f64) -> Self {
        Self::new(-half_width, half_width)
    }

    /// Draw one value. A degenerate span returns its lower bound.
    pub fn sample(&self, rng: &mut (impl Rng + ?Sized)) -> f64 {
        if self.high <= self.low {
            return self.low;
        }
        Uniform::new_inclusive(self.low, self.high).sample(rng)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Sensor ranges for nominal flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalProfile {
    pub ground_speed: Span,
    /// Airspeed offset from ground speed.
    pub airspeed_offset: Span,
    /// Heading change per tick, degrees.
    pub heading_step: Span,
    pub pitch: Span,
    pub roll: Span,
    pub accel: Span,
    pub gyro: Span,
    pub motor_rpm: Span,
    pub motor_temp: Span,
    /// Motor cooling per grounded tick, degrees.
    pub motor_cooling: f64,
    pub throttle: Span,
    pub payloads: Vec<f64>,
    pub obstacle_distance: Span,
    pub sat_count: (i64, i64),
    pub fix_types: Vec<i64>,
    pub link_quality: Span,
    pub signal_strength: Span,
    pub gps_alt_noise: Span,
    pub lidar_noise: Span,
    pub full_voltage: f64,
    pub voltage_noise: Span,
    pub battery_current: Span,
    pub battery_temp: Span,
}

impl Default for SignalProfile {
    fn default() -> Self {
        Self {
            ground_speed: Span::new(10.0, 70.0),
            airspeed_offset: Span::symmetric(2.0),
            heading_step: Span::symmetric(5.0),
            pitch: Span::symmetric(10.0),
            roll: Span::symmetric(20.0),
            accel: Span::symmetric(0.5),
            gyro: Span::symmetric(0.02),
            motor_rpm: Span::new(3000.0, 8000.0),
            motor_temp: Span::new(40.0, 90.0),
            motor_cooling: 0.1,
            throttle: Span::new(40.0, 100.0),
            payloads: vec![0.0, 2.5, 5.0, 10.0],
            obstacle_distance: Span::new(5.0, 200.0),
            sat_count: (5, 12),
            fix_types: vec![2, 3],
            link_quality: Span::new(40.0, 100.0),
            signal_strength: Span::new(-110.0, -50.0),
            gps_alt_noise: Span::symmetric(2.0),
            lidar_noise: Span::symmetric(0.5),
            full_voltage: 14.8,
            voltage_noise: Span::symmetric(0.1),
            battery_current: Span::new(5.0, 25.0),
            battery_temp: Span::new(20.0, 45.0),
        }
    }
}

/// Ground and air speed.
pub fn speeds(
    profile: &SignalProfile,
    airborne: bool,
    rng: &mut (impl Rng + ?Sized),
) -> (f64, f64) {
    if !airborne {
        return (0.0, 0.0);
    }
    let ground = profile.ground_speed.sample(rng);
    (ground, ground + profile.airspeed_offset.sample(rng))
}

/// Random-walk heading step, wrapped to `[0, 360)`.
pub fn next_heading(profile: &SignalProfile, heading: f64, rng: &mut (impl Rng + ?Sized)) -> f64 {
    (heading + profile.heading_step.sample(rng)).rem_euclid(360.0)
}

/// Integrate one tick of travel along `heading_deg`.
pub fn advance_position(lat: f64, lon: f64, heading_deg: f64, ground_speed: f64) -> (f64, f64) {
    let distance = ground_speed / METRES_PER_DEGREE;
    let heading = heading_deg.to_radians();
    (lat + heading.sin() * distance, lon + heading.cos() * distance)
}

/// Pitch and roll, level on the ground.
pub fn attitude(
    profile: &SignalProfile,
    airborne: bool,
    rng: &mut (impl Rng + ?Sized),
) -> (f64, f64) {
    if !airborne {
        return (0.0, 0.0);
    }
    (profile.pitch.sample(rng), profile.roll.sample(rng))
}

/// Accelerometer and gyroscope triples. The IMU never stops sampling.
pub fn imu(profile: &SignalProfile, rng: &mut (impl Rng + ?Sized)) -> ([f64; 3], [f64; 3]) {
    let accel = [
        profile.accel.sample(rng),
        profile.accel.sample(rng),
        profile.accel.sample(rng),
    ];
    let gyro = [
        profile.gyro.sample(rng),
        profile.gyro.sample(rng),
        profile.gyro.sample(rng),
    ];
    (accel, gyro)
}

/// Motor RPM and temperature. Grounded motors stop and cool toward ambient.
pub fn motors(
    profile: &SignalProfile,
    airborne: bool,
    previous_temps: [f64; 4],
    rng: &mut (impl Rng + ?Sized),
) -> ([f64; 4], [f64; 4]) {
    if !airborne {
        let temps = previous_temps.map(|t| (t - profile.motor_cooling).max(AMBIENT_TEMP));
        return ([0.0; 4], temps);
    }
    let mut rpm = [0.0; 4];
    let mut temp = [0.0; 4];
    for i in 0..4 {
        rpm[i] = profile.motor_rpm.sample(rng);
        temp[i] = profile.motor_temp.sample(rng);
    }
    (rpm, temp)
}

/// Battery voltage, current and temperature for a given charge level.
pub fn battery_electrics(
    profile: &SignalProfile,
    level: f64,
    airborne: bool,
    rng: &mut (impl Rng + ?Sized),
) -> (f64, f64, f64) {
    let voltage = profile.full_voltage * (level / 100.0) + profile.voltage_noise.sample(rng);
    let current = if airborne {
        profile.battery_current.sample(rng)
    } else {
        0.0
    };
    (voltage, current, profile.battery_temp.sample(rng))
}

/// GPS and lidar altitude readings around the true altitude.
pub fn altitude_sources(
    profile: &SignalProfile,
    altitude: f64,
    rng: &mut (impl Rng + ?Sized),
) -> (f64, f64) {
    (
        altitude + profile.gps_alt_noise.sample(rng),
        altitude + profile.lidar_noise.sample(rng),
    )
}

/// One tick of link and GNSS quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSample {
    pub sat_count: i64,
    pub gps_fix_type: i64,
    pub link_quality: f64,
    pub signal_strength: f64,
}

pub fn link(profile: &SignalProfile, rng: &mut (impl Rng + ?Sized)) -> LinkSample {
    let (lo, hi) = profile.sat_count;
    LinkSample {
        sat_count: if hi > lo { rng.gen_range(lo..=hi) } else { lo },
        gps_fix_type: profile.fix_types.choose(rng).copied().unwrap_or(3),
        link_quality: profile.link_quality.sample(rng),
        signal_strength: profile.signal_strength.sample(rng),
    }
}

/// Throttle, payload and obstacle distance.
pub fn airframe(
    profile: &SignalProfile,
    airborne: bool,
    rng: &mut (impl Rng + ?Sized),
) -> (f64, f64, f64) {
    let throttle = if airborne {
        profile.throttle.sample(rng)
    } else {
        0.0
    };
    let payload = profile.payloads.choose(rng).copied().unwrap_or(0.0);
    (throttle, payload, profile.obstacle_distance.sample(rng))
}
