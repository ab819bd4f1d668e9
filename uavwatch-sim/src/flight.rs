// UAVWatch Sim - Flight-phase state machine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Flight-phase state machine.
//!
//! The simulator cycles `CLIMB -> CRUISE -> DESCEND -> LANDED -> CLIMB`.
//! Each call to [`FlightSimulator::step`] is one tick (one second of
//! simulated time) and returns one record labelled with the phase the
//! vehicle is in at the end of the tick:
//!
//! - the first `CRUISE` record sits exactly at the target altitude;
//! - the first `LANDED` record sits exactly at zero;
//! - after the landing dwell a recharged vehicle starts a new mission
//!   (mission id suffixed with `_R`) and the record is labelled `CLIMB`;
//! - a battery below the low-battery threshold during `CLIMB` or `CRUISE`
//!   forces `DESCEND` and tags the record with [`LOW_BATTERY_EVENT`].
//!
//! The machine never fails: altitude is clamped at zero and battery at the
//! configured floor.

use crate::signals::{self, SignalProfile, Span};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use uavwatch::{FlightMode, FlightPhase, SystemStatus, TelemetryRecord};

/// Event tag written on a forced low-battery descent.
pub const LOW_BATTERY_EVENT: &str = "Low Battery U-Turn";

/// Suffix appended to the mission id on every restart.
pub const RESTART_SUFFIX: &str = "_R";

/// Mission-level flight parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionProfile {
    /// Cruise altitude in metres.
    pub target_altitude: f64,
    /// Metres gained per climbing tick.
    pub climb_rate: f64,
    /// Metres lost per descending tick.
    pub descend_rate: f64,
    /// Jitter added to climb and descent steps.
    pub altitude_jitter: f64,
    /// Jitter around the target altitude while cruising.
    pub cruise_jitter: f64,
    /// Cruise duration in ticks, drawn once per mission.
    pub cruise_ticks: (u32, u32),
    /// Ticks spent on the ground before a restart.
    pub landed_dwell: u32,
    /// Battery percentage that forces a descent.
    pub low_battery: f64,
    /// Battery never drops below this percentage.
    pub battery_floor: f64,
    /// Battery percentage drained per airborne tick.
    pub battery_drain: Span,
    /// Swap in a full battery after the landing dwell.
    pub recharge_on_landing: bool,
    pub waypoint_count: i64,
    /// Chance per tick of advancing to the next waypoint.
    pub waypoint_advance: f64,
    pub signals: SignalProfile,
}

impl Default for MissionProfile {
    fn default() -> Self {
        Self {
            target_altitude: 5000.0,
            climb_rate: 30.0,
            descend_rate: 25.0,
            altitude_jitter: 1.0,
            cruise_jitter: 1.5,
            cruise_ticks: (120, 180),
            landed_dwell: 5,
            low_battery: 25.0,
            battery_floor: 5.0,
            battery_drain: Span::new(0.05, 0.10),
            recharge_on_landing: true,
            waypoint_count: 10,
            waypoint_advance: 0.25,
            signals: SignalProfile::default(),
        }
    }
}

impl MissionProfile {
    /// Live producer profile.
    pub fn live() -> Self {
        Self::default()
    }

    /// Profile sized so one full cycle takes about `points_per_cycle` ticks,
    /// split 30 / 40 / 25 / 5 % between climb, cruise, descent and ground.
    pub fn batch(points_per_cycle: usize) -> Self {
        let share = |pct: usize| ((points_per_cycle * pct) / 100).max(1);
        let climb = share(30);
        let cruise = share(40);
        let descend = share(25);
        let landed = share(5);
        let target = 5000.0;

        Self {
            target_altitude: target,
            climb_rate: target / climb as f64,
            descend_rate: target / descend as f64,
            altitude_jitter: 0.5,
            cruise_ticks: (cruise as u32, cruise as u32),
            landed_dwell: landed as u32,
            waypoint_count: 20,
            waypoint_advance: 1.0,
            ..Self::default()
        }
    }

    pub fn with_target_altitude(mut self, metres: f64) -> Self {
        self.target_altitude = metres;
        self
    }

    pub fn with_rates(mut self, climb: f64, descend: f64) -> Self {
        self.climb_rate = climb;
        self.descend_rate = descend;
        self
    }

    pub fn with_cruise_ticks(mut self, min: u32, max: u32) -> Self {
        self.cruise_ticks = (min, max.max(min));
        self
    }

    pub fn with_landed_dwell(mut self, ticks: u32) -> Self {
        self.landed_dwell = ticks;
        self
    }

    pub fn with_battery_drain(mut self, drain: Span) -> Self {
        self.battery_drain = drain;
        self
    }

    pub fn with_recharge(mut self, recharge: bool) -> Self {
        self.recharge_on_landing = recharge;
        self
    }

    fn draw_cruise_ticks(&self, rng: &mut (impl Rng + ?Sized)) -> u32 {
        let (lo, hi) = self.cruise_ticks;
        if hi > lo {
            rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }
}

/// Mutable controller state of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightState {
    pub phase: FlightPhase,
    pub mission_id: String,
    /// Cruise duration of the current mission.
    pub cruise_ticks: u32,
    /// Ticks spent in the current phase after entering it.
    pub ticks_in_phase: u32,
    /// Set once a low-battery descent was forced in this mission.
    pub diverted: bool,
    /// Set when the vehicle could not restart for lack of charge.
    pub grounded: bool,
    pub restarts: u32,
}

/// Phase-driven telemetry simulator.
#[derive(Debug, Clone)]
pub struct FlightSimulator {
    profile: MissionProfile,
    state: FlightState,
    last: TelemetryRecord,
}

impl FlightSimulator {
    /// New mission from the ground at the default launch site.
    pub fn fresh(
        profile: MissionProfile,
        mission_id: &str,
        time: DateTime<Utc>,
        rng: &mut (impl Rng + ?Sized),
    ) -> Self {
        Self::resume(profile, TelemetryRecord::grounded(time, mission_id), rng)
    }

    /// Continue from the last persisted record.
    ///
    /// On the ground the vehicle restarts with a full battery; below the
    /// target altitude it keeps climbing; otherwise it cruises with a fresh
    /// cruise timer.
    pub fn resume(
        profile: MissionProfile,
        mut last: TelemetryRecord,
        rng: &mut (impl Rng + ?Sized),
    ) -> Self {
        let phase = if last.altitude <= 0.0 {
            if last.battery_level < 100.0 {
                info!("Starting from the ground with a fresh battery");
                last.battery_level = 100.0;
            }
            FlightPhase::Climb
        } else if last.altitude < profile.target_altitude {
            FlightPhase::Climb
        } else {
            FlightPhase::Cruise
        };
        last.event.clear();

        let cruise_ticks = profile.draw_cruise_ticks(rng);
        info!(
            "Mission {}: target {:.0} m, cruise {} ticks, starting in {}",
            last.mission_id, profile.target_altitude, cruise_ticks, phase
        );

        let state = FlightState {
            phase,
            mission_id: last.mission_id.clone(),
            cruise_ticks,
            ticks_in_phase: 0,
            diverted: false,
            grounded: false,
            restarts: 0,
        };

        Self {
            profile,
            state,
            last,
        }
    }

    pub fn profile(&self) -> &MissionProfile {
        &self.profile
    }

    pub fn state(&self) -> &FlightState {
        &self.state
    }

    pub fn phase(&self) -> FlightPhase {
        self.state.phase
    }

    /// Last record produced (or the resume template).
    pub fn last(&self) -> &TelemetryRecord {
        &self.last
    }

    /// Whether the vehicle has finished its landing dwell and would restart
    /// (or stay grounded) on the next tick.
    pub fn is_dwell_complete(&self) -> bool {
        self.state.phase == FlightPhase::Landed
            && self.state.ticks_in_phase >= self.profile.landed_dwell
    }

    fn enter(&mut self, phase: FlightPhase) {
        info!("Phase change: {} -> {}", self.state.phase, phase);
        self.state.phase = phase;
        self.state.ticks_in_phase = 0;
    }

    /// Advance one tick stamped `at` and return the new record.
    pub fn step(&mut self, at: DateTime<Utc>, rng: &mut (impl Rng + ?Sized)) -> TelemetryRecord {
        let profile = &self.profile;
        let mut r = self.last.clone();
        r.set_time(at);
        r.event.clear();

        let airborne_at_start = self.state.phase.is_airborne();
        if airborne_at_start {
            r.battery_level =
                (r.battery_level - profile.battery_drain.sample(rng)).max(profile.battery_floor);
        }

        let diverting = matches!(self.state.phase, FlightPhase::Climb | FlightPhase::Cruise)
            && r.battery_level < profile.low_battery;
        if diverting {
            warn!(
                "Battery {:.1}% below {:.0}%, returning to launch",
                r.battery_level, profile.low_battery
            );
            self.enter(FlightPhase::Descend);
            self.state.diverted = true;
            r.event = LOW_BATTERY_EVENT.to_string();
        }

        let profile = &self.profile;
        let (ground_speed, airspeed) =
            signals::speeds(&profile.signals, self.state.phase.is_airborne(), rng);
        r.ground_speed = ground_speed;
        r.airspeed = airspeed;

        match self.state.phase {
            FlightPhase::Climb => {
                let change =
                    profile.climb_rate + Span::symmetric(profile.altitude_jitter).sample(rng);
                r.altitude = (r.altitude + change).max(0.0);
                r.vertical_speed = change;
                r.mode = FlightMode::Auto;
                if r.altitude >= profile.target_altitude {
                    r.altitude = profile.target_altitude;
                    r.vertical_speed = 0.0;
                    self.enter(FlightPhase::Cruise);
                }
            }
            FlightPhase::Cruise => {
                let change = Span::symmetric(profile.cruise_jitter).sample(rng);
                r.altitude = profile.target_altitude + change;
                r.vertical_speed = change;
                r.mode = FlightMode::Auto;
                self.state.ticks_in_phase += 1;
                if self.state.ticks_in_phase >= self.state.cruise_ticks {
                    self.enter(FlightPhase::Descend);
                }
            }
            FlightPhase::Descend => {
                let change =
                    -profile.descend_rate + Span::symmetric(profile.altitude_jitter).sample(rng);
                r.altitude = (r.altitude + change).max(0.0);
                r.vertical_speed = change;
                r.mode = FlightMode::Rtl;
                if r.altitude <= 0.0 {
                    r.altitude = 0.0;
                    r.vertical_speed = 0.0;
                    // A diversion tick is always emitted as a descent; touchdown follows.
                    if !diverting {
                        self.enter(FlightPhase::Landed);
                    }
                }
            }
            FlightPhase::Landed => {
                r.altitude = 0.0;
                r.vertical_speed = 0.0;
                r.mode = FlightMode::Manual;
                self.state.ticks_in_phase += 1;
                if self.state.ticks_in_phase > self.profile.landed_dwell {
                    self.land_or_restart(&mut r, rng);
                }
            }
        }

        let sig = &self.profile.signals;
        let airborne = self.state.phase.is_airborne();
        if !airborne {
            r.ground_speed = 0.0;
            r.airspeed = 0.0;
        }

        let (gps_alt, lidar) = signals::altitude_sources(sig, r.altitude, rng);
        r.gps_alt = r.gps_alt.map(|_| gps_alt);
        r.lidar_altitude = r.lidar_altitude.map(|_| lidar);

        if airborne {
            r.heading = signals::next_heading(sig, r.heading, rng);
            r.yaw = r.heading;
            let (lat, lon) =
                signals::advance_position(r.gps_lat, r.gps_lon, r.heading, r.ground_speed);
            r.gps_lat = lat;
            r.gps_lon = lon;
        }
        let (pitch, roll) = signals::attitude(sig, airborne, rng);
        r.pitch = pitch;
        r.roll = roll;

        let ([ax, ay, az], [gx, gy, gz]) = signals::imu(sig, rng);
        r.accel_x = ax;
        r.accel_y = ay;
        r.accel_z = az;
        r.gyro_x = gx;
        r.gyro_y = gy;
        r.gyro_z = gz;

        let (voltage, current, battery_temp) =
            signals::battery_electrics(sig, r.battery_level, airborne_at_start, rng);
        r.battery_voltage = voltage;
        r.battery_current = current;
        r.temperature_battery = battery_temp;

        let (rpm, temp) = signals::motors(sig, airborne, r.motor_temps(), rng);
        r.set_motor_rpms(rpm);
        r.set_motor_temps(temp);

        let (throttle, payload, obstacle) = signals::airframe(sig, airborne, rng);
        r.throttle_position = throttle;
        r.payload_weight = payload;
        r.obstacle_distance = r.obstacle_distance.map(|_| obstacle);

        let link = signals::link(sig, rng);
        r.sat_count = link.sat_count;
        r.gps_fix_type = link.gps_fix_type;
        r.link_quality = link.link_quality;
        r.signal_strength = link.signal_strength;

        if self.profile.waypoint_count > 0
            && rng.gen_bool(self.profile.waypoint_advance.clamp(0.0, 1.0))
        {
            r.waypoint_id = (r.waypoint_id + 1).rem_euclid(self.profile.waypoint_count);
        }

        r.phase = self.state.phase;
        r.mission_id = self.state.mission_id.clone();
        r.system_status = SystemStatus::derive(r.phase, r.battery_level);

        self.last = r.clone();
        r
    }

    fn land_or_restart(&mut self, r: &mut TelemetryRecord, rng: &mut (impl Rng + ?Sized)) {
        if self.profile.recharge_on_landing {
            r.battery_level = 100.0;
        }

        if r.battery_level >= 100.0 {
            self.state.mission_id.push_str(RESTART_SUFFIX);
            self.state.cruise_ticks = self.profile.draw_cruise_ticks(rng);
            self.state.diverted = false;
            self.state.grounded = false;
            self.state.restarts += 1;
            info!(
                "Mission complete, new battery; restarting as {}",
                self.state.mission_id
            );
            self.enter(FlightPhase::Climb);
            r.mode = FlightMode::Auto;
        } else if !self.state.grounded {
            warn!(
                "Battery {:.1}% not recharged, mission {} stays grounded",
                r.battery_level, self.state.mission_id
            );
            self.state.grounded = true;
        }
    }
}
