// UAVWatch Sim - Streaming producer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Live producer: one tick simulates, injects and persists one record.
//!
//! The producer owns the flight simulator and the write side of the store.
//! On startup it resumes from the latest persisted row so restarts do not
//! reset the mission.

use crate::flight::{FlightSimulator, MissionProfile};
use crate::injector::{AnomalyInjector, AnomalyKind, InjectorConfig};
use chrono::{DateTime, Utc};
use log::info;
use rand::prelude::*;
use rand::rngs::StdRng;
use uavwatch::{StoreError, TelemetryRecord, TelemetryStore};

/// Mission id of a fresh mission started against an empty store.
pub const DEFAULT_MISSION_ID: &str = "M002";

/// Result of one producer tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub record: TelemetryRecord,
    pub anomaly: Option<AnomalyKind>,
}

/// Streaming telemetry producer writing into a [`TelemetryStore`].
pub struct StreamingProducer<S> {
    store: S,
    simulator: FlightSimulator,
    injector: AnomalyInjector,
    rng: StdRng,
    produced: u64,
}

impl<S: TelemetryStore> StreamingProducer<S> {
    /// Build a producer, resuming from the store's latest row when there is
    /// one. Without a seed the random source is seeded from the OS.
    pub fn new(
        store: S,
        profile: MissionProfile,
        injector: InjectorConfig,
        mission_id: &str,
        now: DateTime<Utc>,
        seed: Option<u64>,
    ) -> Result<Self, StoreError> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let simulator = match store.last()? {
            Some(last) => {
                info!(
                    "Resuming mission {} from {} at {:.1} m",
                    last.mission_id, last.dt, last.altitude
                );
                FlightSimulator::resume(profile, last, &mut rng)
            }
            None => {
                info!("Empty store, starting mission {}", mission_id);
                FlightSimulator::fresh(profile, mission_id, now, &mut rng)
            }
        };

        Ok(Self {
            store,
            simulator,
            injector: AnomalyInjector::streaming(injector),
            rng,
            produced: 0,
        })
    }

    /// Simulate the record stamped `at`, maybe inject an anomaly, persist it.
    ///
    /// The simulator advances even when the insert fails; the caller decides
    /// whether to retry on its next tick.
    pub fn tick(&mut self, at: DateTime<Utc>) -> Result<Tick, StoreError> {
        let mut record = self.simulator.step(at, &mut self.rng);
        let anomaly = self.injector.maybe_inject(&mut record, &mut self.rng);
        self.store.insert(&record)?;
        self.produced += 1;
        Ok(Tick { record, anomaly })
    }

    /// Records persisted by this producer.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn simulator(&self) -> &FlightSimulator {
        &self.simulator
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uavwatch::{FlightPhase, MemoryStore};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn producer(store: MemoryStore, seed: u64) -> StreamingProducer<MemoryStore> {
        StreamingProducer::new(
            store,
            MissionProfile::live(),
            InjectorConfig::streaming(),
            DEFAULT_MISSION_ID,
            t0(),
            Some(seed),
        )
        .unwrap()
    }

    #[test]
    fn test_ticks_are_persisted() {
        let mut p = producer(MemoryStore::new(), 1);
        for i in 0..50 {
            p.tick(t0() + Duration::seconds(i)).unwrap();
        }
        assert_eq!(p.produced(), 50);
        assert_eq!(p.store().count().unwrap(), 50);
        let last = p.store().last().unwrap().unwrap();
        assert_eq!(last.timestamp, (t0() + Duration::seconds(49)).timestamp());
        assert_eq!(last.mission_id, DEFAULT_MISSION_ID);
    }

    #[test]
    fn test_resume_continues_climb() {
        let mut p = producer(MemoryStore::new(), 2);
        for i in 0..20 {
            p.tick(t0() + Duration::seconds(i)).unwrap();
        }
        let store = p.into_store();
        let altitude = store.last().unwrap().unwrap().altitude;
        assert!(altitude > 0.0);

        let mut resumed = producer(store, 3);
        assert_eq!(resumed.simulator().phase(), FlightPhase::Climb);
        let next = resumed.tick(t0() + Duration::seconds(20)).unwrap();
        assert!(next.record.altitude > altitude);
        assert_eq!(resumed.store().count().unwrap(), 21);
    }

    #[test]
    fn test_streaming_anomalies_tag_events() {
        let mut p = producer(MemoryStore::new(), 4);
        let mut injected = 0;
        for i in 0..400 {
            let tick = p.tick(t0() + Duration::seconds(i)).unwrap();
            if let Some(kind) = tick.anomaly {
                injected += 1;
                assert!(tick.record.has_event());
                assert!(matches!(
                    kind,
                    AnomalyKind::MotorFailure | AnomalyKind::SensorGlitch | AnomalyKind::BatteryDrop
                ));
            }
        }
        // 5% of roughly 400 airborne ticks.
        assert!((5..=45).contains(&injected), "injected {}", injected);
    }
}
