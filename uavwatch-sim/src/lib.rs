// UAVWatch Sim - UAV telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # UAVWatch Sim
//!
//! Flight-phase telemetry simulator with targeted anomaly injection.
//!
//! The simulator produces one [`TelemetryRecord`](uavwatch::TelemetryRecord)
//! per tick from a four-phase state machine, with:
//!
//! - **Phase-conditioned signals**: speeds, attitude, motors and battery follow the phase
//! - **Anomaly injection**: nine archetypes, streaming or rate-controlled batch
//! - **Batch datasets**: reproducible multi-cycle CSV datasets for offline training
//! - **Streaming producer**: simulate, inject and persist, resuming after restarts
//!
//! ## Quick Start
//!
//! ```rust
//! use uavwatch_sim::{generate_batch, BatchConfig};
//!
//! let config = BatchConfig::default()
//!     .with_cycles(2)
//!     .with_points_per_cycle(300)
//!     .with_seed(7);
//! let batch = generate_batch(&config);
//!
//! assert!(batch.len() > 500);
//! assert_eq!(batch.summary().target_anomalies, 120);
//! ```
//!
//! ## Stepping a Mission by Hand
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use uavwatch::FlightPhase;
//! use uavwatch_sim::{FlightSimulator, MissionProfile};
//!
//! let mut rng = StdRng::seed_from_u64(1);
//! let start = Utc::now();
//! let mut sim = FlightSimulator::fresh(MissionProfile::live(), "M002", start, &mut rng);
//!
//! let first = sim.step(start + Duration::seconds(1), &mut rng);
//! assert_eq!(first.phase, FlightPhase::Climb);
//! assert!(first.altitude > 0.0);
//! ```

pub mod dataset;
pub mod flight;
pub mod injector;
pub mod producer;
pub mod signals;

// Re-exports for convenience
pub use dataset::{
    generate_batch, read_csv, write_csv, BatchConfig, BatchDataset, BatchSummary, DatasetError,
};
pub use flight::{FlightSimulator, FlightState, MissionProfile};
pub use injector::{AnomalyInjector, AnomalyKind, InjectionMode, InjectorConfig, RateController};
pub use producer::{StreamingProducer, Tick, DEFAULT_MISSION_ID};
pub use signals::{SignalProfile, Span};
