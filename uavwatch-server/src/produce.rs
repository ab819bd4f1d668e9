// UAVWatch Server - Producer loop
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Timed producer loop writing one record per interval.

use crate::config::AppConfig;
use crate::error::ServerError;
use crate::metrics;
use chrono::Utc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uavwatch::TelemetryStore;
use uavwatch_sim::{InjectorConfig, StreamingProducer};

/// Producer loop options.
#[derive(Debug, Clone, Default)]
pub struct ProduceOptions {
    /// Stop after this many records.
    pub limit: Option<u64>,
    /// Fixed seed for a reproducible run.
    pub seed: Option<u64>,
}

/// Build a producer for `store` from the application config.
pub fn producer<S: TelemetryStore>(
    config: &AppConfig,
    store: S,
    seed: Option<u64>,
) -> Result<StreamingProducer<S>, ServerError> {
    let injector = InjectorConfig::streaming()
        .with_streaming_probability(config.streaming_anomaly_probability);
    Ok(StreamingProducer::new(
        store,
        config.mission.clone(),
        injector,
        &config.mission_id,
        Utc::now(),
        seed,
    )?)
}

/// Run the producer until the limit is reached (forever without one).
///
/// A busy store skips the tick; any other store failure ends the loop.
pub async fn run<S: TelemetryStore>(
    config: &AppConfig,
    store: S,
    options: ProduceOptions,
) -> Result<u64, ServerError> {
    let mut producer = producer(config, store, options.seed)?;
    let mut ticker = interval(Duration::from_millis(config.producer_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Producing every {} ms into {}",
        config.producer_interval_ms,
        config.database_path.display()
    );

    loop {
        if options.limit.is_some_and(|limit| producer.produced() >= limit) {
            break;
        }
        ticker.tick().await;

        match producer.tick(Utc::now()) {
            Ok(tick) => {
                metrics::record_tick(&tick);
                match tick.anomaly {
                    Some(kind) => info!(
                        "{} {} alt={:.1} bat={:.1} anomaly={} ({})",
                        tick.record.dt,
                        tick.record.phase,
                        tick.record.altitude,
                        tick.record.battery_level,
                        kind,
                        tick.record.event
                    ),
                    None => debug!(
                        "{} {} alt={:.1} bat={:.1}",
                        tick.record.dt,
                        tick.record.phase,
                        tick.record.altitude,
                        tick.record.battery_level
                    ),
                }
            }
            Err(e) if e.is_transient() => warn!("Store busy, skipping tick: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    info!("Producer stopped after {} records", producer.produced());
    Ok(producer.produced())
}
