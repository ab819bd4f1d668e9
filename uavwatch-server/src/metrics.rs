// UAVWatch Server - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the producer and the scoring API.

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, Encoder, Gauge, IntCounter,
    IntCounterVec, TextEncoder,
};
use uavwatch::{TelemetryRecord, TelemetryStats};
use uavwatch_sim::Tick;

lazy_static! {
    // ============================================================
    // Producer
    // ============================================================

    /// Records simulated and persisted.
    pub static ref RECORDS_PRODUCED_TOTAL: IntCounter = register_int_counter!(
        "uavwatch_records_produced_total",
        "Telemetry records persisted by the producer"
    ).unwrap();

    /// Injected anomalies by archetype.
    pub static ref ANOMALIES_INJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "uavwatch_anomalies_injected_total",
        "Anomalies injected by the producer",
        &["kind"]
    ).unwrap();

    /// Battery level of the latest record seen.
    pub static ref BATTERY_LEVEL: Gauge = register_gauge!(
        "uavwatch_battery_level",
        "Battery level of the latest record (percent)"
    ).unwrap();

    /// Altitude of the latest record seen.
    pub static ref ALTITUDE_M: Gauge = register_gauge!(
        "uavwatch_altitude_m",
        "Altitude of the latest record (metres)"
    ).unwrap();

    // ============================================================
    // Scoring API
    // ============================================================

    pub static ref SCORING_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "uavwatch_scoring_requests_total",
        "Scoring requests served",
        &["endpoint"]
    ).unwrap();

    /// Share of the stats window flagged anomalous (percent).
    pub static ref WINDOW_ANOMALY_RATE: Gauge = register_gauge!(
        "uavwatch_window_anomaly_rate",
        "Percentage of the stats window flagged anomalous"
    ).unwrap();
}

/// Register every metric so it is exported before its first update.
pub fn register_all() {
    lazy_static::initialize(&RECORDS_PRODUCED_TOTAL);
    lazy_static::initialize(&ANOMALIES_INJECTED_TOTAL);
    lazy_static::initialize(&BATTERY_LEVEL);
    lazy_static::initialize(&ALTITUDE_M);
    lazy_static::initialize(&SCORING_REQUESTS_TOTAL);
    lazy_static::initialize(&WINDOW_ANOMALY_RATE);
}

/// Account for one producer tick.
pub fn record_tick(tick: &Tick) {
    RECORDS_PRODUCED_TOTAL.inc();
    update_latest(&tick.record);
    if let Some(kind) = tick.anomaly {
        ANOMALIES_INJECTED_TOTAL.with_label_values(&[kind.name()]).inc();
    }
}

pub fn update_latest(record: &TelemetryRecord) {
    BATTERY_LEVEL.set(record.battery_level);
    ALTITUDE_M.set(record.altitude);
}

pub fn record_request(endpoint: &str) {
    SCORING_REQUESTS_TOTAL.with_label_values(&[endpoint]).inc();
}

/// Publish the latest window aggregates.
pub fn update_window(stats: &TelemetryStats) {
    WINDOW_ANOMALY_RATE.set(stats.anomaly_rate);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uavwatch_sim::AnomalyKind;

    #[test]
    fn test_record_tick() {
        let mut record =
            TelemetryRecord::grounded(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), "M002");
        record.altitude = 1234.0;
        let before = RECORDS_PRODUCED_TOTAL.get();
        record_tick(&Tick {
            record,
            anomaly: Some(AnomalyKind::GpsDrift),
        });
        assert!(RECORDS_PRODUCED_TOTAL.get() > before);
        assert!(ANOMALIES_INJECTED_TOTAL.with_label_values(&["gps_drift"]).get() >= 1);
    }

    #[test]
    fn test_encode_metrics() {
        register_all();
        record_request("telemetry");
        let output = encode_metrics();
        assert!(output.contains("uavwatch_scoring_requests_total"));
        assert!(output.contains("uavwatch_window_anomaly_rate"));
    }
}
