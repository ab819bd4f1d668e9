// UAVWatch Server - HTTP API
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON API over a [`TelemetryService`].
//!
//! Store reads and scoring are blocking, so every handler hands its work to
//! the blocking pool. Failures render as `500 {"error": "..."}`.

use crate::error::ApiError;
use crate::metrics;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uavwatch::{Health, ScoredRecord, TelemetryService, TelemetryStats, TelemetryStore};

type Shared<S> = Arc<TelemetryService<S>>;

/// `?limit=N`
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Build the API router.
pub fn router<S>(service: Shared<S>) -> Router
where
    S: TelemetryStore + Send + 'static,
{
    Router::new()
        .route("/", get(root_handler))
        .route("/api/telemetry", get(telemetry_handler::<S>))
        .route("/api/stats", get(stats_handler::<S>))
        .route("/api/anomalies", get(anomalies_handler::<S>))
        .route("/api/health", get(health_handler::<S>))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>UAVWatch</title></head>
<body>
    <h1>UAVWatch</h1>
    <ul>
        <li><a href="/api/telemetry">/api/telemetry</a> - Latest scored records (<code>?limit=N</code>)</li>
        <li><a href="/api/stats">/api/stats</a> - Window statistics</li>
        <li><a href="/api/anomalies">/api/anomalies</a> - Flagged records only</li>
        <li><a href="/api/health">/api/health</a> - Health check</li>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
    </ul>
</body>
</html>"#,
    )
}

async fn telemetry_handler<S>(
    State(service): State<Shared<S>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ScoredRecord>>, ApiError>
where
    S: TelemetryStore + Send + 'static,
{
    metrics::record_request("telemetry");
    let scored = tokio::task::spawn_blocking(move || service.scored(query.limit)).await??;
    if let Some(latest) = scored.first() {
        metrics::update_latest(&latest.record);
    }
    Ok(Json(scored))
}

async fn anomalies_handler<S>(
    State(service): State<Shared<S>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ScoredRecord>>, ApiError>
where
    S: TelemetryStore + Send + 'static,
{
    metrics::record_request("anomalies");
    let flagged = tokio::task::spawn_blocking(move || service.anomalies(query.limit)).await??;
    Ok(Json(flagged))
}

async fn stats_handler<S>(
    State(service): State<Shared<S>>,
) -> Result<Json<TelemetryStats>, ApiError>
where
    S: TelemetryStore + Send + 'static,
{
    metrics::record_request("stats");
    let stats = tokio::task::spawn_blocking(move || service.stats()).await??;
    metrics::update_window(&stats);
    Ok(Json(stats))
}

async fn health_handler<S>(State(service): State<Shared<S>>) -> Result<Json<Health>, ApiError>
where
    S: TelemetryStore + Send + 'static,
{
    let health = tokio::task::spawn_blocking(move || service.health()).await?;
    Ok(Json(health))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics::encode_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use nalgebra::DMatrix;
    use uavwatch::{
        FeatureSet, FlightPhase, LofParams, MemoryStore, ModelBundle, Scorer, ServiceConfig,
        TelemetryRecord,
    };

    fn service(altitudes: &[f64]) -> Shared<MemoryStore> {
        let features = FeatureSet::new(["altitude"]).unwrap();
        let x = DMatrix::from_fn(30, 1, |i, _| 2000.0 + (i % 10) as f64 * 5.0);
        let bundle =
            ModelBundle::fit(features, &x, &LofParams::default().with_neighbors(10)).unwrap();

        let mut store = MemoryStore::new();
        for (i, &altitude) in altitudes.iter().enumerate() {
            let time = Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap();
            let mut r = TelemetryRecord::grounded(time, "M002");
            r.phase = FlightPhase::Cruise;
            r.altitude = altitude;
            store.insert(&r).unwrap();
        }
        Arc::new(TelemetryService::new(
            store,
            Scorer::new(Arc::new(bundle)),
            ServiceConfig::default().with_display_limit(4),
        ))
    }

    #[tokio::test]
    async fn test_telemetry_default_and_explicit_limit() {
        let svc = service(&[2020.0; 10]);
        let Json(rows) = telemetry_handler(State(svc.clone()), Query(LimitQuery::default()))
            .await
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows
            .windows(2)
            .all(|w| w[0].record.timestamp >= w[1].record.timestamp));

        let Json(rows) = telemetry_handler(State(svc), Query(LimitQuery { limit: Some(7) }))
            .await
            .unwrap();
        assert_eq!(rows.len(), 7);
    }

    #[tokio::test]
    async fn test_anomalies_only_flagged() {
        let svc = service(&[2020.0, 2025.0, 9000.0, 2030.0]);
        let Json(rows) = anomalies_handler(State(svc), Query(LimitQuery { limit: Some(10) }))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.altitude, 9000.0);
        assert_eq!(rows[0].is_anomaly, 1);
    }

    #[tokio::test]
    async fn test_stats_on_empty_store() {
        let Json(stats) = stats_handler(State(service(&[]))).await.unwrap();
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.anomaly_rate, 0.0);
        assert_eq!(stats.current_phase, None);
    }

    #[tokio::test]
    async fn test_health() {
        let Json(health) = health_handler(State(service(&[2020.0]))).await.unwrap();
        assert_eq!(health.status, "healthy");
        assert!(health.database);
        assert!(health.model_loaded);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::register_all();
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_router_builds() {
        let _ = router(service(&[]));
    }
}
