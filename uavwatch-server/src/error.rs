// UAVWatch Server - Error types
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Command and API errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uavwatch::{ConfigError, FeatureError, StoreError, UavError};
use uavwatch_sim::DatasetError;

/// Errors surfaced by the `uavwatch` subcommands.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Cannot read config {path}: {reason}")]
    ConfigFile { path: String, reason: String },

    #[error(transparent)]
    Uav(#[from] UavError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("No nominal rows left to train on")]
    NoTrainingRows,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        ServerError::Uav(err.into())
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        ServerError::Uav(err.into())
    }
}

impl From<FeatureError> for ServerError {
    fn from(err: FeatureError) -> Self {
        ServerError::Uav(err.into())
    }
}

/// Any failure while answering a request. Rendered as
/// `500 {"error": "..."}`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ApiError(String);

impl From<UavError> for ApiError {
    fn from(err: UavError) -> Self {
        ApiError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError(format!("worker failed: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {}", self.0);
        let body = Json(json!({ "error": self.0 }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_is_500() {
        let err: ApiError = UavError::from(StoreError::Busy("locked".into())).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_store_error_converts() {
        let err: ServerError = StoreError::Busy("locked".into()).into();
        assert!(err.to_string().contains("busy"));
    }
}
