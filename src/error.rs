// Error taxonomy for the catalog engine plus the HTTP-facing AppError.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Failures that can reach the controller. Validation and mapping problems
/// never show up here: the codec drops bad values and the mapper degrades to
/// an empty page.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("network error: {0}")]
    Network(String),

    #[error("search request timed out after {0:?}")]
    Timeout(Duration),

    #[error("search backend answered with status {0}")]
    BadStatus(u16),

    #[error("search backend returned an unreadable body: {0}")]
    Decode(String),

    #[error("load more rejected: {0}")]
    LoadMoreRejected(&'static str),
}

impl CatalogError {
    /// Whether the UI should offer a retry action.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CatalogError::LoadMoreRejected(_))
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            CatalogError::BadStatus(status.as_u16())
        } else if error.is_decode() {
            CatalogError::Decode(error.to_string())
        } else {
            CatalogError::Network(error.to_string())
        }
    }
}

// Application error returned by axum handlers
#[derive(Debug)]
pub enum AppError {
    InternalServerError(anyhow::Error),
    Upstream(CatalogError),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::InternalServerError(error)
    }
}

impl From<CatalogError> for AppError {
    fn from(error: CatalogError) -> Self {
        AppError::Upstream(error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match self {
            AppError::InternalServerError(e) => {
                tracing::error!("Internal server error: {:?}", e);
                // Don't expose internal details to the client
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), false)
            }
            AppError::Upstream(e) => {
                tracing::warn!("Search backend failure: {}", e);
                let status = match e {
                    CatalogError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    CatalogError::LoadMoreRejected(_) => StatusCode::CONFLICT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string(), e.is_retryable())
            }
        };

        let body = Json(json!({ "error": message, "retryable": retryable }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable_and_maps_to_504() {
        let err = CatalogError::Timeout(Duration::from_secs(15));
        assert!(err.is_retryable());
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn rejected_load_more_is_not_retryable() {
        let err = CatalogError::LoadMoreRejected("no more pages");
        assert!(!err.is_retryable());
        assert_eq!(AppError::from(err).into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn network_failure_maps_to_502() {
        let response = AppError::from(CatalogError::Network("refused".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
