use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use chrono::Utc;
use log::error;
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::history::StoreError;
use crate::models::api::ErrorResponse;

/// Failures surfaced to HTTP clients as `{ "error", "timestamp" }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Too many requests, please slow down")]
    RateLimited,
    /// Details are logged, never returned.
    #[error("{public}")]
    Internal {
        public: &'static str,
        detail: String,
    },
}

impl ApiError {
    pub fn internal(public: &'static str, detail: impl ToString) -> Self {
        ApiError::Internal { public, detail: detail.to_string() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal { public, detail } = &self {
            error!("{}: {}", public, detail);
        }
        let body = ErrorResponse {
            error: self.to_string(),
            timestamp: Utc::now(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound("Conversation not found".to_string()),
            other => ApiError::internal("Conversation store error", other),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::NotFound(_) | AnalysisError::Store(StoreError::NotFound(_)) =>
                ApiError::NotFound("Conversation not found".to_string()),
            AnalysisError::NoMessages(_) =>
                ApiError::Validation("No messages to analyze".to_string()),
            AnalysisError::CompletionUnavailable =>
                ApiError::internal("Failed to analyze conversation", "completion API is not configured"),
            AnalysisError::Completion(e) => ApiError::internal("Failed to analyze conversation", e),
            AnalysisError::Store(e) => ApiError::internal("Failed to analyze conversation", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_status_codes() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (StoreError::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (StoreError::Backend("down".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (AnalysisError::NoMessages("x".into()).into(), StatusCode::BAD_REQUEST),
            (AnalysisError::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (AnalysisError::CompletionUnavailable.into(), StatusCode::INTERNAL_SERVER_ERROR),
            (AnalysisError::Store(StoreError::Backend("down".into())).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{:?}", err);
        }
    }

    // The record can vanish between the load and the persist step of an analysis.
    #[test]
    fn conversation_deleted_during_analysis_is_not_found() {
        let err: ApiError = AnalysisError::Store(StoreError::NotFound("c1".into())).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Conversation not found");
    }

    #[test]
    fn internal_details_stay_private() {
        let err: ApiError = StoreError::Backend("redis://secret-host refused".into()).into();
        assert_eq!(err.to_string(), "Conversation store error");
    }
}
