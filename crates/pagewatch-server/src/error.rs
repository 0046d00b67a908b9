use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use pagewatch_core::error::AppError;

use crate::dto::ErrorResponse;

pub enum ApiError {
    App(AppError),
    BadRequest(String),
    NotFound(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::App(err) => match err {
                AppError::ConfigError(_) => (StatusCode::BAD_REQUEST, "config_error"),
                AppError::SerializationError(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
                AppError::NotificationError { .. } => (StatusCode::BAD_GATEWAY, "notification_error"),
                AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                AppError::StorageError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
                e if e.is_fetch_error() => (StatusCode::BAD_GATEWAY, "fetch_error"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.parts();
        let message = match self {
            ApiError::App(err) => err.to_string(),
            ApiError::BadRequest(message) | ApiError::NotFound(message) => message,
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}
