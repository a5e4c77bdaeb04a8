use crate::store::StoreError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Application-wide error type
#[derive(Debug)]
pub enum AppError {
    // Rate limiting
    QuotaExceeded { retry_after: Duration },

    // Persistence errors
    StoreUnavailable(String),

    // Configuration errors
    ConfigurationMissing(String),
    Configuration(String),

    // Validation errors
    Validation(String),

    // Internal errors
    Internal(String),
}

impl AppError {
    /// Seconds a client should wait before retrying, rounded up
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AppError::QuotaExceeded { retry_after } => {
                let secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 {
                    Some(secs + 1)
                } else {
                    Some(secs)
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::QuotaExceeded { retry_after } => write!(
                f,
                "Rate limit exceeded, retry in {}s",
                retry_after.as_secs()
            ),
            AppError::StoreUnavailable(msg) => write!(f, "Rate limit store unavailable: {}", msg),
            AppError::ConfigurationMissing(msg) => write!(f, "Missing configuration: {}", msg),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

// Implement IntoResponse for Axum
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::QuotaExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Please try again in an hour.".to_string(),
            ),
            AppError::StoreUnavailable(_) => {
                tracing::error!("Store error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error processing your request.".to_string(),
                )
            }
            AppError::ConfigurationMissing(_) | AppError::Configuration(_) => {
                tracing::error!("Configuration error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server is not configured.".to_string(),
                )
            }
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        let mut response = (status, body).into_response();

        if let Some(secs) = self.retry_after_secs() {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_maps_to_429_with_retry_after() {
        let err = AppError::QuotaExceeded {
            retry_after: Duration::from_millis(3_598_500),
        };
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "3599"
        );
    }

    #[test]
    fn test_store_unavailable_maps_to_500() {
        let response = AppError::StoreUnavailable("timed out".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_validation_maps_to_400() {
        let response = AppError::Validation("empty identifier".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_error_converts_to_store_unavailable() {
        let err: AppError = StoreError::Timeout(Duration::from_millis(250)).into();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }
}
