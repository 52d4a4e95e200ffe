//! Error types for the faucet service

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Message returned for requests missing a wallet or an amount
pub const INVALID_REQUEST_MESSAGE: &str = "No wallet found!";

/// Message returned when a wallet has used up its quota
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please wait before trying again.";

/// Message returned for any failure past the quota check
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error!";

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded: try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Disbursement failed: {0}")]
    Downstream(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FaucetError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FaucetError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            FaucetError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            FaucetError::Downstream(_) | FaucetError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Downstream and config details stay in the logs
        let message = match &self {
            FaucetError::InvalidRequest(_) => INVALID_REQUEST_MESSAGE,
            FaucetError::RateLimited { .. } => RATE_LIMITED_MESSAGE,
            FaucetError::Downstream(_) | FaucetError::Config(_) => INTERNAL_ERROR_MESSAGE,
        };

        let mut response = (status, Json(json!({ "message": message }))).into_response();

        if let FaucetError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            FaucetError::InvalidRequest("missing".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FaucetError::RateLimited { retry_after_secs: 10 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            FaucetError::Downstream("timeout".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = FaucetError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from(42u64))
        );
    }

    #[test]
    fn test_downstream_hides_details() {
        let err = FaucetError::Downstream("connection refused to 10.0.0.1".into());
        assert!(err.to_string().contains("connection refused"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
