//! Error handling for the verification server.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Verification server error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Email service is not configured")]
    NotConfigured,

    #[error("Failed to send verification email: {0}")]
    DispatchFailed(String),

    #[error("No verification code found for this email")]
    NotFound,

    #[error("Verification code has expired")]
    Expired,

    #[error("Invalid verification code")]
    Mismatch,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl VerificationError {
    /// HTTP status the error maps to at the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::InvalidInput(_)
            | VerificationError::NotFound
            | VerificationError::Expired
            | VerificationError::Mismatch => StatusCode::BAD_REQUEST,
            VerificationError::NotConfigured
            | VerificationError::DispatchFailed(_)
            | VerificationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for VerificationError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        let message = match &self {
            VerificationError::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias for verification operations
pub type VerificationResult<T> = Result<T, VerificationError>;
