use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Verification code mismatch")]
    OtpMismatch,

    #[error("Verification code expired")]
    OtpExpired,

    #[error("Challenge not found")]
    ChallengeNotFound,

    #[error("Credential not found")]
    CredentialNotFound,

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Biometric login is not enabled")]
    BiometricNotEnabled,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn success_message(message: &str) -> ApiResponse<()> {
        ApiResponse {
            code: 0,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn error(code: i32, message: &str) -> ApiResponse<()> {
        ApiResponse {
            code,
            message: message.to_string(),
            data: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 500, "Database error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, 404, msg.clone()),
            AppError::AlreadyExists(msg) => (StatusCode::CONFLICT, 409, msg.clone()),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, 4011, self.to_string()),
            AppError::OtpMismatch => (StatusCode::BAD_REQUEST, 4001, self.to_string()),
            AppError::OtpExpired => (StatusCode::BAD_REQUEST, 4002, self.to_string()),
            AppError::ChallengeNotFound => (StatusCode::BAD_REQUEST, 4003, self.to_string()),
            AppError::CredentialNotFound => (StatusCode::UNAUTHORIZED, 4012, self.to_string()),
            AppError::VerificationFailed(msg) => {
                tracing::warn!("Ceremony verification failed: {}", msg);
                (StatusCode::UNAUTHORIZED, 4013, "Verification failed".to_string())
            }
            AppError::BiometricNotEnabled => (StatusCode::BAD_REQUEST, 4004, self.to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 401, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, 400, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, 500, msg.clone())
            }
            AppError::Email(msg) => {
                tracing::error!("Email delivery error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, 5001, "Email delivery failed".to_string())
            }
            AppError::Jwt(e) => {
                tracing::warn!("JWT error: {:?}", e);
                (StatusCode::UNAUTHORIZED, 401, "Invalid token".to_string())
            }
        };

        let body = Json(ApiResponse::<()>::error(code, &message));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
