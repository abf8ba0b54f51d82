use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The submitted password did not match.
    #[error("Invalid credentials")]
    InvalidCredentials {
        /// Attempts left before the client gets locked out.
        remaining_attempts: u32,
    },

    /// Too many failed logins; carries a human-readable wait estimate.
    #[error("Rate limited: retry in {retry_after}")]
    RateLimited { retry_after: String },

    /// No session cookie, or the cookie did not validate.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The machine-readable error kind sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Redis(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    code: &'a str,
    #[serde(rename = "remainingAttempts", skip_serializing_if = "Option::is_none")]
    remaining_attempts: Option<u32>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let mut remaining_attempts = None;

        let (status, message) = match self {
            AppError::InvalidCredentials { remaining_attempts: left } => {
                tracing::warn!("Login rejected, {} attempts left", left);
                remaining_attempts = Some(left);
                (StatusCode::UNAUTHORIZED, "Invalid password".to_string())
            }

            AppError::RateLimited { ref retry_after } => {
                tracing::warn!("Rate limit exceeded, retry in {}", retry_after);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    format!("Too many failed login attempts. Try again in {}", retry_after),
                )
            }

            AppError::Unauthenticated => {
                tracing::debug!("Unauthenticated request");
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&ErrorBody {
            error: message,
            code,
            remaining_attempts,
        })
        .unwrap_or_else(|_| {
            r#"{"error":"Internal server error","code":"INTERNAL_ERROR"}"#.to_string()
        });

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
