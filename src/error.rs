// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Error

/// Failure taxonomy for auction and bid operations.
///
/// Only `Timeout` and `Transport` are retryable; everything else fails the
/// same way again for the same input, so callers must not retry those with
/// the same idempotency key expecting a different outcome.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Auction not found")]
    NotFound,

    #[error("Operation not allowed in status {0}")]
    InvalidState(String),

    #[error("Auction has expired")]
    Expired,

    #[error("Bid must be strictly higher than current price")]
    TooLow { current_price: Decimal },

    #[error("Bid amount must be positive")]
    NonPositive,

    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Could not acquire auction lock in time, retry the request")]
    Timeout,

    #[error("Event publish failed: {0}")]
    Transport(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound => "NOT_FOUND",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Expired => "EXPIRED",
            Error::TooLow { .. } => "TOO_LOW",
            Error::NonPositive => "NON_POSITIVE",
            Error::Validation(_) => "VALIDATION",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden => "FORBIDDEN",
            Error::Timeout => "TIMEOUT",
            Error::Transport(_) => "TRANSPORT",
            Error::Database(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::InvalidState(_)
            | Error::Expired
            | Error::TooLow { .. }
            | Error::NonPositive
            | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Timeout | Error::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        // Storage faults stay out of client responses.
        let message = match &self {
            Error::Database(e) => {
                tracing::error!("{:<12} --> database error: {:?}", "Error", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "code": self.code(),
            "message": message,
        });
        if let Error::TooLow { current_price } = &self {
            body["current_price"] = json!(current_price);
        }

        (status, Json(body)).into_response()
    }
}

// endregion: --- Error

// region:    --- Tests


// endregion: --- Tests
