use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Too many requests, try again later")]
    TooManyRequests,

    #[error("Database error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::OrmError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // 5xx bodies carry only the generic message; the cause goes to the log.
        let body = match &self {
            AppError::OrmError(err) => {
                tracing::error!(error = %err, "database error");
                ApiResponse::failure(self.to_string(), "Internal Server Error")
            }
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "internal error");
                ApiResponse::failure(self.to_string(), "Internal Server Error")
            }
            _ => {
                let message = status
                    .canonical_reason()
                    .unwrap_or("Error")
                    .to_string();
                ApiResponse::failure(message, self.to_string())
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// A unique-key violation becomes a 400 with `message`; anything else stays
/// a database error.
pub fn conflict(err: DbErr, message: impl Into<String>) -> AppError {
    if is_unique_violation(&err) {
        AppError::BadRequest(message.into())
    } else {
        AppError::OrmError(err)
    }
}
