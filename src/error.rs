use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::report::{aggregate::AggregateOverflow, RenderError};
use crate::sources::SourceError;

/// Error kinds that cross the HTTP boundary. Each maps to one status code and
/// a machine-readable `code`; messages are human-readable and never carry
/// driver or stack details.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("metrics source unavailable: {0}")]
    UpstreamUnavailable(SourceError),

    #[error("failed to render report: {0}")]
    Render(#[from] RenderError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Render(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "AUTHENTICATION_ERROR",
            AppError::Forbidden(_) => "AUTHORIZATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::Render(_) => "REPORT_RENDER_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The message shown to callers. Database and internal failures are
    /// replaced by a generic text; the detail only goes to the log.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database error occurred".to_owned(),
            AppError::Internal(_) => "An unexpected error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {self}");
        } else {
            tracing::debug!(code = self.code(), "request rejected: {self}");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.public_message(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<SourceError> for AppError {
    fn from(err: SourceError) -> Self {
        match err {
            // Stored samples live in our own database
            SourceError::Database(db) => AppError::Database(db),
            other => AppError::UpstreamUnavailable(other),
        }
    }
}

impl From<AggregateOverflow> for AppError {
    fn from(err: AggregateOverflow) -> Self {
        AppError::Validation(format!("Metrics for this period cannot be reported: {err}"))
    }
}

/// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(message.to_owned())
        }
        _ => AppError::Database(err),
    }
}
