use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::storage::StorageError;

/// AppError
///
/// The single failure type shared by handlers, the policy, the query builder and
/// the repositories. Every variant renders as `{"code": ..., "error": ...}` so the
/// frontend can branch on a stable machine-readable kind.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed input or a duplicate (e.g. email already registered).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing/invalid/expired token, wrong credentials, inactive account.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Role or ownership denial from the access-control policy.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown id, or a blob missing from storage.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias used by handlers and repositories.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn forbidden() -> Self {
        AppError::Forbidden("Not authorized".to_string())
    }

    pub fn not_found(entity: &str) -> Self {
        AppError::NotFound(format!("{entity} not found"))
    }

    /// The machine-checkable kind reported in the `code` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "AUTHENTICATION_ERROR",
            AppError::Forbidden(_) => "AUTHORIZATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Database(err) if is_unique_violation(err) => "VALIDATION_ERROR",
            AppError::Database(sqlx::Error::RowNotFound) => "NOT_FOUND",
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "AUTHENTICATION_ERROR" => StatusCode::UNAUTHORIZED,
            "AUTHORIZATION_ERROR" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Database(err) if is_unique_violation(err) => {
                "Duplicate value violates a unique constraint".to_string()
            }
            AppError::Database(sqlx::Error::RowNotFound) => "Resource not found".to_string(),
            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                "An internal error occurred".to_string()
            }
            AppError::Storage(err) => {
                tracing::error!(error = %err, "Storage error");
                "An internal error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                "An internal error occurred".to_string()
            }
        };

        let body = json!({
            "code": self.code(),
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

/// PostgreSQL unique constraint violation: SQLSTATE 23505.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_documented_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden().status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("Delivery").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn row_not_found_is_reported_as_not_found() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn not_found_message_names_the_entity() {
        match AppError::not_found("NCE") {
            AppError::NotFound(msg) => assert_eq!(msg, "NCE not found"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
