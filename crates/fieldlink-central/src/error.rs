//! HTTP error type for the central API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fieldlink_core::db::DatabaseError;
use fieldlink_proto::v1::ErrorBody;
use tracing::error;

/// Central API errors mapped to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing, unknown or inactive device token.
    #[error("{0}")]
    Unauthorized(String),

    /// Valid token that does not own the target.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Rejected before any mutation.
    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            DatabaseError::Constraint(msg) => Self::Validation(msg),
            other => Self::Database(other),
        }
    }
}

impl From<fieldlink_core::Error> for ApiError {
    fn from(e: fieldlink_core::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Database(e) => {
                error!(error = %e, "Registry database failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_map_to_http_kinds() {
        let nf: ApiError = DatabaseError::NotFound("Relay 3".into()).into();
        assert_eq!(nf.status(), StatusCode::NOT_FOUND);
        assert_eq!(nf.to_string(), "Relay 3 not found");

        let dup: ApiError = DatabaseError::Constraint("pin taken".into()).into();
        assert_eq!(dup.status(), StatusCode::BAD_REQUEST);

        let q: ApiError = DatabaseError::Query("disk I/O".into()).into();
        assert_eq!(q.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
