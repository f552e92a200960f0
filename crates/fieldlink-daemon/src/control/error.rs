//! HTTP error type for the local control surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fieldlink_proto::ErrorBody;
use tracing::error;

use crate::binder::BinderError;
use crate::motion::MotionError;
use crate::storage::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// The host has no actuator subsystem.
    #[error("{0}")]
    Unavailable(String),

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl ControlError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Hardware(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BinderError> for ControlError {
    fn from(e: BinderError) -> Self {
        match e {
            BinderError::NotFound(_) => Self::NotFound(e.to_string()),
            BinderError::Unavailable => Self::Unavailable(e.to_string()),
            BinderError::Hardware(inner) => Self::Hardware(inner.to_string()),
        }
    }
}

impl From<MotionError> for ControlError {
    fn from(e: MotionError) -> Self {
        match e {
            MotionError::UnknownSensor(_) => Self::NotFound(e.to_string()),
            MotionError::Database(inner) => Self::Database(inner),
        }
    }
}

impl From<DatabaseError> for ControlError {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Database(e) => {
                error!(error = %e, "Event database failure");
                "Internal server error".to_string()
            }
            Self::Hardware(e) => {
                error!(error = %e, "Actuator failure");
                self.to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::HardwareError;

    #[test]
    fn binder_errors_map_to_http_kinds() {
        let nf: ControlError = BinderError::NotFound(3).into();
        assert_eq!(nf.status(), StatusCode::NOT_FOUND);

        let na: ControlError = BinderError::Unavailable.into();
        assert_eq!(na.status(), StatusCode::NOT_IMPLEMENTED);

        let hw: ControlError = BinderError::Hardware(HardwareError::Busy(4)).into();
        assert_eq!(hw.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
