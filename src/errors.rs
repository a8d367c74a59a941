use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::scheduling::{Rejection, ValidationOutcome};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    /// The action is legitimate but premature, e.g. booking a consultancy
    /// that is still under verification.
    #[error("{0}")]
    NotPermitted(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{}", .0.reason())]
    Validation(ValidationOutcome),
}

impl From<ValidationOutcome> for AppError {
    fn from(outcome: ValidationOutcome) -> Self {
        match &outcome.rejection {
            Some(Rejection::ConsultancyNotFound) => AppError::NotFound(outcome.reason()),
            Some(Rejection::UnderVerification { .. }) => AppError::NotPermitted(outcome.reason()),
            _ => AppError::Validation(outcome),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::NotPermitted(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(outcome) => match outcome.rejection {
                Some(Rejection::InvalidDate { .. } | Rejection::InvalidTime { .. }) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::CONFLICT,
            },
        };

        let body = match self {
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                generic_failure()
            }
            AppError::Validation(outcome) => {
                let mut body = serde_json::to_value(&outcome).unwrap_or_default();
                body["success"] = false.into();
                body["error"] = outcome.reason().into();
                body
            }
            other => serde_json::json!({ "success": false, "error": other.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn generic_failure() -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "error": "Something went wrong on our side. Please try again.",
    })
}
