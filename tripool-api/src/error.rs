use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use tripool_coordinator::CoordinatorError;

#[derive(Debug)]
pub enum ApiError {
    Coordinator(CoordinatorError),
    Anyhow(anyhow::Error),
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        Self::Coordinator(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Coordinator(err) => {
                let status = match &err {
                    CoordinatorError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                    CoordinatorError::PaymentFailed { .. } => StatusCode::PAYMENT_REQUIRED,
                    CoordinatorError::NotHost => StatusCode::FORBIDDEN,
                    CoordinatorError::ConfigurationMissing
                    | CoordinatorError::TripUnknown
                    | CoordinatorError::NothingToRemove
                    | CoordinatorError::AlreadyFinal
                    | CoordinatorError::NothingToReconcile => StatusCode::NOT_FOUND,
                    CoordinatorError::AlreadyExists
                    | CoordinatorError::AlreadyPending
                    | CoordinatorError::AlreadyAuthorized
                    | CoordinatorError::ThresholdNotMet { .. } => StatusCode::CONFLICT,
                    CoordinatorError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
                    CoordinatorError::InvalidTransition { .. } => {
                        tracing::error!("invalid transition surfaced to the API: {}", err);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    CoordinatorError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, err.to_string())
            }
            ApiError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
