use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use viviana_core::CoreError;
use viviana_types::api::ErrorResponse;

/// Error returned by every handler, rendered as
/// `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication required")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Access denied")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            CoreError::InvalidAmount(_)
            | CoreError::Validation(_)
            | CoreError::EmptyMessage
            | CoreError::InvalidVerificationCode => StatusCode::BAD_REQUEST,
            CoreError::UserNotFound(_)
            | CoreError::PaymentNotFound(_)
            | CoreError::PackageNotFound(_)
            | CoreError::JokerNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::EmailTaken | CoreError::InvalidPaymentState { .. } => StatusCode::CONFLICT,
            CoreError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            CoreError::EmailNotVerified
            | CoreError::AccountDisabled(_)
            | CoreError::JokerLocked { .. } => StatusCode::FORBIDDEN,
            CoreError::Storage(e) => {
                error!("Storage error: {:#}", e);
                return Self::internal();
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn core_errors_map_to_statuses() {
        let cases = [
            (CoreError::InsufficientBalance { balance: 0, requested: 1 }, StatusCode::PAYMENT_REQUIRED),
            (CoreError::UserNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (CoreError::EmailTaken, StatusCode::CONFLICT),
            (CoreError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (CoreError::JokerLocked { required: 3, current: 1 }, StatusCode::FORBIDDEN),
            (CoreError::EmptyMessage, StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn storage_errors_hide_details() {
        let err = ApiError::from(CoreError::Storage(anyhow::anyhow!("disk on fire")));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }
}
