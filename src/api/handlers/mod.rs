pub mod admin;
pub mod auth;
pub mod health;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;

/// JSON error body shared by every endpoint.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

impl ErrorBody {
    #[must_use]
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            remaining_attempts: None,
        }
    }
}

pub(crate) fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(ErrorBody::new(error, message))).into_response()
}

pub(crate) fn missing_payload() -> Response {
    error_response(StatusCode::BAD_REQUEST, "invalid_request", "Missing payload")
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials { .. } | Self::SessionExpired => StatusCode::UNAUTHORIZED,
            Self::AccountLocked => StatusCode::LOCKED,
            Self::AccountDisabled => StatusCode::FORBIDDEN,
            Self::InvalidOrExpiredCode
            | Self::PasswordMismatch
            | Self::PasswordTooShort
            | Self::CurrentPasswordIncorrect
            | Self::InvalidUsername => StatusCode::BAD_REQUEST,
            Self::AccountExists => StatusCode::CONFLICT,
            Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::StorageFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::StorageFailure(err) = &self {
            error!("storage failure: {err:#}");
        }
        let remaining_attempts = match &self {
            Self::InvalidCredentials { remaining_attempts } => *remaining_attempts,
            _ => None,
        };
        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.user_message(),
            remaining_attempts,
        };
        (self.status(), Json(body)).into_response()
    }
}
