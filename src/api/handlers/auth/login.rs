//! Password submission.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

use super::{
    session::{pending_cookie, session_established},
    types::{LoginRequest, MfaPendingResponse, SessionResponse},
};
use crate::{
    api::handlers::{error_response, missing_payload, ErrorBody},
    auth::{login::MfaChallenge, AuthConfig, AuthState, LoginStep},
};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established", body = SessionResponse),
        (status = 202, description = "Password accepted, one-time code sent", body = MfaPendingResponse),
        (status = 400, description = "Missing payload", body = ErrorBody),
        (status = 401, description = "Invalid username or password", body = ErrorBody),
        (status = 403, description = "Account disabled", body = ErrorBody),
        (status = 423, description = "Account temporarily locked", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    auth: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let now = Utc::now();
    match auth
        .login()
        .submit(&request.username, &request.password, now)
        .await
    {
        Ok(LoginStep::SessionActive(principal)) => session_established(&auth, principal, now).await,
        Ok(LoginStep::MfaPending(challenge)) => mfa_pending(auth.config(), &challenge),
        Err(err) => err.into_response(),
    }
}

/// 202 with the pending-login cookie set.
pub(super) fn mfa_pending(config: &AuthConfig, challenge: &MfaChallenge) -> Response {
    let mut headers = HeaderMap::new();
    match pending_cookie(config, challenge.pending_id) {
        Ok(cookie) => {
            headers.append(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build pending cookie: {err}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "session_error",
                "Something went wrong. Please try again.",
            );
        }
    }
    (
        StatusCode::ACCEPTED,
        headers,
        Json(MfaPendingResponse::new(challenge.destination.clone())),
    )
        .into_response()
}
