//! Second-factor endpoints: verify and resend the one-time code.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::sync::Arc;

use super::{
    login::mfa_pending,
    session::{clear_cookie, extract_pending_id, session_established, PENDING_COOKIE_NAME},
    types::{MfaPendingResponse, SessionResponse, VerifyCodeRequest},
};
use crate::{
    api::handlers::{missing_payload, ErrorBody},
    auth::{AuthConfig, AuthError, AuthState},
};

#[utoipa::path(
    post,
    path = "/v1/auth/otp/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Code accepted, session established", body = SessionResponse),
        (status = 400, description = "Invalid or expired code; login still pending", body = ErrorBody),
        (status = 401, description = "Pending login expired or missing", body = ErrorBody),
        (status = 403, description = "Account disabled", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyCodeRequest>>,
) -> Response {
    let Some(pending_id) = extract_pending_id(&headers) else {
        return expired(auth.config(), AuthError::SessionExpired);
    };
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let now = Utc::now();
    match auth.login().verify_code(pending_id, &request.code, now).await {
        Ok(principal) => session_established(&auth, principal, now).await,
        Err(err @ AuthError::SessionExpired) => expired(auth.config(), err),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/otp/resend",
    responses(
        (status = 202, description = "A new code was sent", body = MfaPendingResponse),
        (status = 401, description = "Pending login expired or missing", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn resend(headers: HeaderMap, auth: Extension<Arc<AuthState>>) -> Response {
    let Some(pending_id) = extract_pending_id(&headers) else {
        return expired(auth.config(), AuthError::SessionExpired);
    };

    match auth.login().resend(pending_id, Utc::now()).await {
        Ok(challenge) => mfa_pending(auth.config(), &challenge),
        Err(err @ AuthError::SessionExpired) => expired(auth.config(), err),
        Err(err) => err.into_response(),
    }
}

/// Error response that also drops the stale pending-login cookie.
fn expired(config: &AuthConfig, err: AuthError) -> Response {
    let mut response = err.into_response();
    if let Ok(cookie) = clear_cookie(config, PENDING_COOKIE_NAME) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}
