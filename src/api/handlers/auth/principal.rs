//! Authenticated principal extraction and authorization helpers.
//!
//! Handlers receive the principal explicitly; nothing here is stored in a
//! request-global context.

use axum::{
    http::{HeaderMap, StatusCode},
    response::Response,
};
use chrono::Utc;

use super::session::extract_session_token;
use crate::{
    api::handlers::error_response,
    auth::{AuthState, SessionPrincipal},
};

/// Resolve the session cookie or bearer token, or answer 401.
///
/// # Errors
/// Returns a ready-made 401 response when no live session is presented.
pub async fn require_auth(headers: &HeaderMap, auth: &AuthState) -> Result<SessionPrincipal, Response> {
    let Some(token) = extract_session_token(headers) else {
        return Err(unauthenticated());
    };
    auth.sessions()
        .resolve(&token, Utc::now())
        .await
        .ok_or_else(unauthenticated)
}

/// Like [`require_auth`], additionally requiring an administrator that has
/// already replaced any temporary password.
///
/// # Errors
/// 401 without a session, 403 for members or pending password changes.
pub async fn require_admin(headers: &HeaderMap, auth: &AuthState) -> Result<SessionPrincipal, Response> {
    let principal = require_auth(headers, auth).await?;
    if !principal.is_admin() {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Administrator access required.",
        ));
    }
    if principal.force_password_change {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "password_change_required",
            "Change your password before using administrative functions.",
        ));
    }
    Ok(principal)
}

fn unauthenticated() -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        "Please log in.",
    )
}
