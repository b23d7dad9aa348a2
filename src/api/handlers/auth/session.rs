//! Session endpoints and cookie helpers for cookie and bearer auth.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::types::SessionResponse;
use crate::{
    api::handlers::error_response,
    auth::{AuthConfig, AuthState, SessionPrincipal},
};

pub(crate) const SESSION_COOKIE_NAME: &str = "rta_session";
pub(crate) const PENDING_COOKIE_NAME: &str = "rta_pending";

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match auth.sessions().resolve(&token, Utc::now()).await {
        Some(principal) => (StatusCode::OK, Json(SessionResponse::from(principal))).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth: Extension<Arc<AuthState>>) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        auth.sessions().revoke(&token).await;
    }

    // Always clear the cookie, even if the session was unknown.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_cookie(auth.config(), SESSION_COOKIE_NAME) {
        response_headers.append(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Store a session for `principal` and answer 200 with the session cookie set.
pub(super) async fn session_established(
    auth: &AuthState,
    principal: SessionPrincipal,
    now: DateTime<Utc>,
) -> Response {
    let token = match auth.sessions().establish(principal.clone(), now).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to establish session: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "session_error",
                "Something went wrong. Please try again.",
            );
        }
    };

    let mut headers = HeaderMap::new();
    match session_cookie(auth.config(), &token) {
        Ok(cookie) => {
            headers.append(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "session_error",
                "Something went wrong. Please try again.",
            );
        }
    }
    if let Ok(cookie) = clear_cookie(auth.config(), PENDING_COOKIE_NAME) {
        headers.append(SET_COOKIE, cookie);
    }

    (StatusCode::OK, headers, Json(SessionResponse::from(principal))).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(config, SESSION_COOKIE_NAME, token, config.session_ttl_seconds())
}

/// Build the cookie that carries a pending login id.
pub(super) fn pending_cookie(
    config: &AuthConfig,
    pending_id: Uuid,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        config,
        PENDING_COOKIE_NAME,
        &pending_id.to_string(),
        config.pending_ttl_seconds(),
    )
}

pub(super) fn clear_cookie(
    config: &AuthConfig,
    name: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(config, name, "", 0)
}

fn build_cookie(
    config: &AuthConfig,
    name: &str,
    value: &str,
    max_age: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    // Only mark cookies secure when the frontend is served over HTTPS.
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    extract_cookie(headers, SESSION_COOKIE_NAME)
}

pub(super) fn extract_pending_id(headers: &HeaderMap) -> Option<Uuid> {
    extract_cookie(headers, PENDING_COOKIE_NAME).and_then(|value| Uuid::parse_str(&value).ok())
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next().unwrap_or_default().trim();
            let val = parts.next().unwrap_or_default().trim();
            if key == name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
