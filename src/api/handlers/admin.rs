//! Account administration: provisioning, unlock, password reset, enable/disable.
//!
//! Every endpoint requires an administrator session.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use super::{auth::principal::require_admin, missing_payload, ErrorBody};
use crate::auth::{password::normalize_username, AuthState, Role};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateAccountRequest {
    pub username: String,
    #[serde(default)]
    pub role: Option<Role>,
    /// Generated when omitted.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateAccountResponse {
    pub username: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordResponse {
    pub username: String,
    pub temporary_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[utoipa::path(
    post,
    path = "/v1/admin/accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = CreateAccountResponse),
        (status = 400, description = "Invalid username or password", body = ErrorBody),
        (status = 401, description = "No active session", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody),
        (status = 409, description = "Account already exists", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn create_account(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateAccountRequest>>,
) -> Response {
    let admin = match require_admin(&headers, &auth).await {
        Ok(admin) => admin,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let role = request.role.unwrap_or(Role::Member);
    match auth
        .accounts()
        .provision(&request.username, role, request.password.as_deref())
        .await
    {
        Ok(account) => {
            info!(admin = %admin.username, username = %account.username, "account created");
            let response = CreateAccountResponse {
                username: account.username,
                role: account.role,
                temporary_password: account
                    .temporary_password
                    .map(|password| password.expose_secret().to_string()),
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/accounts/{username}/unlock",
    params(("username" = String, Path, description = "Account username")),
    responses(
        (status = 204, description = "Lockout cleared"),
        (status = 401, description = "No active session", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody),
        (status = 404, description = "Account not found", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn unlock(
    headers: HeaderMap,
    Path(username): Path<String>,
    auth: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(response) = require_admin(&headers, &auth).await {
        return response;
    }
    match auth.accounts().unlock(&username).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/accounts/{username}/reset-password",
    params(("username" = String, Path, description = "Account username")),
    responses(
        (status = 200, description = "Temporary password issued", body = ResetPasswordResponse),
        (status = 401, description = "No active session", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody),
        (status = 404, description = "Account not found", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn reset_password(
    headers: HeaderMap,
    Path(username): Path<String>,
    auth: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(response) = require_admin(&headers, &auth).await {
        return response;
    }
    let username = normalize_username(&username);
    match auth.accounts().reset_password(&username).await {
        Ok(temporary) => {
            auth.sessions().revoke_user(&username).await;
            let response = ResetPasswordResponse {
                username,
                temporary_password: temporary.expose_secret().to_string(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/accounts/{username}/enabled",
    params(("username" = String, Path, description = "Account username")),
    request_body = SetEnabledRequest,
    responses(
        (status = 204, description = "Account status updated"),
        (status = 401, description = "No active session", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody),
        (status = 404, description = "Account not found", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn set_enabled(
    headers: HeaderMap,
    Path(username): Path<String>,
    auth: Extension<Arc<AuthState>>,
    payload: Option<Json<SetEnabledRequest>>,
) -> Response {
    if let Err(response) = require_admin(&headers, &auth).await {
        return response;
    }
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    let username = normalize_username(&username);
    match auth.accounts().set_enabled(&username, request.enabled).await {
        Ok(()) => {
            if !request.enabled {
                auth.sessions().revoke_user(&username).await;
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}
