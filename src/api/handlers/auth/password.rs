//! Self-service password change.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use super::{principal::require_auth, types::ChangePasswordRequest};
use crate::{
    api::handlers::{missing_payload, ErrorBody},
    auth::AuthState,
};

#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Mismatch, too short, or wrong current password", body = ErrorBody),
        (status = 401, description = "No active session", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &auth).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    if let Err(err) = auth
        .accounts()
        .change_password(
            &principal.username,
            &request.current_password,
            &request.new_password,
            &request.confirm_password,
        )
        .await
    {
        return err.into_response();
    }

    auth.sessions()
        .clear_password_directive(&principal.username)
        .await;
    StatusCode::NO_CONTENT.into_response()
}
