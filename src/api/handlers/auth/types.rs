//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{LoginState, Role, SessionPrincipal};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub state: String,
    pub username: String,
    pub role: Role,
    /// Client must route to the password-change step before anything else.
    pub force_password_change: bool,
}

impl From<SessionPrincipal> for SessionResponse {
    fn from(principal: SessionPrincipal) -> Self {
        Self {
            state: LoginState::SessionActive.as_str().to_string(),
            username: principal.username,
            role: principal.role,
            force_password_change: principal.force_password_change,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaPendingResponse {
    pub state: String,
    /// Masked address the code was sent to.
    pub destination: String,
    pub message: String,
}

impl MfaPendingResponse {
    #[must_use]
    pub fn new(destination: String) -> Self {
        let message = format!("A verification code has been sent to {destination}.");
        Self {
            state: LoginState::MfaPending.as_str().to_string(),
            destination,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn session_response_from_principal() -> Result<()> {
        let response = SessionResponse::from(SessionPrincipal {
            username: "a@x.com".to_string(),
            role: Role::Admin,
            force_password_change: true,
        });
        let value = serde_json::to_value(&response)?;
        let state = value
            .get("state")
            .and_then(serde_json::Value::as_str)
            .context("missing state")?;
        assert_eq!(state, "session_active");
        assert_eq!(value["role"], "admin");
        assert_eq!(value["force_password_change"], true);
        Ok(())
    }

    #[test]
    fn mfa_pending_response_mentions_destination() {
        let response = MfaPendingResponse::new("jo***@example.org".to_string());
        assert_eq!(response.state, "mfa_pending");
        assert!(response.message.contains("jo***@example.org"));
    }
}
