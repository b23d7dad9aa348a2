use utoipa::OpenApi;

use super::handlers::{
    admin::{self, CreateAccountRequest, CreateAccountResponse, ResetPasswordResponse, SetEnabledRequest},
    auth::{
        login, otp, password, session,
        types::{ChangePasswordRequest, LoginRequest, MfaPendingResponse, SessionResponse, VerifyCodeRequest},
    },
    health::{self, Health},
    ErrorBody,
};
use crate::auth::Role;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login,
        otp::verify,
        otp::resend,
        session::session,
        session::logout,
        password::change_password,
        admin::create_account,
        admin::unlock,
        admin::reset_password,
        admin::set_enabled,
    ),
    components(schemas(
        Health,
        ErrorBody,
        Role,
        LoginRequest,
        VerifyCodeRequest,
        ChangePasswordRequest,
        SessionResponse,
        MfaPendingResponse,
        CreateAccountRequest,
        CreateAccountResponse,
        ResetPasswordResponse,
        SetEnabledRequest,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Login, one-time codes and sessions"),
        (name = "admin", description = "Account administration"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_login_pipeline() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/otp/verify",
            "/v1/auth/otp/resend",
            "/v1/auth/session",
            "/v1/admin/accounts/{username}/unlock",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
