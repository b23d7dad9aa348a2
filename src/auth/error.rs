//! Error taxonomy for the login pipeline and account administration.

use super::config::MIN_PASSWORD_LENGTH;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials { remaining_attempts: Option<u32> },
    #[error("account temporarily locked")]
    AccountLocked,
    #[error("account disabled")]
    AccountDisabled,
    #[error("pending authentication expired")]
    SessionExpired,
    #[error("invalid or expired code")]
    InvalidOrExpiredCode,
    #[error("new passwords do not match")]
    PasswordMismatch,
    #[error("password too short")]
    PasswordTooShort,
    #[error("current password is incorrect")]
    CurrentPasswordIncorrect,
    #[error("username is not a valid e-mail address")]
    InvalidUsername,
    #[error("account already exists")]
    AccountExists,
    #[error("account not found")]
    AccountNotFound,
    #[error("storage failure")]
    StorageFailure(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code returned in the `error` field.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials { .. } => "invalid_credentials",
            Self::AccountLocked => "account_locked",
            Self::AccountDisabled => "account_disabled",
            Self::SessionExpired => "session_expired",
            Self::InvalidOrExpiredCode => "invalid_or_expired_code",
            Self::PasswordMismatch => "password_mismatch",
            Self::PasswordTooShort => "password_too_short",
            Self::CurrentPasswordIncorrect => "current_password_incorrect",
            Self::InvalidUsername => "invalid_username",
            Self::AccountExists => "account_exists",
            Self::AccountNotFound => "account_not_found",
            Self::StorageFailure(_) => "storage_failure",
        }
    }

    /// Message shown to the person at the login form.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials {
                remaining_attempts: Some(remaining),
            } => format!(
                "Invalid username or password. {remaining} attempt{} remaining before the account is locked.",
                if *remaining == 1 { "" } else { "s" }
            ),
            Self::InvalidCredentials { .. } => "Invalid username or password.".to_string(),
            Self::AccountLocked => "Account temporarily locked due to multiple failed login attempts. \
                 Please try again later or contact an administrator."
                .to_string(),
            Self::AccountDisabled => {
                "Your account has been disabled. Please contact an administrator.".to_string()
            }
            Self::SessionExpired => "Session expired. Please log in again.".to_string(),
            Self::InvalidOrExpiredCode => {
                "Invalid or expired verification code. Please try again.".to_string()
            }
            Self::PasswordMismatch => "New passwords do not match.".to_string(),
            Self::PasswordTooShort => {
                format!("Password must be at least {MIN_PASSWORD_LENGTH} characters long.")
            }
            Self::CurrentPasswordIncorrect => "Current password is incorrect.".to_string(),
            Self::InvalidUsername => "Username must be a valid e-mail address.".to_string(),
            Self::AccountExists => "An account with that username already exists.".to_string(),
            Self::AccountNotFound => "Account not found.".to_string(),
            Self::StorageFailure(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}
