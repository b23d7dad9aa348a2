//! Login orchestration.
//!
//! ```text
//! ANONYMOUS --submit--> CREDENTIALS_CHECKED --+--> REJECTED
//!                                             +--> LOCKED
//!                                             +--> SESSION_ACTIVE        (second factor off)
//!                                             +--> MFA_PENDING --code--> SESSION_ACTIVE
//!                                                       |  \--resend--> MFA_PENDING
//!                                                       \--timeout--> EXPIRED
//! ```
//!
//! A wrong or expired code keeps the login in `MFA_PENDING`; only the
//! pending timeout ends it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{
    account::Account,
    config::AuthConfig,
    delivery::{mask_address, CodeDispatcher},
    error::AuthError,
    hasher::PasswordHasher,
    otp::{IssuedCode, OtpService},
    password::normalize_username,
    pending::{PendingLookup, PendingStore},
    session::SessionPrincipal,
    verifier::{CredentialVerifier, VerifierOutcome},
};
use crate::store::{AccountStore, CodeStore};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoginState {
    Anonymous,
    CredentialsChecked,
    Rejected,
    Locked,
    MfaPending,
    SessionActive,
    Expired,
}

impl LoginState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::CredentialsChecked => "credentials_checked",
            Self::Rejected => "rejected",
            Self::Locked => "locked",
            Self::MfaPending => "mfa_pending",
            Self::SessionActive => "session_active",
            Self::Expired => "expired",
        }
    }
}

/// Second-factor challenge handed back after the password was accepted.
#[derive(Debug)]
pub struct MfaChallenge {
    pub pending_id: Uuid,
    /// Masked contact address, safe to display.
    pub destination: String,
    pub issued: IssuedCode,
}

#[derive(Debug)]
pub enum LoginStep {
    SessionActive(SessionPrincipal),
    MfaPending(MfaChallenge),
}

impl LoginStep {
    #[must_use]
    pub fn state(&self) -> LoginState {
        match self {
            Self::SessionActive(_) => LoginState::SessionActive,
            Self::MfaPending(_) => LoginState::MfaPending,
        }
    }
}

impl AuthError {
    /// Terminal login state an error leaves the caller in.
    #[must_use]
    pub fn login_state(&self) -> LoginState {
        match self {
            Self::AccountLocked => LoginState::Locked,
            Self::SessionExpired => LoginState::Expired,
            Self::InvalidOrExpiredCode => LoginState::MfaPending,
            _ => LoginState::Rejected,
        }
    }
}

pub struct LoginService {
    accounts: Arc<dyn AccountStore>,
    verifier: CredentialVerifier,
    otp: Arc<OtpService>,
    pending: PendingStore,
    mfa_required: bool,
}

impl LoginService {
    /// # Errors
    /// Returns an error if the credential verifier cannot be initialised.
    pub fn new(
        config: &AuthConfig,
        accounts: Arc<dyn AccountStore>,
        codes: Arc<dyn CodeStore>,
        hasher: Arc<dyn PasswordHasher>,
        dispatcher: CodeDispatcher,
    ) -> Result<Self> {
        let verifier = CredentialVerifier::new(accounts.clone(), hasher, config.lockout_policy())?;
        let otp = Arc::new(OtpService::new(codes, dispatcher, config.code_ttl()));
        Ok(Self {
            accounts,
            verifier,
            otp,
            pending: PendingStore::new(config.pending_ttl()),
            mfa_required: config.mfa_required(),
        })
    }

    #[must_use]
    pub fn otp(&self) -> Arc<OtpService> {
        self.otp.clone()
    }

    /// # Errors
    /// Returns `AuthError::StorageFailure` if the account store fails.
    pub async fn check_credentials(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifierOutcome, AuthError> {
        self.verifier
            .check_credentials(&normalize_username(username), password, now)
            .await
    }

    /// Handle a submitted username and password.
    ///
    /// # Errors
    /// Returns the rejection reason as an `AuthError`.
    pub async fn submit(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginStep, AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials {
                remaining_attempts: None,
            });
        }

        let account = match self.check_credentials(username, password, now).await? {
            VerifierOutcome::Accepted(account) => account,
            VerifierOutcome::Rejected(reason) => return Err(reason.into()),
            VerifierOutcome::Locked => return Err(AuthError::AccountLocked),
        };

        if !self.mfa_required {
            info!(username = %account.username, "login succeeded without second factor");
            return Ok(LoginStep::SessionActive(Self::begin_session(&account)));
        }

        let issued = self
            .otp
            .issue(&account.username, account.contact_address(), now)
            .await
            .map_err(AuthError::StorageFailure)?;
        let pending_id = self.pending.begin(&account.username, now).await;

        info!(username = %account.username, "password accepted, awaiting one-time code");
        Ok(LoginStep::MfaPending(MfaChallenge {
            pending_id,
            destination: mask_address(account.contact_address()),
            issued,
        }))
    }

    /// Complete a pending login with the code the user typed.
    ///
    /// # Errors
    /// `SessionExpired` once the pending login timed out, `InvalidOrExpiredCode`
    /// for a wrong or stale code (the login stays pending) and for a replay
    /// after the login completed.
    pub async fn verify_code(
        &self,
        pending_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionPrincipal, AuthError> {
        let pending = self
            .active_pending(pending_id, now, AuthError::InvalidOrExpiredCode)
            .await?;

        let valid = self
            .otp
            .validate(&pending.owner, code.trim(), now)
            .await
            .map_err(AuthError::StorageFailure)?;
        if !valid {
            info!(username = %pending.owner, "one-time code rejected");
            return Err(AuthError::InvalidOrExpiredCode);
        }

        self.pending.complete(pending_id).await;

        let account = self
            .accounts
            .find(&pending.owner)
            .await
            .map_err(AuthError::StorageFailure)?
            .ok_or(AuthError::InvalidCredentials {
                remaining_attempts: None,
            })?;
        if !account.enabled {
            return Err(AuthError::AccountDisabled);
        }

        info!(username = %account.username, "login completed with one-time code");
        Ok(Self::begin_session(&account))
    }

    /// Send a fresh code for a pending login. The pending timeout keeps
    /// running from the original password check.
    ///
    /// # Errors
    /// `SessionExpired` once the pending login timed out.
    pub async fn resend(&self, pending_id: Uuid, now: DateTime<Utc>) -> Result<MfaChallenge, AuthError> {
        let pending = self
            .active_pending(pending_id, now, AuthError::SessionExpired)
            .await?;

        let account = self
            .accounts
            .find(&pending.owner)
            .await
            .map_err(AuthError::StorageFailure)?;
        let Some(account) = account.filter(|account| account.enabled) else {
            self.pending.discard(pending_id).await;
            return Err(AuthError::SessionExpired);
        };

        let issued = self
            .otp
            .issue(&account.username, account.contact_address(), now)
            .await
            .map_err(AuthError::StorageFailure)?;

        info!(username = %account.username, "one-time code re-sent");
        Ok(MfaChallenge {
            pending_id,
            destination: mask_address(account.contact_address()),
            issued,
        })
    }

    #[must_use]
    pub fn begin_session(account: &Account) -> SessionPrincipal {
        SessionPrincipal::for_account(account)
    }

    /// `on_completed` is returned for a login a code already completed.
    async fn active_pending(
        &self,
        pending_id: Uuid,
        now: DateTime<Utc>,
        on_completed: AuthError,
    ) -> Result<super::pending::PendingAuthentication, AuthError> {
        match self.pending.lookup(pending_id, now).await {
            PendingLookup::Active(pending) => Ok(pending),
            PendingLookup::Completed => {
                info!(%pending_id, "pending login already completed");
                Err(on_completed)
            }
            PendingLookup::Expired => {
                info!(%pending_id, "pending login expired");
                Err(AuthError::SessionExpired)
            }
            PendingLookup::Missing => Err(AuthError::SessionExpired),
        }
    }
}
