//! Password check with progressive lockout.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    account::{Account, LockoutPolicy},
    error::AuthError,
    hasher::{matches_blocking, PasswordHasher},
};
use crate::store::{AccountStore, AttemptClaim};

/// Remaining-attempt counts at or below this value are revealed to the caller.
const REMAINING_ATTEMPTS_HINT: u32 = 3;

#[derive(Debug)]
pub enum VerifierOutcome {
    Accepted(Account),
    Rejected(RejectReason),
    Locked,
}

#[derive(Debug, Eq, PartialEq)]
pub enum RejectReason {
    InvalidCredentials { remaining_attempts: Option<u32> },
    Disabled,
}

impl From<RejectReason> for AuthError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::InvalidCredentials { remaining_attempts } => {
                Self::InvalidCredentials { remaining_attempts }
            }
            RejectReason::Disabled => Self::AccountDisabled,
        }
    }
}

pub struct CredentialVerifier {
    accounts: Arc<dyn AccountStore>,
    hasher: Arc<dyn PasswordHasher>,
    policy: LockoutPolicy,
    // Compared against when the username is unknown so both paths pay for a hash.
    dummy_hash: String,
}

impl CredentialVerifier {
    /// # Errors
    /// Returns an error if the placeholder hash cannot be computed.
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        hasher: Arc<dyn PasswordHasher>,
        policy: LockoutPolicy,
    ) -> Result<Self> {
        let dummy_hash = hasher.hash(&uuid::Uuid::new_v4().to_string())?;
        Ok(Self {
            accounts,
            hasher,
            policy,
            dummy_hash,
        })
    }

    #[must_use]
    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    /// Decide whether `password` is correct for `username` at `now`.
    ///
    /// The attempt is counted under the account's lock before the password
    /// is compared, so parallel guesses cannot all slip past an unlocked
    /// snapshot. A match takes the count back unless another attempt locked
    /// the account meanwhile, in which case it is reported as `Locked`. A
    /// locked account short-circuits and its counter is left alone.
    ///
    /// # Errors
    /// Returns `AuthError::StorageFailure` if the account store fails.
    pub async fn check_credentials(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifierOutcome, AuthError> {
        let claim = self
            .accounts
            .claim_attempt(username, now, self.policy)
            .await
            .map_err(AuthError::StorageFailure)?;

        let account = match claim {
            AttemptClaim::Unknown => {
                // No counter is kept for unknown usernames.
                let _ = self.password_matches(password, &self.dummy_hash).await;
                info!("login rejected: unknown username");
                return Ok(VerifierOutcome::Rejected(RejectReason::InvalidCredentials {
                    remaining_attempts: None,
                }));
            }
            AttemptClaim::Disabled => {
                info!(username, "login rejected: account disabled");
                return Ok(VerifierOutcome::Rejected(RejectReason::Disabled));
            }
            AttemptClaim::Locked => {
                info!(username, "login rejected: account locked");
                return Ok(VerifierOutcome::Locked);
            }
            AttemptClaim::Counted(account) => account,
        };

        if self.password_matches(password, &account.password_hash).await {
            let settled = self
                .accounts
                .settle_success(username, account.failed_attempts, now)
                .await
                .map_err(AuthError::StorageFailure)?;
            if !settled {
                warn!(username, "correct password arrived after the account locked");
                return Ok(VerifierOutcome::Locked);
            }
            let mut account = account;
            account.register_success();
            return Ok(VerifierOutcome::Accepted(account));
        }

        if account.is_locked(now) {
            warn!(
                username,
                failed_attempts = account.failed_attempts,
                "account locked after repeated failed logins"
            );
            return Ok(VerifierOutcome::Locked);
        }

        let remaining = account.remaining_attempts(self.policy);
        info!(
            username,
            failed_attempts = account.failed_attempts,
            "login rejected: wrong password"
        );
        Ok(VerifierOutcome::Rejected(RejectReason::InvalidCredentials {
            remaining_attempts: remaining_attempts_hint(remaining),
        }))
    }

    async fn password_matches(&self, password: &str, hash: &str) -> bool {
        matches_blocking(self.hasher.clone(), password.to_string(), hash.to_string()).await
    }
}

fn remaining_attempts_hint(remaining: u32) -> Option<u32> {
    (1..=REMAINING_ATTEMPTS_HINT)
        .contains(&remaining)
        .then_some(remaining)
}
