//! Issue and validate one-time codes.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info};

use super::{
    code::{codes_match, generate_code, NewCode},
    delivery::CodeDispatcher,
};
use crate::store::CodeStore;

/// Result of issuing a code. The value is exposed for diagnostics and tests.
#[derive(Debug)]
pub struct IssuedCode {
    pub code: SecretString,
    pub expires_at: DateTime<Utc>,
}

pub struct OtpService {
    codes: Arc<dyn CodeStore>,
    dispatcher: CodeDispatcher,
    code_ttl: Duration,
}

impl OtpService {
    #[must_use]
    pub fn new(codes: Arc<dyn CodeStore>, dispatcher: CodeDispatcher, code_ttl: Duration) -> Self {
        Self {
            codes,
            dispatcher,
            code_ttl,
        }
    }

    /// Replace any unused code for `username` with a fresh one and send it.
    ///
    /// Delivery runs in the background; its failure does not fail issuance.
    ///
    /// # Errors
    /// Returns an error if the code cannot be persisted.
    pub async fn issue(
        &self,
        username: &str,
        contact_address: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedCode> {
        let stored = self
            .codes
            .replace_active(NewCode {
                username: username.to_string(),
                code: generate_code(),
                expires_at: now + self.code_ttl,
                created_at: now,
            })
            .await?;

        info!(username, code_id = stored.id, "one-time code issued");

        self.dispatcher
            .dispatch(contact_address.to_string(), stored.code.clone());

        Ok(IssuedCode {
            code: SecretString::from(stored.code),
            expires_at: stored.expires_at,
        })
    }

    /// Consume `submitted` if it is the latest unused, unexpired code.
    ///
    /// Of two concurrent calls with the same correct code, exactly one
    /// returns true.
    ///
    /// # Errors
    /// Returns an error if the code store fails.
    pub async fn validate(&self, username: &str, submitted: &str, now: DateTime<Utc>) -> Result<bool> {
        let Some(latest) = self.codes.latest_unused(username).await? else {
            return Ok(false);
        };

        if !latest.is_valid(now) || !codes_match(&latest.code, submitted) {
            return Ok(false);
        }

        let consumed = self.codes.mark_used(latest.id).await?;
        if consumed {
            info!(username, code_id = latest.id, "one-time code consumed");
        }
        Ok(consumed)
    }

    /// # Errors
    /// Returns an error if the code store fails.
    pub async fn has_valid_code(&self, username: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .codes
            .latest_unused(username)
            .await?
            .is_some_and(|code| code.is_valid(now)))
    }

    /// # Errors
    /// Returns an error if the code store fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.codes.purge_expired(now).await
    }
}

/// Periodically delete expired codes.
pub fn spawn_cleanup_worker(
    otp: Arc<OtpService>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            match otp.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "expired one-time codes purged"),
                Err(err) => error!("one-time code purge failed: {err:#}"),
            }
        }
    })
}
