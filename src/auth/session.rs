//! Established sessions.
//!
//! The raw token is handed to the client once; only its SHA-256 digest is
//! kept as the lookup key.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;
use utoipa::ToSchema;

use super::account::{Account, Role};

/// Identity attached to an established session.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, ToSchema)]
pub struct SessionPrincipal {
    pub username: String,
    pub role: Role,
    /// The holder must set a new password before using the portal.
    pub force_password_change: bool,
}

impl SessionPrincipal {
    #[must_use]
    pub fn for_account(account: &Account) -> Self {
        Self {
            username: account.username.clone(),
            role: account.role,
            force_password_change: account.password_change_required,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

struct SessionEntry {
    principal: SessionPrincipal,
    expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<Vec<u8>, SessionEntry>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Store a new session and return the raw token for the client.
    ///
    /// # Errors
    /// Returns an error if a token cannot be generated.
    pub async fn establish(&self, principal: SessionPrincipal, now: DateTime<Utc>) -> Result<String> {
        let token = generate_session_token()?;
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, entry| entry.expires_at > now);
        sessions.insert(
            hash_session_token(&token),
            SessionEntry {
                principal,
                expires_at: now + self.ttl,
            },
        );
        Ok(token)
    }

    pub async fn resolve(&self, token: &str, now: DateTime<Utc>) -> Option<SessionPrincipal> {
        let key = hash_session_token(token);
        let mut sessions = self.sessions.lock().await;
        let live = sessions.get(&key).map(|entry| entry.expires_at > now)?;
        if live {
            sessions.get(&key).map(|entry| entry.principal.clone())
        } else {
            sessions.remove(&key);
            None
        }
    }

    pub async fn revoke(&self, token: &str) {
        self.sessions
            .lock()
            .await
            .remove(&hash_session_token(token));
    }

    /// Drop every session held by `username`.
    pub async fn revoke_user(&self, username: &str) {
        self.sessions
            .lock()
            .await
            .retain(|_, entry| entry.principal.username != username);
    }

    /// Lift the password-change directive on all of `username`'s sessions.
    pub async fn clear_password_directive(&self, username: &str) {
        let mut sessions = self.sessions.lock().await;
        for entry in sessions
            .values_mut()
            .filter(|entry| entry.principal.username == username)
        {
            entry.principal.force_password_change = false;
        }
    }
}
