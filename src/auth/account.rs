//! Account records and the lockout transitions applied to them.
//!
//! Stores fetch an owned `Account` by username, apply one of the transitions
//! below, and write the result back inside the same transaction. The
//! transitions are pure so the in-memory and `PostgreSQL` stores share them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Authorization level carried by an account and by its sessions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ROLE_ADMIN",
            Self::Member => "ROLE_MEMBER",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "ROLE_ADMIN" => Some(Self::Admin),
            "ROLE_MEMBER" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Threshold and window applied to consecutive failed logins.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub window: Duration,
}

#[derive(Clone, Debug)]
pub struct Account {
    /// Unique login name; the e-mail address doubles as username.
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    /// Administrative kill switch, independent of lockout.
    pub enabled: bool,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub password_change_required: bool,
}

impl Account {
    #[must_use]
    pub fn new(username: String, password_hash: String, role: Role) -> Self {
        Self {
            username,
            password_hash,
            role,
            enabled: true,
            failed_attempts: 0,
            locked_until: None,
            password_change_required: false,
        }
    }

    #[must_use]
    pub fn with_password_change_required(mut self, required: bool) -> Self {
        self.password_change_required = required;
        self
    }

    /// Address one-time codes are sent to.
    #[must_use]
    pub fn contact_address(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    #[must_use]
    pub fn remaining_attempts(&self, policy: LockoutPolicy) -> u32 {
        policy.threshold.saturating_sub(self.failed_attempts)
    }

    /// Count one wrong password.
    ///
    /// An elapsed lock starts a fresh count. A live lock keeps its original
    /// expiry no matter how many attempts arrive while it holds.
    pub fn register_failure(&mut self, now: DateTime<Utc>, policy: LockoutPolicy) {
        if self.locked_until.is_some_and(|until| now >= until) {
            self.failed_attempts = 0;
            self.locked_until = None;
        }

        self.failed_attempts = self.failed_attempts.saturating_add(1);

        if self.failed_attempts >= policy.threshold && self.locked_until.is_none() {
            self.locked_until = Some(now + policy.window);
        }
    }

    /// Reset the counter and drop any lock marker.
    pub fn register_success(&mut self) {
        self.failed_attempts = 0;
        self.locked_until = None;
    }
}
