//! Persistence seams for accounts and one-time codes.
//!
//! Two implementations exist: [`memory`] for development and tests, and
//! [`postgres`] for deployments. Both apply the pure transitions from
//! [`crate::auth::account`] under a per-account critical section, so that
//! concurrent failed logins never lose an increment.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::{
    account::{Account, LockoutPolicy},
    code::{NewCode, OneTimeCode},
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryAccountStore, MemoryCodeStore};
pub use postgres::{PgAccountStore, PgCodeStore};

#[derive(Debug, Eq, PartialEq)]
pub enum InsertOutcome {
    Created,
    Conflict,
}

/// Result of claiming one login attempt against an account.
#[derive(Debug)]
pub enum AttemptClaim {
    Unknown,
    Disabled,
    /// A live lock was found; nothing was counted.
    Locked,
    /// The attempt was counted as a failure. Holds the record after counting.
    Counted(Account),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find(&self, username: &str) -> Result<Option<Account>>;

    async fn insert(&self, account: &Account) -> Result<InsertOutcome>;

    /// Check the lock and count one attempt as a failure, atomically, before
    /// the password is compared.
    async fn claim_attempt(
        &self,
        username: &str,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> Result<AttemptClaim>;

    /// Take back a claimed attempt whose password matched.
    ///
    /// Resets the counter unless a later attempt has locked the account in
    /// the meantime. `claimed_failures` is the count the claim produced.
    /// False when the account is locked by someone else, or gone.
    async fn settle_success(
        &self,
        username: &str,
        claimed_failures: u32,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Reset the failed-attempt counter and clear any lock. False if no such account.
    async fn clear_lockout(&self, username: &str) -> Result<bool>;

    async fn update_password(
        &self,
        username: &str,
        password_hash: &str,
        change_required: bool,
    ) -> Result<bool>;

    async fn set_enabled(&self, username: &str, enabled: bool) -> Result<bool>;
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Mark every unused code for the username as used and persist `code`,
    /// as one atomic step.
    async fn replace_active(&self, code: NewCode) -> Result<OneTimeCode>;

    /// Most recently created unused code, expired or not.
    async fn latest_unused(&self, username: &str) -> Result<Option<OneTimeCode>>;

    /// Flip `used` only if it is still false. True when this call consumed it.
    async fn mark_used(&self, id: i64) -> Result<bool>;

    /// Delete codes whose expiry is before `before`; returns how many.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64>;
}
