//! In-process stores used when no database DSN is configured, and by tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{AccountStore, AttemptClaim, CodeStore, InsertOutcome};
use crate::auth::{
    account::{Account, LockoutPolicy},
    code::{NewCode, OneTimeCode},
};

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find(&self, username: &str) -> Result<Option<Account>> {
        Ok(self.accounts.lock().await.get(username).cloned())
    }

    async fn insert(&self, account: &Account) -> Result<InsertOutcome> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&account.username) {
            return Ok(InsertOutcome::Conflict);
        }
        accounts.insert(account.username.clone(), account.clone());
        Ok(InsertOutcome::Created)
    }

    async fn claim_attempt(
        &self,
        username: &str,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> Result<AttemptClaim> {
        let mut accounts = self.accounts.lock().await;
        let Some(account) = accounts.get_mut(username) else {
            return Ok(AttemptClaim::Unknown);
        };
        if !account.enabled {
            return Ok(AttemptClaim::Disabled);
        }
        if account.is_locked(now) {
            return Ok(AttemptClaim::Locked);
        }
        account.register_failure(now, policy);
        Ok(AttemptClaim::Counted(account.clone()))
    }

    async fn settle_success(
        &self,
        username: &str,
        claimed_failures: u32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        let Some(account) = accounts.get_mut(username) else {
            return Ok(false);
        };
        if account.failed_attempts != claimed_failures && account.is_locked(now) {
            return Ok(false);
        }
        account.register_success();
        Ok(true)
    }

    async fn clear_lockout(&self, username: &str) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        Ok(accounts
            .get_mut(username)
            .map(Account::register_success)
            .is_some())
    }

    async fn update_password(
        &self,
        username: &str,
        password_hash: &str,
        change_required: bool,
    ) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        Ok(accounts
            .get_mut(username)
            .map(|account| {
                account.password_hash = password_hash.to_string();
                account.password_change_required = change_required;
            })
            .is_some())
    }

    async fn set_enabled(&self, username: &str, enabled: bool) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        Ok(accounts
            .get_mut(username)
            .map(|account| account.enabled = enabled)
            .is_some())
    }
}

#[derive(Default)]
struct CodeTable {
    next_id: i64,
    codes: Vec<OneTimeCode>,
}

#[derive(Default)]
pub struct MemoryCodeStore {
    table: Mutex<CodeTable>,
}

impl MemoryCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn replace_active(&self, code: NewCode) -> Result<OneTimeCode> {
        let mut table = self.table.lock().await;
        for existing in table
            .codes
            .iter_mut()
            .filter(|existing| existing.username == code.username)
        {
            existing.used = true;
        }

        table.next_id += 1;
        let stored = OneTimeCode {
            id: table.next_id,
            username: code.username,
            code: code.code,
            expires_at: code.expires_at,
            used: false,
            created_at: code.created_at,
        };
        table.codes.push(stored.clone());
        Ok(stored)
    }

    async fn latest_unused(&self, username: &str) -> Result<Option<OneTimeCode>> {
        let table = self.table.lock().await;
        Ok(table
            .codes
            .iter()
            .filter(|code| code.username == username && !code.used)
            .max_by_key(|code| (code.created_at, code.id))
            .cloned())
    }

    async fn mark_used(&self, id: i64) -> Result<bool> {
        let mut table = self.table.lock().await;
        match table
            .codes
            .iter_mut()
            .find(|code| code.id == id && !code.used)
        {
            Some(code) => {
                code.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut table = self.table.lock().await;
        let initial = table.codes.len();
        table.codes.retain(|code| code.expires_at >= before);
        Ok((initial - table.codes.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::account::Role;
    use chrono::Duration;
    use std::sync::Arc;

    fn new_code(username: &str, code: &str, now: DateTime<Utc>) -> NewCode {
        NewCode {
            username: username.to_string(),
            code: code.to_string(),
            expires_at: now + Duration::minutes(10),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn insert_reports_conflict_for_existing_username() {
        let store = MemoryAccountStore::new();
        let account = Account::new("a@x.com".to_string(), "h".to_string(), Role::Member);
        assert_eq!(store.insert(&account).await.unwrap(), InsertOutcome::Created);
        assert_eq!(store.insert(&account).await.unwrap(), InsertOutcome::Conflict);
    }

    fn policy(threshold: u32) -> LockoutPolicy {
        LockoutPolicy {
            threshold,
            window: Duration::minutes(15),
        }
    }

    #[tokio::test]
    async fn concurrent_claims_are_all_counted() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = Account::new("a@x.com".to_string(), "h".to_string(), Role::Member);
        store.insert(&account).await.unwrap();
        let now = Utc::now();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim_attempt("a@x.com", now, policy(100)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = store.find("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 20);
    }

    #[tokio::test]
    async fn claims_stop_counting_once_locked() {
        let store = MemoryAccountStore::new();
        let account = Account::new("a@x.com".to_string(), "h".to_string(), Role::Member);
        store.insert(&account).await.unwrap();
        let now = Utc::now();

        for _ in 0..2 {
            assert!(matches!(
                store.claim_attempt("a@x.com", now, policy(2)).await.unwrap(),
                AttemptClaim::Counted(_)
            ));
        }
        assert!(matches!(
            store.claim_attempt("a@x.com", now, policy(2)).await.unwrap(),
            AttemptClaim::Locked
        ));
        assert_eq!(store.find("a@x.com").await.unwrap().unwrap().failed_attempts, 2);
    }

    #[tokio::test]
    async fn settle_refuses_when_a_later_claim_locked() {
        let store = MemoryAccountStore::new();
        let account = Account::new("a@x.com".to_string(), "h".to_string(), Role::Member);
        store.insert(&account).await.unwrap();
        let now = Utc::now();

        let AttemptClaim::Counted(claimed) =
            store.claim_attempt("a@x.com", now, policy(2)).await.unwrap()
        else {
            panic!("expected a counted claim");
        };
        store.claim_attempt("a@x.com", now, policy(2)).await.unwrap();

        assert!(!store
            .settle_success("a@x.com", claimed.failed_attempts, now)
            .await
            .unwrap());
        let stored = store.find("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 2);
        assert!(stored.is_locked(now));
    }

    #[tokio::test]
    async fn settle_keeps_own_lock_from_blocking_success() {
        let store = MemoryAccountStore::new();
        let account = Account::new("a@x.com".to_string(), "h".to_string(), Role::Member);
        store.insert(&account).await.unwrap();
        let now = Utc::now();

        let AttemptClaim::Counted(claimed) =
            store.claim_attempt("a@x.com", now, policy(1)).await.unwrap()
        else {
            panic!("expected a counted claim");
        };
        assert!(claimed.is_locked(now));

        assert!(store
            .settle_success("a@x.com", claimed.failed_attempts, now)
            .await
            .unwrap());
        let stored = store.find("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 0);
        assert!(stored.locked_until.is_none());
    }

    #[tokio::test]
    async fn unknown_and_disabled_accounts_are_not_counted() {
        let store = MemoryAccountStore::new();
        let account = Account::new("a@x.com".to_string(), "h".to_string(), Role::Member);
        store.insert(&account).await.unwrap();
        store.set_enabled("a@x.com", false).await.unwrap();
        let now = Utc::now();

        assert!(matches!(
            store.claim_attempt("ghost@x.com", now, policy(5)).await.unwrap(),
            AttemptClaim::Unknown
        ));
        assert!(matches!(
            store.claim_attempt("a@x.com", now, policy(5)).await.unwrap(),
            AttemptClaim::Disabled
        ));
        assert_eq!(store.find("a@x.com").await.unwrap().unwrap().failed_attempts, 0);
        assert!(!store.clear_lockout("ghost@x.com").await.unwrap());
        assert!(!store.settle_success("ghost@x.com", 1, now).await.unwrap());
    }

    #[tokio::test]
    async fn replace_active_leaves_one_unused_code() {
        let store = MemoryCodeStore::new();
        let now = Utc::now();
        let first = store
            .replace_active(new_code("a@x.com", "111111", now))
            .await
            .unwrap();
        let second = store
            .replace_active(new_code("a@x.com", "222222", now))
            .await
            .unwrap();
        store
            .replace_active(new_code("b@x.com", "333333", now))
            .await
            .unwrap();

        let latest = store.latest_unused("a@x.com").await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert!(!store.mark_used(first.id).await.unwrap());
        assert!(store.latest_unused("b@x.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mark_used_succeeds_once() {
        let store = MemoryCodeStore::new();
        let code = store
            .replace_active(new_code("a@x.com", "123456", Utc::now()))
            .await
            .unwrap();
        assert!(store.mark_used(code.id).await.unwrap());
        assert!(!store.mark_used(code.id).await.unwrap());
        assert!(store.latest_unused("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = MemoryCodeStore::new();
        let now = Utc::now();
        store
            .replace_active(new_code("a@x.com", "111111", now - Duration::hours(1)))
            .await
            .unwrap();
        store
            .replace_active(new_code("b@x.com", "222222", now))
            .await
            .unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert!(store.latest_unused("a@x.com").await.unwrap().is_none());
        assert!(store.latest_unused("b@x.com").await.unwrap().is_some());
    }
}
