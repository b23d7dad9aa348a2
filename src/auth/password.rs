//! Password changes and account administration.

use anyhow::Result;
use rand::{rngs::OsRng, Rng};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    account::{Account, Role},
    config::MIN_PASSWORD_LENGTH,
    error::AuthError,
    hasher::{hash_blocking, matches_blocking, PasswordHasher},
};
use crate::store::{AccountStore, InsertOutcome};

const TEMP_PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";
const TEMP_PASSWORD_LENGTH: usize = 12;

/// Normalize a username for lookup and uniqueness checks.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Basic e-mail format check on already-normalized input.
#[must_use]
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(username))
}

/// Twelve characters without look-alikes (`0`, `O`, `1`, `l`, `I`).
#[must_use]
pub fn generate_temporary_password() -> String {
    let mut rng = OsRng;
    (0..TEMP_PASSWORD_LENGTH)
        .map(|_| char::from(TEMP_PASSWORD_ALPHABET[rng.gen_range(0..TEMP_PASSWORD_ALPHABET.len())]))
        .collect()
}

fn check_new_password(new_password: &str, confirm_password: &str) -> Result<(), AuthError> {
    if new_password != confirm_password {
        return Err(AuthError::PasswordMismatch);
    }
    if new_password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::PasswordTooShort);
    }
    Ok(())
}

#[derive(Debug)]
pub struct ProvisionedAccount {
    pub username: String,
    pub role: Role,
    /// Set when the password was generated rather than supplied.
    pub temporary_password: Option<SecretString>,
}

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl AccountService {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { accounts, hasher }
    }

    /// Self-service password change. Clears the change-required flag.
    ///
    /// # Errors
    /// Validation errors, `CurrentPasswordIncorrect`, or a storage failure.
    pub async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        check_new_password(new_password, confirm_password)?;

        let account = self.load(username).await?;
        let current_ok = matches_blocking(
            self.hasher.clone(),
            current_password.to_string(),
            account.password_hash.clone(),
        )
        .await;
        if !current_ok {
            return Err(AuthError::CurrentPasswordIncorrect);
        }

        let hash = self.hash(new_password).await?;
        self.accounts
            .update_password(&account.username, &hash, false)
            .await
            .map_err(AuthError::StorageFailure)?;

        info!(username = %account.username, "password changed");
        Ok(())
    }

    /// Create an account that must change its password on first login.
    ///
    /// # Errors
    /// `InvalidUsername`, `PasswordTooShort`, `AccountExists`, or a storage failure.
    pub async fn provision(
        &self,
        username: &str,
        role: Role,
        password: Option<&str>,
    ) -> Result<ProvisionedAccount, AuthError> {
        let username = normalize_username(username);
        if !valid_username(&username) {
            return Err(AuthError::InvalidUsername);
        }

        let (password, temporary) = match password {
            Some(password) => {
                if password.chars().count() < MIN_PASSWORD_LENGTH {
                    return Err(AuthError::PasswordTooShort);
                }
                (password.to_string(), false)
            }
            None => (generate_temporary_password(), true),
        };

        let hash = self.hash(&password).await?;
        let account =
            Account::new(username.clone(), hash, role).with_password_change_required(true);
        match self
            .accounts
            .insert(&account)
            .await
            .map_err(AuthError::StorageFailure)?
        {
            InsertOutcome::Created => {}
            InsertOutcome::Conflict => return Err(AuthError::AccountExists),
        }

        info!(username = %username, role = role.as_str(), "account provisioned");
        Ok(ProvisionedAccount {
            username,
            role,
            temporary_password: temporary.then(|| SecretString::from(password)),
        })
    }

    /// Clear the failed-attempt counter and any lock.
    ///
    /// # Errors
    /// `AccountNotFound` or a storage failure.
    pub async fn unlock(&self, username: &str) -> Result<(), AuthError> {
        let username = normalize_username(username);
        let found = self
            .accounts
            .clear_lockout(&username)
            .await
            .map_err(AuthError::StorageFailure)?;
        if !found {
            return Err(AuthError::AccountNotFound);
        }
        info!(username = %username, "account unlocked by administrator");
        Ok(())
    }

    /// Replace the password with a generated one, unlock, and require a change.
    ///
    /// # Errors
    /// `AccountNotFound` or a storage failure.
    pub async fn reset_password(&self, username: &str) -> Result<SecretString, AuthError> {
        let username = normalize_username(username);
        let temporary = generate_temporary_password();
        let hash = self.hash(&temporary).await?;

        let found = self
            .accounts
            .update_password(&username, &hash, true)
            .await
            .map_err(AuthError::StorageFailure)?;
        if !found {
            return Err(AuthError::AccountNotFound);
        }
        self.accounts
            .clear_lockout(&username)
            .await
            .map_err(AuthError::StorageFailure)?;

        info!(username = %username, "password reset by administrator");
        Ok(SecretString::from(temporary))
    }

    /// # Errors
    /// `AccountNotFound` or a storage failure.
    pub async fn set_enabled(&self, username: &str, enabled: bool) -> Result<(), AuthError> {
        let username = normalize_username(username);
        let found = self
            .accounts
            .set_enabled(&username, enabled)
            .await
            .map_err(AuthError::StorageFailure)?;
        if !found {
            return Err(AuthError::AccountNotFound);
        }
        info!(username = %username, enabled, "account status changed");
        Ok(())
    }

    /// Create the first administrator if it does not exist yet.
    ///
    /// Returns true when the account was created.
    ///
    /// # Errors
    /// Returns an error on invalid input or storage failure.
    pub async fn bootstrap_admin(&self, username: &str, password: &SecretString) -> Result<bool> {
        let username = normalize_username(username);
        if self.accounts.find(&username).await?.is_some() {
            return Ok(false);
        }

        let result = self
            .provision(&username, Role::Admin, Some(password.expose_secret()))
            .await;
        match result {
            Ok(_) => {
                warn!(username = %username, "bootstrap administrator created, change its password");
                Ok(true)
            }
            Err(AuthError::AccountExists) => Ok(false),
            Err(err) => Err(anyhow::Error::new(err).context("failed to create bootstrap administrator")),
        }
    }

    async fn load(&self, username: &str) -> Result<Account, AuthError> {
        self.accounts
            .find(&normalize_username(username))
            .await
            .map_err(AuthError::StorageFailure)?
            .ok_or(AuthError::AccountNotFound)
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        hash_blocking(self.hasher.clone(), password.to_string())
            .await
            .map_err(AuthError::StorageFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hasher::test_hasher;
    use crate::store::MemoryAccountStore;
    use chrono::{Duration, Utc};

    fn service() -> (AccountService, Arc<MemoryAccountStore>, Arc<dyn PasswordHasher>) {
        let store = Arc::new(MemoryAccountStore::new());
        let hasher = test_hasher();
        (
            AccountService::new(store.clone(), hasher.clone()),
            store,
            hasher,
        )
    }

    #[test]
    fn temporary_password_uses_unambiguous_alphabet() {
        let password = generate_temporary_password();
        assert_eq!(password.len(), TEMP_PASSWORD_LENGTH);
        assert!(password.bytes().all(|b| TEMP_PASSWORD_ALPHABET.contains(&b)));
        assert!(!password.contains(['0', 'O', '1', 'l', 'I']));
    }

    #[test]
    fn username_validation() {
        assert_eq!(normalize_username("  Jane@Example.ORG "), "jane@example.org");
        assert!(valid_username("jane@example.org"));
        assert!(!valid_username("jane"));
        assert!(!valid_username("jane@localhost"));
        assert!(!valid_username("ja ne@example.org"));
    }

    #[test]
    fn new_password_rules() {
        assert!(matches!(
            check_new_password("abcdefgh", "abcdefgx"),
            Err(AuthError::PasswordMismatch)
        ));
        assert!(matches!(
            check_new_password("short", "short"),
            Err(AuthError::PasswordTooShort)
        ));
        assert!(check_new_password("abcdefgh", "abcdefgh").is_ok());
    }

    #[tokio::test]
    async fn provision_generates_temporary_password_and_requires_change() {
        let (service, store, hasher) = service();
        let provisioned = service
            .provision(" New@Member.org", Role::Member, None)
            .await
            .unwrap();
        assert_eq!(provisioned.username, "new@member.org");

        let temporary = provisioned.temporary_password.unwrap();
        let stored = store.find("new@member.org").await.unwrap().unwrap();
        assert!(stored.password_change_required);
        assert!(stored.enabled);
        assert!(hasher.matches(temporary.expose_secret(), &stored.password_hash));

        assert!(matches!(
            service.provision("new@member.org", Role::Member, None).await,
            Err(AuthError::AccountExists)
        ));
        assert!(matches!(
            service.provision("not-an-email", Role::Member, None).await,
            Err(AuthError::InvalidUsername)
        ));
    }

    #[tokio::test]
    async fn change_password_checks_current_and_clears_flag() {
        let (service, store, hasher) = service();
        service
            .provision("a@x.com", Role::Member, Some("initial-pass"))
            .await
            .unwrap();

        assert!(matches!(
            service
                .change_password("a@x.com", "wrong-pass", "next-pass-1", "next-pass-1")
                .await,
            Err(AuthError::CurrentPasswordIncorrect)
        ));

        service
            .change_password("a@x.com", "initial-pass", "next-pass-1", "next-pass-1")
            .await
            .unwrap();
        let stored = store.find("a@x.com").await.unwrap().unwrap();
        assert!(!stored.password_change_required);
        assert!(hasher.matches("next-pass-1", &stored.password_hash));
    }

    #[tokio::test]
    async fn unlock_and_reset_clear_lockout() {
        let (service, store, hasher) = service();
        service
            .provision("a@x.com", Role::Member, Some("initial-pass"))
            .await
            .unwrap();
        let policy = crate::auth::account::LockoutPolicy {
            threshold: 1,
            window: Duration::minutes(15),
        };
        store
            .claim_attempt("a@x.com", Utc::now(), policy)
            .await
            .unwrap();

        service.unlock("a@x.com").await.unwrap();
        let stored = store.find("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 0);
        assert!(stored.locked_until.is_none());

        store
            .claim_attempt("a@x.com", Utc::now(), policy)
            .await
            .unwrap();
        let temporary = service.reset_password("a@x.com").await.unwrap();
        let stored = store.find("a@x.com").await.unwrap().unwrap();
        assert!(stored.locked_until.is_none());
        assert!(stored.password_change_required);
        assert!(hasher.matches(temporary.expose_secret(), &stored.password_hash));

        assert!(matches!(
            service.unlock("ghost@x.com").await,
            Err(AuthError::AccountNotFound)
        ));
        assert!(matches!(
            service.reset_password("ghost@x.com").await,
            Err(AuthError::AccountNotFound)
        ));
    }

    #[tokio::test]
    async fn bootstrap_admin_is_idempotent() {
        let (service, store, _hasher) = service();
        let password = SecretString::from("bootstrap-pass".to_string());
        assert!(service
            .bootstrap_admin("admin@willowsrta.org", &password)
            .await
            .unwrap());
        assert!(!service
            .bootstrap_admin("admin@willowsrta.org", &password)
            .await
            .unwrap());

        let stored = store.find("admin@willowsrta.org").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Admin);
    }

    #[tokio::test]
    async fn set_enabled_toggles_flag() {
        let (service, store, _hasher) = service();
        service
            .provision("a@x.com", Role::Member, Some("initial-pass"))
            .await
            .unwrap();
        service.set_enabled("a@x.com", false).await.unwrap();
        assert!(!store.find("a@x.com").await.unwrap().unwrap().enabled);
        service.set_enabled("a@x.com", true).await.unwrap();
        assert!(store.find("a@x.com").await.unwrap().unwrap().enabled);
    }
}
