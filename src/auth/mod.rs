//! Authentication domain: lockout, one-time codes, pending logins and sessions.
//!
//! HTTP handlers live in [`crate::api`]; everything here takes the current
//! time as an argument so flows can be exercised with a controlled clock.

pub mod account;
pub mod code;
pub mod config;
pub mod delivery;
pub mod error;
pub mod hasher;
pub mod login;
pub mod otp;
pub mod password;
pub mod pending;
pub mod session;
pub mod verifier;

#[cfg(test)]
mod tests;

use anyhow::Result;
use std::sync::Arc;

pub use account::{Account, LockoutPolicy, Role};
pub use config::AuthConfig;
pub use error::AuthError;
pub use login::{LoginService, LoginState, LoginStep};
pub use session::{SessionPrincipal, SessionStore};

use crate::store::{AccountStore, CodeStore};
use delivery::CodeDispatcher;
use hasher::PasswordHasher;
use password::AccountService;

/// Everything the HTTP layer needs, shared behind one `Arc`.
pub struct AuthState {
    config: AuthConfig,
    login: LoginService,
    accounts: AccountService,
    sessions: SessionStore,
}

impl AuthState {
    /// # Errors
    /// Returns an error if the login service cannot be initialised.
    pub fn new(
        config: AuthConfig,
        accounts: Arc<dyn AccountStore>,
        codes: Arc<dyn CodeStore>,
        hasher: Arc<dyn PasswordHasher>,
        dispatcher: CodeDispatcher,
    ) -> Result<Self> {
        let login = LoginService::new(&config, accounts.clone(), codes, hasher.clone(), dispatcher)?;
        let sessions = SessionStore::new(config.session_ttl());
        Ok(Self {
            login,
            accounts: AccountService::new(accounts, hasher),
            sessions,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn login(&self) -> &LoginService {
        &self.login
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}
