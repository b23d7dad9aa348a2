//! Authentication tunables.

use chrono::Duration;

use super::account::LockoutPolicy;

const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 15 * 60;
const DEFAULT_CODE_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_PENDING_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    mfa_required: bool,
    lockout_threshold: u32,
    lockout_seconds: i64,
    code_ttl_seconds: i64,
    pending_ttl_seconds: i64,
    session_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            mfa_required: true,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            pending_ttl_seconds: DEFAULT_PENDING_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_mfa_required(mut self, required: bool) -> Self {
        self.mfa_required = required;
        self
    }

    /// A threshold of zero is treated as one.
    #[must_use]
    pub fn with_lockout_threshold(mut self, threshold: u32) -> Self {
        self.lockout_threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_pending_ttl_seconds(mut self, seconds: i64) -> Self {
        self.pending_ttl_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn mfa_required(&self) -> bool {
        self.mfa_required
    }

    #[must_use]
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            threshold: self.lockout_threshold,
            window: Duration::seconds(self.lockout_seconds),
        }
    }

    #[must_use]
    pub fn code_ttl(&self) -> Duration {
        Duration::seconds(self.code_ttl_seconds)
    }

    #[must_use]
    pub fn pending_ttl(&self) -> Duration {
        Duration::seconds(self.pending_ttl_seconds)
    }

    #[must_use]
    pub fn pending_ttl_seconds(&self) -> i64 {
        self.pending_ttl_seconds
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}
