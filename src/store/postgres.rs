//! `PostgreSQL` stores.
//!
//! Login attempts are claimed under `SELECT ... FOR UPDATE`, code issuance is
//! serialized per username with a transaction-scoped advisory lock, and code
//! consumption is a conditional `UPDATE`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;

use super::{AccountStore, AttemptClaim, CodeStore, InsertOutcome};
use crate::auth::{
    account::{Account, LockoutPolicy, Role},
    code::{NewCode, OneTimeCode},
};

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const ACCOUNT_COLUMNS: &str = "username, password_hash, role, enabled, failed_attempts, \
     locked_until, password_change_required";

/// Create tables and indexes if they do not exist yet.
///
/// # Errors
/// Returns an error if the schema statements fail.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DDL"
    );
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to apply schema")?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn attempts_from_column(value: i32) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("invalid failed_attempts value {value}"))
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let role: String = row.try_get("role")?;
    let failed_attempts: i32 = row.try_get("failed_attempts")?;
    Ok(Account {
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role: Role::from_str(&role).ok_or_else(|| anyhow!("unknown role {role:?}"))?,
        enabled: row.try_get("enabled")?,
        failed_attempts: attempts_from_column(failed_attempts)?,
        locked_until: row.try_get("locked_until")?,
        password_change_required: row.try_get("password_change_required")?,
    })
}

fn code_from_row(row: &PgRow) -> Result<OneTimeCode> {
    Ok(OneTimeCode {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        code: row.try_get("code")?,
        expires_at: row.try_get("expires_at")?,
        used: row.try_get("used")?,
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find(&self, username: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account")?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert(&self, account: &Account) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO accounts
                (username, password_hash, role, enabled, failed_attempts, locked_until,
                 password_change_required)
            VALUES ($1, $2, $3, $4, 0, NULL, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&account.username)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.enabled)
            .bind(account.password_change_required)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert account"),
        }
    }

    async fn claim_attempt(
        &self,
        username: &str,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> Result<AttemptClaim> {
        // The row lock serializes attempts for the same account; dropping the
        // transaction early rolls it back.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin login attempt transaction")?;

        let query =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1 FOR UPDATE");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to lock account row")?;

        let Some(row) = row else {
            return Ok(AttemptClaim::Unknown);
        };
        let mut account = account_from_row(&row)?;
        if !account.enabled {
            return Ok(AttemptClaim::Disabled);
        }
        if account.is_locked(now) {
            return Ok(AttemptClaim::Locked);
        }

        account.register_failure(now, policy);

        let query = r"
            UPDATE accounts
            SET failed_attempts = $2,
                locked_until = $3,
                updated_at = NOW()
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(username)
            .bind(i32::try_from(account.failed_attempts).context("failed_attempts out of range")?)
            .bind(account.locked_until)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to count login attempt")?;

        tx.commit()
            .await
            .context("commit login attempt transaction")?;

        Ok(AttemptClaim::Counted(account))
    }

    async fn settle_success(
        &self,
        username: &str,
        claimed_failures: u32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let query = r"
            UPDATE accounts
            SET failed_attempts = 0,
                locked_until = NULL,
                updated_at = NOW()
            WHERE username = $1
              AND (failed_attempts = $2 OR locked_until IS NULL OR locked_until <= $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .bind(i32::try_from(claimed_failures).context("failed_attempts out of range")?)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to settle login attempt")?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_lockout(&self, username: &str) -> Result<bool> {
        let query = r"
            UPDATE accounts
            SET failed_attempts = 0,
                locked_until = NULL,
                updated_at = NOW()
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to reset failed attempts")?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_password(
        &self,
        username: &str,
        password_hash: &str,
        change_required: bool,
    ) -> Result<bool> {
        let query = r"
            UPDATE accounts
            SET password_hash = $2,
                password_change_required = $3,
                updated_at = NOW()
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .bind(password_hash)
            .bind(change_required)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password")?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_enabled(&self, username: &str, enabled: bool) -> Result<bool> {
        let query = "UPDATE accounts SET enabled = $2, updated_at = NOW() WHERE username = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .bind(enabled)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update account status")?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(Clone)]
pub struct PgCodeStore {
    pool: PgPool,
}

impl PgCodeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CodeStore for PgCodeStore {
    async fn replace_active(&self, code: NewCode) -> Result<OneTimeCode> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin code issuance transaction")?;

        // Serialize issuance per username until commit.
        let query = "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&code.username)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to take code issuance lock")?;

        let query = "UPDATE one_time_codes SET used = TRUE WHERE username = $1 AND NOT used";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&code.username)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to invalidate previous codes")?;

        let query = r"
            INSERT INTO one_time_codes (username, code, expires_at, used, created_at)
            VALUES ($1, $2, $3, FALSE, $4)
            RETURNING id, username, code, expires_at, used, created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&code.username)
            .bind(&code.code)
            .bind(code.expires_at)
            .bind(code.created_at)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert one-time code")?;

        let stored = code_from_row(&row)?;

        tx.commit()
            .await
            .context("commit code issuance transaction")?;

        Ok(stored)
    }

    async fn latest_unused(&self, username: &str) -> Result<Option<OneTimeCode>> {
        let query = r"
            SELECT id, username, code, expires_at, used, created_at
            FROM one_time_codes
            WHERE username = $1
              AND NOT used
            ORDER BY created_at DESC, id DESC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup one-time code")?;

        row.as_ref().map(code_from_row).transpose()
    }

    async fn mark_used(&self, id: i64) -> Result<bool> {
        let query = "UPDATE one_time_codes SET used = TRUE WHERE id = $1 AND NOT used";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume one-time code")?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM one_time_codes WHERE expires_at < $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(before)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired codes")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError, fmt};

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_detected_by_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("40001"),
        }));
        assert!(!is_unique_violation(&err));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn negative_attempt_counter_is_an_error() {
        assert_eq!(attempts_from_column(4).unwrap(), 4);
        assert!(attempts_from_column(-1).is_err());
    }

    #[test]
    fn schema_enforces_single_unused_code() {
        assert!(SCHEMA_SQL.contains("CREATE UNIQUE INDEX IF NOT EXISTS"));
        assert!(SCHEMA_SQL.contains("WHERE NOT used"));
        assert!(!SCHEMA_SQL.contains("DROP "));
    }
}
