use crate::{
    api,
    auth::{
        delivery::{
            CodeDelivery, CodeDispatcher, DeliveryConfig, LogDelivery, ResendDelivery,
            UnconfiguredDelivery,
        },
        hasher::Argon2Hasher,
        otp::spawn_cleanup_worker,
        AuthConfig, AuthState,
    },
    cli::telemetry,
    store::{
        postgres::apply_schema, AccountStore, CodeStore, MemoryAccountStore, MemoryCodeStore,
        PgAccountStore, PgCodeStore,
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub frontend_base_url: String,
    pub mfa_required: bool,
    pub lockout_threshold: u32,
    pub lockout_seconds: i64,
    pub code_ttl_seconds: i64,
    pub pending_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub code_cleanup_seconds: u64,
    pub admin_email: String,
    pub admin_password: Option<SecretString>,
    pub resend_api_key: Option<SecretString>,
    pub mail_from: String,
    pub delivery_max_attempts: u32,
    pub delivery_backoff_ms: u64,
    pub dev_log_codes: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if storage cannot be prepared or the server fails to start.
pub async fn execute(mut args: Args) -> Result<()> {
    log_startup_args(&args);
    let resend_api_key = args.resend_api_key.take();

    let pool = match &args.dsn {
        Some(dsn) => Some(connect(dsn).await?),
        None => {
            warn!("No database configured: accounts and codes are kept in memory and lost on restart");
            None
        }
    };
    let (accounts, codes): (Arc<dyn AccountStore>, Arc<dyn CodeStore>) = match &pool {
        Some(pool) => (
            Arc::new(PgAccountStore::new(pool.clone())),
            Arc::new(PgCodeStore::new(pool.clone())),
        ),
        None => (
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemoryCodeStore::new()),
        ),
    };

    let config = AuthConfig::new(args.frontend_base_url.clone())
        .with_mfa_required(args.mfa_required)
        .with_lockout_threshold(args.lockout_threshold)
        .with_lockout_seconds(args.lockout_seconds)
        .with_code_ttl_seconds(args.code_ttl_seconds)
        .with_pending_ttl_seconds(args.pending_ttl_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds);

    let auth_state = AuthState::new(
        config,
        accounts,
        codes,
        Arc::new(Argon2Hasher::default()),
        dispatcher(resend_api_key, &args)?,
    )?;

    if let Some(password) = &args.admin_password {
        auth_state
            .accounts()
            .bootstrap_admin(&args.admin_email, password)
            .await?;
    }

    spawn_cleanup_worker(
        auth_state.login().otp(),
        Duration::from_secs(args.code_cleanup_seconds),
    );

    let result = api::new(args.port, Arc::new(auth_state), pool).await;
    telemetry::shutdown_tracer();
    result
}

async fn connect(dsn: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    apply_schema(&pool).await?;

    Ok(pool)
}

fn dispatcher(resend_api_key: Option<SecretString>, args: &Args) -> Result<CodeDispatcher> {
    let channel: Arc<dyn CodeDelivery> = match (resend_api_key, args.dev_log_codes) {
        (Some(api_key), _) => Arc::new(ResendDelivery::new(api_key, args.mail_from.clone())?),
        (None, true) => Arc::new(LogDelivery),
        (None, false) => {
            warn!("No e-mail provider configured: one-time codes cannot be delivered");
            Arc::new(UnconfiguredDelivery)
        }
    };

    if args.dev_log_codes {
        warn!("NON-PRODUCTION: one-time codes are written to the log");
    }

    let config = DeliveryConfig::new()
        .with_max_attempts(args.delivery_max_attempts)
        .with_backoff_base_millis(args.delivery_backoff_ms)
        .with_log_on_failure(args.dev_log_codes);

    Ok(CodeDispatcher::new(channel, config))
}

fn log_startup_args(args: &Args) {
    let storage = args
        .dsn
        .as_deref()
        .map_or_else(|| "memory".to_string(), redact_dsn);
    info!(
        port = args.port,
        storage = %storage,
        frontend = %args.frontend_base_url,
        mfa_required = args.mfa_required,
        lockout_threshold = args.lockout_threshold,
        lockout_seconds = args.lockout_seconds,
        resend_configured = args.resend_api_key.is_some(),
        bootstrap_admin = args.admin_password.is_some(),
        "Startup configuration"
    );
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::redact_dsn;

    #[test]
    fn dsn_password_is_redacted() {
        assert_eq!(
            redact_dsn("postgres://rta:secret@db:5432/rta"),
            "postgres://rta:REDACTED@db:5432/rta"
        );
        assert_eq!(redact_dsn("not a dsn"), "invalid-dsn");
    }
}
