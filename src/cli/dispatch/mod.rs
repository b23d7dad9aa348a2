//! Maps parsed arguments to the server action.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, delivery, ARG_DSN, ARG_PORT};
use anyhow::Result;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|v| !v.trim().is_empty());

    let auth_opts = auth::Options::parse(matches)?;
    let delivery_opts = delivery::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        mfa_required: auth_opts.mfa_required,
        lockout_threshold: auth_opts.lockout_threshold,
        lockout_seconds: auth_opts.lockout_seconds,
        code_ttl_seconds: auth_opts.code_ttl_seconds,
        pending_ttl_seconds: auth_opts.pending_ttl_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        code_cleanup_seconds: auth_opts.code_cleanup_seconds,
        admin_email: auth_opts.admin.email,
        admin_password: auth_opts.admin.password,
        resend_api_key: delivery_opts.resend_api_key,
        mail_from: delivery_opts.mail_from,
        delivery_max_attempts: delivery_opts.max_attempts,
        delivery_backoff_ms: delivery_opts.backoff_ms,
        dev_log_codes: delivery_opts.dev_log_codes,
    }))
}
