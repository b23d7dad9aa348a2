use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_MFA_REQUIRED: &str = "mfa-required";
pub const ARG_LOCKOUT_THRESHOLD: &str = "lockout-threshold";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";
pub const ARG_CODE_TTL_SECONDS: &str = "code-ttl-seconds";
pub const ARG_PENDING_TTL_SECONDS: &str = "pending-ttl-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_CODE_CLEANUP_SECONDS: &str = "code-cleanup-seconds";
pub const ARG_ADMIN_EMAIL: &str = "admin-email";
pub const ARG_ADMIN_PASSWORD: &str = "admin-password";

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub mfa_required: bool,
    pub lockout_threshold: u32,
    pub lockout_seconds: i64,
    pub code_ttl_seconds: i64,
    pub pending_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub code_cleanup_seconds: u64,
    pub admin: AdminOptions,
}

/// First administrator, created at startup when a password is supplied.
#[derive(Debug)]
pub struct AdminOptions {
    pub email: String,
    pub password: Option<SecretString>,
}

impl Options {
    /// Parse login, lockout and bootstrap arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read = |id: &str| -> Result<i64> {
            matches
                .get_one::<i64>(id)
                .copied()
                .with_context(|| format!("missing required argument: --{id}"))
        };

        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            mfa_required: matches
                .get_one::<bool>(ARG_MFA_REQUIRED)
                .copied()
                .unwrap_or(true),
            lockout_threshold: matches
                .get_one::<u32>(ARG_LOCKOUT_THRESHOLD)
                .copied()
                .unwrap_or(5),
            lockout_seconds: read(ARG_LOCKOUT_SECONDS)?,
            code_ttl_seconds: read(ARG_CODE_TTL_SECONDS)?,
            pending_ttl_seconds: read(ARG_PENDING_TTL_SECONDS)?,
            session_ttl_seconds: read(ARG_SESSION_TTL_SECONDS)?,
            code_cleanup_seconds: matches
                .get_one::<u64>(ARG_CODE_CLEANUP_SECONDS)
                .copied()
                .unwrap_or(3600),
            admin: AdminOptions {
                email: matches
                    .get_one::<String>(ARG_ADMIN_EMAIL)
                    .cloned()
                    .context("missing required argument: --admin-email")?,
                password: matches
                    .get_one::<String>(ARG_ADMIN_PASSWORD)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| SecretString::from(v.clone())),
            },
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_login_args(command);
    let command = with_lockout_args(command);
    with_admin_args(command)
}

fn with_login_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used as the CORS origin")
                .env("RTA_FRONTEND_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_MFA_REQUIRED)
                .long(ARG_MFA_REQUIRED)
                .help("Require a one-time code after the password")
                .env("RTA_MFA_REQUIRED")
                .default_value("true")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_CODE_TTL_SECONDS)
                .long(ARG_CODE_TTL_SECONDS)
                .help("One-time code validity in seconds")
                .env("RTA_CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_PENDING_TTL_SECONDS)
                .long(ARG_PENDING_TTL_SECONDS)
                .help("Time allowed between password and code in seconds")
                .env("RTA_PENDING_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("RTA_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_CODE_CLEANUP_SECONDS)
                .long(ARG_CODE_CLEANUP_SECONDS)
                .help("Interval between expired code purges in seconds")
                .env("RTA_CODE_CLEANUP_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOCKOUT_THRESHOLD)
                .long(ARG_LOCKOUT_THRESHOLD)
                .help("Failed password attempts before the account locks")
                .env("RTA_LOCKOUT_THRESHOLD")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("Lock duration in seconds")
                .env("RTA_LOCKOUT_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_admin_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_EMAIL)
                .long(ARG_ADMIN_EMAIL)
                .help("Username of the bootstrap administrator")
                .env("RTA_ADMIN_EMAIL")
                .default_value("admin@willowsrta.org"),
        )
        .arg(
            Arg::new(ARG_ADMIN_PASSWORD)
                .long(ARG_ADMIN_PASSWORD)
                .help("Initial password of the bootstrap administrator")
                .long_help(
                    "Initial password of the bootstrap administrator. The account is only created when it does not exist yet, and must change its password on first login.",
                )
                .env("RTA_ADMIN_PASSWORD")
                .hide_env_values(true),
        )
}
