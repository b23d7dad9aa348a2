use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_RESEND_API_KEY: &str = "resend-api-key";
pub const ARG_MAIL_FROM: &str = "mail-from";
pub const ARG_DELIVERY_MAX_ATTEMPTS: &str = "delivery-max-attempts";
pub const ARG_DELIVERY_BACKOFF_MS: &str = "delivery-backoff-ms";
pub const ARG_DEV_LOG_CODES: &str = "dev-log-codes";

#[derive(Debug)]
pub struct Options {
    pub resend_api_key: Option<SecretString>,
    pub mail_from: String,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub dev_log_codes: bool,
}

impl Options {
    /// Parse code delivery arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            resend_api_key: matches
                .get_one::<String>(ARG_RESEND_API_KEY)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.clone())),
            mail_from: matches
                .get_one::<String>(ARG_MAIL_FROM)
                .cloned()
                .context("missing required argument: --mail-from")?,
            max_attempts: matches
                .get_one::<u32>(ARG_DELIVERY_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(3),
            backoff_ms: matches
                .get_one::<u64>(ARG_DELIVERY_BACKOFF_MS)
                .copied()
                .unwrap_or(500),
            dev_log_codes: matches.get_flag(ARG_DEV_LOG_CODES),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RESEND_API_KEY)
                .long(ARG_RESEND_API_KEY)
                .help("Resend API key used to e-mail one-time codes")
                .env("RTA_RESEND_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address for one-time code e-mails")
                .env("RTA_MAIL_FROM")
                .default_value("onboarding@resend.dev"),
        )
        .arg(
            Arg::new(ARG_DELIVERY_MAX_ATTEMPTS)
                .long(ARG_DELIVERY_MAX_ATTEMPTS)
                .help("Delivery attempts per code")
                .env("RTA_DELIVERY_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_DELIVERY_BACKOFF_MS)
                .long(ARG_DELIVERY_BACKOFF_MS)
                .help("Base delay between delivery attempts in milliseconds, doubled per retry")
                .env("RTA_DELIVERY_BACKOFF_MS")
                .default_value("500")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_DEV_LOG_CODES)
                .long(ARG_DEV_LOG_CODES)
                .help("NON-PRODUCTION: print one-time codes to the log")
                .env("RTA_DEV_LOG_CODES")
                .action(ArgAction::SetTrue),
        )
}
