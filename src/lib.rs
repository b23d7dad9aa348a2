//! # rta (Willows RTA portal authentication)
//!
//! `rta` owns the login pipeline of the Willows RTA membership portal:
//! password verification with progressive lockout, an optional one-time-code
//! second factor delivered by e-mail, and the short-lived pending state that
//! bridges "credentials accepted" to "session established".
//!
//! ## Lockout
//!
//! Every wrong password increments the account's failed-attempt counter inside
//! a per-account transaction. Reaching the threshold (5 by default) locks the
//! account for a fixed window (15 minutes by default); attempts inside the
//! window are rejected without comparing the password and never extend it.
//!
//! ## One-time codes
//!
//! Codes are six decimal digits from the operating system CSPRNG, valid for 10
//! minutes and single use. Issuing a code invalidates every unused code for the
//! same username in the same transaction, so at most one code is valid per
//! username at any instant. Consumption is a conditional update; of two
//! concurrent submissions of the same code only one succeeds.
//!
//! ## Pending authentication
//!
//! A pending login lives in process memory, keyed by a random id held in an
//! `HttpOnly` cookie, and expires 10 minutes after the password was accepted
//! regardless of the code's own expiry.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
