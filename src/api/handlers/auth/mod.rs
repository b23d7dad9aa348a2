//! Login, second factor, session and password endpoints.
//!
//! Flow Overview:
//! 1) `POST /v1/auth/login` checks the password. With the second factor off it
//!    sets `rta_session` and answers 200; otherwise it sets `rta_pending` and
//!    answers 202 after a code was issued.
//! 2) `POST /v1/auth/otp/verify` completes the pending login with the code;
//!    `POST /v1/auth/otp/resend` issues a fresh one within the same window.
//! 3) `GET /v1/auth/session` reports the principal, including the directive to
//!    change a temporary password, which `POST /v1/auth/password` clears.

pub mod login;
pub mod otp;
pub mod password;
pub mod principal;
pub mod session;
pub mod types;
