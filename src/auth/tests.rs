//! End-to-end login flows against the in-memory stores.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{
    delivery::{CodeDelivery, CodeDispatcher, DeliveryConfig},
    hasher::test_hasher,
    login::{LoginService, LoginState, LoginStep, MfaChallenge},
    password::AccountService,
    AuthConfig, AuthError, Role,
};
use crate::store::{AccountStore, MemoryAccountStore, MemoryCodeStore};

#[derive(Default)]
struct RecordingDelivery {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl CodeDelivery for RecordingDelivery {
    async fn send_code(&self, contact_address: &str, code: &str) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((contact_address.to_string(), code.to_string()));
        Ok(())
    }
}

struct Harness {
    login: LoginService,
    accounts: Arc<MemoryAccountStore>,
    admin: AccountService,
}

async fn harness(mfa_required: bool) -> Harness {
    let config = AuthConfig::new("https://portal.willowsrta.org".to_string())
        .with_mfa_required(mfa_required);
    let accounts = Arc::new(MemoryAccountStore::new());
    let hasher = test_hasher();
    let dispatcher = CodeDispatcher::new(
        Arc::new(RecordingDelivery::default()),
        DeliveryConfig::new().with_max_attempts(1),
    );
    let login = LoginService::new(
        &config,
        accounts.clone(),
        Arc::new(MemoryCodeStore::new()),
        hasher.clone(),
        dispatcher,
    )
    .expect("login service");
    let admin = AccountService::new(accounts.clone(), hasher);
    admin
        .provision("a@x.com", Role::Member, Some("right-password"))
        .await
        .expect("provision");

    Harness {
        login,
        accounts,
        admin,
    }
}

fn challenge(step: LoginStep) -> MfaChallenge {
    match step {
        LoginStep::MfaPending(challenge) => challenge,
        LoginStep::SessionActive(_) => panic!("expected a pending second factor"),
    }
}

fn code_of(challenge: &MfaChallenge) -> String {
    challenge.issued.code.expose_secret().to_string()
}

fn other_code(code: &str) -> &'static str {
    if code == "000000" || code == "100000" {
        "999999"
    } else {
        "000000"
    }
}

async fn lock_account(harness: &Harness, now: DateTime<Utc>) {
    for _ in 0..5 {
        let _ = harness.login.submit("a@x.com", "wrong", now).await;
    }
}

#[tokio::test]
async fn wrong_passwords_count_down_then_lock() {
    let harness = harness(true).await;
    let now = Utc::now();

    let mut hints = Vec::new();
    for _ in 0..4 {
        match harness.login.submit("a@x.com", "wrong", now).await {
            Err(AuthError::InvalidCredentials { remaining_attempts }) => hints.push(remaining_attempts),
            other => panic!("unexpected result {other:?}"),
        }
    }
    assert_eq!(hints, vec![None, Some(3), Some(2), Some(1)]);

    let fifth = harness.login.submit("a@x.com", "wrong", now).await;
    assert!(matches!(fifth, Err(AuthError::AccountLocked)));
}

#[tokio::test]
async fn correct_password_during_lock_is_refused() {
    let harness = harness(false).await;
    let now = Utc::now();
    lock_account(&harness, now).await;

    let sixth = harness
        .login
        .submit("a@x.com", "right-password", now + Duration::minutes(1))
        .await;
    let err = sixth.expect_err("locked account must not log in");
    assert!(matches!(err, AuthError::AccountLocked));
    assert_eq!(err.login_state(), LoginState::Locked);
}

#[tokio::test]
async fn lock_window_elapses_and_counter_resets() {
    let harness = harness(false).await;
    let now = Utc::now();
    lock_account(&harness, now).await;

    let step = harness
        .login
        .submit("a@x.com", "right-password", now + Duration::minutes(15))
        .await
        .expect("login after window");
    assert_eq!(step.state(), LoginState::SessionActive);

    let stored = harness.accounts.find("a@x.com").await.unwrap().unwrap();
    assert_eq!(stored.failed_attempts, 0);
    assert!(stored.locked_until.is_none());
}

#[tokio::test]
async fn second_factor_disabled_goes_straight_to_session() {
    let harness = harness(false).await;
    let step = harness
        .login
        .submit("A@X.com ", "right-password", Utc::now())
        .await
        .unwrap();
    match step {
        LoginStep::SessionActive(principal) => {
            assert_eq!(principal.username, "a@x.com");
            assert_eq!(principal.role, Role::Member);
            assert!(principal.force_password_change);
        }
        LoginStep::MfaPending(_) => panic!("second factor is disabled"),
    }
}

#[tokio::test]
async fn wrong_code_then_right_code_then_replay() {
    let harness = harness(true).await;
    let now = Utc::now();
    let challenge = challenge(
        harness
            .login
            .submit("a@x.com", "right-password", now)
            .await
            .unwrap(),
    );
    assert_eq!(challenge.destination, "a***@x.com");
    let code = code_of(&challenge);

    let wrong = harness
        .login
        .verify_code(challenge.pending_id, other_code(&code), now)
        .await;
    let err = wrong.expect_err("wrong code");
    assert!(matches!(err, AuthError::InvalidOrExpiredCode));
    assert_eq!(err.login_state(), LoginState::MfaPending);

    let principal = harness
        .login
        .verify_code(challenge.pending_id, &code, now)
        .await
        .expect("right code");
    assert_eq!(principal.username, "a@x.com");

    let replay = harness
        .login
        .verify_code(challenge.pending_id, &code, now)
        .await;
    let err = replay.expect_err("replayed code");
    assert!(matches!(err, AuthError::InvalidOrExpiredCode));
    assert_eq!(err.login_state(), LoginState::MfaPending);
    assert!(!harness
        .login
        .otp()
        .validate("a@x.com", &code, now)
        .await
        .unwrap());
}

#[tokio::test]
async fn second_password_check_supersedes_first_code() {
    let harness = harness(true).await;
    let now = Utc::now();
    let first = challenge(
        harness
            .login
            .submit("a@x.com", "right-password", now)
            .await
            .unwrap(),
    );
    let second = challenge(
        harness
            .login
            .submit("a@x.com", "right-password", now + Duration::seconds(5))
            .await
            .unwrap(),
    );

    // The earlier pending login is gone.
    let stale = harness
        .login
        .verify_code(first.pending_id, &code_of(&first), now)
        .await;
    assert!(matches!(stale, Err(AuthError::SessionExpired)));

    let first_code = code_of(&first);
    let second_code = code_of(&second);
    if first_code != second_code {
        let old = harness
            .login
            .verify_code(second.pending_id, &first_code, now)
            .await;
        assert!(matches!(old, Err(AuthError::InvalidOrExpiredCode)));
    }
    assert!(harness
        .login
        .verify_code(second.pending_id, &second_code, now)
        .await
        .is_ok());
}

#[tokio::test]
async fn pending_login_expires_regardless_of_code() {
    let harness = harness(true).await;
    let now = Utc::now();
    let challenge = challenge(
        harness
            .login
            .submit("a@x.com", "right-password", now)
            .await
            .unwrap(),
    );
    let code = code_of(&challenge);

    let later = now + Duration::minutes(10) + Duration::seconds(1);
    let result = harness
        .login
        .verify_code(challenge.pending_id, &code, later)
        .await;
    let err = result.expect_err("pending login expired");
    assert!(matches!(err, AuthError::SessionExpired));
    assert_eq!(err.login_state(), LoginState::Expired);

    let again = harness.login.resend(challenge.pending_id, later).await;
    assert!(matches!(again, Err(AuthError::SessionExpired)));
}

#[tokio::test]
async fn expired_code_inside_pending_window_is_invalid_not_expired() {
    let config = AuthConfig::new("http://localhost:8080".to_string())
        .with_code_ttl_seconds(60)
        .with_pending_ttl_seconds(600);
    let accounts = Arc::new(MemoryAccountStore::new());
    let hasher = test_hasher();
    let login = LoginService::new(
        &config,
        accounts.clone(),
        Arc::new(MemoryCodeStore::new()),
        hasher.clone(),
        CodeDispatcher::new(Arc::new(RecordingDelivery::default()), DeliveryConfig::new()),
    )
    .unwrap();
    AccountService::new(accounts, hasher)
        .provision("a@x.com", Role::Member, Some("right-password"))
        .await
        .unwrap();

    let now = Utc::now();
    let challenge = challenge(login.submit("a@x.com", "right-password", now).await.unwrap());
    let result = login
        .verify_code(
            challenge.pending_id,
            &code_of(&challenge),
            now + Duration::minutes(2),
        )
        .await;
    assert!(matches!(result, Err(AuthError::InvalidOrExpiredCode)));
}

#[tokio::test]
async fn resend_issues_new_code_without_extending_window() {
    let harness = harness(true).await;
    let now = Utc::now();
    let original = challenge(
        harness
            .login
            .submit("a@x.com", "right-password", now)
            .await
            .unwrap(),
    );

    let resent = harness
        .login
        .resend(original.pending_id, now + Duration::minutes(9))
        .await
        .unwrap();
    assert_eq!(resent.pending_id, original.pending_id);

    let late = now + Duration::minutes(10) + Duration::seconds(1);
    let result = harness
        .login
        .verify_code(resent.pending_id, &code_of(&resent), late)
        .await;
    assert!(matches!(result, Err(AuthError::SessionExpired)));
}

#[tokio::test]
async fn unknown_user_is_indistinguishable_from_bad_password() {
    let harness = harness(true).await;
    let unknown = harness
        .login
        .submit("nobody@x.com", "whatever", Utc::now())
        .await
        .unwrap_err();
    let wrong = harness
        .login
        .submit("a@x.com", "wrong", Utc::now())
        .await
        .unwrap_err();
    assert_eq!(unknown.user_message(), wrong.user_message());
}

#[tokio::test]
async fn disabled_account_gets_specific_message() {
    let harness = harness(true).await;
    harness.admin.set_enabled("a@x.com", false).await.unwrap();
    let err = harness
        .login
        .submit("a@x.com", "right-password", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));
    assert!(err.user_message().contains("administrator"));
}

#[tokio::test]
async fn empty_input_is_rejected_without_counting() {
    let harness = harness(true).await;
    let err = harness
        .login
        .submit("a@x.com", "", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::InvalidCredentials {
            remaining_attempts: None
        }
    ));
    let stored = harness.accounts.find("a@x.com").await.unwrap().unwrap();
    assert_eq!(stored.failed_attempts, 0);
}

#[tokio::test]
async fn concurrent_wrong_passwords_are_all_counted() {
    let harness = Arc::new(harness(true).await);
    let now = Utc::now();
    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let harness = harness.clone();
            tokio::spawn(async move {
                let _ = harness.login.submit("a@x.com", "wrong", now).await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    let stored = harness.accounts.find("a@x.com").await.unwrap().unwrap();
    assert_eq!(stored.failed_attempts, 3);
}
