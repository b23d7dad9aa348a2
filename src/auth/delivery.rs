//! One-time-code delivery.
//!
//! Issuing a code never waits on delivery. [`CodeDispatcher::dispatch`] spawns
//! a task that hands the code to a [`CodeDelivery`] channel, retrying failed
//! sends with exponential backoff and jitter. Exhausted retries are logged and
//! the code stays valid, so a later resend or a delayed message still works.
//!
//! Channels:
//! - [`ResendDelivery`] posts to the Resend e-mail API.
//! - [`LogDelivery`] writes the code to the log. Development only.
//! - [`UnconfiguredDelivery`] fails every send; used when no provider is set.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{error, info, warn};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const CODE_SUBJECT: &str = "Your Willows RTA Login Code";

#[async_trait]
pub trait CodeDelivery: Send + Sync {
    /// Deliver `code` to `contact_address` or return an error to trigger a retry.
    async fn send_code(&self, contact_address: &str, code: &str) -> Result<()>;
}

pub struct ResendDelivery {
    client: reqwest::Client,
    api_key: SecretString,
    from: String,
    endpoint: String,
}

impl ResendDelivery {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: SecretString, from: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build e-mail HTTP client")?;
        Ok(Self {
            client,
            api_key,
            from,
            endpoint: RESEND_ENDPOINT.to_string(),
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

#[async_trait]
impl CodeDelivery for ResendDelivery {
    async fn send_code(&self, contact_address: &str, code: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&resend_payload(&self.from, contact_address, code))
            .send()
            .await
            .context("failed to reach e-mail provider")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("e-mail provider returned {status}: {body}"))
    }
}

fn resend_payload(from: &str, to: &str, code: &str) -> serde_json::Value {
    json!({
        "from": from,
        "to": [to],
        "subject": CODE_SUBJECT,
        "html": code_email_html(code),
    })
}

fn code_email_html(code: &str) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h2>Willows RTA Login Verification</h2>\
         <p>Your one-time login code is:</p>\
         <p style=\"font-size: 32px; font-weight: bold; letter-spacing: 8px;\">{code}</p>\
         <p>This code expires shortly and can be used once.</p>\
         <p>If you didn't request this code, please ignore this email.</p>\
         </div>"
    )
}

/// Writes codes to the log instead of sending them.
#[derive(Clone, Debug)]
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn send_code(&self, contact_address: &str, code: &str) -> Result<()> {
        warn!(
            destination = %mask_address(contact_address),
            code,
            "development delivery: one-time code written to log"
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct UnconfiguredDelivery;

#[async_trait]
impl CodeDelivery for UnconfiguredDelivery {
    async fn send_code(&self, _contact_address: &str, _code: &str) -> Result<()> {
        Err(anyhow!("no e-mail provider configured"))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DeliveryConfig {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    log_on_failure: bool,
}

impl DeliveryConfig {
    /// Default: 3 attempts, 500ms -> 5s exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(5),
            log_on_failure: false,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_millis(mut self, millis: u64) -> Self {
        self.backoff_base = Duration::from_millis(millis);
        self
    }

    /// Write the code to the log once every attempt has failed.
    #[must_use]
    pub fn with_log_on_failure(mut self, enabled: bool) -> Self {
        self.log_on_failure = enabled;
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_millis(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            max_attempts,
            backoff_base,
            backoff_max,
            log_on_failure: self.log_on_failure,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn log_on_failure(&self) -> bool {
        self.log_on_failure
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct CodeDispatcher {
    channel: Arc<dyn CodeDelivery>,
    config: DeliveryConfig,
}

impl CodeDispatcher {
    #[must_use]
    pub fn new(channel: Arc<dyn CodeDelivery>, config: DeliveryConfig) -> Self {
        Self {
            channel,
            config: config.normalize(),
        }
    }

    /// Send in the background. Callers may drop the handle.
    pub fn dispatch(&self, contact_address: String, code: String) -> tokio::task::JoinHandle<()> {
        let channel = self.channel.clone();
        let config = self.config;
        tokio::spawn(async move {
            deliver_with_retry(channel.as_ref(), &config, &contact_address, &code).await;
        })
    }
}

async fn deliver_with_retry(
    channel: &dyn CodeDelivery,
    config: &DeliveryConfig,
    contact_address: &str,
    code: &str,
) -> bool {
    let destination = mask_address(contact_address);
    for attempt in 1..=config.max_attempts() {
        match channel.send_code(contact_address, code).await {
            Ok(()) => {
                info!(destination = %destination, attempt, "one-time code delivered");
                return true;
            }
            Err(err) if attempt < config.max_attempts() => {
                warn!(destination = %destination, attempt, "code delivery failed, retrying: {err:#}");
                sleep(backoff_delay(attempt, config.backoff_base, config.backoff_max)).await;
            }
            Err(err) => {
                error!(destination = %destination, attempt, "code delivery failed: {err:#}");
            }
        }
    }

    if config.log_on_failure() {
        warn!(
            destination = %destination,
            code,
            "development fallback: undelivered one-time code written to log"
        );
    }
    false
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

/// `jo***@example.org`: first two characters of the local part, then a mask.
#[must_use]
pub fn mask_address(address: &str) -> String {
    let Some((local, domain)) = address.split_once('@') else {
        return address.to_string();
    };
    let visible: String = local.chars().take(2).collect();
    format!("{visible}***@{domain}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    struct FlakyDelivery {
        failures_before_success: u32,
        calls: AtomicU32,
        delivered: Mutex<Vec<(String, String)>>,
    }

    impl FlakyDelivery {
        fn new(failures_before_success: u32) -> Self {
            Self {
                failures_before_success,
                calls: AtomicU32::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CodeDelivery for FlakyDelivery {
        async fn send_code(&self, contact_address: &str, code: &str) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures_before_success {
                return Err(anyhow!("provider unavailable"));
            }
            self.delivered
                .lock()
                .await
                .push((contact_address.to_string(), code.to_string()));
            Ok(())
        }
    }

    fn fast_config(max_attempts: u32) -> DeliveryConfig {
        DeliveryConfig::new()
            .with_max_attempts(max_attempts)
            .with_backoff_base_millis(1)
            .normalize()
    }

    #[test]
    fn mask_keeps_two_characters_of_local_part() {
        assert_eq!(mask_address("john@example.org"), "jo***@example.org");
        assert_eq!(mask_address("j@example.org"), "j***@example.org");
        assert_eq!(mask_address("not-an-address"), "not-an-address");
    }

    #[test]
    fn resend_payload_shape() {
        let payload = resend_payload("onboarding@resend.dev", "a@x.com", "123456");
        assert_eq!(payload["from"], "onboarding@resend.dev");
        assert_eq!(payload["to"], json!(["a@x.com"]));
        assert_eq!(payload["subject"], CODE_SUBJECT);
        assert!(payload["html"].as_str().unwrap().contains("123456"));
    }

    #[test]
    fn normalize_clamps_zero_values() {
        let config = DeliveryConfig::new()
            .with_max_attempts(0)
            .with_backoff_base_millis(0)
            .normalize();
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.backoff_base(), Duration::from_millis(1));
        assert!(!config.log_on_failure());
    }

    #[test]
    fn backoff_is_capped() {
        let delay = backoff_delay(20, Duration::from_millis(500), Duration::from_secs(5));
        assert!(delay <= Duration::from_secs(5));
        assert!(delay >= Duration::from_millis(2_500));
    }

    #[tokio::test]
    async fn retries_until_delivered() {
        let channel = FlakyDelivery::new(2);
        let delivered = deliver_with_retry(&channel, &fast_config(3), "a@x.com", "123456").await;
        assert!(delivered);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            channel.delivered.lock().await.as_slice(),
            &[("a@x.com".to_string(), "123456".to_string())]
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let channel = FlakyDelivery::new(10);
        let delivered = deliver_with_retry(&channel, &fast_config(2), "a@x.com", "123456").await;
        assert!(!delivered);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dispatch_runs_in_background() {
        let channel = Arc::new(FlakyDelivery::new(0));
        let dispatcher = CodeDispatcher::new(channel.clone(), fast_config(1));
        dispatcher
            .dispatch("a@x.com".to_string(), "654321".to_string())
            .await
            .unwrap();
        assert_eq!(channel.delivered.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_delivery_always_fails() {
        assert!(UnconfiguredDelivery
            .send_code("a@x.com", "123456")
            .await
            .is_err());
        assert!(LogDelivery.send_code("a@x.com", "123456").await.is_ok());
    }
}
