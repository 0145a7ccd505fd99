//! Blocking HTTP plumbing shared by the Confluence and Outline clients:
//! request pacing, bounded retries with backoff, and status checking.

use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use tracing::debug;

use crate::config::{env_value_u64, env_value_usize};

const ERROR_BODY_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub rate_limit_ms: u64,
}

impl HttpSettings {
    pub fn from_env(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            timeout_ms: env_value_u64("CF2OUTLINE_HTTP_TIMEOUT_MS", 30_000),
            max_retries: env_value_usize("CF2OUTLINE_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("CF2OUTLINE_HTTP_RETRY_DELAY_MS", 500),
            rate_limit_ms: env_value_u64("CF2OUTLINE_RATE_LIMIT_MS", 0),
        }
    }
}

/// Whether a failed call may be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Idempotency {
    Read,
    Write,
}

pub(crate) struct HttpSession {
    client: Client,
    settings: HttpSettings,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl HttpSession {
    pub(crate) fn new(settings: HttpSettings, service: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(settings.user_agent.clone())
            .build()
            .with_context(|| format!("failed to build {service} HTTP client"))?;
        Ok(Self {
            client,
            settings,
            last_request_at: None,
            request_count: 0,
        })
    }

    pub(crate) fn request_count(&self) -> usize {
        self.request_count
    }

    /// Send a request built by `build`, retrying transient failures of reads.
    /// Non-2xx responses that exhaust the retry budget become errors.
    pub(crate) fn send<F>(&mut self, label: &str, idempotency: Idempotency, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_retries = match idempotency {
            Idempotency::Read => self.settings.max_retries,
            Idempotency::Write => 0,
        };

        for attempt in 0..=max_retries {
            self.apply_rate_limit();
            debug!(request = label, attempt, "sending request");
            match build(&self.client).send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if attempt < max_retries && is_retryable_status(status) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    let body = response.text().unwrap_or_default();
                    bail!(
                        "{label} failed with HTTP {status}: {}",
                        preview(&body, ERROR_BODY_PREVIEW_CHARS)
                    );
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to call {label}"));
                }
            }
        }

        bail!("{label} exhausted retry budget")
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.settings.rate_limit_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .settings
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn preview(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
