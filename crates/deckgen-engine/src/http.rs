use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{RequestBuilder, Response as HttpResponse};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            max_retries: 2,
            backoff: Duration::from_millis(1200),
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.min(4);
        self
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        self.backoff * (attempt as u32 + 1)
    }
}

/// Sends the request built by `build`, retrying only transport failures
/// (connect, timeout). HTTP error statuses are returned to the caller as-is.
pub(crate) fn send_with_transport_retries<F>(
    label: &str,
    policy: &RetryPolicy,
    mut build: F,
) -> Result<HttpResponse>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match build().timeout(policy.timeout).send() {
            Ok(response) => return Ok(response),
            Err(raw) => {
                let err = anyhow::Error::new(raw).context(format!("{label} request failed"));
                if !is_retryable_transport_error(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                warn!(
                    provider = label,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    "transport retry after transient request failure"
                );
                thread::sleep(policy.delay_for(attempt));
                attempt += 1;
            }
        }
    }
}

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    parse_json_body(provider, code, status.is_success(), &body)
}

fn parse_json_body(provider: &str, code: u16, success: bool, body: &str) -> Result<Value> {
    if !success {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

pub(crate) fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| reqwest_err.is_timeout() || reqwest_err.is_connect())
            .unwrap_or(false)
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
