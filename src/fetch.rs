use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use thiserror::Error;
use tracing::warn;

use crate::registry::Platform;

// Several platforms reject default client identities outright.
const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Retry budget and the jittered pause between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Uniform range in seconds; jitter keeps retries from synchronizing.
    pub backoff_secs: (f64, f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: (3.0, 5.0),
        }
    }
}

/// All attempts exhausted. Non-fatal to the run; the orchestrator records it
/// and moves on to the next platform.
#[derive(Debug, Error)]
#[error("fetch failed after {attempts} attempt(s): {last_error}")]
pub struct FetchError {
    pub attempts: u32,
    pub last_error: String,
}

pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(browser_headers())
            .build()?;
        Ok(Self { client, policy })
    }

    /// One GET per attempt. Transport errors, timeouts and non-2xx statuses
    /// are retried up to the platform's budget; a body that later fails to
    /// parse is a normalization problem and never comes back here.
    pub async fn fetch(&self, platform: &Platform) -> Result<String, FetchError> {
        let attempts = platform
            .max_attempts
            .unwrap_or(self.policy.max_attempts)
            .max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                let pause = jitter(self.policy.backoff_secs);
                warn!(
                    "{}: retry {}/{} in {:.1}s",
                    platform.id,
                    attempt,
                    attempts,
                    pause.as_secs_f64()
                );
                tokio::time::sleep(pause).await;
            }
            match self.get(platform.strategy.endpoint()).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!("{}: request failed: {}", platform.id, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(FetchError {
            attempts,
            last_error,
        })
    }

    async fn get(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

fn jitter((lo, hi): (f64, f64)) -> Duration {
    let secs = if hi > lo {
        rand::rng().random_range(lo..hi)
    } else {
        lo
    };
    Duration::from_secs_f64(secs.max(0.0))
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

// ── Tests ──
