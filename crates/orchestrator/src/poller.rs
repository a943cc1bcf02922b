use std::time::Duration;

use reqwest::header::CACHE_CONTROL;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::backoff::{BackoffPolicy, RetryOutcome};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Polls a URL until it answers exactly 200.
#[derive(Clone, Default)]
pub struct LivenessPoller {
    client: Client,
}

impl LivenessPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn poll(&self, url: &str, policy: &BackoffPolicy) -> PollOutcome {
        let outcome = policy
            .retry(|attempt| async move {
                let response = self
                    .client
                    .get(url)
                    .header(CACHE_CONTROL, "no-cache")
                    .timeout(REQUEST_TIMEOUT)
                    .send()
                    .await;

                match response {
                    Ok(r) if r.status() == StatusCode::OK => true,
                    Ok(r) => {
                        debug!(url, attempt = attempt + 1, status = %r.status(), "Site not live yet");
                        false
                    }
                    Err(e) => {
                        debug!(url, attempt = attempt + 1, error = %e, "Liveness check failed");
                        false
                    }
                }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { attempts } => {
                info!(url, attempts, "Site is live");
                PollOutcome::Ready { attempts }
            }
            RetryOutcome::Exhausted { attempts } => {
                warn!(url, attempts, "Site did not become live");
                PollOutcome::TimedOut { attempts }
            }
        }
    }
}
