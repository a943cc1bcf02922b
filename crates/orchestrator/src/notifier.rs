use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::backoff::{BackoffPolicy, RetryOutcome};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const LOGGED_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Best-effort JSON delivery to a callback URL.
#[derive(Clone, Default)]
pub struct Notifier {
    client: Client,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn deliver<P: Serialize>(
        &self,
        url: &str,
        payload: &P,
        policy: &BackoffPolicy,
    ) -> DeliveryOutcome {
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(e) => {
                error!(url, error = %e, "Notification payload could not be serialized");
                return DeliveryOutcome::Exhausted { attempts: 0 };
            }
        };

        let outcome = policy
            .retry(|attempt| {
                let body = &body;
                async move {
                    let response = self
                        .client
                        .post(url)
                        .json(body)
                        .timeout(REQUEST_TIMEOUT)
                        .send()
                        .await;

                    match response {
                        Ok(r) if r.status() == StatusCode::OK => true,
                        Ok(r) => {
                            let status = r.status();
                            let text = r.text().await.unwrap_or_default();
                            let text: String = text.chars().take(LOGGED_BODY_CHARS).collect();
                            warn!(url, attempt = attempt + 1, %status, body = %text, "Notification rejected");
                            false
                        }
                        Err(e) => {
                            warn!(url, attempt = attempt + 1, error = %e, "Notification failed");
                            false
                        }
                    }
                }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { attempts } => {
                info!(url, attempts, "Notification delivered");
                DeliveryOutcome::Delivered { attempts }
            }
            RetryOutcome::Exhausted { attempts } => {
                error!(url, attempts, "Notification delivery exhausted");
                DeliveryOutcome::Exhausted { attempts }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_delivers_json_payload() {
        let server = MockServer::start().await;
        let payload = json!({"email": "a@b.c", "round": 1});
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = Notifier::new()
            .deliver(&format!("{}/notify", server.uri()), &payload, &fast(6))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });
    }

    #[tokio::test]
    async fn test_retries_until_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let outcome = Notifier::new()
            .deliver(&server.uri(), &json!({}), &fast(6))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 4 });
    }

    #[tokio::test]
    async fn test_never_exceeds_attempt_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(6)
            .mount(&server)
            .await;

        let outcome = Notifier::new()
            .deliver(&server.uri(), &json!({"ok": true}), &fast(6))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Exhausted { attempts: 6 });
        assert!(!outcome.is_delivered());
    }
}
