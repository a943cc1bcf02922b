use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use tracing::{debug, error, warn};

use crate::error::{GenerationError, GenerationResult};
use crate::types::*;

const DEFAULT_MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 60000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Retry budget for rate limits and 5xx responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl RetryConfig {
    /// Wait before retry number `retry` (0-based), or `None` when `error`
    /// is final. Only rate limits and 5xx responses are retried; an explicit
    /// `Retry-After` wins over `min(initial * 2^retry, max)`.
    pub fn delay_for(&self, error: &GenerationError, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }

        let backoff = self
            .initial_backoff
            .checked_mul(2u32.checked_pow(retry).unwrap_or(u32::MAX))
            .unwrap_or(self.max_backoff);

        let wait = match error {
            GenerationError::RateLimited {
                retry_after: Some(secs),
            } => Duration::from_secs(*secs),
            GenerationError::RateLimited { retry_after: None } => backoff,
            GenerationError::Api {
                status_code: Some(code),
                ..
            } if *code >= 500 => backoff,
            _ => return None,
        };
        Some(wait.min(self.max_backoff))
    }
}

/// Client for OpenAI-compatible chat completion APIs.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryConfig,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn with_retry<T, F, Fut>(&self, operation: F, operation_name: &str) -> GenerationResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = GenerationResult<T>>,
    {
        let mut retry = 0;
        loop {
            let err = match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            let Some(wait) = self.retry.delay_for(&err, retry) else {
                if retry > 0 {
                    error!(operation = operation_name, retries = retry, error = %err, "Giving up");
                }
                return Err(err);
            };

            warn!(
                operation = operation_name,
                error = %err,
                attempt = retry + 1,
                max_retries = self.retry.max_retries,
                wait_ms = wait.as_millis() as u64,
                "Retrying"
            );
            tokio::time::sleep(wait).await;
            retry += 1;
        }
    }

    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> GenerationResult<String> {
        self.with_retry(
            || async {
                self.chat_completion_inner(messages.clone(), model, temperature, max_tokens)
                    .await
            },
            "chat_completion",
        )
        .await
    }

    async fn chat_completion_inner(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> GenerationResult<String> {
        debug!(
            "Creating chat completion with {} messages, model {}",
            messages.len(),
            model
        );

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let chat_response: ChatCompletionResponse = response.json().await?;

        if let Some(usage) = &chat_response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyCompletion)
    }
}

async fn check_status(response: Response) -> GenerationResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        warn!("Rate limited by chat completions API");
        return Err(GenerationError::RateLimited { retry_after });
    }

    let error_text = response.text().await.unwrap_or_default();

    if let Ok(error_resp) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
        error!(
            "Chat completions API error: {} (type: {:?})",
            error_resp.error.message, error_resp.error.error_type
        );
        return Err(GenerationError::Api {
            message: error_resp.error.message,
            status_code: Some(status.as_u16()),
        });
    }

    Err(GenerationError::Api {
        message: error_text,
        status_code: Some(status.as_u16()),
    })
}
