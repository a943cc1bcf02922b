use appforge_core::RequirementsDocument;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::client::ChatClient;
use crate::error::{GenerationError, GenerationResult};
use crate::traits::GenerationBackend;
use crate::types::ChatMessage;

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 2000;

const SYSTEM_PROMPT: &str = "You are a senior full-stack developer. Generate high-quality, \
production-ready code based on the user's requirements. Follow best practices, include proper \
error handling, and ensure the code is well-documented.";

/// Asks a chat model for the whole application as a JSON object of path → content.
pub struct ChatGenerationBackend {
    client: ChatClient,
    model: String,
}

impl ChatGenerationBackend {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

pub fn build_prompt(requirements: &RequirementsDocument) -> GenerationResult<String> {
    let requirements = serde_json::to_string_pretty(requirements)?;

    Ok(format!(
        "Based on the following requirements, generate a complete application structure.\n\
         Return a JSON object where keys are file paths and values are the file contents.\n\n\
         Requirements:\n{}\n\n\
         Include all necessary configuration files, source code, and documentation.",
        requirements
    ))
}

#[async_trait]
impl GenerationBackend for ChatGenerationBackend {
    fn name(&self) -> &str {
        "chat"
    }

    async fn generate(&self, requirements: &RequirementsDocument) -> GenerationResult<String> {
        let prompt = build_prompt(requirements)?;
        debug!(
            model = %self.model,
            update = requirements.is_update(),
            prompt_len = prompt.len(),
            "Requesting generated files"
        );

        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let content = self
            .client
            .chat_completion(messages, &self.model, Some(TEMPERATURE), Some(MAX_TOKENS))
            .await?;

        info!(model = %self.model, response_len = content.len(), "Generation completed");
        Ok(content)
    }
}

/// Used when no API key is configured; every call fails so callers fall back.
#[derive(Debug, Default, Clone)]
pub struct DisabledBackend;

#[async_trait]
impl GenerationBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _requirements: &RequirementsDocument) -> GenerationResult<String> {
        Err(GenerationError::NotConfigured(
            "OPENAI_API_KEY not set; LLM generation disabled".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::FileMap;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn requirements() -> RequirementsDocument {
        RequirementsDocument {
            brief: "A todo list".to_string(),
            checks: vec!["has #todo".to_string()],
            attachments: vec![],
            existing_files: None,
            update_instructions: None,
        }
    }

    #[test]
    fn test_prompt_embeds_requirements() {
        let prompt = build_prompt(&requirements()).unwrap();
        assert!(prompt.contains("Return a JSON object where keys are file paths"));
        assert!(prompt.contains("\"brief\": \"A todo list\""));
        assert!(prompt.contains("has #todo"));
    }

    #[tokio::test]
    async fn test_disabled_backend_fails() {
        let err = DisabledBackend.generate(&requirements()).await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
        assert_eq!(DisabledBackend.name(), "disabled");
    }

    #[tokio::test]
    async fn test_chat_backend_sends_model_settings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "gpt-4", "max_tokens": 2000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"index.html\": \"<h1>Hi</h1>\"}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = ChatGenerationBackend::new(ChatClient::new("k", server.uri()), DEFAULT_MODEL);
        let content = backend.generate(&requirements()).await.unwrap();

        assert_eq!(content, "{\"index.html\": \"<h1>Hi</h1>\"}");
    }

    #[tokio::test]
    async fn test_chat_backend_includes_existing_files_for_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("existing_files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut files = FileMap::new();
        files.insert("index.html".to_string(), "<h1>v1</h1>".to_string());
        let doc = requirements().with_existing_files(files, 2);

        let backend = ChatGenerationBackend::new(ChatClient::new("k", server.uri()), "gpt-4o");
        backend.generate(&doc).await.unwrap();
        assert_eq!(backend.model(), "gpt-4o");
    }
}
