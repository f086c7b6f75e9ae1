//! OpenAI embeddings and chat completions over blocking HTTP.

use super::{check_status, endpoint_url};
use crate::embeddings::{ensure_dimensions, Embedder};
use crate::error::ProviderError;
use crate::llm::{CompletionRequest, LanguageModel};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1/";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "openai";

#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    dimensions: usize,
    requested_dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    /// `dimensions` is forwarded to the API when set; otherwise the model's
    /// native size is assumed.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: Option<usize>,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, model, dimensions, OPENAI_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: Option<usize>,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        let model = model.into();
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint_url(base_url, "embeddings")?,
            api_key: api_key.into(),
            dimensions: dimensions.unwrap_or_else(|| native_dimensions(&model)),
            requested_dimensions: dimensions,
            model,
        })
    }
}

fn native_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> String {
        format!("{PROVIDER}/{}/{}", self.model, self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                details: "empty embedding response".to_string(),
            })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions,
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.trim())
            .json(&request)
            .send()?;
        let mut parsed: EmbeddingResponse = check_status(PROVIDER, response)?.json()?;

        if parsed.data.len() != texts.len() {
            return Err(ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                details: format!(
                    "returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
            });
        }

        parsed.data.sort_by_key(|entry| entry.index);
        let vectors = parsed
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect::<Vec<_>>();
        ensure_dimensions(&vectors, self.dimensions)?;
        Ok(vectors)
    }
}

#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, model, OPENAI_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint_url(base_url, "chat/completions")?,
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

impl LanguageModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        let user_message = request.user_message();
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user_message,
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()?;
        let parsed: ChatResponse = check_status(PROVIDER, response)?.json()?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                details: "response had no message content".to_string(),
            })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_dimensions_follow_model() {
        let embedder =
            OpenAiEmbedder::new("key", "text-embedding-3-large", None).expect("valid endpoint");
        assert_eq!(embedder.dimensions(), 3072);
        assert_eq!(embedder.model_id(), "openai/text-embedding-3-large/3072");
    }

    #[test]
    fn requested_dimensions_override_native_size() {
        let embedder =
            OpenAiEmbedder::new("key", "text-embedding-3-small", Some(256)).expect("valid endpoint");
        assert_eq!(embedder.dimensions(), 256);
    }

    #[test]
    fn embedding_request_omits_unset_dimensions() {
        let request = EmbeddingRequest {
            model: "m",
            input: &["a"],
            dimensions: None,
        };
        let json = serde_json::to_value(&request).expect("serializable");
        assert!(json.get("dimensions").is_none());
    }

    #[test]
    fn chat_response_tolerates_null_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#)
                .expect("valid payload");
        assert!(parsed.choices[0].message.content.is_none());
    }
}
