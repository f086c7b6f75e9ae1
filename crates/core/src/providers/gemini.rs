use super::{check_status, endpoint_url};
use crate::embeddings::{ensure_dimensions, Embedder};
use crate::error::ProviderError;
use crate::llm::{CompletionRequest, LanguageModel};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

const PROVIDER: &str = "gemini";

#[derive(Clone)]
pub struct GeminiEmbedder {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, model, dimensions, GEMINI_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        let model = model.into();
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint_url(base_url, &format!("models/{model}:batchEmbedContents"))?,
            api_key: api_key.into(),
            model,
            dimensions,
        })
    }

    fn request_body(&self, texts: &[&str]) -> Value {
        let requests = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect::<Vec<_>>();
        json!({ "requests": requests })
    }
}

impl Embedder for GeminiEmbedder {
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
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", self.api_key.trim())
            .json(&self.request_body(texts))
            .send()?;
        let parsed: Value = check_status(PROVIDER, response)?.json()?;
        let vectors = parse_embeddings(&parsed)?;

        if vectors.len() != texts.len() {
            return Err(ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                details: format!("returned {} embeddings for {} inputs", vectors.len(), texts.len()),
            });
        }
        ensure_dimensions(&vectors, self.dimensions)?;
        Ok(vectors)
    }
}

fn parse_embeddings(payload: &Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let embeddings = payload
        .pointer("/embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Malformed {
            provider: PROVIDER.to_string(),
            details: "missing embeddings array".to_string(),
        })?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .pointer("/values")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_f64)
                        .map(|value| value as f32)
                        .collect::<Vec<_>>()
                })
                .ok_or_else(|| ProviderError::Malformed {
                    provider: PROVIDER.to_string(),
                    details: "embedding without values".to_string(),
                })
        })
        .collect()
}

#[derive(Clone)]
pub struct GeminiChatModel {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl GeminiChatModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, model, GEMINI_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        let model = model.into();
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint_url(base_url, &format!("models/{model}:generateContent"))?,
            api_key: api_key.into(),
            model,
        })
    }
}

impl LanguageModel for GeminiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.user_message() }] }],
            "generationConfig": { "temperature": request.temperature },
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", self.api_key.trim())
            .json(&body)
            .send()?;
        let parsed: Value = check_status(PROVIDER, response)?.json()?;
        parse_candidate_text(&parsed)
    }
}

fn parse_candidate_text(payload: &Value) -> Result<String, ProviderError> {
    let text = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.pointer("/text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = payload
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
            .unwrap_or("no candidates");
        return Err(ProviderError::Malformed {
            provider: PROVIDER.to_string(),
            details: format!("response had no text ({reason})"),
        });
    }

    Ok(text)
}
