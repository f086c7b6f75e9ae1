pub mod gemini;
pub mod openai;

pub use gemini::{GeminiChatModel, GeminiEmbedder};
pub use openai::{OpenAiChatModel, OpenAiEmbedder};

use crate::error::ProviderError;
use reqwest::blocking::Response;
use url::Url;

/// Resolves `path` against `base`, tolerating a base without trailing slash.
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<Url, ProviderError> {
    let base = if base.ends_with('/') {
        Url::parse(base)?
    } else {
        Url::parse(&format!("{base}/"))?
    };
    Ok(base.join(path)?)
}

pub(crate) fn check_status(provider: &str, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(ProviderError::BackendResponse {
        provider: provider.to_string(),
        details: format!("{status}: {body}"),
    })
}
