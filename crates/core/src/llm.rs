use crate::error::ProviderError;
use std::sync::Arc;

/// Single-shot completion request handed to a hosted model.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub context: &'a str,
    pub question: &'a str,
    pub temperature: f32,
}

impl CompletionRequest<'_> {
    /// User turn combining context and question; empty context is omitted.
    pub fn user_message(&self) -> String {
        if self.context.trim().is_empty() {
            self.question.to_string()
        } else {
            format!(
                "Context:\n{}\n\nQuestion: {}\n\nAnswer:",
                self.context, self.question
            )
        }
    }
}

pub trait LanguageModel {
    fn name(&self) -> &str;

    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError>;
}

impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        (**self).complete(request)
    }
}

impl<T: LanguageModel + ?Sized> LanguageModel for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        (**self).complete(request)
    }
}
