use crate::config::AnswerConfig;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::models::{AnswerKind, Retrieval, RetrievalResponse, ScoredResult, SourceRef};
use tracing::{info, warn};

pub const RETRY_MESSAGE: &str = "Could not generate a response. Please try again.";

const REPHRASE_SUGGESTIONS: &[&str] = &[
    "Try different or more specific terms.",
    "Use the wording the documents themselves use.",
    "Split a compound question into simpler ones.",
];

/// Turns retrieved passages into an answer with cited sources.
pub struct AnswerComposer<'a, L> {
    llm: L,
    config: &'a AnswerConfig,
}

impl<'a, L: LanguageModel> AnswerComposer<'a, L> {
    pub fn new(llm: L, config: &'a AnswerConfig) -> Self {
        Self { llm, config }
    }

    /// Never fails: provider errors and empty replies become
    /// [`AnswerKind::Failed`] with the error text attached.
    pub fn compose(&self, retrieval: &Retrieval) -> RetrievalResponse {
        if retrieval.is_empty() {
            return no_relevant_content(&retrieval.question);
        }

        let used = &retrieval.passages[..retrieval.passages.len().min(self.config.context_passages)];
        let context = build_context(used);
        let system_prompt = self.config.system_prompt();
        let request = CompletionRequest {
            system_prompt: &system_prompt,
            context: &context,
            question: &retrieval.question,
            temperature: self.config.temperature,
        };

        let reply = self
            .llm
            .complete(&request)
            .map_err(|error| error.to_string())
            .and_then(|reply| {
                let reply = reply.trim().to_string();
                if reply.is_empty() {
                    Err(format!("{} returned an empty answer", self.llm.name()))
                } else {
                    Ok(reply)
                }
            });

        match reply {
            Ok(answer) => {
                info!(
                    model = self.llm.name(),
                    passages = used.len(),
                    strategy = ?retrieval.strategy,
                    "answer composed"
                );
                RetrievalResponse {
                    answer,
                    sources: used.iter().map(|result| SourceRef::from(&result.chunk)).collect(),
                    kind: AnswerKind::Answered,
                    strategy: retrieval.strategy,
                    error: None,
                }
            }
            Err(error) => {
                warn!(model = self.llm.name(), %error, "answer generation failed");
                RetrievalResponse {
                    error: Some(error),
                    strategy: retrieval.strategy,
                    ..RetrievalResponse::without_sources(RETRY_MESSAGE, AnswerKind::Failed)
                }
            }
        }
    }
}

/// Passages separated by blank lines, each headed by `[source: <label>]`.
pub fn build_context(passages: &[ScoredResult]) -> String {
    passages
        .iter()
        .map(|result| {
            format!(
                "[source: {}]\n{}",
                result.chunk.metadata.label(),
                result.chunk.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn no_relevant_content(question: &str) -> RetrievalResponse {
    let suggestions = REPHRASE_SUGGESTIONS
        .iter()
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    let answer = format!(
        "No content related to \"{question}\" was found in the uploaded documents.\n\n\
         Suggestions:\n{suggestions}"
    );
    RetrievalResponse::without_sources(answer, AnswerKind::NoRelevantContent)
}
