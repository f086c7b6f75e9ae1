use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanerConfig {
    /// Characters that end a sentence or clause; a line break after one of
    /// them is kept, any other single line break is joined with a space.
    pub sentence_terminators: Vec<char>,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            sentence_terminators: vec!['.', '!', '?', '…', '다', '음', '임'],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_chars: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            min_chunk_chars: 50,
            separators: ["\n\n", "\n", "다.", "음.", "임.", ".", "!", "?", " ", ""]
                .iter()
                .map(|separator| separator.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    pub path: PathBuf,
    pub embed_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vector_index.json"),
            embed_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    pub direct_k: usize,
    pub keyword_k: usize,
    pub max_keywords: usize,
    pub merge_cap: usize,
    pub similarity_threshold: f32,
    pub lexical_fallback: bool,
    pub fallback_cap: usize,
    pub question_word_bonus: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            direct_k: 5,
            keyword_k: 3,
            max_keywords: 8,
            merge_cap: 8,
            similarity_threshold: 0.5,
            lexical_fallback: true,
            fallback_cap: 3,
            question_word_bonus: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ExpansionStrategy {
    #[default]
    RuleBased,
    LlmAssisted,
}

/// A root term and the synonyms searched whenever the root appears in a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordFamily {
    pub root: String,
    pub synonyms: Vec<String>,
}

impl KeywordFamily {
    pub fn new(root: &str, synonyms: &[&str]) -> Self {
        Self {
            root: root.to_string(),
            synonyms: synonyms.iter().map(|term| term.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpansionConfig {
    pub strategy: ExpansionStrategy,
    pub families: Vec<KeywordFamily>,
    pub stop_words: Vec<String>,
    pub basic_keyword_cap: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            strategy: ExpansionStrategy::RuleBased,
            families: vec![
                KeywordFamily::new(
                    "담임수당",
                    &["담임수당", "담임 수당", "담임교사 수당", "담임교사수당"],
                ),
                KeywordFamily::new(
                    "부장수당",
                    &["부장수당", "부장 수당", "부장교사 수당", "부장교사수당"],
                ),
                KeywordFamily::new("수당", &["수당", "급여", "보수", "수령"]),
                KeywordFamily::new("받을 수 있", &["받을 수 있", "수령 가능", "지급", "받는"]),
                KeywordFamily::new("불가", &["불가", "불가능", "받을 수 없", "수령 불가"]),
            ],
            stop_words: [
                "은", "는", "이", "가", "을", "를", "에", "에서", "의", "로", "으로", "와", "과",
                "하다", "있다", "없다",
            ]
            .iter()
            .map(|word| word.to_string())
            .collect(),
            basic_keyword_cap: 5,
        }
    }
}

pub const DEFAULT_REFUSAL_TEXT: &str =
    "The provided documents do not contain information to answer this question.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerConfig {
    pub context_passages: usize,
    /// Exact reply the model is told to give when the context does not help.
    pub refusal_text: String,
    pub temperature: f32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            context_passages: 3,
            refusal_text: DEFAULT_REFUSAL_TEXT.to_string(),
            temperature: 0.3,
        }
    }
}

impl AnswerConfig {
    pub fn system_prompt(&self) -> String {
        default_system_prompt(&self.refusal_text)
    }
}

pub fn default_system_prompt(refusal_text: &str) -> String {
    format!(
        "You are an assistant that answers questions about the supplied documents.\n\
         1. First judge whether the context is relevant to the question.\n\
         2. If it is not, answer exactly: \"{refusal_text}\"\n\
         3. If it is, answer accurately and in detail using only that context.\n\
         4. Never guess or invent anything that is not in the context.\n\
         Write a clear, specific answer with paragraphs and line breaks for readability."
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PipelineConfig {
    pub cleaner: CleanerConfig,
    pub chunking: ChunkingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub expansion: ExpansionConfig,
    pub answer: AnswerConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        if chunking.separators.is_empty() {
            return Err(ConfigError("at least one separator is required".to_string()));
        }
        if self.index.embed_batch_size == 0 {
            return Err(ConfigError("embed_batch_size must be greater than zero".to_string()));
        }

        let retrieval = &self.retrieval;
        if !(0.0..=1.0).contains(&retrieval.similarity_threshold) {
            return Err(ConfigError(format!(
                "similarity_threshold {} is outside [0, 1]",
                retrieval.similarity_threshold
            )));
        }
        if retrieval.direct_k == 0 || retrieval.keyword_k == 0 || retrieval.merge_cap == 0 {
            return Err(ConfigError("search sizes must be greater than zero".to_string()));
        }
        if self.answer.context_passages == 0 {
            return Err(ConfigError("context_passages must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let mut config = PipelineConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        let error = config.validate().unwrap_err();
        assert!(error.0.contains("chunk_overlap"));
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let mut config = PipelineConfig::default();
        config.retrieval.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn system_prompt_embeds_refusal_text() {
        let mut config = AnswerConfig::default();
        assert!(config.system_prompt().contains(DEFAULT_REFUSAL_TEXT));

        config.refusal_text = "문서에 해당 내용이 없습니다.".to_string();
        let prompt = config.system_prompt();
        assert!(prompt.contains("문서에 해당 내용이 없습니다."));
        assert!(!prompt.contains(DEFAULT_REFUSAL_TEXT));
    }

    #[test]
    fn korean_clause_endings_precede_bare_period() {
        let separators = ChunkingConfig::default().separators;
        let position = |wanted: &str| separators.iter().position(|s| s == wanted);
        for ending in ["다.", "음.", "임."] {
            assert!(position(ending) < position("."), "{ending} comes after \".\"");
        }
    }
}
