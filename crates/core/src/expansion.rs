//! Query expansion: supplementary search keywords derived from a question.
//!
//! Two strategies share the [`QueryExpander`] trait. The rule-based one expands
//! configured keyword families; the LLM-assisted one asks a model and falls back
//! to plain tokenization whenever the model fails.

use crate::config::{ExpansionConfig, KeywordFamily};
use crate::llm::{CompletionRequest, LanguageModel};
use std::collections::HashSet;
use tracing::{debug, warn};

pub const MAX_KEYWORDS: usize = 8;

const LLM_KEYWORD_PROMPT: &str = "Extract the important keywords from the user's question and \
expand them with related terms.\n\
Requirements:\n\
1. Extract 5-8 core keywords.\n\
2. Include synonyms and closely related terms for each keyword.\n\
3. Include spacing variants of compound words.\n\
4. Reply with the keywords only, separated by commas.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    /// Question with family synonyms appended, when any family matched.
    pub expanded_question: Option<String>,
    pub keywords: Vec<String>,
}

pub trait QueryExpander {
    /// Never fails; an expander that cannot help returns fewer keywords.
    fn expand(&self, question: &str) -> Expansion;
}

/// Splits on non-word characters, drops stop words and single characters.
#[derive(Debug, Clone)]
pub struct BasicKeywordExtractor {
    stop_words: HashSet<String>,
    cap: usize,
}

impl BasicKeywordExtractor {
    pub fn new(config: &ExpansionConfig) -> Self {
        Self {
            stop_words: config.stop_words.iter().cloned().collect(),
            cap: config.basic_keyword_cap,
        }
    }

    pub fn extract(&self, question: &str) -> Vec<String> {
        question
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|word| word.chars().count() > 1)
            .filter(|word| !self.stop_words.contains(*word))
            .map(str::to_string)
            .take(self.cap)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RuleBasedExpander {
    families: Vec<KeywordFamily>,
    basic: BasicKeywordExtractor,
    max_keywords: usize,
}

impl RuleBasedExpander {
    pub fn new(config: &ExpansionConfig) -> Self {
        Self {
            families: config.families.clone(),
            basic: BasicKeywordExtractor::new(config),
            max_keywords: MAX_KEYWORDS,
        }
    }
}

impl QueryExpander for RuleBasedExpander {
    fn expand(&self, question: &str) -> Expansion {
        let normalized = question.split_whitespace().collect::<Vec<_>>().join(" ");
        let matched = self
            .families
            .iter()
            .filter(|family| normalized.contains(family.root.as_str()))
            .collect::<Vec<_>>();

        let synonyms = matched
            .iter()
            .flat_map(|family| family.synonyms.iter().cloned())
            .collect::<Vec<_>>();

        let expanded_question = if synonyms.is_empty() {
            None
        } else {
            Some(format!("{normalized} {}", synonyms.join(" ")))
        };

        let keywords = dedup_capped(
            synonyms.into_iter().chain(self.basic.extract(&normalized)),
            self.max_keywords,
        );

        debug!(families = matched.len(), keywords = keywords.len(), "rule-based expansion");
        Expansion {
            expanded_question,
            keywords,
        }
    }
}

pub struct LlmKeywordExpander<L> {
    llm: L,
    basic: BasicKeywordExtractor,
    max_keywords: usize,
    temperature: f32,
}

impl<L: LanguageModel> LlmKeywordExpander<L> {
    pub fn new(llm: L, config: &ExpansionConfig) -> Self {
        Self {
            llm,
            basic: BasicKeywordExtractor::new(config),
            max_keywords: MAX_KEYWORDS,
            temperature: 0.1,
        }
    }

    /// Model-suggested keywords; empty when the call fails or yields nothing usable.
    pub fn request_keywords(&self, question: &str) -> Vec<String> {
        let request = CompletionRequest {
            system_prompt: LLM_KEYWORD_PROMPT,
            context: "",
            question,
            temperature: self.temperature,
        };

        match self.llm.complete(&request) {
            Ok(reply) => parse_keyword_reply(&reply, self.max_keywords),
            Err(error) => {
                warn!(model = self.llm.name(), %error, "keyword expansion failed");
                Vec::new()
            }
        }
    }
}

impl<L: LanguageModel> QueryExpander for LlmKeywordExpander<L> {
    fn expand(&self, question: &str) -> Expansion {
        let mut keywords = self.request_keywords(question);
        if keywords.is_empty() {
            keywords = self.basic.extract(question);
            debug!(keywords = keywords.len(), "fell back to basic keyword extraction");
        }

        Expansion {
            expanded_question: None,
            keywords,
        }
    }
}

fn parse_keyword_reply(reply: &str, cap: usize) -> Vec<String> {
    let terms = reply
        .split([',', '\n'])
        .map(|term| {
            term.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim_matches(['"', '\'', '`', '.'])
                .trim()
                .to_string()
        })
        .filter(|term| !term.is_empty());
    dedup_capped(terms, cap)
}

fn dedup_capped(terms: impl IntoIterator<Item = String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .filter(|term| seen.insert(term.clone()))
        .take(cap)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    struct ScriptedModel {
        reply: Option<&'static str>,
    }

    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        fn complete(&self, _request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
            self.reply.map(str::to_string).ok_or_else(|| ProviderError::BackendResponse {
                provider: "scripted".to_string(),
                details: "503".to_string(),
            })
        }
    }

    #[test]
    fn basic_extraction_drops_stop_words_and_single_chars() {
        let extractor = BasicKeywordExtractor::new(&ExpansionConfig::default());
        let keywords = extractor.extract("늘봄학교 의 운영시간 은 a 언제 인가요?");
        assert_eq!(keywords, vec!["늘봄학교", "운영시간", "언제", "인가요"]);
    }

    #[test]
    fn basic_extraction_is_capped_at_five() {
        let extractor = BasicKeywordExtractor::new(&ExpansionConfig::default());
        let keywords = extractor.extract("one two three four five six seven");
        assert_eq!(keywords.len(), 5);
    }

    #[test]
    fn rule_based_expands_matching_family() {
        let expander = RuleBasedExpander::new(&ExpansionConfig::default());
        let expansion = expander.expand("담임수당을  받을 수 있나요?");

        let expanded = expansion.expanded_question.expect("family matched");
        assert!(expanded.starts_with("담임수당을 받을 수 있나요?"));
        assert!(expanded.contains("담임교사 수당"));
        assert!(expansion.keywords.len() <= MAX_KEYWORDS);
        assert_eq!(expansion.keywords[0], "담임수당");
        assert!(expansion.keywords.contains(&"담임 수당".to_string()));
    }

    #[test]
    fn rule_based_without_match_uses_basic_tokens() {
        let expander = RuleBasedExpander::new(&ExpansionConfig::default());
        let expansion = expander.expand("운영시간이 언제인가요?");
        assert_eq!(expansion.expanded_question, None);
        assert_eq!(expansion.keywords, vec!["운영시간이", "언제인가요"]);
    }

    #[test]
    fn rule_based_is_deterministic() {
        let expander = RuleBasedExpander::new(&ExpansionConfig::default());
        assert_eq!(expander.expand("부장수당 불가"), expander.expand("부장수당 불가"));
    }

    #[test]
    fn llm_reply_is_split_trimmed_and_capped() {
        let expander = LlmKeywordExpander::new(
            ScriptedModel {
                reply: Some("담임 수당, 담임교사 수당,\n- 수당, 급여, 급여, 보수, 수령, 지급, 월급, 상여"),
            },
            &ExpansionConfig::default(),
        );
        let keywords = expander.expand("담임수당").keywords;
        assert_eq!(keywords.len(), MAX_KEYWORDS);
        assert_eq!(keywords[2], "수당");
        assert_eq!(keywords.iter().filter(|k| *k == "급여").count(), 1);
    }

    #[test]
    fn llm_failure_returns_empty_and_expander_falls_back() {
        let expander =
            LlmKeywordExpander::new(ScriptedModel { reply: None }, &ExpansionConfig::default());
        assert!(expander.request_keywords("운영시간이 언제인가요?").is_empty());
        assert_eq!(
            expander.expand("운영시간이 언제인가요?").keywords,
            vec!["운영시간이", "언제인가요"]
        );
    }

    #[test]
    fn blank_llm_reply_falls_back() {
        let expander = LlmKeywordExpander::new(
            ScriptedModel { reply: Some(" , \n ") },
            &ExpansionConfig::default(),
        );
        assert_eq!(expander.expand("운영 시간").keywords, vec!["운영", "시간"]);
    }
}
