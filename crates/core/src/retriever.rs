use crate::config::RetrievalConfig;
use crate::error::SearchError;
use crate::expansion::QueryExpander;
use crate::models::{Chunk, DedupKey, Retrieval, RetrievalStrategy, ScoredResult};
use crate::traits::VectorSearch;
use std::collections::HashMap;
use tracing::{debug, info};

/// Issues the question, the expanded question and every keyword against the
/// index, merges and thresholds the hits, and falls back to keyword overlap
/// when nothing clears the threshold. Holds no state between questions.
pub struct MultiStrategyRetriever<'a, S: ?Sized, Q: ?Sized> {
    index: &'a S,
    expander: &'a Q,
    config: &'a RetrievalConfig,
}

impl<'a, S, Q> MultiStrategyRetriever<'a, S, Q>
where
    S: VectorSearch + ?Sized,
    Q: QueryExpander + ?Sized,
{
    pub fn new(index: &'a S, expander: &'a Q, config: &'a RetrievalConfig) -> Self {
        Self {
            index,
            expander,
            config,
        }
    }

    pub fn retrieve(&self, question: &str) -> Result<Retrieval, SearchError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SearchError::EmptyQuestion);
        }

        let expansion = self.expander.expand(question);
        let keywords = expansion
            .keywords
            .into_iter()
            .take(self.config.max_keywords)
            .collect::<Vec<_>>();

        let mut raw = self.index.search(question, self.config.direct_k)?;
        if let Some(expanded) = expansion
            .expanded_question
            .as_deref()
            .filter(|expanded| *expanded != question)
        {
            raw.extend(self.index.search(expanded, self.config.direct_k)?);
        }
        for keyword in &keywords {
            raw.extend(self.index.search(keyword, self.config.keyword_k)?);
        }

        let raw_count = raw.len();
        let ranked = rank_and_cap(merge_dedup(raw), self.config.merge_cap);
        let relevant = threshold_filter(ranked, self.config.similarity_threshold);
        debug!(
            keywords = keywords.len(),
            raw = raw_count,
            relevant = relevant.len(),
            threshold = self.config.similarity_threshold,
            "vector retrieval"
        );

        if !relevant.is_empty() {
            return Ok(Retrieval {
                question: question.to_string(),
                keywords,
                strategy: Some(RetrievalStrategy::Vector),
                passages: relevant,
            });
        }

        if self.config.lexical_fallback {
            let lexical = lexical_search(
                self.index.corpus(),
                question,
                &keywords,
                self.config.question_word_bonus,
                self.config.fallback_cap,
            );
            if !lexical.is_empty() {
                info!(passages = lexical.len(), "vector search empty; using keyword matches");
                return Ok(Retrieval {
                    question: question.to_string(),
                    keywords,
                    strategy: Some(RetrievalStrategy::LexicalFallback),
                    passages: lexical,
                });
            }
        }

        info!("no relevant passages found");
        Ok(Retrieval {
            question: question.to_string(),
            keywords,
            strategy: None,
            passages: Vec::new(),
        })
    }
}

/// Keeps one result per `(source, content_hash)`, the one with the lowest
/// distance; on equal distance the first seen wins. First-seen order is kept.
pub fn merge_dedup(results: Vec<ScoredResult>) -> Vec<ScoredResult> {
    let mut positions: HashMap<DedupKey, usize> = HashMap::new();
    let mut merged: Vec<ScoredResult> = Vec::new();

    for result in results {
        match positions.get(&result.chunk.dedup_key()) {
            Some(&position) => {
                if result.distance < merged[position].distance {
                    merged[position] = result;
                }
            }
            None => {
                positions.insert(result.chunk.dedup_key(), merged.len());
                merged.push(result);
            }
        }
    }

    merged
}

/// Stable ascending sort by distance, truncated to `cap`.
pub fn rank_and_cap(mut results: Vec<ScoredResult>, cap: usize) -> Vec<ScoredResult> {
    results.sort_by(|left, right| left.distance.total_cmp(&right.distance));
    results.truncate(cap);
    results
}

pub fn threshold_filter(results: Vec<ScoredResult>, threshold: f32) -> Vec<ScoredResult> {
    results
        .into_iter()
        .filter(|result| result.similarity() >= threshold)
        .collect()
}

/// Keyword-overlap score of one chunk: occurrences of each keyword weighted by
/// its length, plus `question_bonus` when any raw question word appears.
pub fn lexical_score(content: &str, question: &str, keywords: &[String], question_bonus: f32) -> f32 {
    let lowered = content.to_lowercase();

    let mut score = keywords
        .iter()
        .map(|keyword| keyword.to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .map(|keyword| (lowered.matches(keyword.as_str()).count() * keyword.chars().count()) as f32)
        .sum::<f32>();

    if question
        .to_lowercase()
        .split_whitespace()
        .any(|word| lowered.contains(word))
    {
        score += question_bonus;
    }

    score
}

/// Maps a lexical score onto the distance scale: `1 - min(0.95, score / 100)`.
pub fn lexical_distance(score: f32) -> f32 {
    1.0 - (score / 100.0).min(0.95)
}

pub fn lexical_search(
    corpus: Vec<&Chunk>,
    question: &str,
    keywords: &[String],
    question_bonus: f32,
    cap: usize,
) -> Vec<ScoredResult> {
    let scored = corpus
        .into_iter()
        .filter_map(|chunk| {
            let score = lexical_score(&chunk.content, question, keywords, question_bonus);
            (score > 0.0).then(|| ScoredResult {
                chunk: chunk.clone(),
                distance: lexical_distance(score),
            })
        })
        .collect::<Vec<_>>();

    rank_and_cap(merge_dedup(scored), cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::Expansion;
    use crate::models::DocumentMetadata;
    use crate::IndexError;
    use proptest::prelude::*;
    use std::cell::RefCell;

    fn chunk(source: &str, content: &str) -> Chunk {
        Chunk {
            chunk_id: format!("{source}:{content}"),
            chunk_index: 0,
            content: content.to_string(),
            metadata: DocumentMetadata {
                source: source.to_string(),
                page: Some(1),
            },
        }
    }

    fn scored(source: &str, content: &str, distance: f32) -> ScoredResult {
        ScoredResult {
            chunk: chunk(source, content),
            distance,
        }
    }

    /// Returns canned hits per query text and records every query issued.
    struct FakeIndex {
        hits: HashMap<String, Vec<ScoredResult>>,
        corpus: Vec<Chunk>,
        queries: RefCell<Vec<(String, usize)>>,
    }

    impl FakeIndex {
        fn new(corpus: Vec<Chunk>) -> Self {
            Self {
                hits: HashMap::new(),
                corpus,
                queries: RefCell::new(Vec::new()),
            }
        }

        fn with_hits(mut self, query: &str, hits: Vec<ScoredResult>) -> Self {
            self.hits.insert(query.to_string(), hits);
            self
        }
    }

    impl VectorSearch for FakeIndex {
        fn search(&self, text: &str, k: usize) -> Result<Vec<ScoredResult>, IndexError> {
            self.queries.borrow_mut().push((text.to_string(), k));
            let mut hits = self.hits.get(text).cloned().unwrap_or_default();
            hits.truncate(k);
            Ok(hits)
        }

        fn corpus(&self) -> Vec<&Chunk> {
            self.corpus.iter().collect()
        }
    }

    struct FixedExpander(Expansion);

    impl QueryExpander for FixedExpander {
        fn expand(&self, _question: &str) -> Expansion {
            self.0.clone()
        }
    }

    fn keywords(terms: &[&str]) -> FixedExpander {
        FixedExpander(Expansion {
            expanded_question: None,
            keywords: terms.iter().map(|t| t.to_string()).collect(),
        })
    }

    #[test]
    fn empty_question_is_rejected() {
        let index = FakeIndex::new(Vec::new());
        let config = RetrievalConfig::default();
        let expander = keywords(&[]);
        let retriever = MultiStrategyRetriever::new(&index, &expander, &config);
        assert!(matches!(retriever.retrieve("   "), Err(SearchError::EmptyQuestion)));
    }

    #[test]
    fn issues_direct_expanded_and_keyword_searches() {
        let index = FakeIndex::new(Vec::new());
        let config = RetrievalConfig::default();
        let expander = FixedExpander(Expansion {
            expanded_question: Some("수당 급여 보수".to_string()),
            keywords: vec!["수당".to_string(), "급여".to_string()],
        });
        MultiStrategyRetriever::new(&index, &expander, &config)
            .retrieve("수당")
            .expect("retrieval succeeds");

        let queries = index.queries.borrow().clone();
        assert_eq!(
            queries,
            vec![
                ("수당".to_string(), 5),
                ("수당 급여 보수".to_string(), 5),
                ("수당".to_string(), 3),
                ("급여".to_string(), 3),
            ]
        );
    }

    #[test]
    fn works_over_trait_objects() {
        let index = FakeIndex::new(Vec::new())
            .with_hits("운영시간", vec![scored("A.pdf", "운영시간 안내", 0.2)]);
        let fixed = keywords(&["시간"]);
        let search: &dyn VectorSearch = &index;
        let expander: &dyn QueryExpander = &fixed;
        let config = RetrievalConfig::default();

        let retrieval = MultiStrategyRetriever::new(search, expander, &config)
            .retrieve("운영시간")
            .expect("retrieval succeeds");
        assert_eq!(retrieval.strategy, Some(RetrievalStrategy::Vector));
        assert_eq!(retrieval.passages.len(), 1);
        assert_eq!(retrieval.keywords, vec!["시간".to_string()]);
    }

    #[test]
    fn keyword_searches_are_capped_at_eight() {
        let index = FakeIndex::new(Vec::new());
        let config = RetrievalConfig::default();
        let terms = (0..12).map(|i| format!("kw{i}")).collect::<Vec<_>>();
        let expander = FixedExpander(Expansion {
            expanded_question: None,
            keywords: terms,
        });
        let retrieval = MultiStrategyRetriever::new(&index, &expander, &config)
            .retrieve("question")
            .expect("retrieval succeeds");
        assert_eq!(retrieval.keywords.len(), 8);
        assert_eq!(index.queries.borrow().len(), 9);
    }

    #[test]
    fn merged_hits_are_deduplicated_ranked_and_thresholded() {
        let index = FakeIndex::new(Vec::new())
            .with_hits(
                "운영시간",
                vec![scored("A.pdf", "운영시간 안내", 0.30), scored("B.pdf", "신청 안내", 0.70)],
            )
            .with_hits(
                "시간",
                vec![scored("A.pdf", "운영시간 안내", 0.10), scored("C.pdf", "간식 안내", 0.40)],
            );
        let config = RetrievalConfig::default();
        let expander = keywords(&["시간"]);
        let retrieval = MultiStrategyRetriever::new(&index, &expander, &config)
            .retrieve("운영시간")
            .expect("retrieval succeeds");

        assert_eq!(retrieval.strategy, Some(RetrievalStrategy::Vector));
        let sources = retrieval
            .passages
            .iter()
            .map(|p| (p.chunk.source().to_string(), p.distance))
            .collect::<Vec<_>>();
        assert_eq!(
            sources,
            vec![("A.pdf".to_string(), 0.10), ("C.pdf".to_string(), 0.40)]
        );
    }

    #[test]
    fn merged_results_are_capped_before_threshold() {
        let hits = (0..12)
            .map(|i| scored("A.pdf", &format!("passage {i}"), 0.01 * i as f32))
            .collect::<Vec<_>>();
        let index = FakeIndex::new(Vec::new()).with_hits("q", hits);
        let config = RetrievalConfig {
            direct_k: 12,
            ..RetrievalConfig::default()
        };
        let expander = keywords(&[]);
        let retrieval = MultiStrategyRetriever::new(&index, &expander, &config)
            .retrieve("q")
            .expect("retrieval succeeds");
        assert_eq!(retrieval.passages.len(), 8);
    }

    #[test]
    fn lexical_fallback_runs_only_when_vector_results_are_empty() {
        let corpus = vec![
            chunk("A.pdf", "담임수당은 월 20만원이며 담임교사에게 지급한다."),
            chunk("B.pdf", "급식은 영양사가 관리한다."),
        ];
        let index = FakeIndex::new(corpus)
            .with_hits("담임수당 금액", vec![scored("B.pdf", "급식은 영양사가 관리한다.", 0.9)]);
        let config = RetrievalConfig::default();
        let expander = keywords(&["담임수당"]);
        let retrieval = MultiStrategyRetriever::new(&index, &expander, &config)
            .retrieve("담임수당 금액")
            .expect("retrieval succeeds");

        assert_eq!(retrieval.strategy, Some(RetrievalStrategy::LexicalFallback));
        assert_eq!(retrieval.passages.len(), 1);
        assert_eq!(retrieval.passages[0].chunk.source(), "A.pdf");
        // 4 chars * 1 occurrence + question bonus 10
        assert!((retrieval.passages[0].distance - 0.86).abs() < 1e-6);
    }

    #[test]
    fn lexical_fallback_can_be_disabled() {
        let corpus = vec![chunk("A.pdf", "담임수당은 월 20만원이다.")];
        let index = FakeIndex::new(corpus);
        let config = RetrievalConfig {
            lexical_fallback: false,
            ..RetrievalConfig::default()
        };
        let expander = keywords(&["담임수당"]);
        let retrieval = MultiStrategyRetriever::new(&index, &expander, &config)
            .retrieve("담임수당")
            .expect("retrieval succeeds");
        assert!(retrieval.is_empty());
        assert_eq!(retrieval.strategy, None);
    }

    #[test]
    fn unrelated_question_finds_nothing() {
        let corpus = vec![chunk("A.pdf", "운영시간은 오전 7시부터 오후 8시까지입니다.")];
        let index = FakeIndex::new(corpus);
        let config = RetrievalConfig::default();
        let expander = keywords(&["quantum", "chromodynamics"]);
        let retrieval = MultiStrategyRetriever::new(&index, &expander, &config)
            .retrieve("quantum chromodynamics")
            .expect("retrieval succeeds");
        assert!(retrieval.is_empty());
    }

    #[test]
    fn lexical_fallback_keeps_top_three() {
        let corpus = (1..=5)
            .map(|i| chunk("A.pdf", &"수당 ".repeat(i)))
            .collect::<Vec<_>>();
        let results = lexical_search(corpus.iter().collect(), "x", &["수당".to_string()], 10.0, 3);
        assert_eq!(results.len(), 3);
        assert!(results[0].chunk.content.starts_with(&"수당 ".repeat(5).trim_end().to_string()));
        assert!(results.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
    }

    #[test]
    fn lexical_distance_is_floored() {
        assert!((lexical_distance(500.0) - 0.05).abs() < 1e-6);
        assert!((lexical_distance(10.0) - 0.9).abs() < 1e-6);
    }

    fn arb_results() -> impl Strategy<Value = Vec<ScoredResult>> {
        proptest::collection::vec(
            (
                prop_oneof![Just("A.pdf"), Just("B.pdf")],
                prop_oneof![Just("alpha"), Just("beta"), Just("gamma")],
                0.0f32..=1.0,
            )
                .prop_map(|(source, content, distance)| scored(source, content, distance)),
            0..40,
        )
    }

    proptest! {
        #[test]
        fn dedup_keeps_unique_keys_with_minimal_distance(results in arb_results()) {
            let merged = merge_dedup(results.clone());
            let mut keys = std::collections::HashSet::new();
            for kept in &merged {
                prop_assert!(keys.insert(kept.chunk.dedup_key()));
                for raw in results.iter().filter(|r| r.chunk.dedup_key() == kept.chunk.dedup_key()) {
                    prop_assert!(kept.distance <= raw.distance);
                }
            }
        }

        #[test]
        fn raising_threshold_never_adds_results(
            results in arb_results(),
            low in 0.0f32..=1.0,
            delta in 0.0f32..=1.0,
        ) {
            let high = (low + delta).min(1.0);
            let at_low = threshold_filter(results.clone(), low).len();
            let at_high = threshold_filter(results, high).len();
            prop_assert!(at_high <= at_low);
        }
    }
}
