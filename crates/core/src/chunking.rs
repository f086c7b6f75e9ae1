use crate::config::ChunkingConfig;
use crate::error::ConfigError;
use crate::models::{Chunk, Document};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use tracing::info;

/// Splits documents into overlapping passages, trying separators in order
/// and falling back to finer ones only when a piece does not fit.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_chars: usize,
    separators: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChunkStats {
    pub raw_count: usize,
    pub count: usize,
    pub min_chars: usize,
    pub max_chars: usize,
    pub avg_chars: usize,
}

impl ChunkStats {
    pub fn dropped(&self) -> usize {
        self.raw_count.saturating_sub(self.count)
    }

    fn from_chunks(raw_count: usize, chunks: &[Chunk]) -> Self {
        let lengths = chunks
            .iter()
            .map(|chunk| char_len(&chunk.content))
            .collect::<Vec<_>>();

        if lengths.is_empty() {
            return Self {
                raw_count,
                ..Self::default()
            };
        }

        Self {
            raw_count,
            count: lengths.len(),
            min_chars: lengths.iter().copied().min().unwrap_or_default(),
            max_chars: lengths.iter().copied().max().unwrap_or_default(),
            avg_chars: lengths.iter().sum::<usize>() / lengths.len(),
        }
    }
}

impl RecursiveChunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        if config.chunk_size == 0 {
            return Err(ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            min_chunk_chars: config.min_chunk_chars,
            separators: config.separators.clone(),
        })
    }

    /// Raw split of one text, before the minimum-length filter.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Chunks every document, drops degenerate chunks and reports statistics.
    pub fn chunk_documents(&self, documents: &[Document]) -> (Vec<Chunk>, ChunkStats) {
        let mut chunks = Vec::new();
        let mut raw_count = 0usize;
        let mut cursor = 0u64;

        for document in documents {
            for piece in self.split_text(&document.content) {
                raw_count += 1;
                if char_len(piece.trim()) < self.min_chunk_chars {
                    continue;
                }

                chunks.push(Chunk {
                    chunk_id: make_chunk_id(
                        &document.metadata.source,
                        document.metadata.page,
                        cursor,
                        &piece,
                    ),
                    chunk_index: cursor,
                    content: piece,
                    metadata: document.metadata.clone(),
                });
                cursor = cursor.saturating_add(1);
            }
        }

        let stats = ChunkStats::from_chunks(raw_count, &chunks);
        info!(
            documents = documents.len(),
            raw_chunks = stats.raw_count,
            chunks = stats.count,
            dropped = stats.dropped(),
            min_chars = stats.min_chars,
            max_chars = stats.max_chars,
            avg_chars = stats.avg_chars,
            "chunked documents"
        );

        (chunks, stats)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|separator| separator.is_empty() || text.contains(separator.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut output = Vec::new();
        let mut fitting = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                output.extend(self.merge(&fitting));
                fitting.clear();
            }

            if finer.is_empty() {
                // Indivisible at every level; emitted whole.
                let whole = piece.trim();
                if !whole.is_empty() {
                    output.push(whole.to_string());
                }
            } else {
                output.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            output.extend(self.merge(&fitting));
        }

        output
    }

    /// Greedily packs pieces into chunks of at most `chunk_size` chars,
    /// carrying trailing pieces worth at most `chunk_overlap` chars into the
    /// next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let length = char_len(piece);

            if total + length > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);

                while total > self.chunk_overlap
                    || (total + length > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += length;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined = window.iter().copied().collect::<String>();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Splits on `separator`, keeping it attached to the preceding piece so the
/// pieces concatenate back to the input. An empty separator splits into chars.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, c)| &text[start..start + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    while let Some(found) = text[start..].find(separator) {
        let end = start + found + separator.len();
        pieces.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn make_chunk_id(source: &str, page: Option<u32>, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.unwrap_or_default().to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunker(size: usize, overlap: usize, min: usize) -> RecursiveChunker {
        RecursiveChunker::new(&ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            min_chunk_chars: min,
            ..ChunkingConfig::default()
        })
        .expect("valid chunking config")
    }

    #[test]
    fn korean_sentence_endings_win_over_bare_periods() {
        let text = "수당은 3.5만원이며 매월 지급한다. 신청서는 교무실에 제출한다.";
        let pieces = chunker(30, 14, 0).split_text(text);
        assert_eq!(
            pieces,
            vec!["수당은 3.5만원이며 매월 지급한다.", "신청서는 교무실에 제출한다."]
        );
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..ChunkingConfig::default()
        };
        assert!(RecursiveChunker::new(&config).is_err());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let pieces = chunker(1000, 100, 0).split_text("One paragraph.\n\nAnother one.");
        assert_eq!(pieces, vec!["One paragraph.\n\nAnother one.".to_string()]);
    }

    #[test]
    fn paragraphs_are_preferred_split_points() {
        let first = "a".repeat(30);
        let second = "b".repeat(30);
        let text = format!("{first}\n\n{second}");
        let pieces = chunker(40, 0, 0).split_text(&text);
        assert_eq!(pieces, vec![first, second]);
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let pieces = chunker(20, 8, 0).split_text(text);
        assert!(pieces.len() > 1);
        for pair in pieces.windows(2) {
            let last_word = pair[0].split_whitespace().last().unwrap_or_default();
            assert!(pair[1].contains(last_word), "{pair:?} lost the overlap");
        }
    }

    #[test]
    fn indivisible_token_is_emitted_whole() {
        let config = ChunkingConfig {
            chunk_size: 5,
            chunk_overlap: 0,
            min_chunk_chars: 0,
            separators: vec![" ".to_string()],
        };
        let pieces = RecursiveChunker::new(&config)
            .expect("valid config")
            .split_text("tiny supercalifragilistic");
        assert_eq!(pieces, vec!["tiny".to_string(), "supercalifragilistic".to_string()]);
    }

    #[test]
    fn short_chunks_are_dropped_and_metadata_inherited() {
        let long = "운영시간은 학기 중 오전 7시부터 오후 8시까지이며 방학 중에는 오전 9시부터 오후 6시까지 운영합니다.";
        let documents = vec![
            Document::new(long, "A.pdf", Some(2)),
            Document::new("짧은 글", "B.pdf", Some(1)),
        ];
        let (chunks, stats) = chunker(1000, 100, 50).chunk_documents(&documents);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.source, "A.pdf");
        assert_eq!(chunks[0].metadata.page, Some(2));
        assert_eq!(stats.raw_count, 2);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.min_chars, stats.max_chars);
    }

    #[test]
    fn stats_are_zero_when_everything_is_filtered() {
        let documents = vec![Document::new("tiny", "A.pdf", None)];
        let (chunks, stats) = chunker(1000, 100, 50).chunk_documents(&documents);
        assert!(chunks.is_empty());
        assert_eq!(stats.count, 0);
        assert_eq!(stats.raw_count, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn chunks_respect_size_and_cover_every_word(
            words in proptest::collection::vec("[a-z가-힣]{1,8}", 1..200),
            size in 20usize..200,
            overlap_ratio in 0usize..50,
        ) {
            let overlap = size * overlap_ratio / 100;
            let text = words.join(" ");
            let pieces = chunker(size, overlap, 0).split_text(&text);

            for piece in &pieces {
                prop_assert!(char_len(piece) <= size, "{} > {}", char_len(piece), size);
            }
            for word in &words {
                prop_assert!(pieces.iter().any(|piece| piece.contains(word.as_str())));
            }
        }
    }
}
