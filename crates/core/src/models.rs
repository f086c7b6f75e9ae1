use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DocumentMetadata {
    pub source: String,
    pub page: Option<u32>,
}

impl DocumentMetadata {
    /// Human readable citation label, e.g. `A.pdf, page 3`.
    pub fn label(&self) -> String {
        match self.page {
            Some(page) => format!("{}, page {page}", self.source),
            None => self.source.clone(),
        }
    }
}

/// Text of one page (or one whole file) with its source attribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                source: source.into(),
                page,
            },
        }
    }
}

/// A bounded slice of a [`Document`]; the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: u64,
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Chunk {
    pub fn source(&self) -> &str {
        &self.metadata.source
    }

    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            source: self.metadata.source.clone(),
            content_hash: self.content_hash(),
        }
    }
}

/// Identity used to recognize the same chunk returned by several strategies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub source: String,
    pub content_hash: String,
}

/// A chunk paired with its clamped cosine distance to a query.
///
/// Distances live in `[0, 1]`, lower is closer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredResult {
    pub chunk: Chunk,
    pub distance: f32,
}

impl ScoredResult {
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RetrievalStrategy {
    /// Passages passed the similarity threshold of the vector searches.
    Vector,
    /// Vector search came back empty and keyword overlap produced the passages.
    LexicalFallback,
}

/// Outcome of one question.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub question: String,
    pub keywords: Vec<String>,
    pub strategy: Option<RetrievalStrategy>,
    pub passages: Vec<ScoredResult>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnswerKind {
    Answered,
    NoRelevantContent,
    IndexUnavailable,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub source: String,
    pub page: Option<u32>,
    pub content: String,
}

impl From<&Chunk> for SourceRef {
    fn from(chunk: &Chunk) -> Self {
        Self {
            source: chunk.metadata.source.clone(),
            page: chunk.metadata.page,
            content: chunk.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub kind: AnswerKind,
    pub strategy: Option<RetrievalStrategy>,
    pub error: Option<String>,
}

impl RetrievalResponse {
    pub fn without_sources(answer: impl Into<String>, kind: AnswerKind) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            kind,
            strategy: None,
            error: None,
        }
    }
}

/// An already-decoded upload: file name plus raw PDF bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, content: &str) -> Chunk {
        Chunk {
            chunk_id: "id".to_string(),
            chunk_index: 0,
            content: content.to_string(),
            metadata: DocumentMetadata {
                source: source.to_string(),
                page: Some(1),
            },
        }
    }

    #[test]
    fn dedup_key_ignores_chunk_id_and_page() {
        let mut first = chunk("A.pdf", "same text");
        let mut second = chunk("A.pdf", "same text");
        first.chunk_id = "x".to_string();
        second.chunk_id = "y".to_string();
        second.metadata.page = Some(4);
        assert_eq!(first.dedup_key(), second.dedup_key());
        assert_ne!(first.dedup_key(), chunk("B.pdf", "same text").dedup_key());
    }

    #[test]
    fn label_includes_page_when_known() {
        let meta = DocumentMetadata {
            source: "A.pdf".to_string(),
            page: Some(2),
        };
        assert_eq!(meta.label(), "A.pdf, page 2");
    }
}
