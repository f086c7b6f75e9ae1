use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::models::{Chunk, ScoredResult};
use crate::IndexError;

/// What the retriever needs from an index: nearest-neighbour search plus
/// access to the whole corpus for lexical fallback.
pub trait VectorSearch {
    fn search(&self, text: &str, k: usize) -> Result<Vec<ScoredResult>, IndexError>;

    fn corpus(&self) -> Vec<&Chunk>;
}

impl<E: Embedder> VectorSearch for VectorIndex<E> {
    fn search(&self, text: &str, k: usize) -> Result<Vec<ScoredResult>, IndexError> {
        self.query(text, k)
    }

    fn corpus(&self) -> Vec<&Chunk> {
        self.chunks().collect()
    }
}
