pub mod chunking;
pub mod cleaner;
pub mod composer;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod expansion;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod retriever;
pub mod session;
pub mod traits;

pub use chunking::{ChunkStats, RecursiveChunker};
pub use cleaner::TextCleaner;
pub use composer::{AnswerComposer, RETRY_MESSAGE};
pub use config::{
    AnswerConfig, ChunkingConfig, CleanerConfig, ExpansionConfig, ExpansionStrategy, IndexConfig,
    KeywordFamily, PipelineConfig, RetrievalConfig,
};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ConfigError, IndexError, IngestError, ProviderError, SearchError};
pub use expansion::{Expansion, LlmKeywordExpander, QueryExpander, RuleBasedExpander};
pub use extractor::{DocumentLoader, LoadReport, LopdfExtractor, PageText, PdfExtractor};
pub use index::{IndexManifest, IngestionLock, VectorIndex};
pub use ingest::{discover_pdf_files, read_uploads, IngestMode, IngestionReport, SkippedPdf};
pub use llm::{CompletionRequest, LanguageModel};
pub use models::{
    AnswerKind, Chunk, Document, DocumentMetadata, Retrieval, RetrievalResponse,
    RetrievalStrategy, ScoredResult, SourceRef, UploadedFile,
};
pub use pipeline::{RagPipeline, INDEX_UNAVAILABLE_MESSAGE};
pub use providers::{GeminiChatModel, GeminiEmbedder, OpenAiChatModel, OpenAiEmbedder};
pub use retriever::MultiStrategyRetriever;
pub use session::{ChatSession, ChatTurn};
pub use traits::VectorSearch;
