//! One parameterized pipeline over the whole flow.
//!
//! Ingestion: uploads -> [`DocumentLoader`] -> [`TextCleaner`] ->
//! [`RecursiveChunker`] -> [`VectorIndex`]. Questions: [`QueryExpander`] ->
//! [`MultiStrategyRetriever`] -> [`AnswerComposer`]. The pipeline keeps no
//! per-question state; chat history lives in the caller's [`ChatSession`].

use crate::chunking::RecursiveChunker;
use crate::cleaner::TextCleaner;
use crate::composer::{AnswerComposer, RETRY_MESSAGE};
use crate::config::{ExpansionStrategy, PipelineConfig};
use crate::embeddings::Embedder;
use crate::error::{ConfigError, IndexError, IngestError, SearchError};
use crate::expansion::{LlmKeywordExpander, QueryExpander, RuleBasedExpander};
use crate::extractor::{DocumentLoader, PdfExtractor};
use crate::index::{IngestionLock, VectorIndex};
use crate::ingest::{IngestMode, IngestionReport, SkippedPdf};
use crate::llm::LanguageModel;
use crate::models::{AnswerKind, Chunk, Document, Retrieval, RetrievalResponse, UploadedFile};
use crate::retriever::MultiStrategyRetriever;
use crate::session::ChatSession;
use std::collections::HashSet;
use tracing::{info, warn};

pub const INDEX_UNAVAILABLE_MESSAGE: &str =
    "No document index is available yet. Please ingest documents first.";
pub const EMPTY_QUESTION_MESSAGE: &str = "Please enter a question.";

pub struct RagPipeline<E, L> {
    config: PipelineConfig,
    embedder: E,
    llm: L,
    loader: DocumentLoader,
    cleaner: TextCleaner,
    chunker: RecursiveChunker,
}

impl<E, L> RagPipeline<E, L>
where
    E: Embedder + Clone,
    L: LanguageModel,
{
    /// Validates `config` up front; an invalid configuration is the only
    /// construction failure.
    pub fn new(config: PipelineConfig, embedder: E, llm: L) -> Result<Self, ConfigError> {
        config.validate()?;
        let cleaner =
            TextCleaner::new(&config.cleaner).map_err(|error| ConfigError(error.to_string()))?;
        let chunker = RecursiveChunker::new(&config.chunking)?;

        Ok(Self {
            config,
            embedder,
            llm,
            loader: DocumentLoader::default(),
            cleaner,
            chunker,
        })
    }

    pub fn with_extractor(mut self, extractor: impl PdfExtractor + 'static) -> Self {
        self.loader = DocumentLoader::new(extractor);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn open_index(&self) -> Result<VectorIndex<E>, IndexError> {
        Ok(VectorIndex::load(&self.config.index.path, self.embedder.clone())?
            .with_batch_size(self.config.index.embed_batch_size))
    }

    /// Loads, cleans, chunks and indexes `files` while holding the ingestion
    /// lock. Unreadable files and files that leave no chunks after filtering
    /// are skipped and reported; the call fails only when every file fails or
    /// nothing survives chunking.
    pub fn ingest(
        &self,
        files: &[UploadedFile],
        mode: IngestMode,
    ) -> Result<IngestionReport, IngestError> {
        if files.is_empty() {
            return Err(IngestError::InvalidArgument("no files to ingest".to_string()));
        }

        let index_path = &self.config.index.path;
        let _lock = IngestionLock::acquire(index_path)?;

        let mut loaded = self.loader.load(files);
        if loaded.documents.is_empty() {
            return Err(IngestError::AllFilesFailed(loaded.failures));
        }

        let cleaned = loaded
            .documents
            .iter()
            .map(|document| self.cleaner.clean_document(document))
            .filter(|document| !document.content.is_empty())
            .collect::<Vec<Document>>();
        let (chunks, stats) = self.chunker.chunk_documents(&cleaned);
        if chunks.is_empty() {
            return Err(IngestError::NoChunks);
        }

        let chunked = chunks.iter().map(Chunk::source).collect::<HashSet<_>>();
        let failed = loaded
            .failures
            .iter()
            .map(|skipped| skipped.name.clone())
            .collect::<HashSet<_>>();
        for file in files {
            if failed.contains(&file.name) || chunked.contains(file.name.as_str()) {
                continue;
            }
            warn!(file = %file.name, "no chunks left after filtering");
            loaded.failures.push(SkippedPdf {
                name: file.name.clone(),
                reason: "no chunks left after filtering".to_string(),
            });
        }

        let batch_size = self.config.index.embed_batch_size;
        let indexed_total = match mode {
            IngestMode::Rebuild => {
                VectorIndex::build(index_path, &chunks, self.embedder.clone(), batch_size)?.len()
            }
            IngestMode::Append => match self.open_index() {
                Ok(mut index) => index.add(&chunks)?,
                Err(IndexError::NotFound(_)) => {
                    info!(path = %index_path.display(), "no index to extend; building a new one");
                    VectorIndex::build(index_path, &chunks, self.embedder.clone(), batch_size)?
                        .len()
                }
                Err(error) => return Err(error.into()),
            },
        };

        info!(
            ?mode,
            documents = cleaned.len(),
            chunks = stats.count,
            skipped = loaded.failures.len(),
            indexed_total,
            "ingestion finished"
        );

        Ok(IngestionReport {
            documents: cleaned.len(),
            stats,
            skipped_files: loaded.failures,
            indexed_total,
        })
    }

    pub fn retrieve(&self, question: &str) -> Result<Retrieval, SearchError> {
        if question.trim().is_empty() {
            return Err(SearchError::EmptyQuestion);
        }

        let index = self.open_index()?;
        let expander: Box<dyn QueryExpander + '_> = match self.config.expansion.strategy {
            ExpansionStrategy::RuleBased => Box::new(RuleBasedExpander::new(&self.config.expansion)),
            ExpansionStrategy::LlmAssisted => {
                Box::new(LlmKeywordExpander::new(&self.llm, &self.config.expansion))
            }
        };

        MultiStrategyRetriever::new(&index, expander.as_ref(), &self.config.retrieval)
            .retrieve(question)
    }

    /// Answers without touching any session. Never fails; see [`AnswerKind`].
    pub fn answer(&self, question: &str) -> RetrievalResponse {
        match self.retrieve(question) {
            Ok(retrieval) => AnswerComposer::new(&self.llm, &self.config.answer).compose(&retrieval),
            Err(SearchError::EmptyQuestion) => {
                RetrievalResponse::without_sources(EMPTY_QUESTION_MESSAGE, AnswerKind::Failed)
            }
            Err(SearchError::Index(IndexError::NotFound(path))) => {
                info!(path = %path.display(), "question asked before any ingestion");
                RetrievalResponse::without_sources(
                    INDEX_UNAVAILABLE_MESSAGE,
                    AnswerKind::IndexUnavailable,
                )
            }
            Err(error) => {
                warn!(%error, "retrieval failed");
                RetrievalResponse {
                    error: Some(error.to_string()),
                    ..RetrievalResponse::without_sources(RETRY_MESSAGE, AnswerKind::Failed)
                }
            }
        }
    }

    /// Answers `question` and appends the turn to `session`.
    pub fn ask(&self, session: &mut ChatSession, question: &str) -> RetrievalResponse {
        let response = self.answer(question);
        session.record(question, &response);
        response
    }
}
