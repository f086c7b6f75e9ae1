use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::providers::{gemini, openai};
use pdf_rag_core::{
    read_uploads, AnswerKind, CharacterNgramEmbedder, ChatSession, CompletionRequest, Embedder,
    ExpansionStrategy, GeminiChatModel, GeminiEmbedder, IndexError, IngestMode, LanguageModel,
    OpenAiChatModel, OpenAiEmbedder, PipelineConfig, ProviderError, RagPipeline,
    RetrievalResponse, RetrievalStrategy, DEFAULT_EMBEDDING_DIMENSIONS, INDEX_UNAVAILABLE_MESSAGE,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Pipeline = RagPipeline<Arc<dyn Embedder>, Arc<dyn LanguageModel>>;

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Index file shared by ingestion and questions
    #[arg(long, env = "PDF_RAG_INDEX", default_value = "vector_index.json")]
    index_path: PathBuf,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbeddingBackend::Ngram)]
    embedder: EmbeddingBackend,

    /// Embedding model (backend default when omitted)
    #[arg(long)]
    embedding_model: Option<String>,

    /// Embedding dimensions (backend default when omitted)
    #[arg(long)]
    embedding_dimensions: Option<usize>,

    /// Chat model backend
    #[arg(long, value_enum, default_value_t = ChatBackend::Openai)]
    llm: ChatBackend,

    /// Chat model (backend default when omitted)
    #[arg(long)]
    chat_model: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = openai::OPENAI_BASE_URL)]
    openai_base_url: String,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = gemini::GEMINI_BASE_URL)]
    gemini_base_url: String,

    /// Maximum characters per chunk
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,

    /// Minimum similarity (0..=1) a passage needs to be used as context
    #[arg(long, default_value = "0.5")]
    threshold: f32,

    /// Keyword expansion strategy
    #[arg(long, value_enum, default_value_t = Expansion::Rules)]
    expansion: Expansion,

    /// Disable keyword matching when semantic search finds nothing
    #[arg(long, default_value_t = false)]
    no_lexical_fallback: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every PDF under a folder.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: PathBuf,
        /// Extend the existing index instead of rebuilding it.
        #[arg(long, default_value_t = false)]
        append: bool,
    },
    /// Ask one question and print the answer with its sources.
    Ask {
        #[arg(long)]
        question: String,
    },
    /// Read questions from stdin, one per line, within one chat session.
    Chat,
    /// Print the index manifest and a few stored chunks.
    Inspect {
        #[arg(long, default_value = "3")]
        samples: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbeddingBackend {
    Ngram,
    Openai,
    Gemini,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChatBackend {
    Openai,
    Gemini,
}

#[derive(Clone, Copy, ValueEnum)]
enum Expansion {
    Rules,
    Llm,
}

/// Stands in for a chat backend whose API key is missing, so ingestion and
/// inspection still work offline. Questions degrade to a failed answer.
struct UnconfiguredModel {
    backend: &'static str,
}

impl LanguageModel for UnconfiguredModel {
    fn name(&self) -> &str {
        self.backend
    }

    fn complete(&self, _request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        Err(ProviderError::BackendResponse {
            provider: self.backend.to_string(),
            details: "no API key configured".to_string(),
        })
    }
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    let pipeline = RagPipeline::new(pipeline_config(&cli), embedder(&cli)?, chat_model(&cli)?)?;

    match cli.command {
        Command::Ingest { folder, append } => ingest(&pipeline, &folder, append)?,
        Command::Ask { question } => {
            let mut session = ChatSession::new();
            let response = pipeline.ask(&mut session, &question);
            print_response(&response);
        }
        Command::Chat => chat(&pipeline)?,
        Command::Inspect { samples } => inspect(&pipeline, samples)?,
    }

    Ok(())
}

fn pipeline_config(cli: &Cli) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.index.path = cli.index_path.clone();
    config.chunking.chunk_size = cli.chunk_size;
    config.chunking.chunk_overlap = cli.chunk_overlap;
    config.retrieval.similarity_threshold = cli.threshold;
    config.retrieval.lexical_fallback = !cli.no_lexical_fallback;
    config.expansion.strategy = match cli.expansion {
        Expansion::Rules => ExpansionStrategy::RuleBased,
        Expansion::Llm => ExpansionStrategy::LlmAssisted,
    };
    config
}

fn embedder(cli: &Cli) -> anyhow::Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match cli.embedder {
        EmbeddingBackend::Ngram => Arc::new(CharacterNgramEmbedder {
            dimensions: cli.embedding_dimensions.unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
        }),
        EmbeddingBackend::Openai => {
            let key = cli
                .openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required for the openai embedder")?;
            let model = cli
                .embedding_model
                .as_deref()
                .unwrap_or(openai::DEFAULT_EMBEDDING_MODEL);
            Arc::new(OpenAiEmbedder::with_base_url(
                key,
                model,
                cli.embedding_dimensions,
                &cli.openai_base_url,
            )?)
        }
        EmbeddingBackend::Gemini => {
            let key = cli
                .google_api_key
                .as_deref()
                .context("GOOGLE_API_KEY is required for the gemini embedder")?;
            let model = cli
                .embedding_model
                .as_deref()
                .unwrap_or(gemini::DEFAULT_EMBEDDING_MODEL);
            Arc::new(GeminiEmbedder::with_base_url(
                key,
                model,
                cli.embedding_dimensions
                    .unwrap_or(gemini::DEFAULT_EMBEDDING_DIMENSIONS),
                &cli.gemini_base_url,
            )?)
        }
    };
    Ok(embedder)
}

fn chat_model(cli: &Cli) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let model: Arc<dyn LanguageModel> = match cli.llm {
        ChatBackend::Openai => match cli.openai_api_key.as_deref() {
            Some(key) => Arc::new(OpenAiChatModel::with_base_url(
                key,
                cli.chat_model.as_deref().unwrap_or(openai::DEFAULT_CHAT_MODEL),
                &cli.openai_base_url,
            )?),
            None => Arc::new(UnconfiguredModel { backend: "openai" }),
        },
        ChatBackend::Gemini => match cli.google_api_key.as_deref() {
            Some(key) => Arc::new(GeminiChatModel::with_base_url(
                key,
                cli.chat_model.as_deref().unwrap_or(gemini::DEFAULT_CHAT_MODEL),
                &cli.gemini_base_url,
            )?),
            None => Arc::new(UnconfiguredModel { backend: "gemini" }),
        },
    };
    Ok(model)
}

fn ingest(pipeline: &Pipeline, folder: &Path, append: bool) -> anyhow::Result<()> {
    let (uploads, unreadable) = read_uploads(folder)?;
    for skipped in &unreadable {
        warn!(file = %skipped.name, reason = %skipped.reason, "unreadable pdf");
    }
    if uploads.is_empty() {
        bail!("none of the pdf files under {} could be read", folder.display());
    }

    let mode = if append {
        IngestMode::Append
    } else {
        IngestMode::Rebuild
    };
    let report = pipeline.ingest(&uploads, mode)?;

    println!(
        "{} pages from {} files -> {} chunks ({} dropped as too short)",
        report.documents,
        uploads.len().saturating_sub(report.skipped_files.len()),
        report.stats.count,
        report.stats.dropped()
    );
    println!(
        "chunk length: min={} max={} avg={}",
        report.stats.min_chars, report.stats.max_chars, report.stats.avg_chars
    );
    for skipped in unreadable.iter().chain(report.skipped_files.iter()) {
        println!("skipped {}: {}", skipped.name, skipped.reason);
    }
    println!(
        "{} entries in {} at {}",
        report.indexed_total,
        pipeline.config().index.path.display(),
        Utc::now().to_rfc3339()
    );
    Ok(())
}

fn chat(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut session = ChatSession::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("Ask a question about the ingested documents (/clear resets, /quit exits).");
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear();
                println!("history cleared");
            }
            question => {
                let response = pipeline.ask(&mut session, question);
                print_response(&response);
            }
        }
    }

    info!(turns = session.len(), "chat finished");
    Ok(())
}

fn inspect(pipeline: &Pipeline, samples: usize) -> anyhow::Result<()> {
    let index = match pipeline.open_index() {
        Ok(index) => index,
        Err(IndexError::NotFound(_)) => {
            println!("{INDEX_UNAVAILABLE_MESSAGE}");
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    let manifest = index.manifest();
    println!("path: {}", index.path().display());
    println!("model: {} ({} dims, {})", manifest.embedding_model, manifest.dimensions, manifest.metric);
    println!("created: {}", manifest.created_at.to_rfc3339());
    println!("updated: {}", manifest.updated_at.to_rfc3339());
    println!("entries: {}", index.len());

    for (position, chunk) in index.sample(samples).into_iter().enumerate() {
        println!("\n#{} [{}]", position + 1, chunk.metadata.label());
        println!("{}", preview(&chunk.content, 200));
    }
    Ok(())
}

fn print_response(response: &RetrievalResponse) {
    println!("{}", response.answer);

    if response.strategy == Some(RetrievalStrategy::LexicalFallback) {
        println!("\n(context found by keyword matching; semantic search returned nothing)");
    }
    if let Some(error) = &response.error {
        eprintln!("error: {error}");
    }
    if response.kind == AnswerKind::Answered && !response.sources.is_empty() {
        println!("\nSources:");
        for (position, source) in response.sources.iter().enumerate() {
            let page = source
                .page
                .map(|page| format!(", page {page}"))
                .unwrap_or_default();
            println!("  {}. {}{}", position + 1, source.source, page);
            println!("     {}", preview(&source.content, 160));
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut = flat.chars().take(max_chars).collect::<String>();
    format!("{cut}...")
}
