//! Local vector index persisted as a single JSON document.
//!
//! Distances are clamped cosine distances, `clamp(1 - cos(a, b), 0, 1)`, so
//! `1 - distance` is a similarity in `[0, 1]` whatever the embedder.
//!
//! Every write goes to a temporary file next to the target and is renamed over
//! it, so a concurrent reader sees either the previous or the new index.

use crate::embeddings::{ensure_dimensions, Embedder};
use crate::error::{IndexError, IngestError, ProviderError};
use crate::models::{Chunk, ScoredResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const INDEX_FORMAT_VERSION: u32 = 1;
pub const DISTANCE_METRIC: &str = "clamped-cosine";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimensions: usize,
    pub metric: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub entry_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexedVector {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Deserialize)]
struct PersistedIndex {
    manifest: IndexManifest,
    entries: Vec<IndexedVector>,
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    manifest: &'a IndexManifest,
    entries: &'a [IndexedVector],
}

pub struct VectorIndex<E> {
    path: PathBuf,
    embedder: E,
    batch_size: usize,
    manifest: IndexManifest,
    entries: Vec<IndexedVector>,
}

impl<E: Embedder> VectorIndex<E> {
    /// Embeds `chunks` in batches of `batch_size` and persists them at `path`,
    /// replacing any previous index there.
    pub fn build(
        path: impl Into<PathBuf>,
        chunks: &[Chunk],
        embedder: E,
        batch_size: usize,
    ) -> Result<Self, IngestError> {
        if chunks.is_empty() {
            return Err(IngestError::NoChunks);
        }

        let path = path.into();
        let batch_size = batch_size.max(1);
        let entries = embed_chunks(&embedder, chunks, batch_size)?;
        let now = Utc::now();

        let index = Self {
            manifest: IndexManifest {
                format_version: INDEX_FORMAT_VERSION,
                embedding_model: embedder.model_id(),
                dimensions: embedder.dimensions(),
                metric: DISTANCE_METRIC.to_string(),
                created_at: now,
                updated_at: now,
                entry_count: entries.len(),
            },
            path,
            embedder,
            batch_size,
            entries,
        };
        index.persist()?;

        info!(
            path = %index.path.display(),
            entries = index.entries.len(),
            model = %index.manifest.embedding_model,
            "vector index built"
        );
        Ok(index)
    }

    /// A missing file is [`IndexError::NotFound`], the normal first-run state.
    pub fn load(path: impl Into<PathBuf>, embedder: E) -> Result<Self, IndexError> {
        let path = path.into();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(IndexError::NotFound(path));
            }
            Err(error) => return Err(error.into()),
        };

        let persisted: PersistedIndex = serde_json::from_reader(BufReader::new(file))?;
        let manifest = persisted.manifest;

        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::Incompatible(format!(
                "format version {} is not {}",
                manifest.format_version, INDEX_FORMAT_VERSION
            )));
        }
        if manifest.embedding_model != embedder.model_id()
            || manifest.dimensions != embedder.dimensions()
        {
            return Err(IndexError::Incompatible(format!(
                "index was built with {} ({} dims), embedder is {} ({} dims)",
                manifest.embedding_model,
                manifest.dimensions,
                embedder.model_id(),
                embedder.dimensions()
            )));
        }

        debug!(path = %path.display(), entries = persisted.entries.len(), "vector index loaded");
        Ok(Self {
            path,
            embedder,
            batch_size: 100,
            manifest,
            entries: persisted.entries,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The `k` nearest chunks, ascending by distance; ties keep insertion order.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredResult>, IndexError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(text)?;
        ensure_dimensions(std::slice::from_ref(&query_vector), self.manifest.dimensions)?;

        let mut scored = self
            .entries
            .iter()
            .map(|entry| ScoredResult {
                chunk: entry.chunk.clone(),
                distance: clamped_cosine_distance(&query_vector, &entry.vector),
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        scored.truncate(k);
        Ok(scored)
    }

    /// Embeds and appends `chunks`, then persists. Returns the new entry count.
    pub fn add(&mut self, chunks: &[Chunk]) -> Result<usize, IngestError> {
        if chunks.is_empty() {
            return Ok(self.entries.len());
        }

        let added = embed_chunks(&self.embedder, chunks, self.batch_size)?;
        let previous_len = self.entries.len();
        self.entries.extend(added);
        self.manifest.entry_count = self.entries.len();
        self.manifest.updated_at = Utc::now();

        if let Err(error) = self.persist() {
            self.entries.truncate(previous_len);
            self.manifest.entry_count = previous_len;
            return Err(error.into());
        }

        info!(
            path = %self.path.display(),
            added = chunks.len(),
            entries = self.entries.len(),
            "vector index extended"
        );
        Ok(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    pub fn sample(&self, count: usize) -> Vec<&Chunk> {
        self.chunks().take(count).collect()
    }

    fn persist(&self) -> Result<(), IndexError> {
        let persisted = PersistedIndexRef {
            manifest: &self.manifest,
            entries: &self.entries,
        };
        write_atomically(&self.path, |writer| {
            serde_json::to_writer(writer, &persisted).map_err(IndexError::from)
        })
    }
}

fn embed_chunks<E: Embedder>(
    embedder: &E,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<IndexedVector>, ProviderError> {
    let batch_count = chunks.len().div_ceil(batch_size);
    let mut entries = Vec::with_capacity(chunks.len());

    for (batch_number, batch) in chunks.chunks(batch_size).enumerate() {
        debug!(
            batch = batch_number + 1,
            batches = batch_count,
            size = batch.len(),
            "embedding chunk batch"
        );
        let texts = batch.iter().map(|chunk| chunk.content.as_str()).collect::<Vec<_>>();
        let vectors = embedder.embed_batch(&texts)?;

        if vectors.len() != batch.len() {
            return Err(ProviderError::Malformed {
                provider: embedder.model_id(),
                details: format!("{} vectors for {} chunks", vectors.len(), batch.len()),
            });
        }
        ensure_dimensions(&vectors, embedder.dimensions())?;

        entries.extend(
            batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedVector { chunk, vector }),
        );
    }

    Ok(entries)
}

/// `1 - cos(a, b)` clamped into `[0, 1]`; zero vectors are maximally distant.
pub fn clamped_cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

fn write_atomically<F>(path: &Path, write: F) -> Result<(), IndexError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), IndexError>,
{
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("index");
    let staging = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let result = (|| {
        let mut writer = BufWriter::new(File::create(&staging)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&staging, path)?;
        Ok::<_, IndexError>(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

/// Exclusive marker allowing one ingestion per index path at a time.
/// Released when dropped.
#[derive(Debug)]
pub struct IngestionLock {
    path: PathBuf,
}

impl IngestionLock {
    pub fn acquire(index_path: &Path) -> Result<Self, IndexError> {
        let mut lock_name = index_path.as_os_str().to_owned();
        lock_name.push(".lock");
        let path = PathBuf::from(lock_name);

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "pid={} acquired_at={}", std::process::id(), Utc::now().to_rfc3339())?;
                Ok(Self { path })
            }
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                Err(IndexError::Busy(index_path.to_path_buf()))
            }
            Err(error) => Err(error.into()),
        }
    }
}

impl Drop for IngestionLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %error, "failed to release ingestion lock");
        }
    }
}
