use crate::chunking::ChunkStats;
use crate::error::IngestError;
use crate::models::UploadedFile;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPdf {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Replace whatever index exists at the configured path.
    #[default]
    Rebuild,
    /// Extend the existing index; builds a new one on first run.
    Append,
}

#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub documents: usize,
    pub stats: ChunkStats,
    pub skipped_files: Vec<SkippedPdf>,
    pub indexed_total: usize,
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn read_upload(path: &Path) -> Result<UploadedFile, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    Ok(UploadedFile {
        name: name.to_string(),
        bytes: fs::read(path)?,
    })
}

/// Reads every PDF under `folder`; unreadable files are returned as skipped.
pub fn read_uploads(folder: &Path) -> Result<(Vec<UploadedFile>, Vec<SkippedPdf>), IngestError> {
    let files = discover_pdf_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    let mut uploads = Vec::new();
    let mut skipped = Vec::new();
    for path in files {
        match read_upload(&path) {
            Ok(upload) => uploads.push(upload),
            Err(error) => {
                warn!(path = %path.display(), %error, "could not read pdf");
                skipped.push(SkippedPdf {
                    name: path.display().to_string(),
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok((uploads, skipped))
}
