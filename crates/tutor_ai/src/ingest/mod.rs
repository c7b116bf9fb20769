use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tutor_core::domain::{DocumentChunk, RawDocument, UNKNOWN_SOURCE};
use tutor_core::error::{codes, AppError};

use crate::chunking::Chunker;

mod extract;

pub use extract::{DocumentTextExtractor, PlainTextExtractor};

/// Where a subject's files come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceOrigin {
    LocalPaths { paths: Vec<PathBuf> },
    RemoteFolder { folder_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectDescriptor {
    pub subject_id: i64,
    pub subject_name: String,
    pub origin: SourceOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
}

/// Remote file storage holding a subject's uploads (e.g. a shared drive folder).
pub trait FileStore: Send + Sync {
    fn list_folder(&self, folder_id: &str) -> Result<Vec<RemoteFile>, AppError>;

    /// Writes the file somewhere under `dest_dir` and returns its local path.
    fn download(&self, file: &RemoteFile, dest_dir: &Path) -> Result<PathBuf, AppError>;
}

/// Reads the text content of one local file.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedFile {
    pub name: String,
    pub error: AppError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub chunks: Vec<DocumentChunk>,
    /// Source ids of the files that produced content, in load order.
    pub loaded_files: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

/// Resolves a subject's files, loads their text and chunks it.
///
/// Never persists anything: the chunks are handed back for the knowledge base to embed.
pub struct DocumentIngestor {
    chunker: Chunker,
    extractor: Arc<dyn TextExtractor>,
    file_store: Option<Arc<dyn FileStore>>,
}

impl DocumentIngestor {
    pub fn new(chunker: Chunker) -> Self {
        Self {
            chunker,
            extractor: Arc::new(DocumentTextExtractor),
            file_store: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_file_store(mut self, file_store: Arc<dyn FileStore>) -> Self {
        self.file_store = Some(file_store);
        self
    }

    pub fn load(&self, subject: &SubjectDescriptor) -> Result<Vec<DocumentChunk>, AppError> {
        Ok(self.load_with_report(subject)?.chunks)
    }

    /// Fails only when no file produced any chunk. Individual file failures are logged
    /// and listed in the report.
    pub fn load_with_report(&self, subject: &SubjectDescriptor) -> Result<IngestReport, AppError> {
        let mut docs: Vec<RawDocument> = Vec::new();
        let mut skipped: Vec<SkippedFile> = Vec::new();

        match &subject.origin {
            SourceOrigin::LocalPaths { paths } => {
                for path in paths {
                    let name = path.display().to_string();
                    match self.load_local(path) {
                        Ok(doc) => docs.push(doc),
                        Err(error) => skip(&mut skipped, subject.subject_id, name, error),
                    }
                }
            }
            SourceOrigin::RemoteFolder { folder_id } => {
                let store = self.file_store.as_ref().ok_or_else(|| {
                    AppError::new(
                        codes::INGEST_SOURCE_UNAVAILABLE,
                        "Remote folder given but no file store is configured",
                    )
                    .with_details(format!("folder_id={folder_id}"))
                })?;
                let files = store.list_folder(folder_id).map_err(|e| {
                    AppError::new(codes::INGEST_SOURCE_UNAVAILABLE, "Failed to list remote folder")
                        .with_details(format!("folder_id={folder_id}; err={e}"))
                        .with_retryable(e.retryable)
                })?;
                for file in files {
                    let name = remote_source_id(&file);
                    match self.load_remote(store.as_ref(), &file) {
                        Ok(doc) => docs.push(doc),
                        Err(error) => skip(&mut skipped, subject.subject_id, name, error),
                    }
                }
            }
        }

        let loaded_files: Vec<String> = docs.iter().map(|d| d.source_id.clone()).collect();
        let chunks = self.chunker.split(&docs);
        if chunks.is_empty() {
            return Err(AppError::new(
                codes::INGEST_NO_CONTENT,
                "No content could be loaded for this subject",
            )
            .with_details(format!(
                "subject_id={}; skipped={}",
                subject.subject_id,
                skipped.len()
            )));
        }

        tracing::info!(
            subject_id = subject.subject_id,
            files = loaded_files.len(),
            skipped = skipped.len(),
            chunks = chunks.len(),
            "ingested subject documents"
        );
        Ok(IngestReport {
            chunks,
            loaded_files,
            skipped,
        })
    }

    fn load_local(&self, path: &Path) -> Result<RawDocument, AppError> {
        let text = self.read_text(path)?;
        let file_name = file_name_of(path);
        Ok(RawDocument::new(path.display().to_string(), text)
            .with_metadata("file_name", file_name)
            .with_metadata("origin", "local"))
    }

    fn load_remote(&self, store: &dyn FileStore, file: &RemoteFile) -> Result<RawDocument, AppError> {
        // Dropping the guard removes the directory and the downloaded file, on every path out.
        let scratch = tempfile::Builder::new()
            .prefix("tutor-ingest-")
            .tempdir()
            .map_err(|e| {
                AppError::new(codes::INGEST_TRANSFER_FAILED, "Failed to create temporary directory")
                    .with_details(e.to_string())
            })?;
        let local = store.download(file, scratch.path()).map_err(|e| {
            AppError::new(codes::INGEST_TRANSFER_FAILED, "Failed to download remote file")
                .with_details(format!("id={}; err={}", file.id, e))
                .with_retryable(e.retryable)
        })?;
        let text = self.read_text(&local)?;

        Ok(RawDocument::new(remote_source_id(file), text)
            .with_metadata("file_name", file.name.clone())
            .with_metadata("origin", "remote")
            .with_metadata("remote_id", file.id.clone()))
    }

    fn read_text(&self, path: &Path) -> Result<String, AppError> {
        if !path.exists() {
            return Err(AppError::new(codes::INGEST_FILE_NOT_FOUND, "File not found")
                .with_details(format!("path={}", path.display())));
        }
        if !path.is_file() {
            return Err(AppError::new(codes::INGEST_FILE_UNREADABLE, "Path is not a regular file")
                .with_details(format!("path={}", path.display())));
        }
        let text = self.extractor.extract(path)?;
        if text.trim().is_empty() {
            return Err(AppError::new(codes::INGEST_FILE_EMPTY, "File has no text content")
                .with_details(format!("path={}", path.display())));
        }
        Ok(text)
    }
}

fn skip(skipped: &mut Vec<SkippedFile>, subject_id: i64, name: String, error: AppError) {
    tracing::warn!(subject_id, file = %name, error = %error, "skipping file");
    skipped.push(SkippedFile { name, error });
}

fn remote_source_id(file: &RemoteFile) -> String {
    [file.name.trim(), file.id.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_source_id_falls_back_to_id_then_unknown() {
        let named = RemoteFile {
            id: "1".to_string(),
            name: "week1.md".to_string(),
        };
        let unnamed = RemoteFile {
            id: "abc".to_string(),
            name: " ".to_string(),
        };
        let bare = RemoteFile {
            id: String::new(),
            name: String::new(),
        };
        assert_eq!(remote_source_id(&named), "week1.md");
        assert_eq!(remote_source_id(&unnamed), "abc");
        assert_eq!(remote_source_id(&bare), UNKNOWN_SOURCE);
    }
}
