use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tutor_core::config::{Settings, DEFAULT_KB_CACHE_CAPACITY};
use tutor_core::domain::{DocumentChunk, TenantKey};
use tutor_core::error::{codes, AppError};

use super::cache::{BaseCache, FileStamp};
use super::model::{KnowledgeBase, KnowledgeEntry, ScoredChunk};
use super::{similarity, Retriever};
use crate::embeddings::Embedder;
use crate::ingest::{DocumentIngestor, SubjectDescriptor};

pub const KB_FILE_NAME: &str = "knowledge_base.json";

/// Builds, persists and searches per-tenant knowledge bases under one root directory.
pub struct KnowledgeBaseManager {
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
    model: String,
    cache: Mutex<BaseCache>,
}

impl KnowledgeBaseManager {
    pub fn new(root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>, model: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            embedder,
            model: model.into(),
            cache: Mutex::new(BaseCache::new(DEFAULT_KB_CACHE_CAPACITY)),
        }
    }

    pub fn from_settings(embedder: Arc<dyn Embedder>, settings: &Settings) -> Self {
        Self::new(
            settings.storage.vector_base_dir.clone(),
            embedder,
            settings.provider.embedding_model.clone(),
        )
        .with_cache_capacity(settings.storage.kb_cache_capacity)
    }

    /// Caps how many loaded bases stay in memory. Zero disables the cache.
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        self.cache_guard().set_capacity(capacity);
        self
    }

    /// Tenants whose bases are currently held in memory, sorted.
    pub fn cached_tenants(&self) -> Vec<TenantKey> {
        self.cache_guard().tenants()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn artifact_path(&self, key: &TenantKey) -> PathBuf {
        key.storage_dir(&self.root).join(KB_FILE_NAME)
    }

    /// Embeds every chunk, then atomically replaces the tenant's artifact.
    /// Nothing is written unless all embeddings succeed.
    pub fn build(
        &self,
        key: &TenantKey,
        chunks: Vec<DocumentChunk>,
    ) -> Result<Arc<KnowledgeBase>, AppError> {
        if chunks.is_empty() {
            return Err(AppError::new(codes::KB_EMPTY, "No chunks to index")
                .with_details(format!("tenant={key}")));
        }

        let total = chunks.len();
        let mut entries = Vec::with_capacity(total);
        for (idx, chunk) in chunks.into_iter().enumerate() {
            let vector = self.embedder.embed(&self.model, chunk.text()).map_err(|e| {
                let details = match e.details.as_deref() {
                    Some(d) => format!("tenant={key}; chunk={idx}/{total}; {d}"),
                    None => format!("tenant={key}; chunk={idx}/{total}"),
                };
                AppError {
                    details: Some(details),
                    ..e
                }
            })?;
            entries.push(KnowledgeEntry { chunk, vector });
        }

        let built_at = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| {
            AppError::new(codes::KB_BUILD_FAILED, "Failed to format build timestamp")
                .with_details(e.to_string())
        })?;
        let base = Arc::new(KnowledgeBase::new(*key, self.model.clone(), built_at, entries)?);
        let stamp = self.write_artifact(&base)?;
        self.cache_guard().insert(*key, stamp, Arc::clone(&base));

        tracing::info!(
            tenant = %key,
            chunks = base.len(),
            dims = base.dims,
            model = %base.model,
            "knowledge base built"
        );
        Ok(base)
    }

    /// Ingests the subject's files and builds its knowledge base in one step.
    pub fn build_from_subject(
        &self,
        key: &TenantKey,
        ingestor: &DocumentIngestor,
        subject: &SubjectDescriptor,
    ) -> Result<Arc<KnowledgeBase>, AppError> {
        let report = ingestor.load_with_report(subject)?;
        if !report.skipped.is_empty() {
            tracing::warn!(
                tenant = %key,
                skipped = report.skipped.len(),
                "building knowledge base without some files"
            );
        }
        self.build(key, report.chunks)
    }

    /// `Ok(None)` when the tenant has no knowledge base yet.
    pub fn load(&self, key: &TenantKey) -> Result<Option<Arc<KnowledgeBase>>, AppError> {
        let path = self.artifact_path(key);
        let stamp = match file_stamp(&path) {
            Some(s) => s,
            None => {
                self.cache_guard().remove(key);
                return Ok(None);
            }
        };

        if let Some(base) = self.cache_guard().get(key, stamp) {
            tracing::debug!(tenant = %key, "knowledge base cache hit");
            return Ok(Some(base));
        }

        let bytes = fs::read(&path).map_err(|e| {
            AppError::new(codes::KB_LOAD_FAILED, "Failed to read knowledge base")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let base: KnowledgeBase = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new(codes::KB_LOAD_FAILED, "Failed to decode knowledge base")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        base.verify()?;
        if base.key != *key {
            return Err(AppError::new(
                codes::KB_LOAD_FAILED,
                "Knowledge base belongs to another tenant",
            )
            .with_details(format!("path={}; found={}", path.display(), base.key)));
        }

        let base = Arc::new(base);
        self.cache_guard().insert(*key, stamp, Arc::clone(&base));
        tracing::debug!(tenant = %key, chunks = base.len(), "knowledge base loaded");
        Ok(Some(base))
    }

    pub fn exists(&self, key: &TenantKey) -> bool {
        self.artifact_path(key).is_file()
    }

    /// Returns true when something was removed.
    pub fn delete(&self, key: &TenantKey) -> Result<bool, AppError> {
        self.cache_guard().remove(key);
        let dir = key.storage_dir(&self.root);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| {
            AppError::new(codes::KB_DELETE_FAILED, "Failed to delete knowledge base")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        // Leaves the professor directory alone while other subjects remain.
        if let Some(parent) = dir.parent() {
            let _ = fs::remove_dir(parent);
        }
        tracing::info!(tenant = %key, "knowledge base deleted");
        Ok(true)
    }

    /// Tenants with a persisted artifact, sorted by (professor, subject).
    pub fn list_tenants(&self) -> Result<Vec<TenantKey>, AppError> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        for prof in read_dir_names(&self.root)? {
            let prof_dir = self.root.join(&prof);
            if !prof_dir.is_dir() {
                continue;
            }
            for subj in read_dir_names(&prof_dir)? {
                let Some(key) = TenantKey::from_dir_names(&prof, &subj) else {
                    continue;
                };
                if prof_dir.join(&subj).join(KB_FILE_NAME).is_file() {
                    out.push(key);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn write_artifact(&self, base: &KnowledgeBase) -> Result<FileStamp, AppError> {
        let dir = base.key.storage_dir(&self.root);
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::new(codes::KB_BUILD_FAILED, "Failed to create knowledge base directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        let path = dir.join(KB_FILE_NAME);

        // The temp file lives next to the target so the rename stays on one filesystem.
        let tmp = tempfile::Builder::new()
            .prefix(".knowledge_base.")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| {
                AppError::new(codes::KB_BUILD_FAILED, "Failed to create temporary artifact")
                    .with_details(format!("dir={}; err={}", dir.display(), e))
            })?;
        {
            let mut w = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut w, base).map_err(|e| {
                AppError::new(codes::KB_BUILD_FAILED, "Failed to encode knowledge base")
                    .with_details(e.to_string())
            })?;
            w.flush().map_err(|e| {
                AppError::new(codes::KB_BUILD_FAILED, "Failed to write knowledge base")
                    .with_details(format!("tmp={}; err={}", tmp.path().display(), e))
            })?;
        }
        tmp.as_file().sync_all().map_err(|e| {
            AppError::new(codes::KB_BUILD_FAILED, "Failed to sync knowledge base")
                .with_details(format!("tmp={}; err={}", tmp.path().display(), e))
        })?;
        tmp.persist(&path).map_err(|e| {
            AppError::new(codes::KB_BUILD_FAILED, "Failed to finalize knowledge base write")
                .with_details(format!("dest={}; err={}", path.display(), e.error))
        })?;

        file_stamp(&path).ok_or_else(|| {
            AppError::new(codes::KB_BUILD_FAILED, "Knowledge base missing after write")
                .with_details(format!("path={}", path.display()))
        })
    }

    fn cache_guard(&self) -> MutexGuard<'_, BaseCache> {
        // Entries are replaced whole, so a poisoned cache is still consistent.
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Retriever for KnowledgeBaseManager {
    fn search(&self, kb: &KnowledgeBase, query: &str, k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        let q = query.trim();
        if q.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let qv = self.embedder.embed(&kb.model, q)?;
        if qv.len() != kb.dims {
            return Err(AppError::new(
                codes::AI_RETRIEVAL_FAILED,
                "Query embedding dims do not match knowledge base dims",
            )
            .with_details(format!("tenant={}; kb_dims={}; query_dims={}", kb.key, kb.dims, qv.len())));
        }
        let qnorm = similarity::l2_norm(&qv);
        if qnorm == 0.0 {
            tracing::debug!(tenant = %kb.key, "query embedding has zero norm");
            return Ok(Vec::new());
        }

        let mut hits: Vec<(usize, f32)> = Vec::new();
        for (idx, entry) in kb.entries().iter().enumerate() {
            let vnorm = similarity::l2_norm(&entry.vector);
            if vnorm == 0.0 {
                continue;
            }
            hits.push((idx, similarity::cosine_similarity(&qv, &entry.vector, qnorm, vnorm)));
        }

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(k);

        Ok(hits
            .into_iter()
            .map(|(idx, score)| ScoredChunk {
                chunk: kb.entries()[idx].chunk.clone(),
                score,
            })
            .collect())
    }
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    Some(FileStamp {
        modified: meta.modified().ok()?,
        len: meta.len(),
    })
}

fn read_dir_names(dir: &Path) -> Result<Vec<String>, AppError> {
    let rd = fs::read_dir(dir).map_err(|e| {
        AppError::new(codes::KB_LOAD_FAILED, "Failed to list knowledge base directory")
            .with_details(format!("path={}; err={}", dir.display(), e))
    })?;
    let mut names = Vec::new();
    for entry in rd {
        let entry = entry.map_err(|e| {
            AppError::new(codes::KB_LOAD_FAILED, "Failed to read directory entry")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
