use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tutor_core::domain::{DocumentChunk, TenantKey};
use tutor_core::error::{codes, AppError};

pub const KB_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeEntry {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// One tenant's embedded chunks. Read-only once built; rebuilding produces a new value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBase {
    pub schema_version: u32,
    pub key: TenantKey,
    pub model: String,
    pub dims: usize,
    pub built_at: String,
    /// sha256 (hex) over the JSON encoding of `entries`.
    pub content_sha256: String,
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    /// Every vector must be non-empty and share one dimensionality.
    pub fn new(
        key: TenantKey,
        model: impl Into<String>,
        built_at: impl Into<String>,
        entries: Vec<KnowledgeEntry>,
    ) -> Result<Self, AppError> {
        let first = entries.first().ok_or_else(|| {
            AppError::new(codes::KB_EMPTY, "Knowledge base has no chunks")
                .with_details(format!("tenant={key}"))
        })?;
        let dims = first.vector.len();
        if dims == 0 {
            return Err(AppError::new(codes::KB_BUILD_FAILED, "Embedding vector is empty")
                .with_details(format!("tenant={key}; chunk=0")));
        }
        if let Some((idx, e)) = entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.vector.len() != dims)
        {
            return Err(AppError::new(
                codes::KB_BUILD_FAILED,
                "Embedding dimensions are inconsistent",
            )
            .with_details(format!(
                "tenant={key}; chunk={idx}; expected={dims}; got={}",
                e.vector.len()
            )));
        }

        let content_sha256 = entries_digest(&entries)?;
        Ok(Self {
            schema_version: KB_SCHEMA_VERSION,
            key,
            model: model.into(),
            dims,
            built_at: built_at.into(),
            content_sha256,
            entries,
        })
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn verify(&self) -> Result<(), AppError> {
        if self.schema_version != KB_SCHEMA_VERSION {
            return Err(AppError::new(codes::KB_LOAD_FAILED, "Unsupported knowledge base schema")
                .with_details(format!(
                    "tenant={}; schema_version={}",
                    self.key, self.schema_version
                )));
        }
        let actual = entries_digest(&self.entries)?;
        if actual != self.content_sha256 {
            return Err(AppError::new(
                codes::KB_LOAD_FAILED,
                "Knowledge base integrity check failed",
            )
            .with_details(format!(
                "tenant={}; expected={}; got={actual}",
                self.key, self.content_sha256
            )));
        }
        if self.entries.iter().any(|e| e.vector.len() != self.dims) {
            return Err(AppError::new(
                codes::KB_LOAD_FAILED,
                "Knowledge base vector dimensions are inconsistent",
            )
            .with_details(format!("tenant={}; dims={}", self.key, self.dims)));
        }
        Ok(())
    }
}

fn entries_digest(entries: &[KnowledgeEntry]) -> Result<String, AppError> {
    let bytes = serde_json::to_vec(entries).map_err(|e| {
        AppError::new(codes::KB_BUILD_FAILED, "Failed to encode knowledge base entries")
            .with_details(e.to_string())
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// A search hit. Scores are cosine similarities in [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn entry(text: &str, vector: Vec<f32>) -> KnowledgeEntry {
        KnowledgeEntry {
            chunk: DocumentChunk::new(text, "notes.md", BTreeMap::new()),
            vector,
        }
    }

    #[test]
    fn rejects_empty_and_ragged_entries() {
        let key = TenantKey::new(1, 2);
        let err = KnowledgeBase::new(key, "m", "t", Vec::new()).expect_err("empty");
        assert_eq!(err.code, codes::KB_EMPTY);

        let err = KnowledgeBase::new(
            key,
            "m",
            "t",
            vec![entry("a", vec![1.0, 0.0]), entry("b", vec![1.0])],
        )
        .expect_err("ragged");
        assert_eq!(err.code, codes::KB_BUILD_FAILED);
        assert!(err.details.unwrap_or_default().contains("chunk=1"));
    }

    #[test]
    fn tampered_entries_fail_verification() {
        let kb = KnowledgeBase::new(
            TenantKey::new(1, 2),
            "m",
            "t",
            vec![entry("a", vec![1.0, 0.0])],
        )
        .expect("kb");
        assert_eq!(kb.dims, 2);
        kb.verify().expect("fresh base verifies");

        let mut tampered = kb.clone();
        tampered.entries[0].vector = vec![0.0, 1.0];
        let err = tampered.verify().expect_err("digest mismatch");
        assert_eq!(err.code, codes::KB_LOAD_FAILED);
    }
}
