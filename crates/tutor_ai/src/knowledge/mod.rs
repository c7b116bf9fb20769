use tutor_core::error::AppError;

mod cache;
mod manager;
mod model;
mod similarity;

pub use manager::{KnowledgeBaseManager, KB_FILE_NAME};
pub use model::{KnowledgeBase, KnowledgeEntry, ScoredChunk, KB_SCHEMA_VERSION};

/// Similarity search over a loaded knowledge base.
pub trait Retriever: Send + Sync {
    /// At most `k` hits, best first; equal scores keep chunk order.
    fn search(&self, kb: &KnowledgeBase, query: &str, k: usize) -> Result<Vec<ScoredChunk>, AppError>;
}
