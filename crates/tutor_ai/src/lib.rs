pub mod chat;
pub mod chunking;
pub mod citations;
pub mod embeddings;
pub mod entities;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod provider;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use tutor_core::domain::{DocumentChunk, TenantKey};
    use tutor_core::error::AppError;

    use super::embeddings::Embedder;
    use super::knowledge::{KnowledgeBaseManager, Retriever};

    struct CountABEmbedder;

    impl Embedder for CountABEmbedder {
        fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
            let a = input.chars().filter(|c| *c == 'a').count();
            let b = input.chars().filter(|c| *c == 'b').count();
            Ok(vec![a as f32, b as f32])
        }
    }

    #[test]
    fn build_then_search_ranks_by_cosine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = KnowledgeBaseManager::new(dir.path(), Arc::new(CountABEmbedder), "mock");
        let key = TenantKey::new(1, 1);
        let chunks = vec![
            DocumentChunk::new("bbbb", "b.txt", BTreeMap::new()),
            DocumentChunk::new("aaab", "a.txt", BTreeMap::new()),
        ];
        let kb = manager.build(&key, chunks).expect("build");

        let hits = manager.search(&kb, "aaaa", 5).expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source_id(), "a.txt");
        assert!(hits[0].score > hits[1].score);
    }
}
