use tutor_core::error::AppError;

/// Turns text into a vector. The same model must embed both the index and the queries,
/// otherwise similarity scores are meaningless.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

pub mod http_embed;

pub use http_embed::HttpEmbedder;
