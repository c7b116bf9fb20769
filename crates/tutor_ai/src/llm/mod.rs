use tutor_core::error::AppError;

/// Single-turn text generation. Implementations report failures as
/// `AI_GENERATION_FAILED` and timeouts as `AI_GENERATION_TIMEOUT`.
pub trait Llm: Send + Sync {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError>;
}

pub mod openrouter_llm;

pub use openrouter_llm::OpenRouterLlm;
