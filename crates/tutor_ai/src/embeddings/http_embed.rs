use std::time::Duration;

use serde::{Deserialize, Serialize};
use tutor_core::config::ProviderSettings;
use tutor_core::error::{codes, AppError};

use super::Embedder;
use crate::provider::{CallCodes, ProviderClient};

const EMBED_CODES: CallCodes = CallCodes {
    failed: codes::AI_EMBEDDING_FAILED,
    timeout: codes::AI_EMBEDDING_TIMEOUT,
};

// Chunking keeps inputs far below this; it only bounds pathological requests.
const MAX_INPUT_CHARS: usize = 12_000;

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: ProviderClient,
}

impl HttpEmbedder {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, AppError> {
        let client = ProviderClient::new(
            &settings.embedding_base_url,
            settings.api_key.clone(),
            Duration::from_secs(settings.embed_timeout_secs),
        )?;
        Ok(Self::new(client))
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl Embedder for HttpEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let input = truncate_input(input);
        let body = serde_json::to_value(EmbeddingsRequest { model, input }).map_err(|e| {
            AppError::new(codes::AI_EMBEDDING_FAILED, "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;

        let resp: EmbeddingsResponse = self.client.post_json("embeddings", body, EMBED_CODES)?;
        first_embedding(resp, model)
    }
}

/// Cuts at `MAX_INPUT_CHARS` characters, never inside one.
fn truncate_input(input: &str) -> &str {
    match input.char_indices().nth(MAX_INPUT_CHARS) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

fn first_embedding(resp: EmbeddingsResponse, model: &str) -> Result<Vec<f32>, AppError> {
    let vector = resp
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .unwrap_or_default();
    if vector.is_empty() {
        return Err(AppError::new(
            codes::AI_EMBEDDING_FAILED,
            "Embeddings response was empty",
        )
        .with_details(format!("model={model}")));
    }
    Ok(vector)
}
