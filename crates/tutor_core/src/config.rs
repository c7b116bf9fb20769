use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{codes, AppError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSettings {
    /// Bearer token for the completion and embedding endpoints.
    pub api_key: Option<String>,
    pub llm_base_url: String,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub llm_model: String,
    pub temperature: f32,
    pub embed_timeout_secs: u64,
    pub generate_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            llm_base_url: "https://openrouter.ai/api/v1".to_string(),
            embedding_base_url: "https://openrouter.ai/api/v1".to_string(),
            embedding_model: "sentence-transformers/all-mpnet-base-v2".to_string(),
            llm_model: "google/palm-2-chat-bison".to_string(),
            temperature: 0.7,
            embed_timeout_secs: 10,
            generate_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingSettings {
    /// Window size in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows. Must stay below `chunk_size`.
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSettings {
    pub number_of_chunks: usize,
    /// Minimum cosine similarity for a passage to be used.
    pub similarity_threshold: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            number_of_chunks: 3,
            similarity_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSettings {
    /// Most recent exchanges considered for the prompt.
    pub max_history_length: usize,
    /// Word budget for the rendered history.
    pub max_history_tokens: usize,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            max_history_length: 5,
            max_history_tokens: 1000,
        }
    }
}

/// Loaded knowledge bases kept in memory when `KB_CACHE_CAPACITY` is unset.
pub const DEFAULT_KB_CACHE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageSettings {
    pub vector_base_dir: PathBuf,
    pub session_db_path: PathBuf,
    /// Knowledge bases held in memory at once; 0 reads from disk every time.
    pub kb_cache_capacity: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            vector_base_dir: PathBuf::from("data").join("vector_bases"),
            session_db_path: PathBuf::from("data").join("sessions.sqlite"),
            kb_cache_capacity: DEFAULT_KB_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub conversation: ConversationSettings,
    pub storage: StorageSettings,
}

impl Settings {
    /// Reads settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, AppError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(AppError::new(codes::CONFIG_INVALID, "Failed to read .env file")
                    .with_details(e.to_string()));
            }
        }
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Builds settings from an arbitrary variable source. Unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut s = Settings::default();

        s.provider.api_key = get("OPENROUTER_API_KEY");
        if let Some(v) = get("OPENROUTER_URL") {
            s.provider.llm_base_url = v.clone();
            s.provider.embedding_base_url = v;
        }
        if let Some(v) = get("EMBEDDING_URL") {
            s.provider.embedding_base_url = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            s.provider.embedding_model = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            s.provider.llm_model = v;
        }
        parse_into(&get, "LLM_TEMPERATURE", &mut s.provider.temperature)?;
        parse_into(&get, "EMBED_TIMEOUT_SECS", &mut s.provider.embed_timeout_secs)?;
        parse_into(&get, "GENERATE_TIMEOUT_SECS", &mut s.provider.generate_timeout_secs)?;

        parse_into(&get, "CHUNK_SIZE", &mut s.chunking.chunk_size)?;
        parse_into(&get, "CHUNK_OVERLAP", &mut s.chunking.chunk_overlap)?;

        parse_into(&get, "NUMBER_OF_CHUNKS", &mut s.retrieval.number_of_chunks)?;
        parse_into(&get, "SIMILARITY_THRESHOLD", &mut s.retrieval.similarity_threshold)?;

        parse_into(&get, "MAX_HISTORY_LENGTH", &mut s.conversation.max_history_length)?;
        parse_into(&get, "MAX_HISTORY_TOKENS", &mut s.conversation.max_history_tokens)?;

        if let Some(v) = get("VECTOR_BASE_DIR") {
            s.storage.vector_base_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SESSION_DB_PATH") {
            s.storage.session_db_path = PathBuf::from(v);
        }
        parse_into(&get, "KB_CACHE_CAPACITY", &mut s.storage.kb_cache_capacity)?;

        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunking.chunk_size == 0 {
            return Err(invalid("CHUNK_SIZE must be at least 1", self.chunking.chunk_size));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(AppError::new(
                codes::CONFIG_INVALID,
                "CHUNK_OVERLAP must be smaller than CHUNK_SIZE",
            )
            .with_details(format!(
                "chunk_size={}; chunk_overlap={}",
                self.chunking.chunk_size, self.chunking.chunk_overlap
            )));
        }
        if self.retrieval.number_of_chunks == 0 {
            return Err(invalid(
                "NUMBER_OF_CHUNKS must be at least 1",
                self.retrieval.number_of_chunks,
            ));
        }
        let t = self.retrieval.similarity_threshold;
        if !t.is_finite() || !(-1.0..=1.0).contains(&t) {
            return Err(invalid("SIMILARITY_THRESHOLD must be within [-1, 1]", t));
        }
        let temp = self.provider.temperature;
        if !temp.is_finite() || temp < 0.0 {
            return Err(invalid("LLM_TEMPERATURE must be non-negative", temp));
        }
        if self.provider.embed_timeout_secs == 0 || self.provider.generate_timeout_secs == 0 {
            return Err(AppError::new(
                codes::CONFIG_INVALID,
                "Request timeouts must be at least one second",
            ));
        }
        Ok(())
    }
}

fn invalid(message: &str, value: impl std::fmt::Display) -> AppError {
    AppError::new(codes::CONFIG_INVALID, message).with_details(format!("value={value}"))
}

fn parse_into<T, G>(get: &G, name: &str, slot: &mut T) -> Result<(), AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(name) {
        *slot = raw.parse::<T>().map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, format!("Invalid value for {name}"))
                .with_details(format!("value={raw}; err={e}"))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::from_lookup(lookup(&[])).expect("settings");
        assert_eq!(s.retrieval.similarity_threshold, 0.5);
        assert_eq!(s.retrieval.number_of_chunks, 3);
        assert_eq!(s.chunking.chunk_size, 1000);
        assert_eq!(s.chunking.chunk_overlap, 200);
        assert_eq!(s.conversation.max_history_length, 5);
        assert_eq!(s.provider.api_key, None);
        assert_eq!(s.storage.kb_cache_capacity, DEFAULT_KB_CACHE_CAPACITY);
    }

    #[test]
    fn cache_capacity_is_read_and_may_be_zero() {
        let s = Settings::from_lookup(lookup(&[("KB_CACHE_CAPACITY", "0")])).expect("settings");
        assert_eq!(s.storage.kb_cache_capacity, 0);
        let err = Settings::from_lookup(lookup(&[("KB_CACHE_CAPACITY", "-1")])).expect_err("invalid");
        assert!(err.message.contains("KB_CACHE_CAPACITY"));
    }

    #[test]
    fn openrouter_url_applies_to_embeddings_unless_overridden() {
        let s = Settings::from_lookup(lookup(&[("OPENROUTER_URL", "https://llm.example/v1")]))
            .expect("settings");
        assert_eq!(s.provider.embedding_base_url, "https://llm.example/v1");

        let s = Settings::from_lookup(lookup(&[
            ("OPENROUTER_URL", "https://llm.example/v1"),
            ("EMBEDDING_URL", "http://127.0.0.1:8080"),
        ]))
        .expect("settings");
        assert_eq!(s.provider.llm_base_url, "https://llm.example/v1");
        assert_eq!(s.provider.embedding_base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn rejects_unparseable_numbers_with_variable_name() {
        let err = Settings::from_lookup(lookup(&[("CHUNK_SIZE", "big")])).expect_err("invalid");
        assert_eq!(err.code, codes::CONFIG_INVALID);
        assert!(err.message.contains("CHUNK_SIZE"));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = Settings::from_lookup(lookup(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]))
            .expect_err("invalid");
        assert_eq!(err.code, codes::CONFIG_INVALID);
    }

    #[test]
    fn rejects_threshold_outside_cosine_range() {
        assert!(Settings::from_lookup(lookup(&[("SIMILARITY_THRESHOLD", "1.5")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("SIMILARITY_THRESHOLD", "-0.2")])).is_ok());
    }
}
