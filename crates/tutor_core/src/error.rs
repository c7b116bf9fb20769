use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape shared by ingestion, the knowledge base and the chat engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(d) = self.details.as_deref() {
            write!(f, " ({d})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

/// Stable error codes. Callers match on these, so never rename one.
pub mod codes {
    // Ingestion: only raised when no file produced any content.
    pub const INGEST_NO_CONTENT: &str = "INGEST_NO_CONTENT";
    pub const INGEST_SOURCE_UNAVAILABLE: &str = "INGEST_SOURCE_UNAVAILABLE";
    // Per-file ingestion failures. These land in the skip report, not in a returned error.
    pub const INGEST_FILE_NOT_FOUND: &str = "INGEST_FILE_NOT_FOUND";
    pub const INGEST_FILE_UNREADABLE: &str = "INGEST_FILE_UNREADABLE";
    pub const INGEST_FILE_EMPTY: &str = "INGEST_FILE_EMPTY";
    pub const INGEST_UNSUPPORTED_FORMAT: &str = "INGEST_UNSUPPORTED_FORMAT";
    pub const INGEST_PARSE_FAILED: &str = "INGEST_PARSE_FAILED";
    pub const INGEST_TRANSFER_FAILED: &str = "INGEST_TRANSFER_FAILED";

    pub const AI_EMBEDDING_FAILED: &str = "AI_EMBEDDING_FAILED";
    pub const AI_EMBEDDING_TIMEOUT: &str = "AI_EMBEDDING_TIMEOUT";
    pub const AI_GENERATION_FAILED: &str = "AI_GENERATION_FAILED";
    pub const AI_GENERATION_TIMEOUT: &str = "AI_GENERATION_TIMEOUT";
    pub const AI_RETRIEVAL_FAILED: &str = "AI_RETRIEVAL_FAILED";
    pub const AI_REMOTE_NOT_ALLOWED: &str = "AI_REMOTE_NOT_ALLOWED";

    pub const KB_NOT_FOUND: &str = "KB_NOT_FOUND";
    pub const KB_EMPTY: &str = "KB_EMPTY";
    pub const KB_BUILD_FAILED: &str = "KB_BUILD_FAILED";
    pub const KB_LOAD_FAILED: &str = "KB_LOAD_FAILED";
    pub const KB_DELETE_FAILED: &str = "KB_DELETE_FAILED";

    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    pub const CONFIG_MISSING: &str = "CONFIG_MISSING";

    pub const DB_OPEN_FAILED: &str = "DB_OPEN_FAILED";
    pub const DB_MIGRATION_FAILED: &str = "DB_MIGRATION_FAILED";
    pub const SESSION_STORE_FAILED: &str = "SESSION_STORE_FAILED";
}
