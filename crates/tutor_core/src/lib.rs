pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod session_store;

#[cfg(test)]
mod tests {
    use super::error::{codes, AppError};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new(codes::KB_BUILD_FAILED, "build failed")
            .with_details("chunk=3")
            .with_retryable(true);
        assert_eq!(err.code, "KB_BUILD_FAILED");
        assert_eq!(err.message, "build failed");
        assert!(err.retryable);
        assert!(err.is(codes::KB_BUILD_FAILED));
        assert_eq!(err.to_string(), "[KB_BUILD_FAILED] build failed (chunk=3)");
    }

    #[test]
    fn ingest_codes_are_spelled_as_reported() {
        let all = [
            codes::INGEST_NO_CONTENT,
            codes::INGEST_SOURCE_UNAVAILABLE,
            codes::INGEST_FILE_NOT_FOUND,
            codes::INGEST_FILE_UNREADABLE,
            codes::INGEST_FILE_EMPTY,
            codes::INGEST_UNSUPPORTED_FORMAT,
            codes::INGEST_PARSE_FAILED,
            codes::INGEST_TRANSFER_FAILED,
        ];
        assert_eq!(codes::INGEST_TRANSFER_FAILED, "INGEST_TRANSFER_FAILED");
        assert_eq!(codes::INGEST_UNSUPPORTED_FORMAT, "INGEST_UNSUPPORTED_FORMAT");
        let unique: std::collections::HashSet<&str> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len());
        assert!(all.iter().all(|c| c.starts_with("INGEST_")));
    }
}
