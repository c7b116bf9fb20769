use tutor_core::config::ChunkingSettings;
use tutor_core::domain::{DocumentChunk, RawDocument};
use tutor_core::error::{codes, AppError};

/// Splits documents into overlapping character windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, AppError> {
        if chunk_size == 0 {
            return Err(AppError::new(codes::CONFIG_INVALID, "Chunk size must be at least 1"));
        }
        if chunk_overlap >= chunk_size {
            return Err(AppError::new(
                codes::CONFIG_INVALID,
                "Chunk overlap must be smaller than chunk size",
            )
            .with_details(format!("chunk_size={chunk_size}; chunk_overlap={chunk_overlap}")));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self, AppError> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    /// Chunks come out in document order, then window order within each document.
    pub fn split(&self, documents: &[RawDocument]) -> Vec<DocumentChunk> {
        let mut out = Vec::new();
        for doc in documents {
            for window in self.windows(&doc.text) {
                out.push(DocumentChunk::new(
                    window,
                    doc.source_id.clone(),
                    doc.extra_metadata.clone(),
                ));
            }
        }
        out
    }

    fn windows(&self, text: &str) -> Vec<String> {
        let normalized = normalize_text(text);
        let chars: Vec<char> = normalized.chars().collect();
        let n = chars.len();
        let mut out = Vec::new();

        if n <= self.chunk_size {
            let t = normalized.trim();
            if !t.is_empty() {
                out.push(t.to_string());
            }
            return out;
        }

        // Starts advance by a fixed stride; the whitespace back-off only shortens a window.
        let step = self.chunk_size - self.chunk_overlap;
        let mut start = 0usize;
        loop {
            let mut end = (start + self.chunk_size).min(n);
            if end < n {
                // Prefer ending on whitespace, but never before the next window starts.
                let floor = start + (self.chunk_size / 2).max(step);
                if let Some(ws) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                    end = ws + 1;
                }
            }

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() && out.last().map(String::as_str) != Some(piece) {
                out.push(piece.to_string());
            }
            if end >= n {
                break;
            }
            start += step;
        }
        out
    }
}

pub(crate) fn normalize_text(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(chunks: &[DocumentChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text()).collect()
    }

    #[test]
    fn short_document_yields_single_chunk() {
        let chunker = Chunker::new(100, 10).expect("chunker");
        let doc = RawDocument::new("geo.txt", "Paris is the capital of France.")
            .with_metadata("file_name", "geo.txt");
        let chunks = chunker.split(&[doc]);
        assert_eq!(texts(&chunks), vec!["Paris is the capital of France."]);
        assert_eq!(chunks[0].source_id(), "geo.txt");
        assert_eq!(
            chunks[0].extra_metadata().get("file_name").map(String::as_str),
            Some("geo.txt")
        );
    }

    #[test]
    fn windows_share_overlap_without_whitespace() {
        let chunker = Chunker::new(4, 1).expect("chunker");
        let chunks = chunker.split(&[RawDocument::new("a", "abcdefghij")]);
        assert_eq!(texts(&chunks), vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn prefers_word_boundaries() {
        let chunker = Chunker::new(12, 4).expect("chunker");
        let chunks = chunker.split(&[RawDocument::new("a", "alpha beta gamma delta epsilon")]);
        for c in &chunks {
            assert!(c.text().chars().count() <= 12, "chunk too long: {:?}", c.text());
            assert!(!c.text().is_empty());
        }
        assert_eq!(
            texts(&chunks),
            vec!["alpha beta", "ta gamma", "delta epsil", "psilon"]
        );
    }

    #[test]
    fn high_overlap_keeps_a_fixed_stride() {
        let text = (0..60).map(|i| format!("w{i:02}")).collect::<Vec<_>>().join(" ");
        assert_eq!(text.chars().count(), 239);
        let chunker = Chunker::new(10, 8).expect("chunker");
        let chunks = chunker.split(&[RawDocument::new("w", text.as_str())]);

        // At most one window per two-character step.
        assert_eq!(chunks.len(), 116);
        let distinct: std::collections::HashSet<&str> = chunks.iter().map(|c| c.text()).collect();
        assert_eq!(distinct.len(), chunks.len());
        assert!(chunks.iter().all(|c| c.text().chars().count() <= 10));
        assert_eq!(chunks.first().map(|c| c.text()), Some("w00 w01"));
        assert!(chunks.last().map(|c| c.text().ends_with("w59")).unwrap_or(false));

        let repeated = chunker.split(&[RawDocument::new("a", "aaaaa ".repeat(20).as_str())]);
        assert!(repeated.len() <= 60, "got {} windows", repeated.len());
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunker = Chunker::new(3, 1).expect("chunker");
        let chunks = chunker.split(&[RawDocument::new("u", "ééèèê")]);
        assert_eq!(texts(&chunks), vec!["ééè", "èèê"]);
    }

    #[test]
    fn blank_documents_yield_nothing_and_order_is_preserved() {
        let chunker = Chunker::new(50, 5).expect("chunker");
        let chunks = chunker.split(&[
            RawDocument::new("first", "one"),
            RawDocument::new("blank", " \r\n\t "),
            RawDocument::new("second", "two"),
        ]);
        let sources: Vec<&str> = chunks.iter().map(|c| c.source_id()).collect();
        assert_eq!(sources, vec!["first", "second"]);
    }

    #[test]
    fn rejects_overlap_at_or_above_size() {
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 9).is_ok());
    }
}
