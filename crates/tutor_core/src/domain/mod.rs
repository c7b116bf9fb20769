use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Source label used when a document origin did not supply one.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Maximum number of entities remembered for pronoun disambiguation.
pub const ENTITY_BUFFER_CAPACITY: usize = 5;

/// Identifies one knowledge base: a subject owned by a professor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantKey {
    pub professor_id: i64,
    pub subject_id: i64,
}

impl TenantKey {
    pub fn new(professor_id: i64, subject_id: i64) -> Self {
        Self {
            professor_id,
            subject_id,
        }
    }

    pub fn professor_dir_name(&self) -> String {
        format!("professor_{}", self.professor_id)
    }

    pub fn subject_dir_name(&self) -> String {
        format!("subject_{}", self.subject_id)
    }

    /// Directory holding this tenant's artifacts. Depends on nothing but the key,
    /// so two tenants can never share a directory.
    pub fn storage_dir(&self, root: &Path) -> PathBuf {
        root.join(self.professor_dir_name())
            .join(self.subject_dir_name())
    }

    /// Inverse of the directory naming above. Returns `None` for foreign directories.
    pub fn from_dir_names(professor_dir: &str, subject_dir: &str) -> Option<Self> {
        let professor_id = professor_dir.strip_prefix("professor_")?.parse().ok()?;
        let subject_id = subject_dir.strip_prefix("subject_")?.parse().ok()?;
        Some(Self {
            professor_id,
            subject_id,
        })
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "professor={} subject={}", self.professor_id, self.subject_id)
    }
}

/// A loaded source file before chunking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawDocument {
    pub text: String,
    pub source_id: String,
    #[serde(default)]
    pub extra_metadata: BTreeMap<String, String>,
}

impl RawDocument {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            extra_metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_metadata.insert(key.into(), value.into());
        self
    }
}

/// A bounded span of source text with provenance. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentChunk {
    text: String,
    source_id: String,
    #[serde(default)]
    extra_metadata: BTreeMap<String, String>,
}

impl DocumentChunk {
    pub fn new(
        text: impl Into<String>,
        source_id: impl Into<String>,
        extra_metadata: BTreeMap<String, String>,
    ) -> Self {
        let source_id = source_id.into();
        let source_id = if source_id.trim().is_empty() {
            UNKNOWN_SOURCE.to_string()
        } else {
            source_id
        };
        Self {
            text: text.into(),
            source_id,
            extra_metadata,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Always non-empty; artifacts written before the fallback existed are patched here too.
    pub fn source_id(&self) -> &str {
        if self.source_id.trim().is_empty() {
            UNKNOWN_SOURCE
        } else {
            &self.source_id
        }
    }

    pub fn extra_metadata(&self) -> &BTreeMap<String, String> {
        &self.extra_metadata
    }
}

/// One question/answer turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exchange {
    pub question: String,
    pub response: String,
    pub sources: Vec<String>,
    pub entities: Vec<String>,
}

/// Recency-ordered set of recently mentioned entities, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EntityBuffer {
    entries: VecDeque<String>,
}

impl EntityBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records entities in mention order. A repeated mention counts as the most recent;
    /// the oldest entries fall out once capacity is exceeded.
    pub fn merge<I, S>(&mut self, entities: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for e in entities {
            let e = e.as_ref().trim();
            if e.is_empty() {
                continue;
            }
            self.entries.retain(|x| x != e);
            self.entries.push_back(e.to_string());
        }
        while self.entries.len() > ENTITY_BUFFER_CAPACITY {
            self.entries.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn joined(&self) -> String {
        self.snapshot().join(" ")
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Conversation state for one student and one subject.
///
/// The engine receives this by value and hands back the updated value; persisting it
/// between requests is the caller's job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSession {
    pub subject_id: i64,
    pub subject_name: String,
    #[serde(default)]
    history: Vec<Exchange>,
    #[serde(default)]
    entity_buffer: EntityBuffer,
}

impl ConversationSession {
    pub fn new(subject_id: i64, subject_name: impl Into<String>) -> Self {
        Self {
            subject_id,
            subject_name: subject_name.into(),
            history: Vec::new(),
            entity_buffer: EntityBuffer::new(),
        }
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    pub fn entity_buffer(&self) -> &EntityBuffer {
        &self.entity_buffer
    }

    pub fn entity_buffer_mut(&mut self) -> &mut EntityBuffer {
        &mut self.entity_buffer
    }

    pub fn push_exchange(&mut self, exchange: Exchange) {
        self.history.push(exchange);
    }

    /// Clears history and remembered entities; the subject binding is kept.
    pub fn reset(&mut self) {
        self.history.clear();
        self.entity_buffer.clear();
    }
}

/// Storage key callers use for a subject's conversation.
pub fn session_key(subject_id: i64) -> String {
    format!("chat_history_{subject_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tenant_dirs_round_trip() {
        let key = TenantKey::new(7, 42);
        let dir = key.storage_dir(Path::new("/data"));
        assert_eq!(dir, PathBuf::from("/data/professor_7/subject_42"));
        assert_eq!(
            TenantKey::from_dir_names("professor_7", "subject_42"),
            Some(key)
        );
        assert_eq!(TenantKey::from_dir_names("professor_x", "subject_42"), None);
        assert_eq!(TenantKey::from_dir_names("prof_7", "subject_42"), None);
    }

    #[test]
    fn chunk_without_source_is_attributed_to_unknown() {
        let chunk = DocumentChunk::new("text", "  ", BTreeMap::new());
        assert_eq!(chunk.source_id(), UNKNOWN_SOURCE);
    }

    #[test]
    fn entity_buffer_evicts_oldest_and_refreshes_repeats() {
        let mut buf = EntityBuffer::new();
        buf.merge(["A", "B", "C", "D", "E"]);
        buf.merge(["B"]);
        assert_eq!(buf.snapshot(), vec!["A", "C", "D", "E", "B"]);

        buf.merge(["F", "G"]);
        assert_eq!(buf.len(), ENTITY_BUFFER_CAPACITY);
        assert_eq!(buf.snapshot(), vec!["D", "E", "B", "F", "G"]);
    }

    #[test]
    fn reset_keeps_subject_binding() {
        let mut s = ConversationSession::new(3, "Physics");
        s.entity_buffer_mut().merge(["Newton"]);
        s.push_exchange(Exchange {
            question: "q".to_string(),
            response: "r".to_string(),
            sources: vec![],
            entities: vec![],
        });
        s.reset();
        assert!(s.history().is_empty());
        assert!(s.entity_buffer().is_empty());
        assert_eq!(s.subject_id, 3);
        assert_eq!(s.subject_name, "Physics");
    }

    #[test]
    fn session_serializes_buffer_as_plain_list() {
        let mut s = ConversationSession::new(1, "Math");
        s.entity_buffer_mut().merge(["Euler"]);
        let v = serde_json::to_value(&s).expect("encode");
        assert_eq!(v["entity_buffer"], serde_json::json!(["Euler"]));
        let back: ConversationSession = serde_json::from_value(v).expect("decode");
        assert_eq!(back, s);
    }
}
