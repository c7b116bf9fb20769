use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::ConversationSession;
use crate::error::{codes, AppError};

/// Key-value persistence for conversation sessions between requests.
///
/// The chat engine never touches this; it is a convenience for callers that do not
/// already have a session store. Concurrent requests for one key must be serialized
/// by the caller.
pub struct SqliteSessionStore {
    conn: Connection,
}

impl SqliteSessionStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let mut conn = crate::db::open(path)?;
        crate::db::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let mut conn = crate::db::open_in_memory()?;
        crate::db::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<ConversationSession>, AppError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM conversation_sessions WHERE session_key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| {
                AppError::new(codes::SESSION_STORE_FAILED, "Failed to read session")
                    .with_details(format!("key={key}; err={e}"))
            })?;

        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                AppError::new(codes::SESSION_STORE_FAILED, "Failed to decode session")
                    .with_details(format!("key={key}; err={e}"))
            }),
        }
    }

    pub fn put(&self, key: &str, session: &ConversationSession) -> Result<(), AppError> {
        let json = serde_json::to_string(session).map_err(|e| {
            AppError::new(codes::SESSION_STORE_FAILED, "Failed to encode session")
                .with_details(e.to_string())
        })?;
        let now = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| {
            AppError::new(codes::SESSION_STORE_FAILED, "Failed to format time")
                .with_details(e.to_string())
        })?;
        self.conn
            .execute(
                r#"INSERT INTO conversation_sessions(session_key, subject_id, payload_json, updated_at)
                   VALUES (?1, ?2, ?3, ?4)
                   ON CONFLICT(session_key) DO UPDATE SET
                     subject_id = excluded.subject_id,
                     payload_json = excluded.payload_json,
                     updated_at = excluded.updated_at"#,
                params![key, session.subject_id, json, now],
            )
            .map_err(|e| {
                AppError::new(codes::SESSION_STORE_FAILED, "Failed to write session")
                    .with_details(format!("key={key}; err={e}"))
            })?;
        Ok(())
    }

    /// Returns whether a session was stored under `key`.
    pub fn delete(&self, key: &str) -> Result<bool, AppError> {
        let n = self
            .conn
            .execute("DELETE FROM conversation_sessions WHERE session_key = ?1", [key])
            .map_err(|e| {
                AppError::new(codes::SESSION_STORE_FAILED, "Failed to delete session")
                    .with_details(format!("key={key}; err={e}"))
            })?;
        Ok(n > 0)
    }

    /// Removes every session bound to a subject, e.g. after its knowledge base is deleted.
    pub fn delete_for_subject(&self, subject_id: i64) -> Result<usize, AppError> {
        self.conn
            .execute(
                "DELETE FROM conversation_sessions WHERE subject_id = ?1",
                [subject_id],
            )
            .map_err(|e| {
                AppError::new(codes::SESSION_STORE_FAILED, "Failed to delete subject sessions")
                    .with_details(format!("subject_id={subject_id}; err={e}"))
            })
    }

    pub fn list_keys(&self, subject_id: i64) -> Result<Vec<String>, AppError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT session_key FROM conversation_sessions WHERE subject_id = ?1 ORDER BY session_key",
            )
            .map_err(|e| {
                AppError::new(codes::SESSION_STORE_FAILED, "Failed to list sessions")
                    .with_details(e.to_string())
            })?;
        let rows = stmt
            .query_map([subject_id], |row| row.get::<_, String>(0))
            .map_err(|e| {
                AppError::new(codes::SESSION_STORE_FAILED, "Failed to list sessions")
                    .with_details(e.to_string())
            })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(|e| {
                AppError::new(codes::SESSION_STORE_FAILED, "Failed to read session row")
                    .with_details(e.to_string())
            })?);
        }
        Ok(out)
    }
}
