use std::path::Path;

use rusqlite::Connection;

use crate::error::{codes, AppError};

/// Schema revision recorded in SQLite's `user_version` header field.
pub const SCHEMA_VERSION: i64 = 1;

const SESSIONS_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../migrations/0001_sessions.sql"
));

pub fn open(path: &Path) -> Result<Connection, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new(codes::DB_OPEN_FAILED, "Failed to create database directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }
    Connection::open(path).map_err(|e| {
        AppError::new(codes::DB_OPEN_FAILED, "Failed to open SQLite database")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(|e| {
        AppError::new(codes::DB_OPEN_FAILED, "Failed to open in-memory SQLite database")
            .with_details(e.to_string())
    })
}

/// Creates the session tables on a fresh database. A database written by a newer
/// build is refused rather than guessed at.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    let current = schema_version(conn)?;
    if current == SCHEMA_VERSION {
        return Ok(());
    }
    if current > SCHEMA_VERSION {
        return Err(AppError::new(
            codes::DB_MIGRATION_FAILED,
            "Session database was created by a newer version",
        )
        .with_details(format!("found={current}; supported={SCHEMA_VERSION}")));
    }

    let tx = conn.transaction().map_err(|e| {
        AppError::new(codes::DB_MIGRATION_FAILED, "Failed to start schema transaction")
            .with_details(e.to_string())
    })?;
    tx.execute_batch(SESSIONS_SCHEMA).map_err(|e| {
        AppError::new(codes::DB_MIGRATION_FAILED, "Failed to create session tables")
            .with_details(e.to_string())
    })?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| {
            AppError::new(codes::DB_MIGRATION_FAILED, "Failed to record schema version")
                .with_details(e.to_string())
        })?;
    tx.commit().map_err(|e| {
        AppError::new(codes::DB_MIGRATION_FAILED, "Failed to commit schema transaction")
            .with_details(e.to_string())
    })?;
    tracing::debug!(from = current, to = SCHEMA_VERSION, "session schema applied");
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i64, AppError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| {
            AppError::new(codes::DB_MIGRATION_FAILED, "Failed to read schema version")
                .with_details(e.to_string())
        })
}
