use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub const DB_FILE: &str = "classroom.sqlite3";

pub const KEY_STUDENTS: &str = "roster.students";
pub const KEY_CLASSES: &str = "roster.classes";
pub const KEY_TOOLS: &str = "tools.registry";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(conn)
}

pub fn kv_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM kv WHERE key = ?", [key], |r| r.get(0))
        .optional()?;
    match raw {
        Some(text) => {
            let v = serde_json::from_str(&text)
                .with_context(|| format!("stored value for {} is not valid JSON", key))?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

pub fn kv_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO kv(key, value_json, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json,
                                        updated_at = excluded.updated_at",
        (key, serde_json::to_string(value)?, crate::model::now_timestamp()),
    )?;
    Ok(())
}

pub fn kv_clear(conn: &Connection) -> anyhow::Result<usize> {
    Ok(conn.execute("DELETE FROM kv", [])?)
}

pub fn kv_put<T: Serialize + ?Sized>(conn: &Connection, key: &str, value: &T) -> anyhow::Result<()> {
    let v = serde_json::to_value(value).with_context(|| format!("failed to encode {}", key))?;
    kv_set_json(conn, key, &v)
}

/// Typed read with fallback. A missing key gives `None`; an unreadable or
/// mistyped value is logged and also treated as missing.
pub fn kv_load<T: DeserializeOwned>(conn: &Connection, key: &str) -> Option<T> {
    let value = match kv_get_json(conn, key) {
        Ok(v) => v?,
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring unreadable stored value");
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring stored value with unexpected shape");
            None
        }
    }
}
