use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::model::{AssessmentTool, Student};
use crate::roster::Roster;
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything loaded for one open workspace.
pub struct Session {
    pub conn: Connection,
    pub roster: Roster,
    pub tools: ToolRegistry,
}

impl Session {
    /// Opens the workspace store and loads each collection independently,
    /// falling back to an empty roster and the stock tool set.
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace)?;
        let students: Vec<Student> = db::kv_load(&conn, db::KEY_STUDENTS).unwrap_or_default();
        let classes: Vec<String> = db::kv_load(&conn, db::KEY_CLASSES).unwrap_or_default();
        let stored_tools: Option<Vec<AssessmentTool>> = db::kv_load(&conn, db::KEY_TOOLS);

        let session = Self {
            roster: Roster::new(students, classes),
            tools: stored_tools
                .map(ToolRegistry::from_tools)
                .unwrap_or_else(ToolRegistry::with_defaults),
            conn,
        };
        if stored_tools_missing(&session.conn) {
            session.persist_tools();
        }
        tracing::info!(
            workspace = %workspace.to_string_lossy(),
            students = session.roster.students().len(),
            tools = session.tools.tools().len(),
            "workspace opened"
        );
        Ok(session)
    }

    pub fn persist_roster(&self) {
        persist(&self.conn, db::KEY_STUDENTS, self.roster.students());
        persist(&self.conn, db::KEY_CLASSES, &self.roster.classes());
    }

    pub fn persist_tools(&self) {
        persist(&self.conn, db::KEY_TOOLS, &self.tools);
    }
}

fn stored_tools_missing(conn: &Connection) -> bool {
    matches!(db::kv_get_json(conn, db::KEY_TOOLS), Ok(None))
}

/// Write-through after a mutation. The in-memory state stays authoritative
/// when the write fails.
fn persist<T: Serialize + ?Sized>(conn: &Connection, key: &str, value: &T) {
    if let Err(e) = db::kv_put(conn, key, value) {
        tracing::warn!(key, error = %e, "failed to persist collection");
    }
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub session: Option<Session>,
}
