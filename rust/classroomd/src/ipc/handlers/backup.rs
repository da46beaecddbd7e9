use crate::backup::{self, BackupDocument};
use crate::db;
use crate::ipc::error::ok;
use crate::ipc::handlers::setup::{load_teacher_info, save_teacher_info};
use crate::ipc::helpers::{get_required_str, no_workspace, require_confirm, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::tools::ToolRegistry;
use serde_json::json;
use std::path::PathBuf;

fn backup_export(session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let doc = BackupDocument::new(
        session.roster.students().to_vec(),
        session.roster.classes(),
        load_teacher_info(&session.conn),
        session.tools.tools().to_vec(),
    );
    let summary = backup::write_backup(&doc, &out_path)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
    tracing::info!(
        path = %out_path.to_string_lossy(),
        format = %summary.format,
        students = summary.student_count,
        "backup exported"
    );
    Ok(json!({ "path": out_path.to_string_lossy(), "summary": summary }))
}

fn backup_preview(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);
    let preview = backup::preview_backup(&in_path)?;
    Ok(json!(preview))
}

/// All-or-nothing: the document is fully decoded before anything is replaced.
fn backup_restore(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);
    require_confirm(params, "backup.restore")?;
    let (doc, format) = backup::read_backup(&in_path)?;

    let student_count = doc.students.len();
    let tools_restored = doc.assessment_tools.is_some();
    let teacher_restored = doc.teacher_info.is_some();

    session.roster.replace_all(doc.students, doc.classes);
    session.persist_roster();
    if let Some(tools) = doc.assessment_tools {
        session.tools = ToolRegistry::from_tools(tools);
        session.persist_tools();
    }
    if let Some(info) = doc.teacher_info.as_ref() {
        save_teacher_info(&session.conn, info);
    }
    tracing::info!(
        path = %in_path.to_string_lossy(),
        format = %format,
        students = student_count,
        tools_restored,
        "backup restored"
    );
    Ok(json!({
        "format": format,
        "students": student_count,
        "classes": session.roster.classes().len(),
        "toolsRestored": tools_restored,
        "teacherInfoRestored": teacher_restored,
    }))
}

/// Drops every stored collection and starts over with the stock tools.
fn data_wipe(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_confirm(params, "data.wipe")?;
    let removed = db::kv_clear(&session.conn)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    session.roster.clear();
    session.tools = ToolRegistry::with_defaults();
    session.persist_tools();
    tracing::warn!(keys = removed, "workspace data wiped");
    Ok(json!({ "wiped": true }))
}

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    match backup_export(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_backup_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.session.is_none() {
        return no_workspace(&req.id);
    }
    match backup_preview(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_backup_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match backup_restore(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_data_wipe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match data_wipe(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.preview" => Some(handle_backup_preview(state, req)),
        "backup.restore" => Some(handle_backup_restore(state, req)),
        "data.wipe" => Some(handle_data_wipe(state, req)),
        _ => None,
    }
}
