use crate::ingest::{self, GradeImportOptions, Grid};
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, get_required_str, get_semester, no_workspace, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::roster::GradeMergePolicy;
use serde_json::json;
use std::path::PathBuf;

/// Grid from inline `rows`, or read from the CSV file at `path`.
fn load_grid(params: &serde_json::Value) -> Result<Grid, HandlerErr> {
    if let Some(rows) = params.get("rows") {
        return ingest::grid_from_json(rows)
            .ok_or_else(|| HandlerErr::bad_params("rows must be an array of arrays"));
    }
    let Some(path) = params.get("path").and_then(|v| v.as_str()).map(PathBuf::from) else {
        return Err(HandlerErr::bad_params("missing rows or path"));
    };
    ingest::load_csv(&path).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })
}

fn import_inspect(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let grid = load_grid(params)?;
    let inspection = ingest::inspect(&grid)?;
    Ok(json!(inspection))
}

fn import_students(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_required_str(params, "className")?;
    let class_name = class_name.trim().to_string();
    if class_name.is_empty() {
        return Err(HandlerErr::bad_params("className must not be empty"));
    }
    let grid = load_grid(params)?;
    let out = ingest::import_students(&grid, &class_name).map_err(|e| {
        tracing::info!(code = e.code(), "student import produced nothing");
        HandlerErr::from(e)
    })?;

    let student_ids: Vec<String> = out.students.iter().map(|s| s.id.clone()).collect();
    session.roster.add_class(&class_name);
    let imported = session.roster.merge_imported(out.students);
    session.persist_roster();
    tracing::info!(
        class = %class_name,
        imported,
        skipped = out.rows_skipped,
        name_rule = ?out.resolution.name.rule,
        "students imported"
    );
    Ok(json!({
        "imported": imported,
        "rowsTotal": out.rows_total,
        "rowsSkipped": out.rows_skipped,
        "studentIds": student_ids,
        "columns": out.resolution,
    }))
}

fn import_grades(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let semester = get_semester(params)?.unwrap_or_default();
    let class_name = get_optional_str(params, "className");
    let policy = match get_optional_str(params, "mergePolicy") {
        Some(raw) => GradeMergePolicy::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("mergePolicy must be replace or append")
                .with_details(json!({ "mergePolicy": raw }))
        })?,
        None => GradeMergePolicy::default(),
    };
    let grid = load_grid(params)?;
    let plan = ingest::plan_grade_import(&grid)?;
    let opts = GradeImportOptions {
        semester,
        class_name: class_name.as_deref(),
        policy,
    };
    let summary = ingest::apply_grade_import(&grid, &plan, &mut session.roster, &mut session.tools, &opts);
    session.persist_roster();
    if !summary.tools_created.is_empty() {
        session.persist_tools();
    }
    tracing::info!(
        matched = summary.rows_matched,
        unmatched = summary.rows_unmatched,
        written = summary.grades_written,
        tools_created = summary.tools_created.len(),
        "grades imported"
    );
    Ok(json!({
        "summary": summary,
        "toolColumns": plan.tool_columns,
        "ignoredColumns": plan.ignored_columns,
    }))
}

fn handle_import_inspect(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.session.is_none() {
        return no_workspace(&req.id);
    }
    match import_inspect(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_import_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match import_students(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_import_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match import_grades(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.inspect" => Some(handle_import_inspect(state, req)),
        "import.students" => Some(handle_import_students(state, req)),
        "import.grades" => Some(handle_import_grades(state, req)),
        _ => None,
    }
}
