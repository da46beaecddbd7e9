use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, get_required_str, no_workspace, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::model::{parse_day, today, Student};
use crate::reports;
use serde_json::json;
use std::path::PathBuf;

fn find_student<'a>(session: &'a Session, params: &serde_json::Value) -> Result<&'a Student, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    session
        .roster
        .get(&student_id)
        .ok_or_else(|| HandlerErr::new("not_found", "student not found").with_details(json!({ "studentId": student_id })))
}

fn reports_student_model(session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student = find_student(session, params)?;
    Ok(json!(reports::student_report(student, &session.tools)))
}

fn reports_class_model(session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_required_str(params, "className")?;
    let students = session.roster.list(Some(class_name.trim()), None);
    Ok(json!(reports::class_report(class_name.trim(), students)))
}

fn reports_export_student_csv(session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student = find_student(session, params)?;
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let rows = reports::write_student_grades_csv(student, &out_path)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
    Ok(json!({ "path": out_path.to_string_lossy(), "rowsExported": rows }))
}

fn stats_dashboard(session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = match get_optional_str(params, "date") {
        Some(raw) => parse_day(&raw).ok_or_else(|| HandlerErr::bad_params("date must be YYYY-MM-DD"))?,
        None => today(),
    };
    let stats = reports::dashboard(
        session.roster.students(),
        session.roster.classes().len(),
        &date,
    );
    Ok(json!(stats))
}

fn respond(
    state: &AppState,
    req: &Request,
    f: fn(&Session, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    match f(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentModel" => Some(respond(state, req, reports_student_model)),
        "reports.classModel" => Some(respond(state, req, reports_class_model)),
        "reports.exportStudentCsv" => Some(respond(state, req, reports_export_student_csv)),
        "stats.dashboard" => Some(respond(state, req, stats_dashboard)),
        _ => None,
    }
}
