use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, get_required_str, no_workspace, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::ledger;
use crate::model::{parse_day, today, AttendanceStatus};
use serde_json::json;

fn get_day(params: &serde_json::Value, required: bool) -> Result<String, HandlerErr> {
    let raw = if required {
        get_required_str(params, "date")?
    } else {
        match get_optional_str(params, "date") {
            Some(d) => d,
            None => return Ok(today()),
        }
    };
    parse_day(&raw).ok_or_else(|| {
        HandlerErr::bad_params("date must be YYYY-MM-DD").with_details(json!({ "date": raw }))
    })
}

fn attendance_set(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let date = get_day(params, true)?;
    let raw_status = get_required_str(params, "status")?;
    let status = AttendanceStatus::parse(&raw_status).ok_or_else(|| {
        HandlerErr::bad_params("status must be one of: present, absent, late")
            .with_details(json!({ "status": raw_status }))
    })?;
    session.roster.update(&student_id, |s| {
        ledger::set_attendance(s, &date, status);
        Ok::<(), HandlerErr>(())
    })??;
    session.persist_roster();
    Ok(json!({ "studentId": student_id, "date": date, "status": status }))
}

fn attendance_clear(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let date = get_day(params, true)?;
    let removed = session
        .roster
        .update(&student_id, |s| Ok::<bool, HandlerErr>(ledger::clear_attendance(s, &date)))??;
    if removed {
        session.persist_roster();
    }
    Ok(json!({ "removed": removed }))
}

fn attendance_day(session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_day(params, false)?;
    let class_name = get_optional_str(params, "className");
    let rows: Vec<serde_json::Value> = session
        .roster
        .list(class_name.as_deref(), None)
        .into_iter()
        .map(|s| {
            json!({
                "studentId": s.id,
                "name": s.name,
                "status": ledger::attendance_on(s, &date),
            })
        })
        .collect();
    Ok(json!({ "date": date, "students": rows }))
}

fn handle_attendance_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match attendance_set(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match attendance_clear(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_day(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    match attendance_day(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.set" => Some(handle_attendance_set(state, req)),
        "attendance.clear" => Some(handle_attendance_clear(state, req)),
        "attendance.day" => Some(handle_attendance_day(state, req)),
        _ => None,
    }
}
