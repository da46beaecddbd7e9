use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, get_semester, no_workspace, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::ledger;
use crate::model::BehaviorType;
use serde_json::json;

fn behaviors_log(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let raw_type = get_required_str(params, "type")?;
    let kind = BehaviorType::parse(&raw_type).ok_or_else(|| {
        HandlerErr::bad_params("type must be positive or negative")
            .with_details(json!({ "type": raw_type }))
    })?;
    let description = get_required_str(params, "description")?;
    let points = match params.get("points") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| HandlerErr::bad_params("points must be an integer"))?,
        ),
    };
    let semester = get_semester(params)?;

    let record = session.roster.update(&student_id, |s| {
        ledger::log_behavior(s, kind, &description, points, semester)
    })??;
    session.persist_roster();
    Ok(json!({ "behavior": record }))
}

fn behaviors_delete(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let behavior_id = get_required_str(params, "behaviorId")?;
    session
        .roster
        .update(&student_id, |s| ledger::delete_behavior(s, &behavior_id))??;
    session.persist_roster();
    Ok(json!({ "deleted": behavior_id }))
}

fn handle_behaviors_log(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match behaviors_log(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_behaviors_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match behaviors_delete(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "behaviors.log" => Some(handle_behaviors_log(state, req)),
        "behaviors.delete" => Some(handle_behaviors_delete(state, req)),
        _ => None,
    }
}
