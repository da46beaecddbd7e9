use crate::ipc::error::ok;
use crate::ipc::helpers::{get_bool, get_required_f64, get_required_str, no_workspace, require_confirm, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::tools::cascade_max_score;
use serde_json::json;

fn tools_list(session: &Session) -> serde_json::Value {
    json!({
        "tools": session.tools.tools(),
        "sumOfCaps": session.tools.sum_of_caps(),
    })
}

fn tools_create(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let max_score = get_required_f64(params, "maxScore")?;
    let tool = session.tools.create(&name, max_score)?;
    session.persist_tools();
    Ok(json!({ "tool": tool, "sumOfCaps": session.tools.sum_of_caps() }))
}

/// Without `cascade`, existing grades keep the cap they were recorded with.
fn tools_update_max_score(
    session: &mut Session,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let tool_id = get_required_str(params, "toolId")?;
    let max_score = get_required_f64(params, "maxScore")?;
    let cascade = get_bool(params, "cascade");

    let tool = session.tools.update_max_score(&tool_id, max_score)?;
    session.persist_tools();

    let mut rewritten = 0usize;
    if cascade {
        rewritten = cascade_max_score(&tool, session.roster.students_mut());
        if rewritten > 0 {
            session.persist_roster();
        }
        tracing::info!(tool = %tool.name, max_score, rewritten, "tool cap cascaded to grades");
    }
    Ok(json!({
        "tool": tool,
        "cascaded": cascade,
        "gradesRewritten": rewritten,
        "sumOfCaps": session.tools.sum_of_caps(),
    }))
}

fn tools_delete(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let tool_id = get_required_str(params, "toolId")?;
    require_confirm(params, "tools.delete")?;
    let removed = session.tools.delete(&tool_id)?;
    session.persist_tools();
    tracing::info!(tool = %removed.name, "tool deleted; recorded grades kept");
    Ok(json!({ "deleted": removed.id, "sumOfCaps": session.tools.sum_of_caps() }))
}

fn handle_tools_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    ok(&req.id, tools_list(session))
}

fn handle_tools_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match tools_create(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_tools_update_max_score(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match tools_update_max_score(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_tools_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match tools_delete(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tools.list" => Some(handle_tools_list(state, req)),
        "tools.create" => Some(handle_tools_create(state, req)),
        "tools.updateMaxScore" => Some(handle_tools_update_max_score(state, req)),
        "tools.delete" => Some(handle_tools_delete(state, req)),
        _ => None,
    }
}
