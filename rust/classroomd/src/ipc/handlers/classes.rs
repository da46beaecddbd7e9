use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, no_workspace, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use serde_json::json;

fn classes_list(session: &Session) -> serde_json::Value {
    let classes: Vec<serde_json::Value> = session
        .roster
        .classes()
        .into_iter()
        .map(|name| {
            let count = session.roster.list(Some(&name), None).len();
            json!({ "name": name, "studentCount": count })
        })
        .collect();
    json!({ "classes": classes })
}

fn classes_create(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let name = name.trim();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("class name must not be empty"));
    }
    let created = session.roster.add_class(name);
    if created {
        session.persist_roster();
    }
    Ok(json!({ "name": name, "created": created }))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    ok(&req.id, classes_list(session))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match classes_create(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        _ => None,
    }
}
