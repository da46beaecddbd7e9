use crate::grades::overall_percentage;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, get_required_str, no_workspace, require_confirm, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::model::Student;
use crate::roster::StudentPatch;
use serde_json::json;

fn student_row(s: &Student) -> serde_json::Value {
    json!({
        "id": s.id,
        "name": s.name,
        "grade": s.grade,
        "classes": s.classes,
        "parentPhone": s.parent_phone,
        "percentage": overall_percentage(&s.grades),
        "gradeCount": s.grades.len(),
    })
}

fn string_list(v: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let arr = v
        .as_array()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array of strings", key)))?;
    arr.iter()
        .map(|x| {
            x.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array of strings", key)))
        })
        .collect()
}

fn students_list(session: &Session, params: &serde_json::Value) -> serde_json::Value {
    let class_name = get_optional_str(params, "className");
    let search = get_optional_str(params, "search");
    let rows: Vec<serde_json::Value> = session
        .roster
        .list(class_name.as_deref(), search.as_deref())
        .into_iter()
        .map(student_row)
        .collect();
    json!({ "students": rows })
}

fn students_get(session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = session
        .roster
        .get(&student_id)
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    Ok(json!({ "student": student }))
}

fn students_create(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let mut classes = match params.get("classes") {
        Some(v) if !v.is_null() => string_list(v, "classes")?,
        _ => Vec::new(),
    };
    if let Some(c) = get_optional_str(params, "className") {
        classes.insert(0, c);
    }
    let phone = get_optional_str(params, "parentPhone");
    let grade = get_optional_str(params, "grade");
    let student = session
        .roster
        .create_student(&name, classes, phone.as_deref(), grade.as_deref())?;
    session.persist_roster();
    Ok(json!({ "student": student }))
}

fn parse_patch(raw: &serde_json::Value) -> Result<StudentPatch, HandlerErr> {
    let obj = raw
        .as_object()
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;
    let mut patch = StudentPatch::default();
    for (k, v) in obj {
        match k.as_str() {
            "name" => {
                patch.name = Some(
                    v.as_str()
                        .ok_or_else(|| HandlerErr::bad_params("name must be a string"))?
                        .to_string(),
                )
            }
            "grade" => {
                patch.grade = Some(
                    v.as_str()
                        .ok_or_else(|| HandlerErr::bad_params("grade must be a string"))?
                        .to_string(),
                )
            }
            "classes" => patch.classes = Some(string_list(v, "classes")?),
            "parentPhone" => {
                patch.parent_phone = Some(match v {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    _ => return Err(HandlerErr::bad_params("parentPhone must be a string or null")),
                })
            }
            other => {
                return Err(HandlerErr::bad_params(format!("unknown student field: {}", other)))
            }
        }
    }
    Ok(patch)
}

fn students_update(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let patch = parse_patch(params.get("patch").unwrap_or(&serde_json::Value::Null))?;
    let student = session.roster.apply_patch(&student_id, patch)?;
    session.persist_roster();
    Ok(json!({ "student": student }))
}

fn students_delete(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_confirm(params, "students.delete")?;
    let removed = session.roster.delete_student(&student_id)?;
    session.persist_roster();
    tracing::info!(student = %removed.id, "student deleted");
    Ok(json!({ "deleted": removed.id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    ok(&req.id, students_list(session, &req.params))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    match students_get(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match students_create(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match students_update(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match students_delete(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
