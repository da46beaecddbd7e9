use crate::grades::{final_result, overall_percentage};
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, get_required_f64, get_required_str, get_semester, no_workspace, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::model::{new_id, now_timestamp, GradeRecord};
use crate::roster::{record_grade, GradeMergePolicy};
use serde_json::json;

const MANUAL_SUBJECT: &str = "المادة";

/// Category, tool id and cap for a manual grade: either a live tool by id,
/// or a free category label with an explicit or looked-up cap.
fn resolve_category(
    session: &Session,
    params: &serde_json::Value,
) -> Result<(String, Option<String>, f64), HandlerErr> {
    if let Some(tool_id) = get_optional_str(params, "toolId") {
        let tool = session
            .tools
            .get(&tool_id)
            .ok_or_else(|| HandlerErr::new("not_found", "tool not found"))?;
        return Ok((tool.name.clone(), Some(tool.id.clone()), tool.max_score));
    }
    let category = get_optional_str(params, "category")
        .ok_or_else(|| HandlerErr::bad_params("missing toolId or category"))?;
    let named = session.tools.find_by_name(&category);
    let max_score = match params.get("maxScore") {
        Some(v) if !v.is_null() => get_required_f64(params, "maxScore")?,
        _ => named
            .map(|t| t.max_score)
            .ok_or_else(|| HandlerErr::bad_params("maxScore is required for an unknown category"))?,
    };
    if max_score <= 0.0 {
        return Err(HandlerErr::bad_params("maxScore must be a positive number"));
    }
    Ok((category, named.map(|t| t.id.clone()), max_score))
}

fn grades_upsert(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let score = get_required_f64(params, "score")?;
    if score < 0.0 {
        return Err(HandlerErr::bad_params("score must not be negative")
            .with_details(json!({ "score": score })));
    }
    let semester = get_semester(params)?.unwrap_or_default();
    let (category, tool_id, max_score) = resolve_category(session, params)?;
    let policy = match get_optional_str(params, "mergePolicy") {
        Some(raw) => GradeMergePolicy::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("mergePolicy must be replace or append"))?,
        None => GradeMergePolicy::default(),
    };
    let grade_id = get_optional_str(params, "gradeId");

    let grade = session.roster.update(&student_id, |s| -> Result<GradeRecord, HandlerErr> {
        if let Some(gid) = grade_id.as_deref() {
            let g = s
                .grades
                .iter_mut()
                .find(|g| g.id == gid)
                .ok_or_else(|| HandlerErr::new("not_found", "grade not found"))?;
            g.category = category;
            g.tool_id = tool_id;
            g.score = score;
            g.max_score = max_score;
            g.semester = Some(semester);
            g.date = now_timestamp();
            return Ok(g.clone());
        }
        let g = GradeRecord {
            id: new_id(),
            subject: MANUAL_SUBJECT.to_string(),
            category,
            tool_id,
            score,
            max_score,
            date: now_timestamp(),
            semester: Some(semester),
        };
        record_grade(s, g.clone(), policy);
        Ok(g)
    })??;
    session.persist_roster();
    Ok(json!({ "grade": grade }))
}

fn grades_delete(session: &mut Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let grade_id = get_required_str(params, "gradeId")?;
    session.roster.delete_grade(&student_id, &grade_id)?;
    session.persist_roster();
    Ok(json!({ "deleted": grade_id }))
}

fn grades_summary(session: &Session, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = session
        .roster
        .get(&student_id)
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    Ok(json!({
        "final": final_result(&student.grades),
        "overallPercentage": overall_percentage(&student.grades),
        "sumOfCaps": session.tools.sum_of_caps(),
    }))
}

fn handle_grades_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match grades_upsert(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return no_workspace(&req.id);
    };
    match grades_delete(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    match grades_summary(session, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.upsert" => Some(handle_grades_upsert(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        "grades.summary" => Some(handle_grades_summary(state, req)),
        _ => None,
    }
}
