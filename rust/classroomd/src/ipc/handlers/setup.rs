use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::no_workspace;
use crate::ipc::types::{AppState, Request};
use crate::model::TeacherInfo;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Teacher,
    Session,
    Schedule,
}

impl SetupSection {
    const ALL: [SetupSection; 3] = [Self::Teacher, Self::Session, Self::Schedule];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "teacher" => Some(Self::Teacher),
            "session" => Some(Self::Session),
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Session => "session",
            Self::Schedule => "schedule",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Teacher => "setup.teacher",
            Self::Session => "setup.session",
            Self::Schedule => "setup.schedule",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Teacher => json!({
            "name": "",
            "school": ""
        }),
        SetupSection::Session => json!({
            "activeTab": "dashboard",
            "selectedSemester": "1"
        }),
        SetupSection::Schedule => json!({
            "periodsPerDay": 7,
            "grid": []
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Rows of period labels; cells may be strings or null.
fn parse_schedule_grid(v: &Value) -> Result<Value, String> {
    let rows = v.as_array().ok_or("grid must be an array of rows")?;
    for row in rows {
        let cells = row.as_array().ok_or("grid rows must be arrays")?;
        if cells.iter().any(|c| !(c.is_string() || c.is_null())) {
            return Err("grid cells must be strings or null".into());
        }
    }
    Ok(v.clone())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Teacher => match k.as_str() {
                "name" | "school" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                _ => return Err(format!("unknown teacher field: {}", k)),
            },
            SetupSection::Session => match k.as_str() {
                "activeTab" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 32)?));
                }
                "selectedSemester" => {
                    let s = match v {
                        Value::Number(n) => n.to_string(),
                        _ => parse_string_max(v, k, 2)?,
                    };
                    if s != "1" && s != "2" {
                        return Err("selectedSemester must be one of: 1, 2".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown session field: {}", k)),
            },
            SetupSection::Schedule => match k.as_str() {
                "periodsPerDay" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 12)?));
                }
                "grid" => {
                    obj.insert(k.clone(), parse_schedule_grid(v)?);
                }
                _ => return Err(format!("unknown schedule field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::kv_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Saved values that no longer validate fall back to defaults.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), error = %e, "ignoring invalid saved setup");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

pub(crate) fn load_teacher_info(conn: &rusqlite::Connection) -> TeacherInfo {
    load_section(conn, SetupSection::Teacher)
        .ok()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

pub(crate) fn save_teacher_info(conn: &rusqlite::Connection, info: &TeacherInfo) {
    if let Err(e) = db::kv_put(conn, SetupSection::Teacher.key(), info) {
        tracing::warn!(error = %e, "failed to persist teacher info");
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(&session.conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return no_workspace(&req.id);
    };
    let conn = &session.conn;
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::kv_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    let mut out = Map::new();
    out.insert(section.name().to_string(), current);
    ok(&req.id, Value::Object(out))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
