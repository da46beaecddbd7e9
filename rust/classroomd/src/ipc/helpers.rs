use crate::backup::BackupError;
use crate::ingest::IngestError;
use crate::ipc::error::err;
use crate::ledger::LedgerError;
use crate::model::Semester;
use crate::roster::RosterError;
use crate::tools::ToolError;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

macro_rules! coded_error {
    ($($ty:ty),*) => {
        $(impl From<$ty> for HandlerErr {
            fn from(e: $ty) -> Self {
                HandlerErr::new(e.code(), e.to_string())
            }
        })*
    };
}

coded_error!(RosterError, ToolError, LedgerError, IngestError, BackupError);

pub fn no_workspace(id: &str) -> serde_json::Value {
    err(id, "no_workspace", "select a workspace first", None)
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|v| v.is_finite())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))
}

pub fn get_bool(params: &serde_json::Value, key: &str) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Destructive operations run only with `confirm: true`.
pub fn require_confirm(params: &serde_json::Value, action: &str) -> Result<(), HandlerErr> {
    if get_bool(params, "confirm") {
        Ok(())
    } else {
        Err(HandlerErr::new(
            "confirmation_required",
            format!("{} requires confirm: true", action),
        ))
    }
}

/// Absent semester means the first; anything else must be "1" or "2".
pub fn get_semester(params: &serde_json::Value) -> Result<Option<Semester>, HandlerErr> {
    match params.get("semester") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => Semester::from_json(v).map(Some).ok_or_else(|| {
            HandlerErr::bad_params("semester must be \"1\" or \"2\"")
                .with_details(json!({ "semester": v }))
        }),
    }
}
