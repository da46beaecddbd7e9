use crate::model::{
    new_id, now_timestamp, AttendanceRecord, AttendanceStatus, BehaviorRecord, BehaviorType,
    Semester, Student,
};
use serde::Serialize;
use thiserror::Error;

pub const MAX_BEHAVIOR_POINTS: u64 = 1000;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("description must not be empty")]
    EmptyDescription,
    #[error("behavior not found")]
    BehaviorNotFound,
    #[error("points must be within -{0}..={0}")]
    PointsOutOfRange(u64),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyDescription | Self::PointsOutOfRange(_) => "bad_params",
            Self::BehaviorNotFound => "not_found",
        }
    }
}

/// One record per day: any earlier mark for `date` is replaced, not kept.
pub fn set_attendance(student: &mut Student, date: &str, status: AttendanceStatus) {
    student.attendance.retain(|a| a.date != date);
    student.attendance.push(AttendanceRecord {
        date: date.to_string(),
        status,
    });
}

pub fn clear_attendance(student: &mut Student, date: &str) -> bool {
    let before = student.attendance.len();
    student.attendance.retain(|a| a.date != date);
    student.attendance.len() != before
}

pub fn attendance_on(student: &Student, date: &str) -> Option<AttendanceStatus> {
    student
        .attendance
        .iter()
        .find(|a| a.date == date)
        .map(|a| a.status)
}

/// Logs a behavior at the front of the list. Points default to one and
/// always carry the sign of the behavior type.
pub fn log_behavior(
    student: &mut Student,
    kind: BehaviorType,
    description: &str,
    points: Option<i64>,
    semester: Option<Semester>,
) -> Result<BehaviorRecord, LedgerError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(LedgerError::EmptyDescription);
    }
    let magnitude = match points.map(i64::unsigned_abs) {
        Some(m) if m > MAX_BEHAVIOR_POINTS => {
            return Err(LedgerError::PointsOutOfRange(MAX_BEHAVIOR_POINTS));
        }
        Some(m) if m > 0 => m as i64,
        _ => 1,
    };
    let points = match kind {
        BehaviorType::Positive => magnitude,
        BehaviorType::Negative => -magnitude,
    };
    let record = BehaviorRecord {
        id: new_id(),
        date: now_timestamp(),
        kind,
        description: description.to_string(),
        points,
        semester,
    };
    student.behaviors.insert(0, record.clone());
    Ok(record)
}

pub fn delete_behavior(student: &mut Student, behavior_id: &str) -> Result<(), LedgerError> {
    let idx = student
        .behaviors
        .iter()
        .position(|b| b.id == behavior_id)
        .ok_or(LedgerError::BehaviorNotFound)?;
    student.behaviors.remove(idx);
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorTotals {
    pub positive_count: usize,
    pub negative_count: usize,
    pub positive_points: i64,
    pub negative_points: i64,
}

pub fn behavior_totals(behaviors: &[BehaviorRecord]) -> BehaviorTotals {
    let mut t = BehaviorTotals::default();
    for b in behaviors {
        match b.kind {
            BehaviorType::Positive => {
                t.positive_count += 1;
                t.positive_points = t.positive_points.saturating_add(b.points);
            }
            BehaviorType::Negative => {
                t.negative_count += 1;
                t.negative_points = t.negative_points.saturating_add(b.points);
            }
        }
    }
    t
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
}

pub fn attendance_counts(records: &[AttendanceRecord]) -> AttendanceCounts {
    let mut c = AttendanceCounts::default();
    for r in records {
        match r.status {
            AttendanceStatus::Present => c.present += 1,
            AttendanceStatus::Absent => c.absent += 1,
            AttendanceStatus::Late => c.late += 1,
        }
    }
    c
}
