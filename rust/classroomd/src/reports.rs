use crate::grades::{final_result, overall_percentage, FinalResult, LetterGrade};
use crate::ledger::{attendance_counts, attendance_on, behavior_totals, AttendanceCounts, BehaviorTotals};
use crate::model::{AttendanceStatus, BehaviorRecord, Semester, Student};
use crate::tools::{CategoryRef, ToolRegistry};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;

pub const GRADE_CSV_HEADER: &str = "اسم الطالب,الدرجة,من,التاريخ";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeLine {
    pub id: String,
    pub category: String,
    pub tool_id: Option<String>,
    /// False when the grade's tool no longer exists in the registry.
    pub live_tool: bool,
    pub score: f64,
    pub max_score: f64,
    pub semester: Semester,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub id: String,
    pub name: String,
    pub grade: String,
    pub classes: Vec<String>,
    pub parent_phone: Option<String>,
    #[serde(rename = "final")]
    pub result: FinalResult,
    pub letter_label: Option<&'static str>,
    pub attendance: AttendanceCounts,
    pub behavior: BehaviorTotals,
    pub behaviors: Vec<BehaviorRecord>,
    pub grades: Vec<GradeLine>,
}

pub fn student_report(student: &Student, tools: &ToolRegistry) -> StudentReport {
    let result = final_result(&student.grades);
    let grades = student
        .grades
        .iter()
        .map(|g| {
            let (category, tool_id, live_tool) = match tools.resolve(g) {
                CategoryRef::Resolved(t) => (t.name.clone(), Some(t.id.clone()), true),
                CategoryRef::Historical { label, .. } => {
                    (label.to_string(), g.tool_id.clone(), false)
                }
            };
            GradeLine {
                id: g.id.clone(),
                category,
                tool_id,
                live_tool,
                score: g.score,
                max_score: g.max_score,
                semester: g.semester(),
                date: g.date.clone(),
            }
        })
        .collect();

    StudentReport {
        id: student.id.clone(),
        name: student.name.clone(),
        grade: student.grade.clone(),
        classes: student.classes.clone(),
        parent_phone: student.parent_phone.clone(),
        letter_label: result.letter.map(LetterGrade::label),
        result,
        attendance: attendance_counts(&student.attendance),
        behavior: behavior_totals(&student.behaviors),
        behaviors: student.behaviors.clone(),
        grades,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub student_id: String,
    pub name: String,
    pub semester1: i64,
    pub semester2: i64,
    pub percentage: i64,
    pub letter: Option<LetterGrade>,
    pub absences: usize,
    pub lates: usize,
    pub positive_points: i64,
    pub negative_points: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReport {
    pub class_name: String,
    pub rows: Vec<ClassRow>,
    /// Mean final percentage over students that have any graded points.
    pub average_percentage: Option<i64>,
}

pub fn class_report<'a, I>(class_name: &str, students: I) -> ClassReport
where
    I: IntoIterator<Item = &'a Student>,
{
    let rows: Vec<ClassRow> = students
        .into_iter()
        .map(|s| {
            let f = final_result(&s.grades);
            let att = attendance_counts(&s.attendance);
            let beh = behavior_totals(&s.behaviors);
            ClassRow {
                student_id: s.id.clone(),
                name: s.name.clone(),
                semester1: f.semester1.percentage,
                semester2: f.semester2.percentage,
                percentage: f.percentage,
                letter: f.letter,
                absences: att.absent,
                lates: att.late,
                positive_points: beh.positive_points,
                negative_points: beh.negative_points,
            }
        })
        .collect();

    let graded: Vec<i64> = rows
        .iter()
        .filter(|r| r.letter.is_some())
        .map(|r| r.percentage)
        .collect();
    let average_percentage = if graded.is_empty() {
        None
    } else {
        Some(crate::grades::round_half_up(
            graded.iter().sum::<i64>() as f64 / graded.len() as f64,
        ))
    };

    ClassReport {
        class_name: class_name.to_string(),
        rows,
        average_percentage,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub date: String,
    pub student_count: usize,
    pub class_count: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub unmarked: usize,
    pub positive_behaviors: usize,
    pub negative_behaviors: usize,
    pub average_percentage: Option<i64>,
}

pub fn dashboard(students: &[Student], class_count: usize, date: &str) -> DashboardStats {
    let mut stats = DashboardStats {
        date: date.to_string(),
        student_count: students.len(),
        class_count,
        ..Default::default()
    };
    let mut pct_sum = 0i64;
    let mut pct_n = 0i64;
    for s in students {
        match attendance_on(s, date) {
            Some(AttendanceStatus::Present) => stats.present += 1,
            Some(AttendanceStatus::Absent) => stats.absent += 1,
            Some(AttendanceStatus::Late) => stats.late += 1,
            None => stats.unmarked += 1,
        }
        let b = behavior_totals(&s.behaviors);
        stats.positive_behaviors += b.positive_count;
        stats.negative_behaviors += b.negative_count;
        if !s.grades.is_empty() {
            pct_sum += overall_percentage(&s.grades);
            pct_n += 1;
        }
    }
    if pct_n > 0 {
        stats.average_percentage = Some(crate::grades::round_half_up(
            pct_sum as f64 / pct_n as f64,
        ));
    }
    stats
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn format_score(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// One line per grade, prefixed with a UTF-8 BOM so spreadsheet apps pick
/// the right encoding for Arabic text.
pub fn student_grades_csv(student: &Student) -> String {
    let mut out = String::from("\u{feff}");
    out.push_str(GRADE_CSV_HEADER);
    out.push('\n');
    for g in &student.grades {
        let date = g.date.get(..10).unwrap_or(&g.date);
        out.push_str(&format!(
            "{},{},{},{}\n",
            csv_quote(&student.name),
            format_score(g.score),
            format_score(g.max_score),
            csv_quote(date)
        ));
    }
    out
}

pub fn write_student_grades_csv(student: &Student, out_path: &Path) -> anyhow::Result<usize> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(out_path, student_grades_csv(student))
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
    Ok(student.grades.len())
}
