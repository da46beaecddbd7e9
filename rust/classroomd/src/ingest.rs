use crate::model::{new_id, now_timestamp, GradeRecord, Semester, Student};
use crate::phone;
use crate::roster::{record_grade, GradeMergePolicy, Roster};
use crate::tools::ToolRegistry;
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

const NAME_KEYWORDS: &[&str] = &[
    "الاسم",
    "اسم الطالب",
    "اسم",
    "Name",
    "Student Name",
    "Full Name",
    "المتعلم",
    "اسم المتعلم",
    "Student",
];
const PHONE_KEYWORDS: &[&str] = &[
    "جوال",
    "الجوال",
    "هاتف",
    "الهاتف",
    "رقم الجوال",
    "رقم الهاتف",
    "ولي",
    "ولي الأمر",
    "phone",
    "mobile",
    "tel",
    "telephone",
    "contact number",
    "parent phone",
];
const LEVEL_KEYWORDS: &[&str] = &["الصف", "صف", "المرحلة", "Grade", "Level"];
const IGNORE_KEYWORDS: &[&str] = &["رقم", "الجنس", "ملاحظات", "Serial", "Gender", "Notes"];
/// Too short to match as a word inside a longer header ("Quiz No 1").
const IGNORE_EXACT_KEYWORDS: &[&str] = &["م", "No", "#", "ID"];

const PHONE_SAMPLE_ROWS: usize = 10;
const PHONE_SAMPLE_MIN_PERCENT: usize = 30;
const HEADER_SCAN_ROWS: usize = 30;
const MIN_CREATED_TOOL_CAP: f64 = 10.0;
const IMPORTED_SUBJECT: &str = "المادة";

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("the file has no rows")]
    EmptyInput,
    #[error("no usable student names were found")]
    NoStudents,
    #[error("no header row with a name column in the first {0} rows")]
    NoHeaderRow(usize),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::NoStudents => "no_students",
            Self::NoHeaderRow(_) => "no_header_row",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Empty,
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Empty),
            serde_json::Value::Bool(b) => Self::Text(b.to_string()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
        }
    }

    /// Numeric value of the cell; text that does not parse is `None`.
    pub fn number(&self) -> Option<f64> {
        match self {
            Self::Empty => None,
            Self::Number(n) => Some(*n).filter(|v| v.is_finite()),
            Self::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return None;
                }
                t.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) => false,
        }
    }
}

pub type Grid = Vec<Vec<Cell>>;

pub fn grid_from_json(rows: &serde_json::Value) -> Option<Grid> {
    let rows = rows.as_array()?;
    let mut grid = Vec::with_capacity(rows.len());
    for r in rows {
        let cells = r.as_array()?;
        grid.push(cells.iter().map(Cell::from_json).collect());
    }
    Some(grid)
}

/// Splits CSV text into records. Quoted fields may hold commas, doubled
/// quotes and line breaks; `\r\n` and bare `\r` end a record like `\n`.
fn parse_csv_records(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut dirty = false;
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            dirty = true;
            i += 1;
            continue;
        }
        if ch == '\r' && i + 1 < chars.len() && chars[i + 1] == '\n' {
            i += 1;
            continue;
        }
        if in_quotes {
            buf.push(if ch == '\r' { '\n' } else { ch });
            i += 1;
            continue;
        }
        match ch {
            ',' => {
                row.push(std::mem::take(&mut buf));
                dirty = true;
            }
            '\n' | '\r' => {
                row.push(std::mem::take(&mut buf));
                rows.push(std::mem::take(&mut row));
                dirty = false;
            }
            _ => {
                buf.push(ch);
                dirty = true;
            }
        }
        i += 1;
    }
    if dirty {
        row.push(buf);
        rows.push(row);
    }
    rows
}

pub fn grid_from_csv(text: &str) -> Grid {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    parse_csv_records(text)
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .map(|f| if f.is_empty() { Cell::Empty } else { Cell::Text(f) })
                .collect()
        })
        .collect()
}

pub fn load_csv(path: &Path) -> anyhow::Result<Grid> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    Ok(grid_from_csv(&String::from_utf8_lossy(&bytes)))
}

fn is_invisible(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' | '\u{FEFF}'
    )
}

/// Lowercased, trimmed, invisible-stripped, single-spaced header text.
pub fn normalize_header(raw: &str) -> String {
    let visible: String = raw.chars().filter(|c| !is_invisible(*c)).collect();
    visible
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn tokens(normalized: &str) -> Vec<&str> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn matches_exact(header: &str, keywords: &[&str]) -> bool {
    let h = normalize_header(header);
    !h.is_empty() && keywords.iter().any(|k| normalize_header(k) == h)
}

fn matches_keyword(header: &str, keywords: &[&str]) -> bool {
    let h = normalize_header(header);
    if h.is_empty() {
        return false;
    }
    let ht = tokens(&h);
    keywords.iter().any(|k| {
        let k = normalize_header(k);
        if k == h {
            return true;
        }
        let kt = tokens(&k);
        !kt.is_empty() && ht.windows(kt.len()).any(|w| w == kt.as_slice())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRule {
    KeywordExact,
    KeywordPartial,
    FirstColumn,
    Keyword,
    ContentSample,
    AfterName,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnPick {
    pub index: usize,
    pub header: String,
    pub rule: ColumnRule,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnResolution {
    pub name: ColumnPick,
    pub phone: Option<ColumnPick>,
    pub level: Option<ColumnPick>,
}

fn pick(headers: &[String], index: usize, rule: ColumnRule) -> ColumnPick {
    ColumnPick {
        index,
        header: headers.get(index).cloned().unwrap_or_default(),
        rule,
    }
}

fn find_name_column(headers: &[String]) -> Option<(usize, ColumnRule)> {
    if let Some(i) = headers.iter().position(|h| matches_exact(h, NAME_KEYWORDS)) {
        return Some((i, ColumnRule::KeywordExact));
    }
    headers
        .iter()
        .position(|h| {
            matches_keyword(h, NAME_KEYWORDS)
                && !matches_keyword(h, PHONE_KEYWORDS)
                && !matches_keyword(h, IGNORE_KEYWORDS)
                && !matches_keyword(h, IGNORE_EXACT_KEYWORDS)
        })
        .map(|i| (i, ColumnRule::KeywordPartial))
}

fn cell_text(row: &[Cell], idx: usize) -> String {
    row.get(idx).map(Cell::text).unwrap_or_default()
}

fn phone_by_content(ncols: usize, name_idx: usize, data: &[&Vec<Cell>]) -> Option<usize> {
    let sample: Vec<&Vec<Cell>> = data.iter().take(PHONE_SAMPLE_ROWS).copied().collect();
    if sample.is_empty() {
        return None;
    }
    (0..ncols).filter(|i| *i != name_idx).find(|i| {
        let hits = sample
            .iter()
            .filter(|r| phone::looks_like_phone(&cell_text(r, *i)))
            .count();
        hits * 100 >= sample.len() * PHONE_SAMPLE_MIN_PERCENT
    })
}

/// Ordered rule chains over the header row; the first rule that fires wins.
pub fn resolve_columns(headers: &[String], data: &[&Vec<Cell>]) -> ColumnResolution {
    let (name_idx, name_rule) = find_name_column(headers).unwrap_or((0, ColumnRule::FirstColumn));
    let ncols = headers.len();

    let phone = headers
        .iter()
        .enumerate()
        .position(|(i, h)| i != name_idx && matches_keyword(h, PHONE_KEYWORDS))
        .map(|i| pick(headers, i, ColumnRule::Keyword))
        .or_else(|| {
            phone_by_content(ncols, name_idx, data).map(|i| pick(headers, i, ColumnRule::ContentSample))
        })
        .or_else(|| {
            (name_idx + 1 < ncols).then(|| pick(headers, name_idx + 1, ColumnRule::AfterName))
        });

    let level = headers
        .iter()
        .enumerate()
        .position(|(i, h)| i != name_idx && matches_keyword(h, LEVEL_KEYWORDS))
        .map(|i| pick(headers, i, ColumnRule::Keyword));

    ColumnResolution {
        name: pick(headers, name_idx, name_rule),
        phone,
        level,
    }
}

fn is_header_echo(name: &str, name_header: &str) -> bool {
    let n = normalize_header(name);
    n == normalize_header(name_header) || matches_exact(name, NAME_KEYWORDS)
}

fn header_row(grid: &Grid, idx: usize) -> Vec<String> {
    grid.get(idx)
        .map(|r| r.iter().map(|c| c.text().trim().to_string()).collect())
        .unwrap_or_default()
}

fn first_nonblank_row(grid: &Grid) -> Option<usize> {
    grid.iter().position(|r| r.iter().any(|c| !c.is_blank()))
}

fn data_rows(grid: &Grid, after: usize) -> Vec<&Vec<Cell>> {
    grid.iter()
        .skip(after + 1)
        .filter(|r| r.iter().any(|c| !c.is_blank()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct RosterImport {
    pub students: Vec<Student>,
    pub resolution: ColumnResolution,
    pub rows_total: usize,
    pub rows_skipped: usize,
}

/// Builds new students from a sheet whose first non-blank row is the header.
/// Every student is placed in `target_class`.
pub fn import_students(grid: &Grid, target_class: &str) -> Result<RosterImport, IngestError> {
    let header_idx = first_nonblank_row(grid).ok_or(IngestError::EmptyInput)?;
    let headers = header_row(grid, header_idx);
    let data = data_rows(grid, header_idx);
    let resolution = resolve_columns(&headers, &data);

    let mut students = Vec::new();
    for row in &data {
        let name = cell_text(row, resolution.name.index).trim().to_string();
        if name.is_empty() || is_header_echo(&name, &resolution.name.header) {
            continue;
        }
        let mut s = Student::new(name, vec![target_class.to_string()]);
        if let Some(p) = &resolution.phone {
            s.parent_phone = phone::normalize_optional(&cell_text(row, p.index));
        }
        if let Some(l) = &resolution.level {
            s.grade = cell_text(row, l.index).trim().to_string();
        }
        students.push(s);
    }

    if students.is_empty() {
        return Err(IngestError::NoStudents);
    }
    let rows_skipped = data.len() - students.len();
    Ok(RosterImport {
        students,
        resolution,
        rows_total: data.len(),
        rows_skipped,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub headers: Vec<String>,
    pub row_count: usize,
    pub columns: ColumnResolution,
    pub grade_plan: Option<GradeSheetPlan>,
    pub grade_plan_error: Option<&'static str>,
}

/// Read-only view of how both import modes would read the sheet.
pub fn inspect(grid: &Grid) -> Result<Inspection, IngestError> {
    let header_idx = first_nonblank_row(grid).ok_or(IngestError::EmptyInput)?;
    let headers = header_row(grid, header_idx);
    let data = data_rows(grid, header_idx);
    let columns = resolve_columns(&headers, &data);
    let (grade_plan, grade_plan_error) = match plan_grade_import(grid) {
        Ok(plan) => (Some(plan), None),
        Err(e) => (None, Some(e.code())),
    };
    Ok(Inspection {
        row_count: data.len(),
        headers,
        columns,
        grade_plan,
        grade_plan_error,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolColumn {
    pub index: usize,
    pub header: String,
    pub observed_max: f64,
}

impl ToolColumn {
    /// Cap used when the column has to create its tool.
    pub fn default_cap(&self) -> f64 {
        self.observed_max.ceil().max(MIN_CREATED_TOOL_CAP)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheetPlan {
    pub header_row: usize,
    pub name: ColumnPick,
    pub tool_columns: Vec<ToolColumn>,
    pub ignored_columns: Vec<String>,
    pub data_rows: usize,
}

fn is_tool_header(header: &str) -> bool {
    !normalize_header(header).is_empty()
        && !matches_keyword(header, NAME_KEYWORDS)
        && !matches_keyword(header, PHONE_KEYWORDS)
        && !matches_keyword(header, LEVEL_KEYWORDS)
        && !matches_keyword(header, IGNORE_KEYWORDS)
        && !matches_exact(header, IGNORE_EXACT_KEYWORDS)
}

/// Finds the header row (banner rows above it are skipped) and the columns
/// that carry assessment scores.
pub fn plan_grade_import(grid: &Grid) -> Result<GradeSheetPlan, IngestError> {
    if grid.iter().all(|r| r.iter().all(Cell::is_blank)) {
        return Err(IngestError::EmptyInput);
    }
    let found = grid.iter().take(HEADER_SCAN_ROWS).enumerate().find_map(|(ri, _)| {
        let headers = header_row(grid, ri);
        find_name_column(&headers).map(|(ci, rule)| (ri, headers, ci, rule))
    });
    let Some((header_idx, headers, name_idx, name_rule)) = found else {
        return Err(IngestError::NoHeaderRow(HEADER_SCAN_ROWS));
    };
    let data = data_rows(grid, header_idx);

    let mut tool_columns = Vec::new();
    let mut ignored_columns = Vec::new();
    for (ci, h) in headers.iter().enumerate() {
        if ci == name_idx {
            continue;
        }
        if !is_tool_header(h) {
            if !h.is_empty() {
                ignored_columns.push(h.clone());
            }
            continue;
        }
        let observed_max = data
            .iter()
            .filter_map(|r| r.get(ci).and_then(Cell::number))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        match observed_max {
            Some(m) => tool_columns.push(ToolColumn {
                index: ci,
                header: h.clone(),
                observed_max: m,
            }),
            None => ignored_columns.push(h.clone()),
        }
    }

    Ok(GradeSheetPlan {
        header_row: header_idx,
        name: pick(&headers, name_idx, name_rule),
        tool_columns,
        ignored_columns,
        data_rows: data.len(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeImportSummary {
    pub rows_matched: usize,
    pub rows_unmatched: usize,
    pub unmatched_names: Vec<String>,
    pub grades_written: usize,
    pub cells_skipped: usize,
    pub tools_created: Vec<String>,
}

pub struct GradeImportOptions<'a> {
    pub semester: Semester,
    pub class_name: Option<&'a str>,
    pub policy: GradeMergePolicy,
}

/// Writes one grade per numeric cell into matching students. Names match
/// exactly after trimming; unmatched rows are counted and skipped.
pub fn apply_grade_import(
    grid: &Grid,
    plan: &GradeSheetPlan,
    roster: &mut Roster,
    tools: &mut ToolRegistry,
    opts: &GradeImportOptions<'_>,
) -> GradeImportSummary {
    let mut summary = GradeImportSummary::default();
    let data = data_rows(grid, plan.header_row);
    let mut tool_ids: Vec<Option<String>> = vec![None; plan.tool_columns.len()];

    for row in data {
        let name = cell_text(row, plan.name.index).trim().to_string();
        if name.is_empty() || is_header_echo(&name, &plan.name.header) {
            continue;
        }

        let mut grades = Vec::new();
        for (ti, col) in plan.tool_columns.iter().enumerate() {
            let Some(cell) = row.get(col.index) else {
                continue;
            };
            let Some(score) = cell.number() else {
                if !cell.is_blank() {
                    summary.cells_skipped += 1;
                }
                continue;
            };
            let cached = tool_ids[ti]
                .as_deref()
                .and_then(|id| tools.get(id))
                .cloned();
            let tool = match cached {
                Some(t) => t,
                None => {
                    let label = col.header.trim();
                    let existing = tools.find_by_name(label).cloned();
                    let t = match existing {
                        Some(t) => t,
                        None => match tools.create(label, col.default_cap()) {
                            Ok(t) => {
                                summary.tools_created.push(t.name.clone());
                                t
                            }
                            Err(_) => continue,
                        },
                    };
                    tool_ids[ti] = Some(t.id.clone());
                    t
                }
            };
            grades.push(GradeRecord {
                id: new_id(),
                subject: IMPORTED_SUBJECT.to_string(),
                category: tool.name.clone(),
                tool_id: Some(tool.id.clone()),
                score,
                max_score: tool.max_score,
                date: now_timestamp(),
                semester: Some(opts.semester),
            });
        }

        let Some(student_id) = roster
            .find_by_name(&name, opts.class_name)
            .map(|s| s.id.clone())
        else {
            summary.rows_unmatched += 1;
            summary.unmatched_names.push(name);
            continue;
        };
        summary.rows_matched += 1;
        let written = grades.len();
        let policy = opts.policy;
        let applied = roster.update(&student_id, |s| {
            for g in grades {
                record_grade(s, g, policy);
            }
            Ok::<(), ()>(())
        });
        if matches!(applied, Ok(Ok(()))) {
            summary.grades_written += written;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|r| r.iter().map(|c| if c.is_empty() { Cell::Empty } else { t(c) }).collect())
            .collect()
    }

    #[test]
    fn header_normalization_strips_invisible_marks() {
        assert_eq!(normalize_header("\u{200F} اسم   الطالب\u{FEFF} "), "اسم الطالب");
        assert_eq!(normalize_header("  Full   NAME "), "full name");
        assert!(matches_keyword("جوال ولي الأمر", PHONE_KEYWORDS));
        assert!(matches_keyword("Mobile No.", PHONE_KEYWORDS));
        assert!(!matches_keyword("Economics", IGNORE_KEYWORDS));
        assert!(matches_exact("#", IGNORE_EXACT_KEYWORDS));
        assert!(!matches_exact("Quiz No 1", IGNORE_EXACT_KEYWORDS));
    }

    #[test]
    fn name_column_prefers_exact_then_partial_then_first() {
        let h = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            find_name_column(&h(&["رقم", "اسم الطالب"])),
            Some((1, ColumnRule::KeywordExact))
        );
        assert_eq!(
            find_name_column(&h(&["Student ID", "Student Full Name"])),
            Some((1, ColumnRule::KeywordPartial))
        );
        assert_eq!(find_name_column(&h(&["A", "B"])), None);

        let g = grid(&[&["A", "B"], &["x", "y"]]);
        let out = import_students(&g, "1/أ").expect("import");
        assert_eq!(out.resolution.name.rule, ColumnRule::FirstColumn);
        assert_eq!(out.students[0].name, "x");
    }

    #[test]
    fn phone_column_found_by_content_sampling() {
        let g = grid(&[
            &["Full Name", "Contact"],
            &["Ali", "+968 9234 5678"],
            &["Mona", "0501234567"],
            &["Huda", "n/a"],
            &["Sami", ""],
        ]);
        let out = import_students(&g, "A").expect("import");
        let phone = out.resolution.phone.expect("phone column");
        assert_eq!(phone.header, "Contact");
        assert_eq!(phone.rule, ColumnRule::ContentSample);
        assert_eq!(out.students[0].parent_phone.as_deref(), Some("+96892345678"));
        assert_eq!(out.students[2].parent_phone, None);
    }

    #[test]
    fn phone_keyword_beats_content_and_falls_back_to_next_column() {
        let g = grid(&[
            &["الاسم", "رقم الطالب", "جوال ولي الأمر"],
            &["علي", "12345678", "0501234567"],
        ]);
        let out = import_students(&g, "A").expect("import");
        let phone = out.resolution.phone.expect("phone");
        assert_eq!((phone.index, phone.rule), (2, ColumnRule::Keyword));

        let g = grid(&[&["الاسم", "ملاحظة"], &["علي", "ممتاز"]]);
        let out = import_students(&g, "A").expect("import");
        let phone = out.resolution.phone.expect("phone");
        assert_eq!((phone.index, phone.rule), (1, ColumnRule::AfterName));
        assert_eq!(out.students[0].parent_phone, None);
    }

    #[test]
    fn duplicate_header_rows_and_blank_names_are_dropped() {
        let g = grid(&[
            &["الاسم", "الصف"],
            &["أحمد", "الخامس"],
            &["الاسم", "الصف"],
            &["", "الخامس"],
            &["Name", ""],
            &["ليلى", "الخامس"],
        ]);
        let out = import_students(&g, "5/أ").expect("import");
        let names: Vec<_> = out.students.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["أحمد", "ليلى"]);
        assert_eq!(out.students[0].grade, "الخامس");
        assert_eq!(out.students[0].classes, vec!["5/أ"]);
        assert_eq!(out.rows_skipped, 3);
        assert!(out.students.iter().all(|s| s.grades.is_empty()));
    }

    #[test]
    fn empty_and_header_only_sheets_fail_differently() {
        assert_eq!(import_students(&Vec::new(), "A").err(), Some(IngestError::EmptyInput));
        let blank = grid(&[&["", ""]]);
        assert_eq!(import_students(&blank, "A").err(), Some(IngestError::EmptyInput));
        let header_only = grid(&[&["الاسم", "الجوال"]]);
        assert_eq!(
            import_students(&header_only, "A").err(),
            Some(IngestError::NoStudents)
        );
    }

    #[test]
    fn csv_parsing_handles_bom_quotes_and_numbers() {
        let g = grid_from_csv("\u{feff}الاسم,\"Score, final\"\r\n\"علي \"\"الأول\"\"\",9.5\n");
        assert_eq!(g[0][0], t("الاسم"));
        assert_eq!(g[0][1], t("Score, final"));
        assert_eq!(g[1][0], t("علي \"الأول\""));
        assert_eq!(g[1][1].number(), Some(9.5));
        assert_eq!(Cell::Number(96892345678.0).text(), "96892345678");
        assert_eq!(t("abc").number(), None);
    }

    #[test]
    fn quoted_line_breaks_stay_inside_one_record() {
        let g = grid_from_csv("الاسم,ملاحظات\n\"علي\",\"سطر1\nسطر2\"\nمنى,x\n");
        assert_eq!(g.len(), 3);
        assert_eq!(g[1][1], t("سطر1\nسطر2"));
        let out = import_students(&g, "A").expect("import");
        let names: Vec<_> = out.students.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["علي", "منى"]);

        let g = grid_from_csv("Name,Notes\r\n\"Ali\",\"a\r\nb\"\r\nMona,\r\n");
        assert_eq!(g.len(), 3);
        assert_eq!(g[1][1], t("a\nb"));
        assert_eq!(g[2], vec![t("Mona"), Cell::Empty]);
    }

    fn contact_sheet(phone_rows: usize, total: usize) -> Grid {
        let mut rows = vec![vec![t("Full Name"), t("Contact")]];
        for i in 0..total {
            let contact = if i < phone_rows { t("0501234567") } else { t("n/a") };
            rows.push(vec![t(&format!("Student {i}")), contact]);
        }
        rows
    }

    #[test]
    fn content_sampling_accepts_thirty_percent_of_ten_rows() {
        let out = import_students(&contact_sheet(3, 10), "A").expect("import");
        let phone = out.resolution.phone.expect("phone");
        assert_eq!((phone.index, phone.rule), (1, ColumnRule::ContentSample));
    }

    #[test]
    fn content_sampling_below_thirty_percent_falls_back_to_after_name() {
        let mut g = contact_sheet(2, 10);
        // Rows past the sample window are not counted.
        g.push(vec![t("Late"), t("0507654321")]);
        let out = import_students(&g, "A").expect("import");
        let phone = out.resolution.phone.expect("phone");
        assert_eq!((phone.index, phone.rule), (1, ColumnRule::AfterName));
    }

    fn roster_with(names: &[&str]) -> Roster {
        let mut r = Roster::default();
        for n in names {
            r.create_student(n, vec!["A".to_string()], None, None)
                .expect("create");
        }
        r
    }

    #[test]
    fn grade_plan_skips_banner_rows_and_ignored_columns() {
        let g = grid(&[
            &["كشف درجات الصف الخامس", "", ""],
            &["", "", ""],
            &["م", "اسم الطالب", "الجنس", "الاختبار", "ملاحظات"],
            &["1", "علي", "ذكر", "17", "جيد"],
            &["2", "منى", "أنثى", "8", ""],
        ]);
        let plan = plan_grade_import(&g).expect("plan");
        assert_eq!(plan.header_row, 2);
        assert_eq!(plan.name.index, 1);
        assert_eq!(plan.tool_columns.len(), 1);
        assert_eq!(plan.tool_columns[0].header, "الاختبار");
        assert_eq!(plan.tool_columns[0].observed_max, 17.0);
        assert_eq!(plan.tool_columns[0].default_cap(), 17.0);
        assert_eq!(plan.data_rows, 2);
    }

    #[test]
    fn inspect_reports_both_modes() {
        let g = grid(&[&["Student Name", "Mobile", "Quiz"], &["Sara", "0501234567", "8"]]);
        let out = inspect(&g).expect("inspect");
        assert_eq!(out.row_count, 1);
        assert_eq!(out.columns.phone.map(|p| p.rule), Some(ColumnRule::Keyword));
        let plan = out.grade_plan.expect("plan");
        assert_eq!(plan.tool_columns.len(), 1);
        assert_eq!(plan.tool_columns[0].header, "Quiz");

        let g = grid(&[&["a", "b"]]);
        let out = inspect(&g).expect("inspect");
        assert_eq!(out.grade_plan_error, Some("no_header_row"));
    }

    #[test]
    fn short_ignore_keywords_only_drop_exact_headers() {
        let g = grid(&[
            &["No", "Name", "Quiz No 1", "Homework ID", "ID", "Notes"],
            &["1", "Sara", "7", "9", "4411", "8"],
        ]);
        let plan = plan_grade_import(&g).expect("plan");
        let headers: Vec<_> = plan.tool_columns.iter().map(|c| c.header.as_str()).collect();
        assert_eq!(headers, vec!["Quiz No 1", "Homework ID"]);
        assert_eq!(plan.ignored_columns, vec!["No", "ID", "Notes"]);
    }

    #[test]
    fn grade_plan_requires_a_name_header() {
        let g = grid(&[&["a", "b"], &["1", "2"]]);
        assert_eq!(plan_grade_import(&g).err(), Some(IngestError::NoHeaderRow(30)));
    }

    #[test]
    fn bulk_import_creates_tools_and_skips_unmatched_and_text() {
        let g = grid(&[
            &["الاسم", "مشروع", "شفوي"],
            &["علي", "4.2", "غائب"],
            &["مجهول", "3", "5"],
            &["منى", "", "7"],
        ]);
        let mut roster = roster_with(&["علي", "منى"]);
        let mut tools = ToolRegistry::default();
        let plan = plan_grade_import(&g).expect("plan");
        let opts = GradeImportOptions {
            semester: Semester::Second,
            class_name: None,
            policy: GradeMergePolicy::Replace,
        };
        let summary = apply_grade_import(&g, &plan, &mut roster, &mut tools, &opts);

        assert_eq!(summary.rows_matched, 2);
        assert_eq!(summary.rows_unmatched, 1);
        assert_eq!(summary.unmatched_names, vec!["مجهول"]);
        assert_eq!(summary.grades_written, 2);
        assert_eq!(summary.cells_skipped, 1);
        assert_eq!(summary.tools_created, vec!["مشروع", "شفوي"]);
        assert_eq!(tools.find_by_name("مشروع").map(|t| t.max_score), Some(10.0));

        let ali = roster.find_by_name("علي", None).expect("ali");
        assert_eq!(ali.grades.len(), 1);
        assert_eq!(ali.grades[0].score, 4.2);
        assert_eq!(ali.grades[0].max_score, 10.0);
        assert_eq!(ali.grades[0].semester, Some(Semester::Second));
    }

    #[test]
    fn bulk_import_uses_existing_tool_cap() {
        let g = grid(&[&["Name", "Final"], &["Sara", "35"]]);
        let mut roster = roster_with(&["Sara"]);
        let mut tools = ToolRegistry::default();
        tools.create("Final", 40.0).expect("tool");
        let plan = plan_grade_import(&g).expect("plan");
        let opts = GradeImportOptions {
            semester: Semester::First,
            class_name: Some("A"),
            policy: GradeMergePolicy::Replace,
        };
        let summary = apply_grade_import(&g, &plan, &mut roster, &mut tools, &opts);
        assert!(summary.tools_created.is_empty());
        let sara = roster.find_by_name("Sara", None).expect("sara");
        assert_eq!(sara.grades[0].max_score, 40.0);
    }

    #[test]
    fn repeated_bulk_import_replaces_unless_appending() {
        let g = grid(&[&["Name", "Quiz"], &["Sara", "12"]]);
        let mut roster = roster_with(&["Sara"]);
        let mut tools = ToolRegistry::default();
        let plan = plan_grade_import(&g).expect("plan");
        let mut opts = GradeImportOptions {
            semester: Semester::First,
            class_name: None,
            policy: GradeMergePolicy::Replace,
        };
        apply_grade_import(&g, &plan, &mut roster, &mut tools, &opts);
        apply_grade_import(&g, &plan, &mut roster, &mut tools, &opts);
        let count = |r: &Roster| r.find_by_name("Sara", None).map(|s| s.grades.len());
        assert_eq!(count(&roster), Some(1));
        assert_eq!(tools.tools().len(), 1);
        assert_eq!(tools.tools()[0].max_score, 12.0);

        opts.policy = GradeMergePolicy::Append;
        apply_grade_import(&g, &plan, &mut roster, &mut tools, &opts);
        assert_eq!(count(&roster), Some(2));
    }
}
