use crate::model::{GradeRecord, Student};
use crate::phone;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RosterError {
    #[error("student not found")]
    StudentNotFound,
    #[error("grade not found")]
    GradeNotFound,
    #[error("name must not be empty")]
    EmptyName,
}

impl RosterError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::StudentNotFound | Self::GradeNotFound => "not_found",
            Self::EmptyName => "bad_params",
        }
    }
}

/// What happens to an existing grade in the same category and semester when
/// a new one is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradeMergePolicy {
    #[default]
    Replace,
    Append,
}

impl GradeMergePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "append" => Some(Self::Append),
            _ => None,
        }
    }
}

fn same_slot(a: &GradeRecord, b: &GradeRecord) -> bool {
    if a.semester() != b.semester() {
        return false;
    }
    match (a.tool_id.as_deref(), b.tool_id.as_deref()) {
        (Some(x), Some(y)) => x == y,
        _ => a.category == b.category,
    }
}

/// Records a grade at the front of the student's list.
pub fn record_grade(student: &mut Student, grade: GradeRecord, policy: GradeMergePolicy) {
    if policy == GradeMergePolicy::Replace {
        student.grades.retain(|g| !same_slot(g, &grade));
    }
    student.grades.insert(0, grade);
}

#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub grade: Option<String>,
    pub classes: Option<Vec<String>>,
    /// `Some(None)` clears the phone.
    pub parent_phone: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    students: Vec<Student>,
    classes: BTreeSet<String>,
}

impl Roster {
    pub fn new(students: Vec<Student>, classes: Vec<String>) -> Self {
        let mut r = Self {
            students,
            classes: BTreeSet::new(),
        };
        for c in classes {
            r.add_class(&c);
        }
        let derived: Vec<String> = r.students.iter().flat_map(|s| s.classes.clone()).collect();
        for c in derived {
            r.add_class(&c);
        }
        r
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn students_mut(&mut self) -> &mut [Student] {
        &mut self.students
    }

    pub fn classes(&self) -> Vec<String> {
        self.classes.iter().cloned().collect()
    }

    /// Adds a class label; returns false for blanks and existing labels.
    pub fn add_class(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.classes.insert(name.to_string())
    }

    pub fn get(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }

    /// Copy-on-write update: `f` mutates a copy, and the copy replaces the
    /// stored record only when `f` succeeds.
    pub fn update<T, E, F>(&mut self, student_id: &str, f: F) -> Result<Result<T, E>, RosterError>
    where
        F: FnOnce(&mut Student) -> Result<T, E>,
    {
        let idx = self
            .students
            .iter()
            .position(|s| s.id == student_id)
            .ok_or(RosterError::StudentNotFound)?;
        let mut copy = self.students[idx].clone();
        let out = f(&mut copy);
        if out.is_ok() {
            for c in &copy.classes {
                self.classes.insert(c.clone());
            }
            self.students[idx] = copy;
        }
        Ok(out)
    }

    pub fn create_student(
        &mut self,
        name: &str,
        classes: Vec<String>,
        parent_phone: Option<&str>,
        grade: Option<&str>,
    ) -> Result<Student, RosterError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RosterError::EmptyName);
        }
        let classes = clean_classes(classes);
        let mut s = Student::new(name, classes);
        s.parent_phone = parent_phone.and_then(phone::normalize_optional);
        s.grade = grade.map(|g| g.trim().to_string()).unwrap_or_default();
        for c in &s.classes {
            self.classes.insert(c.clone());
        }
        self.students.push(s.clone());
        Ok(s)
    }

    pub fn apply_patch(&mut self, student_id: &str, patch: StudentPatch) -> Result<Student, RosterError> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(RosterError::EmptyName);
            }
        }
        self.update(student_id, |s| {
            if let Some(name) = patch.name {
                s.name = name.trim().to_string();
            }
            if let Some(grade) = patch.grade {
                s.grade = grade.trim().to_string();
            }
            if let Some(classes) = patch.classes {
                s.classes = clean_classes(classes);
            }
            if let Some(p) = patch.parent_phone {
                s.parent_phone = p.as_deref().and_then(phone::normalize_optional);
            }
            Ok::<_, RosterError>(s.clone())
        })?
    }

    pub fn delete_student(&mut self, student_id: &str) -> Result<Student, RosterError> {
        let idx = self
            .students
            .iter()
            .position(|s| s.id == student_id)
            .ok_or(RosterError::StudentNotFound)?;
        Ok(self.students.remove(idx))
    }

    /// Appends imported students and grows the class list from them.
    pub fn merge_imported(&mut self, students: Vec<Student>) -> usize {
        let n = students.len();
        for s in students {
            for c in &s.classes {
                self.classes.insert(c.clone());
            }
            self.students.push(s);
        }
        n
    }

    /// Class filter plus case-insensitive name substring search.
    pub fn list(&self, class_name: Option<&str>, search: Option<&str>) -> Vec<&Student> {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        self.students
            .iter()
            .filter(|s| class_name.map(|c| s.in_class(c)).unwrap_or(true))
            .filter(|s| {
                needle
                    .as_deref()
                    .map(|n| s.name.to_lowercase().contains(n))
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Exact trimmed-name match, first hit wins.
    pub fn find_by_name(&self, name: &str, class_name: Option<&str>) -> Option<&Student> {
        let name = name.trim();
        self.students.iter().find(|s| {
            s.name.trim() == name && class_name.map(|c| s.in_class(c)).unwrap_or(true)
        })
    }

    pub fn delete_grade(&mut self, student_id: &str, grade_id: &str) -> Result<(), RosterError> {
        self.update(student_id, |s| {
            let idx = s
                .grades
                .iter()
                .position(|g| g.id == grade_id)
                .ok_or(RosterError::GradeNotFound)?;
            s.grades.remove(idx);
            Ok::<(), RosterError>(())
        })?
    }

    /// Wholesale replacement used by restore.
    pub fn replace_all(&mut self, students: Vec<Student>, classes: Vec<String>) {
        *self = Self::new(students, classes);
    }

    pub fn clear(&mut self) {
        self.students.clear();
        self.classes.clear();
    }
}

fn clean_classes(classes: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in classes {
        let t = c.trim();
        if !t.is_empty() && !out.iter().any(|x| x == t) {
            out.push(t.to_string());
        }
    }
    out
}
