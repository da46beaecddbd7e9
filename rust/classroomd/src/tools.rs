use crate::model::{new_id, AssessmentTool, GradeRecord, Student};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("tool name must not be empty")]
    EmptyName,
    #[error("maxScore must be a positive number")]
    BadMaxScore,
    #[error("tool not found")]
    NotFound,
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyName | Self::BadMaxScore => "bad_params",
            Self::NotFound => "not_found",
        }
    }
}

const DEFAULT_TOOLS: &[(&str, f64)] = &[
    ("العرض الشفوي", 10.0),
    ("السؤال القصير الأول", 5.0),
    ("الاختبار القصير الأول", 15.0),
    ("التقرير", 10.0),
    ("الاختبار النهائي", 40.0),
];

/// How a grade's category resolves against the live registry.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryRef<'a> {
    Resolved(&'a AssessmentTool),
    /// The tool is gone; the grade keeps the label and cap it was recorded with.
    Historical { label: &'a str, max_score: f64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolRegistry {
    tools: Vec<AssessmentTool>,
}

impl ToolRegistry {
    pub fn with_defaults() -> Self {
        Self {
            tools: DEFAULT_TOOLS
                .iter()
                .map(|(name, max)| AssessmentTool {
                    id: new_id(),
                    name: name.to_string(),
                    max_score: *max,
                })
                .collect(),
        }
    }

    pub fn from_tools(tools: Vec<AssessmentTool>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[AssessmentTool] {
        &self.tools
    }

    pub fn get(&self, tool_id: &str) -> Option<&AssessmentTool> {
        self.tools.iter().find(|t| t.id == tool_id)
    }

    /// First tool carrying exactly this name; duplicates are legal.
    pub fn find_by_name(&self, name: &str) -> Option<&AssessmentTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Appends a tool. Names are not required to be unique.
    pub fn create(&mut self, name: &str, max_score: f64) -> Result<AssessmentTool, ToolError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ToolError::EmptyName);
        }
        validate_max(max_score)?;
        let tool = AssessmentTool {
            id: new_id(),
            name: name.to_string(),
            max_score,
        };
        self.tools.push(tool.clone());
        Ok(tool)
    }

    pub fn update_max_score(
        &mut self,
        tool_id: &str,
        new_max: f64,
    ) -> Result<AssessmentTool, ToolError> {
        validate_max(new_max)?;
        let tool = self
            .tools
            .iter_mut()
            .find(|t| t.id == tool_id)
            .ok_or(ToolError::NotFound)?;
        tool.max_score = new_max;
        Ok(tool.clone())
    }

    /// Removes the tool only. Grades recorded against it stay untouched.
    pub fn delete(&mut self, tool_id: &str) -> Result<AssessmentTool, ToolError> {
        let idx = self
            .tools
            .iter()
            .position(|t| t.id == tool_id)
            .ok_or(ToolError::NotFound)?;
        Ok(self.tools.remove(idx))
    }

    /// Informational maximum possible total; never enforced.
    pub fn sum_of_caps(&self) -> f64 {
        self.tools.iter().map(|t| t.max_score).sum()
    }

    pub fn resolve<'a>(&'a self, grade: &'a GradeRecord) -> CategoryRef<'a> {
        let live = match grade.tool_id.as_deref() {
            Some(id) => self.get(id),
            None => self.find_by_name(&grade.category),
        };
        match live {
            Some(tool) => CategoryRef::Resolved(tool),
            None => CategoryRef::Historical {
                label: &grade.category,
                max_score: grade.max_score,
            },
        }
    }
}

fn validate_max(v: f64) -> Result<(), ToolError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(ToolError::BadMaxScore)
    }
}

/// A grade belongs to a tool through its recorded tool id; grades recorded
/// before ids were tracked fall back to the category label.
pub fn grade_belongs_to(grade: &GradeRecord, tool: &AssessmentTool) -> bool {
    match grade.tool_id.as_deref() {
        Some(id) => id == tool.id,
        None => grade.category == tool.name,
    }
}

/// Rewrites `maxScore` on every grade of the tool across the roster.
/// Scores are left as recorded, so percentages shift. Returns the number of
/// grades rewritten.
pub fn cascade_max_score(tool: &AssessmentTool, students: &mut [Student]) -> usize {
    let mut rewritten = 0usize;
    for student in students.iter_mut() {
        for g in student.grades.iter_mut() {
            if grade_belongs_to(g, tool) {
                g.max_score = tool.max_score;
                rewritten += 1;
            }
        }
    }
    rewritten
}
