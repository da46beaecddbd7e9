use crate::model::{GradeRecord, Semester};
use serde::Serialize;

/// Round half up to a whole percent: `Int(x + 0.5)`.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub earned: f64,
    pub possible: f64,
    pub percentage: i64,
}

impl Aggregate {
    pub fn has_points(&self) -> bool {
        self.possible > 0.0
    }
}

pub fn aggregate<'a, I>(grades: I) -> Aggregate
where
    I: IntoIterator<Item = &'a GradeRecord>,
{
    let mut earned = 0.0;
    let mut possible = 0.0;
    for g in grades {
        earned += g.score;
        possible += g.max_score;
    }
    let percentage = if possible > 0.0 {
        round_half_up(earned / possible * 100.0)
    } else {
        0
    };
    Aggregate {
        earned,
        possible,
        percentage,
    }
}

pub fn semester_aggregate(grades: &[GradeRecord], semester: Semester) -> Aggregate {
    aggregate(grades.iter().filter(|g| g.semester() == semester))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LetterGrade {
    #[serde(rename = "أ")]
    Excellent,
    #[serde(rename = "ب")]
    VeryGood,
    #[serde(rename = "ج")]
    Good,
    #[serde(rename = "د")]
    Acceptable,
    #[serde(rename = "هـ")]
    NeedsHelp,
}

impl LetterGrade {
    pub fn from_percentage(pct: i64) -> Self {
        if pct >= 90 {
            Self::Excellent
        } else if pct >= 80 {
            Self::VeryGood
        } else if pct >= 65 {
            Self::Good
        } else if pct >= 50 {
            Self::Acceptable
        } else {
            Self::NeedsHelp
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "ممتاز",
            Self::VeryGood => "جيد جداً",
            Self::Good => "جيد",
            Self::Acceptable => "مقبول",
            Self::NeedsHelp => "يحتاج مساعدة",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub semester1: Aggregate,
    pub semester2: Aggregate,
    /// Plain sums across both semesters, for display only.
    pub earned: f64,
    pub possible: f64,
    pub percentage: i64,
    pub letter: Option<LetterGrade>,
}

/// Final score is the mean of the two rounded semester percentages, not a
/// ratio of pooled points: a light semester weighs as much as a heavy one.
pub fn final_result(grades: &[GradeRecord]) -> FinalResult {
    let s1 = semester_aggregate(grades, Semester::First);
    let s2 = semester_aggregate(grades, Semester::Second);

    let percentage = match (s1.has_points(), s2.has_points()) {
        (true, true) => round_half_up((s1.percentage + s2.percentage) as f64 / 2.0),
        (true, false) => s1.percentage,
        (false, true) => s2.percentage,
        (false, false) => 0,
    };
    let letter = if s1.has_points() || s2.has_points() {
        Some(LetterGrade::from_percentage(percentage))
    } else {
        None
    };

    FinalResult {
        semester1: s1,
        semester2: s2,
        earned: s1.earned + s2.earned,
        possible: s1.possible + s2.possible,
        percentage,
        letter,
    }
}

/// Pooled percentage over every grade regardless of semester (list views).
pub fn overall_percentage(grades: &[GradeRecord]) -> i64 {
    aggregate(grades.iter()).percentage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(score: f64, max: f64, sem: Option<Semester>) -> GradeRecord {
        GradeRecord {
            id: crate::model::new_id(),
            subject: "المادة".to_string(),
            category: "اختبار".to_string(),
            tool_id: None,
            score,
            max_score: max,
            date: "2024-01-01T00:00:00Z".to_string(),
            semester: sem,
        }
    }

    #[test]
    fn round_half_up_on_percentages() {
        assert_eq!(round_half_up(83.5), 84);
        assert_eq!(round_half_up(76.666), 77);
        assert_eq!(round_half_up(76.4999), 76);
        assert_eq!(round_half_up(0.0), 0);
    }

    #[test]
    fn semester_and_final_aggregation() {
        let grades = vec![
            grade(8.0, 10.0, Some(Semester::First)),
            grade(15.0, 20.0, Some(Semester::First)),
            grade(9.0, 10.0, Some(Semester::Second)),
        ];
        let s1 = semester_aggregate(&grades, Semester::First);
        assert_eq!(s1.earned, 23.0);
        assert_eq!(s1.possible, 30.0);
        assert_eq!(s1.percentage, 77);

        let s2 = semester_aggregate(&grades, Semester::Second);
        assert_eq!(s2.earned, 9.0);
        assert_eq!(s2.possible, 10.0);
        assert_eq!(s2.percentage, 90);

        let f = final_result(&grades);
        assert_eq!(f.percentage, 84);
        assert_eq!(f.earned, 32.0);
        assert_eq!(f.possible, 40.0);
        assert_eq!(f.letter, Some(LetterGrade::VeryGood));
    }

    #[test]
    fn final_averages_percentages_not_points() {
        // Pooled points would give 101/120 = 84%; the semester mean is 51%.
        let grades = vec![
            grade(1.0, 10.0, Some(Semester::First)),
            grade(100.0, 110.0, Some(Semester::Second)),
        ];
        let f = final_result(&grades);
        assert_eq!(f.semester1.percentage, 10);
        assert_eq!(f.semester2.percentage, 91);
        assert_eq!(f.percentage, 51);
        assert_eq!(overall_percentage(&grades), 84);
    }

    #[test]
    fn empty_grades_have_no_letter() {
        let a = aggregate(&Vec::<GradeRecord>::new());
        assert_eq!(a, Aggregate::default());
        let f = final_result(&[]);
        assert_eq!(f.percentage, 0);
        assert_eq!(f.letter, None);
    }

    #[test]
    fn untagged_grades_fall_in_first_semester_only() {
        let grades = vec![grade(5.0, 10.0, None)];
        let f = final_result(&grades);
        assert_eq!(f.semester1.percentage, 50);
        assert!(!f.semester2.has_points());
        assert_eq!(f.percentage, 50);
        assert_eq!(f.letter, Some(LetterGrade::Acceptable));
    }

    #[test]
    fn letter_ladder_boundaries() {
        assert_eq!(LetterGrade::from_percentage(90), LetterGrade::Excellent);
        assert_eq!(LetterGrade::from_percentage(89), LetterGrade::VeryGood);
        assert_eq!(LetterGrade::from_percentage(80), LetterGrade::VeryGood);
        assert_eq!(LetterGrade::from_percentage(65), LetterGrade::Good);
        assert_eq!(LetterGrade::from_percentage(64), LetterGrade::Acceptable);
        assert_eq!(LetterGrade::from_percentage(50), LetterGrade::Acceptable);
        assert_eq!(LetterGrade::from_percentage(49), LetterGrade::NeedsHelp);
        assert_eq!(serde_json::to_value(LetterGrade::NeedsHelp).ok(), Some(serde_json::json!("هـ")));
    }
}
