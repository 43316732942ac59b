use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementId {
    ExcellentReciter,
    VerseMilestone,
    SteadyAttendance,
    CourseGraduate,
    TestAce,
}

impl AchievementId {
    pub fn code(self) -> &'static str {
        match self {
            AchievementId::ExcellentReciter => "excellent_reciter",
            AchievementId::VerseMilestone => "verse_milestone",
            AchievementId::SteadyAttendance => "steady_attendance",
            AchievementId::CourseGraduate => "course_graduate",
            AchievementId::TestAce => "test_ace",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "excellent_reciter" => Some(AchievementId::ExcellentReciter),
            "verse_milestone" => Some(AchievementId::VerseMilestone),
            "steady_attendance" => Some(AchievementId::SteadyAttendance),
            "course_graduate" => Some(AchievementId::CourseGraduate),
            "test_ace" => Some(AchievementId::TestAce),
            _ => None,
        }
    }
}

/// Threshold configuration for the rule set. Stored as a settings blob;
/// degenerate values are rejected when the configuration is written, so rule
/// evaluation never has to second-guess them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementThresholds {
    /// Lifetime count of excellent-graded reports.
    pub excellent_grades: u32,
    /// Verses memorized since January 1st of the evaluation year.
    pub verse_milestone: u32,
    /// Present days required within the trailing window.
    pub present_days: u32,
    /// Length of that trailing window, in days.
    pub present_window_days: u32,
    /// Minimum test score as a percentage of the test's maximum.
    pub test_score_percent: f64,
}

impl Default for AchievementThresholds {
    fn default() -> Self {
        AchievementThresholds {
            excellent_grades: 10,
            verse_milestone: 500,
            present_days: 20,
            present_window_days: 30,
            test_score_percent: 90.0,
        }
    }
}

impl AchievementThresholds {
    pub fn validate(&self) -> Result<(), String> {
        if self.excellent_grades == 0 {
            return Err("excellentGrades must be at least 1".to_string());
        }
        if self.verse_milestone == 0 {
            return Err("verseMilestone must be at least 1".to_string());
        }
        if self.present_days == 0 {
            return Err("presentDays must be at least 1".to_string());
        }
        if self.present_window_days == 0 {
            return Err("presentWindowDays must be at least 1".to_string());
        }
        if !(self.test_score_percent > 0.0 && self.test_score_percent <= 100.0) {
            return Err("testScorePercent must be within (0, 100]".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestScore {
    pub score: f64,
    pub max_score: f64,
}

/// Snapshot of the counters the rules read, assembled by the caller from the
/// record store. The engine itself holds no state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentHistory {
    pub excellent_grade_count: u64,
    pub verses_since_year_start: u64,
    pub present_days_in_window: u32,
    pub completed_enrollments: u32,
    pub test_scores: Vec<TestScore>,
}

/// Evaluates the rule set and returns the achievements that newly qualify,
/// in rule order. Ids already present in `already_awarded` are never
/// returned, whatever the history says: awards are one-time and monotonic.
pub fn evaluate(
    history: &StudentHistory,
    thresholds: &AchievementThresholds,
    already_awarded: &HashSet<AchievementId>,
) -> Vec<AchievementId> {
    let mut earned = Vec::new();
    let mut award = |id: AchievementId, qualifies: bool| {
        if qualifies && !already_awarded.contains(&id) {
            earned.push(id);
        }
    };

    award(
        AchievementId::ExcellentReciter,
        history.excellent_grade_count >= u64::from(thresholds.excellent_grades),
    );
    award(
        AchievementId::VerseMilestone,
        history.verses_since_year_start >= u64::from(thresholds.verse_milestone),
    );
    award(
        AchievementId::SteadyAttendance,
        history.present_days_in_window >= thresholds.present_days,
    );
    award(
        AchievementId::CourseGraduate,
        history.completed_enrollments >= 1,
    );
    award(
        AchievementId::TestAce,
        history.test_scores.iter().any(|t| {
            t.max_score > 0.0 && t.score / t.max_score * 100.0 >= thresholds.test_score_percent
        }),
    );

    earned
}
