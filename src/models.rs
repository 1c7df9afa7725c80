use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Abandoned,
    Started,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Completed => "completed",
            CompletionStatus::Abandoned => "abandoned",
            CompletionStatus::Started => "started",
        }
    }
}

impl FromStr for CompletionStatus {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "completed" => Ok(CompletionStatus::Completed),
            "abandoned" => Ok(CompletionStatus::Abandoned),
            "started" => Ok(CompletionStatus::Started),
            other => Err(EngineError::validation(format!(
                "unknown completion status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodRecord {
    pub timestamp: NaiveDateTime,
    pub intensity_level: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    pub start_time: NaiveDateTime,
    pub exercise_type: String,
    pub completion_status: CompletionStatus,
    pub effectiveness_rating: Option<i32>,
    pub engagement_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisRecord {
    pub created_at: NaiveDateTime,
    pub severity_level: String,
    pub alert_type: String,
}

/// Validated, time-ordered snapshot of one patient's activity over an analysis period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
    moods: Vec<MoodRecord>,
    exercises: Vec<ExerciseRecord>,
    crises: Vec<CrisisRecord>,
}

impl ActivityWindow {
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        mut moods: Vec<MoodRecord>,
        mut exercises: Vec<ExerciseRecord>,
        mut crises: Vec<CrisisRecord>,
    ) -> EngineResult<Self> {
        if start > end {
            return Err(EngineError::validation(format!(
                "window start {start} is after end {end}"
            )));
        }
        let in_window = |at: NaiveDateTime| at >= start && at <= end;

        for mood in &moods {
            check_range("mood intensity_level", mood.intensity_level, 0, 10)?;
            if !in_window(mood.timestamp) {
                return Err(outside_window("mood entry", mood.timestamp));
            }
        }
        for exercise in &exercises {
            if exercise.exercise_type.trim().is_empty() {
                return Err(EngineError::validation("exercise_type must not be empty"));
            }
            if let Some(rating) = exercise.effectiveness_rating {
                check_range("effectiveness_rating", rating, 0, 10)?;
            }
            if let Some(score) = exercise.engagement_score {
                if !score.is_finite() {
                    return Err(EngineError::validation("engagement_score must be finite"));
                }
            }
            if !in_window(exercise.start_time) {
                return Err(outside_window("exercise session", exercise.start_time));
            }
        }
        for crisis in &crises {
            if !in_window(crisis.created_at) {
                return Err(outside_window("crisis alert", crisis.created_at));
            }
        }

        moods.sort_by_key(|m| m.timestamp);
        exercises.sort_by_key(|e| e.start_time);
        crises.sort_by_key(|c| c.created_at);

        Ok(Self {
            start,
            end,
            moods,
            exercises,
            crises,
        })
    }

    pub fn empty(start: NaiveDateTime, end: NaiveDateTime) -> EngineResult<Self> {
        Self::new(start, end, Vec::new(), Vec::new(), Vec::new())
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn moods(&self) -> &[MoodRecord] {
        &self.moods
    }

    pub fn exercises(&self) -> &[ExerciseRecord] {
        &self.exercises
    }

    pub fn crises(&self) -> &[CrisisRecord] {
        &self.crises
    }
}

fn check_range(field: &str, value: i32, min: i32, max: i32) -> EngineResult<()> {
    if value < min || value > max {
        return Err(EngineError::validation(format!(
            "{field} {value} outside {min}..={max}"
        )));
    }
    Ok(())
}

fn outside_window(what: &str, at: NaiveDateTime) -> EngineError {
    EngineError::validation(format!("{what} at {at} falls outside the analysis window"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityBand {
    Minimal,
    Mild,
    Moderate,
    ModeratelySevere,
    Severe,
}

impl SeverityBand {
    pub fn from_score(total_score: i32) -> Self {
        match total_score {
            i32::MIN..=4 => SeverityBand::Minimal,
            5..=9 => SeverityBand::Mild,
            10..=14 => SeverityBand::Moderate,
            15..=19 => SeverityBand::ModeratelySevere,
            _ => SeverityBand::Severe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityBand::Minimal => "minimal",
            SeverityBand::Mild => "mild",
            SeverityBand::Moderate => "moderate",
            SeverityBand::ModeratelySevere => "moderately_severe",
            SeverityBand::Severe => "severe",
        }
    }

    pub fn is_crisis_band(&self) -> bool {
        matches!(self, SeverityBand::ModeratelySevere | SeverityBand::Severe)
    }
}

/// A PHQ-9 assessment. Construct through [`Assessment::new`] or [`Assessment::from_item_scores`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    id: Uuid,
    assessment_date: NaiveDateTime,
    total_score: i32,
    q9_score: i32,
    severity_level: SeverityBand,
    q9_risk_flag: bool,
}

impl Assessment {
    pub fn new(
        id: Uuid,
        assessment_date: NaiveDateTime,
        total_score: i32,
        q9_score: i32,
        q9_risk_flag: bool,
    ) -> EngineResult<Self> {
        check_range("total_score", total_score, 0, 27)?;
        check_range("q9_score", q9_score, 0, 3)?;
        if q9_score > total_score {
            return Err(EngineError::validation(format!(
                "q9_score {q9_score} exceeds total_score {total_score}"
            )));
        }
        Ok(Self {
            id,
            assessment_date,
            total_score,
            q9_score,
            severity_level: SeverityBand::from_score(total_score),
            q9_risk_flag,
        })
    }

    /// Scores all nine items; item 9 at 2 or above raises the risk flag.
    pub fn from_item_scores(
        id: Uuid,
        assessment_date: NaiveDateTime,
        items: [i32; 9],
    ) -> EngineResult<Self> {
        for (index, score) in items.iter().enumerate() {
            check_range(&format!("q{}_score", index + 1), *score, 0, 3)?;
        }
        let q9_score = items[8];
        Self::new(id, assessment_date, items.iter().sum(), q9_score, q9_score >= 2)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn assessment_date(&self) -> NaiveDateTime {
        self.assessment_date
    }

    pub fn total_score(&self) -> i32 {
        self.total_score
    }

    pub fn q9_score(&self) -> i32 {
        self.q9_score
    }

    pub fn severity_level(&self) -> SeverityBand {
        self.severity_level
    }

    pub fn q9_risk_flag(&self) -> bool {
        self.q9_risk_flag
    }
}

#[derive(Debug, Clone)]
pub struct PatientRecord {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

/// Calendar week key (Monday) used for weekly grouping.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    use chrono::Datelike;
    date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
}
