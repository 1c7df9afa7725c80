//! Derived engagement and mood-trend summaries consumed by the scheduler.

use serde::{Deserialize, Serialize};

use crate::models::{CompletionStatus, ExerciseRecord, MoodRecord};
use crate::stats::{
    completion_rate, linear_slope, mean, moving_average, recent_completion_rate, round_to,
    strictly_decreasing, strictly_increasing, tail,
};

const TREND_WINDOW: usize = 7;
const IMPROVEMENT_MOOD_RUN: usize = 7;
const IMPROVEMENT_EXERCISES: usize = 14;
const IMPROVEMENT_COMPLETION: f64 = 0.85;
const DETERIORATION_MOOD_RUN: usize = 5;
const DETERIORATION_EXERCISES: usize = 7;
const DETERIORATION_COMPLETION: f64 = 0.5;

/// Chronological history the scheduler adapts against. Holds no raw records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementHistory {
    /// Mood scores in entry order. Lower values are read as improvement by the
    /// trend checks below.
    pub mood_scores: Vec<i32>,
    pub outcomes: Vec<CompletionStatus>,
    pub engagement_scores: Vec<f64>,
}

impl EngagementHistory {
    pub fn from_records(moods: &[MoodRecord], exercises: &[ExerciseRecord]) -> Self {
        let mut moods: Vec<&MoodRecord> = moods.iter().collect();
        moods.sort_by_key(|m| m.timestamp);
        let mut exercises: Vec<&ExerciseRecord> = exercises.iter().collect();
        exercises.sort_by_key(|e| e.start_time);

        Self {
            mood_scores: moods.iter().map(|m| m.intensity_level).collect(),
            outcomes: exercises.iter().map(|e| e.completion_status).collect(),
            engagement_scores: exercises.iter().filter_map(|e| e.engagement_score).collect(),
        }
    }

    /// Seven strictly falling mood scores, or more than 85% completion over the last 14 exercises.
    pub fn shows_improvement(&self) -> bool {
        if self.mood_scores.len() >= IMPROVEMENT_MOOD_RUN
            && strictly_decreasing(tail(&self.mood_scores, IMPROVEMENT_MOOD_RUN))
        {
            return true;
        }
        recent_completion_rate(&self.outcomes, IMPROVEMENT_EXERCISES)
            .is_some_and(|rate| rate > IMPROVEMENT_COMPLETION)
    }

    /// Five strictly rising mood scores, or under 50% completion over the last 7 exercises.
    pub fn shows_deterioration(&self) -> bool {
        if self.mood_scores.len() >= DETERIORATION_MOOD_RUN
            && strictly_increasing(tail(&self.mood_scores, DETERIORATION_MOOD_RUN))
        {
            return true;
        }
        recent_completion_rate(&self.outcomes, DETERIORATION_EXERCISES)
            .is_some_and(|rate| rate < DETERIORATION_COMPLETION)
    }

    pub fn mood_trend(&self) -> MoodTrend {
        MoodTrend::from_scores(&self.mood_scores)
    }

    pub fn profile(&self) -> EngagementProfile {
        EngagementProfile::from_history(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodTrend {
    pub direction: TrendDirection,
    pub slope: f64,
    pub recent_average: Option<f64>,
    pub total_entries: usize,
}

impl MoodTrend {
    pub fn from_scores(scores: &[i32]) -> Self {
        let values: Vec<f64> = scores.iter().map(|s| f64::from(*s)).collect();
        let slope = round_to(linear_slope(&values), 3);
        let recent_average = moving_average(&values, TREND_WINDOW)
            .last()
            .map(|avg| round_to(*avg, 2));

        let direction = if values.len() < TREND_WINDOW {
            TrendDirection::InsufficientData
        } else {
            let recent = mean(tail(&values, TREND_WINDOW));
            let previous = if values.len() >= TREND_WINDOW * 2 {
                mean(&values[values.len() - TREND_WINDOW * 2..values.len() - TREND_WINDOW])
            } else {
                values[0]
            };
            if recent < previous {
                TrendDirection::Improving
            } else if recent > previous {
                TrendDirection::Declining
            } else {
                TrendDirection::Stable
            }
        };

        Self {
            direction,
            slope,
            recent_average,
            total_entries: scores.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    None,
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementProfile {
    /// Unrounded, so threshold checks downstream agree with `engagement_level`.
    pub completion_rate: f64,
    pub average_engagement: f64,
    pub engagement_level: EngagementLevel,
    pub total_sessions: usize,
}

impl EngagementProfile {
    pub fn from_history(history: &EngagementHistory) -> Self {
        if history.outcomes.is_empty() {
            return Self {
                completion_rate: 0.0,
                average_engagement: 0.0,
                engagement_level: EngagementLevel::None,
                total_sessions: 0,
            };
        }

        let completion_rate = completion_rate(&history.outcomes);
        // Zero scores count as unrecorded.
        let scored: Vec<f64> = history
            .engagement_scores
            .iter()
            .copied()
            .filter(|score| *score != 0.0)
            .collect();
        let average_engagement = mean(&scored);

        let engagement_level = if completion_rate > 0.8 && average_engagement > 7.0 {
            EngagementLevel::High
        } else if completion_rate > 0.5 && average_engagement > 5.0 {
            EngagementLevel::Moderate
        } else {
            EngagementLevel::Low
        };

        Self {
            completion_rate,
            average_engagement: round_to(average_engagement, 2),
            engagement_level,
            total_sessions: history.outcomes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn at(day: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("valid timestamp")
            + Duration::days(day)
    }

    fn outcomes(completed: usize, other: usize) -> Vec<CompletionStatus> {
        let mut values = vec![CompletionStatus::Abandoned; other];
        values.extend(std::iter::repeat(CompletionStatus::Completed).take(completed));
        values
    }

    #[test]
    fn falling_mood_run_is_improvement() {
        let history = EngagementHistory {
            mood_scores: vec![9, 7, 6, 5, 4, 3, 2, 1],
            ..EngagementHistory::default()
        };
        assert!(history.shows_improvement());
        assert!(!history.shows_deterioration());
    }

    #[test]
    fn rising_mood_run_is_deterioration() {
        let history = EngagementHistory {
            mood_scores: vec![5, 2, 3, 4, 5, 6],
            ..EngagementHistory::default()
        };
        assert!(history.shows_deterioration());
        assert!(!history.shows_improvement());
    }

    #[test]
    fn completion_checks_need_minimum_samples() {
        let history = EngagementHistory {
            outcomes: outcomes(13, 0),
            ..EngagementHistory::default()
        };
        assert!(!history.shows_improvement());

        let history = EngagementHistory {
            outcomes: outcomes(13, 1),
            ..EngagementHistory::default()
        };
        assert!(history.shows_improvement());

        let history = EngagementHistory {
            outcomes: outcomes(0, 6),
            ..EngagementHistory::default()
        };
        assert!(!history.shows_deterioration());

        let history = EngagementHistory {
            outcomes: outcomes(3, 4),
            ..EngagementHistory::default()
        };
        assert!(history.shows_deterioration());
    }

    #[test]
    fn both_signals_can_fire_together() {
        let history = EngagementHistory {
            mood_scores: vec![7, 6, 5, 4, 3, 2, 1],
            outcomes: outcomes(3, 4),
            engagement_scores: Vec::new(),
        };
        assert!(history.shows_improvement());
        assert!(history.shows_deterioration());
    }

    #[test]
    fn mood_trend_compares_recent_week_to_previous() {
        let trend = MoodTrend::from_scores(&[8, 8, 8, 8, 8, 8, 8, 4, 4, 4, 4, 4, 4, 4]);
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert_eq!(trend.recent_average, Some(4.0));
        assert!(trend.slope < 0.0);

        let trend = MoodTrend::from_scores(&[2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(trend.direction, TrendDirection::Declining);

        let trend = MoodTrend::from_scores(&[5, 5, 5]);
        assert_eq!(trend.direction, TrendDirection::InsufficientData);
        assert_eq!(trend.recent_average, None);
    }

    #[test]
    fn profile_levels_follow_completion_and_engagement() {
        let history = EngagementHistory {
            mood_scores: Vec::new(),
            outcomes: outcomes(9, 1),
            engagement_scores: vec![8.0, 9.0, 0.0],
        };
        let profile = history.profile();
        assert_eq!(profile.completion_rate, 0.9);
        assert_eq!(profile.average_engagement, 8.5);
        assert_eq!(profile.engagement_level, EngagementLevel::High);

        let empty = EngagementHistory::default().profile();
        assert_eq!(empty.engagement_level, EngagementLevel::None);
    }

    #[test]
    fn history_orders_records_chronologically() {
        let moods = vec![
            MoodRecord {
                timestamp: at(2),
                intensity_level: 3,
            },
            MoodRecord {
                timestamp: at(1),
                intensity_level: 6,
            },
        ];
        let exercises = vec![
            ExerciseRecord {
                start_time: at(3),
                exercise_type: "body-scan".to_string(),
                completion_status: CompletionStatus::Abandoned,
                effectiveness_rating: None,
                engagement_score: None,
            },
            ExerciseRecord {
                start_time: at(0),
                exercise_type: "body-scan".to_string(),
                completion_status: CompletionStatus::Completed,
                effectiveness_rating: None,
                engagement_score: Some(6.5),
            },
        ];
        let history = EngagementHistory::from_records(&moods, &exercises);
        assert_eq!(history.mood_scores, vec![6, 3]);
        assert_eq!(
            history.outcomes,
            vec![CompletionStatus::Completed, CompletionStatus::Abandoned]
        );
        assert_eq!(history.engagement_scores, vec![6.5]);
    }
}
