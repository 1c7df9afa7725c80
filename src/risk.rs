use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::RiskThresholds;
use crate::models::{week_start, ActivityWindow, CompletionStatus, CrisisRecord, ExerciseRecord};
use crate::stats::{mean, ratio, round_to};

const MAX_SEVERITY_ORDINAL: u32 = 4;
const FINDING_COUNT: u32 = 5;
const RECENT_CRISIS_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    pub fn ordinal(&self) -> u32 {
        match self {
            Severity::None => 0,
            Severity::Low => 1,
            Severity::Moderate => 2,
            Severity::High => 3,
            Severity::Critical => MAX_SEVERITY_ORDINAL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_percentage(risk_percentage: f64) -> Self {
        if risk_percentage >= 0.6 {
            RiskLevel::Critical
        } else if risk_percentage >= 0.4 {
            RiskLevel::High
        } else if risk_percentage >= 0.2 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    EngagementDrop,
    NegativeRatings,
    CrisisUsageSpike,
    AvoidancePattern,
    IsolationIndicator,
}

impl RiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::EngagementDrop => "engagement_drop",
            RiskType::NegativeRatings => "negative_ratings",
            RiskType::CrisisUsageSpike => "crisis_usage_spike",
            RiskType::AvoidancePattern => "avoidance_pattern",
            RiskType::IsolationIndicator => "isolation_indicator",
        }
    }

    pub fn recommended_action(&self) -> &'static str {
        match self {
            RiskType::EngagementDrop => {
                "Consider reaching out to understand barriers and provide support"
            }
            RiskType::NegativeRatings => "Review exercise difficulty and provide additional guidance",
            RiskType::CrisisUsageSpike => "Assess current mental health status and crisis risk",
            RiskType::AvoidancePattern => "Address barriers and consider alternative approaches",
            RiskType::IsolationIndicator => "Assess social support and encourage social engagement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAvoidance {
    pub rate: f64,
    pub count: usize,
}

/// Heuristic-specific detail behind a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    InsufficientData {
        samples_available: usize,
        samples_required: usize,
    },
    EngagementDrop {
        drop_percentage: f64,
        drop_duration: usize,
        weekly_engagement: Vec<usize>,
    },
    NegativeRatings {
        avg_rating: f64,
        negative_sessions_count: usize,
        negative_percentage: f64,
        total_sessions_rated: usize,
    },
    CrisisUsageSpike {
        spike_percentage: f64,
        crisis_sessions_count: usize,
        recent_crisis_usage: f64,
        earlier_crisis_usage: f64,
    },
    AvoidancePattern {
        avoidance_rate: f64,
        abandoned_sessions_count: usize,
        most_avoided_exercise: Option<String>,
        avoidance_by_type: BTreeMap<String, TypeAvoidance>,
    },
    IsolationIndicator {
        isolation_score: f64,
        night_sessions_percentage: f64,
        isolation_indicators: Vec<String>,
        total_sessions_analyzed: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub detected: bool,
    pub severity: Severity,
    pub metric_value: f64,
    pub intervention_needed: bool,
    /// Set when the minimum-sample guard tripped; `severity` is then `none`
    /// because nothing could be measured, not because nothing is wrong.
    pub insufficient_data: bool,
    pub evidence: Evidence,
}

impl RiskFinding {
    fn insufficient(samples_available: usize, samples_required: usize) -> Self {
        Self {
            detected: false,
            severity: Severity::None,
            metric_value: 0.0,
            intervention_needed: false,
            insufficient_data: true,
            evidence: Evidence::InsufficientData {
                samples_available,
                samples_required,
            },
        }
    }

    fn measured(detected: bool, severity: Severity, metric_value: f64, evidence: Evidence) -> Self {
        Self {
            detected,
            severity,
            metric_value: round_to(metric_value, 3),
            intervention_needed: severity >= Severity::Moderate,
            insufficient_data: false,
            evidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    #[serde(rename = "type")]
    pub alert_type: RiskType,
    pub severity: Severity,
    pub message: String,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisRiskLevel {
    Low,
    Medium,
    High,
}

impl CrisisRiskLevel {
    pub fn from_frequency(frequency: usize) -> Self {
        match frequency {
            0 => CrisisRiskLevel::Low,
            1 | 2 => CrisisRiskLevel::Medium,
            _ => CrisisRiskLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrisisRiskLevel::Low => "low",
            CrisisRiskLevel::Medium => "medium",
            CrisisRiskLevel::High => "high",
        }
    }
}

/// Frequency and timing of crisis alerts raised inside the analysis window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisPattern {
    pub frequency: usize,
    pub risk_level: CrisisRiskLevel,
    /// Hour of day with the most alerts; ties go to the earliest hour.
    pub most_common_hour: Option<u32>,
    /// Alerts in the seven days before `now`.
    pub recent_crises: usize,
}

impl CrisisPattern {
    pub fn from_records(crises: &[CrisisRecord], now: NaiveDateTime) -> Self {
        let mut by_hour: BTreeMap<u32, usize> = BTreeMap::new();
        for crisis in crises {
            *by_hour.entry(crisis.created_at.hour()).or_default() += 1;
        }
        let most_common_hour = by_hour
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(hour, _)| *hour);

        let recent_since = now - Duration::days(RECENT_CRISIS_DAYS);
        let recent_crises = crises
            .iter()
            .filter(|crisis| crisis.created_at >= recent_since)
            .count();

        Self {
            frequency: crises.len(),
            risk_level: CrisisRiskLevel::from_frequency(crises.len()),
            most_common_hour,
            recent_crises,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub engagement_drop: RiskFinding,
    pub negative_ratings: RiskFinding,
    pub crisis_usage_spike: RiskFinding,
    pub avoidance_pattern: RiskFinding,
    pub isolation_indicator: RiskFinding,
    pub overall_risk_level: RiskLevel,
    pub risk_percentage: f64,
    pub alerts: Vec<RiskAlert>,
    pub crisis_pattern: CrisisPattern,
}

impl RiskSummary {
    pub fn findings(&self) -> [(RiskType, &RiskFinding); 5] {
        [
            (RiskType::EngagementDrop, &self.engagement_drop),
            (RiskType::NegativeRatings, &self.negative_ratings),
            (RiskType::CrisisUsageSpike, &self.crisis_usage_spike),
            (RiskType::AvoidancePattern, &self.avoidance_pattern),
            (RiskType::IsolationIndicator, &self.isolation_indicator),
        ]
    }

    pub fn has_insufficient_data(&self) -> bool {
        self.findings()
            .iter()
            .any(|(_, finding)| finding.insufficient_data)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskSignalDetector {
    thresholds: RiskThresholds,
}

impl RiskSignalDetector {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    pub fn analyze(&self, window: &ActivityWindow) -> RiskSummary {
        let sessions = window.exercises();
        let engagement_drop = self.detect_engagement_drop(sessions);
        let negative_ratings = self.detect_negative_ratings(sessions);
        let crisis_usage_spike = self.detect_crisis_usage_spike(sessions);
        let avoidance_pattern = self.detect_avoidance_pattern(sessions);
        let isolation_indicator = self.detect_isolation(sessions);

        let mut summary = RiskSummary {
            engagement_drop,
            negative_ratings,
            crisis_usage_spike,
            avoidance_pattern,
            isolation_indicator,
            overall_risk_level: RiskLevel::Low,
            risk_percentage: 0.0,
            alerts: Vec::new(),
            crisis_pattern: CrisisPattern::from_records(window.crises(), window.end()),
        };

        let total: u32 = summary
            .findings()
            .iter()
            .map(|(_, finding)| finding.severity.ordinal())
            .sum();
        let risk_percentage = f64::from(total) / f64::from(FINDING_COUNT * MAX_SEVERITY_ORDINAL);
        summary.overall_risk_level = RiskLevel::from_percentage(risk_percentage);
        summary.risk_percentage = round_to(risk_percentage, 3);
        summary.alerts = build_alerts(&summary);

        tracing::debug!(
            sessions = sessions.len(),
            overall = summary.overall_risk_level.as_str(),
            alerts = summary.alerts.len(),
            crises = summary.crisis_pattern.frequency,
            "risk analysis complete"
        );
        summary
    }

    fn detect_engagement_drop(&self, sessions: &[ExerciseRecord]) -> RiskFinding {
        let required = self.thresholds.min_sessions_for_trend;
        if sessions.len() < required {
            return RiskFinding::insufficient(sessions.len(), required);
        }
        let weekly_counts: Vec<usize> = weekly_buckets(sessions, |_| false)
            .into_values()
            .map(|bucket| bucket.total)
            .collect();
        if weekly_counts.len() < 2 {
            return RiskFinding::insufficient(weekly_counts.len(), 2);
        }

        let counts: Vec<f64> = weekly_counts.iter().map(|c| *c as f64).collect();
        let (earlier, recent) = split_recent(&counts, self.thresholds.recent_weeks);
        let recent_avg = mean(recent);
        // With no full earlier period the first week stands in as the baseline.
        let earlier_avg = if earlier.is_empty() {
            counts[0]
        } else {
            mean(earlier)
        };
        let drop_percentage = ratio(earlier_avg - recent_avg, earlier_avg);

        let detected = drop_percentage > self.thresholds.engagement_drop;
        let severity = if detected {
            engagement_drop_severity(drop_percentage)
        } else {
            Severity::None
        };

        RiskFinding::measured(
            detected,
            severity,
            drop_percentage,
            Evidence::EngagementDrop {
                drop_percentage: round_to(drop_percentage, 3),
                drop_duration: weekly_counts.len(),
                weekly_engagement: weekly_counts,
            },
        )
    }

    fn detect_negative_ratings(&self, sessions: &[ExerciseRecord]) -> RiskFinding {
        let ratings: Vec<f64> = sessions
            .iter()
            .filter_map(|s| s.effectiveness_rating)
            .map(f64::from)
            .collect();
        if ratings.is_empty() {
            return RiskFinding::insufficient(0, 1);
        }

        let avg_rating = mean(&ratings);
        let negative_sessions_count = ratings
            .iter()
            .filter(|rating| **rating < self.thresholds.negative_rating)
            .count();
        let negative_percentage = ratio(negative_sessions_count as f64, ratings.len() as f64);

        let detected = avg_rating < self.thresholds.negative_rating
            || negative_percentage > self.thresholds.negative_share;
        let severity = if !detected {
            Severity::None
        } else if avg_rating < 2.0 || negative_percentage > 0.9 {
            Severity::Critical
        } else if avg_rating < 3.0 || negative_percentage > 0.8 {
            Severity::High
        } else {
            Severity::Moderate
        };

        RiskFinding::measured(
            detected,
            severity,
            avg_rating,
            Evidence::NegativeRatings {
                avg_rating: round_to(avg_rating, 2),
                negative_sessions_count,
                negative_percentage: round_to(negative_percentage, 3),
                total_sessions_rated: ratings.len(),
            },
        )
    }

    fn detect_crisis_usage_spike(&self, sessions: &[ExerciseRecord]) -> RiskFinding {
        let required = self.thresholds.min_sessions_for_trend;
        if sessions.len() < required {
            return RiskFinding::insufficient(sessions.len(), required);
        }
        let weeks: Vec<WeekBucket> = weekly_buckets(sessions, |s| {
            self.thresholds.is_crisis_exercise(&s.exercise_type)
        })
        .into_values()
        .collect();
        if weeks.len() < 2 {
            return RiskFinding::insufficient(weeks.len(), 2);
        }

        let shares: Vec<f64> = weeks
            .iter()
            .map(|week| ratio(week.crisis as f64, week.total as f64))
            .collect();
        let (earlier, recent) = split_recent(&shares, self.thresholds.recent_weeks);
        let recent_crisis_usage = mean(recent);
        let earlier_crisis_usage = mean(earlier);
        let spike_percentage =
            ratio(recent_crisis_usage - earlier_crisis_usage, earlier_crisis_usage);
        let crisis_sessions_count: usize = weeks.iter().map(|week| week.crisis).sum();

        let detected = spike_percentage > self.thresholds.crisis_usage_spike;
        let severity = if !detected {
            Severity::None
        } else if spike_percentage > 5.0 || crisis_sessions_count > 10 {
            Severity::Critical
        } else if spike_percentage > 3.0 || crisis_sessions_count > 7 {
            Severity::High
        } else {
            Severity::Moderate
        };

        RiskFinding::measured(
            detected,
            severity,
            spike_percentage,
            Evidence::CrisisUsageSpike {
                spike_percentage: round_to(spike_percentage, 3),
                crisis_sessions_count,
                recent_crisis_usage: round_to(recent_crisis_usage, 3),
                earlier_crisis_usage: round_to(earlier_crisis_usage, 3),
            },
        )
    }

    fn detect_avoidance_pattern(&self, sessions: &[ExerciseRecord]) -> RiskFinding {
        if sessions.is_empty() {
            return RiskFinding::insufficient(0, 1);
        }

        // First-seen order keeps the tie-break for "most avoided" stable.
        let mut by_type: Vec<(&str, usize, usize)> = Vec::new();
        for session in sessions {
            let abandoned = usize::from(session.completion_status == CompletionStatus::Abandoned);
            match by_type
                .iter_mut()
                .find(|(name, _, _)| *name == session.exercise_type)
            {
                Some(entry) => {
                    entry.1 += 1;
                    entry.2 += abandoned;
                }
                None => by_type.push((session.exercise_type.as_str(), 1, abandoned)),
            }
        }

        let abandoned_sessions_count: usize = by_type.iter().map(|(_, _, a)| a).sum();
        let avoidance_rate = ratio(abandoned_sessions_count as f64, sessions.len() as f64);

        let mut most_avoided_exercise = None;
        let mut highest_rate = 0.0;
        for (name, total, abandoned) in &by_type {
            let rate = ratio(*abandoned as f64, *total as f64);
            if rate > highest_rate {
                highest_rate = rate;
                most_avoided_exercise = Some(name.to_string());
            }
        }
        let avoidance_by_type = by_type
            .iter()
            .map(|(name, total, abandoned)| {
                (
                    name.to_string(),
                    TypeAvoidance {
                        rate: round_to(ratio(*abandoned as f64, *total as f64), 3),
                        count: *abandoned,
                    },
                )
            })
            .collect();

        let detected = avoidance_rate > self.thresholds.avoidance_rate;
        // The moderate arm only fires if the detection threshold is lowered below 0.8.
        let severity = if !detected {
            Severity::None
        } else if avoidance_rate > 0.9 {
            Severity::Critical
        } else if avoidance_rate > 0.8 {
            Severity::High
        } else {
            Severity::Moderate
        };

        RiskFinding::measured(
            detected,
            severity,
            avoidance_rate,
            Evidence::AvoidancePattern {
                avoidance_rate: round_to(avoidance_rate, 3),
                abandoned_sessions_count,
                most_avoided_exercise,
                avoidance_by_type,
            },
        )
    }

    fn detect_isolation(&self, sessions: &[ExerciseRecord]) -> RiskFinding {
        if sessions.is_empty() {
            return RiskFinding::insufficient(0, 1);
        }

        let night_sessions = sessions
            .iter()
            .filter(|s| {
                let hour = s.start_time.hour();
                hour >= 22 || hour <= 6
            })
            .count();
        let night_sessions_percentage = ratio(night_sessions as f64, sessions.len() as f64);

        let mut active_days: Vec<NaiveDate> = sessions.iter().map(|s| s.start_time.date()).collect();
        active_days.dedup();
        let avg_sessions_per_day = ratio(sessions.len() as f64, active_days.len() as f64);

        let mut isolation_indicators = Vec::new();
        let mut isolation_score = 0.0;
        if night_sessions_percentage > 0.5 {
            isolation_indicators.push("High percentage of late-night sessions".to_string());
            isolation_score += night_sessions_percentage * 0.4;
        }
        if avg_sessions_per_day > 3.0 {
            isolation_indicators.push("Multiple sessions per day pattern".to_string());
            isolation_score += (avg_sessions_per_day / 5.0).min(0.3);
        }

        let detected = isolation_score > self.thresholds.isolation_score;
        let severity = if detected {
            isolation_severity(isolation_score)
        } else {
            Severity::None
        };

        RiskFinding::measured(
            detected,
            severity,
            isolation_score,
            Evidence::IsolationIndicator {
                isolation_score: round_to(isolation_score, 3),
                night_sessions_percentage: round_to(night_sessions_percentage, 3),
                isolation_indicators,
                total_sessions_analyzed: sessions.len(),
            },
        )
    }
}

/// Grades a detected engagement drop; non-decreasing in `drop_percentage`.
pub fn engagement_drop_severity(drop_percentage: f64) -> Severity {
    if drop_percentage > 0.8 {
        Severity::Critical
    } else if drop_percentage > 0.6 {
        Severity::High
    } else if drop_percentage > 0.4 {
        Severity::Moderate
    } else {
        Severity::Low
    }
}

/// Grades a detected isolation score. Measured scores top out at exactly 0.7
/// (both indicators at their cap), which grades high.
pub fn isolation_severity(isolation_score: f64) -> Severity {
    if isolation_score > 0.7 {
        Severity::Critical
    } else if isolation_score > 0.5 {
        Severity::High
    } else {
        Severity::Moderate
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WeekBucket {
    total: usize,
    crisis: usize,
}

fn weekly_buckets(
    sessions: &[ExerciseRecord],
    is_crisis: impl Fn(&ExerciseRecord) -> bool,
) -> BTreeMap<NaiveDate, WeekBucket> {
    let mut weeks: BTreeMap<NaiveDate, WeekBucket> = BTreeMap::new();
    for session in sessions {
        let bucket = weeks.entry(week_start(session.start_time.date())).or_default();
        bucket.total += 1;
        if is_crisis(session) {
            bucket.crisis += 1;
        }
    }
    weeks
}

fn split_recent(values: &[f64], recent_weeks: usize) -> (&[f64], &[f64]) {
    values.split_at(values.len().saturating_sub(recent_weeks))
}

fn build_alerts(summary: &RiskSummary) -> Vec<RiskAlert> {
    summary
        .findings()
        .into_iter()
        .filter(|(_, finding)| finding.intervention_needed)
        .map(|(risk_type, finding)| RiskAlert {
            alert_type: risk_type,
            severity: finding.severity,
            message: alert_message(risk_type, finding),
            recommended_action: risk_type.recommended_action().to_string(),
        })
        .collect()
}

fn alert_message(risk_type: RiskType, finding: &RiskFinding) -> String {
    let value = finding.metric_value;
    match risk_type {
        RiskType::EngagementDrop => format!(
            "Significant drop in exercise engagement detected ({:.1}%)",
            value * 100.0
        ),
        RiskType::NegativeRatings => format!(
            "Consistently low exercise effectiveness ratings (avg: {value:.1}/10)"
        ),
        RiskType::CrisisUsageSpike => format!(
            "Spike in crisis exercise usage detected ({:.1}% increase)",
            value * 100.0
        ),
        RiskType::AvoidancePattern => {
            format!("High exercise avoidance rate ({:.1}%)", value * 100.0)
        }
        RiskType::IsolationIndicator => format!(
            "Potential social isolation indicators detected (score: {value:.1})"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDateTime};
    use proptest::prelude::*;

    fn base() -> NaiveDateTime {
        // Monday
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid timestamp")
    }

    fn at(day_offset: i64, hour: i64) -> NaiveDateTime {
        base() + Duration::days(day_offset) + Duration::hours(hour)
    }

    fn session(
        day_offset: i64,
        hour: i64,
        exercise_type: &str,
        status: CompletionStatus,
        rating: Option<i32>,
    ) -> ExerciseRecord {
        ExerciseRecord {
            start_time: at(day_offset, hour),
            exercise_type: exercise_type.to_string(),
            completion_status: status,
            effectiveness_rating: rating,
            engagement_score: None,
        }
    }

    fn completed(day_offset: i64, exercise_type: &str) -> ExerciseRecord {
        session(day_offset, 10, exercise_type, CompletionStatus::Completed, None)
    }

    fn window(exercises: Vec<ExerciseRecord>) -> ActivityWindow {
        ActivityWindow::new(base(), at(34, 0), Vec::new(), exercises, Vec::new())
            .expect("valid window")
    }

    fn analyze(exercises: Vec<ExerciseRecord>) -> RiskSummary {
        RiskSignalDetector::default().analyze(&window(exercises))
    }

    #[test]
    fn empty_window_reports_no_risk_with_insufficient_data() {
        let summary = analyze(Vec::new());
        for (_, finding) in summary.findings() {
            assert!(!finding.detected);
            assert_eq!(finding.severity, Severity::None);
            assert!(finding.insufficient_data);
        }
        assert_eq!(summary.overall_risk_level, RiskLevel::Low);
        assert!(summary.alerts.is_empty());
        assert!(summary.has_insufficient_data());
    }

    #[test]
    fn engagement_drop_compares_recent_weeks_to_earlier_mean() {
        let mut sessions = Vec::new();
        for week in 0..2 {
            for day in 0..4 {
                sessions.push(completed(week * 7 + day, "body-scan"));
            }
        }
        sessions.push(completed(14, "body-scan"));
        sessions.push(completed(21, "body-scan"));

        let finding = analyze(sessions).engagement_drop;
        assert!(finding.detected);
        assert_eq!(finding.metric_value, 0.75);
        assert_eq!(finding.severity, Severity::High);
        assert!(finding.intervention_needed);
        match finding.evidence {
            Evidence::EngagementDrop {
                weekly_engagement, ..
            } => assert_eq!(weekly_engagement, vec![4, 4, 1, 1]),
            other => panic!("unexpected evidence {other:?}"),
        }
    }

    #[test]
    fn engagement_drop_with_two_weeks_uses_first_week_baseline() {
        let mut sessions: Vec<ExerciseRecord> =
            (0..6).map(|day| completed(day, "body-scan")).collect();
        sessions.push(completed(7, "body-scan"));

        // recent mean 3.5 against a baseline of 6
        let finding = analyze(sessions).engagement_drop;
        assert!(!finding.detected);
        assert_eq!(finding.severity, Severity::None);
        assert!(!finding.insufficient_data);
    }

    #[test]
    fn engagement_drop_needs_five_sessions_and_two_weeks() {
        let few: Vec<ExerciseRecord> = (0..4).map(|d| completed(d * 7, "body-scan")).collect();
        assert!(analyze(few).engagement_drop.insufficient_data);

        let one_week: Vec<ExerciseRecord> = (0..6).map(|d| completed(d, "body-scan")).collect();
        assert!(analyze(one_week).engagement_drop.insufficient_data);
    }

    #[test]
    fn negative_ratings_grade_by_average_and_share() {
        let sessions = vec![
            session(0, 10, "body-scan", CompletionStatus::Completed, Some(1)),
            session(1, 10, "body-scan", CompletionStatus::Completed, Some(2)),
            session(2, 10, "body-scan", CompletionStatus::Completed, Some(2)),
            session(3, 10, "body-scan", CompletionStatus::Completed, Some(5)),
            session(4, 10, "body-scan", CompletionStatus::Completed, None),
        ];
        let finding = analyze(sessions).negative_ratings;
        assert!(finding.detected);
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.metric_value, 2.5);
        match finding.evidence {
            Evidence::NegativeRatings {
                negative_sessions_count,
                total_sessions_rated,
                ..
            } => {
                assert_eq!(negative_sessions_count, 3);
                assert_eq!(total_sessions_rated, 4);
            }
            other => panic!("unexpected evidence {other:?}"),
        }

        let happy = vec![session(0, 10, "body-scan", CompletionStatus::Completed, Some(8))];
        let finding = analyze(happy).negative_ratings;
        assert!(!finding.detected);
        assert!(!finding.insufficient_data);
    }

    #[test]
    fn crisis_spike_measures_relative_share_increase() {
        let mut sessions = vec![completed(0, "box-breathing")];
        sessions.extend((1..5).map(|d| completed(d, "body-scan")));
        sessions.push(completed(7, "4-7-8-breathing"));
        sessions.push(completed(8, "body-scan"));
        sessions.push(completed(14, "box-breathing"));

        // earlier share 0.2, recent mean (0.5 + 1.0) / 2
        let finding = analyze(sessions).crisis_usage_spike;
        assert!(finding.detected);
        assert_eq!(finding.metric_value, 2.75);
        assert_eq!(finding.severity, Severity::Moderate);
    }

    #[test]
    fn crisis_spike_is_zero_without_earlier_baseline() {
        let mut sessions: Vec<ExerciseRecord> =
            (0..3).map(|d| completed(d, "box-breathing")).collect();
        sessions.extend((7..10).map(|d| completed(d, "box-breathing")));

        let finding = analyze(sessions).crisis_usage_spike;
        assert!(!finding.detected);
        assert_eq!(finding.metric_value, 0.0);
    }

    #[test]
    fn all_abandoned_sessions_are_critical_avoidance() {
        let sessions: Vec<ExerciseRecord> = (0..5)
            .map(|d| session(d, 10, "exposure", CompletionStatus::Abandoned, None))
            .collect();
        let summary = analyze(sessions);
        let finding = &summary.avoidance_pattern;
        assert!(finding.detected);
        assert_eq!(finding.metric_value, 1.0);
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(summary.overall_risk_level, RiskLevel::Moderate);
        assert_eq!(summary.alerts.len(), 1);
        assert_eq!(summary.alerts[0].alert_type, RiskType::AvoidancePattern);
        assert_eq!(summary.alerts[0].message, "High exercise avoidance rate (100.0%)");
    }

    #[test]
    fn avoidance_at_ninety_percent_grades_high_and_never_moderate() {
        let mut sessions: Vec<ExerciseRecord> = (0..9)
            .map(|d| session(d, 10, "exposure", CompletionStatus::Abandoned, None))
            .collect();
        sessions.push(completed(9, "body-scan"));
        let finding = analyze(sessions).avoidance_pattern;
        assert_eq!(finding.severity, Severity::High);
        match finding.evidence {
            Evidence::AvoidancePattern {
                most_avoided_exercise,
                avoidance_by_type,
                ..
            } => {
                assert_eq!(most_avoided_exercise.as_deref(), Some("exposure"));
                assert_eq!(avoidance_by_type["body-scan"].rate, 0.0);
            }
            other => panic!("unexpected evidence {other:?}"),
        }

        let mut sessions: Vec<ExerciseRecord> = (0..8)
            .map(|d| session(d, 10, "exposure", CompletionStatus::Abandoned, None))
            .collect();
        sessions.extend((8..10).map(|d| completed(d, "body-scan")));
        let finding = analyze(sessions).avoidance_pattern;
        assert!(!finding.detected);
        assert_eq!(finding.severity, Severity::None);
    }

    #[test]
    fn isolation_scores_night_sessions_and_clustering() {
        let nightly: Vec<ExerciseRecord> = (0..8)
            .map(|d| session(d, 23, "body-scan", CompletionStatus::Completed, None))
            .collect();
        let finding = analyze(nightly).isolation_indicator;
        assert!(finding.detected);
        assert_eq!(finding.severity, Severity::Moderate);
        assert_eq!(finding.metric_value, 0.4);

        let mut clustered = Vec::new();
        for day in 0..2 {
            for hour in [1, 2, 23] {
                clustered.push(session(day, hour, "body-scan", CompletionStatus::Completed, None));
            }
            clustered.push(session(day, 12, "body-scan", CompletionStatus::Completed, None));
        }
        let finding = analyze(clustered).isolation_indicator;
        assert_eq!(finding.metric_value, 0.6);
        assert_eq!(finding.severity, Severity::High);
    }

    #[test]
    fn alerts_follow_heuristic_order() {
        let sessions: Vec<ExerciseRecord> = (0..8)
            .map(|d| session(d, 23, "exposure", CompletionStatus::Abandoned, Some(1)))
            .collect();
        let summary = analyze(sessions);
        let kinds: Vec<RiskType> = summary.alerts.iter().map(|a| a.alert_type).collect();
        assert_eq!(
            kinds,
            vec![
                RiskType::NegativeRatings,
                RiskType::AvoidancePattern,
                RiskType::IsolationIndicator
            ]
        );
        // 4 + 4 + 2 of 20
        assert_eq!(summary.risk_percentage, 0.5);
        assert_eq!(summary.overall_risk_level, RiskLevel::High);
        assert_eq!(
            summary.alerts[0].recommended_action,
            "Review exercise difficulty and provide additional guidance"
        );
    }

    #[test]
    fn overall_level_cutoffs() {
        assert_eq!(RiskLevel::from_percentage(0.19), RiskLevel::Low);
        assert_eq!(RiskLevel::from_percentage(0.2), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_percentage(0.4), RiskLevel::High);
        assert_eq!(RiskLevel::from_percentage(0.6), RiskLevel::Critical);
    }

    #[test]
    fn summary_survives_json() {
        let sessions: Vec<ExerciseRecord> = (0..5)
            .map(|d| session(d, 23, "exposure", CompletionStatus::Abandoned, Some(2)))
            .collect();
        let summary = analyze(sessions);
        let json = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(json["avoidance_pattern"]["severity"], "critical");
        assert_eq!(json["alerts"][0]["type"], "negative_ratings");
        let back: RiskSummary = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, summary);
    }

    fn crisis_week(week: i64, total: usize, crisis: usize) -> Vec<ExerciseRecord> {
        (0..total)
            .map(|i| {
                let kind = if i < crisis { "box-breathing" } else { "body-scan" };
                let day = week * 7 + (i % 5) as i64;
                session(day, 8 + (i / 5) as i64, kind, CompletionStatus::Completed, None)
            })
            .collect()
    }

    #[test]
    fn crisis_session_count_raises_severity_of_modest_spike() {
        // shares 0.1 then 0.3, 0.4: spike 2.5 with 8 crisis sessions
        let mut sessions = crisis_week(0, 10, 1);
        sessions.extend(crisis_week(1, 10, 3));
        sessions.extend(crisis_week(2, 10, 4));
        let finding = analyze(sessions).crisis_usage_spike;
        assert!(finding.detected);
        assert_eq!(finding.metric_value, 2.5);
        assert_eq!(finding.severity, Severity::High);

        // shares 0.1 then 0.6, 0.4: spike 4.0 with 11 crisis sessions
        let mut sessions = crisis_week(0, 10, 1);
        sessions.extend(crisis_week(1, 10, 6));
        sessions.extend(crisis_week(2, 10, 4));
        let finding = analyze(sessions).crisis_usage_spike;
        assert_eq!(finding.metric_value, 4.0);
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn steep_engagement_drop_is_critical() {
        let mut sessions = Vec::new();
        for week in 0..2 {
            sessions.extend((0..10).map(|i| {
                session(week * 7 + i % 5, 9 + i / 5, "body-scan", CompletionStatus::Completed, None)
            }));
        }
        sessions.push(completed(14, "body-scan"));
        sessions.push(completed(21, "body-scan"));

        let finding = analyze(sessions).engagement_drop;
        assert_eq!(finding.metric_value, 0.9);
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn isolation_score_tops_out_at_high() {
        let mut sessions = Vec::new();
        for day in 0..2 {
            for hour in [0, 1, 2, 3] {
                sessions.push(session(day, hour, "body-scan", CompletionStatus::Completed, None));
            }
        }
        let finding = analyze(sessions).isolation_indicator;
        assert_eq!(finding.metric_value, 0.7);
        assert_eq!(finding.severity, Severity::High);

        assert_eq!(isolation_severity(0.71), Severity::Critical);
        assert_eq!(isolation_severity(0.7), Severity::High);
        assert_eq!(isolation_severity(0.5), Severity::Moderate);
    }

    #[test]
    fn crisis_pattern_counts_frequency_hour_and_recent_alerts() {
        let crisis = |day: i64, hour: i64| CrisisRecord {
            created_at: at(day, hour),
            severity_level: "high".to_string(),
            alert_type: "panic".to_string(),
        };
        let crises = vec![crisis(1, 22), crisis(20, 3), crisis(30, 22), crisis(31, 3)];
        let window =
            ActivityWindow::new(base(), at(34, 0), Vec::new(), Vec::new(), crises).expect("window");
        let pattern = RiskSignalDetector::default().analyze(&window).crisis_pattern;
        assert_eq!(pattern.frequency, 4);
        assert_eq!(pattern.risk_level, CrisisRiskLevel::High);
        // 03:00 and 22:00 tie; the earlier hour wins
        assert_eq!(pattern.most_common_hour, Some(3));
        assert_eq!(pattern.recent_crises, 2);

        let pattern = CrisisPattern::from_records(&[crisis(2, 14)], at(34, 0));
        assert_eq!(pattern.risk_level, CrisisRiskLevel::Medium);
        assert_eq!(pattern.recent_crises, 0);

        let quiet = analyze(Vec::new()).crisis_pattern;
        assert_eq!(quiet.risk_level, CrisisRiskLevel::Low);
        assert_eq!(quiet.most_common_hour, None);
    }

    fn arb_session() -> impl Strategy<Value = ExerciseRecord> {
        (
            0i64..28,
            0i64..24,
            prop_oneof![Just("box-breathing"), Just("body-scan"), Just("exposure")],
            prop_oneof![
                Just(CompletionStatus::Completed),
                Just(CompletionStatus::Abandoned),
                Just(CompletionStatus::Started)
            ],
            proptest::option::of(0i32..=10),
        )
            .prop_map(|(day, hour, kind, status, rating)| session(day, hour, kind, status, rating))
    }

    proptest! {
        #[test]
        fn analyze_is_idempotent(sessions in proptest::collection::vec(arb_session(), 0..40)) {
            let detector = RiskSignalDetector::default();
            let window = window(sessions);
            prop_assert_eq!(detector.analyze(&window), detector.analyze(&window));
        }

        #[test]
        fn engagement_drop_severity_is_monotonic(a in 0.0f64..1.0, b in 0.0f64..1.0) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(engagement_drop_severity(low) <= engagement_drop_severity(high));
        }

        #[test]
        fn ratios_never_produce_nan(sessions in proptest::collection::vec(arb_session(), 0..40)) {
            let summary = RiskSignalDetector::default().analyze(&window(sessions));
            for (_, finding) in summary.findings() {
                prop_assert!(finding.metric_value.is_finite());
            }
            prop_assert!(summary.risk_percentage.is_finite());
        }
    }
}
