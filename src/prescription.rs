use serde::{Deserialize, Serialize};

use crate::engagement::{EngagementHistory, EngagementLevel, EngagementProfile, MoodTrend};
use crate::models::{Assessment, SeverityBand};
use crate::risk::{RiskLevel, RiskSummary, RiskType, Severity};

pub const DEFAULT_REDUCTION_FACTOR: f64 = 0.25;
pub const PROVIDER_NOTIFICATION_HOURS: u32 = 2;
const CRISIS_MONITORING: &str = "crisis_monitoring";
const MORNING_DEFAULT: &str = "mood_check_in";
const EMERGENCY_EXERCISES: [&str; 2] = ["breathing_grounding", "crisis_intervention"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Low,
    Moderate,
    High,
    Intensive,
    CrisisLevel,
}

impl Frequency {
    /// One rung down `intensive → high → moderate → low`. `crisis_level` is off the ladder.
    pub fn step_down(self) -> Self {
        match self {
            Frequency::Intensive => Frequency::High,
            Frequency::High => Frequency::Moderate,
            Frequency::Moderate | Frequency::Low => Frequency::Low,
            Frequency::CrisisLevel => Frequency::CrisisLevel,
        }
    }

    pub fn step_up(self) -> Self {
        match self {
            Frequency::Low => Frequency::Moderate,
            Frequency::Moderate => Frequency::High,
            Frequency::High | Frequency::Intensive => Frequency::Intensive,
            Frequency::CrisisLevel => Frequency::CrisisLevel,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Low => "low",
            Frequency::Moderate => "moderate",
            Frequency::High => "high",
            Frequency::Intensive => "intensive",
            Frequency::CrisisLevel => "crisis_level",
        }
    }
}

struct RegimenTemplate {
    daily: &'static [&'static str],
    weekly: &'static [&'static str],
    micro_moments: &'static [&'static str],
    emergency: &'static [&'static str],
    frequency: Frequency,
    focus: &'static str,
    duration_band: &'static str,
}

static MINIMAL: RegimenTemplate = RegimenTemplate {
    daily: &["mood_check_in"],
    weekly: &["gratitude_exercise", "wellness_tracking"],
    micro_moments: &[],
    emergency: &[],
    frequency: Frequency::Low,
    focus: "maintenance",
    duration_band: "30_seconds_to_5_minutes",
};

static MILD: RegimenTemplate = RegimenTemplate {
    daily: &["mood_tracking", "cbt_thought_record"],
    weekly: &["mindfulness_exercise", "activity_planning"],
    micro_moments: &[],
    emergency: &[],
    frequency: Frequency::Moderate,
    focus: "skill_building",
    duration_band: "5_to_15_minutes",
};

static MODERATE: RegimenTemplate = RegimenTemplate {
    daily: &["mood_tracking", "behavioral_activation", "cbt_exercises"],
    weekly: &["mindfulness_exercises", "activity_scheduling"],
    micro_moments: &[],
    emergency: &[],
    frequency: Frequency::High,
    focus: "active_treatment",
    duration_band: "15_to_30_minutes",
};

static MODERATELY_SEVERE: RegimenTemplate = RegimenTemplate {
    daily: &["crisis_monitoring", "structured_activities", "cbt_intensive"],
    weekly: &[],
    micro_moments: &["safety_check_ins"],
    emergency: &["breathing_grounding"],
    frequency: Frequency::Intensive,
    focus: "crisis_management",
    duration_band: "30_to_45_minutes",
};

static SEVERE: RegimenTemplate = RegimenTemplate {
    daily: &["crisis_intervention", "safety_planning", "provider_alerts"],
    weekly: &[],
    micro_moments: &["multiple_safety_checks"],
    emergency: &["immediate_crisis_exercises"],
    frequency: Frequency::CrisisLevel,
    focus: "crisis_intervention",
    duration_band: "as_needed",
};

fn template(band: SeverityBand) -> &'static RegimenTemplate {
    match band {
        SeverityBand::Minimal => &MINIMAL,
        SeverityBand::Mild => &MILD,
        SeverityBand::Moderate => &MODERATE,
        SeverityBand::ModeratelySevere => &MODERATELY_SEVERE,
        SeverityBand::Severe => &SEVERE,
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyAdjustment {
    Easier,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationAdjustment {
    Shorter,
    Longer,
}

/// The exercise lists and intensity of a prescription. Adaptation returns new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regimen {
    pub daily: Vec<String>,
    pub weekly: Vec<String>,
    pub micro_moments: Vec<String>,
    pub emergency: Vec<String>,
    pub frequency: Frequency,
    pub focus: String,
    pub duration_band: String,
    pub difficulty_adjustment: Option<DifficultyAdjustment>,
    pub duration_adjustment: Option<DurationAdjustment>,
}

impl Regimen {
    pub fn for_band(band: SeverityBand) -> Self {
        let base = template(band);
        Self {
            daily: owned(base.daily),
            weekly: owned(base.weekly),
            micro_moments: owned(base.micro_moments),
            emergency: owned(base.emergency),
            frequency: base.frequency,
            focus: base.focus.to_string(),
            duration_band: base.duration_band.to_string(),
            difficulty_adjustment: None,
            duration_adjustment: None,
        }
    }

    /// Steps frequency down and keeps the first `ceil(len * (1 - factor))` daily exercises.
    pub fn reduce_intensity(&self, factor: f64) -> Self {
        let mut reduced = self.clone();
        reduced.frequency = self.frequency.step_down();
        let factor = factor.clamp(0.0, 1.0);
        let keep = ((self.daily.len() as f64) * (1.0 - factor)).ceil() as usize;
        reduced.daily.truncate(keep.max(1));
        reduced
    }

    pub fn increase_intensity(&self) -> Self {
        let mut increased = self.clone();
        increased.frequency = self.frequency.step_up();
        if !increased.daily.iter().any(|item| item == CRISIS_MONITORING) {
            increased.daily.push(CRISIS_MONITORING.to_string());
        }
        increased
    }

    pub fn adapt_to_engagement(&self, profile: &EngagementProfile) -> Self {
        let mut adapted = self.clone();
        if profile.completion_rate < 0.5 {
            adapted.difficulty_adjustment = Some(DifficultyAdjustment::Easier);
            adapted.duration_adjustment = Some(DurationAdjustment::Shorter);
        } else if profile.completion_rate > 0.8
            && profile.engagement_level == EngagementLevel::High
        {
            adapted.difficulty_adjustment = Some(DifficultyAdjustment::Advanced);
            adapted.duration_adjustment = Some(DurationAdjustment::Longer);
        }
        adapted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adaptation {
    ReducedIntensity,
    IncreasedIntensity,
    EngagementAdjusted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAssessment {
    pub improvement: bool,
    pub deterioration: bool,
    pub mood_trend: MoodTrend,
    pub engagement: EngagementProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Daypart {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Daypart {
    pub const MORNING: Daypart = Daypart {
        start_hour: 8,
        end_hour: 10,
    };
    pub const MIDDAY: Daypart = Daypart {
        start_hour: 12,
        end_hour: 14,
    };
    pub const EVENING: Daypart = Daypart {
        start_hour: 18,
        end_hour: 20,
    };

    pub fn time_range(&self) -> String {
        format!("{:02}:00-{:02}:00", self.start_hour, self.end_hour)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub time_range: String,
    pub exercises: Vec<String>,
    pub rationale: String,
}

impl ScheduleSlot {
    fn new(daypart: Daypart, exercises: Vec<String>, rationale: &str) -> Self {
        Self {
            time_range: daypart.time_range(),
            exercises,
            rationale: rationale.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyBucket {
    pub availability: String,
    pub exercises: Vec<String>,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroMoments {
    pub frequency: String,
    pub exercises: Vec<String>,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub morning: ScheduleSlot,
    pub midday: ScheduleSlot,
    pub evening: ScheduleSlot,
    pub emergency: EmergencyBucket,
    pub micro_moments: Option<MicroMoments>,
}

impl Schedule {
    /// Morning holds the check-in; daily[1] goes to midday and daily[2] to evening.
    /// The emergency bucket is the fixed grounding/intervention pair followed by
    /// the band's own emergency items, without duplicates.
    pub fn for_regimen(regimen: &Regimen) -> Self {
        let slot_item =
            |index: usize| -> Vec<String> { regimen.daily.get(index).cloned().into_iter().collect() };

        let mut emergency = owned(&EMERGENCY_EXERCISES);
        for item in &regimen.emergency {
            if !emergency.contains(item) {
                emergency.push(item.clone());
            }
        }

        Self {
            morning: ScheduleSlot::new(
                Daypart::MORNING,
                vec![MORNING_DEFAULT.to_string()],
                "Start day with mood assessment",
            ),
            midday: ScheduleSlot::new(
                Daypart::MIDDAY,
                slot_item(1),
                "Midday check-in and intervention",
            ),
            evening: ScheduleSlot::new(
                Daypart::EVENING,
                slot_item(2),
                "Evening reflection and planning",
            ),
            emergency: EmergencyBucket {
                availability: "24/7".to_string(),
                exercises: emergency,
                rationale: "Immediate crisis support".to_string(),
            },
            micro_moments: (!regimen.micro_moments.is_empty()).then(|| MicroMoments {
                frequency: "2x_daily".to_string(),
                exercises: regimen.micro_moments.clone(),
                rationale: "Safety monitoring throughout day".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyProtocol {
    pub immediate_notifications: bool,
    pub provider_notification_hours: u32,
    pub emergency_contact_integration: bool,
    pub urgent_appointment_scheduling: bool,
    pub suicidal_ideation_trigger: bool,
    pub crisis_band_trigger: bool,
}

impl SafetyProtocol {
    /// Attached whenever item 9 is flagged or the band is moderately severe or worse.
    pub fn for_assessment(assessment: &Assessment) -> Option<Self> {
        let q9_risk = assessment.q9_risk_flag();
        let crisis_band = assessment.severity_level().is_crisis_band();
        (q9_risk || crisis_band).then(|| Self {
            immediate_notifications: true,
            provider_notification_hours: PROVIDER_NOTIFICATION_HOURS,
            emergency_contact_integration: q9_risk,
            urgent_appointment_scheduling: q9_risk,
            suicidal_ideation_trigger: q9_risk,
            crisis_band_trigger: crisis_band,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringPlan {
    pub risk_level: RiskLevel,
    pub daily_crisis_monitoring: bool,
    pub immediate_provider_alerts: bool,
    pub red_alerts: Vec<RiskType>,
    pub yellow_alerts: Vec<RiskType>,
    pub insufficient_data: bool,
}

impl MonitoringPlan {
    fn build(assessment: &Assessment, risk: &RiskSummary) -> Self {
        let escalated = assessment.q9_risk_flag()
            || assessment.severity_level().is_crisis_band()
            || risk.overall_risk_level >= RiskLevel::High;

        Self {
            risk_level: risk.overall_risk_level,
            daily_crisis_monitoring: escalated,
            immediate_provider_alerts: escalated,
            red_alerts: alert_types(risk, |severity| severity >= Severity::High),
            yellow_alerts: alert_types(risk, |severity| severity == Severity::Moderate),
            insufficient_data: risk.has_insufficient_data(),
        }
    }
}

fn alert_types(risk: &RiskSummary, wanted: impl Fn(Severity) -> bool) -> Vec<RiskType> {
    risk.alerts
        .iter()
        .filter(|alert| wanted(alert.severity))
        .map(|alert| alert.alert_type)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExercisePrescription {
    pub severity_band: SeverityBand,
    pub total_score: i32,
    #[serde(flatten)]
    pub regimen: Regimen,
    pub adaptations: Vec<Adaptation>,
    pub trend: TrendAssessment,
    pub schedule: Schedule,
    pub monitoring: MonitoringPlan,
    pub safety_protocol: Option<SafetyProtocol>,
}

#[derive(Debug, Clone)]
pub struct SeverityExerciseScheduler {
    reduction_factor: f64,
}

impl Default for SeverityExerciseScheduler {
    fn default() -> Self {
        Self {
            reduction_factor: DEFAULT_REDUCTION_FACTOR,
        }
    }
}

impl SeverityExerciseScheduler {
    pub fn new(reduction_factor: f64) -> Self {
        Self {
            reduction_factor: reduction_factor.clamp(0.0, 1.0),
        }
    }

    pub fn generate(
        &self,
        assessment: &Assessment,
        risk: &RiskSummary,
        history: &EngagementHistory,
    ) -> ExercisePrescription {
        let band = assessment.severity_level();
        let mut regimen = Regimen::for_band(band);
        let mut adaptations = Vec::new();

        let improvement = history.shows_improvement();
        let deterioration = history.shows_deterioration();
        // Deterioration is applied last so it wins when both fire.
        if improvement {
            regimen = regimen.reduce_intensity(self.reduction_factor);
            adaptations.push(Adaptation::ReducedIntensity);
        }
        if deterioration {
            regimen = regimen.increase_intensity();
            adaptations.push(Adaptation::IncreasedIntensity);
        }

        let engagement = history.profile();
        if engagement.total_sessions > 0 {
            let adapted = regimen.adapt_to_engagement(&engagement);
            if adapted != regimen {
                adaptations.push(Adaptation::EngagementAdjusted);
            }
            regimen = adapted;
        }

        if improvement && deterioration {
            tracing::warn!(
                assessment = %assessment.id(),
                "improvement and deterioration both detected; deterioration applied last"
            );
        }

        ExercisePrescription {
            severity_band: band,
            total_score: assessment.total_score(),
            schedule: Schedule::for_regimen(&regimen),
            monitoring: MonitoringPlan::build(assessment, risk),
            safety_protocol: SafetyProtocol::for_assessment(assessment),
            trend: TrendAssessment {
                improvement,
                deterioration,
                mood_trend: history.mood_trend(),
                engagement,
            },
            regimen,
            adaptations,
        }
    }
}
