use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{window_bounds, Clock};
use crate::engagement::EngagementHistory;
use crate::error::{EngineError, EngineResult};
use crate::models::{ActivityWindow, Assessment, CrisisRecord, ExerciseRecord, MoodRecord};
use crate::prescription::{ExercisePrescription, SeverityExerciseScheduler};
use crate::risk::{RiskSignalDetector, RiskSummary};

/// Read-only access to a patient's records. `since: None` means the full history.
#[async_trait]
pub trait PatientRepository: Send + Sync {
    async fn mood_entries(
        &self,
        patient_id: Uuid,
        since: Option<NaiveDateTime>,
        until: NaiveDateTime,
    ) -> EngineResult<Vec<MoodRecord>>;

    async fn exercise_sessions(
        &self,
        patient_id: Uuid,
        since: Option<NaiveDateTime>,
        until: NaiveDateTime,
    ) -> EngineResult<Vec<ExerciseRecord>>;

    async fn crisis_alerts(
        &self,
        patient_id: Uuid,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> EngineResult<Vec<CrisisRecord>>;

    async fn assessment(&self, patient_id: Uuid, assessment_id: Uuid)
        -> EngineResult<Option<Assessment>>;

    async fn latest_assessment(&self, patient_id: Uuid) -> EngineResult<Option<Assessment>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInsight {
    pub patient_id: Uuid,
    pub generated_at: NaiveDateTime,
    pub risk: RiskSummary,
    pub prescription: ExercisePrescription,
}

pub struct InsightService<R, C> {
    repository: R,
    clock: C,
    detector: RiskSignalDetector,
    scheduler: SeverityExerciseScheduler,
}

impl<R: PatientRepository, C: Clock> InsightService<R, C> {
    pub fn new(repository: R, clock: C, detector: RiskSignalDetector) -> Self {
        Self {
            repository,
            clock,
            detector,
            scheduler: SeverityExerciseScheduler::default(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: SeverityExerciseScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub async fn activity_window(
        &self,
        patient_id: Uuid,
        since_days: i64,
    ) -> EngineResult<ActivityWindow> {
        let (start, end) = window_bounds(&self.clock, since_days);
        let moods = self
            .repository
            .mood_entries(patient_id, Some(start), end)
            .await?;
        let exercises = self
            .repository
            .exercise_sessions(patient_id, Some(start), end)
            .await?;
        let crises = self.repository.crisis_alerts(patient_id, start, end).await?;
        ActivityWindow::new(start, end, moods, exercises, crises)
    }

    #[tracing::instrument(skip(self))]
    pub async fn risk_summary(&self, patient_id: Uuid) -> EngineResult<RiskSummary> {
        let since_days = self.detector.thresholds().analysis_days;
        let window = self.activity_window(patient_id, since_days).await?;
        let summary = self.detector.analyze(&window);
        tracing::info!(
            overall = summary.overall_risk_level.as_str(),
            alerts = summary.alerts.len(),
            "risk summary computed"
        );
        Ok(summary)
    }

    pub async fn engagement_history(&self, patient_id: Uuid) -> EngineResult<EngagementHistory> {
        let now = self.clock.now();
        let moods = self.repository.mood_entries(patient_id, None, now).await?;
        let exercises = self
            .repository
            .exercise_sessions(patient_id, None, now)
            .await?;

        let earliest = moods
            .iter()
            .map(|m| m.timestamp)
            .chain(exercises.iter().map(|e| e.start_time))
            .min()
            .unwrap_or(now);
        let history = ActivityWindow::new(earliest, now, moods, exercises, Vec::new())?;
        Ok(EngagementHistory::from_records(
            history.moods(),
            history.exercises(),
        ))
    }

    /// Uses the given assessment, or the latest one when `assessment_id` is `None`.
    #[tracing::instrument(skip(self))]
    pub async fn prescribe(
        &self,
        patient_id: Uuid,
        assessment_id: Option<Uuid>,
    ) -> EngineResult<PatientInsight> {
        let assessment = match assessment_id {
            Some(id) => self
                .repository
                .assessment(patient_id, id)
                .await?
                .ok_or_else(|| EngineError::not_found("assessment", id))?,
            None => self
                .repository
                .latest_assessment(patient_id)
                .await?
                .ok_or_else(|| EngineError::not_found("assessment for patient", patient_id))?,
        };

        let risk = self.risk_summary(patient_id).await?;
        let history = self.engagement_history(patient_id).await?;
        let prescription = self.scheduler.generate(&assessment, &risk, &history);

        tracing::info!(
            band = prescription.severity_band.as_str(),
            frequency = prescription.regimen.frequency.as_str(),
            safety = prescription.safety_protocol.is_some(),
            "prescription generated"
        );

        Ok(PatientInsight {
            patient_id,
            generated_at: self.clock.now(),
            risk,
            prescription,
        })
    }
}
