use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    Assessment, CompletionStatus, CrisisRecord, ExerciseRecord, MoodRecord, PatientRecord,
};
use crate::service::PatientRepository;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgPatientRepository {
    pool: PgPool,
}

impl PgPatientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn exercise_from_row(row: &PgRow) -> EngineResult<ExerciseRecord> {
    let status: String = row.try_get("completion_status")?;
    Ok(ExerciseRecord {
        start_time: row.try_get("start_time")?,
        exercise_type: row.try_get("exercise_type")?,
        completion_status: status.parse()?,
        effectiveness_rating: row.try_get("effectiveness_rating")?,
        engagement_score: row.try_get("engagement_score")?,
    })
}

fn assessment_from_row(row: &PgRow) -> EngineResult<Assessment> {
    Assessment::new(
        row.try_get("id")?,
        row.try_get("assessment_date")?,
        row.try_get("total_score")?,
        row.try_get("q9_score")?,
        row.try_get("q9_risk_flag")?,
    )
}

#[async_trait]
impl PatientRepository for PgPatientRepository {
    async fn mood_entries(
        &self,
        patient_id: Uuid,
        since: Option<NaiveDateTime>,
        until: NaiveDateTime,
    ) -> EngineResult<Vec<MoodRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT recorded_at, intensity_level
            FROM risk_engine.mood_entries
            WHERE patient_id = $1
              AND ($2::timestamp IS NULL OR recorded_at >= $2)
              AND recorded_at <= $3
            ORDER BY recorded_at
            "#,
        )
        .bind(patient_id)
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> EngineResult<MoodRecord> {
                Ok(MoodRecord {
                    timestamp: row.try_get("recorded_at")?,
                    intensity_level: row.try_get("intensity_level")?,
                })
            })
            .collect()
    }

    async fn exercise_sessions(
        &self,
        patient_id: Uuid,
        since: Option<NaiveDateTime>,
        until: NaiveDateTime,
    ) -> EngineResult<Vec<ExerciseRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT start_time, exercise_type, completion_status,
                   effectiveness_rating, engagement_score
            FROM risk_engine.exercise_sessions
            WHERE patient_id = $1
              AND ($2::timestamp IS NULL OR start_time >= $2)
              AND start_time <= $3
            ORDER BY start_time
            "#,
        )
        .bind(patient_id)
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(exercise_from_row).collect()
    }

    async fn crisis_alerts(
        &self,
        patient_id: Uuid,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> EngineResult<Vec<CrisisRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT created_at, severity_level, alert_type
            FROM risk_engine.crisis_alerts
            WHERE patient_id = $1 AND created_at >= $2 AND created_at <= $3
            ORDER BY created_at
            "#,
        )
        .bind(patient_id)
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> EngineResult<CrisisRecord> {
                Ok(CrisisRecord {
                    created_at: row.try_get("created_at")?,
                    severity_level: row.try_get("severity_level")?,
                    alert_type: row.try_get("alert_type")?,
                })
            })
            .collect()
    }

    async fn assessment(
        &self,
        patient_id: Uuid,
        assessment_id: Uuid,
    ) -> EngineResult<Option<Assessment>> {
        let row = sqlx::query(
            r#"
            SELECT id, assessment_date, total_score, q9_score, q9_risk_flag
            FROM risk_engine.phq9_assessments
            WHERE patient_id = $1 AND id = $2
            "#,
        )
        .bind(patient_id)
        .bind(assessment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(assessment_from_row).transpose()
    }

    async fn latest_assessment(&self, patient_id: Uuid) -> EngineResult<Option<Assessment>> {
        let row = sqlx::query(
            r#"
            SELECT id, assessment_date, total_score, q9_score, q9_risk_flag
            FROM risk_engine.phq9_assessments
            WHERE patient_id = $1
            ORDER BY assessment_date DESC
            LIMIT 1
            "#,
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(assessment_from_row).transpose()
    }
}

pub async fn fetch_patient(pool: &PgPool, patient_id: Uuid) -> EngineResult<PatientRecord> {
    let row = sqlx::query("SELECT id, full_name, email FROM risk_engine.patients WHERE id = $1")
        .bind(patient_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| EngineError::not_found("patient", patient_id))?;

    Ok(PatientRecord {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
    })
}

async fn upsert_patient(
    pool: &PgPool,
    id: Uuid,
    full_name: &str,
    email: &str,
) -> anyhow::Result<Uuid> {
    let patient_id: Uuid = sqlx::query(
        r#"
        INSERT INTO risk_engine.patients (id, full_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(full_name)
    .bind(email)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(patient_id)
}

async fn insert_session(
    pool: &PgPool,
    patient_id: Uuid,
    session: &ExerciseRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO risk_engine.exercise_sessions
        (id, patient_id, start_time, exercise_type, completion_status,
         effectiveness_rating, engagement_score, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(patient_id)
    .bind(session.start_time)
    .bind(&session.exercise_type)
    .bind(session.completion_status.as_str())
    .bind(session.effectiveness_rating)
    .bind(session.engagement_score)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_mood(
    pool: &PgPool,
    patient_id: Uuid,
    mood: &MoodRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO risk_engine.mood_entries
        (id, patient_id, recorded_at, intensity_level, source_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(patient_id)
    .bind(mood.timestamp)
    .bind(mood.intensity_level)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_crisis(
    pool: &PgPool,
    patient_id: Uuid,
    crisis: &CrisisRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO risk_engine.crisis_alerts
        (id, patient_id, created_at, severity_level, alert_type, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(patient_id)
    .bind(crisis.created_at)
    .bind(&crisis.severity_level)
    .bind(&crisis.alert_type)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_assessment(
    pool: &PgPool,
    patient_id: Uuid,
    assessment: &Assessment,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO risk_engine.phq9_assessments
        (id, patient_id, assessment_date, total_score, q9_score, severity_level,
         q9_risk_flag, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(assessment.id())
    .bind(patient_id)
    .bind(assessment.assessment_date())
    .bind(assessment.total_score())
    .bind(assessment.q9_score())
    .bind(assessment.severity_level().as_str())
    .bind(assessment.q9_risk_flag())
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let patients = vec![
        (
            Uuid::parse_str("6f1c2a8e-5b0d-4f7a-9c3e-2d8b1a4e7f10")?,
            "Morgan Reyes",
            "morgan.reyes@example.org",
        ),
        (
            Uuid::parse_str("b2e4d6f8-1a3c-4e5f-8b7d-9c0a2e4f6b81")?,
            "Sam Okafor",
            "sam.okafor@example.org",
        ),
    ];

    let now = Utc::now().naive_utc();
    for (index, (id, name, email)) in patients.into_iter().enumerate() {
        let patient_id = upsert_patient(pool, id, name, email).await?;

        // First patient tapers off and abandons; second stays steady.
        let struggling = index == 0;
        for day in 0..28i64 {
            let start_time = now - Duration::days(27 - day) - Duration::hours(3);
            let tapering = struggling && day >= 14 && day % 4 != 0;
            if tapering {
                continue;
            }
            let status = if struggling && day >= 14 {
                CompletionStatus::Abandoned
            } else {
                CompletionStatus::Completed
            };
            let session = ExerciseRecord {
                start_time,
                exercise_type: if struggling && day >= 20 {
                    "box-breathing".to_string()
                } else {
                    "behavioral_activation".to_string()
                },
                completion_status: status,
                effectiveness_rating: Some(if struggling { 3 } else { 7 }),
                engagement_score: Some(if struggling { 4.0 } else { 8.0 }),
            };
            insert_session(pool, patient_id, &session, &format!("seed-{index}-session-{day}"))
                .await?;

            let mood = MoodRecord {
                timestamp: start_time,
                intensity_level: if struggling {
                    3 + (day / 7) as i32
                } else {
                    7 - (day / 7) as i32
                },
            };
            insert_mood(pool, patient_id, &mood, &format!("seed-{index}-mood-{day}")).await?;
        }

        if struggling {
            for (n, days_ago) in [9i64, 4, 2].into_iter().enumerate() {
                let crisis = CrisisRecord {
                    created_at: now - Duration::days(days_ago) - Duration::hours(2),
                    severity_level: "high".to_string(),
                    alert_type: "panic_attack".to_string(),
                };
                insert_crisis(pool, patient_id, &crisis, &format!("seed-{index}-crisis-{n}"))
                    .await?;
            }
        }

        let items = if struggling {
            [3, 3, 2, 2, 2, 2, 2, 2, 2]
        } else {
            [1, 1, 1, 0, 1, 0, 1, 0, 0]
        };
        let assessment = Assessment::from_item_scores(Uuid::new_v4(), now - Duration::days(1), items)
            .context("seed assessment is invalid")?;
        insert_assessment(pool, patient_id, &assessment, &format!("seed-{index}-phq9")).await?;
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct SessionRow {
    full_name: String,
    email: String,
    start_time: NaiveDateTime,
    exercise_type: String,
    completion_status: CompletionStatus,
    effectiveness_rating: Option<i32>,
    engagement_score: Option<f64>,
    source_key: Option<String>,
}

impl SessionRow {
    fn record(&self) -> anyhow::Result<ExerciseRecord> {
        if let Some(rating) = self.effectiveness_rating {
            anyhow::ensure!(
                (0..=10).contains(&rating),
                "effectiveness_rating {rating} outside 0..=10"
            );
        }
        anyhow::ensure!(
            !self.exercise_type.trim().is_empty(),
            "exercise_type must not be empty"
        );
        Ok(ExerciseRecord {
            start_time: self.start_time,
            exercise_type: self.exercise_type.clone(),
            completion_status: self.completion_status,
            effectiveness_rating: self.effectiveness_rating,
            engagement_score: self.engagement_score,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MoodRow {
    full_name: String,
    email: String,
    recorded_at: NaiveDateTime,
    intensity_level: i32,
    source_key: Option<String>,
}

impl MoodRow {
    fn record(&self) -> anyhow::Result<MoodRecord> {
        anyhow::ensure!(
            (0..=10).contains(&self.intensity_level),
            "intensity_level {} outside 0..=10",
            self.intensity_level
        );
        Ok(MoodRecord {
            timestamp: self.recorded_at,
            intensity_level: self.intensity_level,
        })
    }
}

/// One PHQ-9 response per row, items `q1`..`q9` scored 0-3.
#[derive(Debug, Deserialize)]
struct AssessmentRow {
    full_name: String,
    email: String,
    assessment_date: NaiveDateTime,
    q1: i32,
    q2: i32,
    q3: i32,
    q4: i32,
    q5: i32,
    q6: i32,
    q7: i32,
    q8: i32,
    q9: i32,
    source_key: Option<String>,
}

impl AssessmentRow {
    fn record(&self) -> anyhow::Result<Assessment> {
        let items = [
            self.q1, self.q2, self.q3, self.q4, self.q5, self.q6, self.q7, self.q8, self.q9,
        ];
        Ok(Assessment::from_item_scores(
            Uuid::new_v4(),
            self.assessment_date,
            items,
        )?)
    }
}

fn read_rows<T, R>(input: R) -> anyhow::Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut reader = csv::Reader::from_reader(input);
    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(line, row)| row.with_context(|| format!("malformed row {}", line + 1)))
        .collect()
}

fn open_csv(csv_path: &Path) -> anyhow::Result<File> {
    File::open(csv_path).with_context(|| format!("cannot open {}", csv_path.display()))
}

fn row_key(source_key: &Option<String>) -> String {
    source_key
        .clone()
        .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()))
}

/// Columns: full_name, email, start_time, exercise_type, completion_status,
/// effectiveness_rating, engagement_score, source_key.
pub async fn import_sessions(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let rows: Vec<SessionRow> = read_rows(open_csv(csv_path)?)?;
    let mut inserted = 0usize;
    for (line, row) in rows.iter().enumerate() {
        let session = row.record().with_context(|| format!("row {}", line + 1))?;
        let patient_id = upsert_patient(pool, Uuid::new_v4(), &row.full_name, &row.email).await?;
        if insert_session(pool, patient_id, &session, &row_key(&row.source_key)).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Columns: full_name, email, recorded_at, intensity_level, source_key.
pub async fn import_moods(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let rows: Vec<MoodRow> = read_rows(open_csv(csv_path)?)?;
    let mut inserted = 0usize;
    for (line, row) in rows.iter().enumerate() {
        let mood = row.record().with_context(|| format!("row {}", line + 1))?;
        let patient_id = upsert_patient(pool, Uuid::new_v4(), &row.full_name, &row.email).await?;
        if insert_mood(pool, patient_id, &mood, &row_key(&row.source_key)).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Columns: full_name, email, assessment_date, q1..q9, source_key.
pub async fn import_assessments(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let rows: Vec<AssessmentRow> = read_rows(open_csv(csv_path)?)?;
    let mut inserted = 0usize;
    for (line, row) in rows.iter().enumerate() {
        let assessment = row.record().with_context(|| format!("row {}", line + 1))?;
        let patient_id = upsert_patient(pool, Uuid::new_v4(), &row.full_name, &row.email).await?;
        if insert_assessment(pool, patient_id, &assessment, &row_key(&row.source_key)).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}
