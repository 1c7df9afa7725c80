use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use patient_risk_engine::clock::SystemClock;
use patient_risk_engine::db::{self, PgPatientRepository};
use patient_risk_engine::report;
use patient_risk_engine::{InsightService, RiskSignalDetector, RiskThresholds};

#[derive(Parser)]
#[command(name = "patient-risk-engine")]
#[command(about = "Risk signal detection and PHQ-9 exercise scheduling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import sessions, mood entries or PHQ-9 assessments from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, value_enum, default_value_t = ImportKind::Sessions)]
        kind: ImportKind,
    },
    /// Print the risk summary for a patient as JSON
    Analyze {
        #[arg(long)]
        patient: Uuid,
        #[arg(long)]
        since_days: Option<i64>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print an exercise prescription for a patient as JSON
    Prescribe {
        #[arg(long)]
        patient: Uuid,
        /// Defaults to the most recent assessment
        #[arg(long)]
        assessment: Option<Uuid>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate a markdown session briefing
    Report {
        #[arg(long)]
        patient: Uuid,
        #[arg(long)]
        assessment: Option<Uuid>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportKind {
    Sessions,
    Moods,
    Assessments,
}

fn load_thresholds(path: Option<&PathBuf>) -> anyhow::Result<RiskThresholds> {
    match path {
        Some(path) => Ok(RiskThresholds::from_json_file(path)?),
        None => Ok(RiskThresholds::default()),
    }
}

fn insight_service(
    pool: &PgPool,
    thresholds: RiskThresholds,
) -> InsightService<PgPatientRepository, SystemClock> {
    InsightService::new(
        PgPatientRepository::new(pool.clone()),
        SystemClock,
        RiskSignalDetector::new(thresholds),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv, kind } => {
            let (inserted, label) = match kind {
                ImportKind::Sessions => (db::import_sessions(&pool, &csv).await?, "sessions"),
                ImportKind::Moods => (db::import_moods(&pool, &csv).await?, "mood entries"),
                ImportKind::Assessments => {
                    (db::import_assessments(&pool, &csv).await?, "assessments")
                }
            };
            println!("Inserted {inserted} {label} from {}.", csv.display());
        }
        Commands::Analyze {
            patient,
            since_days,
            config,
        } => {
            let mut thresholds = load_thresholds(config.as_ref())?;
            if let Some(days) = since_days {
                anyhow::ensure!(days >= 1, "--since-days must be at least 1");
                thresholds.analysis_days = days;
            }
            let summary = insight_service(&pool, thresholds)
                .risk_summary(patient)
                .await
                .with_context(|| format!("failed to analyze patient {patient}"))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Prescribe {
            patient,
            assessment,
            config,
        } => {
            let thresholds = load_thresholds(config.as_ref())?;
            let insight = insight_service(&pool, thresholds)
                .prescribe(patient, assessment)
                .await
                .with_context(|| format!("failed to prescribe for patient {patient}"))?;
            println!("{}", serde_json::to_string_pretty(&insight.prescription)?);
        }
        Commands::Report {
            patient,
            assessment,
            config,
            out,
        } => {
            let thresholds = load_thresholds(config.as_ref())?;
            let record = db::fetch_patient(&pool, patient).await?;
            let insight = insight_service(&pool, thresholds)
                .prescribe(patient, assessment)
                .await
                .with_context(|| format!("failed to build report for patient {patient}"))?;
            let report = report::build_report(&record, &insight);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
