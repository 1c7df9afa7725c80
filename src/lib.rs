//! Risk-signal detection and PHQ-9 driven exercise scheduling for patient activity data.

pub mod clock;
pub mod config;
pub mod db;
pub mod engagement;
pub mod error;
pub mod models;
pub mod prescription;
pub mod report;
pub mod risk;
pub mod service;
pub mod stats;

pub use config::RiskThresholds;
pub use error::{EngineError, EngineResult};
pub use prescription::{ExercisePrescription, SeverityExerciseScheduler};
pub use risk::{RiskSignalDetector, RiskSummary};
pub use service::{InsightService, PatientInsight, PatientRepository};
