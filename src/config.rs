use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_ANALYSIS_DAYS: i64 = 30;

/// Detection thresholds for the five risk heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub analysis_days: i64,
    /// Relative weekly drop that counts as disengagement.
    pub engagement_drop: f64,
    /// Ratings strictly below this are negative.
    pub negative_rating: f64,
    pub negative_share: f64,
    /// Relative increase in crisis-exercise share.
    pub crisis_usage_spike: f64,
    pub avoidance_rate: f64,
    pub isolation_score: f64,
    pub min_sessions_for_trend: usize,
    pub recent_weeks: usize,
    pub crisis_exercises: Vec<String>,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            analysis_days: DEFAULT_ANALYSIS_DAYS,
            engagement_drop: 0.5,
            negative_rating: 3.0,
            negative_share: 0.7,
            crisis_usage_spike: 2.0,
            avoidance_rate: 0.8,
            isolation_score: 0.3,
            min_sessions_for_trend: 5,
            recent_weeks: 2,
            crisis_exercises: vec!["4-7-8-breathing".to_string(), "box-breathing".to_string()],
        }
    }
}

impl RiskThresholds {
    pub fn from_json_file(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            EngineError::validation(format!("cannot read {}: {err}", path.display()))
        })?;
        let thresholds: Self = serde_json::from_str(&raw).map_err(|err| {
            EngineError::validation(format!("invalid thresholds in {}: {err}", path.display()))
        })?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.analysis_days < 1 {
            return Err(EngineError::validation("analysis_days must be at least 1"));
        }
        if self.recent_weeks == 0 {
            return Err(EngineError::validation("recent_weeks must be at least 1"));
        }
        let fractions = [
            ("engagement_drop", self.engagement_drop),
            ("negative_share", self.negative_share),
            ("avoidance_rate", self.avoidance_rate),
            ("isolation_score", self.isolation_score),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::validation(format!("{name} must be within 0..=1")));
            }
        }
        if self.crisis_usage_spike < 0.0 || !self.crisis_usage_spike.is_finite() {
            return Err(EngineError::validation("crisis_usage_spike must be non-negative"));
        }
        Ok(())
    }

    pub fn is_crisis_exercise(&self, exercise_type: &str) -> bool {
        self.crisis_exercises.iter().any(|name| name == exercise_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let thresholds = RiskThresholds::default();
        assert!(thresholds.validate().is_ok());
        assert!(thresholds.is_crisis_exercise("box-breathing"));
        assert!(!thresholds.is_crisis_exercise("body-scan"));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let thresholds: RiskThresholds =
            serde_json::from_str(r#"{"avoidance_rate": 0.7}"#).expect("valid json");
        assert_eq!(thresholds.avoidance_rate, 0.7);
        assert_eq!(thresholds.engagement_drop, 0.5);
    }

    #[test]
    fn rejects_fraction_out_of_range() {
        let thresholds = RiskThresholds {
            avoidance_rate: 1.5,
            ..RiskThresholds::default()
        };
        assert!(thresholds.validate().is_err());
    }
}
