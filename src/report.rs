use std::fmt::Write;

use crate::models::PatientRecord;
use crate::risk::{Evidence, RiskFinding};
use crate::service::PatientInsight;

fn finding_line(name: &str, finding: &RiskFinding) -> String {
    if finding.insufficient_data {
        return format!("- {name}: insufficient data");
    }
    let status = if finding.detected { "detected" } else { "clear" };
    let mut line = format!(
        "- {name}: {status} (severity {}, value {:.2})",
        finding.severity.as_str(),
        finding.metric_value
    );
    if let Evidence::AvoidancePattern {
        most_avoided_exercise: Some(exercise),
        ..
    } = &finding.evidence
    {
        let _ = write!(line, ", most avoided: {exercise}");
    }
    line
}

pub fn build_report(patient: &PatientRecord, insight: &PatientInsight) -> String {
    let risk = &insight.risk;
    let plan = &insight.prescription;
    let mut output = String::new();

    let _ = writeln!(output, "# Session Briefing: {}", patient.full_name);
    let _ = writeln!(
        output,
        "Generated {} for {} ({})",
        insight.generated_at.format("%Y-%m-%d %H:%M"),
        patient.email,
        patient.id
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Overview");
    let _ = writeln!(
        output,
        "Overall risk: **{}** ({:.0}% of maximum)",
        risk.overall_risk_level.as_str(),
        risk.risk_percentage * 100.0
    );
    for (risk_type, finding) in risk.findings() {
        let _ = writeln!(output, "{}", finding_line(risk_type.as_str(), finding));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alerts");
    if risk.alerts.is_empty() {
        let _ = writeln!(output, "No alerts requiring intervention.");
    } else {
        for alert in &risk.alerts {
            let _ = writeln!(
                output,
                "- [{}] {} Action: {}",
                alert.severity.as_str(),
                alert.message,
                alert.recommended_action
            );
        }
    }

    let crises = &risk.crisis_pattern;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Crisis Pattern");
    if crises.frequency == 0 {
        let _ = writeln!(output, "No crisis alerts in this window.");
    } else {
        let _ = writeln!(
            output,
            "{} alerts ({} in the last 7 days), crisis risk {}",
            crises.frequency,
            crises.recent_crises,
            crises.risk_level.as_str()
        );
        if let Some(hour) = crises.most_common_hour {
            let _ = writeln!(output, "- Most common crisis time: {hour:02}:00");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Exercise Prescription");
    let _ = writeln!(
        output,
        "PHQ-9 {} ({}), frequency {}, focus {}",
        plan.total_score,
        plan.severity_band.as_str(),
        plan.regimen.frequency.as_str(),
        plan.regimen.focus
    );
    let _ = writeln!(output, "- Daily: {}", plan.regimen.daily.join(", "));
    if !plan.regimen.weekly.is_empty() {
        let _ = writeln!(output, "- Weekly: {}", plan.regimen.weekly.join(", "));
    }
    let trend = &plan.trend;
    let _ = writeln!(
        output,
        "- Trend: improvement {}, deterioration {}, mood slope {:.2}, completion {:.0}%",
        trend.improvement,
        trend.deterioration,
        trend.mood_trend.slope,
        trend.engagement.completion_rate * 100.0
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Schedule");
    for (label, slot) in [
        ("Morning", &plan.schedule.morning),
        ("Midday", &plan.schedule.midday),
        ("Evening", &plan.schedule.evening),
    ] {
        let exercises = if slot.exercises.is_empty() {
            "open".to_string()
        } else {
            slot.exercises.join(", ")
        };
        let _ = writeln!(output, "- {label} {}: {exercises}", slot.time_range);
    }
    let _ = writeln!(
        output,
        "- Emergency ({}): {}",
        plan.schedule.emergency.availability,
        plan.schedule.emergency.exercises.join(", ")
    );

    if let Some(safety) = &plan.safety_protocol {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Safety Protocol");
        let _ = writeln!(
            output,
            "Immediate notifications on; notify provider within {} hours.",
            safety.provider_notification_hours
        );
        if safety.emergency_contact_integration {
            let _ = writeln!(output, "Item 9 flagged: emergency contacts engaged.");
        }
    }

    output
}
