use serde::{Deserialize, Serialize};

use crate::attendance::AttendanceSummary;
use crate::compliance::ComplianceSummary;
use crate::config::EngineConfig;
use crate::makeup::MakeupReconciliation;
use crate::models::StudentStatus;

/// Fraction of the requirement below which a student is flagged as behind.
pub const BEHIND_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    ClinicalBehind,
    SimCapViolation,
    AttendanceConcern,
    MakeupHoursOutstanding,
    AtRiskStatus,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::ClinicalBehind => "clinical_behind",
            FlagKind::SimCapViolation => "sim_cap_violation",
            FlagKind::AttendanceConcern => "attendance_concern",
            FlagKind::MakeupHoursOutstanding => "makeup_hours_outstanding",
            FlagKind::AtRiskStatus => "at_risk_status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    #[serde(rename = "type")]
    pub kind: FlagKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub struct FlagInputs<'a> {
    pub summary: &'a ComplianceSummary,
    pub makeup: &'a MakeupReconciliation,
    pub attendance: &'a AttendanceSummary,
    pub status: StudentStatus,
}

/// Derive flags fresh from computed state. Nothing here is persisted.
pub fn assess(inputs: &FlagInputs<'_>, config: &EngineConfig) -> Vec<Flag> {
    let summary = inputs.summary;
    let mut flags = Vec::new();

    if summary.total_hours < BEHIND_THRESHOLD * summary.hours_required {
        flags.push(Flag {
            kind: FlagKind::ClinicalBehind,
            severity: Severity::Warning,
            message: "Behind on clinical hours".to_string(),
            details: Some(format!(
                "{:.1}/{:.1} hours completed ({})",
                summary.total_hours,
                summary.hours_required,
                summary.progress_band.label()
            )),
        });
    }

    if summary.sim_hours > config.sim_cap_hours
        || summary.sim_cap_percentage > config.sim_cap_percent
    {
        flags.push(Flag {
            kind: FlagKind::SimCapViolation,
            severity: Severity::Critical,
            message: "Simulation hours exceed the regulatory cap".to_string(),
            details: Some(format!(
                "{:.1}h simulation ({:.1}% of total); cap is {:.0}h or {:.0}%",
                summary.sim_hours,
                summary.sim_cap_percentage,
                config.sim_cap_hours,
                config.sim_cap_percent
            )),
        });
    }

    let attendance = inputs.attendance;
    if attendance.total_absences >= config.attendance_absence_threshold
        || attendance.total_tardies >= config.attendance_tardy_threshold
    {
        flags.push(Flag {
            kind: FlagKind::AttendanceConcern,
            severity: Severity::Warning,
            message: format!(
                "Attendance concern: {} absences, {} tardies",
                attendance.total_absences, attendance.total_tardies
            ),
            details: Some(format!(
                "Classroom: {}A/{}T, Clinical: {}A/{}T",
                attendance.classroom_absences,
                attendance.classroom_tardies,
                attendance.clinical_absences,
                attendance.clinical_tardies
            )),
        });
    }

    if inputs.makeup.balance > 0.0 {
        flags.push(Flag {
            kind: FlagKind::MakeupHoursOutstanding,
            severity: Severity::Warning,
            message: format!("{:.1} make-up hours outstanding", inputs.makeup.balance),
            details: inputs
                .makeup
                .obligations
                .first()
                .and_then(|o| o.due_date)
                .map(|due| format!("next due {due}")),
        });
    }

    if inputs.status == StudentStatus::AtRisk {
        flags.push(Flag {
            kind: FlagKind::AtRiskStatus,
            severity: Severity::Critical,
            message: "Student marked as At Risk".to_string(),
            details: None,
        });
    }

    flags
}

/// Weighted flag count used to rank a cohort, highest first.
pub fn risk_score(flags: &[Flag]) -> f64 {
    flags
        .iter()
        .map(|flag| severity_weight(flag.severity))
        .sum()
}

pub fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 3.0,
        Severity::Warning => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::evaluate;
    use crate::compliance::tests::{ledger_with, sample_student};
    use crate::makeup::tests::obligation;
    use crate::makeup::reconcile;
    use crate::models::MakeupStatus;

    fn flags_for(direct: f64, sim: f64, status: StudentStatus) -> Vec<Flag> {
        let config = EngineConfig::default();
        let student = sample_student(status);
        let summary = evaluate(&student, &ledger_with(student.id, direct, sim), &config);
        let makeup = reconcile(student.id, &[]);
        let attendance = AttendanceSummary::default();
        assess(
            &FlagInputs {
                summary: &summary,
                makeup: &makeup,
                attendance: &attendance,
                status,
            },
            &config,
        )
    }

    fn kinds(flags: &[Flag]) -> Vec<FlagKind> {
        flags.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn no_hours_is_behind() {
        let flags = flags_for(0.0, 0.0, StudentStatus::Active);
        assert_eq!(kinds(&flags), vec![FlagKind::ClinicalBehind]);
        assert_eq!(flags[0].severity, Severity::Warning);
    }

    #[test]
    fn small_sim_share_is_behind_without_violation() {
        let flags = flags_for(90.0, 15.0, StudentStatus::Active);
        assert!(kinds(&flags).contains(&FlagKind::ClinicalBehind));
        assert!(!kinds(&flags).contains(&FlagKind::SimCapViolation));
    }

    #[test]
    fn over_cap_is_critical_violation() {
        let flags = flags_for(300.0, 110.0, StudentStatus::Active);
        let violation = flags
            .iter()
            .find(|f| f.kind == FlagKind::SimCapViolation)
            .unwrap();
        assert_eq!(violation.severity, Severity::Critical);
        assert!(!kinds(&flags).contains(&FlagKind::ClinicalBehind));
    }

    #[test]
    fn at_risk_status_always_surfaces() {
        let flags = flags_for(400.0, 0.0, StudentStatus::AtRisk);
        assert_eq!(kinds(&flags), vec![FlagKind::AtRiskStatus]);
        assert_eq!(flags[0].severity, Severity::Critical);
    }

    #[test]
    fn attendance_and_makeup_flags_use_thresholds() {
        let config = EngineConfig::default();
        let student = sample_student(StudentStatus::Active);
        let summary = evaluate(&student, &ledger_with(student.id, 400.0, 0.0), &config);
        let makeup = reconcile(
            student.id,
            &[obligation(student.id, 8.0, 2.0, MakeupStatus::InProgress, None)],
        );
        let attendance = AttendanceSummary {
            total_absences: 1,
            total_tardies: 5,
            ..AttendanceSummary::default()
        };

        let flags = assess(
            &FlagInputs {
                summary: &summary,
                makeup: &makeup,
                attendance: &attendance,
                status: StudentStatus::Active,
            },
            &config,
        );
        assert_eq!(
            kinds(&flags),
            vec![FlagKind::AttendanceConcern, FlagKind::MakeupHoursOutstanding]
        );
    }

    #[test]
    fn risk_score_weights_critical_flags() {
        let flags = flags_for(300.0, 110.0, StudentStatus::AtRisk);
        assert_eq!(risk_score(&flags), 6.0);
        assert_eq!(severity_weight(Severity::Warning), 1.0);
    }

    #[test]
    fn flag_serializes_with_type_key() {
        let flags = flags_for(0.0, 0.0, StudentStatus::Active);
        let json = serde_json::to_value(&flags[0]).unwrap();
        assert_eq!(json["type"], "clinical_behind");
        assert_eq!(json["severity"], "warning");
    }
}
