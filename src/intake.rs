//! Boundary validation for records handed in by collaborators.
//!
//! Everything past this module may assume hours are finite and positive, dates
//! are present and sites are named. Invalid records are returned to the caller
//! and never reach the ledger.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ComplianceError, Result};
use crate::models::{
    AttendanceKind, AttendanceRecord, AttendanceStatus, ClinicalLogEntry, HourSubmission,
    MakeupHoursObligation, MakeupStatus, ReviewStatus, VrCompletion,
};

/// Hours as they arrive from forms and imports: a number or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawHours {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawClinicalLog {
    pub id: Option<Uuid>,
    pub student_id: Uuid,
    pub date: Option<NaiveDate>,
    pub site_name: Option<String>,
    #[serde(default)]
    pub patient_diagnosis: String,
    pub hours: Option<RawHours>,
    pub is_simulation: Option<bool>,
    #[serde(default)]
    pub is_makeup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHourSubmission {
    pub id: Option<Uuid>,
    pub student_id: Uuid,
    pub date: Option<NaiveDate>,
    pub site_name: Option<String>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub activities: String,
    pub reflection: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVrCompletion {
    pub id: Option<Uuid>,
    pub student_id: Uuid,
    pub scenario_id: Uuid,
    pub completion_date: Option<NaiveDate>,
    pub hours: Option<RawHours>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMakeupObligation {
    pub id: Option<Uuid>,
    pub student_id: Uuid,
    pub original_absence_id: Option<Uuid>,
    pub hours_owed: RawHours,
    pub reason: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAttendance {
    pub id: Option<Uuid>,
    pub student_id: Uuid,
    pub date: Option<NaiveDate>,
    pub kind: AttendanceKind,
    pub status: AttendanceStatus,
    pub hours_attended: Option<RawHours>,
    pub hours_required: Option<RawHours>,
}

/// Parse a strictly positive, finite hour value.
pub fn parse_hours(field: &'static str, raw: &RawHours) -> Result<f64> {
    let value = match raw {
        RawHours::Number(value) => *value,
        RawHours::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ComplianceError::invalid(field, format!("'{text}' is not a number")))?,
    };

    if !value.is_finite() {
        return Err(ComplianceError::invalid(field, "must be a finite number"));
    }
    if value <= 0.0 {
        return Err(ComplianceError::invalid(
            field,
            format!("must be positive, got {value}"),
        ));
    }
    Ok(value)
}

fn parse_optional_hours(field: &'static str, raw: Option<&RawHours>) -> Result<Option<f64>> {
    raw.map(|raw| parse_hours(field, raw)).transpose()
}

fn require_date(field: &'static str, date: Option<NaiveDate>) -> Result<NaiveDate> {
    date.ok_or_else(|| ComplianceError::invalid(field, "is required"))
}

fn require_site(site: Option<&str>) -> Result<String> {
    match site.map(str::trim) {
        Some(site) if !site.is_empty() => Ok(site.to_string()),
        _ => Err(ComplianceError::invalid("site_name", "is required")),
    }
}

pub fn ensure_known_student(known: &HashSet<Uuid>, student_id: Uuid) -> Result<()> {
    if known.contains(&student_id) {
        Ok(())
    } else {
        Err(ComplianceError::UnknownStudent(student_id))
    }
}

/// New logs always enter review as pending.
pub fn validate_clinical_log(raw: &RawClinicalLog) -> Result<ClinicalLogEntry> {
    Ok(ClinicalLogEntry {
        id: raw.id.unwrap_or_else(Uuid::new_v4),
        student_id: raw.student_id,
        date: require_date("date", raw.date)?,
        site_name: require_site(raw.site_name.as_deref())?,
        patient_diagnosis: raw.patient_diagnosis.trim().to_string(),
        hours: parse_optional_hours("hours", raw.hours.as_ref())?,
        is_simulation: raw.is_simulation,
        is_makeup: raw.is_makeup,
        status: ReviewStatus::Pending,
        instructor_feedback: None,
        reviewed_at: None,
    })
}

/// Hours between start and end, rounded to two decimals. Overnight shifts are not supported.
pub fn submission_hours(start: NaiveTime, end: NaiveTime) -> Result<f64> {
    if end <= start {
        return Err(ComplianceError::invalid(
            "end_time",
            format!("{end} is not after start {start}"),
        ));
    }
    let minutes = (end - start).num_minutes() as f64;
    Ok((minutes / 60.0 * 100.0).round() / 100.0)
}

pub fn validate_hour_submission(
    raw: &RawHourSubmission,
    submitted_at: DateTime<Utc>,
) -> Result<HourSubmission> {
    let hours = submission_hours(raw.start_time, raw.end_time)?;
    if hours <= 0.0 {
        return Err(ComplianceError::invalid("end_time", "shift is shorter than a minute"));
    }

    Ok(HourSubmission {
        id: raw.id.unwrap_or_else(Uuid::new_v4),
        student_id: raw.student_id,
        date: require_date("date", raw.date)?,
        site_name: require_site(raw.site_name.as_deref())?,
        start_time: raw.start_time,
        end_time: raw.end_time,
        hours,
        activities: raw.activities.trim().to_string(),
        reflection: raw.reflection.clone(),
        status: ReviewStatus::Pending,
        reviewer_feedback: None,
        reviewed_by: None,
        submitted_at,
        reviewed_at: None,
    })
}

/// VR completions without hours fall back to the scenario's default.
pub fn validate_vr_completion(
    raw: &RawVrCompletion,
    scenario_default_hours: Option<f64>,
) -> Result<VrCompletion> {
    let hours = match &raw.hours {
        Some(raw_hours) => parse_hours("hours", raw_hours)?,
        None => match scenario_default_hours {
            Some(hours) => parse_hours("default_hours", &RawHours::Number(hours))?,
            None => return Err(ComplianceError::invalid("hours", "is required")),
        },
    };

    if let Some(score) = raw.score {
        if !(0.0..=100.0).contains(&score) {
            return Err(ComplianceError::invalid(
                "score",
                format!("must be within [0, 100], got {score}"),
            ));
        }
    }

    Ok(VrCompletion {
        id: raw.id.unwrap_or_else(Uuid::new_v4),
        student_id: raw.student_id,
        scenario_id: raw.scenario_id,
        completion_date: require_date("completion_date", raw.completion_date)?,
        hours,
        score: raw.score,
    })
}

pub fn validate_makeup_obligation(raw: &RawMakeupObligation) -> Result<MakeupHoursObligation> {
    Ok(MakeupHoursObligation {
        id: raw.id.unwrap_or_else(Uuid::new_v4),
        student_id: raw.student_id,
        original_absence_id: raw.original_absence_id,
        hours_owed: parse_hours("hours_owed", &raw.hours_owed)?,
        hours_completed: 0.0,
        reason: raw.reason.clone(),
        due_date: raw.due_date,
        completion_date: None,
        status: MakeupStatus::Pending,
    })
}

pub fn validate_attendance(raw: &RawAttendance) -> Result<AttendanceRecord> {
    let hours_attended = match &raw.hours_attended {
        // Zero attended hours is a valid partial day.
        Some(RawHours::Number(value)) if *value == 0.0 => Some(0.0),
        other => parse_optional_hours("hours_attended", other.as_ref())?,
    };
    let hours_required = parse_optional_hours("hours_required", raw.hours_required.as_ref())?;

    if raw.status == AttendanceStatus::Partial {
        match (hours_attended, hours_required) {
            (Some(attended), Some(required)) if attended > required => {
                return Err(ComplianceError::invalid(
                    "hours_attended",
                    format!("{attended} exceeds required {required}"),
                ));
            }
            (Some(_), Some(_)) => {}
            _ => {
                return Err(ComplianceError::invalid(
                    "hours_attended",
                    "partial attendance needs attended and required hours",
                ));
            }
        }
    }

    Ok(AttendanceRecord {
        id: raw.id.unwrap_or_else(Uuid::new_v4),
        student_id: raw.student_id,
        date: require_date("date", raw.date)?,
        kind: raw.kind,
        status: raw.status,
        hours_attended,
        hours_required,
    })
}

/// A rejected record and why.
#[derive(Debug)]
pub struct Rejection {
    pub index: usize,
    pub student_id: Uuid,
    pub error: ComplianceError,
}

/// A mixed batch of incoming records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeBatch {
    #[serde(default)]
    pub clinical_logs: Vec<RawClinicalLog>,
    #[serde(default)]
    pub hour_submissions: Vec<RawHourSubmission>,
    #[serde(default)]
    pub vr_completions: Vec<RawVrCompletion>,
    #[serde(default)]
    pub makeup_obligations: Vec<RawMakeupObligation>,
    #[serde(default)]
    pub attendance: Vec<RawAttendance>,
}

#[derive(Debug, Default)]
pub struct AcceptedBatch {
    pub clinical_logs: Vec<ClinicalLogEntry>,
    pub hour_submissions: Vec<HourSubmission>,
    pub vr_completions: Vec<VrCompletion>,
    pub makeup_obligations: Vec<MakeupHoursObligation>,
    pub attendance: Vec<AttendanceRecord>,
    pub rejections: Vec<Rejection>,
}

impl AcceptedBatch {
    pub fn accepted_count(&self) -> usize {
        self.clinical_logs.len()
            + self.hour_submissions.len()
            + self.vr_completions.len()
            + self.makeup_obligations.len()
            + self.attendance.len()
    }
}

impl IntakeBatch {
    /// Validate every record; bad ones are collected rather than aborting the batch.
    /// Rejection indices count across the batch in field order. `scenarios` maps
    /// each known VR scenario to its default hours.
    pub fn validate(
        &self,
        known: &HashSet<Uuid>,
        scenarios: &HashMap<Uuid, Option<f64>>,
        submitted_at: DateTime<Utc>,
    ) -> AcceptedBatch {
        let mut accepted = AcceptedBatch::default();
        let mut index = 0usize;

        for raw in &self.clinical_logs {
            match ensure_known_student(known, raw.student_id)
                .and_then(|_| validate_clinical_log(raw))
            {
                Ok(entry) => accepted.clinical_logs.push(entry),
                Err(error) => accepted.rejections.push(Rejection {
                    index,
                    student_id: raw.student_id,
                    error,
                }),
            }
            index += 1;
        }

        for raw in &self.hour_submissions {
            match ensure_known_student(known, raw.student_id)
                .and_then(|_| validate_hour_submission(raw, submitted_at))
            {
                Ok(submission) => accepted.hour_submissions.push(submission),
                Err(error) => accepted.rejections.push(Rejection {
                    index,
                    student_id: raw.student_id,
                    error,
                }),
            }
            index += 1;
        }

        for raw in &self.vr_completions {
            let outcome = ensure_known_student(known, raw.student_id).and_then(|_| {
                let default_hours = scenarios.get(&raw.scenario_id).ok_or_else(|| {
                    ComplianceError::invalid(
                        "scenario_id",
                        format!("unknown scenario {}", raw.scenario_id),
                    )
                })?;
                validate_vr_completion(raw, *default_hours)
            });
            match outcome {
                Ok(completion) => accepted.vr_completions.push(completion),
                Err(error) => accepted.rejections.push(Rejection {
                    index,
                    student_id: raw.student_id,
                    error,
                }),
            }
            index += 1;
        }

        for raw in &self.makeup_obligations {
            match ensure_known_student(known, raw.student_id)
                .and_then(|_| validate_makeup_obligation(raw))
            {
                Ok(obligation) => accepted.makeup_obligations.push(obligation),
                Err(error) => accepted.rejections.push(Rejection {
                    index,
                    student_id: raw.student_id,
                    error,
                }),
            }
            index += 1;
        }

        for raw in &self.attendance {
            match ensure_known_student(known, raw.student_id)
                .and_then(|_| validate_attendance(raw))
            {
                Ok(record) => accepted.attendance.push(record),
                Err(error) => accepted.rejections.push(Rejection {
                    index,
                    student_id: raw.student_id,
                    error,
                }),
            }
            index += 1;
        }

        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_log(student_id: Uuid, hours: Option<RawHours>) -> RawClinicalLog {
        RawClinicalLog {
            id: None,
            student_id,
            date: NaiveDate::from_ymd_opt(2026, 2, 10),
            site_name: Some("Riverside Medical Center".to_string()),
            patient_diagnosis: "CHF".to_string(),
            hours,
            is_simulation: None,
            is_makeup: false,
        }
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_numeric_text_hours() {
        assert_eq!(parse_hours("hours", &RawHours::Text(" 7.5 ".into())).unwrap(), 7.5);
        assert_eq!(parse_hours("hours", &RawHours::Number(12.0)).unwrap(), 12.0);
    }

    #[test]
    fn rejects_negative_and_non_numeric_hours() {
        assert!(matches!(
            parse_hours("hours", &RawHours::Number(-2.0)),
            Err(ComplianceError::InvalidRecord { field: "hours", .. })
        ));
        assert!(matches!(
            parse_hours("hours", &RawHours::Text("eight".into())),
            Err(ComplianceError::InvalidRecord { .. })
        ));
        assert!(parse_hours("hours", &RawHours::Number(f64::NAN)).is_err());
    }

    #[test]
    fn clinical_log_requires_date_and_site() {
        let student = Uuid::new_v4();
        let mut raw = raw_log(student, Some(RawHours::Number(8.0)));
        raw.date = None;
        assert!(matches!(
            validate_clinical_log(&raw),
            Err(ComplianceError::InvalidRecord { field: "date", .. })
        ));

        let mut raw = raw_log(student, Some(RawHours::Number(8.0)));
        raw.site_name = Some("   ".to_string());
        assert!(matches!(
            validate_clinical_log(&raw),
            Err(ComplianceError::InvalidRecord { field: "site_name", .. })
        ));
    }

    #[test]
    fn clinical_log_enters_as_pending_and_keeps_missing_hours() {
        let entry = validate_clinical_log(&raw_log(Uuid::new_v4(), None)).unwrap();
        assert_eq!(entry.status, ReviewStatus::Pending);
        assert_eq!(entry.hours, None);
    }

    #[test]
    fn submission_hours_come_from_shift_times() {
        assert_eq!(submission_hours(time(7, 0), time(15, 0)).unwrap(), 8.0);
        assert_eq!(submission_hours(time(7, 0), time(11, 20)).unwrap(), 4.33);
        assert!(submission_hours(time(15, 0), time(7, 0)).is_err());
    }

    #[test]
    fn partial_attendance_needs_both_hour_values() {
        let raw = RawAttendance {
            id: None,
            student_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 2, 11),
            kind: AttendanceKind::Clinical,
            status: AttendanceStatus::Partial,
            hours_attended: Some(RawHours::Number(4.0)),
            hours_required: None,
        };
        assert!(validate_attendance(&raw).is_err());

        let raw = RawAttendance {
            hours_required: Some(RawHours::Number(8.0)),
            ..raw
        };
        let record = validate_attendance(&raw).unwrap();
        assert_eq!(record.partial_shortfall(), 4.0);
    }

    #[test]
    fn batch_collects_rejections_without_aborting() {
        let known_student = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let known: HashSet<Uuid> = [known_student].into_iter().collect();

        let batch = IntakeBatch {
            clinical_logs: vec![
                raw_log(known_student, Some(RawHours::Number(8.0))),
                raw_log(known_student, Some(RawHours::Text("-3".into()))),
                raw_log(stranger, Some(RawHours::Number(6.0))),
            ],
            ..IntakeBatch::default()
        };

        let accepted = batch.validate(&known, &HashMap::new(), Utc::now());
        assert_eq!(accepted.clinical_logs.len(), 1);
        assert_eq!(accepted.rejections.len(), 2);
        assert_eq!(accepted.rejections[0].index, 1);
        assert!(matches!(
            accepted.rejections[1].error,
            ComplianceError::UnknownStudent(id) if id == stranger
        ));
    }

    #[test]
    fn vr_completions_need_a_known_scenario() {
        let student_id = Uuid::new_v4();
        let scenario_id = Uuid::new_v4();
        let known: HashSet<Uuid> = [student_id].into_iter().collect();
        let scenarios: HashMap<Uuid, Option<f64>> =
            [(scenario_id, Some(2.0))].into_iter().collect();

        let completion = |scenario_id| RawVrCompletion {
            id: None,
            student_id,
            scenario_id,
            completion_date: NaiveDate::from_ymd_opt(2026, 2, 12),
            hours: None,
            score: Some(88.0),
        };
        let batch = IntakeBatch {
            vr_completions: vec![completion(scenario_id), completion(Uuid::new_v4())],
            ..IntakeBatch::default()
        };

        let accepted = batch.validate(&known, &scenarios, Utc::now());
        assert_eq!(accepted.vr_completions.len(), 1);
        assert_eq!(accepted.vr_completions[0].hours, 2.0);
        assert_eq!(accepted.rejections.len(), 1);
        assert_eq!(accepted.rejections[0].index, 1);
        assert!(matches!(
            accepted.rejections[0].error,
            ComplianceError::InvalidRecord { field: "scenario_id", .. }
        ));
    }
}
