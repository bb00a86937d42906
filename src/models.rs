use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ComplianceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudentStatus {
    Active,
    #[serde(rename = "At Risk")]
    AtRisk,
    Graduated,
    Withdrawn,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "Active",
            StudentStatus::AtRisk => "At Risk",
            StudentStatus::Graduated => "Graduated",
            StudentStatus::Withdrawn => "Withdrawn",
        }
    }
}

impl FromStr for StudentStatus {
    type Err = ComplianceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Active" => Ok(StudentStatus::Active),
            "At Risk" => Ok(StudentStatus::AtRisk),
            "Graduated" => Ok(StudentStatus::Graduated),
            "Withdrawn" => Ok(StudentStatus::Withdrawn),
            other => Err(ComplianceError::invalid(
                "student status",
                format!("'{other}' is not a known status"),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub cohort: String,
    pub status: StudentStatus,
    /// Per-student override of the configured requirement.
    pub clinical_hours_required: Option<f64>,
    /// Cached total of approved hours. Written only by the approval workflow.
    pub clinical_hours_completed: f64,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Review state shared by clinical logs and hour submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Approved")]
    Approved,
    #[serde(alias = "Rejected")]
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewStatus::Pending)
    }
}

impl FromStr for ReviewStatus {
    type Err = ComplianceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            _ => Err(ComplianceError::invalid(
                "review status",
                format!("'{value}' is not a known status"),
            )),
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalLogEntry {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub site_name: String,
    pub patient_diagnosis: String,
    /// `None` when the log was recorded without a duration.
    pub hours: Option<f64>,
    /// Explicit classification; the site/diagnosis heuristic applies only when absent.
    pub is_simulation: Option<bool>,
    pub is_makeup: bool,
    pub status: ReviewStatus,
    pub instructor_feedback: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrScenario {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub is_required: bool,
    pub default_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrCompletion {
    pub id: Uuid,
    pub student_id: Uuid,
    pub scenario_id: Uuid,
    pub completion_date: NaiveDate,
    pub hours: f64,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourSubmission {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub site_name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub hours: f64,
    pub activities: String,
    pub reflection: Option<String>,
    pub status: ReviewStatus,
    pub reviewer_feedback: Option<String>,
    pub reviewed_by: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MakeupStatus {
    Pending,
    InProgress,
    Completed,
}

impl MakeupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MakeupStatus::Pending => "pending",
            MakeupStatus::InProgress => "in_progress",
            MakeupStatus::Completed => "completed",
        }
    }
}

impl FromStr for MakeupStatus {
    type Err = ComplianceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(MakeupStatus::Pending),
            "in_progress" => Ok(MakeupStatus::InProgress),
            "completed" => Ok(MakeupStatus::Completed),
            other => Err(ComplianceError::invalid(
                "make-up status",
                format!("'{other}' is not a known status"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeupHoursObligation {
    pub id: Uuid,
    pub student_id: Uuid,
    pub original_absence_id: Option<Uuid>,
    pub hours_owed: f64,
    pub hours_completed: f64,
    pub reason: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub status: MakeupStatus,
}

impl MakeupHoursObligation {
    /// Hours still owed on this obligation; negative when over-completed.
    pub fn balance(&self) -> f64 {
        self.hours_owed - self.hours_completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceKind {
    Classroom,
    Clinical,
}

impl AttendanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceKind::Classroom => "classroom",
            AttendanceKind::Clinical => "clinical",
        }
    }
}

impl FromStr for AttendanceKind {
    type Err = ComplianceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "classroom" => Ok(AttendanceKind::Classroom),
            "clinical" => Ok(AttendanceKind::Clinical),
            _ => Err(ComplianceError::invalid(
                "attendance type",
                format!("'{value}' is not a known type"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Tardy,
    Excused,
    Partial,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Tardy => "Tardy",
            AttendanceStatus::Excused => "Excused",
            AttendanceStatus::Partial => "Partial",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = ComplianceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            "Tardy" => Ok(AttendanceStatus::Tardy),
            "Excused" => Ok(AttendanceStatus::Excused),
            "Partial" => Ok(AttendanceStatus::Partial),
            other => Err(ComplianceError::invalid(
                "attendance status",
                format!("'{other}' is not a known status"),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub kind: AttendanceKind,
    pub status: AttendanceStatus,
    pub hours_attended: Option<f64>,
    pub hours_required: Option<f64>,
}

impl AttendanceRecord {
    /// Hours missed on a partial day, zero for every other status.
    pub fn partial_shortfall(&self) -> f64 {
        match (self.status, self.hours_attended, self.hours_required) {
            (AttendanceStatus::Partial, Some(attended), Some(required)) => {
                (required - attended).max(0.0)
            }
            _ => 0.0,
        }
    }
}

/// Everything the engine reads for one student in a single recompute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentRecords {
    pub clinical_logs: Vec<ClinicalLogEntry>,
    pub vr_completions: Vec<VrCompletion>,
    pub vr_scenarios: Vec<VrScenario>,
    pub hour_submissions: Vec<HourSubmission>,
    pub makeup_obligations: Vec<MakeupHoursObligation>,
    pub attendance: Vec<AttendanceRecord>,
}

/// A record that can go through instructor review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReviewTarget {
    ClinicalLog(Uuid),
    HourSubmission(Uuid),
}

impl ReviewTarget {
    pub fn record_ref(&self) -> RecordRef {
        match *self {
            ReviewTarget::ClinicalLog(id) => RecordRef::ClinicalLog(id),
            ReviewTarget::HourSubmission(id) => RecordRef::HourSubmission(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordRef {
    ClinicalLog(Uuid),
    HourSubmission(Uuid),
    MakeupObligation(Uuid),
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::ClinicalLog(id) => write!(f, "clinical log {id}"),
            RecordRef::HourSubmission(id) => write!(f, "hour submission {id}"),
            RecordRef::MakeupObligation(id) => write!(f, "make-up obligation {id}"),
        }
    }
}

/// A queue entry for reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReview {
    pub target: ReviewTarget,
    pub student_id: Uuid,
    pub student_name: String,
    pub date: NaiveDate,
    pub site_name: String,
    pub hours: Option<f64>,
}
