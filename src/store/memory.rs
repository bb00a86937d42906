use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{CompletedHours, MakeupChange, RecordStore};
use crate::error::{ComplianceError, Result};
use crate::intake::AcceptedBatch;
use crate::models::{
    AttendanceRecord, ClinicalLogEntry, HourSubmission, MakeupHoursObligation, PendingReview,
    RecordRef, ReviewStatus, ReviewTarget, Student, StudentRecords, VrCompletion, VrScenario,
};
use crate::workflow::{ReviewCommand, ReviewDecision, ReviewReceipt};

#[derive(Debug, Default)]
struct Tables {
    students: HashMap<Uuid, Student>,
    clinical_logs: Vec<ClinicalLogEntry>,
    vr_scenarios: Vec<VrScenario>,
    vr_completions: Vec<VrCompletion>,
    hour_submissions: Vec<HourSubmission>,
    makeup_obligations: Vec<MakeupHoursObligation>,
    attendance: Vec<AttendanceRecord>,
}

impl Tables {
    fn records_for(&self, student_id: Uuid) -> StudentRecords {
        StudentRecords {
            clinical_logs: self
                .clinical_logs
                .iter()
                .filter(|r| r.student_id == student_id)
                .cloned()
                .collect(),
            vr_completions: self
                .vr_completions
                .iter()
                .filter(|r| r.student_id == student_id)
                .cloned()
                .collect(),
            vr_scenarios: self.vr_scenarios.clone(),
            hour_submissions: self
                .hour_submissions
                .iter()
                .filter(|r| r.student_id == student_id)
                .cloned()
                .collect(),
            makeup_obligations: self
                .makeup_obligations
                .iter()
                .filter(|r| r.student_id == student_id)
                .cloned()
                .collect(),
            attendance: self
                .attendance
                .iter()
                .filter(|r| r.student_id == student_id)
                .cloned()
                .collect(),
        }
    }

    fn student_name(&self, student_id: Uuid) -> String {
        self.students
            .get(&student_id)
            .map(Student::full_name)
            .unwrap_or_default()
    }
}

/// In-process store for embedding and tests. One lock guards every table, so
/// each write is atomic with respect to every read.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_student(&self, student: Student) {
        self.tables.write().await.students.insert(student.id, student);
    }

    pub async fn insert_clinical_log(&self, entry: ClinicalLogEntry) {
        self.tables.write().await.clinical_logs.push(entry);
    }

    pub async fn insert_vr_scenario(&self, scenario: VrScenario) {
        self.tables.write().await.vr_scenarios.push(scenario);
    }

    pub async fn insert_vr_completion(&self, completion: VrCompletion) {
        self.tables.write().await.vr_completions.push(completion);
    }

    pub async fn insert_hour_submission(&self, submission: HourSubmission) {
        self.tables.write().await.hour_submissions.push(submission);
    }

    pub async fn insert_makeup(&self, obligation: MakeupHoursObligation) {
        self.tables.write().await.makeup_obligations.push(obligation);
    }

    pub async fn insert_attendance(&self, record: AttendanceRecord) {
        self.tables.write().await.attendance.push(record);
    }

    /// Store every accepted record from a validated intake batch.
    pub async fn ingest(&self, batch: AcceptedBatch) -> usize {
        let inserted = batch.accepted_count();
        let mut tables = self.tables.write().await;
        tables.clinical_logs.extend(batch.clinical_logs);
        tables.hour_submissions.extend(batch.hour_submissions);
        tables.vr_completions.extend(batch.vr_completions);
        tables.makeup_obligations.extend(batch.makeup_obligations);
        tables.attendance.extend(batch.attendance);
        inserted
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_student(&self, student_id: Uuid) -> Result<Option<Student>> {
        Ok(self.tables.read().await.students.get(&student_id).cloned())
    }

    async fn fetch_records(&self, student_id: Uuid) -> Result<StudentRecords> {
        Ok(self.tables.read().await.records_for(student_id))
    }

    async fn cohort_student_ids(&self, cohort: &str) -> Result<Vec<Uuid>> {
        let tables = self.tables.read().await;
        let mut ids: Vec<Uuid> = tables
            .students
            .values()
            .filter(|s| s.cohort == cohort)
            .map(|s| s.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn pending_reviews(&self) -> Result<Vec<PendingReview>> {
        let tables = self.tables.read().await;
        let mut pending: Vec<PendingReview> = tables
            .clinical_logs
            .iter()
            .filter(|log| log.status == ReviewStatus::Pending)
            .map(|log| PendingReview {
                target: ReviewTarget::ClinicalLog(log.id),
                student_id: log.student_id,
                student_name: tables.student_name(log.student_id),
                date: log.date,
                site_name: log.site_name.clone(),
                hours: log.hours,
            })
            .chain(
                tables
                    .hour_submissions
                    .iter()
                    .filter(|s| s.status == ReviewStatus::Pending)
                    .map(|s| PendingReview {
                        target: ReviewTarget::HourSubmission(s.id),
                        student_id: s.student_id,
                        student_name: tables.student_name(s.student_id),
                        date: s.date,
                        site_name: s.site_name.clone(),
                        hours: Some(s.hours),
                    }),
            )
            .collect();
        pending.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(pending)
    }

    async fn apply_review(
        &self,
        command: &ReviewCommand,
        recompute: &CompletedHours,
    ) -> Result<ReviewReceipt> {
        let mut tables = self.tables.write().await;

        let (index, student_id, current) = match command.target {
            ReviewTarget::ClinicalLog(id) => tables
                .clinical_logs
                .iter()
                .position(|log| log.id == id)
                .map(|i| (i, tables.clinical_logs[i].student_id, tables.clinical_logs[i].status)),
            ReviewTarget::HourSubmission(id) => tables
                .hour_submissions
                .iter()
                .position(|s| s.id == id)
                .map(|i| {
                    let submission = &tables.hour_submissions[i];
                    (i, submission.student_id, submission.status)
                }),
        }
        .ok_or(ComplianceError::RecordNotFound(command.target.record_ref()))?;

        // Validate everything before the first write.
        let next = command.next_status(current)?;
        if !tables.students.contains_key(&student_id) {
            return Err(ComplianceError::UnknownStudent(student_id));
        }

        match command.target {
            ReviewTarget::ClinicalLog(_) => {
                let log = &mut tables.clinical_logs[index];
                log.status = next;
                log.instructor_feedback = command.feedback.clone();
                log.reviewed_at = Some(command.reviewed_at);
            }
            ReviewTarget::HourSubmission(_) => {
                let submission = &mut tables.hour_submissions[index];
                submission.status = next;
                submission.reviewer_feedback = command.feedback.clone();
                submission.reviewed_by = command.reviewed_by.clone();
                submission.reviewed_at = Some(command.reviewed_at);
            }
        }

        let clinical_hours_completed = match command.decision {
            ReviewDecision::Approve => {
                let completed = recompute(student_id, &tables.records_for(student_id));
                if let Some(student) = tables.students.get_mut(&student_id) {
                    student.clinical_hours_completed = completed;
                }
                debug!(%student_id, completed, "cached clinical hours updated");
                Some(completed)
            }
            ReviewDecision::Reject => None,
        };

        Ok(ReviewReceipt {
            target: command.target,
            student_id,
            status: next,
            clinical_hours_completed,
        })
    }

    async fn update_makeup(
        &self,
        obligation_id: Uuid,
        change: &MakeupChange,
    ) -> Result<MakeupHoursObligation> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .makeup_obligations
            .iter_mut()
            .find(|o| o.id == obligation_id)
            .ok_or(ComplianceError::RecordNotFound(RecordRef::MakeupObligation(obligation_id)))?;

        let mut updated = slot.clone();
        change(&mut updated)?;
        *slot = updated.clone();
        Ok(updated)
    }
}
