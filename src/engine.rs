//! The engine façade: the operations UI and export collaborators call.
//!
//! Each call fetches a fresh snapshot from the store and recomputes everything
//! from it; nothing derived is cached between calls.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::attendance::{self, AttendanceSummary};
use crate::compliance::{self, ComplianceSummary};
use crate::config::EngineConfig;
use crate::error::{ComplianceError, Result};
use crate::flags::{self, Flag, FlagInputs};
use crate::ledger;
use crate::makeup::{self, MakeupReconciliation};
use crate::models::{PendingReview, ReviewTarget, Student, StudentRecords};
use crate::store::RecordStore;
use crate::vr::{self, VrSummary};
use crate::workflow::{ApprovalWorkflow, ReviewReceipt};

/// Run the full recompute pipeline over one snapshot:
/// ledger, then evaluator and reconciler, then flags.
pub fn build_summary(
    student: &Student,
    records: &StudentRecords,
    config: &EngineConfig,
    today: NaiveDate,
) -> ComplianceSummary {
    let ledger = ledger::aggregate(student.id, records, config);
    let mut summary = compliance::evaluate(student, &ledger, config);
    let makeup = makeup::reconcile(student.id, &records.makeup_obligations);
    let attendance = attendance::summarize(
        &records.attendance,
        attendance::window_start(config.attendance_window_days, today),
    );

    summary.flags = flags::assess(
        &FlagInputs {
            summary: &summary,
            makeup: &makeup,
            attendance: &attendance,
            status: student.status,
        },
        config,
    );
    summary
}

async fn load_student<S: RecordStore>(
    store: &S,
    student_id: Uuid,
) -> Result<(Student, StudentRecords)> {
    let student = store
        .fetch_student(student_id)
        .await?
        .ok_or(ComplianceError::UnknownStudent(student_id))?;
    let records = store.fetch_records(student_id).await?;
    Ok((student, records))
}

async fn summarize_student<S: RecordStore>(
    store: &S,
    config: &EngineConfig,
    student_id: Uuid,
) -> Result<ComplianceSummary> {
    let (student, records) = load_student(store, student_id).await?;
    Ok(build_summary(&student, &records, config, Utc::now().date_naive()))
}

pub type CohortResults = BTreeMap<Uuid, Result<ComplianceSummary>>;

/// An in-flight cohort aggregation: one task per student, each cancellable on its own.
pub struct CohortRun {
    tasks: Vec<(Uuid, JoinHandle<Result<ComplianceSummary>>)>,
}

impl CohortRun {
    pub fn student_ids(&self) -> Vec<Uuid> {
        self.tasks.iter().map(|(id, _)| *id).collect()
    }

    /// Abort one student's aggregation. Returns false for an unknown id.
    /// Aggregation writes nothing shared, so an abort leaves no partial state.
    pub fn cancel(&self, student_id: Uuid) -> bool {
        match self.tasks.iter().find(|(id, _)| *id == student_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn join(self) -> CohortResults {
        let mut results = BTreeMap::new();

        for (student_id, handle) in self.tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(ComplianceError::Cancelled(student_id)),
                Err(e) => Err(ComplianceError::TaskFailed {
                    student: student_id,
                    reason: e.to_string(),
                }),
            };
            if let Err(e) = &outcome {
                warn!(%student_id, "cohort member failed: {e}");
            }
            results.insert(student_id, outcome);
        }

        results
    }
}

pub struct ComplianceEngine<S: RecordStore> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
    workflow: ApprovalWorkflow<S>,
}

impl<S: RecordStore> ComplianceEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let workflow = ApprovalWorkflow::new(Arc::clone(&store), Arc::clone(&config));
        Ok(Self {
            store,
            config,
            workflow,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn workflow(&self) -> &ApprovalWorkflow<S> {
        &self.workflow
    }

    pub async fn student(&self, student_id: Uuid) -> Result<Student> {
        self.store
            .fetch_student(student_id)
            .await?
            .ok_or(ComplianceError::UnknownStudent(student_id))
    }

    pub async fn compute_compliance_summary(&self, student_id: Uuid) -> Result<ComplianceSummary> {
        summarize_student(self.store.as_ref(), &self.config, student_id).await
    }

    pub async fn compute_flags(&self, student_id: Uuid) -> Result<Vec<Flag>> {
        Ok(self.compute_compliance_summary(student_id).await?.flags)
    }

    pub async fn reconcile_makeup_hours(&self, student_id: Uuid) -> Result<MakeupReconciliation> {
        let (_, records) = load_student(self.store.as_ref(), student_id).await?;
        Ok(makeup::reconcile(student_id, &records.makeup_obligations))
    }

    pub async fn attendance_summary(&self, student_id: Uuid) -> Result<AttendanceSummary> {
        let (_, records) = load_student(self.store.as_ref(), student_id).await?;
        let since = attendance::window_start(
            self.config.attendance_window_days,
            Utc::now().date_naive(),
        );
        Ok(attendance::summarize(&records.attendance, since))
    }

    pub async fn vr_summary(&self, student_id: Uuid) -> Result<VrSummary> {
        let (_, records) = load_student(self.store.as_ref(), student_id).await?;
        Ok(vr::summarize(
            student_id,
            &records.vr_completions,
            &records.vr_scenarios,
            self.config.sim_cap_hours,
        ))
    }

    pub async fn pending_reviews(&self) -> Result<Vec<PendingReview>> {
        self.store.pending_reviews().await
    }

    pub async fn approve(
        &self,
        target: ReviewTarget,
        feedback: Option<&str>,
    ) -> Result<ReviewReceipt> {
        self.workflow.approve(target, feedback, None).await
    }

    pub async fn reject(&self, target: ReviewTarget, feedback: &str) -> Result<ReviewReceipt> {
        self.workflow.reject(target, feedback, None).await
    }

    /// Start one independent task per student. Duplicate ids are aggregated once.
    pub fn spawn_cohort(&self, student_ids: &[Uuid]) -> CohortRun {
        let unique: BTreeSet<Uuid> = student_ids.iter().copied().collect();
        let tasks = unique
            .into_iter()
            .map(|student_id| {
                let store = Arc::clone(&self.store);
                let config = Arc::clone(&self.config);
                let handle = tokio::spawn(async move {
                    summarize_student(store.as_ref(), &config, student_id).await
                });
                (student_id, handle)
            })
            .collect();
        CohortRun { tasks }
    }

    pub async fn aggregate_cohort(&self, student_ids: &[Uuid]) -> CohortResults {
        let results = self.spawn_cohort(student_ids).join().await;
        let failed = results.values().filter(|r| r.is_err()).count();
        info!(students = results.len(), failed, "cohort aggregation finished");
        results
    }
}
