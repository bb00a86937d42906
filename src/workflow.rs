//! Approval workflow for clinical logs, hour submissions and make-up obligations.
//!
//! Reviewable records move `pending -> approved` or `pending -> rejected` and
//! never leave a terminal state; a resubmission is a new record. This module is
//! the only writer of `Student::clinical_hours_completed`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{ComplianceError, Result};
use crate::ledger;
use crate::models::{
    MakeupHoursObligation, MakeupStatus, RecordRef, ReviewStatus, ReviewTarget, StudentRecords,
};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target_status(&self) -> ReviewStatus {
        match self {
            ReviewDecision::Approve => ReviewStatus::Approved,
            ReviewDecision::Reject => ReviewStatus::Rejected,
        }
    }
}

/// A validated reviewer action, ready to be applied by a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCommand {
    pub target: ReviewTarget,
    pub decision: ReviewDecision,
    pub feedback: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

fn normalize_feedback(feedback: Option<&str>) -> Option<String> {
    feedback
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

impl ReviewCommand {
    pub fn approve(
        target: ReviewTarget,
        feedback: Option<&str>,
        reviewed_by: Option<&str>,
    ) -> Self {
        Self {
            target,
            decision: ReviewDecision::Approve,
            feedback: normalize_feedback(feedback),
            reviewed_by: reviewed_by.map(str::to_string),
            reviewed_at: Utc::now(),
        }
    }

    /// Rejection must explain itself; blank feedback is refused up front.
    pub fn reject(target: ReviewTarget, feedback: &str, reviewed_by: Option<&str>) -> Result<Self> {
        let feedback = normalize_feedback(Some(feedback)).ok_or(ComplianceError::MissingFeedback)?;
        Ok(Self {
            target,
            decision: ReviewDecision::Reject,
            feedback: Some(feedback),
            reviewed_by: reviewed_by.map(str::to_string),
            reviewed_at: Utc::now(),
        })
    }

    /// The status to write, given what the store currently holds.
    pub fn next_status(&self, current: ReviewStatus) -> Result<ReviewStatus> {
        let next = self.decision.target_status();
        if current != ReviewStatus::Pending {
            return Err(ComplianceError::review_transition(
                self.target.record_ref(),
                current,
                next,
            ));
        }
        if self.decision == ReviewDecision::Reject && self.feedback.is_none() {
            return Err(ComplianceError::MissingFeedback);
        }
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReceipt {
    pub target: ReviewTarget,
    pub student_id: Uuid,
    pub status: ReviewStatus,
    /// The freshly cached total, present only after an approval.
    pub clinical_hours_completed: Option<f64>,
}

/// Total approved hours for the student's cache, using the same ledger as every summary.
pub fn completed_hours(config: &EngineConfig, student_id: Uuid, records: &StudentRecords) -> f64 {
    ledger::aggregate(student_id, records, config).total_hours
}

/// Add completed make-up hours. Progress is clamped to what is owed and moves
/// the obligation to `in_progress`; completion is a separate step.
pub fn apply_makeup_hours(obligation: &mut MakeupHoursObligation, hours: f64) -> Result<()> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(ComplianceError::invalid(
            "hours",
            format!("must be positive, got {hours}"),
        ));
    }
    if obligation.status == MakeupStatus::Completed {
        return Err(ComplianceError::InvalidStateTransition {
            record: RecordRef::MakeupObligation(obligation.id),
            from: MakeupStatus::Completed.as_str().to_string(),
            to: MakeupStatus::InProgress.as_str().to_string(),
        });
    }

    obligation.hours_completed = (obligation.hours_completed + hours).min(obligation.hours_owed);
    obligation.status = MakeupStatus::InProgress;
    Ok(())
}

/// Mark an obligation completed. Only allowed once nothing is owed.
pub fn mark_makeup_completed(
    obligation: &mut MakeupHoursObligation,
    today: NaiveDate,
) -> Result<()> {
    if obligation.status == MakeupStatus::Completed
        || obligation.hours_completed < obligation.hours_owed
    {
        return Err(ComplianceError::InvalidStateTransition {
            record: RecordRef::MakeupObligation(obligation.id),
            from: obligation.status.as_str().to_string(),
            to: MakeupStatus::Completed.as_str().to_string(),
        });
    }

    obligation.status = MakeupStatus::Completed;
    obligation.completion_date = Some(today);
    Ok(())
}

pub struct ApprovalWorkflow<S: RecordStore> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
}

impl<S: RecordStore> Clone for ApprovalWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: RecordStore> ApprovalWorkflow<S> {
    pub fn new(store: Arc<S>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    async fn apply(&self, command: ReviewCommand) -> Result<ReviewReceipt> {
        let config = Arc::clone(&self.config);
        let recompute = move |student_id: Uuid, records: &StudentRecords| {
            completed_hours(&config, student_id, records)
        };
        let receipt = self.store.apply_review(&command, &recompute).await?;

        info!(
            record = %command.target.record_ref(),
            student_id = %receipt.student_id,
            status = %receipt.status,
            completed = ?receipt.clinical_hours_completed,
            "review applied"
        );
        Ok(receipt)
    }

    pub async fn approve(
        &self,
        target: ReviewTarget,
        feedback: Option<&str>,
        reviewed_by: Option<&str>,
    ) -> Result<ReviewReceipt> {
        self.apply(ReviewCommand::approve(target, feedback, reviewed_by)).await
    }

    pub async fn reject(
        &self,
        target: ReviewTarget,
        feedback: &str,
        reviewed_by: Option<&str>,
    ) -> Result<ReviewReceipt> {
        self.apply(ReviewCommand::reject(target, feedback, reviewed_by)?).await
    }

    pub async fn record_makeup_hours(
        &self,
        obligation_id: Uuid,
        hours: f64,
    ) -> Result<MakeupHoursObligation> {
        let change =
            move |obligation: &mut MakeupHoursObligation| apply_makeup_hours(obligation, hours);
        let updated = self.store.update_makeup(obligation_id, &change).await?;
        info!(%obligation_id, hours, balance = updated.balance(), "make-up hours recorded");
        Ok(updated)
    }

    pub async fn complete_makeup(&self, obligation_id: Uuid) -> Result<MakeupHoursObligation> {
        let today = Utc::now().date_naive();
        let change = move |obligation: &mut MakeupHoursObligation| {
            mark_makeup_completed(obligation, today)
        };
        let updated = self.store.update_makeup(obligation_id, &change).await?;
        info!(%obligation_id, "make-up obligation completed");
        Ok(updated)
    }
}
