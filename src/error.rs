use thiserror::Error;
use uuid::Uuid;

use crate::models::{RecordRef, ReviewStatus};

/// Every failure the compliance engine reports to its callers.
#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("invalid record: {field} {reason}")]
    InvalidRecord { field: &'static str, reason: String },

    #[error("{record} cannot move from {from} to {to}")]
    InvalidStateTransition {
        record: RecordRef,
        from: String,
        to: String,
    },

    #[error("rejection requires reviewer feedback")]
    MissingFeedback,

    #[error("unknown student: {0}")]
    UnknownStudent(Uuid),

    #[error("threshold misconfiguration: {0}")]
    ThresholdMisconfiguration(String),

    #[error("record not found: {0}")]
    RecordNotFound(RecordRef),

    #[error("aggregation cancelled for student {0}")]
    Cancelled(Uuid),

    #[error("aggregation failed for student {student}: {reason}")]
    TaskFailed { student: Uuid, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ComplianceError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ComplianceError::InvalidRecord {
            field,
            reason: reason.into(),
        }
    }

    pub fn review_transition(record: RecordRef, from: ReviewStatus, to: ReviewStatus) -> Self {
        ComplianceError::InvalidStateTransition {
            record,
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ComplianceError>;
