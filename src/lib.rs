//! Clinical hours compliance engine for nursing programs.
//!
//! Combines clinical logs, VR completions, hour submissions, make-up
//! obligations and attendance into a per-student compliance view, and
//! validates the review workflow that feeds records back into it.

pub mod attendance;
pub mod classify;
pub mod compliance;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod flags;
pub mod intake;
pub mod ledger;
pub mod makeup;
pub mod models;
pub mod report;
pub mod store;
pub mod vr;
pub mod workflow;

pub use compliance::ComplianceSummary;
pub use config::EngineConfig;
pub use engine::{CohortResults, CohortRun, ComplianceEngine};
pub use error::{ComplianceError, Result};
pub use flags::{Flag, FlagKind, Severity};
pub use makeup::MakeupReconciliation;
pub use store::{MemoryStore, RecordStore};
pub use workflow::{ApprovalWorkflow, ReviewReceipt};
