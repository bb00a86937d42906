//! The persistence collaborator seam.
//!
//! The engine never owns storage. A store hands out snapshots of a student's
//! records and performs the two writes the workflow needs (review transitions
//! and make-up updates) as single atomic units.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{MakeupHoursObligation, PendingReview, Student, StudentRecords};
use crate::workflow::{ReviewCommand, ReviewReceipt};

mod memory;

pub use memory::MemoryStore;

/// Recomputes a student's approved-hours total from a snapshot of their records.
pub type CompletedHours = dyn Fn(Uuid, &StudentRecords) -> f64 + Send + Sync;

/// Mutates one make-up obligation in place, or refuses the change.
pub type MakeupChange = dyn Fn(&mut MakeupHoursObligation) -> Result<()> + Send + Sync;

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn fetch_student(&self, student_id: Uuid) -> Result<Option<Student>>;

    /// Every record stream for one student, read as one consistent snapshot.
    async fn fetch_records(&self, student_id: Uuid) -> Result<StudentRecords>;

    async fn cohort_student_ids(&self, cohort: &str) -> Result<Vec<Uuid>>;

    async fn pending_reviews(&self) -> Result<Vec<PendingReview>>;

    /// Compare-and-set on the record's review status. On approval the owning
    /// student's cached `clinical_hours_completed` is recomputed with `recompute`
    /// and written in the same atomic unit; on any error nothing is written.
    async fn apply_review(
        &self,
        command: &ReviewCommand,
        recompute: &CompletedHours,
    ) -> Result<ReviewReceipt>;

    /// Read-modify-write of one obligation under the store's lock.
    async fn update_makeup(
        &self,
        obligation_id: Uuid,
        change: &MakeupChange,
    ) -> Result<MakeupHoursObligation>;
}
