use std::cmp::Ordering;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::{
    AttendanceKind, AttendanceRecord, AttendanceStatus, MakeupHoursObligation, MakeupStatus,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MakeupReconciliation {
    pub student_id: Uuid,
    pub total_owed: f64,
    pub total_completed: f64,
    /// Never negative, even when some obligations were over-completed.
    pub balance: f64,
    /// Open obligations, earliest due date first, undated last.
    pub obligations: Vec<MakeupHoursObligation>,
}

fn by_due_date(a: &MakeupHoursObligation, b: &MakeupHoursObligation) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Report-only: obligation statuses are never changed here.
pub fn reconcile(student_id: Uuid, obligations: &[MakeupHoursObligation]) -> MakeupReconciliation {
    let mut total_owed = 0.0;
    let mut total_completed = 0.0;
    let mut open = Vec::new();

    for obligation in obligations.iter().filter(|o| o.student_id == student_id) {
        total_owed += obligation.hours_owed;
        total_completed += obligation.hours_completed;
        if obligation.status != MakeupStatus::Completed {
            open.push(obligation.clone());
        }
    }

    open.sort_by(by_due_date);

    MakeupReconciliation {
        student_id,
        total_owed,
        total_completed,
        balance: (total_owed - total_completed).max(0.0),
        obligations: open,
    }
}

/// A new obligation for hours missed on an absent or partial clinical day.
/// Classroom absences and full attendance owe nothing. An absence without
/// scheduled hours owes `clinical_absence_hours`.
pub fn obligation_from_attendance(
    record: &AttendanceRecord,
    config: &EngineConfig,
    today: NaiveDate,
) -> Option<MakeupHoursObligation> {
    if record.kind != AttendanceKind::Clinical {
        return None;
    }

    let (hours_owed, reason) = match record.status {
        AttendanceStatus::Absent => (
            record
                .hours_required
                .filter(|hours| hours.is_finite() && *hours > 0.0)
                .unwrap_or(config.clinical_absence_hours),
            format!("Clinical absence on {}", record.date),
        ),
        AttendanceStatus::Partial => (
            record.partial_shortfall(),
            format!("Partial clinical attendance on {}", record.date),
        ),
        _ => return None,
    };

    if hours_owed <= 0.0 {
        return None;
    }

    Some(MakeupHoursObligation {
        id: Uuid::new_v4(),
        student_id: record.student_id,
        original_absence_id: Some(record.id),
        hours_owed,
        hours_completed: 0.0,
        reason: Some(reason),
        due_date: TimeDelta::try_days(config.makeup_due_days)
            .and_then(|span| today.checked_add_signed(span)),
        completion_date: None,
        status: MakeupStatus::Pending,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn obligation(
        student_id: Uuid,
        owed: f64,
        completed: f64,
        status: MakeupStatus,
        due: Option<NaiveDate>,
    ) -> MakeupHoursObligation {
        MakeupHoursObligation {
            id: Uuid::new_v4(),
            student_id,
            original_absence_id: None,
            hours_owed: owed,
            hours_completed: completed,
            reason: Some("Missed clinical day".to_string()),
            due_date: due,
            completion_date: None,
            status,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    #[test]
    fn fully_completed_obligation_has_zero_balance() {
        let student = Uuid::new_v4();
        let records = [obligation(student, 10.0, 10.0, MakeupStatus::InProgress, None)];
        let report = reconcile(student, &records);
        assert_eq!(report.balance, 0.0);
        assert_eq!(report.obligations.len(), 1);
    }

    #[test]
    fn partial_progress_leaves_balance() {
        let student = Uuid::new_v4();
        let records = [obligation(student, 10.0, 6.0, MakeupStatus::InProgress, None)];
        let report = reconcile(student, &records);
        assert_eq!(report.balance, 4.0);
        assert_eq!(report.obligations[0].status, MakeupStatus::InProgress);
    }

    #[test]
    fn balance_never_goes_negative() {
        let student = Uuid::new_v4();
        let report = reconcile(
            student,
            &[obligation(student, 4.0, 9.0, MakeupStatus::Completed, Some(day(1)))],
        );
        assert_eq!(report.total_owed, 4.0);
        assert_eq!(report.total_completed, 9.0);
        assert_eq!(report.balance, 0.0);
        assert!(report.obligations.is_empty());
    }

    #[test]
    fn open_obligations_sorted_by_due_date_with_undated_last() {
        let student = Uuid::new_v4();
        let records = vec![
            obligation(student, 2.0, 0.0, MakeupStatus::Pending, None),
            obligation(student, 3.0, 0.0, MakeupStatus::Pending, Some(day(20))),
            obligation(student, 4.0, 0.0, MakeupStatus::Pending, Some(day(5))),
        ];
        let report = reconcile(student, &records);
        let dues: Vec<Option<NaiveDate>> = report.obligations.iter().map(|o| o.due_date).collect();
        assert_eq!(dues, vec![Some(day(5)), Some(day(20)), None]);
        assert_eq!(report.balance, 9.0);
    }

    #[test]
    fn clinical_absence_creates_obligation_due_later() {
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            date: day(2),
            kind: AttendanceKind::Clinical,
            status: AttendanceStatus::Absent,
            hours_attended: None,
            hours_required: Some(8.0),
        };
        let created =
            obligation_from_attendance(&record, &EngineConfig::default(), day(3)).unwrap();
        assert_eq!(created.hours_owed, 8.0);
        assert_eq!(created.original_absence_id, Some(record.id));
        assert_eq!(created.due_date, Some(day(3) + TimeDelta::days(30)));
        assert_eq!(created.status, MakeupStatus::Pending);
    }

    #[test]
    fn classroom_and_present_days_owe_nothing() {
        let mut record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            date: day(2),
            kind: AttendanceKind::Classroom,
            status: AttendanceStatus::Absent,
            hours_attended: None,
            hours_required: Some(3.0),
        };
        assert!(obligation_from_attendance(&record, &EngineConfig::default(), day(3)).is_none());
        record.kind = AttendanceKind::Clinical;
        record.status = AttendanceStatus::Present;
        assert!(obligation_from_attendance(&record, &EngineConfig::default(), day(3)).is_none());
    }

    #[test]
    fn clinical_absence_without_hours_owes_default() {
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            date: day(7),
            kind: AttendanceKind::Clinical,
            status: AttendanceStatus::Absent,
            hours_attended: None,
            hours_required: None,
        };
        let created =
            obligation_from_attendance(&record, &EngineConfig::default(), day(8)).unwrap();
        assert_eq!(created.hours_owed, 8.0);

        let config = EngineConfig {
            clinical_absence_hours: 12.0,
            ..EngineConfig::default()
        };
        let created = obligation_from_attendance(&record, &config, day(8)).unwrap();
        assert_eq!(created.hours_owed, 12.0);
    }

    #[test]
    fn unrepresentable_due_date_leaves_obligation_undated() {
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            date: day(7),
            kind: AttendanceKind::Clinical,
            status: AttendanceStatus::Absent,
            hours_attended: None,
            hours_required: Some(6.0),
        };
        let config = EngineConfig {
            makeup_due_days: i64::MAX / 1000,
            ..EngineConfig::default()
        };
        let created = obligation_from_attendance(&record, &config, day(8)).unwrap();
        assert_eq!(created.due_date, None);
        assert_eq!(created.hours_owed, 6.0);
    }

    #[test]
    fn reconciliation_is_repeatable() {
        let student = Uuid::new_v4();
        let records = vec![
            obligation(student, 5.0, 1.0, MakeupStatus::InProgress, Some(day(9))),
            obligation(student, 3.0, 0.0, MakeupStatus::Pending, None),
        ];
        assert_eq!(reconcile(student, &records), reconcile(student, &records));
    }
}
