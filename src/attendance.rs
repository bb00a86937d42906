use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::models::{AttendanceKind, AttendanceRecord, AttendanceStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub total_present: usize,
    pub total_absences: usize,
    pub total_tardies: usize,
    pub total_excused: usize,
    pub total_partial: usize,
    pub classroom_absences: usize,
    pub classroom_tardies: usize,
    pub clinical_absences: usize,
    pub clinical_tardies: usize,
    pub partial_hours_missed: f64,
}

/// First day inside the evaluation window, or `None` for the whole record.
/// A window reaching past the earliest representable date covers everything.
pub fn window_start(window_days: Option<i64>, today: NaiveDate) -> Option<NaiveDate> {
    let span = TimeDelta::try_days(window_days?.max(1))?;
    today.checked_sub_signed(span)
}

pub fn summarize(records: &[AttendanceRecord], since: Option<NaiveDate>) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();

    for record in records {
        if matches!(since, Some(cutoff) if record.date < cutoff) {
            continue;
        }

        match record.status {
            AttendanceStatus::Present => summary.total_present += 1,
            AttendanceStatus::Excused => summary.total_excused += 1,
            AttendanceStatus::Partial => {
                summary.total_partial += 1;
                summary.partial_hours_missed += record.partial_shortfall();
            }
            AttendanceStatus::Absent => {
                summary.total_absences += 1;
                match record.kind {
                    AttendanceKind::Classroom => summary.classroom_absences += 1,
                    AttendanceKind::Clinical => summary.clinical_absences += 1,
                }
            }
            AttendanceStatus::Tardy => {
                summary.total_tardies += 1;
                match record.kind {
                    AttendanceKind::Classroom => summary.classroom_tardies += 1,
                    AttendanceKind::Clinical => summary.clinical_tardies += 1,
                }
            }
        }
    }

    summary
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use uuid::Uuid;

    pub(crate) fn sample_attendance(
        date: NaiveDate,
        kind: AttendanceKind,
        status: AttendanceStatus,
    ) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            date,
            kind,
            status,
            hours_attended: None,
            hours_required: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn counts_split_by_attendance_type() {
        let records = vec![
            sample_attendance(day(2), AttendanceKind::Classroom, AttendanceStatus::Absent),
            sample_attendance(day(3), AttendanceKind::Clinical, AttendanceStatus::Absent),
            sample_attendance(day(4), AttendanceKind::Clinical, AttendanceStatus::Tardy),
            sample_attendance(day(5), AttendanceKind::Classroom, AttendanceStatus::Present),
            sample_attendance(day(6), AttendanceKind::Classroom, AttendanceStatus::Excused),
        ];
        let summary = summarize(&records, None);
        assert_eq!(summary.total_absences, 2);
        assert_eq!(summary.classroom_absences, 1);
        assert_eq!(summary.clinical_absences, 1);
        assert_eq!(summary.clinical_tardies, 1);
        assert_eq!(summary.total_present, 1);
        assert_eq!(summary.total_excused, 1);
    }

    #[test]
    fn partial_days_accumulate_missed_hours() {
        let mut partial =
            sample_attendance(day(9), AttendanceKind::Clinical, AttendanceStatus::Partial);
        partial.hours_attended = Some(5.0);
        partial.hours_required = Some(8.0);
        let summary = summarize(&[partial], None);
        assert_eq!(summary.total_partial, 1);
        assert_eq!(summary.partial_hours_missed, 3.0);
    }

    #[test]
    fn window_excludes_older_records() {
        let records = vec![
            sample_attendance(day(1), AttendanceKind::Classroom, AttendanceStatus::Absent),
            sample_attendance(day(20), AttendanceKind::Classroom, AttendanceStatus::Absent),
        ];
        let since = window_start(Some(14), day(30));
        assert_eq!(since, Some(day(16)));
        assert_eq!(summarize(&records, since).total_absences, 1);
        assert_eq!(window_start(None, day(30)), None);
    }

    #[test]
    fn oversized_window_covers_whole_record() {
        let records = vec![sample_attendance(
            day(1),
            AttendanceKind::Clinical,
            AttendanceStatus::Absent,
        )];
        assert_eq!(window_start(Some(i64::MAX / 1000), day(30)), None);
        assert_eq!(window_start(Some(5_000_000_000), day(30)), None);
        let since = window_start(Some(i64::MAX / 1000), day(30));
        assert_eq!(summarize(&records, since).clinical_absences, 1);
    }
}
