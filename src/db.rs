use std::collections::{HashMap, HashSet};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{ComplianceError, Result};
use crate::intake::AcceptedBatch;
use crate::makeup;
use crate::models::{
    AttendanceRecord, ClinicalLogEntry, HourSubmission, MakeupHoursObligation, PendingReview,
    RecordRef, ReviewTarget, Student, StudentRecords, VrCompletion, VrScenario,
};
use crate::store::{CompletedHours, MakeupChange, RecordStore};
use crate::workflow::{ReviewCommand, ReviewDecision, ReviewReceipt};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("6f1c9a52-7d3e-4b8a-a1f4-2c5e8d9b0a13")?,
            "Marisol",
            "Quintero",
            "PN-2026",
            "Active",
            None,
        ),
        (
            Uuid::parse_str("b42e7f08-3a9c-4d61-8e25-9f0d1c7a6b54")?,
            "Tobias",
            "Okonkwo",
            "PN-2026",
            "At Risk",
            None,
        ),
        (
            Uuid::parse_str("e8d3a1c7-5b20-4f9e-b6a8-0c4f2e9d7a31")?,
            "Hana",
            "Whitfield",
            "PN-2025",
            "Active",
            Some(450.0),
        ),
    ];

    for (id, first_name, last_name, cohort, status, hours_required) in students.iter() {
        sqlx::query(
            r#"
            INSERT INTO clinical_compliance.students
            (id, first_name, last_name, cohort, status, clinical_hours_required)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name,
                cohort = EXCLUDED.cohort, status = EXCLUDED.status,
                clinical_hours_required = EXCLUDED.clinical_hours_required
            "#,
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(cohort)
        .bind(status)
        .bind(hours_required)
        .execute(pool)
        .await?;
    }

    let scenario_id = Uuid::parse_str("8a4c2e1b-6f3d-4b7a-9c5e-1d2f3a4b5c6d")?;
    sqlx::query(
        r#"
        INSERT INTO clinical_compliance.vr_scenarios (id, name, category, is_required, default_hours)
        VALUES ($1, 'Chest Pain Triage', 'cardiac', TRUE, 2.0)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(scenario_id)
    .execute(pool)
    .await?;

    let logs = vec![
        (
            "4b1f0e2a-1c3d-4e5f-8a9b-0c1d2e3f4a5b",
            students[0].0,
            "Riverside Medical Center",
            Some(8.0),
            Some(false),
            "approved",
            NaiveDate::from_ymd_opt(2026, 2, 2).context("invalid date")?,
        ),
        (
            "5c2a1f3b-2d4e-4f6a-9b0c-1d2e3f4a5b6c",
            students[0].0,
            "North Campus Sim Center",
            Some(6.0),
            Some(true),
            "approved",
            NaiveDate::from_ymd_opt(2026, 2, 4).context("invalid date")?,
        ),
        (
            "6d3b2a4c-3e5f-4a7b-8c1d-2e3f4a5b6c7d",
            students[1].0,
            "Skills Lab",
            None,
            None,
            "pending",
            NaiveDate::from_ymd_opt(2026, 2, 5).context("invalid date")?,
        ),
    ];

    for (id, student_id, site, hours, is_simulation, status, log_date) in logs {
        sqlx::query(
            r#"
            INSERT INTO clinical_compliance.clinical_logs
            (id, student_id, log_date, site_name, hours, is_simulation, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(student_id)
        .bind(log_date)
        .bind(site)
        .bind(hours)
        .bind(is_simulation)
        .bind(status)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO clinical_compliance.hour_submissions
        (id, student_id, submission_date, site_name, start_time, end_time, hours, activities)
        VALUES ($1, $2, $3, 'Riverside Medical Center', $4, $5, 8.0, 'Medication pass, head-to-toe assessments')
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("7e4c3b5d-4f6a-4b8c-9d2e-3f4a5b6c7d8e")?)
    .bind(students[2].0)
    .bind(NaiveDate::from_ymd_opt(2026, 2, 6).context("invalid date")?)
    .bind(NaiveTime::from_hms_opt(7, 0, 0).context("invalid time")?)
    .bind(NaiveTime::from_hms_opt(15, 0, 0).context("invalid time")?)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO clinical_compliance.makeup_hours
        (id, student_id, hours_owed, hours_completed, reason, due_date, status)
        VALUES ($1, $2, 8.0, 2.0, 'Missed clinical rotation', $3, 'in_progress')
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("9f5d4c6e-5a7b-4c9d-8e3f-4a5b6c7d8e9f")?)
    .bind(students[1].0)
    .bind(NaiveDate::from_ymd_opt(2026, 3, 6).context("invalid date")?)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn known_student_ids(pool: &PgPool) -> Result<HashSet<Uuid>> {
    let rows = sqlx::query("SELECT id FROM clinical_compliance.students")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<Uuid, _>("id").map_err(ComplianceError::from))
        .collect()
}

/// Known VR scenarios and their default hours, for intake validation.
pub async fn vr_scenario_defaults(pool: &PgPool) -> Result<HashMap<Uuid, Option<f64>>> {
    let rows = sqlx::query("SELECT id, default_hours FROM clinical_compliance.vr_scenarios")
        .fetch_all(pool)
        .await?;
    let mut defaults = HashMap::with_capacity(rows.len());
    for row in rows {
        defaults.insert(row.try_get("id")?, row.try_get("default_hours")?);
    }
    Ok(defaults)
}

/// Insert every accepted record in one transaction.
pub async fn ingest(pool: &PgPool, batch: &AcceptedBatch) -> Result<usize> {
    let mut tx = pool.begin().await?;

    for log in &batch.clinical_logs {
        sqlx::query(
            r#"
            INSERT INTO clinical_compliance.clinical_logs
            (id, student_id, log_date, site_name, patient_diagnosis, hours, is_simulation, is_makeup, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(log.id)
        .bind(log.student_id)
        .bind(log.date)
        .bind(&log.site_name)
        .bind(&log.patient_diagnosis)
        .bind(log.hours)
        .bind(log.is_simulation)
        .bind(log.is_makeup)
        .bind(log.status.as_str())
        .execute(&mut *tx)
        .await?;
    }

    for submission in &batch.hour_submissions {
        sqlx::query(
            r#"
            INSERT INTO clinical_compliance.hour_submissions
            (id, student_id, submission_date, site_name, start_time, end_time, hours,
             activities, reflection, status, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(submission.id)
        .bind(submission.student_id)
        .bind(submission.date)
        .bind(&submission.site_name)
        .bind(submission.start_time)
        .bind(submission.end_time)
        .bind(submission.hours)
        .bind(&submission.activities)
        .bind(&submission.reflection)
        .bind(submission.status.as_str())
        .bind(submission.submitted_at)
        .execute(&mut *tx)
        .await?;
    }

    for completion in &batch.vr_completions {
        sqlx::query(
            r#"
            INSERT INTO clinical_compliance.vr_completions
            (id, student_id, scenario_id, completion_date, hours, score)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(completion.id)
        .bind(completion.student_id)
        .bind(completion.scenario_id)
        .bind(completion.completion_date)
        .bind(completion.hours)
        .bind(completion.score)
        .execute(&mut *tx)
        .await?;
    }

    for record in &batch.attendance {
        sqlx::query(
            r#"
            INSERT INTO clinical_compliance.attendance
            (id, student_id, attendance_date, attendance_type, status, hours_attended, hours_required)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.student_id)
        .bind(record.date)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(record.hours_attended)
        .bind(record.hours_required)
        .execute(&mut *tx)
        .await?;
    }

    for obligation in &batch.makeup_obligations {
        insert_makeup(&mut tx, obligation).await?;
    }

    tx.commit().await?;
    Ok(batch.accepted_count())
}

pub async fn insert_makeup(
    conn: &mut PgConnection,
    obligation: &MakeupHoursObligation,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO clinical_compliance.makeup_hours
        (id, student_id, original_absence_id, hours_owed, hours_completed, reason,
         due_date, completion_date, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(obligation.id)
    .bind(obligation.student_id)
    .bind(obligation.original_absence_id)
    .bind(obligation.hours_owed)
    .bind(obligation.hours_completed)
    .bind(&obligation.reason)
    .bind(obligation.due_date)
    .bind(obligation.completion_date)
    .bind(obligation.status.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn student_from_row(row: &PgRow) -> Result<Student> {
    Ok(Student {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        cohort: row.try_get("cohort")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        clinical_hours_required: row.try_get("clinical_hours_required")?,
        clinical_hours_completed: row.try_get("clinical_hours_completed")?,
    })
}

fn clinical_log_from_row(row: &PgRow) -> Result<ClinicalLogEntry> {
    Ok(ClinicalLogEntry {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        date: row.try_get("log_date")?,
        site_name: row.try_get("site_name")?,
        patient_diagnosis: row.try_get("patient_diagnosis")?,
        hours: row.try_get("hours")?,
        is_simulation: row.try_get("is_simulation")?,
        is_makeup: row.try_get("is_makeup")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        instructor_feedback: row.try_get("instructor_feedback")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

fn submission_from_row(row: &PgRow) -> Result<HourSubmission> {
    Ok(HourSubmission {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        date: row.try_get("submission_date")?,
        site_name: row.try_get("site_name")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        hours: row.try_get("hours")?,
        activities: row.try_get("activities")?,
        reflection: row.try_get("reflection")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        reviewer_feedback: row.try_get("reviewer_feedback")?,
        reviewed_by: row.try_get("reviewed_by")?,
        submitted_at: row.try_get("submitted_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

fn makeup_from_row(row: &PgRow) -> Result<MakeupHoursObligation> {
    Ok(MakeupHoursObligation {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        original_absence_id: row.try_get("original_absence_id")?,
        hours_owed: row.try_get("hours_owed")?,
        hours_completed: row.try_get("hours_completed")?,
        reason: row.try_get("reason")?,
        due_date: row.try_get("due_date")?,
        completion_date: row.try_get("completion_date")?,
        status: row.try_get::<String, _>("status")?.parse()?,
    })
}

async fn load_records(conn: &mut PgConnection, student_id: Uuid) -> Result<StudentRecords> {
    let clinical_logs = sqlx::query(
        "SELECT * FROM clinical_compliance.clinical_logs WHERE student_id = $1 ORDER BY log_date",
    )
    .bind(student_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(clinical_log_from_row)
    .collect::<Result<Vec<_>>>()?;

    let mut vr_completions = Vec::new();
    for row in sqlx::query("SELECT * FROM clinical_compliance.vr_completions WHERE student_id = $1")
        .bind(student_id)
        .fetch_all(&mut *conn)
        .await?
    {
        vr_completions.push(VrCompletion {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            scenario_id: row.try_get("scenario_id")?,
            completion_date: row.try_get("completion_date")?,
            hours: row.try_get("hours")?,
            score: row.try_get("score")?,
        });
    }

    let mut vr_scenarios = Vec::new();
    for row in sqlx::query("SELECT * FROM clinical_compliance.vr_scenarios ORDER BY name")
        .fetch_all(&mut *conn)
        .await?
    {
        vr_scenarios.push(VrScenario {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            is_required: row.try_get("is_required")?,
            default_hours: row.try_get("default_hours")?,
        });
    }

    let hour_submissions = sqlx::query(
        "SELECT * FROM clinical_compliance.hour_submissions WHERE student_id = $1 ORDER BY submitted_at",
    )
    .bind(student_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(submission_from_row)
    .collect::<Result<Vec<_>>>()?;

    let makeup_obligations = sqlx::query(
        "SELECT * FROM clinical_compliance.makeup_hours WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(makeup_from_row)
    .collect::<Result<Vec<_>>>()?;

    let mut attendance = Vec::new();
    for row in sqlx::query(
        "SELECT * FROM clinical_compliance.attendance WHERE student_id = $1 ORDER BY attendance_date",
    )
    .bind(student_id)
    .fetch_all(&mut *conn)
    .await?
    {
        attendance.push(AttendanceRecord {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            date: row.try_get("attendance_date")?,
            kind: row.try_get::<String, _>("attendance_type")?.parse()?,
            status: row.try_get::<String, _>("status")?.parse()?,
            hours_attended: row.try_get("hours_attended")?,
            hours_required: row.try_get("hours_required")?,
        });
    }

    Ok(StudentRecords {
        clinical_logs,
        vr_completions,
        vr_scenarios,
        hour_submissions,
        makeup_obligations,
        attendance,
    })
}

/// Postgres-backed record store. Review transitions and make-up updates lock
/// the affected rows with `SELECT ... FOR UPDATE` inside one transaction.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn fetch_student(&self, student_id: Uuid) -> Result<Option<Student>> {
        sqlx::query("SELECT * FROM clinical_compliance.students WHERE id = $1")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(student_from_row)
            .transpose()
    }

    async fn fetch_records(&self, student_id: Uuid) -> Result<StudentRecords> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;
        let records = load_records(&mut tx, student_id).await?;
        tx.commit().await?;
        Ok(records)
    }

    async fn cohort_student_ids(&self, cohort: &str) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT id FROM clinical_compliance.students WHERE cohort = $1 ORDER BY id",
        )
        .bind(cohort)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("id").map_err(ComplianceError::from))
            .collect()
    }

    async fn pending_reviews(&self) -> Result<Vec<PendingReview>> {
        let rows = sqlx::query(
            r#"
            SELECT 'clinical_log' AS kind, l.id, l.student_id, s.first_name || ' ' || s.last_name AS student_name,
                   l.log_date AS review_date, l.site_name, l.hours
            FROM clinical_compliance.clinical_logs l
            JOIN clinical_compliance.students s ON s.id = l.student_id
            WHERE l.status = 'pending'
            UNION ALL
            SELECT 'hour_submission' AS kind, h.id, h.student_id, s.first_name || ' ' || s.last_name,
                   h.submission_date, h.site_name, h.hours
            FROM clinical_compliance.hour_submissions h
            JOIN clinical_compliance.students s ON s.id = h.student_id
            WHERE h.status = 'pending'
            ORDER BY review_date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut pending = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            let kind: String = row.try_get("kind")?;
            let target = match kind.as_str() {
                "clinical_log" => ReviewTarget::ClinicalLog(id),
                _ => ReviewTarget::HourSubmission(id),
            };
            pending.push(PendingReview {
                target,
                student_id: row.try_get("student_id")?,
                student_name: row.try_get("student_name")?,
                date: row.try_get("review_date")?,
                site_name: row.try_get("site_name")?,
                hours: row.try_get("hours")?,
            });
        }
        Ok(pending)
    }

    async fn apply_review(
        &self,
        command: &ReviewCommand,
        recompute: &CompletedHours,
    ) -> Result<ReviewReceipt> {
        let (table, id) = match command.target {
            ReviewTarget::ClinicalLog(id) => ("clinical_logs", id),
            ReviewTarget::HourSubmission(id) => ("hour_submissions", id),
        };

        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT student_id, status FROM clinical_compliance.{table} WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ComplianceError::RecordNotFound(command.target.record_ref()))?;

        let student_id: Uuid = row.try_get("student_id")?;
        let current = row.try_get::<String, _>("status")?.parse()?;
        let next = command.next_status(current)?;

        sqlx::query("SELECT id FROM clinical_compliance.students WHERE id = $1 FOR UPDATE")
            .bind(student_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ComplianceError::UnknownStudent(student_id))?;

        match command.target {
            ReviewTarget::ClinicalLog(_) => {
                sqlx::query(
                    r#"
                    UPDATE clinical_compliance.clinical_logs
                    SET status = $1, instructor_feedback = $2, reviewed_at = $3
                    WHERE id = $4
                    "#,
                )
                .bind(next.as_str())
                .bind(&command.feedback)
                .bind(command.reviewed_at)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            ReviewTarget::HourSubmission(_) => {
                sqlx::query(
                    r#"
                    UPDATE clinical_compliance.hour_submissions
                    SET status = $1, reviewer_feedback = $2, reviewed_by = $3, reviewed_at = $4
                    WHERE id = $5
                    "#,
                )
                .bind(next.as_str())
                .bind(&command.feedback)
                .bind(&command.reviewed_by)
                .bind(command.reviewed_at)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
        }

        let clinical_hours_completed = match command.decision {
            ReviewDecision::Approve => {
                let records = load_records(&mut tx, student_id).await?;
                let completed = recompute(student_id, &records);
                sqlx::query(
                    "UPDATE clinical_compliance.students SET clinical_hours_completed = $1 WHERE id = $2",
                )
                .bind(completed)
                .bind(student_id)
                .execute(&mut *tx)
                .await?;
                Some(completed)
            }
            ReviewDecision::Reject => None,
        };

        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT * FROM clinical_compliance.makeup_hours WHERE id = $1 FOR UPDATE",
        )
        .bind(obligation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ComplianceError::RecordNotFound(RecordRef::MakeupObligation(obligation_id)))?;

        let mut obligation = makeup_from_row(&row)?;
        change(&mut obligation)?;

        sqlx::query(
            r#"
            UPDATE clinical_compliance.makeup_hours
            SET hours_completed = $1, status = $2, completion_date = $3
            WHERE id = $4
            "#,
        )
        .bind(obligation.hours_completed)
        .bind(obligation.status.as_str())
        .bind(obligation.completion_date)
        .bind(obligation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(obligation)
    }
}

/// Create make-up obligations for clinical absences and partial days that do not have one yet.
pub async fn sync_makeup_from_attendance(pool: &PgPool, config: &EngineConfig) -> Result<usize> {
    let rows = sqlx::query(
        r#"
        SELECT a.* FROM clinical_compliance.attendance a
        LEFT JOIN clinical_compliance.makeup_hours m ON m.original_absence_id = a.id
        WHERE m.id IS NULL AND a.attendance_type = 'clinical' AND a.status IN ('Absent', 'Partial')
        "#,
    )
    .fetch_all(pool)
    .await?;

    let today = Utc::now().date_naive();
    let mut tx = pool.begin().await?;
    let mut created = 0usize;

    for row in rows {
        let record = AttendanceRecord {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            date: row.try_get("attendance_date")?,
            kind: row.try_get::<String, _>("attendance_type")?.parse()?,
            status: row.try_get::<String, _>("status")?.parse()?,
            hours_attended: row.try_get("hours_attended")?,
            hours_required: row.try_get("hours_required")?,
        };
        if let Some(obligation) = makeup::obligation_from_attendance(&record, config, today) {
            insert_makeup(&mut tx, &obligation).await?;
            created += 1;
        }
    }

    tx.commit().await?;
    Ok(created)
}
