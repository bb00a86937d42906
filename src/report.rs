use std::collections::BTreeMap;
use std::fmt::Write;

use uuid::Uuid;

use crate::compliance::ComplianceSummary;
use crate::engine::CohortResults;
use crate::flags::{self, FlagKind};
use crate::models::Student;

#[derive(Debug, Clone, PartialEq)]
pub struct FlagTypeSummary {
    pub kind: FlagKind,
    pub count: usize,
}

pub fn summarize_by_flag(summaries: &[&ComplianceSummary]) -> Vec<FlagTypeSummary> {
    let mut map: BTreeMap<&'static str, (FlagKind, usize)> = BTreeMap::new();

    for summary in summaries {
        for flag in summary.flags.iter() {
            let entry = map.entry(flag.kind.as_str()).or_insert((flag.kind, 0));
            entry.1 += 1;
        }
    }

    let mut counts: Vec<FlagTypeSummary> = map
        .into_values()
        .map(|(kind, count)| FlagTypeSummary { kind, count })
        .collect();

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Students with at least one flag, highest weighted risk first.
pub fn rank_by_risk<'a>(summaries: &[&'a ComplianceSummary]) -> Vec<(&'a ComplianceSummary, f64)> {
    let mut ranked: Vec<(&ComplianceSummary, f64)> = summaries
        .iter()
        .map(|summary| (*summary, flags::risk_score(&summary.flags)))
        .filter(|(_, score)| *score > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

fn student_label(students: &BTreeMap<Uuid, Student>, id: Uuid) -> String {
    students
        .get(&id)
        .map(Student::full_name)
        .unwrap_or_else(|| id.to_string())
}

/// Plain-text cohort digest for the terminal.
pub fn build_digest(
    cohort: &str,
    students: &BTreeMap<Uuid, Student>,
    results: &CohortResults,
    limit: usize,
) -> String {
    let summaries: Vec<&ComplianceSummary> =
        results.values().filter_map(|r| r.as_ref().ok()).collect();
    let flag_counts = summarize_by_flag(&summaries);
    let ranked = rank_by_risk(&summaries);

    let mut output = String::new();

    let _ = writeln!(output, "# Clinical Hours Compliance: {cohort}");
    let _ = writeln!(
        output,
        "{} students evaluated, {} hours compliant, {} over the simulation cap",
        summaries.len(),
        summaries.iter().filter(|s| s.is_hours_compliant).count(),
        summaries.iter().filter(|s| !s.is_sim_compliant).count()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Flag Mix");

    if flag_counts.is_empty() {
        let _ = writeln!(output, "No flags raised for this cohort.");
    } else {
        for entry in flag_counts.iter() {
            let _ = writeln!(output, "- {}: {} students", entry.kind.as_str(), entry.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Attention");

    if ranked.is_empty() {
        let _ = writeln!(output, "No students flagged.");
    } else {
        for (summary, score) in ranked.iter().take(limit) {
            let kinds: Vec<&str> = summary.flags.iter().map(|f| f.kind.as_str()).collect();
            let _ = writeln!(
                output,
                "- {} score {:.0}: {:.1}/{:.0}h ({:.1}% sim) [{}]",
                student_label(students, summary.student_id),
                score,
                summary.total_hours,
                summary.hours_required,
                summary.sim_cap_percentage,
                kinds.join(", ")
            );
        }
    }

    let failures: Vec<String> = results
        .iter()
        .filter_map(|(id, result)| {
            result
                .as_ref()
                .err()
                .map(|e| format!("- {}: {e}", student_label(students, *id)))
        })
        .collect();

    if !failures.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Not Evaluated");
        for line in failures {
            let _ = writeln!(output, "{line}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::tests::sample_student;
    use crate::config::EngineConfig;
    use crate::engine::build_summary;
    use crate::error::ComplianceError;
    use crate::ledger::tests::approved_log;
    use crate::models::{StudentRecords, StudentStatus};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
    }

    #[test]
    fn digest_ranks_flagged_students_and_lists_failures() {
        let config = EngineConfig::default();
        let on_track = sample_student(StudentStatus::Active);
        let at_risk = sample_student(StudentStatus::AtRisk);
        let missing = Uuid::new_v4();

        let records = StudentRecords {
            clinical_logs: vec![approved_log(
                on_track.id,
                "Riverside Medical Center",
                Some(400.0),
                Some(false),
            )],
            ..StudentRecords::default()
        };

        let mut results: CohortResults = BTreeMap::new();
        results.insert(on_track.id, Ok(build_summary(&on_track, &records, &config, today())));
        results.insert(
            at_risk.id,
            Ok(build_summary(&at_risk, &StudentRecords::default(), &config, today())),
        );
        results.insert(missing, Err(ComplianceError::UnknownStudent(missing)));

        let students: BTreeMap<Uuid, Student> = [on_track.clone(), at_risk.clone()]
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let digest = build_digest("PN-2026", &students, &results, 10);
        assert!(digest.contains("2 students evaluated, 1 hours compliant"));
        assert!(digest.contains("- at_risk_status: 1 students"));
        assert!(digest.contains("score 4"));
        assert!(digest.contains("## Not Evaluated"));
        assert!(digest.contains(&missing.to_string()));
    }

    #[test]
    fn flag_counts_sorted_by_frequency() {
        let config = EngineConfig::default();
        let empty = StudentRecords::default();
        let a = build_summary(&sample_student(StudentStatus::AtRisk), &empty, &config, today());
        let b = build_summary(&sample_student(StudentStatus::Active), &empty, &config, today());
        let counts = summarize_by_flag(&[&a, &b]);
        assert_eq!(counts[0].kind, FlagKind::ClinicalBehind);
        assert_eq!(counts[0].count, 2);
        assert_eq!(counts[1].count, 1);
    }
}
