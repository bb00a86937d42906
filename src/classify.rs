use serde::{Deserialize, Serialize};

use crate::models::ClinicalLogEntry;

const SIMULATION_TOKENS: [&str; 3] = ["sim", "lab", "simulation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HourKind {
    Direct,
    Simulation,
}

/// Where a classification came from. Heuristic results need manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Explicit,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: HourKind,
    pub source: ClassificationSource,
}

pub fn classify(entry: &ClinicalLogEntry) -> Classification {
    match entry.is_simulation {
        Some(true) => Classification {
            kind: HourKind::Simulation,
            source: ClassificationSource::Explicit,
        },
        Some(false) => Classification {
            kind: HourKind::Direct,
            source: ClassificationSource::Explicit,
        },
        None => Classification {
            kind: classify_text(&entry.site_name, &entry.patient_diagnosis),
            source: ClassificationSource::Heuristic,
        },
    }
}

/// Site-name / diagnosis fallback. Empty text is direct care.
pub fn classify_text(site_name: &str, diagnosis: &str) -> HourKind {
    let site = site_name.to_lowercase();
    let diagnosis = diagnosis.to_lowercase();
    let hit = SIMULATION_TOKENS
        .iter()
        .any(|token| site.contains(token) || diagnosis.contains(token));

    if hit {
        HourKind::Simulation
    } else {
        HourKind::Direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewStatus;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn sample_log(site: &str, diagnosis: &str, is_simulation: Option<bool>) -> ClinicalLogEntry {
        ClinicalLogEntry {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            site_name: site.to_string(),
            patient_diagnosis: diagnosis.to_string(),
            hours: Some(8.0),
            is_simulation,
            is_makeup: false,
            status: ReviewStatus::Approved,
            instructor_feedback: None,
            reviewed_at: None,
        }
    }

    #[test]
    fn explicit_flag_wins_over_site_name() {
        let entry = sample_log("Skills Lab", "CHF", Some(false));
        let result = classify(&entry);
        assert_eq!(result.kind, HourKind::Direct);
        assert_eq!(result.source, ClassificationSource::Explicit);

        let entry = sample_log("Riverside Medical Center", "CHF", Some(true));
        assert_eq!(classify(&entry).kind, HourKind::Simulation);
    }

    #[test]
    fn heuristic_matches_site_tokens_case_insensitively() {
        let entry = sample_log("SIM Center West", "", None);
        let result = classify(&entry);
        assert_eq!(result.kind, HourKind::Simulation);
        assert_eq!(result.source, ClassificationSource::Heuristic);
        assert_eq!(classify_text("Nursing LAB 2", ""), HourKind::Simulation);
    }

    #[test]
    fn heuristic_reads_diagnosis_text() {
        assert_eq!(
            classify_text("Riverside Medical Center", "Simulation: sepsis"),
            HourKind::Simulation
        );
    }

    #[test]
    fn empty_input_defaults_to_direct() {
        assert_eq!(classify_text("", ""), HourKind::Direct);
        let entry = sample_log("Riverside Medical Center", "COPD exacerbation", None);
        assert_eq!(classify(&entry).kind, HourKind::Direct);
    }
}
