use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{VrCompletion, VrScenario};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VrSummary {
    pub student_id: Uuid,
    pub total_vr_hours: f64,
    pub max_allowed_hours: f64,
    pub percentage_used: f64,
    pub completed_scenarios: usize,
    pub required_completed: usize,
    pub required_outstanding: Vec<String>,
}

pub fn summarize(
    student_id: Uuid,
    completions: &[VrCompletion],
    scenarios: &[VrScenario],
    max_allowed_hours: f64,
) -> VrSummary {
    let own: Vec<&VrCompletion> = completions
        .iter()
        .filter(|c| c.student_id == student_id && c.hours.is_finite() && c.hours >= 0.0)
        .collect();

    let total_vr_hours: f64 = own.iter().map(|c| c.hours).sum();
    let done: HashSet<Uuid> = own.iter().map(|c| c.scenario_id).collect();

    let mut required_completed = 0;
    let mut required_outstanding = Vec::new();
    for scenario in scenarios.iter().filter(|s| s.is_required) {
        if done.contains(&scenario.id) {
            required_completed += 1;
        } else {
            required_outstanding.push(scenario.name.clone());
        }
    }
    required_outstanding.sort();

    let percentage_used = if max_allowed_hours > 0.0 {
        total_vr_hours / max_allowed_hours * 100.0
    } else {
        0.0
    };

    VrSummary {
        student_id,
        total_vr_hours,
        max_allowed_hours,
        percentage_used,
        completed_scenarios: done.len(),
        required_completed,
        required_outstanding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn scenario(name: &str, is_required: bool) -> VrScenario {
        VrScenario {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: Some("cardiac".to_string()),
            is_required,
            default_hours: Some(2.0),
        }
    }

    fn completion(student_id: Uuid, scenario_id: Uuid, hours: f64) -> VrCompletion {
        VrCompletion {
            id: Uuid::new_v4(),
            student_id,
            scenario_id,
            completion_date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            hours,
            score: None,
        }
    }

    #[test]
    fn tracks_required_scenarios_and_cap_usage() {
        let student = Uuid::new_v4();
        let scenarios = vec![
            scenario("Chest Pain Triage", true),
            scenario("Pediatric Asthma", true),
            scenario("Sepsis Bundle", false),
        ];
        let completions = vec![
            completion(student, scenarios[0].id, 2.0),
            completion(student, scenarios[0].id, 1.0),
            completion(student, scenarios[2].id, 2.0),
        ];

        let summary = summarize(student, &completions, &scenarios, 100.0);
        assert_eq!(summary.total_vr_hours, 5.0);
        assert_eq!(summary.percentage_used, 5.0);
        assert_eq!(summary.completed_scenarios, 2);
        assert_eq!(summary.required_completed, 1);
        assert_eq!(summary.required_outstanding, vec!["Pediatric Asthma".to_string()]);
    }

    #[test]
    fn other_students_completions_are_ignored() {
        let student = Uuid::new_v4();
        let scenarios = vec![scenario("Chest Pain Triage", true)];
        let completions = vec![completion(Uuid::new_v4(), scenarios[0].id, 4.0)];
        let summary = summarize(student, &completions, &scenarios, 100.0);
        assert_eq!(summary.total_vr_hours, 0.0);
        assert_eq!(summary.required_completed, 0);
    }
}
