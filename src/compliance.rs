use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::flags::Flag;
use crate::ledger::{HourLedger, SiteHours};
use crate::models::Student;

/// Progress toward the hours requirement. Advisory only; the sim cap is the hard rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressBand {
    OnTrack,
    Progressing,
    Behind,
}

impl ProgressBand {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.75 {
            ProgressBand::OnTrack
        } else if ratio >= 0.50 {
            ProgressBand::Progressing
        } else {
            ProgressBand::Behind
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgressBand::OnTrack => "on track",
            ProgressBand::Progressing => "progressing",
            ProgressBand::Behind => "behind",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub student_id: Uuid,
    pub direct_hours: f64,
    pub sim_hours: f64,
    pub total_hours: f64,
    /// Raw `sim / max(total, 1) * 100`, used for every comparison.
    pub sim_cap_percentage: f64,
    /// `sim_cap_percentage` clamped to [0, 100].
    pub sim_cap_display: f64,
    pub hours_required: f64,
    pub hours_remaining: f64,
    /// Raw `total / required`.
    pub progress_ratio: f64,
    /// `progress_ratio * 100` clamped to [0, 100].
    pub progress_percentage: f64,
    pub progress_band: ProgressBand,
    pub is_sim_compliant: bool,
    pub is_hours_compliant: bool,
    pub sites: BTreeMap<String, SiteHours>,
    pub estimated_entries: usize,
    pub heuristic_entries: Vec<Uuid>,
    pub skipped_count: usize,
    pub flags: Vec<Flag>,
}

/// The student's own requirement when set, otherwise the configured one.
pub fn effective_requirement(student: &Student, config: &EngineConfig) -> f64 {
    match student.clinical_hours_required {
        Some(required) if required.is_finite() && required > 0.0 => required,
        _ => config.hours_required,
    }
}

pub fn sim_percentage(sim_hours: f64, total_hours: f64) -> f64 {
    sim_hours / total_hours.max(1.0) * 100.0
}

pub fn is_sim_compliant(sim_hours: f64, sim_cap_percentage: f64, config: &EngineConfig) -> bool {
    sim_hours <= config.sim_cap_hours && sim_cap_percentage <= config.sim_cap_percent
}

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Compare ledger totals against thresholds. Flags are attached later by the assessor.
pub fn evaluate(
    student: &Student,
    ledger: &HourLedger,
    config: &EngineConfig,
) -> ComplianceSummary {
    let hours_required = effective_requirement(student, config);
    let sim_cap_percentage = sim_percentage(ledger.sim_hours, ledger.total_hours);
    let progress_ratio = ledger.total_hours / hours_required;

    ComplianceSummary {
        student_id: student.id,
        direct_hours: ledger.direct_hours,
        sim_hours: ledger.sim_hours,
        total_hours: ledger.total_hours,
        sim_cap_percentage,
        sim_cap_display: clamp_percent(sim_cap_percentage),
        hours_required,
        hours_remaining: (hours_required - ledger.total_hours).max(0.0),
        progress_ratio,
        progress_percentage: clamp_percent(progress_ratio * 100.0),
        progress_band: ProgressBand::from_ratio(progress_ratio),
        is_sim_compliant: is_sim_compliant(ledger.sim_hours, sim_cap_percentage, config),
        is_hours_compliant: ledger.total_hours >= hours_required,
        sites: ledger.sites.clone(),
        estimated_entries: ledger.estimated_entries,
        heuristic_entries: ledger.heuristic_entries.clone(),
        skipped_count: ledger.skipped_count,
        flags: Vec::new(),
    }
}
