//! Hour ledger: approved clinical logs, VR completions and (optionally)
//! approved hour submissions summed per site and per student.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::classify::{classify, ClassificationSource, HourKind};
use crate::config::EngineConfig;
use crate::models::{ReviewStatus, StudentRecords};

/// Site label under which VR completions are booked.
pub const VR_SITE_LABEL: &str = "Virtual Reality";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteHours {
    pub direct_hours: f64,
    pub sim_hours: f64,
    pub total: f64,
}

impl SiteHours {
    fn add(&mut self, kind: HourKind, hours: f64) {
        match kind {
            HourKind::Direct => self.direct_hours += hours,
            HourKind::Simulation => self.sim_hours += hours,
        }
        self.total = self.direct_hours + self.sim_hours;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourLedger {
    pub student_id: Uuid,
    pub sites: BTreeMap<String, SiteHours>,
    pub direct_hours: f64,
    pub sim_hours: f64,
    pub total_hours: f64,
    pub vr_hours: f64,
    pub submission_hours: f64,
    /// Approved logs credited with the per-entry estimate because they carried no hours.
    pub estimated_entries: usize,
    /// Logs classified by the site/diagnosis heuristic instead of an explicit flag.
    pub heuristic_entries: Vec<Uuid>,
    pub skipped_count: usize,
}

impl HourLedger {
    fn credit(&mut self, site: &str, kind: HourKind, hours: f64) {
        self.sites.entry(site.to_string()).or_default().add(kind, hours);
    }

    fn finalize(&mut self) {
        let (direct, sim) = self
            .sites
            .values()
            .fold((0.0, 0.0), |(direct, sim), site| {
                (direct + site.direct_hours, sim + site.sim_hours)
            });
        self.direct_hours = direct;
        self.sim_hours = sim;
        self.total_hours = self.direct_hours + self.sim_hours;
    }
}

fn usable_hours(hours: f64) -> bool {
    hours.is_finite() && hours >= 0.0
}

/// Aggregate one student's records. Pure: the same records always give the same ledger.
pub fn aggregate(student_id: Uuid, records: &StudentRecords, config: &EngineConfig) -> HourLedger {
    let mut ledger = HourLedger {
        student_id,
        ..HourLedger::default()
    };

    for log in records.clinical_logs.iter() {
        if log.status != ReviewStatus::Approved {
            continue;
        }
        if log.student_id != student_id {
            warn!(
                log_id = %log.id,
                owner = %log.student_id,
                "skipping clinical log owned by another student"
            );
            ledger.skipped_count += 1;
            continue;
        }

        let hours = match log.hours {
            Some(hours) if usable_hours(hours) => hours,
            Some(hours) => {
                warn!(log_id = %log.id, hours, "skipping clinical log with unusable hours");
                ledger.skipped_count += 1;
                continue;
            }
            None => {
                ledger.estimated_entries += 1;
                config.estimated_hours_per_log
            }
        };

        let classification = classify(log);
        if classification.source == ClassificationSource::Heuristic {
            warn!(
                log_id = %log.id,
                site = %log.site_name,
                kind = ?classification.kind,
                "clinical log classified by site heuristic; needs review"
            );
            ledger.heuristic_entries.push(log.id);
        }
        debug!(log_id = %log.id, hours, kind = ?classification.kind, "crediting clinical log");
        ledger.credit(&log.site_name, classification.kind, hours);
    }

    for completion in records.vr_completions.iter() {
        if completion.student_id != student_id || !usable_hours(completion.hours) {
            warn!(completion_id = %completion.id, "skipping unusable VR completion");
            ledger.skipped_count += 1;
            continue;
        }
        ledger.vr_hours += completion.hours;
        ledger.credit(VR_SITE_LABEL, HourKind::Simulation, completion.hours);
    }

    if config.count_hour_submissions {
        for submission in records.hour_submissions.iter() {
            if submission.status != ReviewStatus::Approved {
                continue;
            }
            if submission.student_id != student_id || !usable_hours(submission.hours) {
                warn!(submission_id = %submission.id, "skipping unusable hour submission");
                ledger.skipped_count += 1;
                continue;
            }
            ledger.submission_hours += submission.hours;
            ledger.credit(&submission.site_name, HourKind::Direct, submission.hours);
        }
    }

    ledger.finalize();
    ledger
}
