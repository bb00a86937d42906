//! Engine thresholds and their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ComplianceError, Result};

pub const DEFAULT_HOURS_REQUIRED: f64 = 400.0;
pub const DEFAULT_SIM_CAP_HOURS: f64 = 100.0;
pub const DEFAULT_SIM_CAP_PERCENT: f64 = 25.0;
pub const DEFAULT_ABSENCE_THRESHOLD: usize = 3;
pub const DEFAULT_TARDY_THRESHOLD: usize = 5;
/// Hours credited to an approved clinical log that was recorded without a duration.
pub const DEFAULT_ESTIMATED_HOURS_PER_LOG: f64 = 4.0;
pub const DEFAULT_MAKEUP_DUE_DAYS: i64 = 30;
/// Hours owed for a clinical absence recorded without its scheduled hours.
pub const DEFAULT_CLINICAL_ABSENCE_HOURS: f64 = 8.0;
/// Upper bound for every day-count setting.
pub const MAX_DAY_SPAN: i64 = 36_500;

fn default_hours_required() -> f64 {
    DEFAULT_HOURS_REQUIRED
}

fn default_sim_cap_hours() -> f64 {
    DEFAULT_SIM_CAP_HOURS
}

fn default_sim_cap_percent() -> f64 {
    DEFAULT_SIM_CAP_PERCENT
}

fn default_absence_threshold() -> usize {
    DEFAULT_ABSENCE_THRESHOLD
}

fn default_tardy_threshold() -> usize {
    DEFAULT_TARDY_THRESHOLD
}

fn default_true() -> bool {
    true
}

fn default_estimated_hours() -> f64 {
    DEFAULT_ESTIMATED_HOURS_PER_LOG
}

fn default_makeup_due_days() -> i64 {
    DEFAULT_MAKEUP_DUE_DAYS
}

fn default_clinical_absence_hours() -> f64 {
    DEFAULT_CLINICAL_ABSENCE_HOURS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Regulatory total used when a student carries no requirement of their own.
    #[serde(default = "default_hours_required")]
    pub hours_required: f64,

    #[serde(default = "default_sim_cap_hours")]
    pub sim_cap_hours: f64,

    #[serde(default = "default_sim_cap_percent")]
    pub sim_cap_percent: f64,

    #[serde(default = "default_absence_threshold")]
    pub attendance_absence_threshold: usize,

    #[serde(default = "default_tardy_threshold")]
    pub attendance_tardy_threshold: usize,

    /// Only attendance in the last N days counts toward flags; `None` means the whole record.
    #[serde(default)]
    pub attendance_window_days: Option<i64>,

    /// Whether approved self-reported hour submissions count toward totals.
    #[serde(default = "default_true")]
    pub count_hour_submissions: bool,

    #[serde(default = "default_estimated_hours")]
    pub estimated_hours_per_log: f64,

    #[serde(default = "default_makeup_due_days")]
    pub makeup_due_days: i64,

    #[serde(default = "default_clinical_absence_hours")]
    pub clinical_absence_hours: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hours_required: DEFAULT_HOURS_REQUIRED,
            sim_cap_hours: DEFAULT_SIM_CAP_HOURS,
            sim_cap_percent: DEFAULT_SIM_CAP_PERCENT,
            attendance_absence_threshold: DEFAULT_ABSENCE_THRESHOLD,
            attendance_tardy_threshold: DEFAULT_TARDY_THRESHOLD,
            attendance_window_days: None,
            count_hour_submissions: true,
            estimated_hours_per_log: DEFAULT_ESTIMATED_HOURS_PER_LOG,
            makeup_due_days: DEFAULT_MAKEUP_DUE_DAYS,
            clinical_absence_hours: DEFAULT_CLINICAL_ABSENCE_HOURS,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ComplianceError::Config(format!("{}: {e}", path.as_ref().display()))
        })?;
        let config: EngineConfig =
            toml::from_str(&content).map_err(|e| ComplianceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.hours_required.is_finite() || self.hours_required <= 0.0 {
            return Err(ComplianceError::ThresholdMisconfiguration(format!(
                "hours_required must be positive, got {}",
                self.hours_required
            )));
        }
        if !(0.0..=100.0).contains(&self.sim_cap_percent) {
            return Err(ComplianceError::ThresholdMisconfiguration(format!(
                "sim_cap_percent must be within [0, 100], got {}",
                self.sim_cap_percent
            )));
        }
        if !self.sim_cap_hours.is_finite() || self.sim_cap_hours < 0.0 {
            return Err(ComplianceError::ThresholdMisconfiguration(format!(
                "sim_cap_hours must be non-negative, got {}",
                self.sim_cap_hours
            )));
        }
        if self.attendance_absence_threshold == 0 || self.attendance_tardy_threshold == 0 {
            return Err(ComplianceError::ThresholdMisconfiguration(
                "attendance thresholds must be at least 1".to_string(),
            ));
        }
        if !self.estimated_hours_per_log.is_finite() || self.estimated_hours_per_log <= 0.0 {
            return Err(ComplianceError::ThresholdMisconfiguration(format!(
                "estimated_hours_per_log must be positive, got {}",
                self.estimated_hours_per_log
            )));
        }
        if let Some(days) = self.attendance_window_days {
            if !(1..=MAX_DAY_SPAN).contains(&days) {
                return Err(ComplianceError::ThresholdMisconfiguration(format!(
                    "attendance_window_days must be within [1, {MAX_DAY_SPAN}], got {days}"
                )));
            }
        }
        if !(0..=MAX_DAY_SPAN).contains(&self.makeup_due_days) {
            return Err(ComplianceError::ThresholdMisconfiguration(format!(
                "makeup_due_days must be within [0, {MAX_DAY_SPAN}], got {}",
                self.makeup_due_days
            )));
        }
        if !self.clinical_absence_hours.is_finite() || self.clinical_absence_hours <= 0.0 {
            return Err(ComplianceError::ThresholdMisconfiguration(format!(
                "clinical_absence_hours must be positive, got {}",
                self.clinical_absence_hours
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_regulatory_values() {
        let config = EngineConfig::default();
        assert_eq!(config.hours_required, 400.0);
        assert_eq!(config.sim_cap_hours, 100.0);
        assert_eq!(config.sim_cap_percent, 25.0);
        assert_eq!(config.attendance_absence_threshold, 3);
        assert_eq!(config.attendance_tardy_threshold, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str("sim_cap_percent = 20.0\n").unwrap();
        assert_eq!(config.sim_cap_percent, 20.0);
        assert_eq!(config.hours_required, 400.0);
        assert!(config.count_hour_submissions);
    }

    #[test]
    fn rejects_cap_percent_outside_range() {
        let config = EngineConfig {
            sim_cap_percent: 120.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ComplianceError::ThresholdMisconfiguration(_))
        ));
    }

    #[test]
    fn rejects_non_positive_requirement() {
        let config = EngineConfig {
            hours_required: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ComplianceError::ThresholdMisconfiguration(_))
        ));
    }

    #[test]
    fn rejects_day_spans_beyond_bound() {
        let window = EngineConfig {
            attendance_window_days: Some(i64::MAX / 1000),
            ..EngineConfig::default()
        };
        assert!(matches!(
            window.validate(),
            Err(ComplianceError::ThresholdMisconfiguration(_))
        ));

        let due = EngineConfig {
            makeup_due_days: MAX_DAY_SPAN + 1,
            ..EngineConfig::default()
        };
        assert!(matches!(
            due.validate(),
            Err(ComplianceError::ThresholdMisconfiguration(_))
        ));

        let at_bound = EngineConfig {
            attendance_window_days: Some(MAX_DAY_SPAN),
            makeup_due_days: MAX_DAY_SPAN,
            ..EngineConfig::default()
        };
        assert!(at_bound.validate().is_ok());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!("engine-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "hours_required = 500.0\nattendance_window_days = 60\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.hours_required, 500.0);
        assert_eq!(config.attendance_window_days, Some(60));
    }
}
