// config.rs — Threshold configuration and on-disk layout.
//
// ThresholdConfig holds every numeric gate the engine consults. It is loaded
// once at process start (from `.ta/graduation.toml` when present) and never
// changes afterwards. A partial TOML file only overrides the keys it names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GraduationError;

/// Gates controlling every promotion and demotion decision.
///
/// Rates are fractions in `[0, 1]`: edit rate 0.0 means drafts were never
/// edited, 1.0 means they were always rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Minimum drafts/actions before approval_required → supervised.
    pub min_drafts_for_supervised: u64,
    /// Maximum average edit distance for approval_required → supervised.
    pub max_edit_rate_for_supervised: f64,
    /// Minimum send/approval rate for approval_required → supervised.
    pub min_send_rate_for_supervised: f64,
    /// Auto-executed actions required since entering supervised.
    pub min_auto_actions_for_autonomous: u64,
    /// Days in supervised, with zero issues, before autonomous.
    pub min_issue_free_days_for_autonomous: u64,
    /// Days since the first recorded action before the first promotion.
    pub min_days_before_any_graduation: u64,
    /// Rolling window for windowed counters. 0 means all-time totals for
    /// promotion and no demotion at all.
    pub decay_window_days: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_drafts_for_supervised: 20,
            max_edit_rate_for_supervised: 0.20,
            min_send_rate_for_supervised: 0.80,
            min_auto_actions_for_autonomous: 50,
            min_issue_free_days_for_autonomous: 14,
            min_days_before_any_graduation: 7,
            decay_window_days: 90,
        }
    }
}

impl ThresholdConfig {
    /// Check that every rate is a finite fraction in `[0, 1]`.
    ///
    /// Counts are unsigned so they cannot be negative.
    pub fn validate(&self) -> Result<(), GraduationError> {
        check_rate(
            "max_edit_rate_for_supervised",
            self.max_edit_rate_for_supervised,
        )?;
        check_rate(
            "min_send_rate_for_supervised",
            self.min_send_rate_for_supervised,
        )?;
        Ok(())
    }

    /// Parse and validate a TOML config document.
    pub fn from_toml_str(content: &str) -> Result<Self, GraduationError> {
        Self::parse(content, "<inline>")
    }

    /// Load thresholds from a TOML file.
    pub fn load(path: &Path) -> Result<Self, GraduationError> {
        let content = std::fs::read_to_string(path).map_err(|source| GraduationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Load thresholds, falling back to defaults when the file doesn't exist.
    ///
    /// A file that exists but is malformed or out of range is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, GraduationError> {
        if !path.exists() {
            tracing::debug!(
                "no threshold config at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn parse(content: &str, origin: &str) -> Result<Self, GraduationError> {
        let config: ThresholdConfig =
            toml::from_str(content).map_err(|e| GraduationError::ConfigParse {
                origin: origin.to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }
}

fn check_rate(name: &str, value: f64) -> Result<(), GraduationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(GraduationError::InvalidConfig {
            reason: format!("{} must be within [0, 1], got {}", name, value),
        })
    }
}

/// Where graduation state lives inside a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustPaths {
    /// Threshold configuration file.
    pub config_file: PathBuf,
    /// Directory for JsonMetricsStore (one JSON file per category).
    pub metrics_dir: PathBuf,
    /// JSONL log of applied transitions.
    pub events_log: PathBuf,
}

impl TrustPaths {
    /// Standard `.ta/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let ta_dir = project_root.as_ref().join(".ta");
        Self {
            config_file: ta_dir.join("graduation.toml"),
            metrics_dir: ta_dir.join("metrics"),
            events_log: ta_dir.join("graduation-events.jsonl"),
        }
    }
}
