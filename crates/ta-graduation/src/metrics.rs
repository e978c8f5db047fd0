// metrics.rs — Per-category performance snapshot and partial updates.
//
// A CategoryMetrics record is created by the metrics collector the first time
// an action in a category is observed, and lives forever. The engine only
// reads it and writes back the autonomy level (plus `graduated_at` on
// promotion). Everything else is produced upstream.
//
// Updates are expressed as a MetricsUpdate: a set of field name → JSON value
// pairs. Field names are checked against the record's own serialized shape,
// so a typo in a collector surfaces as `UnknownField` instead of silently
// writing nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GraduationError;
use crate::level::AutonomyLevel;

/// Trust metrics for one category of agent actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryMetrics {
    /// Category identifier (e.g., "email_replies"). Fixed at creation.
    pub category: String,

    /// Current autonomy level.
    pub current_autonomy: AutonomyLevel,

    /// All-time number of drafts/actions produced.
    pub total_actions: u64,

    /// All-time fraction of drafts sent/approved rather than discarded.
    pub send_rate: f64,

    /// All-time average edit distance (0.0 = untouched, 1.0 = rewritten).
    pub avg_edit_distance: f64,

    /// When the first action in this category was recorded. Never reset.
    pub first_action_at: Option<DateTime<Utc>>,

    /// When the category was last promoted. Demotion leaves this alone.
    pub graduated_at: Option<DateTime<Utc>>,

    /// Actions inside the rolling window.
    pub windowed_total: u64,

    /// Send rate inside the rolling window.
    pub windowed_send_rate: f64,

    /// Average edit distance inside the rolling window.
    pub windowed_avg_edit: f64,

    /// Human-flagged problems since the last promotion.
    pub issues_since_graduation: u64,

    /// Actions auto-executed since the last promotion.
    pub auto_actions_since_graduation: u64,
}

impl Default for CategoryMetrics {
    fn default() -> Self {
        Self {
            category: String::new(),
            current_autonomy: AutonomyLevel::ApprovalRequired,
            total_actions: 0,
            send_rate: 0.0,
            avg_edit_distance: 1.0,
            first_action_at: None,
            graduated_at: None,
            windowed_total: 0,
            windowed_send_rate: 0.0,
            windowed_avg_edit: 1.0,
            issues_since_graduation: 0,
            auto_actions_since_graduation: 0,
        }
    }
}

impl CategoryMetrics {
    /// A fresh record at `approval_required` with no history.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Default::default()
        }
    }

    /// Apply a partial update in place.
    ///
    /// All-or-nothing: on any error the record is left unchanged.
    pub fn apply(&mut self, update: &MetricsUpdate) -> Result<(), GraduationError> {
        if let Some(expected) = update.expected_level {
            if expected != self.current_autonomy {
                return Err(GraduationError::Conflict {
                    category: self.category.clone(),
                    expected,
                    actual: self.current_autonomy,
                });
            }
        }

        let mut fields = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => unreachable!("CategoryMetrics serializes as a JSON object"),
        };

        // Reject bad names before touching any value.
        for name in update.fields.keys() {
            if name == "category" {
                return Err(GraduationError::ImmutableField {
                    field: name.clone(),
                });
            }
            if !fields.contains_key(name) {
                return Err(GraduationError::UnknownField {
                    field: name.clone(),
                });
            }
        }

        for (name, value) in &update.fields {
            if name == "first_action_at" {
                if let Some(existing) = self.first_action_at {
                    let incoming: Option<DateTime<Utc>> = serde_json::from_value(value.clone())
                        .map_err(|e| GraduationError::InvalidFieldValue {
                            field: name.clone(),
                            reason: e.to_string(),
                        })?;
                    if incoming != Some(existing) {
                        return Err(GraduationError::ImmutableField {
                            field: name.clone(),
                        });
                    }
                }
            }
            fields.insert(name.clone(), value.clone());
            check_field(&fields, name)?;
        }

        *self = serde_json::from_value(Value::Object(fields))?;
        Ok(())
    }
}

fn check_field(fields: &Map<String, Value>, name: &str) -> Result<(), GraduationError> {
    serde_json::from_value::<CategoryMetrics>(Value::Object(fields.clone()))
        .map(|_| ())
        .map_err(|e| GraduationError::InvalidFieldValue {
            field: name.to_string(),
            reason: e.to_string(),
        })
}

/// A partial update to a [`CategoryMetrics`] record.
///
/// Typed setters cover every field; [`MetricsUpdate::set`] takes a raw
/// name/value pair for callers that only have strings (e.g. the CLI).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsUpdate {
    fields: BTreeMap<String, Value>,
    expected_level: Option<AutonomyLevel>,
}

impl MetricsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field by name. The name is validated when the update is applied.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Only apply if the stored level is still `level` (compare-and-swap).
    pub fn expect_level(mut self, level: AutonomyLevel) -> Self {
        self.expected_level = Some(level);
        self
    }

    pub fn current_autonomy(self, level: AutonomyLevel) -> Self {
        self.set("current_autonomy", level.as_str())
    }

    pub fn total_actions(self, n: u64) -> Self {
        self.set("total_actions", n)
    }

    pub fn send_rate(self, rate: f64) -> Self {
        self.set("send_rate", rate)
    }

    pub fn avg_edit_distance(self, rate: f64) -> Self {
        self.set("avg_edit_distance", rate)
    }

    pub fn first_action_at(self, at: DateTime<Utc>) -> Self {
        self.set("first_action_at", at.to_rfc3339())
    }

    pub fn graduated_at(self, at: DateTime<Utc>) -> Self {
        self.set("graduated_at", at.to_rfc3339())
    }

    pub fn windowed_total(self, n: u64) -> Self {
        self.set("windowed_total", n)
    }

    pub fn windowed_send_rate(self, rate: f64) -> Self {
        self.set("windowed_send_rate", rate)
    }

    pub fn windowed_avg_edit(self, rate: f64) -> Self {
        self.set("windowed_avg_edit", rate)
    }

    pub fn issues_since_graduation(self, n: u64) -> Self {
        self.set("issues_since_graduation", n)
    }

    pub fn auto_actions_since_graduation(self, n: u64) -> Self {
        self.set("auto_actions_since_graduation", n)
    }

    pub fn expected_level(&self) -> Option<AutonomyLevel> {
        self.expected_level
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in this update, sorted.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}
