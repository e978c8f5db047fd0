// engine.rs — Graduation engine: promotion and demotion of autonomy levels.
//
// Every evaluation pass checks each category in this order:
//
// 1. Demotion (only above the floor, only with windowing enabled, only with
//    at least 5 windowed actions). Any sustained regression sends the
//    category straight back to approval_required.
// 2. Promotion, only if demotion did not fire:
//    approval_required → supervised: time gate, then volume/quality/acceptance
//      gates on windowed counters (or all-time counters if there are none).
//    supervised → autonomous: auto-action volume, issue-free days since the
//      last promotion, and zero recorded issues.
//
// Demotion thresholds are looser than promotion thresholds (1.5× the edit
// cap, 0.5× the send floor) so a category sitting near the promotion bar
// does not flap between levels from one pass to the next.
//
// The engine holds no state of its own. Each transition is a single upsert
// carrying the level it was decided from, so a concurrent writer turns into
// a Conflict error instead of a lost update.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::error::GraduationError;
use crate::level::AutonomyLevel;
use crate::metrics::{CategoryMetrics, MetricsUpdate};
use crate::store::MetricsStore;

/// Fewer windowed actions than this is not enough evidence to demote.
const DEMOTION_MIN_SAMPLE: u64 = 5;

/// Demotion fires above `max_edit_rate_for_supervised × 1.5`.
const DEMOTION_EDIT_MULTIPLIER: f64 = 1.5;

/// Demotion fires below `min_send_rate_for_supervised × 0.5`.
const DEMOTION_SEND_MULTIPLIER: f64 = 0.5;

/// Which kind of check produced a transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Promotion,
    Demotion,
}

impl fmt::Display for TransitionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            TransitionTrigger::Promotion => "promotion",
            TransitionTrigger::Demotion => "demotion",
        })
    }
}

/// One applied level change. Callers turn this into an audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub category: String,
    pub previous: AutonomyLevel,
    pub new: AutonomyLevel,
    pub at: DateTime<Utc>,
    pub trigger: TransitionTrigger,
}

/// A single gate the engine checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationStep {
    /// Which check was performed (e.g., "time_gate", "edit_ceiling").
    pub check: String,
    /// What the engine saw (e.g., "14 days active, need 7").
    pub outcome: String,
    /// Whether this check favoured the transition being evaluated.
    pub satisfied: bool,
}

/// Full record of one category's evaluation, without applying anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationTrace {
    pub category: String,
    pub current: AutonomyLevel,
    /// Ordered checks: demotion checks first, then promotion checks.
    pub steps: Vec<EvaluationStep>,
    /// The transition that would be applied, if any.
    pub decision: Option<(TransitionTrigger, AutonomyLevel)>,
}

/// Outcome of an `evaluate_all` pass.
#[derive(Debug, Default)]
pub struct EvaluationReport {
    /// Categories whose level changed. Unchanged categories are absent.
    pub changes: BTreeMap<String, Transition>,
    /// Categories that could not be evaluated, with the store error.
    pub failures: BTreeMap<String, GraduationError>,
}

impl EvaluationReport {
    /// Category → new level for every change.
    pub fn new_levels(&self) -> BTreeMap<String, AutonomyLevel> {
        self.changes
            .iter()
            .map(|(category, t)| (category.clone(), t.new))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Decides and applies autonomy transitions against a [`MetricsStore`].
pub struct GraduationEngine<S> {
    store: S,
    thresholds: ThresholdConfig,
}

impl<S: MetricsStore> GraduationEngine<S> {
    /// Create an engine. The thresholds are validated here and fixed for the
    /// engine's lifetime.
    pub fn new(store: S, thresholds: ThresholdConfig) -> Result<Self, GraduationError> {
        thresholds.validate()?;
        Ok(Self { store, thresholds })
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current level, `approval_required` for categories never seen.
    pub fn level_of(&self, category: &str) -> Result<AutonomyLevel, GraduationError> {
        Ok(self
            .store
            .get(category)?
            .map(|m| m.current_autonomy)
            .unwrap_or_default())
    }

    /// Promotion target for `category`, if it is eligible now.
    ///
    /// Does not check demotion. Unknown categories and categories at the
    /// ceiling yield `None`.
    pub fn evaluate_graduation(
        &self,
        category: &str,
    ) -> Result<Option<AutonomyLevel>, GraduationError> {
        self.evaluate_graduation_at(category, Utc::now())
    }

    pub fn evaluate_graduation_at(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AutonomyLevel>, GraduationError> {
        let Some(metrics) = self.store.get(category)? else {
            tracing::debug!("'{}': no metrics recorded, nothing to graduate", category);
            return Ok(None);
        };
        Ok(self.promotion_target(&metrics, now, &mut Vec::new()))
    }

    /// Demotion target for `category` (always `approval_required`), if its
    /// windowed metrics have degraded past the hysteresis band.
    pub fn evaluate_demotion(
        &self,
        category: &str,
    ) -> Result<Option<AutonomyLevel>, GraduationError> {
        let Some(metrics) = self.store.get(category)? else {
            tracing::debug!("'{}': no metrics recorded, nothing to demote", category);
            return Ok(None);
        };
        Ok(self.demotion_target(&metrics, &mut Vec::new()))
    }

    /// Raise `category` to `target` and stamp `graduated_at`.
    pub fn promote(
        &self,
        category: &str,
        target: AutonomyLevel,
    ) -> Result<Transition, GraduationError> {
        self.promote_at(category, target, Utc::now())
    }

    pub fn promote_at(
        &self,
        category: &str,
        target: AutonomyLevel,
        now: DateTime<Utc>,
    ) -> Result<Transition, GraduationError> {
        let metrics = self.require(category)?;
        self.apply(&metrics, target, TransitionTrigger::Promotion, now)
    }

    /// Lower `category` to `target`. `graduated_at` is left as it was.
    pub fn demote(
        &self,
        category: &str,
        target: AutonomyLevel,
    ) -> Result<Transition, GraduationError> {
        self.demote_at(category, target, Utc::now())
    }

    pub fn demote_at(
        &self,
        category: &str,
        target: AutonomyLevel,
        now: DateTime<Utc>,
    ) -> Result<Transition, GraduationError> {
        let metrics = self.require(category)?;
        self.apply(&metrics, target, TransitionTrigger::Demotion, now)
    }

    /// Run demotion and promotion checks across every category in the store.
    ///
    /// A failure on one category is recorded in the report and the pass moves
    /// on. Only a failure to list the store aborts the whole pass.
    pub fn evaluate_all(&self) -> Result<EvaluationReport, GraduationError> {
        self.evaluate_all_at(Utc::now())
    }

    pub fn evaluate_all_at(&self, now: DateTime<Utc>) -> Result<EvaluationReport, GraduationError> {
        let mut report = EvaluationReport::default();

        for category in self.store.list_categories()? {
            match self.evaluate_category_at(&category, now) {
                Ok(Some(transition)) => {
                    report.changes.insert(category, transition);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("'{}': evaluation failed: {}", category, e);
                    report.failures.insert(category, e);
                }
            }
        }

        tracing::info!(
            "graduation pass complete: {} changed, {} failed",
            report.changes.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Evaluate and apply at most one transition for a single category.
    ///
    /// Categories are independent, so a driver may call this for different
    /// categories from different threads.
    pub fn evaluate_category_at(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Transition>, GraduationError> {
        let Some(metrics) = self.store.get(category)? else {
            return Ok(None);
        };

        // A demoted category is not considered for promotion in the same pass.
        if let Some(target) = self.demotion_target(&metrics, &mut Vec::new()) {
            return self
                .apply(&metrics, target, TransitionTrigger::Demotion, now)
                .map(Some);
        }

        match self.promotion_target(&metrics, now, &mut Vec::new()) {
            Some(target) => self
                .apply(&metrics, target, TransitionTrigger::Promotion, now)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Explain what a pass would do for `category` without changing anything.
    pub fn evaluate_with_trace(
        &self,
        category: &str,
    ) -> Result<Option<EvaluationTrace>, GraduationError> {
        self.evaluate_with_trace_at(category, Utc::now())
    }

    pub fn evaluate_with_trace_at(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EvaluationTrace>, GraduationError> {
        let Some(metrics) = self.store.get(category)? else {
            return Ok(None);
        };

        let mut steps = Vec::new();
        let decision = match self.demotion_target(&metrics, &mut steps) {
            Some(target) => Some((TransitionTrigger::Demotion, target)),
            None => self
                .promotion_target(&metrics, now, &mut steps)
                .map(|target| (TransitionTrigger::Promotion, target)),
        };

        Ok(Some(EvaluationTrace {
            category: metrics.category,
            current: metrics.current_autonomy,
            steps,
            decision,
        }))
    }

    fn require(&self, category: &str) -> Result<CategoryMetrics, GraduationError> {
        self.store
            .get(category)?
            .ok_or_else(|| GraduationError::CategoryNotFound {
                category: category.to_string(),
            })
    }

    /// Write the new level, conditional on the level it was decided from.
    fn apply(
        &self,
        metrics: &CategoryMetrics,
        target: AutonomyLevel,
        trigger: TransitionTrigger,
        now: DateTime<Utc>,
    ) -> Result<Transition, GraduationError> {
        let mut update = MetricsUpdate::new()
            .expect_level(metrics.current_autonomy)
            .current_autonomy(target);
        if trigger == TransitionTrigger::Promotion {
            update = update.graduated_at(now);
        }
        self.store.upsert(&metrics.category, &update)?;

        match trigger {
            TransitionTrigger::Promotion => tracing::info!(
                "graduated '{}': {} → {}",
                metrics.category,
                metrics.current_autonomy,
                target
            ),
            TransitionTrigger::Demotion => tracing::warn!(
                "demoted '{}': {} → {}",
                metrics.category,
                metrics.current_autonomy,
                target
            ),
        }

        Ok(Transition {
            category: metrics.category.clone(),
            previous: metrics.current_autonomy,
            new: target,
            at: now,
            trigger,
        })
    }

    fn demotion_target(
        &self,
        m: &CategoryMetrics,
        steps: &mut Vec<EvaluationStep>,
    ) -> Option<AutonomyLevel> {
        let t = &self.thresholds;

        if m.current_autonomy.is_floor() {
            record(steps, "demotion_floor", "already at approval_required", false);
            return None;
        }
        if t.decay_window_days == 0 {
            record(steps, "demotion_window", "windowing disabled", false);
            return None;
        }
        if m.windowed_total < DEMOTION_MIN_SAMPLE {
            record(
                steps,
                "demotion_sample",
                format!(
                    "{} windowed actions, need {} to demote",
                    m.windowed_total, DEMOTION_MIN_SAMPLE
                ),
                false,
            );
            return None;
        }

        let edit_ceiling = t.max_edit_rate_for_supervised * DEMOTION_EDIT_MULTIPLIER;
        let send_floor = t.min_send_rate_for_supervised * DEMOTION_SEND_MULTIPLIER;
        let edit_breached = m.windowed_avg_edit > edit_ceiling;
        let send_breached = m.windowed_send_rate < send_floor;

        record(
            steps,
            "edit_ceiling",
            format!("edit={:.2} (ceil={:.2})", m.windowed_avg_edit, edit_ceiling),
            edit_breached,
        );
        record(
            steps,
            "send_floor",
            format!(
                "send_rate={:.2} (floor={:.2})",
                m.windowed_send_rate, send_floor
            ),
            send_breached,
        );

        if edit_breached || send_breached {
            tracing::warn!(
                "demotion triggered for '{}': edit={:.2} (ceil={:.2}), send_rate={:.2} (floor={:.2})",
                m.category,
                m.windowed_avg_edit,
                edit_ceiling,
                m.windowed_send_rate,
                send_floor
            );
            // Always straight to the floor, never one step down.
            return Some(AutonomyLevel::ApprovalRequired);
        }
        None
    }

    fn promotion_target(
        &self,
        m: &CategoryMetrics,
        now: DateTime<Utc>,
        steps: &mut Vec<EvaluationStep>,
    ) -> Option<AutonomyLevel> {
        match m.current_autonomy {
            AutonomyLevel::ApprovalRequired => self
                .can_reach_supervised(m, now, steps)
                .then_some(AutonomyLevel::Supervised),
            AutonomyLevel::Supervised => self
                .can_reach_autonomous(m, now, steps)
                .then_some(AutonomyLevel::Autonomous),
            AutonomyLevel::Autonomous => {
                record(steps, "promotion_ceiling", "already autonomous", false);
                None
            }
        }
    }

    fn can_reach_supervised(
        &self,
        m: &CategoryMetrics,
        now: DateTime<Utc>,
        steps: &mut Vec<EvaluationStep>,
    ) -> bool {
        let t = &self.thresholds;

        let Some(first_action_at) = m.first_action_at else {
            tracing::debug!("'{}': no first_action_at, cannot graduate", m.category);
            record(steps, "time_gate", "no first action recorded", false);
            return false;
        };
        let days_active = (now - first_action_at).num_days();
        let time_ok = at_least(days_active, t.min_days_before_any_graduation);
        record(
            steps,
            "time_gate",
            format!(
                "{} days active, need {}",
                days_active, t.min_days_before_any_graduation
            ),
            time_ok,
        );
        if !time_ok {
            tracing::debug!(
                "'{}': only {} days active, need {}",
                m.category,
                days_active,
                t.min_days_before_any_graduation
            );
            return false;
        }

        // Prefer the rolling window; fall back to lifetime numbers when the
        // window is disabled or still empty.
        let (source, total, avg_edit, send_rate) =
            if t.decay_window_days > 0 && m.windowed_total > 0 {
                (
                    "windowed",
                    m.windowed_total,
                    m.windowed_avg_edit,
                    m.windowed_send_rate,
                )
            } else {
                ("all_time", m.total_actions, m.avg_edit_distance, m.send_rate)
            };

        let volume_ok = total >= t.min_drafts_for_supervised;
        let quality_ok = avg_edit <= t.max_edit_rate_for_supervised;
        let acceptance_ok = send_rate >= t.min_send_rate_for_supervised;

        record(
            steps,
            "volume",
            format!(
                "{} actions ({}), need {}",
                total, source, t.min_drafts_for_supervised
            ),
            volume_ok,
        );
        record(
            steps,
            "quality",
            format!(
                "edit={:.2} ({}), max {:.2}",
                avg_edit, source, t.max_edit_rate_for_supervised
            ),
            quality_ok,
        );
        record(
            steps,
            "acceptance",
            format!(
                "send_rate={:.2} ({}), min {:.2}",
                send_rate, source, t.min_send_rate_for_supervised
            ),
            acceptance_ok,
        );

        let ready = volume_ok && quality_ok && acceptance_ok;
        if ready {
            tracing::info!(
                "'{}' ready for supervised: actions={}, edit={:.2}, send_rate={:.2}",
                m.category,
                total,
                avg_edit,
                send_rate
            );
        }
        ready
    }

    fn can_reach_autonomous(
        &self,
        m: &CategoryMetrics,
        now: DateTime<Utc>,
        steps: &mut Vec<EvaluationStep>,
    ) -> bool {
        let t = &self.thresholds;

        let Some(graduated_at) = m.graduated_at else {
            record(steps, "graduated", "never promoted into supervised", false);
            return false;
        };

        let days_since = (now - graduated_at).num_days();
        let volume_ok = m.auto_actions_since_graduation >= t.min_auto_actions_for_autonomous;
        let tenure_ok = at_least(days_since, t.min_issue_free_days_for_autonomous);
        let issues_ok = m.issues_since_graduation == 0;

        record(
            steps,
            "auto_actions",
            format!(
                "{} auto actions since graduation, need {}",
                m.auto_actions_since_graduation, t.min_auto_actions_for_autonomous
            ),
            volume_ok,
        );
        record(
            steps,
            "issue_free_days",
            format!(
                "{} days since graduation, need {}",
                days_since, t.min_issue_free_days_for_autonomous
            ),
            tenure_ok,
        );
        record(
            steps,
            "issues",
            format!("{} issues since graduation", m.issues_since_graduation),
            issues_ok,
        );

        let ready = volume_ok && tenure_ok && issues_ok;
        if ready {
            tracing::info!(
                "'{}' ready for autonomous: auto_actions={}, days={}, issues={}",
                m.category,
                m.auto_actions_since_graduation,
                days_since,
                m.issues_since_graduation
            );
        }
        ready
    }
}

/// Whole elapsed days compared against an unsigned minimum. Negative elapsed
/// time (timestamps in the future) never satisfies a gate.
fn at_least(elapsed_days: i64, min_days: u64) -> bool {
    u64::try_from(elapsed_days).is_ok_and(|days| days >= min_days)
}

fn record(
    steps: &mut Vec<EvaluationStep>,
    check: &str,
    outcome: impl Into<String>,
    satisfied: bool,
) {
    steps.push(EvaluationStep {
        check: check.to_string(),
        outcome: outcome.into(),
        satisfied,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryMetricsStore, JsonMetricsStore};
    use chrono::{Duration, TimeZone};
    use std::io;
    use std::path::PathBuf;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    fn engine() -> GraduationEngine<InMemoryMetricsStore> {
        GraduationEngine::new(InMemoryMetricsStore::new(), ThresholdConfig::default()).unwrap()
    }

    fn seed<S: MetricsStore>(engine: &GraduationEngine<S>, category: &str, update: MetricsUpdate) {
        engine.store().upsert(category, &update).unwrap();
    }

    /// A healthy window that clears every supervised gate.
    fn good_window(update: MetricsUpdate) -> MetricsUpdate {
        update
            .windowed_total(25)
            .windowed_avg_edit(0.15)
            .windowed_send_rate(0.85)
    }

    /// A supervised category with a window that is sampled but not degraded.
    fn supervised(update: MetricsUpdate) -> MetricsUpdate {
        good_window(
            update
                .current_autonomy(AutonomyLevel::Supervised)
                .first_action_at(days_ago(60)),
        )
    }

    fn checks(trace: &EvaluationTrace) -> Vec<&str> {
        trace.steps.iter().map(|s| s.check.as_str()).collect()
    }

    #[test]
    fn new_rejects_invalid_thresholds() {
        let thresholds = ThresholdConfig {
            min_send_rate_for_supervised: 1.5,
            ..Default::default()
        };
        let result = GraduationEngine::new(InMemoryMetricsStore::new(), thresholds);
        assert!(matches!(
            result,
            Err(GraduationError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn unknown_category_yields_none() {
        let engine = engine();
        assert_eq!(engine.evaluate_graduation_at("ghost", now()).unwrap(), None);
        assert_eq!(engine.evaluate_demotion("ghost").unwrap(), None);
        assert!(engine.evaluate_with_trace_at("ghost", now()).unwrap().is_none());
        assert_eq!(
            engine.level_of("ghost").unwrap(),
            AutonomyLevel::ApprovalRequired
        );
    }

    #[test]
    fn time_gate_blocks_young_category() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            good_window(MetricsUpdate::new().first_action_at(days_ago(3))),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
    }

    #[test]
    fn missing_first_action_blocks_graduation() {
        let engine = engine();
        seed(&engine, "email_replies", good_window(MetricsUpdate::new()));
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
    }

    #[test]
    fn windowed_metrics_graduate_to_supervised() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            good_window(MetricsUpdate::new().first_action_at(days_ago(10))),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            Some(AutonomyLevel::Supervised)
        );
    }

    #[test]
    fn windowed_counters_take_precedence_over_all_time() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new()
                .first_action_at(days_ago(30))
                .total_actions(100)
                .avg_edit_distance(0.05)
                .send_rate(0.95)
                .windowed_total(10)
                .windowed_avg_edit(0.05)
                .windowed_send_rate(0.95),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
    }

    #[test]
    fn empty_window_falls_back_to_all_time() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new()
                .first_action_at(days_ago(30))
                .total_actions(40)
                .avg_edit_distance(0.10)
                .send_rate(0.90),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            Some(AutonomyLevel::Supervised)
        );
    }

    #[test]
    fn low_volume_never_graduates() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new()
                .first_action_at(days_ago(30))
                .windowed_total(19)
                .windowed_avg_edit(0.0)
                .windowed_send_rate(1.0),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
    }

    #[test]
    fn zero_window_uses_all_time_for_promotion_and_disables_demotion() {
        let thresholds = ThresholdConfig {
            decay_window_days: 0,
            ..Default::default()
        };
        let engine = GraduationEngine::new(InMemoryMetricsStore::new(), thresholds).unwrap();

        // The window alone would qualify, but it is ignored.
        seed(
            &engine,
            "calendar",
            good_window(MetricsUpdate::new().first_action_at(days_ago(30))).total_actions(5),
        );
        assert_eq!(engine.evaluate_graduation_at("calendar", now()).unwrap(), None);

        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new()
                .current_autonomy(AutonomyLevel::Supervised)
                .windowed_total(50)
                .windowed_avg_edit(0.9)
                .windowed_send_rate(0.1),
        );
        assert_eq!(engine.evaluate_demotion("email_replies").unwrap(), None);
    }

    #[test]
    fn floor_is_never_demoted() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new()
                .windowed_total(50)
                .windowed_avg_edit(0.9)
                .windowed_send_rate(0.1),
        );
        assert_eq!(engine.evaluate_demotion("email_replies").unwrap(), None);
    }

    #[test]
    fn small_window_sample_never_demotes() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .windowed_total(4)
                .windowed_avg_edit(0.9)
                .windowed_send_rate(0.1),
        );
        assert_eq!(engine.evaluate_demotion("email_replies").unwrap(), None);
    }

    #[test]
    fn degraded_window_demotes_to_floor() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .windowed_total(10)
                .windowed_avg_edit(0.35)
                .windowed_send_rate(0.5),
        );
        assert_eq!(
            engine.evaluate_demotion("email_replies").unwrap(),
            Some(AutonomyLevel::ApprovalRequired)
        );
    }

    #[test]
    fn either_breach_alone_demotes() {
        let engine = engine();
        seed(
            &engine,
            "heavy_edits",
            supervised(MetricsUpdate::new())
                .windowed_total(10)
                .windowed_avg_edit(0.31)
                .windowed_send_rate(0.9),
        );
        seed(
            &engine,
            "rarely_sent",
            supervised(MetricsUpdate::new())
                .windowed_total(10)
                .windowed_avg_edit(0.10)
                .windowed_send_rate(0.39),
        );
        for category in ["heavy_edits", "rarely_sent"] {
            assert_eq!(
                engine.evaluate_demotion(category).unwrap(),
                Some(AutonomyLevel::ApprovalRequired),
                "{category} should be demoted"
            );
        }
    }

    #[test]
    fn autonomous_demotes_straight_to_floor() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .current_autonomy(AutonomyLevel::Autonomous)
                .windowed_total(10)
                .windowed_avg_edit(0.5),
        );
        assert_eq!(
            engine.evaluate_demotion("email_replies").unwrap(),
            Some(AutonomyLevel::ApprovalRequired)
        );
    }

    #[test]
    fn hysteresis_band_is_stable() {
        // Worse than the promotion bar, better than the demotion bar.
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .windowed_total(10)
                .windowed_avg_edit(0.25)
                .windowed_send_rate(0.85),
        );
        assert_eq!(engine.evaluate_demotion("email_replies").unwrap(), None);
        assert_eq!(engine.evaluate_all_at(now()).unwrap().changes.len(), 0);
    }

    #[test]
    fn autonomous_requires_prior_graduation() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new()).auto_actions_since_graduation(100),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
    }

    #[test]
    fn autonomous_needs_auto_action_volume() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .graduated_at(days_ago(20))
                .auto_actions_since_graduation(49),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
    }

    #[test]
    fn supervised_graduates_to_autonomous() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .graduated_at(days_ago(20))
                .auto_actions_since_graduation(60),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            Some(AutonomyLevel::Autonomous)
        );
    }

    #[test]
    fn any_issue_blocks_autonomous() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .graduated_at(days_ago(20))
                .auto_actions_since_graduation(60)
                .issues_since_graduation(1),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
    }

    #[test]
    fn ceiling_is_never_promoted() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .current_autonomy(AutonomyLevel::Autonomous)
                .graduated_at(days_ago(20))
                .auto_actions_since_graduation(500),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
    }

    #[test]
    fn promote_stamps_graduated_at_and_demote_keeps_it() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new().first_action_at(days_ago(30)),
        );

        let promoted = engine
            .promote_at("email_replies", AutonomyLevel::Supervised, now())
            .unwrap();
        assert_eq!(promoted.previous, AutonomyLevel::ApprovalRequired);
        assert_eq!(promoted.new, AutonomyLevel::Supervised);
        assert_eq!(promoted.trigger, TransitionTrigger::Promotion);

        let record = engine.store().get("email_replies").unwrap().unwrap();
        assert_eq!(record.current_autonomy, AutonomyLevel::Supervised);
        assert_eq!(record.graduated_at, Some(now()));

        let later = now() + Duration::days(3);
        let demoted = engine
            .demote_at("email_replies", AutonomyLevel::ApprovalRequired, later)
            .unwrap();
        assert_eq!(demoted.trigger, TransitionTrigger::Demotion);
        assert_eq!(demoted.at, later);

        let record = engine.store().get("email_replies").unwrap().unwrap();
        assert_eq!(record.current_autonomy, AutonomyLevel::ApprovalRequired);
        assert_eq!(record.graduated_at, Some(now()));
    }

    #[test]
    fn transitions_on_unknown_category_fail() {
        let engine = engine();
        let err = engine
            .promote_at("ghost", AutonomyLevel::Supervised, now())
            .unwrap_err();
        assert!(matches!(err, GraduationError::CategoryNotFound { category } if category == "ghost"));
        assert!(matches!(
            engine.demote("ghost", AutonomyLevel::ApprovalRequired),
            Err(GraduationError::CategoryNotFound { .. })
        ));
        assert!(engine.store().list_all().unwrap().is_empty());
    }

    #[test]
    fn string_levels_are_validated_before_transition() {
        let engine = engine();
        seed(&engine, "email_replies", MetricsUpdate::new());

        let err = "semi_autonomous".parse::<AutonomyLevel>().unwrap_err();
        assert!(matches!(err, GraduationError::InvalidLevel { .. }));

        let target: AutonomyLevel = "supervised".parse().unwrap();
        engine.promote_at("email_replies", target, now()).unwrap();
        assert_eq!(
            engine.level_of("email_replies").unwrap(),
            AutonomyLevel::Supervised
        );
    }

    #[test]
    fn evaluation_is_idempotent_without_mutation() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            good_window(MetricsUpdate::new().first_action_at(days_ago(10))),
        );
        let before = engine.store().get("email_replies").unwrap();

        let first = engine.evaluate_graduation_at("email_replies", now()).unwrap();
        let second = engine.evaluate_graduation_at("email_replies", now()).unwrap();
        assert_eq!(first, second);
        engine.evaluate_with_trace_at("email_replies", now()).unwrap();

        assert_eq!(engine.store().get("email_replies").unwrap(), before);
    }

    #[test]
    fn evaluate_all_demotes_before_promoting() {
        let engine = engine();
        // Would pass every autonomous gate, but the window has degraded.
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .graduated_at(days_ago(20))
                .auto_actions_since_graduation(60)
                .windowed_total(10)
                .windowed_avg_edit(0.5),
        );
        seed(
            &engine,
            "calendar",
            good_window(MetricsUpdate::new().first_action_at(days_ago(10))),
        );
        seed(&engine, "idle", MetricsUpdate::new());

        let report = engine.evaluate_all_at(now()).unwrap();
        assert!(report.is_clean());

        let levels = report.new_levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels["email_replies"], AutonomyLevel::ApprovalRequired);
        assert_eq!(levels["calendar"], AutonomyLevel::Supervised);
        assert_eq!(
            report.changes["email_replies"].trigger,
            TransitionTrigger::Demotion
        );
        assert_eq!(
            engine.level_of("email_replies").unwrap(),
            AutonomyLevel::ApprovalRequired
        );
    }

    #[test]
    fn evaluate_all_moves_at_most_one_level_per_pass() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            good_window(MetricsUpdate::new().first_action_at(days_ago(30)))
                .auto_actions_since_graduation(500),
        );

        let first = engine.evaluate_all_at(now()).unwrap();
        assert_eq!(
            first.new_levels()["email_replies"],
            AutonomyLevel::Supervised
        );

        // graduated_at was just stamped, so the tenure gate holds it back.
        let second = engine.evaluate_all_at(now()).unwrap();
        assert!(second.changes.is_empty());

        let third = engine.evaluate_all_at(now() + Duration::days(15)).unwrap();
        assert_eq!(
            third.new_levels()["email_replies"],
            AutonomyLevel::Autonomous
        );
    }

    /// Fails reads for one category to simulate a damaged record.
    struct FlakyStore {
        inner: InMemoryMetricsStore,
        broken: &'static str,
    }

    impl MetricsStore for FlakyStore {
        fn get(&self, category: &str) -> Result<Option<CategoryMetrics>, GraduationError> {
            if category == self.broken {
                return Err(GraduationError::Io {
                    path: PathBuf::from(category),
                    source: io::Error::other("disk read failed"),
                });
            }
            self.inner.get(category)
        }

        fn upsert(&self, category: &str, update: &MetricsUpdate) -> Result<(), GraduationError> {
            self.inner.upsert(category, update)
        }

        fn list_categories(&self) -> Result<Vec<String>, GraduationError> {
            self.inner.list_categories()
        }

        fn list_all(&self) -> Result<Vec<CategoryMetrics>, GraduationError> {
            self.inner.list_all()
        }
    }

    #[test]
    fn one_failing_category_does_not_abort_the_pass() {
        let store = FlakyStore {
            inner: InMemoryMetricsStore::new(),
            broken: "broken",
        };
        let engine = GraduationEngine::new(store, ThresholdConfig::default()).unwrap();
        seed(&engine, "broken", MetricsUpdate::new());
        seed(
            &engine,
            "healthy",
            good_window(MetricsUpdate::new().first_action_at(days_ago(10))),
        );

        let report = engine.evaluate_all_at(now()).unwrap();
        assert!(!report.is_clean());
        assert!(matches!(
            report.failures.get("broken"),
            Some(GraduationError::Io { .. })
        ));
        assert_eq!(report.new_levels()["healthy"], AutonomyLevel::Supervised);
    }

    #[test]
    fn corrupt_record_is_reported_as_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMetricsStore::new(dir.path()).unwrap();
        store
            .upsert(
                "calendar",
                &good_window(MetricsUpdate::new().first_action_at(days_ago(10))),
            )
            .unwrap();
        std::fs::write(dir.path().join("email_replies.json"), "{ truncated").unwrap();

        let engine = GraduationEngine::new(store, ThresholdConfig::default()).unwrap();
        let report = engine.evaluate_all_at(now()).unwrap();

        assert!(!report.is_clean());
        assert!(matches!(
            report.failures.get("email_replies"),
            Some(GraduationError::Serialization(_))
        ));
        assert_eq!(report.new_levels()["calendar"], AutonomyLevel::Supervised);
    }

    #[test]
    fn new_category_inside_time_gate_is_not_graduated() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new()
                .first_action_at(days_ago(3))
                .total_actions(5),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
    }

    #[test]
    fn two_weeks_of_good_drafts_reach_supervised() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new()
                .first_action_at(days_ago(14))
                .windowed_total(28)
                .windowed_send_rate(0.88)
                .windowed_avg_edit(0.10),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            Some(AutonomyLevel::Supervised)
        );
    }

    #[test]
    fn both_breaches_at_once_demote_supervised() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new()
                .current_autonomy(AutonomyLevel::Supervised)
                .windowed_total(20)
                .windowed_send_rate(0.30)
                .windowed_avg_edit(0.50),
        );
        assert_eq!(
            engine.evaluate_demotion("email_replies").unwrap(),
            Some(AutonomyLevel::ApprovalRequired)
        );

        let trace = engine
            .evaluate_with_trace_at("email_replies", now())
            .unwrap()
            .unwrap();
        assert!(trace.steps.iter().all(|s| s.satisfied));
    }

    #[test]
    fn fresh_supervised_category_without_auto_actions_stays() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            MetricsUpdate::new()
                .current_autonomy(AutonomyLevel::Supervised)
                .graduated_at(days_ago(5))
                .auto_actions_since_graduation(0),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );

        let trace = engine
            .evaluate_with_trace_at("email_replies", now())
            .unwrap()
            .unwrap();
        let auto_actions = trace
            .steps
            .iter()
            .find(|s| s.check == "auto_actions")
            .unwrap();
        assert!(!auto_actions.satisfied);
    }

    #[test]
    fn trace_explains_blocked_promotion() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            good_window(MetricsUpdate::new().first_action_at(days_ago(10))).windowed_total(12),
        );

        let trace = engine
            .evaluate_with_trace_at("email_replies", now())
            .unwrap()
            .unwrap();
        assert_eq!(trace.current, AutonomyLevel::ApprovalRequired);
        assert_eq!(trace.decision, None);
        assert_eq!(
            checks(&trace),
            vec!["demotion_floor", "time_gate", "volume", "quality", "acceptance"]
        );

        let volume = &trace.steps[2];
        assert!(!volume.satisfied);
        assert!(volume.outcome.contains("12 actions (windowed)"));
        assert!(trace.steps[3].satisfied);
    }

    #[test]
    fn trace_reports_demotion_decision() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            supervised(MetricsUpdate::new())
                .windowed_total(10)
                .windowed_send_rate(0.2),
        );

        let trace = engine
            .evaluate_with_trace_at("email_replies", now())
            .unwrap()
            .unwrap();
        assert_eq!(
            trace.decision,
            Some((TransitionTrigger::Demotion, AutonomyLevel::ApprovalRequired))
        );
        assert_eq!(checks(&trace), vec!["edit_ceiling", "send_floor"]);
        assert!(!trace.steps[0].satisfied);
        assert!(trace.steps[1].satisfied);
    }

    #[test]
    fn future_timestamps_never_satisfy_day_gates() {
        let engine = engine();
        seed(
            &engine,
            "email_replies",
            good_window(MetricsUpdate::new().first_action_at(now() + Duration::days(10))),
        );
        seed(
            &engine,
            "calendar",
            supervised(MetricsUpdate::new())
                .graduated_at(now() + Duration::days(30))
                .auto_actions_since_graduation(100),
        );
        assert_eq!(
            engine.evaluate_graduation_at("email_replies", now()).unwrap(),
            None
        );
        assert_eq!(engine.evaluate_graduation_at("calendar", now()).unwrap(), None);
    }
}
