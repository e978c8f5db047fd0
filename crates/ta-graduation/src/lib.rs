//! # ta-graduation
//!
//! Trust graduation engine for Trusted Autonomy.
//!
//! Agents start every action category (e.g. `"email_replies"`) at
//! [`AutonomyLevel::ApprovalRequired`] and earn more autonomy by
//! demonstrating good performance. The [`GraduationEngine`] reads
//! per-category [`CategoryMetrics`] from a [`MetricsStore`], decides whether
//! a category should be promoted or demoted, and applies the change.
//!
//! ## Key invariants
//!
//! - **Demotion before promotion**: on every evaluation pass a category is
//!   checked for demotion first. A demoted category is not re-checked for
//!   promotion in the same pass.
//! - **Demotion goes to the floor**: any demotion lands on
//!   `approval_required`, whatever the starting level.
//! - **Hysteresis**: the demotion thresholds are looser than the promotion
//!   thresholds, leaving a stable zone where neither fires.
//! - **Stateless engine**: the store is the single source of truth.
//!
//! ## Quick Example
//!
//! ```rust
//! use ta_graduation::{
//!     GraduationEngine, InMemoryMetricsStore, MetricsStore, MetricsUpdate, ThresholdConfig,
//! };
//!
//! let store = InMemoryMetricsStore::new();
//! store
//!     .upsert("email_replies", &MetricsUpdate::new().total_actions(3))
//!     .unwrap();
//!
//! let engine = GraduationEngine::new(store, ThresholdConfig::default()).unwrap();
//! let report = engine.evaluate_all().unwrap();
//! assert!(report.changes.is_empty());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod level;
pub mod metrics;
pub mod store;

pub use config::{ThresholdConfig, TrustPaths};
pub use engine::{
    EvaluationReport, EvaluationStep, EvaluationTrace, GraduationEngine, Transition,
    TransitionTrigger,
};
pub use error::GraduationError;
pub use events::{EventDispatcher, LogSink, TransitionEvent, TransitionSink};
pub use level::AutonomyLevel;
pub use metrics::{CategoryMetrics, MetricsUpdate};
pub use store::{InMemoryMetricsStore, JsonMetricsStore, MetricsStore};
