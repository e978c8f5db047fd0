// events.rs — Transition events and their delivery.
//
// Every applied promotion or demotion becomes a TransitionEvent. Sinks
// subscribe to these events; the bundled LogSink appends them to a JSONL
// audit file that `ta-trust events tail` reads back.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{Transition, TransitionTrigger};
use crate::error::GraduationError;
use crate::level::AutonomyLevel;

/// Audit record of one level change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionEvent {
    pub event_id: Uuid,
    pub category: String,
    pub previous_level: AutonomyLevel,
    pub new_level: AutonomyLevel,
    pub timestamp: DateTime<Utc>,
    pub trigger: TransitionTrigger,
}

impl From<&Transition> for TransitionEvent {
    fn from(t: &Transition) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            category: t.category.clone(),
            previous_level: t.previous,
            new_level: t.new,
            timestamp: t.at,
            trigger: t.trigger,
        }
    }
}

/// Receives transition events.
pub trait TransitionSink: Send {
    fn send(&self, event: &TransitionEvent) -> Result<(), GraduationError>;
}

/// Appends events as JSON lines to a file.
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read every event in a log. A missing file is an empty log.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<TransitionEvent>, GraduationError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path).map_err(|source| GraduationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut events = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }
}

impl TransitionSink for LogSink {
    fn send(&self, event: &TransitionEvent) -> Result<(), GraduationError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| GraduationError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| GraduationError::Io {
                path: self.path.clone(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| GraduationError::Io {
            path: self.path.clone(),
            source,
        })?;

        Ok(())
    }
}

/// Fans events out to several sinks.
///
/// A failing sink is logged and skipped; the rest still receive the event.
pub struct EventDispatcher {
    sinks: Vec<Box<dyn TransitionSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn TransitionSink>) {
        self.sinks.push(sink);
    }

    /// Deliver `event` to every sink. Returns how many accepted it.
    pub fn dispatch(&self, event: &TransitionEvent) -> usize {
        let mut delivered = 0;
        for sink in &self.sinks {
            match sink.send(event) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    "failed to deliver {} event for '{}': {}",
                    event.trigger,
                    event.category,
                    e
                ),
            }
        }
        delivered
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
