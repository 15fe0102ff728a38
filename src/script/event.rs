//! Runtime events emitted by scripts
//!
//! Scripts report progress and failures through `push_event`; the runner
//! collects them per session in emission order.

use rhai::{Dynamic, Map};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a runtime event
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    #[default]
    Debug,
    Info,
    Warning,
    Error,
}

impl EventLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Some(EventLevel::Debug),
            "info" => Some(EventLevel::Info),
            "warn" | "warning" => Some(EventLevel::Warning),
            "error" => Some(EventLevel::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warning => "warning",
            EventLevel::Error => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EventLevel::Error)
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event pushed by script code
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub level: EventLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuntimeEvent {
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Build an event from a script object map.
    ///
    /// Missing or unknown `level` falls back to debug; non-string `message`
    /// values are ignored; any `error` value is kept in its display form.
    pub fn from_map(map: &Map) -> Self {
        let level = map
            .get("level")
            .and_then(|v| v.clone().into_string().ok())
            .and_then(|s| EventLevel::from_str(&s))
            .unwrap_or_default();

        let message = map
            .get("message")
            .and_then(|v| v.clone().into_string().ok())
            .unwrap_or_default();

        let error = map
            .get("error")
            .filter(|v| !v.is_unit())
            .map(Dynamic::to_string);

        Self {
            level,
            message,
            error,
        }
    }
}

impl fmt::Display for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)?;
        if let Some(error) = &self.error {
            write!(f, " ({error})")?;
        }
        Ok(())
    }
}
