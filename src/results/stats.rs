//! Run statistics
//!
//! Concurrency-safe store of per-script results, written by the supervisors
//! and read once after every script has finished.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::SessionStatus;
use crate::script::RuntimeEvent;
use crate::utils::format_duration;

/// Everything recorded for one script
#[derive(Clone, Debug, Default)]
pub struct ScriptStat {
    pub duration: Duration,
    pub error: Option<String>,
    pub events: Vec<RuntimeEvent>,
    pub status: Option<SessionStatus>,
}

impl ScriptStat {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    scripts: HashMap<PathBuf, ScriptStat>,
    elapsed: Duration,
}

/// Aggregated results of one run, keyed by script path
#[derive(Debug, Default)]
pub struct RunStats {
    inner: Mutex<StatsInner>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&self, id: &Path, update: impl FnOnce(&mut ScriptStat)) {
        let mut inner = self.inner.lock();
        update(inner.scripts.entry(id.to_path_buf()).or_default());
    }

    pub fn record_duration(&self, id: &Path, duration: Duration) {
        self.upsert(id, |stat| stat.duration = duration);
    }

    pub fn record_error(&self, id: &Path, error: impl ToString) {
        let error = error.to_string();
        self.upsert(id, |stat| stat.error = Some(error));
    }

    pub fn record_events(&self, id: &Path, events: Vec<RuntimeEvent>) {
        self.upsert(id, |stat| stat.events = events);
    }

    pub fn record_status(&self, id: &Path, status: SessionStatus) {
        self.upsert(id, |stat| stat.status = Some(status));
    }

    /// Total wall-clock time of the run
    pub fn record_summary_duration(&self, duration: Duration) {
        self.inner.lock().elapsed = duration;
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &Path) -> Option<ScriptStat> {
        self.inner.lock().scripts.get(id).cloned()
    }

    /// `true` when any recorded script carries an error
    pub fn has_errors(&self) -> bool {
        self.inner.lock().scripts.values().any(|s| !s.is_success())
    }

    /// Sorted, serializable copy of the current state
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();

        let mut scripts: Vec<ScriptReport> = inner
            .scripts
            .iter()
            .map(|(path, stat)| ScriptReport::new(path, stat))
            .collect();
        scripts.sort_by(|a, b| a.file.cmp(&b.file));

        StatsSnapshot {
            generated_at: Utc::now(),
            total_files: scripts.len(),
            failed_files: scripts.iter().filter(|s| !s.success).count(),
            elapsed_ms: inner.elapsed.as_millis() as u64,
            scripts,
        }
    }

    /// Plain-text summary table
    pub fn render(&self) -> String {
        self.snapshot().render()
    }
}

/// One row of the report
#[derive(Clone, Debug, Serialize)]
pub struct ScriptReport {
    pub file: String,
    pub status: Option<SessionStatus>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events_count: usize,
    pub duration_ms: u64,
    pub events: Vec<RuntimeEvent>,
    #[serde(skip)]
    pub duration: Duration,
}

impl ScriptReport {
    fn new(path: &Path, stat: &ScriptStat) -> Self {
        Self {
            file: path.display().to_string(),
            status: stat.status,
            success: stat.is_success(),
            error: stat.error.clone(),
            events_count: stat.events.len(),
            duration_ms: stat.duration.as_millis() as u64,
            events: stat.events.clone(),
            duration: stat.duration,
        }
    }

    /// Value of the `Success` column
    pub fn success_text(&self) -> &str {
        self.error.as_deref().unwrap_or("yes")
    }
}

/// Point-in-time copy of the run statistics
#[derive(Clone, Debug, Serialize)]
pub struct StatsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub total_files: usize,
    pub failed_files: usize,
    pub elapsed_ms: u64,
    pub scripts: Vec<ScriptReport>,
}

const HEADERS: [&str; 4] = ["File", "Events count", "Success", "Duration"];

impl StatsSnapshot {
    pub fn render(&self) -> String {
        let rows: Vec<[String; 4]> = self
            .scripts
            .iter()
            .map(|s| {
                [
                    s.file.clone(),
                    s.events_count.to_string(),
                    s.success_text().to_string(),
                    format_duration(s.duration),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |cells: [&str; 4]| {
            let mut out = String::new();
            for (i, cell) in cells.iter().enumerate() {
                if i > 0 {
                    out.push_str("  ");
                }
                out.push_str(&format!("{:<width$}", cell, width = widths[i]));
            }
            out.trim_end().to_string()
        };

        let mut output = String::new();
        output.push_str(&line(HEADERS));
        output.push('\n');
        output.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1)));
        output.push('\n');

        for [file, events, success, duration] in &rows {
            let cells = [file.as_str(), events.as_str(), success.as_str(), duration.as_str()];
            output.push_str(&line(cells));
            output.push('\n');
        }

        output.push('\n');
        output.push_str(&format!("Total files: {}\n", self.total_files));
        output.push_str(&format!(
            "Elapsed time: {}\n",
            format_duration(Duration::from_millis(self.elapsed_ms))
        ));

        output
    }
}
