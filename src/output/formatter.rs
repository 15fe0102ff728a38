//! Output formatters for run results
//!
//! Provides table, JSON and CSV renderings of the run statistics.

use serde::Serialize;
use std::io::IsTerminal;
use thiserror::Error;

use crate::results::{ScriptReport, StatsSnapshot};

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    JsonPretty,
    Csv,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::JsonPretty => "json-pretty",
            OutputFormat::Csv => "csv",
        }
    }
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output is not valid UTF-8")]
    Utf8,
}

/// Flat CSV row; events are reduced to their count
#[derive(Serialize)]
struct CsvRow<'a> {
    file: &'a str,
    status: &'a str,
    success: bool,
    events: usize,
    duration_ms: u64,
    error: &'a str,
}

impl<'a> From<&'a ScriptReport> for CsvRow<'a> {
    fn from(report: &'a ScriptReport) -> Self {
        Self {
            file: &report.file,
            status: report.status.as_ref().map_or("", |s| s.as_str()),
            success: report.success,
            events: report.events_count,
            duration_ms: report.duration_ms,
            error: report.error.as_deref().unwrap_or(""),
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render the whole run
    pub fn format_stats(&self, snapshot: &StatsSnapshot) -> Result<String, OutputError> {
        match self.format {
            OutputFormat::Table => Ok(snapshot.render()),
            OutputFormat::Json => Ok(serde_json::to_string(snapshot)?),
            OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(snapshot)?),
            OutputFormat::Csv => format_csv(snapshot),
        }
    }
}

fn format_csv(snapshot: &StatsSnapshot) -> Result<String, OutputError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for report in &snapshot.scripts {
        writer.serialize(CsvRow::from(report))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| OutputError::Csv(e.into_error().into()))?;
    String::from_utf8(bytes).map_err(|_| OutputError::Utf8)
}

/// Whether colored output should be used, given the environment
pub fn colors_enabled() -> bool {
    color_choice(
        std::env::var_os("NO_COLOR").is_some(),
        std::env::var_os("FORCE_COLOR").is_some(),
        std::env::var("TERM").ok().as_deref(),
        std::io::stdout().is_terminal(),
    )
}

fn color_choice(no_color: bool, force: bool, term: Option<&str>, tty: bool) -> bool {
    if no_color {
        return false;
    }
    if force {
        return true;
    }
    tty && term != Some("dumb")
}
