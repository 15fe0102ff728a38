//! Output formatting module
//!
//! Provides the output formats for run results.

mod formatter;

pub use formatter::{colors_enabled, OutputError, OutputFormat, ResultFormatter};
