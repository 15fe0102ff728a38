//! Script file discovery
//!
//! Resolves command-line arguments into an ordered, deduplicated list of
//! absolute script paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Extension of script files picked up from directories
pub const SCRIPT_EXTENSION: &str = "rhai";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("cannot resolve path {path}: {reason}")]
    Resolve { path: String, reason: String },

    #[error("no script files found for: {}", .0.join(", "))]
    NoFiles(Vec<String>),
}

/// Glob pattern for an argument: directories expand to every script below them
fn pattern_for(arg: &str) -> String {
    let path = Path::new(arg);
    if path.is_dir() {
        format!(
            "{}/**/*.{}",
            arg.trim_end_matches(['/', '\\']),
            SCRIPT_EXTENSION
        )
    } else {
        arg.to_string()
    }
}

/// Expand one pattern into sorted file paths
fn expand(arg: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let pattern = pattern_for(arg);
    debug!("Expanding {}", pattern);

    let entries = glob::glob(&pattern).map_err(|e| DiscoveryError::InvalidPattern {
        pattern: pattern.clone(),
        reason: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry: {}", e),
        }
    }

    files.sort();
    Ok(files)
}

/// Resolve patterns and directories into script files.
///
/// Argument order is kept, matches of one argument are sorted, and a file
/// matched twice is only listed once.
pub fn discover<S: AsRef<str>>(args: &[S]) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for arg in args {
        for path in expand(arg.as_ref())? {
            let path = std::path::absolute(&path).map_err(|e| DiscoveryError::Resolve {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    if files.is_empty() {
        return Err(DiscoveryError::NoFiles(
            args.iter().map(|a| a.as_ref().to_string()).collect(),
        ));
    }

    debug!("Discovered {} script files", files.len());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("b.rhai"), "1;").unwrap();
        fs::write(dir.path().join("a.rhai"), "1;").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join("nested/deeper/c.rhai"), "1;").unwrap();
        dir
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_directory_expands_recursively() {
        let dir = tree();
        let files = discover(&[dir.path().to_string_lossy()]).unwrap();

        assert_eq!(names(&files), vec!["a.rhai", "b.rhai", "c.rhai"]);
        assert!(files.iter().all(|f| f.is_absolute()));
    }

    #[test]
    fn test_glob_and_dedup_keep_argument_order() {
        let dir = tree();
        let root = dir.path().display().to_string();

        let files = discover(&[
            format!("{root}/b.rhai"),
            format!("{root}/*.rhai"),
            format!("{root}/**/c.rhai"),
        ])
        .unwrap();

        assert_eq!(names(&files), vec!["b.rhai", "a.rhai", "c.rhai"]);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = discover(&["[unclosed"]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPattern { .. }));
    }

    #[test]
    fn test_no_files() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*.rhai", dir.path().display());

        let err = discover(&[pattern.as_str()]).unwrap_err();
        assert!(matches!(err, DiscoveryError::NoFiles(_)));
        assert!(err.to_string().contains(&pattern));
    }
}
