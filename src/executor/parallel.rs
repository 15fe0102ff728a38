//! Parallel script execution
//!
//! Admits at most `max_concurrent` scripts at a time, supervises each one in
//! its own task and joins them all before the statistics are handed back.

use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::runner::{ScriptError, ScriptRunner, SessionOutcome};
use crate::results::RunStats;
use crate::utils::Timer;

/// Run-level failures
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("no script files to run")]
    NoWork,
}

/// Parallel script executor
pub struct ParallelExecutor {
    max_concurrent: usize,
    runner: ScriptRunner,
}

impl ParallelExecutor {
    pub fn new(runner: ScriptRunner, max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            runner,
        }
    }

    /// Default width: three admissions per available hardware thread
    pub fn default_concurrency() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get() * 3)
            .unwrap_or(3)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    /// Run every file to a terminal state or until `cancel` fires.
    ///
    /// Files still waiting for admission when `cancel` fires are never
    /// started and do not appear in the statistics.
    pub async fn run(
        &self,
        files: Vec<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<Arc<RunStats>, ExecutorError> {
        if files.is_empty() {
            return Err(ExecutorError::NoWork);
        }

        info!(
            "Running {} scripts (max {} concurrent)",
            files.len(),
            self.max_concurrent
        );

        let timer = Timer::start("run");
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let stats = Arc::new(RunStats::new());

        let total = files.len();
        let mut paths = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);

        for path in files {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                warn!(
                    "Execution cancelled, {} scripts not started",
                    total - handles.len()
                );
                break;
            };

            let runner = self.runner.clone();
            let stats = stats.clone();
            let cancel = cancel.clone();
            let task_path = path.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                debug!("Admitted {}", task_path.display());
                runner.run(&task_path, &cancel).await.record(&stats);
            }));
            paths.push(path);
        }

        for (path, joined) in paths.iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                error!("Supervisor for {} failed: {}", path.display(), e);
                let error = ScriptError::Panicked(e.to_string());
                SessionOutcome::failed(path, Duration::ZERO, error).record(&stats);
            }
        }

        let elapsed = timer.stop();
        stats.record_summary_duration(elapsed);

        info!(
            "Execution completed in {}ms - {} scripts, errors: {}",
            elapsed.as_millis(),
            stats.len(),
            stats.has_errors()
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SessionStatus;
    use tempfile::TempDir;

    fn write_scripts(dir: &TempDir, sources: &[&str]) -> Vec<PathBuf> {
        sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                let path = dir.path().join(format!("script_{i}.rhai"));
                std::fs::write(&path, source).unwrap();
                path
            })
            .collect()
    }

    fn executor(width: usize) -> ParallelExecutor {
        let runner = ScriptRunner::new(crate::capabilities::standard(&Default::default()));
        ParallelExecutor::new(runner, width)
    }

    #[tokio::test]
    async fn test_no_work() {
        let result = executor(2).run(Vec::new(), CancellationToken::new()).await;
        assert!(matches!(result, Err(ExecutorError::NoWork)));
    }

    #[test]
    fn test_width_at_least_one() {
        assert_eq!(executor(0).max_concurrent(), 1);
        assert!(ParallelExecutor::default_concurrency() >= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_script_recorded() {
        let dir = TempDir::new().unwrap();
        let files = write_scripts(&dir, &["let x = 1 + 1;"; 6]);

        let stats = executor(2)
            .run(files.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.len(), 6);
        assert!(!stats.has_errors());
        for file in &files {
            assert_eq!(stats.get(file).unwrap().status, Some(SessionStatus::Completed));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_three_files_width_two() {
        let dir = TempDir::new().unwrap();
        let files = write_scripts(&dir, &["sleep(300);", "sleep(100);", "sleep(100);"]);

        let runner = ScriptRunner::new(crate::capabilities::standard(&Default::default()))
            .with_deadline(Duration::from_secs(5));
        let stats = ParallelExecutor::new(runner, 2)
            .run(files.clone(), CancellationToken::new())
            .await
            .unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_files, 3);
        assert!(snapshot.scripts.iter().all(|s| s.success));

        let slowest = snapshot.scripts.iter().map(|s| s.duration).max().unwrap();
        assert!(stats.elapsed() < slowest * 2);

        let out = stats.render();
        assert_eq!(out.lines().filter(|l| l.contains("script_")).count(), 3);
        assert!(out.contains("Total files: 3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failures_are_isolated() {
        let dir = TempDir::new().unwrap();
        let mut files = write_scripts(
            &dir,
            &[
                r#"push_event("error", "boom");"#,
                "let = ;",
                r#"push_event("info", "fine");"#,
            ],
        );
        files.push(dir.path().join("missing.rhai"));

        let stats = executor(4)
            .run(files.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.len(), 4);
        assert!(stats.has_errors());
        assert!(stats.get(&files[2]).unwrap().is_success());

        let missing = stats.get(&files[3]).unwrap();
        assert_eq!(missing.status, Some(SessionStatus::Failed));
        assert!(missing.events.is_empty());
        assert_eq!(missing.duration, Duration::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_skips_queued_scripts() {
        let dir = TempDir::new().unwrap();
        let files = write_scripts(&dir, &["loop { sleep(100); }"; 5]);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let stats = executor(2).run(files.clone(), cancel).await.unwrap();

        assert_eq!(stats.len(), 2);
        for file in &files[..2] {
            assert_eq!(stats.get(file).unwrap().status, Some(SessionStatus::Cancelled));
        }
        for file in &files[2..] {
            assert!(stats.get(file).is_none());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_error_event_isolated_without_bail() {
        let dir = TempDir::new().unwrap();
        let files = write_scripts(
            &dir,
            &[r#"sleep(100); push_event("error", "fatal");"#, "sleep(400);"],
        );

        let stats = executor(2)
            .run(files.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert!(!stats.get(&files[0]).unwrap().is_success());
        assert!(stats.get(&files[1]).unwrap().is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bail_cancels_siblings() {
        let dir = TempDir::new().unwrap();
        let files = write_scripts(
            &dir,
            &[r#"sleep(100); push_event("error", "fatal");"#, "loop { sleep(50); }"],
        );

        let runner = ScriptRunner::new(crate::capabilities::standard(&Default::default()))
            .with_deadline(Duration::from_secs(20))
            .with_bail(true);
        let stats = ParallelExecutor::new(runner, 2)
            .run(files.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            stats.get(&files[0]).unwrap().error.as_deref(),
            Some("error event received")
        );
        assert_eq!(stats.get(&files[1]).unwrap().status, Some(SessionStatus::Cancelled));
    }
}
