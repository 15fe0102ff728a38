//! Script session supervisor
//!
//! Runs one script file to a terminal state: reads the source, creates a
//! session, drains its events, arms the watchdog and classifies the result.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::results::RunStats;
use crate::script::{CapabilitySet, Interrupter, RuntimeEvent, Session, SessionContext, SessionError};
use crate::utils::Timer;

/// Interrupt reason used by the draining task on an error-level event
pub const ERROR_EVENT_REASON: &str = "error event received";

/// Interrupt reason used when the whole run is cancelled
pub const CANCELLED_REASON: &str = "execution cancelled";

/// Terminal state of one script
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    TimedOut,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Completed => "completed",
            SessionStatus::TimedOut => "timed_out",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-script failures. None of them affect sibling scripts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("failed to read script: {0}")]
    Read(String),

    #[error("session creation failed: {0}")]
    SessionCreation(SessionError),

    #[error("{0}")]
    Runtime(SessionError),

    #[error("{}", ERROR_EVENT_REASON)]
    ErrorEvent,

    #[error("script execution time exceeded ({})", humanize(.0))]
    Timeout(Duration),

    #[error("{}", CANCELLED_REASON)]
    Cancelled,

    #[error("script panicked: {0}")]
    Panicked(String),
}

fn humanize(duration: &Duration) -> String {
    humantime::format_duration(*duration).to_string()
}

impl ScriptError {
    pub fn status(&self) -> SessionStatus {
        match self {
            ScriptError::Timeout(_) => SessionStatus::TimedOut,
            ScriptError::Cancelled => SessionStatus::Cancelled,
            _ => SessionStatus::Failed,
        }
    }
}

/// Result of supervising one script
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub path: PathBuf,
    pub status: SessionStatus,
    pub duration: Duration,
    pub error: Option<ScriptError>,
    pub events: Vec<RuntimeEvent>,
}

impl SessionOutcome {
    fn new(path: &Path, duration: Duration, error: Option<ScriptError>, events: Vec<RuntimeEvent>) -> Self {
        let status = error
            .as_ref()
            .map_or(SessionStatus::Completed, ScriptError::status);

        Self {
            path: path.to_path_buf(),
            status,
            duration,
            error,
            events,
        }
    }

    pub fn failed(path: &Path, duration: Duration, error: ScriptError) -> Self {
        Self::new(path, duration, Some(error), Vec::new())
    }

    /// Write every field of this outcome into the aggregator
    pub fn record(self, stats: &RunStats) {
        stats.record_duration(&self.path, self.duration);
        stats.record_status(&self.path, self.status);
        if let Some(error) = &self.error {
            stats.record_error(&self.path, error);
        }
        stats.record_events(&self.path, self.events);
    }
}

/// What stopped a session before its natural end. Set at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StopCause {
    ErrorEvent,
    Deadline,
    Cancelled,
}

/// Runs a single script under a deadline and fail-fast policy
#[derive(Clone, Debug)]
pub struct ScriptRunner {
    capabilities: CapabilitySet,
    deadline: Option<Duration>,
    bail: bool,
}

impl ScriptRunner {
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities,
            deadline: None,
            bail: false,
        }
    }

    /// Maximum execution time per script
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancel the whole run on the first error-level event
    pub fn with_bail(mut self, bail: bool) -> Self {
        self.bail = bail;
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Supervise one script to a terminal state. Never fails; every problem
    /// is reported in the outcome.
    pub async fn run(&self, path: &Path, global: &CancellationToken) -> SessionOutcome {
        let label = script_label(path);

        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                return SessionOutcome::failed(path, Duration::ZERO, ScriptError::Read(e.to_string()));
            }
        };

        info!("Running {}", label);
        let timer = Timer::start(label.as_str());

        let token = global.child_token();
        let context = SessionContext::new(label.clone(), token.clone());
        let interrupter = context.interrupter().clone();

        let mut session = match Session::create(context, &self.capabilities) {
            Ok(session) => session,
            Err(e) => {
                warn!("Session creation failed for {}: {}", label, e);
                return SessionOutcome::failed(path, timer.stop(), ScriptError::SessionCreation(e));
            }
        };

        let stop = Arc::new(OnceLock::new());

        let drainer = tokio::spawn(drain_events(
            session.take_events(),
            token.clone(),
            interrupter.clone(),
            stop.clone(),
            self.bail.then(|| global.clone()),
        ));

        let guard = tokio::spawn(watchdog(
            self.deadline,
            token.clone(),
            global.clone(),
            interrupter,
            stop.clone(),
        ));

        let name = label.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let result = session.run(&name, &source);
            session.close();
            result
        })
        .await;

        let events = drainer.await.unwrap_or_else(|e| {
            warn!("Event drain for {} failed: {}", label, e);
            Vec::new()
        });
        guard.abort();

        let duration = timer.stop();

        let error = match (joined, stop.get().copied()) {
            (Err(e), _) => Some(ScriptError::Panicked(e.to_string())),
            (_, Some(StopCause::ErrorEvent)) => Some(ScriptError::ErrorEvent),
            (_, Some(StopCause::Deadline)) => {
                Some(ScriptError::Timeout(self.deadline.unwrap_or_default()))
            }
            (_, Some(StopCause::Cancelled)) => Some(ScriptError::Cancelled),
            (Ok(Ok(())), None) => None,
            (Ok(Err(e)), None) => Some(ScriptError::Runtime(e)),
        };

        let outcome = SessionOutcome::new(path, duration, error, events);

        match &outcome.error {
            None => info!("{} completed in {}ms", label, duration.as_millis()),
            Some(e) => warn!("{} {}: {}", label, outcome.status, e),
        }

        outcome
    }
}

/// Receive events until the channel closes or the session is cancelled.
///
/// The only place allowed to stop a session because of event content.
async fn drain_events(
    events: Option<mpsc::Receiver<RuntimeEvent>>,
    token: CancellationToken,
    interrupter: Interrupter,
    stop: Arc<OnceLock<StopCause>>,
    global: Option<CancellationToken>,
) -> Vec<RuntimeEvent> {
    let mut buffer = Vec::new();
    let Some(mut rx) = events else {
        return buffer;
    };

    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let fatal = event.level.is_error();
        debug!("Event: {}", event);
        buffer.push(event);

        if fatal {
            let _ = stop.set(StopCause::ErrorEvent);
            interrupter.interrupt(ERROR_EVENT_REASON);
            token.cancel();
            if let Some(global) = &global {
                info!("Error event received, cancelling remaining scripts");
                global.cancel();
            }
            break;
        }
    }

    buffer
}

/// Enforce the deadline and forward global cancellation as an interrupt
async fn watchdog(
    deadline: Option<Duration>,
    token: CancellationToken,
    global: CancellationToken,
    interrupter: Interrupter,
    stop: Arc<OnceLock<StopCause>>,
) {
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = global.cancelled() => {
            if interrupter.interrupt(CANCELLED_REASON) {
                let _ = stop.set(StopCause::Cancelled);
            }
        }
        _ = token.cancelled() => {}
        _ = expired => {
            let reason = ScriptError::Timeout(deadline.unwrap_or_default()).to_string();
            if interrupter.interrupt(reason) {
                let _ = stop.set(StopCause::Deadline);
            }
            token.cancel();
        }
    }
}

/// Short name used in logs and output prefixes
pub fn script_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Capability, CapabilityError, EventLevel, Namespace};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn script(source: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".rhai").tempfile().unwrap();
        file.write_all(source.as_bytes()).unwrap();
        file
    }

    fn runner() -> ScriptRunner {
        ScriptRunner::new(crate::capabilities::standard(&Default::default()))
    }

    struct Explode;

    impl Capability for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn exports(&self) -> &'static [&'static str] {
            &["explode"]
        }

        fn register(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError> {
            ns.engine().register_fn("explode", || -> i64 { panic!("kaboom") });
            Ok(())
        }
    }

    #[test]
    fn test_timeout_message_names_deadline() {
        let err = ScriptError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "script execution time exceeded (1s 500ms)");
        assert_eq!(err.status(), SessionStatus::TimedOut);
        assert_eq!(ScriptError::ErrorEvent.status(), SessionStatus::Failed);
    }

    #[test]
    fn test_script_label() {
        assert_eq!(script_label(Path::new("/tmp/a/b.rhai")), "b.rhai");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_completed_with_ordered_events() {
        let file = script(
            r#"
                push_event(#{ level: "info", message: "E1" });
                push_event("warning", "E2");
                push_event(#{ level: "debug", message: "E3", error: 7 });
            "#,
        );

        let outcome = runner().run(file.path(), &CancellationToken::new()).await;

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert!(outcome.error.is_none());
        assert_eq!(
            outcome.events,
            vec![
                RuntimeEvent::new(EventLevel::Info, "E1"),
                RuntimeEvent::new(EventLevel::Warning, "E2"),
                RuntimeEvent::new(EventLevel::Debug, "E3").with_error("7"),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_read_error_has_zero_duration() {
        let path = Path::new("/definitely/not/here.rhai");
        let outcome = runner().run(path, &CancellationToken::new()).await;

        assert_eq!(outcome.status, SessionStatus::Failed);
        assert_eq!(outcome.duration, Duration::ZERO);
        assert!(outcome.events.is_empty());
        assert!(matches!(outcome.error, Some(ScriptError::Read(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_immediate_error_event() {
        let file = script(r#"push_event(#{ level: "error", message: "boom" });"#);
        let deadline = Duration::from_secs(5);

        let outcome = runner()
            .with_deadline(deadline)
            .run(file.path(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, SessionStatus::Failed);
        assert_eq!(outcome.error, Some(ScriptError::ErrorEvent));
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].level, EventLevel::Error);
        assert_eq!(outcome.events[0].message, "boom");
        assert!(outcome.duration < deadline);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_error_event_stops_long_script_early() {
        let file = script(
            r#"
                push_event("error", "fatal");
                sleep(30000);
                loop { sleep(100); }
            "#,
        );
        let deadline = Duration::from_secs(20);

        let outcome = runner()
            .with_deadline(deadline)
            .run(file.path(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.error, Some(ScriptError::ErrorEvent));
        assert!(outcome.duration < deadline);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_exceeded() {
        let file = script("loop { sleep(20); }");
        let deadline = Duration::from_millis(300);

        let outcome = runner()
            .with_deadline(deadline)
            .run(file.path(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, SessionStatus::TimedOut);
        assert!(outcome.events.is_empty());
        assert!(outcome.duration >= deadline);

        let message = outcome.error.unwrap().to_string();
        assert!(message.contains("300ms"), "{message}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_global_cancel_winds_down() {
        let file = script("loop { sleep(100); }");
        let global = CancellationToken::new();

        let canceller = global.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let outcome = runner().run(file.path(), &global).await;

        assert_eq!(outcome.status, SessionStatus::Cancelled);
        assert_eq!(outcome.error.unwrap().to_string(), CANCELLED_REASON);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_during_final_host_call() {
        let file = script("sleep(5000);");
        let deadline = Duration::from_millis(300);

        let outcome = runner()
            .with_deadline(deadline)
            .run(file.path(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, SessionStatus::TimedOut);
        assert_eq!(outcome.error, Some(ScriptError::Timeout(deadline)));
        assert!(outcome.duration < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_global_cancel_during_final_host_call() {
        let file = script("sleep(5000);");
        let global = CancellationToken::new();

        let canceller = global.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let outcome = runner().run(file.path(), &global).await;

        assert_eq!(outcome.status, SessionStatus::Cancelled);
        assert_eq!(outcome.error, Some(ScriptError::Cancelled));
        assert!(outcome.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_watchdog_ignores_finished_session() {
        let interrupter = Interrupter::new();
        interrupter.mark_completed();
        let token = CancellationToken::new();
        let stop = Arc::new(OnceLock::new());

        watchdog(
            Some(Duration::from_millis(10)),
            token.clone(),
            CancellationToken::new(),
            interrupter.clone(),
            stop.clone(),
        )
        .await;

        assert!(stop.get().is_none());
        assert!(!interrupter.is_interrupted());
        assert!(token.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runtime_and_compile_errors_fail() {
        let runtime = script("let x = 1; x.no_such_method();");
        let outcome = runner().run(runtime.path(), &CancellationToken::new()).await;
        assert_eq!(outcome.status, SessionStatus::Failed);
        assert!(matches!(outcome.error, Some(ScriptError::Runtime(SessionError::Runtime(_)))));

        let compile = script("let = ;");
        let outcome = runner().run(compile.path(), &CancellationToken::new()).await;
        assert!(matches!(outcome.error, Some(ScriptError::Runtime(SessionError::Compile { .. }))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_creation_failure() {
        let file = script("1;");
        let set = CapabilitySet::new().with(Explode).with(Explode);

        let outcome = ScriptRunner::new(set)
            .run(file.path(), &CancellationToken::new())
            .await;

        assert!(matches!(outcome.error, Some(ScriptError::SessionCreation(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_is_isolated() {
        let file = script(r#"push_event("info", "before"); explode();"#);
        let set = CapabilitySet::new().with(Explode);

        let outcome = ScriptRunner::new(set)
            .run(file.path(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, SessionStatus::Failed);
        assert!(matches!(outcome.error, Some(ScriptError::Panicked(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_record_into_stats() {
        let file = script(r#"push_event("info", "one");"#);
        let outcome = runner().run(file.path(), &CancellationToken::new()).await;

        let stats = RunStats::new();
        outcome.record(&stats);

        let stat = stats.get(file.path()).unwrap();
        assert_eq!(stat.status, Some(SessionStatus::Completed));
        assert_eq!(stat.events.len(), 1);
        assert!(stat.error.is_none());
    }
}
