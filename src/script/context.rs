//! Per-session execution context
//!
//! Carries the derived cancellation token, the runtime handle used by
//! blocking host functions, and the interrupt handle shared with the
//! evaluator's progress checkpoint.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cloneable handle for aborting a running script at its next checkpoint
#[derive(Clone, Debug, Default)]
pub struct Interrupter {
    inner: Arc<InterruptState>,
}

#[derive(Debug, Default)]
struct InterruptState {
    reason: OnceLock<String>,
    completed: AtomicBool,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request interruption. The first reason wins; calls made after the
    /// session completed are no-ops.
    ///
    /// Returns `false` when the session had already completed.
    pub fn interrupt(&self, reason: impl Into<String>) -> bool {
        if self.inner.completed.load(Ordering::Acquire) {
            return false;
        }

        let reason = reason.into();
        debug!("Interrupt requested: {}", reason);
        let _ = self.inner.reason.set(reason);
        true
    }

    /// Reason of a pending interrupt, if any
    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.get().map(String::as_str)
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    pub(crate) fn mark_completed(&self) {
        self.inner.completed.store(true, Ordering::Release);
    }
}

/// Everything a capability may need from the session it is registered into
#[derive(Clone, Debug)]
pub struct SessionContext {
    label: String,
    token: CancellationToken,
    handle: Handle,
    interrupter: Interrupter,
}

impl SessionContext {
    /// Create a context bound to the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn new(label: impl Into<String>, token: CancellationToken) -> Self {
        Self::with_handle(label, token, Handle::current())
    }

    pub fn with_handle(label: impl Into<String>, token: CancellationToken, handle: Handle) -> Self {
        Self {
            label: label.into(),
            token,
            handle,
            interrupter: Interrupter::new(),
        }
    }

    /// Script identity used in logs and output prefixes
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn interrupter(&self) -> &Interrupter {
        &self.interrupter
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` to completion from a blocking thread, giving up when the
    /// session context is cancelled.
    ///
    /// Host functions run on the evaluator's thread, never on a runtime
    /// worker, so blocking here is allowed.
    pub fn block_on_cancellable<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        if self.token.is_cancelled() {
            return None;
        }

        let token = self.token.clone();
        self.handle.block_on(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                out = fut => Some(out),
            }
        })
    }
}
