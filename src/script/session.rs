//! Interpreter session
//!
//! Wraps one Rhai engine bound to a single script. The session owns the
//! outbound event channel: scripts push through `push_event`, the owner
//! drains the receiver and closes the session once `run` has returned.

use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Map, Scope, AST};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::capability::{CapabilityError, CapabilitySet, Namespace};
use super::context::{Interrupter, SessionContext};
use super::event::{EventLevel, RuntimeEvent};
use super::harness::{TestHarness, HARNESS_EXPORTS};

/// Bounded capacity of the per-session event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Global names owned by the session itself
pub const SESSION_EXPORTS: &[&str] = &["push_event", "interrupt"];

/// Name of the optional script function called after the body
pub const INIT_HOOK: &str = "init";

const PRELUDE: &str = include_str!("prelude.rhai");

/// Session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("prelude failed to compile: {0}")]
    Prelude(String),

    #[error("{name}: {message}")]
    Compile { name: String, message: String },

    #[error("{0}")]
    Runtime(String),

    #[error("{0}")]
    Interrupted(String),
}

/// Sending half of the event channel, closable exactly once
#[derive(Clone)]
struct EventSink {
    tx: Arc<Mutex<Option<mpsc::Sender<RuntimeEvent>>>>,
}

impl EventSink {
    fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Blocking send. Gives up when the session context is cancelled or
    /// the channel is closed.
    fn push(&self, ctx: &SessionContext, event: RuntimeEvent) -> bool {
        let Some(tx) = self.tx.lock().clone() else {
            debug!("Event dropped, session closed: {}", event);
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => false,
            Err(TrySendError::Full(event)) => ctx
                .block_on_cancellable(tx.send(event))
                .is_some_and(|sent| sent.is_ok()),
        }
    }

    /// Returns `true` only for the call that actually closed the channel
    fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }
}

/// One isolated script execution context
pub struct Session {
    engine: Engine,
    scope: Scope<'static>,
    prelude: AST,
    context: SessionContext,
    sink: EventSink,
    events: Option<mpsc::Receiver<RuntimeEvent>>,
    harness: TestHarness,
}

impl Session {
    /// Create a session and register every capability into it.
    ///
    /// On failure the session is closed before the error is returned.
    pub fn create(context: SessionContext, capabilities: &CapabilitySet) -> Result<Self, SessionError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut session = Self {
            engine: Engine::new(),
            scope: Scope::new(),
            prelude: AST::empty(),
            context,
            sink: EventSink::new(tx),
            events: Some(rx),
            harness: TestHarness::new(),
        };

        if let Err(err) = session.install(capabilities) {
            session.close();
            return Err(err);
        }

        Ok(session)
    }

    fn install(&mut self, capabilities: &CapabilitySet) -> Result<(), SessionError> {
        let interrupter = self.context.interrupter().clone();
        self.engine
            .on_progress(move |_| interrupter.reason().map(|r| Dynamic::from(r.to_string())));

        let (sink, ctx) = (self.sink.clone(), self.context.clone());
        self.engine.register_fn("push_event", move |event: Map| {
            sink.push(&ctx, RuntimeEvent::from_map(&event));
        });

        let (sink, ctx) = (self.sink.clone(), self.context.clone());
        self.engine
            .register_fn("push_event", move |level: &str, message: &str| {
                let level = EventLevel::from_str(level).unwrap_or_default();
                sink.push(&ctx, RuntimeEvent::new(level, message));
            });

        let interrupter = self.context.interrupter().clone();
        self.engine.register_fn("interrupt", move || {
            interrupter.interrupt("interrupted by the script");
        });

        let interrupter = self.context.interrupter().clone();
        self.engine.register_fn("interrupt", move |reason: &str| {
            interrupter.interrupt(reason);
        });

        self.harness.install(&mut self.engine);

        let mut owners = HashMap::new();
        let mut ns = Namespace::new(&mut self.engine, &mut self.scope, &self.context, &mut owners);
        ns.set_owner("session");
        ns.claim(SESSION_EXPORTS)?;
        ns.claim(HARNESS_EXPORTS)?;
        capabilities.register_all(&mut ns)?;

        self.prelude = self
            .engine
            .compile(PRELUDE)
            .map_err(|e| SessionError::Prelude(e.to_string()))?;

        debug!(
            "Session created for {} ({} capabilities)",
            self.context.label(),
            capabilities.len()
        );

        Ok(())
    }

    /// Take the receiving half of the event channel. Returns `None` after
    /// the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<RuntimeEvent>> {
        self.events.take()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Handle that can interrupt this session from any thread
    pub fn interrupter(&self) -> Interrupter {
        self.context.interrupter().clone()
    }

    /// Abort execution at the next checkpoint; `run` then fails with `reason`
    pub fn interrupt(&self, reason: impl Into<String>) {
        self.context.interrupter().interrupt(reason);
    }

    /// Execute the script, then the queued tests and the `init` hook.
    ///
    /// Blocks the calling thread until the script ends or is interrupted.
    pub fn run(&mut self, name: &str, source: &str) -> Result<(), SessionError> {
        let result = self.execute(name, source);
        self.context.interrupter().mark_completed();
        result
    }

    fn execute(&mut self, name: &str, source: &str) -> Result<(), SessionError> {
        let mut script = self
            .engine
            .compile(source)
            .map_err(|e| SessionError::Compile {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        script.set_source(name);

        let ast = self.prelude.merge(&script);

        self.engine
            .run_ast_with_scope(&mut self.scope, &ast)
            .map_err(eval_error)?;

        self.harness.run(&self.engine, &ast).map_err(eval_error)?;

        let has_init = ast
            .iter_functions()
            .any(|f| f.name == INIT_HOOK && f.params.is_empty());

        if has_init {
            FnPtr::new(INIT_HOOK)
                .and_then(|hook| hook.call::<Dynamic>(&self.engine, &ast, ()))
                .map_err(|e| match eval_error(e) {
                    SessionError::Runtime(msg) => {
                        SessionError::Runtime(format!("{INIT_HOOK}() calling failed: {msg}"))
                    }
                    other => other,
                })?;
        }

        Ok(())
    }

    /// Close the event channel. Safe to call any number of times.
    pub fn close(&self) {
        if self.sink.close() {
            debug!("Session closed for {}", self.context.label());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map an evaluator error, surfacing interrupts raised in nested calls
fn eval_error(err: Box<EvalAltResult>) -> SessionError {
    let message = err.to_string();
    let mut current = *err;

    loop {
        match current {
            EvalAltResult::ErrorTerminated(reason, _) => {
                return SessionError::Interrupted(reason.to_string());
            }
            EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
            | EvalAltResult::ErrorInModule(_, inner, _) => current = *inner,
            _ => {
                warn!("Script error: {}", message);
                return SessionError::Runtime(message);
            }
        }
    }
}
