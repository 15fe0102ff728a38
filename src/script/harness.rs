//! In-script test harness
//!
//! Scripts queue `describe`/`test` blocks and lifecycle hooks while the
//! body executes; the queue is run after the body as a post-run hook.

use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, AST};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Global names installed by the harness
pub const HARNESS_EXPORTS: &[&str] = &[
    "test",
    "it",
    "describe",
    "before_all",
    "before_each",
    "after_each",
    "after_all",
];

#[derive(Default)]
struct Queues {
    describes: VecDeque<(String, FnPtr)>,
    tests: VecDeque<(String, FnPtr)>,
    before_all: VecDeque<FnPtr>,
    before_each: Vec<FnPtr>,
    after_each: Vec<FnPtr>,
    after_all: VecDeque<FnPtr>,
}

/// Shared test queue of one session
#[derive(Clone, Default)]
pub struct TestHarness {
    queues: Arc<Mutex<Queues>>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `test`, `it`, `describe` and the lifecycle hooks
    pub fn install(&self, engine: &mut Engine) {
        let q = self.queues.clone();
        engine.register_fn("test", move |name: &str, f: FnPtr| {
            q.lock().tests.push_back((name.to_string(), f));
        });

        let q = self.queues.clone();
        engine.register_fn("it", move |name: &str, f: FnPtr| {
            q.lock().tests.push_back((name.to_string(), f));
        });

        let q = self.queues.clone();
        engine.register_fn("describe", move |name: &str, f: FnPtr| {
            q.lock().describes.push_back((name.to_string(), f));
        });

        let q = self.queues.clone();
        engine.register_fn("before_all", move |f: FnPtr| q.lock().before_all.push_back(f));

        let q = self.queues.clone();
        engine.register_fn("before_each", move |f: FnPtr| q.lock().before_each.push(f));

        let q = self.queues.clone();
        engine.register_fn("after_each", move |f: FnPtr| q.lock().after_each.push(f));

        let q = self.queues.clone();
        engine.register_fn("after_all", move |f: FnPtr| q.lock().after_all.push_back(f));
    }

    pub fn pending_tests(&self) -> usize {
        self.queues.lock().tests.len()
    }

    /// Run everything queued so far.
    ///
    /// Describe blocks run first and may enqueue more tests and describe
    /// blocks. The lock is never held while a script callback runs.
    pub fn run(&self, engine: &Engine, ast: &AST) -> Result<(), Box<EvalAltResult>> {
        loop {
            while let Some((name, f)) = self.pop(|q| q.describes.pop_front()) {
                debug!("describe: {}", name);
                f.call::<Dynamic>(engine, ast, ())?;
            }

            if self.pending_tests() > 0 {
                while let Some(f) = self.pop(|q| q.before_all.pop_front()) {
                    f.call::<Dynamic>(engine, ast, ())?;
                }

                while let Some((name, f)) = self.pop(|q| q.tests.pop_front()) {
                    debug!("test: {}", name);

                    let before_each = self.queues.lock().before_each.clone();
                    for hook in before_each {
                        hook.call::<Dynamic>(engine, ast, (name.clone(),))?;
                    }

                    f.call::<Dynamic>(engine, ast, ())?;

                    let after_each = self.queues.lock().after_each.clone();
                    for hook in after_each {
                        hook.call::<Dynamic>(engine, ast, (name.clone(),))?;
                    }
                }

                while let Some(f) = self.pop(|q| q.after_all.pop_front()) {
                    f.call::<Dynamic>(engine, ast, ())?;
                }
            }

            if self.queues.lock().describes.is_empty() {
                return Ok(());
            }
        }
    }

    fn pop<T>(&self, f: impl FnOnce(&mut Queues) -> Option<T>) -> Option<T> {
        f(&mut self.queues.lock())
    }
}
