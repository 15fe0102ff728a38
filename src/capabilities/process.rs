//! Process capability
//!
//! Environment snapshot and cancellable delays.

use rhai::{Dynamic, Map, INT};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::script::{Capability, CapabilityError, Namespace};

/// `ENV`, `env(name)`, `env_vars()`, `sleep(ms)`, `script_name()`
pub struct Process {
    env: BTreeMap<String, String>,
}

impl Process {
    /// Snapshot the current process environment
    pub fn from_env() -> Self {
        Self::with_env(std::env::vars())
    }

    pub fn with_env(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            env: vars.into_iter().collect(),
        }
    }

    fn env_map(&self) -> Map {
        self.env
            .iter()
            .map(|(k, v)| (k.as_str().into(), Dynamic::from(v.clone())))
            .collect()
    }
}

impl Capability for Process {
    fn name(&self) -> &'static str {
        "process"
    }

    fn exports(&self) -> &'static [&'static str] {
        &["ENV", "env", "env_vars", "sleep", "script_name"]
    }

    fn register(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError> {
        let env_map = self.env_map();
        ns.set_constant("ENV", Dynamic::from_map(env_map.clone()))?;

        let ctx = ns.context().clone();
        let label = ctx.label().to_string();
        let env = self.env.clone();
        let engine = ns.engine();

        engine.register_fn("env", move |name: &str| {
            env.get(name)
                .map_or(Dynamic::UNIT, |v| Dynamic::from(v.clone()))
        });
        engine.register_fn("env_vars", move || env_map.clone());
        engine.register_fn("script_name", move || label.clone());

        // Returns early once the session is cancelled
        engine.register_fn("sleep", move |ms: INT| {
            if ms > 0 {
                let _ = ctx.block_on_cancellable(tokio::time::sleep(Duration::from_millis(
                    ms as u64,
                )));
            }
        });

        Ok(())
    }
}
