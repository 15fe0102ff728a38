//! Console capability: script logging routed into `tracing`

use rhai::Dynamic;
use tracing::{debug, error, info, warn};

use crate::script::{Capability, CapabilityError, Namespace};

/// `log_debug`, `log_info`, `log_warn`, `log_error`
pub struct Console;

impl Capability for Console {
    fn name(&self) -> &'static str {
        "console"
    }

    fn exports(&self) -> &'static [&'static str] {
        &["log_debug", "log_info", "log_warn", "log_error"]
    }

    fn register(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError> {
        let file = ns.context().label().to_string();
        let engine = ns.engine();

        let f = file.clone();
        engine.register_fn("log_debug", move |msg: Dynamic| debug!(file = %f, "{}", msg));
        let f = file.clone();
        engine.register_fn("log_info", move |msg: Dynamic| info!(file = %f, "{}", msg));
        let f = file.clone();
        engine.register_fn("log_warn", move |msg: Dynamic| warn!(file = %f, "{}", msg));
        engine.register_fn("log_error", move |msg: Dynamic| error!(file = %file, "{}", msg));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::install;

    #[tokio::test]
    async fn test_logging_accepts_any_value() {
        let (engine, mut scope) = install(Console);
        engine
            .run_with_scope(
                &mut scope,
                r#"
                    log_debug("text");
                    log_info(42);
                    log_warn(#{ a: 1 });
                    log_error([1, 2, 3]);
                "#,
            )
            .unwrap();
    }
}
