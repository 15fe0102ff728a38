//! Standard output capability
//!
//! Script `print`/`debug` output and `eprint` go to stdout/stderr with the
//! script name prefixed to every line, so output of concurrent scripts
//! stays attributable.

use rhai::Dynamic;
use std::io::Write;

use crate::script::{Capability, CapabilityError, Namespace};
use crate::utils::LogLevel;

/// `print` / `debug` hooks, `eprint(v)` and `log_level()`
pub struct Io {
    log_level: LogLevel,
    colorize: bool,
}

impl Io {
    pub fn new(log_level: LogLevel, colorize: bool) -> Self {
        Self {
            log_level,
            colorize,
        }
    }
}

/// Prefix every line of `text`; the result always ends with a newline
pub fn prefix_lines(prefix: &str, text: &str) -> String {
    let mut out = String::with_capacity(text.len() + prefix.len());
    for line in text.lines() {
        out.push_str(prefix);
        out.push_str(line);
        out.push('\n');
    }
    if out.is_empty() {
        out.push_str(prefix);
        out.push('\n');
    }
    out
}

fn make_prefix(label: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[37m{label}:\x1b[0m ")
    } else {
        format!("{label}: ")
    }
}

impl Capability for Io {
    fn name(&self) -> &'static str {
        "io"
    }

    fn exports(&self) -> &'static [&'static str] {
        &["eprint", "log_level"]
    }

    fn register(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError> {
        let prefix = make_prefix(ns.context().label(), self.colorize);
        let level = self.log_level.as_script_str();
        let engine = ns.engine();

        let p = prefix.clone();
        engine.on_print(move |text| {
            let _ = std::io::stdout().lock().write_all(prefix_lines(&p, text).as_bytes());
        });

        let p = prefix.clone();
        engine.on_debug(move |text, _source, pos| {
            let text = if pos.is_none() {
                text.to_string()
            } else {
                format!("{text} @ {pos}")
            };
            let _ = std::io::stdout().lock().write_all(prefix_lines(&p, &text).as_bytes());
        });

        engine.register_fn("eprint", move |value: Dynamic| {
            let text = value.to_string();
            let _ = std::io::stderr()
                .lock()
                .write_all(prefix_lines(&prefix, &text).as_bytes());
        });

        engine.register_fn("log_level", move || level.to_string());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::install;

    #[test]
    fn test_prefix_lines() {
        assert_eq!(prefix_lines("a.rhai: ", "one\ntwo"), "a.rhai: one\na.rhai: two\n");
        assert_eq!(prefix_lines("a.rhai: ", "one\n"), "a.rhai: one\n");
        assert_eq!(prefix_lines("a.rhai: ", ""), "a.rhai: \n");
    }

    #[test]
    fn test_make_prefix() {
        assert_eq!(make_prefix("x", false), "x: ");
        assert!(make_prefix("x", true).starts_with("\x1b[37m"));
    }

    #[tokio::test]
    async fn test_log_level_surface() {
        let (engine, mut scope) = install(Io::new(LogLevel::Warn, false));
        let level: String = engine.eval_with_scope(&mut scope, "log_level()").unwrap();
        assert_eq!(level, "warning");

        engine
            .run_with_scope(&mut scope, r#"print("hello"); eprint(1);"#)
            .unwrap();
    }
}
