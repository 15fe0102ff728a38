//! Encoding capability
//!
//! Base64 (standard and URL-safe alphabets) and JSON conversion between
//! script values and text.

use base64::engine::general_purpose::{GeneralPurpose, STANDARD, URL_SAFE};
use base64::Engine as _;
use rhai::{Dynamic, EvalAltResult};

use crate::script::{Capability, CapabilityError, Namespace};

/// Base64 and JSON helpers
pub struct Encoding;

fn alphabet(mode: &str) -> GeneralPurpose {
    if mode.eq_ignore_ascii_case("url") {
        URL_SAFE
    } else {
        STANDARD
    }
}

pub fn base64_encode(input: &str, mode: &str) -> String {
    alphabet(mode).encode(input.as_bytes())
}

/// `None` when the input is not valid base64
pub fn base64_decode(input: &str, mode: &str) -> Option<String> {
    alphabet(mode)
        .decode(input.as_bytes())
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn json_encode(value: Dynamic) -> Result<String, Box<EvalAltResult>> {
    let json: serde_json::Value = rhai::serde::from_dynamic(&value)?;
    serde_json::to_string(&json).map_err(|e| e.to_string().into())
}

fn json_decode(input: &str) -> Result<Dynamic, Box<EvalAltResult>> {
    let json: serde_json::Value =
        serde_json::from_str(input).map_err(|e| format!("Wrong JSON: {e}"))?;
    rhai::serde::to_dynamic(json)
}

impl Capability for Encoding {
    fn name(&self) -> &'static str {
        "encoding"
    }

    fn exports(&self) -> &'static [&'static str] {
        &["base64_encode", "base64_decode", "json_encode", "json_decode"]
    }

    fn register(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError> {
        let engine = ns.engine();

        engine.register_fn("base64_encode", |s: &str| base64_encode(s, "std"));
        engine.register_fn("base64_encode", |s: &str, mode: &str| base64_encode(s, mode));
        engine.register_fn("base64_decode", |s: &str| {
            base64_decode(s, "std").map_or(Dynamic::UNIT, Dynamic::from)
        });
        engine.register_fn("base64_decode", |s: &str, mode: &str| {
            base64_decode(s, mode).map_or(Dynamic::UNIT, Dynamic::from)
        });
        engine.register_fn("json_encode", |value: Dynamic| json_encode(value));
        engine.register_fn("json_decode", |s: &str| json_decode(s));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::install;

    #[test]
    fn test_base64_modes() {
        assert_eq!(base64_encode("hello", "std"), "aGVsbG8=");
        assert_eq!(base64_encode("??>", "std"), "Pz8+");
        assert_eq!(base64_encode("??>", "url"), "Pz8-");
        assert_eq!(base64_decode("Pz8-", "url").as_deref(), Some("??>"));
        assert_eq!(base64_decode("%%%", "std"), None);
    }

    #[tokio::test]
    async fn test_invalid_base64_is_unit() {
        let (engine, mut scope) = install(Encoding);
        let result: Dynamic = engine
            .eval_with_scope(&mut scope, r#"base64_decode("not base64!")"#)
            .unwrap();

        assert!(result.is_unit());
    }

    #[tokio::test]
    async fn test_json_round_trip_in_script() {
        let (engine, mut scope) = install(Encoding);
        let name: String = engine
            .eval_with_scope(
                &mut scope,
                r#"
                    let data = json_decode(`{"user": {"name": "ann", "tags": [1, 2]}}`);
                    let text = json_encode(data);
                    json_decode(text).user.name
                "#,
            )
            .unwrap();

        assert_eq!(name, "ann");
    }

    #[tokio::test]
    async fn test_json_decode_error() {
        let (engine, mut scope) = install(Encoding);
        let result = engine.eval_with_scope::<Dynamic>(&mut scope, r#"json_decode("{oops")"#);

        assert!(result.is_err());
    }
}
