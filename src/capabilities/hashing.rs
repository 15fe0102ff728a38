//! Hashing capability

use sha2::{Digest, Sha256, Sha512};

use crate::script::{Capability, CapabilityError, Namespace};

/// `sha256(s)` and `sha512(s)`, returning lowercase hex
pub struct Hashing;

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

pub fn sha512_hex(input: &str) -> String {
    hex::encode(Sha512::digest(input.as_bytes()))
}

impl Capability for Hashing {
    fn name(&self) -> &'static str {
        "hashing"
    }

    fn exports(&self) -> &'static [&'static str] {
        &["sha256", "sha512"]
    }

    fn register(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError> {
        let engine = ns.engine();
        engine.register_fn("sha256", |s: &str| sha256_hex(s));
        engine.register_fn("sha512", |s: &str| sha512_hex(s));
        Ok(())
    }
}
