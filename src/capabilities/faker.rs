//! Random test data capability

use rand::seq::IndexedRandom;
use rand::Rng;
use rhai::INT;

use crate::script::{Capability, CapabilityError, Namespace};

const CHARACTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const DEFAULT_STRING_LEN: INT = 16;
const MAX_SAFE_INTEGER: INT = 9_007_199_254_740_991;
const TLDS: &[&str] = &["com", "org", "edu", "gov", "uk", "net", "io"];
const WORDS: &[&str] = &[
    "alpha", "bravo", "cargo", "delta", "ember", "falcon", "garnet", "harbor", "iris", "juniper",
    "kernel", "lumen", "maple", "nectar", "orbit", "pixel", "quartz", "raven", "summit", "tundra",
    "umber", "vector", "willow", "xenon", "yonder", "zephyr",
];

/// `fake_*` generators for booleans, numbers, strings and identifiers
pub struct Faker;

/// Uniform integer in `min..=max`; bounds may be given in any order
pub fn int_between(min: INT, max: INT) -> INT {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    rand::rng().random_range(lo..=hi)
}

pub fn float() -> f64 {
    rand::rng().random_range(-32768.0..32768.0)
}

/// Random character from `pool`, or from the alphanumeric set when empty
pub fn character(pool: &str) -> String {
    let chars: Vec<char> = if pool.is_empty() {
        CHARACTERS.chars().collect()
    } else {
        pool.chars().collect()
    };

    chars
        .choose(&mut rand::rng())
        .map(char::to_string)
        .unwrap_or_default()
}

pub fn string(len: INT) -> String {
    let mut rng = rand::rng();
    let chars = CHARACTERS.as_bytes();

    (0..len.max(0))
        .map(|_| chars[rng.random_range(0..chars.len())] as char)
        .collect()
}

pub fn word() -> String {
    WORDS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("word")
        .to_string()
}

pub fn domain() -> String {
    let tld = TLDS.choose(&mut rand::rng()).copied().unwrap_or("com");
    format!("{}.{}", word(), tld)
}

pub fn email() -> String {
    format!("{}.{}@{}", word(), word(), domain())
}

pub fn hash() -> String {
    hex::encode(rand::rng().random::<[u8; 32]>())
}

impl Capability for Faker {
    fn name(&self) -> &'static str {
        "faker"
    }

    fn exports(&self) -> &'static [&'static str] {
        &[
            "fake_bool",
            "fake_int",
            "fake_float",
            "fake_char",
            "fake_string",
            "fake_word",
            "fake_email",
            "fake_domain",
            "fake_uuid",
            "fake_hash",
        ]
    }

    fn register(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError> {
        let engine = ns.engine();

        engine.register_fn("fake_bool", || rand::rng().random_bool(0.5));
        engine.register_fn("fake_int", || int_between(-MAX_SAFE_INTEGER, MAX_SAFE_INTEGER));
        engine.register_fn("fake_int", |min: INT, max: INT| int_between(min, max));
        engine.register_fn("fake_float", float);
        engine.register_fn("fake_char", || character(""));
        engine.register_fn("fake_char", |pool: &str| character(pool));
        engine.register_fn("fake_string", || string(DEFAULT_STRING_LEN));
        engine.register_fn("fake_string", |len: INT| string(len));
        engine.register_fn("fake_word", word);
        engine.register_fn("fake_email", email);
        engine.register_fn("fake_domain", domain);
        engine.register_fn("fake_uuid", || uuid::Uuid::new_v4().to_string());
        engine.register_fn("fake_hash", hash);

        Ok(())
    }
}
