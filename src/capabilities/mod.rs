//! Standard host capabilities
//!
//! Every capability installs its functions through the [`Capability`]
//! contract; the runner injects the set built by [`standard`].

mod console;
mod encoding;
mod faker;
mod fetch;
mod hashing;
mod io;
mod process;

pub use console::Console;
pub use encoding::Encoding;
pub use faker::Faker;
pub use fetch::Fetch;
pub use hashing::Hashing;
pub use io::Io;
pub use process::Process;

use std::time::Duration;

use crate::script::CapabilitySet;
use crate::utils::LogLevel;

/// Settings that shape the standard capabilities
#[derive(Clone, Debug)]
pub struct CapabilityOptions {
    pub log_level: LogLevel,
    pub colorize: bool,
    pub fetch_timeout: Duration,
}

impl Default for CapabilityOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            colorize: false,
            fetch_timeout: crate::http::DEFAULT_TIMEOUT,
        }
    }
}

/// Build the capability set installed into every script session
pub fn standard(options: &CapabilityOptions) -> CapabilitySet {
    CapabilitySet::new()
        .with(Io::new(options.log_level, options.colorize))
        .with(Console)
        .with(Process::from_env())
        .with(Fetch::new(options.fetch_timeout))
        .with(Faker)
        .with(Encoding)
        .with(Hashing)
}
