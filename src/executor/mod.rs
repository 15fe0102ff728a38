//! Script execution engine
//!
//! Bounded parallel dispatch of script files, each supervised to a terminal
//! state.

mod parallel;
mod runner;

pub use parallel::{ExecutorError, ParallelExecutor};
pub use runner::{
    script_label, ScriptError, ScriptRunner, SessionOutcome, SessionStatus, CANCELLED_REASON,
    ERROR_EVENT_REASON,
};
