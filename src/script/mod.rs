//! Script interpreter layer
//!
//! Sessions, the capability registration contract, runtime events and the
//! in-script test harness.

mod capability;
mod context;
mod event;
mod harness;
mod session;

pub use capability::{Capability, CapabilityError, CapabilitySet, Namespace};
pub use context::{Interrupter, SessionContext};
pub use event::{EventLevel, RuntimeEvent};
pub use harness::HARNESS_EXPORTS;
pub use session::{Session, SessionError, EVENT_CHANNEL_CAPACITY, SESSION_EXPORTS};
