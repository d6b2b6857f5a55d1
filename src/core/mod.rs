//! Runtime core: polling, failure accounting and radio recovery.
//!
//! Internal modules:
//! - [`retry`]: bounded attempts with backoff around one hardware call;
//! - [`tracker`]: per-device failure tallies and the global reset flag;
//! - [`poller`]: one device's connect/subscribe/disconnect cycle;
//! - [`coordinator`]: rebuilds the shared radio when the reset flag is raised;
//! - [`supervisor`]: spawns and owns all of the above.

mod context;
mod coordinator;
mod poller;
mod retry;
mod supervisor;
mod tracker;

pub use context::Context;
pub use coordinator::Coordinator;
pub use poller::{CycleOutcome, PollState, Poller};
pub use retry::{Progress, attempt};
pub use supervisor::Supervisor;
pub use tracker::{FailureTracker, ResetFlag};
