//! Saved-message broadcast rotation.
//!
//! Periodically forwards the newest Saved Messages entry to the next group
//! of a dialog folder and deletes the forwarded copy again after a delay.

mod cleanup;
mod runner;
mod state;

pub use cleanup::DeletionQueue;
pub use runner::{BroadcastScheduler, BroadcastTiming, SchedulerMessage};
pub use state::{CycleOutcome, ForwardRecord, RotationCursor};
