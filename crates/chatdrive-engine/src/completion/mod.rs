//! Deciding when a streamed generation has finished.
//!
//! `tracker` holds the pure state machine; `detector` feeds it observations
//! read from a live view on an adaptive schedule.

pub mod detector;
pub mod schedule;
pub mod tracker;

pub use detector::{CompletionDetector, CompletionReport, WaitBudget};
pub use schedule::PollSchedule;
pub use tracker::{
    Baseline, CompletionState, CompletionTracker, Observation, Step, TrackerSettings, Verdict,
};
