//! Process-wide state
//!
//! Thread-safe management of the recorders a process hosts.

mod recorder_manager;

pub use recorder_manager::{pump_feed, ConsumerHandle, RecorderManager, SharedRecorder};
