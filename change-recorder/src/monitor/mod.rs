//! Change monitoring
//!
//! - `filter`: subscription relevance and queue coalescing
//! - `queue`: durable FIFO of pending notifications
//! - `live`: pass-through delivery
//! - `recorder`: record-and-replay on top of the above

pub mod filter;
pub mod live;
pub mod queue;
pub mod recorder;

pub use filter::CoalesceOutcome;
pub use live::{feed_channel, LiveMonitor};
pub use queue::{LoadOutcome, NotificationQueue};
pub use recorder::{ConsumerChannels, LiveOutcome, Recorder, RecorderState, ReplayOutcome};
