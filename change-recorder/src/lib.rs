//! Change Recorder - durable change-notification queue
//!
//! Sits between a groupware server's live change feed and a slow consumer.
//! Relevant notifications are recorded to durable storage and replayed one
//! at a time; each is removed only after the consumer acknowledges it, so
//! nothing is lost across crashes or while the consumer is busy.
//!
//! ## Module Organization
//!
//! - `types/`: notifications, subscriptions, events and errors
//! - `monitor/`: filtering, the durable queue, live delivery and the recorder
//! - `store/`: durable backends (memory, file, SQLite)
//! - `state/`: per-consumer recorder registry
//! - `config/`: configuration management
//! - `logging`: tracing setup

pub mod config;
pub mod logging;
pub mod monitor;
pub mod state;
pub mod store;
pub mod types;

pub use config::{RecorderConfig, StoreBackend, StoreConfig};
pub use monitor::{
    feed_channel, CoalesceOutcome, ConsumerChannels, LiveMonitor, LiveOutcome, LoadOutcome,
    Recorder, RecorderState, ReplayOutcome,
};
pub use state::{pump_feed, ConsumerHandle, RecorderManager, SharedRecorder};
pub use store::{DurableStore, FileStore, MemoryStore, SqliteStore};
pub use types::{
    ChangeNotification, EntityId, EntityKind, MonitorEvent, Operation, RecorderError,
    RecorderSignal, Result, SubscriptionSpec, ROOT_COLLECTION, UNSEQUENCED,
};
