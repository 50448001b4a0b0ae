//! Shared fixtures for the change-recorder integration tests

use std::path::Path;

use change_recorder::{
    ChangeNotification, ConsumerChannels, EntityId, MonitorEvent, Operation, RecorderConfig,
    Recorder, ReplayOutcome, StoreBackend, StoreConfig,
};

pub const INBOX: EntityId = 10;
pub const ARCHIVE: EntityId = 11;

pub fn item(id: EntityId, operation: Operation) -> ChangeNotification {
    ChangeNotification::item(id, operation).with_parent(INBOX)
}

pub fn config(backend: StoreBackend, path: Option<&Path>) -> RecorderConfig {
    RecorderConfig {
        store: StoreConfig {
            backend,
            path: path.map(Path::to_path_buf),
        },
        ..RecorderConfig::default()
    }
}

/// Replay and acknowledge until the queue is empty, checking that every
/// delivery event matches what `replay_next` returned
pub fn drain(recorder: &mut Recorder, channels: &ConsumerChannels) -> Vec<ChangeNotification> {
    let mut delivered = Vec::new();

    while let Ok(ReplayOutcome::Delivered(notification)) = recorder.replay_next() {
        let event = channels
            .events
            .try_recv()
            .expect("replay_next should emit a delivery event");
        assert_eq!(event.notification(), &notification);

        let popped = recorder
            .change_processed()
            .expect("acknowledging a delivered notification");
        assert_eq!(popped, notification);
        delivered.push(popped);
    }

    delivered
}

/// Everything currently waiting on the event channel
pub fn received_events(channels: &ConsumerChannels) -> Vec<MonitorEvent> {
    channels.events.try_iter().collect()
}
