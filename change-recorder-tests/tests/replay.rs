use change_recorder::{
    ChangeNotification, CoalesceOutcome, LiveOutcome, MemoryStore, MonitorEvent, Operation,
    Recorder, RecorderConfig, RecorderError, RecorderSignal, RecorderState, ReplayOutcome,
    SubscriptionSpec,
};
use change_recorder_tests::{drain, item, received_events, ARCHIVE, INBOX};

fn open(subscription: SubscriptionSpec) -> (Recorder, change_recorder::ConsumerChannels) {
    Recorder::open(
        Box::new(MemoryStore::new()),
        subscription,
        &RecorderConfig::default(),
    )
}

#[test_log::test]
fn replay_preserves_arrival_order() {
    let (mut recorder, channels) = open(SubscriptionSpec::monitor_all());

    let sent = vec![
        item(1, Operation::Added),
        item(2, Operation::Added),
        item(1, Operation::Moved).with_destination(ARCHIVE),
        ChangeNotification::collection(INBOX, Operation::StatisticsChanged),
        item(3, Operation::Linked),
    ];
    for n in &sent {
        recorder.on_live_notification(n.clone()).unwrap();
    }

    let delivered = drain(&mut recorder, &channels);
    assert_eq!(delivered.len(), sent.len());
    for (got, expected) in delivered.iter().zip(&sent) {
        assert!(got.same_change(expected), "{} != {}", got, expected);
    }

    let sequences: Vec<u64> = delivered.iter().map(|n| n.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
}

#[test_log::test]
fn only_one_notification_outstanding() {
    let (mut recorder, _channels) = open(SubscriptionSpec::monitor_all());
    recorder.on_live_notification(item(1, Operation::Added)).unwrap();
    recorder.on_live_notification(item(2, Operation::Added)).unwrap();

    recorder.replay_next().unwrap();
    let before = recorder.pending();

    let err = recorder.replay_next().unwrap_err();
    assert!(err.is_contract_violation());
    assert!(matches!(err, RecorderError::ReplayWhileAwaiting));
    assert_eq!(recorder.pending(), before);
}

#[test_log::test]
fn acknowledge_pops_the_delivered_notification() {
    let (mut recorder, _channels) = open(SubscriptionSpec::monitor_all());
    for id in 1..=3 {
        recorder.on_live_notification(item(id, Operation::Added)).unwrap();
    }

    let delivered = match recorder.replay_next().unwrap() {
        ReplayOutcome::Delivered(n) => n,
        other => panic!("Expected delivery, got {:?}", other),
    };

    let popped = recorder.change_processed().unwrap();
    assert_eq!(popped, delivered);
    assert_eq!(recorder.len(), 2);
    assert!(matches!(
        recorder.change_processed(),
        Err(RecorderError::DoubleAcknowledge)
    ));
}

#[test_log::test]
fn changes_to_the_same_item_merge() {
    let (mut recorder, _channels) = open(SubscriptionSpec::monitor_all());

    recorder
        .on_live_notification(item(5, Operation::Changed).with_parts(["A"]))
        .unwrap();
    let outcome = recorder
        .on_live_notification(item(5, Operation::Changed).with_parts(["B"]))
        .unwrap();

    assert!(matches!(
        outcome,
        LiveOutcome::Recorded(CoalesceOutcome::Merged { .. })
    ));
    let pending = recorder.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].changed_parts.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["A", "B"]
    );
}

#[test_log::test]
fn added_then_removed_leaves_nothing() {
    let (mut recorder, channels) = open(SubscriptionSpec::monitor_all());

    recorder.on_live_notification(item(7, Operation::Added)).unwrap();
    let outcome = recorder.on_live_notification(item(7, Operation::Removed)).unwrap();

    assert!(matches!(
        outcome,
        LiveOutcome::Recorded(CoalesceOutcome::Collapsed { .. })
    ));
    assert!(recorder.is_empty());
    assert_eq!(recorder.replay_next().unwrap(), ReplayOutcome::NothingToReplay);
    assert!(received_events(&channels).is_empty());
}

#[test_log::test]
fn disabled_recorder_passes_notifications_through() {
    let (mut recorder, channels) = open(SubscriptionSpec::monitor_all());
    recorder.set_recording_enabled(false).unwrap();
    assert_eq!(recorder.state(), RecorderState::Disabled);

    let outcome = recorder.on_live_notification(item(1, Operation::Added)).unwrap();
    assert_eq!(outcome, LiveOutcome::Delivered);
    assert!(recorder.is_empty());

    let events = received_events(&channels);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], MonitorEvent::ItemAdded(_)));
}

#[test_log::test]
fn added_then_changed_replays_as_one_addition() {
    let (mut recorder, channels) =
        open(SubscriptionSpec::default().monitor_collection(INBOX));

    recorder.on_live_notification(item(1, Operation::Added)).unwrap();
    recorder
        .on_live_notification(item(1, Operation::Changed).with_parts(["body"]))
        .unwrap();
    assert_eq!(recorder.len(), 1);

    match recorder.replay_next().unwrap() {
        ReplayOutcome::Delivered(n) => {
            assert_eq!(n.entity_id, 1);
            assert_eq!(n.operation, Operation::Added);
        }
        other => panic!("Expected delivery, got {:?}", other),
    }
    assert!(matches!(
        channels.events.try_recv(),
        Ok(MonitorEvent::ItemAdded(_))
    ));

    recorder.change_processed().unwrap();

    // Drop the ChangesAdded signals from recording
    let _ = channels.signals.try_iter().count();

    assert_eq!(recorder.replay_next().unwrap(), ReplayOutcome::NothingToReplay);
    assert_eq!(
        channels.signals.try_recv(),
        Ok(RecorderSignal::NothingToReplay)
    );
    assert!(recorder.is_empty());
}

#[test_log::test]
fn unrelated_collections_are_not_recorded() {
    let (mut recorder, channels) = open(
        SubscriptionSpec::default()
            .monitor_collection(INBOX)
            .with_mime_type("message/rfc822"),
    );

    let other_folder = ChangeNotification::item(1, Operation::Added)
        .with_parent(ARCHIVE)
        .with_mime_type("message/rfc822");
    let wrong_type = item(2, Operation::Added).with_mime_type("text/calendar");
    let moved_in = ChangeNotification::item(3, Operation::Moved)
        .with_parent(ARCHIVE)
        .with_destination(INBOX)
        .with_mime_type("message/rfc822");

    assert_eq!(
        recorder.on_live_notification(other_folder).unwrap(),
        LiveOutcome::Filtered
    );
    assert_eq!(
        recorder.on_live_notification(wrong_type).unwrap(),
        LiveOutcome::Filtered
    );
    assert!(matches!(
        recorder.on_live_notification(moved_in).unwrap(),
        LiveOutcome::Recorded(_)
    ));

    let delivered = drain(&mut recorder, &channels);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].entity_id, 3);
}

#[test_log::test]
fn payload_flags_do_not_change_relevance() {
    let plain = SubscriptionSpec::default().monitor_collection(INBOX);
    let rich = plain
        .clone()
        .with_item_payload(true)
        .with_collection_data(true);
    assert!(rich.fetch_item_payload && rich.fetch_collection);

    let (mut recorder, _channels) = open(plain);
    recorder.on_live_notification(item(1, Operation::Added)).unwrap();

    recorder.set_subscription(rich.clone());
    assert_eq!(recorder.subscription(), &rich);
    recorder.on_live_notification(item(2, Operation::Added)).unwrap();
    assert_eq!(
        recorder
            .on_live_notification(ChangeNotification::item(3, Operation::Added).with_parent(ARCHIVE))
            .unwrap(),
        LiveOutcome::Filtered
    );

    assert_eq!(recorder.len(), 2);
}
