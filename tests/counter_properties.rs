//! Property tests: the unread counter never drifts from a scan.

use herald::{
    MemoryBackend, MutationOutcome, NotificationEvent, NotificationId, NotificationKind,
    NotificationRecord, NotificationSync, OwnerId, SyncConfig, Timestamp,
};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Step {
    Created(u8, bool),
    Changed(u8, bool),
    Removed(u8),
    MarkRead(u8),
    MarkAllRead,
    Delete(u8),
}

fn step() -> impl Strategy<Value = Step> {
    let id = 0u8..6;
    prop_oneof![
        (id.clone(), any::<bool>()).prop_map(|(i, read)| Step::Created(i, read)),
        (id.clone(), any::<bool>()).prop_map(|(i, read)| Step::Changed(i, read)),
        id.clone().prop_map(Step::Removed),
        id.clone().prop_map(Step::MarkRead),
        Just(Step::MarkAllRead),
        id.prop_map(Step::Delete),
    ]
}

fn record(i: u8, read: bool) -> NotificationRecord {
    NotificationRecord::new(
        format!("n{}", i),
        OwnerId::new("u1"),
        NotificationKind::VaultFavorited,
        "Favorited",
        Timestamp(i as i64),
    )
    .with_read(read)
}

proptest! {
    #[test]
    fn counter_matches_scan_after_every_step(steps in prop::collection::vec(step(), 1..64)) {
        let sync = NotificationSync::new(MemoryBackend::new(), SyncConfig::for_owner("u1"));
        sync.bootstrap().unwrap();

        for step in steps {
            match step {
                Step::Created(i, read) => { sync.ingest(NotificationEvent::created(record(i, read))); }
                Step::Changed(i, read) => { sync.ingest(NotificationEvent::changed(record(i, read))); }
                Step::Removed(i) => { sync.ingest(NotificationEvent::removed(record(i, false))); }
                Step::MarkRead(i) => { sync.mark_read(&NotificationId::new(format!("n{}", i))).unwrap(); }
                Step::MarkAllRead => { sync.mark_all_read().unwrap(); }
                Step::Delete(i) => { sync.delete(&NotificationId::new(format!("n{}", i))).unwrap(); }
            }

            let view = sync.view();
            let scanned = view.records.iter().filter(|r| !r.read).count() as u64;
            prop_assert_eq!(view.unread_count, scanned);
            prop_assert!(sync.verify_counter().is_ok());
        }

        prop_assert_eq!(sync.stats().counter_breaches, 0);
    }

    #[test]
    fn repeated_mark_read_decrements_at_most_once(i in 0u8..6, repeats in 1usize..5) {
        let sync = NotificationSync::new(MemoryBackend::new(), SyncConfig::for_owner("u1"));
        for j in 0..6 {
            sync.ingest(NotificationEvent::created(record(j, false)));
        }
        let before = sync.unread_count();

        let id = NotificationId::new(format!("n{}", i));
        let mut total = 0;
        for _ in 0..repeats {
            if let MutationOutcome::Applied { delta } = sync.mark_read(&id).unwrap() {
                total += delta;
            }
        }

        prop_assert_eq!(total, -1);
        prop_assert_eq!(sync.unread_count(), before - 1);
    }

    #[test]
    fn duplicate_delivery_is_idempotent(events in prop::collection::vec((0u8..4, any::<bool>(), 0u8..3), 1..32)) {
        let once = NotificationSync::new(MemoryBackend::new(), SyncConfig::for_owner("u1"));
        let twice = NotificationSync::new(MemoryBackend::new(), SyncConfig::for_owner("u1"));

        for (i, read, op) in events {
            let event = match op {
                0 => NotificationEvent::created(record(i, read)),
                1 => NotificationEvent::changed(record(i, read)),
                _ => NotificationEvent::removed(record(i, read)),
            };
            once.ingest(event.clone());
            twice.ingest(event.clone());
            twice.ingest(event);
        }

        prop_assert_eq!(once.view(), twice.view());
    }
}
