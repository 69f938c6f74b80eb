//! Collection subscriptions against in-memory fakes: snapshot/live
//! convergence, degraded mode, channel errors and teardown.

mod common;

use common::{boks, delete, insert, update, FakeQueryBackend, FakeRealtime};
use stallplass_link::{
    ChannelState, ChannelStatus, CollectionView, ListenEvent, QueryError, SubscriptionOptions,
    SyncError,
};
use std::time::Duration;
use tokio::sync::watch;

async fn loaded(rx: &mut watch::Receiver<CollectionView>) -> CollectionView {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|view| !view.loading))
        .await
        .expect("snapshot load timed out")
        .expect("subscription dropped")
        .clone()
}

#[tokio::test]
async fn test_update_during_load_wins_over_snapshot() {
    let (backend, gate) = FakeQueryBackend::gated(vec![boks("b1", "s1", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    assert!(sub.view().loading);

    realtime.emit(update("boxes", &boks("b1", "s1", 120)));
    assert!(sub.view().data.is_empty());

    gate.add_permits(1);
    let view = loaded(&mut sub.watch()).await;

    assert_eq!(view.data, vec![boks("b1", "s1", 120)]);
    assert!(view.error.is_none());
    assert!(view.connected);
}

#[tokio::test]
async fn test_update_after_load_gives_same_result() {
    let backend = FakeQueryBackend::with_rows(vec![boks("b1", "s1", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    loaded(&mut sub.watch()).await;

    realtime.emit(update("boxes", &boks("b1", "s1", 120)));
    assert_eq!(sub.data(), vec![boks("b1", "s1", 120)]);
}

#[tokio::test]
async fn test_insert_buffered_during_load_is_not_duplicated() {
    let (backend, gate) = FakeQueryBackend::gated(vec![boks("b1", "s1", 100), boks("b2", "s1", 90)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();

    realtime.emit(insert("boxes", &boks("b2", "s1", 90)));
    realtime.emit(insert("boxes", &boks("b3", "s1", 80)));
    realtime.emit(delete("boxes", "b1"));
    gate.add_permits(1);

    let view = loaded(&mut sub.watch()).await;
    assert_eq!(view.data, vec![boks("b2", "s1", 90), boks("b3", "s1", 80)]);
}

#[tokio::test]
async fn test_live_events_reconcile_in_order() {
    let backend = FakeQueryBackend::with_rows(vec![]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    loaded(&mut sub.watch()).await;

    realtime.emit(insert("boxes", &boks("b1", "s1", 100)));
    realtime.emit(insert("boxes", &boks("b2", "s1", 100)));
    realtime.emit(insert("boxes", &boks("b1", "s1", 999)));
    realtime.emit(update("boxes", &boks("b3", "s1", 50)));
    realtime.emit(delete("boxes", "b2"));
    realtime.emit(delete("boxes", "missing"));

    assert_eq!(
        sub.data(),
        vec![boks("b1", "s1", 100), boks("b3", "s1", 50)]
    );
}

#[tokio::test]
async fn test_fetch_failure_degrades_to_live_only() {
    let backend = FakeQueryBackend::with_rows(vec![boks("b1", "s1", 100)]);
    backend.fail_with(QueryError::Server {
        status_code: 503,
        message: "unavailable".into(),
    });
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    let view = loaded(&mut sub.watch()).await;
    assert!(view.data.is_empty());
    assert!(view.error.as_deref().unwrap().contains("unavailable"));

    realtime.emit(insert("boxes", &boks("b2", "s1", 70)));
    let view = sub.view();
    assert_eq!(view.data, vec![boks("b2", "s1", 70)]);
    assert!(view.error.is_some());
}

#[tokio::test]
async fn test_channel_error_is_reported_and_refresh_rejoins() {
    let backend = FakeQueryBackend::with_rows(vec![boks("b1", "s1", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    loaded(&mut sub.watch()).await;
    assert_eq!(sub.channel_state(), ChannelState::Subscribed);

    let first = realtime.last_channel();
    first.set_status(ChannelStatus::ChannelError, Some("permission denied"));

    let view = sub.view();
    assert_eq!(view.error.as_deref(), Some("permission denied"));
    assert!(!view.connected);
    assert_eq!(view.data, vec![boks("b1", "s1", 100)]);
    assert_eq!(sub.channel_state(), ChannelState::Errored);

    backend.set_rows(vec![boks("b1", "s1", 100), boks("b2", "s1", 90)]);
    sub.refresh().await;

    assert_eq!(realtime.channels().len(), 2);
    assert_eq!(first.unsubscribe_count(), 1);
    let view = sub.view();
    assert!(view.error.is_none());
    assert!(view.connected);
    assert!(!view.loading);
    assert_eq!(view.data.len(), 2);

    // The old handle is dead even if the backend keeps using it
    first.emit(&insert("boxes", &boks("b9", "s1", 1)));
    assert_eq!(sub.data().len(), 2);
}

#[tokio::test]
async fn test_timed_out_channel_gets_default_message() {
    let backend = FakeQueryBackend::with_rows(vec![]);
    let realtime = FakeRealtime::manual_ack();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    assert_eq!(sub.channel_state(), ChannelState::Opening);

    realtime.last_channel().set_status(ChannelStatus::TimedOut, None);
    assert_eq!(sub.view().error.as_deref(), Some("Subscription timed out"));
}

#[tokio::test]
async fn test_close_is_idempotent_and_stops_updates() {
    let backend = FakeQueryBackend::with_rows(vec![boks("b1", "s1", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    let mut rx = sub.watch();
    loaded(&mut rx).await;
    rx.borrow_and_update();

    sub.close();
    sub.close();
    assert!(!sub.is_active());
    assert_eq!(sub.channel_state(), ChannelState::Closed);
    assert_eq!(realtime.last_channel().unsubscribe_count(), 1);

    realtime.emit(insert("boxes", &boks("b2", "s1", 90)));
    realtime.emit(delete("boxes", "b1"));
    sub.refresh().await;

    assert!(!rx.has_changed().unwrap());
    assert_eq!(sub.data(), vec![boks("b1", "s1", 100)]);
    assert_eq!(realtime.channels().len(), 1);
}

#[tokio::test]
async fn test_snapshot_resolving_after_close_is_discarded() {
    let (backend, gate) = FakeQueryBackend::gated(vec![boks("b1", "s1", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    let mut rx = sub.watch();
    rx.borrow_and_update();

    sub.close();
    gate.add_permits(1);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(!rx.has_changed().unwrap());
    assert!(sub.data().is_empty());
}

#[tokio::test]
async fn test_dropping_subscription_unsubscribes() {
    let backend = FakeQueryBackend::with_rows(vec![]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    let channel = realtime.last_channel();
    drop(sub);

    assert_eq!(channel.unsubscribe_count(), 1);
    channel.emit(&insert("boxes", &boks("b1", "s1", 1)));
}

#[tokio::test]
async fn test_refresh_supersedes_pending_load() {
    let (backend, gate) = FakeQueryBackend::gated(vec![boks("b1", "s1", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    backend.set_rows(vec![boks("b1", "s1", 200)]);

    gate.add_permits(2);
    sub.refresh().await;

    let view = sub.view();
    assert!(!view.loading);
    assert_eq!(view.data, vec![boks("b1", "s1", 200)]);
}

#[tokio::test]
async fn test_abandoned_refresh_still_settles() {
    let (backend, gate) = FakeQueryBackend::gated(vec![boks("b1", "s1", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    gate.add_permits(1);
    loaded(&mut sub.watch()).await;

    let abandoned = tokio::time::timeout(Duration::from_millis(50), sub.refresh()).await;
    assert!(abandoned.is_err());
    assert!(sub.view().loading);

    // Buffered behind the reload that is still running
    realtime.emit(insert("boxes", &boks("b2", "s1", 90)));
    gate.add_permits(1);
    let view = loaded(&mut sub.watch()).await;
    assert_eq!(view.data.len(), 2);

    realtime.emit(insert("boxes", &boks("b3", "s1", 80)));
    let view = sub.view();
    assert!(!view.loading);
    assert_eq!(view.data.len(), 3);
}

#[tokio::test]
async fn test_malformed_filter_fails_synchronously() {
    let backend = FakeQueryBackend::with_rows(vec![]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    for filter in ["stable_id", "stable_id=s1", "=eq.s1", "stable_id=EQ.s1", "stable_id=eq."] {
        let err = client
            .subscribe_collection("boxes", SubscriptionOptions::new().with_filter(filter))
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::CompileError(_)), "{}", filter);
    }
    assert!(realtime.channels().is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_filter_is_passed_to_channel_and_snapshot() {
    let backend = FakeQueryBackend::with_rows(vec![boks("b1", "s1", 100), boks("b2", "s2", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection(
            "boxes",
            SubscriptionOptions::new()
                .with_filter("stable_id=eq.s1")
                .with_events(ListenEvent::All),
        )
        .unwrap();
    let view = loaded(&mut sub.watch()).await;
    assert_eq!(view.data, vec![boks("b1", "s1", 100)]);

    let specs = realtime.last_channel().specs();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].filter.as_deref(), Some("stable_id=eq.s1"));
    assert_eq!(specs[0].schema, "public");
    assert_eq!(specs[0].table, "boxes");
}

#[tokio::test]
async fn test_events_outside_filter_are_dropped_or_removed() {
    let backend = FakeQueryBackend::with_rows(vec![boks("b1", "s1", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new().with_filter("stable_id=eq.s1"))
        .unwrap();
    loaded(&mut sub.watch()).await;

    realtime.emit(insert("boxes", &boks("b2", "s2", 100)));
    assert_eq!(sub.data(), vec![boks("b1", "s1", 100)]);

    // Moved to another stable
    realtime.emit(update("boxes", &boks("b1", "s2", 100)));
    assert!(sub.data().is_empty());
}

#[tokio::test]
async fn test_event_filter_limits_listened_kinds() {
    let backend = FakeQueryBackend::with_rows(vec![boks("b1", "s1", 100)]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection(
            "boxes",
            SubscriptionOptions::new().with_events(ListenEvent::Insert),
        )
        .unwrap();
    loaded(&mut sub.watch()).await;

    realtime.emit(delete("boxes", "b1"));
    realtime.emit(insert("boxes", &boks("b2", "s1", 100)));
    assert_eq!(
        sub.data(),
        vec![boks("b1", "s1", 100), boks("b2", "s1", 100)]
    );
}

#[tokio::test]
async fn test_other_tables_are_ignored() {
    let backend = FakeQueryBackend::with_rows(vec![]);
    let realtime = FakeRealtime::new();
    let client = common::client(&realtime, &backend);

    let sub = client
        .subscribe_collection("boxes", SubscriptionOptions::new())
        .unwrap();
    loaded(&mut sub.watch()).await;

    realtime.emit(insert("stables", &boks("s1", "s1", 0)));
    assert!(sub.data().is_empty());
}
