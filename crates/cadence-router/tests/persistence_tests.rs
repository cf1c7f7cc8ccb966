//! Persistence Tests
//!
//! - Writer ordering (latest state wins)
//! - Retry with backoff and giving up
//! - Bounded flush
//! - JSON file profile store
//! - Guest session expiry

use cadence_core::{events, PlaylistState, Track};
use cadence_router::{
    Identity, JsonFileProfileStore, PlaylistWriter, ProfileStore, RetryPolicy, RouterError,
};
use cadence_test_utils::{FlakyProfileStore, TestHub};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

const FLUSH: Duration = Duration::from_secs(5);

fn playlist_of(srcs: &[&str]) -> PlaylistState {
    let mut state = PlaylistState::new();
    for src in srcs {
        state.add_track(Track::new(*src), false).unwrap();
    }
    state
}

fn writer(store: &Arc<FlakyProfileStore>, retries: u32) -> PlaylistWriter {
    PlaylistWriter::new(
        store.clone(),
        RetryPolicy::new(retries, Duration::from_millis(2)),
    )
}

#[tokio::test]
async fn test_latest_write_wins() {
    let store = Arc::new(FlakyProfileStore::new());
    store.set_delay(Some(Duration::from_millis(10)));
    let writer = writer(&store, 0);
    let alice = Identity::new("alice");

    let mut last = PlaylistState::new();
    for n in 1..=5 {
        let srcs: Vec<String> = (0..n).map(|i| format!("t{}", i)).collect();
        let refs: Vec<&str> = srcs.iter().map(String::as_str).collect();
        last = playlist_of(&refs);
        writer.write_playlist(&alice, last.clone());
    }
    writer.flush(&alice, FLUSH).await.unwrap();

    assert_eq!(store.get_playlist(&alice).await.unwrap(), Some(last.clone()));
    let history = store.history();
    assert_eq!(history.last().map(|(_, p)| p), Some(&last));
    // every landed write is at least as new as the one before it
    let lens: Vec<usize> = history.iter().map(|(_, p)| p.len()).collect();
    assert!(lens.windows(2).all(|w| w[0] < w[1]), "{:?}", lens);
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failures() {
    let store = Arc::new(FlakyProfileStore::new());
    let writer = writer(&store, 3);
    let alice = Identity::new("alice");

    store.fail_next(2);
    writer.write_playlist(&alice, playlist_of(&["x"]));
    writer.flush(&alice, FLUSH).await.unwrap();

    assert_eq!(store.playlist_writes(), 1);
    assert_eq!(writer.failure_count(), 0);
    assert_eq!(
        store.get_playlist(&alice).await.unwrap(),
        Some(playlist_of(&["x"]))
    );
}

#[tokio::test]
async fn test_write_gives_up_after_retries() {
    let store = Arc::new(FlakyProfileStore::new());
    let writer = writer(&store, 2);
    let alice = Identity::new("alice");

    store.fail_next(10);
    writer.write_playlist(&alice, playlist_of(&["x"]));
    writer.flush(&alice, FLUSH).await.unwrap();

    assert_eq!(writer.failure_count(), 1);
    assert_eq!(store.get_playlist(&alice).await.unwrap(), None);

    // a later write still goes through
    store.fail_next(0);
    writer.write_playlist(&alice, playlist_of(&["y"]));
    writer.flush(&alice, FLUSH).await.unwrap();
    assert_eq!(
        store.get_playlist(&alice).await.unwrap(),
        Some(playlist_of(&["y"]))
    );
}

#[tokio::test]
async fn test_flush_is_bounded() {
    let store = Arc::new(FlakyProfileStore::new());
    store.set_delay(Some(Duration::from_secs(2)));
    let writer = writer(&store, 0);
    let alice = Identity::new("alice");

    writer.write_playlist(&alice, playlist_of(&["slow"]));
    let started = Instant::now();
    let err = writer
        .flush(&alice, Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::Timeout(d) if d == Duration::from_millis(50)));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_flush_without_writes() {
    let store = Arc::new(FlakyProfileStore::new());
    let writer = writer(&store, 0);
    writer.flush(&Identity::new("nobody"), FLUSH).await.unwrap();
    writer.flush_all(FLUSH).await.unwrap();
}

#[tokio::test]
async fn test_connection_and_playlist_writes_are_independent() {
    let store = Arc::new(FlakyProfileStore::new());
    let writer = writer(&store, 0);
    let alice = Identity::new("alice");

    writer.write_playlist(&alice, playlist_of(&["x"]));
    writer.write_connection_id(&alice, Some("c1".to_string()));
    writer.flush_all(FLUSH).await.unwrap();

    assert_eq!(store.connection_id(&alice).as_deref(), Some("c1"));
    assert_eq!(store.playlist_writes(), 1);
    assert_eq!(store.connection_writes(), 1);
}

#[tokio::test]
async fn test_json_file_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let alice = Identity::new("alice@example.com");
    let state = playlist_of(&["a.mp3", "b.mp3"]);

    {
        let store = JsonFileProfileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get_playlist(&alice).await.unwrap(), None);
        store.update_playlist(&alice, &state).await.unwrap();
        store
            .update_connection_id(&alice, Some(&"c7".to_string()))
            .await
            .unwrap();

        let path = store.path_for(&alice);
        assert_eq!(path.file_name().unwrap(), "alice_example_com.json");
        assert!(path.exists());
    }

    // a fresh instance reads what the last one wrote
    let store = JsonFileProfileStore::open(dir.path()).await.unwrap();
    assert_eq!(store.get_playlist(&alice).await.unwrap(), Some(state));
    let record = store.load(&alice).await.unwrap();
    assert_eq!(record.connection_id.as_deref(), Some("c7"));

    store.update_connection_id(&alice, None).await.unwrap();
    assert_eq!(store.load(&alice).await.unwrap().connection_id, None);
}

#[tokio::test]
async fn test_json_file_store_rejects_corrupt_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileProfileStore::open(dir.path()).await.unwrap();
    let bob = Identity::new("bob");
    std::fs::write(store.path_for(&bob), b"{ not json").unwrap();

    assert!(matches!(
        store.get_playlist(&bob).await,
        Err(RouterError::Persistence(_))
    ));
}

#[tokio::test]
async fn test_expired_guest_session_is_forgotten() {
    let hub = TestHub::start().await;

    let mut client = hub.connect_guest("old-cookie");
    client.expect_event(events::READY).await;
    client.send(events::PLAYLIST, Some(json!({ "addedTrack": { "src": "x" } })));
    client.send(events::PLAYLIST, Some(json!({})));
    client.expect_event(events::PLAYLIST_DATA_RESPONSE).await;
    client.close();
    assert!(hub.wait_for_connections(0).await);

    let sessions = hub.hub().state().sessions();
    assert!(sessions.contains("old-cookie"));
    let later = Instant::now() + sessions.ttl() + Duration::from_secs(1);
    assert_eq!(sessions.evict_expired_at(later), 1);

    let mut again = hub.connect_guest("old-cookie");
    again.expect_event(events::READY).await;
    again.send(events::PLAYLIST, Some(json!({})));
    let data = again
        .expect_event(events::PLAYLIST_DATA_RESPONSE)
        .await
        .data
        .unwrap();
    assert_eq!(data["list"], json!([]));
}

#[tokio::test]
async fn test_shutdown_flushes_pending_writes() {
    let store = Arc::new(FlakyProfileStore::new());
    store.set_delay(Some(Duration::from_millis(50)));
    let tokens: cadence_router::StaticTokens = [("t-carol", "carol")].into_iter().collect();
    let hub = TestHub::start_with(TestHub::test_config(), store.clone(), tokens).await;

    let mut client = hub.connect_as("t-carol", "s-carol");
    client.expect_event(events::READY).await;
    client.send(events::PLAYLIST, Some(json!({})));
    client.expect_event(events::PLAYLIST_DATA_RESPONSE).await;
    client.send(events::PLAYLIST, Some(json!({ "addedTrack": { "src": "last" } })));
    // answered only after the add has been handled
    client.send(events::PLAYLIST, Some(json!({})));
    client.expect_event(events::PLAYLIST_DATA_RESPONSE).await;

    hub.hub().shutdown().await.unwrap();

    let (who, state) = store.history().pop().unwrap();
    assert_eq!(who, "carol");
    assert_eq!(state.list[0].src, "last");
    // teardown ran before the flush, so the binding is cleared too
    assert_eq!(store.connection_id(&Identity::new("carol")), None);
    assert!(store.connection_writes() >= 2);
    assert_eq!(hub.hub().connection_count(), 0);
    assert!(client.expect_closed().await);
}
