//! Session behavior over a live backend and a SQLite cache.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use tempfile::TempDir;

use gptodo::client::ExtractionClient;
use gptodo::config::{CacheConfig, ResponseMode};
use gptodo::session::{ChecklistSession, SessionEvent};
use gptodo::sqlite_store::SqliteStore;
use gptodo_core::cache::{ChecklistCache, IMAGE_KEY};
use gptodo_core::error::MSG_OVERLOADED;
use gptodo_core::reconciler::{Applied, Phase};
use gptodo_core::store::Store;

async fn open_store(tmp: &TempDir) -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::open(&CacheConfig {
            path: tmp.path().join("gptodo.sqlite"),
            container: "gptodo-cache".into(),
        })
        .await
        .unwrap(),
    )
}

async fn session_for(endpoint: &str, store: Arc<SqliteStore>) -> ChecklistSession {
    let client = ExtractionClient::new(&client_config(endpoint, ResponseMode::Stream)).unwrap();
    let session = ChecklistSession::new(store, client);
    session.load().await;
    session
}

async fn stream_backend(model: ScriptedModel) -> String {
    spawn_backend(server_config(find_free_port(), ResponseMode::Stream), model).await
}

#[tokio::test]
async fn later_upload_wins_over_slower_earlier_one() {
    let model = ScriptedModel::new()
        .with(
            IMAGE_A,
            Script::Delayed(Duration::from_millis(500), answer_parts(&["Alpha"])),
        )
        .with(IMAGE_B, Script::Parts(answer_parts(&["Bravo", "Charlie"])));
    let endpoint = stream_backend(model).await;
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let session = session_for(&endpoint, store.clone()).await;

    let first = session.upload(IMAGE_A).await;
    let second = session.upload(IMAGE_B).await;

    let second = second.await.unwrap();
    let first = first.await.unwrap();

    assert_eq!(second.applied, Applied::Applied);
    assert_eq!(first.applied, Applied::Stale);
    assert!(first.result.is_ok());

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.phase, Phase::Populated);
    let texts: Vec<_> = snapshot.items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["Bravo", "Charlie"]);
    assert!(snapshot.image.unwrap().ends_with(IMAGE_B));

    let cached = ChecklistCache::new(store.clone()).load_record().await;
    assert_eq!(cached.todo_list.unwrap().len(), 2);
    assert!(cached.image.unwrap().ends_with(IMAGE_B));
}

#[tokio::test]
async fn thoughts_are_published_then_cleared() {
    let model = ScriptedModel::new().with(IMAGE_A, Script::Parts(answer_parts(&["Milk"])));
    let endpoint = stream_backend(model).await;
    let tmp = TempDir::new().unwrap();
    let session = session_for(&endpoint, open_store(&tmp).await).await;
    let mut events = session.subscribe();

    let outcome = session.upload(IMAGE_A).await.await.unwrap();
    assert_eq!(outcome.applied, Applied::Applied);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(SessionEvent::Started { .. })));
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::Thought { thought, .. } if thought.heading == "Reading the note"
    )));
    assert!(matches!(
        seen.last(),
        Some(SessionEvent::Populated { items: 1, .. })
    ));

    assert!(session.snapshot().await.latest_thought.is_none());
}

#[tokio::test]
async fn failure_rolls_back_and_drops_cached_image() {
    let model = ScriptedModel::new().with(
        IMAGE_A,
        Script::FailBeforeStream("503 Service Unavailable".into()),
    );
    let endpoint = stream_backend(model).await;
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let session = session_for(&endpoint, store.clone()).await;

    let outcome = session.upload(IMAGE_A).await.await.unwrap();
    assert!(outcome.result.is_err());

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.phase, Phase::Empty);
    assert!(snapshot.image.is_none());
    assert!(snapshot.items.is_empty());
    assert_eq!(snapshot.error.as_deref(), Some(MSG_OVERLOADED));
    assert_eq!(store.get(IMAGE_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn edits_survive_a_restart() {
    let model = ScriptedModel::new().with(
        IMAGE_A,
        Script::Parts(answer_parts(&["milk", "Bread", "apples"])),
    );
    let endpoint = stream_backend(model).await;
    let tmp = TempDir::new().unwrap();

    {
        let store = open_store(&tmp).await;
        let session = session_for(&endpoint, store.clone()).await;
        session.upload(IMAGE_A).await.await.unwrap();
        assert!(session.toggle(1).await);
        session.set_sort(true).await;
        store.close().await;
    }

    let session = session_for(&endpoint, open_store(&tmp).await).await;
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.phase, Phase::Populated);
    assert!(snapshot.sorted);
    assert!(snapshot.image.is_some());

    // Sorted view: incomplete A-Z first, completed last.
    let view: Vec<_> = snapshot
        .items
        .iter()
        .map(|i| (i.index, i.completed))
        .collect();
    assert_eq!(view, vec![(2, false), (0, false), (1, true)]);
}

#[tokio::test]
async fn interrupted_extraction_is_discarded_on_load() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store
        .put(IMAGE_KEY, "data:image/png;base64,aW1hZ2UtYQ==")
        .await
        .unwrap();

    // The endpoint is never contacted.
    let session = session_for("http://127.0.0.1:9/process-image", store.clone()).await;
    let snapshot = session.snapshot().await;

    assert_eq!(snapshot.phase, Phase::Empty);
    assert!(snapshot.image.is_none());
    assert_eq!(store.get(IMAGE_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn clear_wipes_cache_and_memory() {
    let model = ScriptedModel::new().with(IMAGE_A, Script::Parts(answer_parts(&["Milk"])));
    let endpoint = stream_backend(model).await;
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let session = session_for(&endpoint, store.clone()).await;

    session.upload(IMAGE_A).await.await.unwrap();
    session.set_sort(true).await;
    session.clear().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.phase, Phase::Empty);
    assert!(!snapshot.sorted);
    let record = ChecklistCache::new(store.clone()).load_record().await;
    assert_eq!(record, Default::default());
}

#[tokio::test]
async fn removing_the_last_item_drops_the_record() {
    let model = ScriptedModel::new().with(IMAGE_A, Script::Parts(answer_parts(&["Milk", "Eggs"])));
    let endpoint = stream_backend(model).await;
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let session = session_for(&endpoint, store.clone()).await;

    session.upload(IMAGE_A).await.await.unwrap();
    session.set_sort(true).await;
    assert!(session.remove(0).await);
    assert!(!session.remove(0).await);

    let cached = ChecklistCache::new(store.clone()).load_record().await;
    let remaining = cached.todo_list.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].index, 1);
    assert!(cached.image.is_some());

    assert!(session.remove(1).await);
    let record = ChecklistCache::new(store.clone()).load_record().await;
    assert_eq!(record, Default::default());

    let reopened = session_for(&endpoint, store).await;
    assert_eq!(reopened.snapshot().await.phase, Phase::Empty);
}
