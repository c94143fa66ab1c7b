use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use volition::intent::journal::{LifecycleEntry, LifecycleEventKind};
use volition::intent::types::{Intention, IntentionSource, IntentionStatus};
use volition::store::{IntentionStore, Manifest, RetentionPolicy, StoreError, MANIFEST_FILE};

fn intention(title: &str) -> Intention {
    let mut intention = Intention::new(IntentionSource::Task, title);
    intention.status = IntentionStatus::Pending;
    intention
}

#[tokio::test]
async fn test_manifest_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = IntentionStore::open(dir.path()).await.unwrap();
    let original = intention("sort the photo archive");
    store.create(&original).await.unwrap();

    let path = dir.path().join("pending").join(original.id.to_string()).join(MANIFEST_FILE);
    let manifest: Manifest = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(manifest.stage, original.stage(), "stage is written alongside status");
    assert_eq!(manifest.intention, original);
    assert!(!path.with_extension("json.tmp").exists(), "no temporary file left behind");

    let reopened = IntentionStore::open(dir.path()).await.unwrap();
    assert_eq!(reopened.status_of(original.id), Some(IntentionStatus::Pending), "index rebuilt from disk");
    assert_eq!(reopened.load(original.id).await.unwrap(), original);
    assert!(matches!(store.create(&original).await, Err(StoreError::AlreadyExists(_))));
}

#[tokio::test]
async fn test_concurrent_appends_get_unique_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(IntentionStore::open(dir.path()).await.unwrap());
    let target = intention("index the music library");
    store.create(&target).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        let id = target.id;
        handles.push(tokio::spawn(async move {
            let entry = LifecycleEntry::new(LifecycleEventKind::Reinforcement, IntentionStatus::Pending, 0.5, format!("signal {}", i));
            store.append_scratchpad_entry(id, &entry).await.unwrap()
        }));
    }
    let mut sequences = HashSet::new();
    for handle in handles {
        assert!(sequences.insert(handle.await.unwrap()), "sequence numbers never repeat");
    }
    assert_eq!(sequences, (1..=16).collect::<HashSet<u32>>());

    let journal = store.read_scratchpad(target.id).await.unwrap();
    assert_eq!(journal.len(), 16);
    assert_eq!(store.load(target.id).await.unwrap().scratchpad.count, 16);
}

#[tokio::test]
async fn test_status_change_moves_folder() {
    let dir = tempfile::tempdir().unwrap();
    let store = IntentionStore::open(dir.path()).await.unwrap();
    let original = intention("renew the passport");
    store.create(&original).await.unwrap();

    let moved = store.move_to(original.id, IntentionStatus::Evaluating).await.unwrap();
    assert_eq!(moved.status, IntentionStatus::Evaluating);
    assert!(!dir.path().join("pending").join(original.id.to_string()).exists());
    assert!(dir.path().join("evaluating").join(original.id.to_string()).join(MANIFEST_FILE).exists());
    assert_eq!(store.count_with_status(IntentionStatus::Evaluating), 1);
    assert_eq!(store.count_with_status(IntentionStatus::Pending), 0);
}

#[tokio::test]
async fn test_update_applies_entries_and_relocates() {
    let dir = tempfile::tempdir().unwrap();
    let store = IntentionStore::open(dir.path()).await.unwrap();
    let original = intention("plan the trip");
    store.create(&original).await.unwrap();

    let (updated, note) = store
        .update(original.id, |intention, entries| {
            intention.status = IntentionStatus::Abandoned;
            entries.push(LifecycleEntry::new(LifecycleEventKind::Abandoned, intention.status, intention.strength, "faded"));
            Ok::<_, StoreError>("done")
        })
        .await
        .unwrap();
    assert_eq!(note, "done");
    assert_eq!(updated.scratchpad.count, 1);
    assert_eq!(updated.scratchpad.last_entry.as_deref(), Some("0001-abandoned.json"));
    assert_eq!(store.status_of(original.id), Some(IntentionStatus::Abandoned));

    let failed: Result<(Intention, ()), StoreError> = store
        .update(original.id, |intention, _| {
            intention.title = "changed".to_string();
            Err(StoreError::NotFound(intention.id))
        })
        .await;
    assert!(failed.is_err());
    assert_eq!(store.load(original.id).await.unwrap().title, "plan the trip", "failed update writes nothing");
}

#[tokio::test]
async fn test_purge_respects_retention() {
    let dir = tempfile::tempdir().unwrap();
    let store = IntentionStore::open(dir.path()).await.unwrap();
    let now = Utc::now();

    let mut old = intention("old errand");
    old.status = IntentionStatus::Completed;
    old.updated_at = now - Duration::days(40);
    let mut recent = intention("recent errand");
    recent.status = IntentionStatus::Completed;
    recent.updated_at = now - Duration::days(2);
    let mut live = intention("live errand");
    live.updated_at = now - Duration::days(400);

    for i in [&old, &recent, &live] {
        store.create(i).await.unwrap();
    }

    let purged = store.purge_expired(&RetentionPolicy::default(), now).await.unwrap();
    assert_eq!(purged, vec![old.id]);
    assert!(!store.contains(old.id));
    assert!(store.contains(recent.id));
    assert!(store.contains(live.id), "non-terminal intentions are never purged");
}
