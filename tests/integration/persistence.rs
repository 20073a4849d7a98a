//! Integration tests for artifact persistence
//!
//! Tests cover:
//! - Artifacts mirrored to sled survive into a new session
//! - Records left mid-flight are restored as interrupted failures
//! - Store failures never roll back in-memory state

use crate::integration::test_utils::{by_key, unauthorized, unit, HarnessBuilder};
use easel::artifact::{Approval, Artifact, ArtifactStatus, FailureOrigin};
use easel::artifact::registry::INTERRUPTED_DETAIL;
use easel::persistence::{ArtifactStore, MemoryArtifactStore, SledArtifactStore};
use easel::request::GenerationSpec;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test(start_paused = true)]
async fn test_sled_store_carries_artifacts_across_sessions() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledArtifactStore::new(temp_dir.path().join("artifacts")).unwrap());

    let first = HarnessBuilder::new().with_store(store.clone()).build();
    first.primary.always_fail("chair", unauthorized());
    first
        .session
        .enqueue(vec![unit("hero", "lamp"), unit("seat", "chair")])
        .await
        .unwrap();
    let hero_id = by_key(&first.session.artifacts(), "hero").id;
    first
        .session
        .set_approval(&hero_id, Approval::Approved)
        .unwrap();
    first.session.close().await;
    drop(first);
    store.flush().unwrap();

    let second = HarnessBuilder::new().with_store(store.clone()).build();
    assert_eq!(second.session.hydrate().unwrap(), 2);

    let artifacts = second.session.artifacts();
    let hero = by_key(&artifacts, "hero");
    assert_eq!(hero.id, hero_id);
    assert_eq!(hero.status, ArtifactStatus::Completed);
    assert_eq!(hero.approval, Approval::Approved);
    assert!(hero.payload.is_some());

    let seat = by_key(&artifacts, "seat");
    assert_eq!(seat.status, ArtifactStatus::Failed);
    assert!(seat.error_detail.is_some());

    // Hydrated primaries still count as active.
    let report = second
        .session
        .enqueue(vec![unit("hero", "lamp")])
        .await
        .unwrap();
    assert_eq!(report.duplicates, vec!["hero".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_records_hydrate_as_interrupted() {
    let store = Arc::new(MemoryArtifactStore::new());
    let stale = Artifact::new_primary("hero", GenerationSpec::new("lamp"), 5_000);
    assert_eq!(stale.status, ArtifactStatus::Generating);
    store.upsert(&stale).unwrap();

    let h = HarnessBuilder::new().with_store(store.clone()).build();
    assert_eq!(h.session.hydrate().unwrap(), 1);

    let restored = h.session.artifact(&stale.id).unwrap();
    assert_eq!(restored.status, ArtifactStatus::Failed);
    assert_eq!(restored.failure_origin, Some(FailureOrigin::Interrupted));
    assert_eq!(restored.error_detail.as_deref(), Some(INTERRUPTED_DETAIL));

    // The rewrite is mirrored back to the store.
    assert_eq!(store.get(&stale.id).unwrap().status, ArtifactStatus::Failed);

    // And the interrupted artifact can be retried.
    h.session.retry(&stale.id).await.unwrap();
    assert_eq!(
        h.session.artifact(&stale.id).unwrap().status,
        ArtifactStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_store_failures_do_not_roll_back_state() {
    let store = Arc::new(MemoryArtifactStore::new());
    store.set_failing(true);
    let h = HarnessBuilder::new().with_store(store.clone()).build();

    let report = h.session.enqueue(vec![unit("hero", "lamp")]).await.unwrap();
    assert_eq!(report.summary.completed, 1);

    let hero = by_key(&h.session.artifacts(), "hero");
    assert_eq!(hero.status, ArtifactStatus::Completed);
    assert!(store.is_empty());

    // Approval still works and lands once the store recovers.
    store.set_failing(false);
    h.session.set_approval(&hero.id, Approval::Approved).unwrap();
    assert_eq!(store.get(&hero.id).unwrap().approval, Approval::Approved);
}

#[tokio::test(start_paused = true)]
async fn test_delete_removes_records_from_store() {
    let store = Arc::new(MemoryArtifactStore::new());
    let h = HarnessBuilder::new().with_store(store.clone()).build();
    h.session.enqueue(vec![unit("hero", "lamp")]).await.unwrap();
    let parent = by_key(&h.session.artifacts(), "hero").id;
    h.session
        .generate_variations(parent, vec![GenerationSpec::new("lamp v1")])
        .await
        .unwrap();
    assert_eq!(store.len(), 2);

    h.session.delete(&parent).unwrap();
    assert!(store.is_empty());
}
