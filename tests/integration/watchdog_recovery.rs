//! Integration tests for the stuck-job watchdog
//!
//! The client timeout is pushed past the stuck threshold so a hung backend call never
//! settles on its own; only the watchdog can move the artifact out of `generating`.

use crate::integration::test_utils::{by_key, unit, HarnessBuilder, Step};
use easel::artifact::{ArtifactStatus, FailureOrigin};
use easel::queue::TaskOutcome;
use easel::watchdog::STUCK_DETAIL;
use std::time::Duration;

fn hung_harness() -> crate::integration::test_utils::Harness {
    HarnessBuilder::new()
        .client(|c| c.primary_timeout_ms = 600_000)
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_fails_stuck_artifact_after_threshold() {
    let h = hung_harness();
    h.primary.script("lamp", [Step::Hang]);
    h.session.start_watchdog().unwrap();

    let session = h.session.clone();
    let batch = tokio::spawn(async move { session.enqueue(vec![unit("hero", "lamp")]).await });

    tokio::time::sleep(Duration::from_secs(179)).await;
    let hero = by_key(&h.session.artifacts(), "hero");
    assert_eq!(hero.status, ArtifactStatus::Generating);
    assert!(h.session.batch_in_progress());

    // First tick past 180s is at 185s.
    tokio::time::sleep(Duration::from_secs(7)).await;
    let hero = by_key(&h.session.artifacts(), "hero");
    assert_eq!(hero.status, ArtifactStatus::Failed);
    assert_eq!(hero.failure_origin, Some(FailureOrigin::Stuck));
    assert_eq!(hero.error_detail.as_deref(), Some(STUCK_DETAIL));
    assert!(!h.session.batch_in_progress());

    h.session.close().await;
    batch.abort();
}

#[tokio::test(start_paused = true)]
async fn test_late_result_after_sweep_is_discarded() {
    let h = hung_harness();
    h.primary.script("lamp", [Step::Slow(Duration::from_secs(200))]);

    let session = h.session.clone();
    let batch = tokio::spawn(async move { session.enqueue(vec![unit("hero", "lamp")]).await });

    tokio::time::sleep(Duration::from_secs(181)).await;
    let swept = h.session.sweep_stuck();
    assert_eq!(swept.len(), 1);

    let report = batch.await.unwrap().unwrap();
    assert_eq!(report.summary.discarded, 1);

    let hero = by_key(&h.session.artifacts(), "hero");
    assert_eq!(hero.status, ArtifactStatus::Failed);
    assert_eq!(hero.failure_origin, Some(FailureOrigin::Stuck));
    assert!(hero.payload.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_swept_artifact_can_be_retried() {
    let h = hung_harness();
    h.primary.script("lamp", [Step::Hang]);

    let session = h.session.clone();
    let batch = tokio::spawn(async move { session.enqueue(vec![unit("hero", "lamp")]).await });
    tokio::time::sleep(Duration::from_secs(181)).await;
    assert_eq!(h.session.sweep_stuck().len(), 1);

    let id = by_key(&h.session.artifacts(), "hero").id;
    let outcome = h.session.retry(&id).await.unwrap();
    assert_eq!(outcome, TaskOutcome::Completed);

    let hero = h.session.artifact(&id).unwrap();
    assert_eq!(hero.status, ArtifactStatus::Completed);
    assert!(hero.failure_origin.is_none());
    assert_eq!(hero.attempts_made, 2);
    batch.abort();
}

#[tokio::test(start_paused = true)]
async fn test_new_batch_after_sweep_sets_flag_again() {
    let h = hung_harness();
    h.primary.script("lamp", [Step::Hang]);
    h.primary
        .script("chair", [Step::Slow(Duration::from_secs(10))]);

    let first = {
        let session = h.session.clone();
        tokio::spawn(async move { session.enqueue(vec![unit("hero", "lamp")]).await })
    };
    tokio::time::sleep(Duration::from_secs(181)).await;
    h.session.sweep_stuck();
    assert!(!h.session.batch_in_progress());

    let second = {
        let session = h.session.clone();
        tokio::spawn(async move { session.enqueue(vec![unit("seat", "chair")]).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.session.batch_in_progress());

    second.await.unwrap().unwrap();
    assert!(!h.session.batch_in_progress());
    first.abort();
}
