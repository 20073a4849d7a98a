//! Integration tests for the artifact lifecycle
//!
//! Tests cover:
//! - Approval only on completed artifacts, reset on regeneration
//! - Variations: reserved up front, bounded parallelism, stop handling
//! - Delete cascades to derivatives and discards in-flight results
//! - Closed sessions refuse new work

use crate::integration::test_utils::{by_key, overloaded, unauthorized, unit, HarnessBuilder, Step};
use easel::artifact::{Approval, ArtifactKind, ArtifactStatus, FailureOrigin};
use easel::error::ApiError;
use easel::queue::TaskOutcome;
use easel::request::{GenerationSpec, UnitOfWork};
use easel::session::STOPPED_DETAIL;
use std::time::Duration;

fn specs(prompts: &[&str]) -> Vec<GenerationSpec> {
    prompts.iter().map(|p| GenerationSpec::new(*p)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_approval_requires_completed_status() {
    let h = HarnessBuilder::new().build();
    h.primary.always_fail("chair", unauthorized());
    h.session
        .enqueue(vec![unit("hero", "lamp"), unit("seat", "chair")])
        .await
        .unwrap();

    let artifacts = h.session.artifacts();
    let hero = by_key(&artifacts, "hero");
    let seat = by_key(&artifacts, "seat");

    let approved = h.session.set_approval(&hero.id, Approval::Approved).unwrap();
    assert_eq!(approved.approval, Approval::Approved);
    // Setting the same decision again is harmless.
    assert!(h.session.set_approval(&hero.id, Approval::Approved).is_ok());
    assert!(h.session.set_approval(&hero.id, Approval::Rejected).is_ok());

    let err = h.session.set_approval(&seat.id, Approval::Approved).unwrap_err();
    assert!(matches!(err, ApiError::InvalidTransition { .. }));
    assert_eq!(h.session.artifact(&seat.id).unwrap().approval, Approval::Waiting);
}

#[tokio::test(start_paused = true)]
async fn test_regeneration_resets_approval() {
    let h = HarnessBuilder::new().build();
    h.session.enqueue(vec![unit("hero", "lamp")]).await.unwrap();
    let id = by_key(&h.session.artifacts(), "hero").id;
    h.session.set_approval(&id, Approval::Approved).unwrap();

    h.primary.script("lamp", [Step::Fail(unauthorized())]);
    let outcome = h.session.retry(&id).await.unwrap();
    assert_eq!(outcome, TaskOutcome::Failed);

    let hero = h.session.artifact(&id).unwrap();
    assert_eq!(hero.status, ArtifactStatus::Failed);
    assert_eq!(hero.approval, Approval::Waiting);
    assert_eq!(hero.attempts_made, 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_while_generating_is_rejected() {
    let h = HarnessBuilder::new().build();
    h.primary.script("lamp", [Step::Slow(Duration::from_secs(30))]);

    let session = h.session.clone();
    let batch = tokio::spawn(async move { session.enqueue(vec![unit("hero", "lamp")]).await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let id = by_key(&h.session.artifacts(), "hero").id;
    let err = h.session.retry(&id).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::InvalidTransition {
            from: ArtifactStatus::Generating,
            ..
        }
    ));
    batch.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_variations_are_reserved_and_bounded() {
    let h = HarnessBuilder::new().build();
    h.session.enqueue(vec![unit("hero", "lamp")]).await.unwrap();
    let parent = by_key(&h.session.artifacts(), "hero").id;

    let prompts = ["lamp v1", "lamp v2", "lamp v3", "lamp v4", "lamp v5"];
    for prompt in prompts {
        h.primary.script(prompt, [Step::Slow(Duration::from_secs(2))]);
    }

    let session = h.session.clone();
    let batch = tokio::spawn(async move {
        session
            .generate_variations(parent, specs(&prompts))
            .await
    });
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Every derivative exists before the slots free up.
    let derivatives: Vec<_> = h
        .session
        .artifacts()
        .into_iter()
        .filter(|a| a.kind == ArtifactKind::Derivative)
        .collect();
    assert_eq!(derivatives.len(), 5);
    assert!(derivatives.iter().all(|d| d.parent_id == Some(parent)));
    let pending = derivatives
        .iter()
        .filter(|d| d.status == ArtifactStatus::Pending)
        .count();
    assert_eq!(pending, 2);

    let report = batch.await.unwrap().unwrap();
    assert_eq!(report.summary.completed, 5);
    assert_eq!(report.artifacts.len(), 5);
    assert_eq!(h.primary.peak_in_flight(), 3);

    let keys: Vec<String> = report
        .artifacts
        .iter()
        .map(|id| h.session.artifact(id).unwrap().request_key)
        .collect();
    assert_eq!(keys, vec!["hero/v1", "hero/v2", "hero/v3", "hero/v4", "hero/v5"]);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_variations_fail_their_pending_slots() {
    let h = HarnessBuilder::new()
        .config(|c| c.queue.variation_concurrency = 2)
        .build();
    h.session.enqueue(vec![unit("hero", "lamp")]).await.unwrap();
    let parent = by_key(&h.session.artifacts(), "hero").id;

    let prompts = ["v1", "v2", "v3", "v4"];
    for prompt in prompts {
        h.primary.script(prompt, [Step::Slow(Duration::from_secs(5))]);
    }

    let session = h.session.clone();
    let batch = tokio::spawn(async move {
        session
            .generate_variations(parent, specs(&prompts))
            .await
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.session.request_stop();

    let report = batch.await.unwrap().unwrap();
    assert!(report.summary.stopped);
    assert_eq!(report.summary.completed, 2);
    assert_eq!(report.summary.skipped, 2);

    let stopped: Vec<_> = report
        .artifacts
        .iter()
        .filter_map(|id| h.session.artifact(id))
        .filter(|a| a.status == ArtifactStatus::Failed)
        .collect();
    assert_eq!(stopped.len(), 2);
    for artifact in stopped {
        assert_eq!(artifact.failure_origin, Some(FailureOrigin::Interrupted));
        assert_eq!(artifact.error_detail.as_deref(), Some(STOPPED_DETAIL));
        assert_eq!(artifact.attempts_made, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_variation_of_unknown_parent_fails_without_side_effects() {
    let h = HarnessBuilder::new().build();
    let missing = easel::types::ArtifactId::new();
    let err = h
        .session
        .generate_variations(missing, specs(&["v1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ArtifactNotFound(_)));
    assert!(h.session.artifacts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_derivative_units_run_through_the_sequencer() {
    let h = HarnessBuilder::new().build();
    h.session.enqueue(vec![unit("hero", "lamp")]).await.unwrap();
    let parent = by_key(&h.session.artifacts(), "hero").id;

    h.primary.script("lamp, blue", [Step::Fail(overloaded())]);
    let report = h
        .session
        .enqueue(vec![UnitOfWork::derivative(
            parent,
            "hero/blue",
            GenerationSpec::new("lamp, blue"),
        )])
        .await
        .unwrap();
    assert_eq!(report.summary.completed, 1);

    let blue = by_key(&h.session.artifacts(), "hero/blue");
    assert_eq!(blue.kind, ArtifactKind::Derivative);
    assert_eq!(blue.parent_id, Some(parent));
    assert_eq!(blue.attempts_made, 2);
}

#[tokio::test(start_paused = true)]
async fn test_delete_cascades_to_derivatives() {
    let h = HarnessBuilder::new().build();
    h.session
        .enqueue(vec![unit("hero", "lamp"), unit("seat", "chair")])
        .await
        .unwrap();
    let parent = by_key(&h.session.artifacts(), "hero").id;
    h.session
        .generate_variations(parent, specs(&["lamp v1", "lamp v2"]))
        .await
        .unwrap();
    assert_eq!(h.session.artifacts().len(), 4);

    let removed = h.session.delete(&parent).unwrap();
    assert_eq!(removed.len(), 3);
    assert_eq!(removed[0], parent);

    let remaining = h.session.artifacts();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].request_key, "seat");
    assert!(matches!(
        h.session.delete(&parent),
        Err(ApiError::ArtifactNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_result_for_deleted_artifact_is_discarded() {
    let h = HarnessBuilder::new().build();
    h.primary.script("lamp", [Step::Slow(Duration::from_secs(10))]);

    let session = h.session.clone();
    let batch = tokio::spawn(async move { session.enqueue(vec![unit("hero", "lamp")]).await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let id = by_key(&h.session.artifacts(), "hero").id;
    h.session.delete(&id).unwrap();

    let report = batch.await.unwrap().unwrap();
    assert_eq!(report.summary.discarded, 1);
    assert!(h.session.artifacts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_refuses_work() {
    let h = HarnessBuilder::new().build();
    h.session.close().await;
    assert!(matches!(
        h.session.enqueue(vec![unit("hero", "lamp")]).await,
        Err(ApiError::SessionClosed)
    ));
    assert_eq!(h.primary.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_batch_progress() {
    let h = HarnessBuilder::new().build();
    let mut views = h.session.subscribe();

    h.session.enqueue(vec![unit("hero", "lamp")]).await.unwrap();

    let view = views.borrow_and_update().clone();
    assert!(!view.batch_in_progress);
    assert_eq!(view.artifacts.len(), 1);
    assert_eq!(view.artifacts[0].status, ArtifactStatus::Completed);
}
