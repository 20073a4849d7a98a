//! Integration tests for the CLI run context against a workspace on disk

use crate::integration::test_utils::{EnvGuard, ENV_MUTEX};
use easel::artifact::{Artifact, ArtifactStatus, WriteOutcome};
use easel::backend::ImagePayload;
use easel::cli::{Commands, RunContext};
use easel::error::ApiError;
use easel::persistence::{ArtifactStore, SledArtifactStore};
use easel::request::GenerationSpec;
use tempfile::TempDir;

fn completed(key: &str) -> Artifact {
    let mut artifact = Artifact::new_primary(key, GenerationSpec::new("lamp"), 1_700_000_000_000);
    let token = artifact.attempt_token;
    let outcome = artifact.complete(
        token,
        ImagePayload::Url(format!("https://images.example/{}.png", key)),
        1_700_000_001_000,
    );
    assert_eq!(outcome, WriteOutcome::Applied);
    artifact
}

/// Write records into the workspace's default store location.
fn seed(workspace: &std::path::Path, artifacts: &[Artifact]) {
    let store = SledArtifactStore::new(workspace.join(".easel").join("artifacts")).unwrap();
    for artifact in artifacts {
        store.upsert(artifact).unwrap();
    }
    store.flush().unwrap();
}

fn list(format: &str) -> Commands {
    Commands::List {
        format: format.to_string(),
        status: None,
    }
}

#[tokio::test]
async fn test_review_flow_through_run_context() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();
    let _env = EnvGuard::set(&[(
        "XDG_CONFIG_HOME",
        Some(temp_dir.path().join("xdg").to_str().unwrap()),
    )]);

    let hero = completed("hero");
    seed(&workspace, &[hero.clone()]);

    let ctx = RunContext::new(workspace.clone(), None).unwrap();

    let listed: serde_json::Value =
        serde_json::from_str(&ctx.execute(&list("json")).await.unwrap()).unwrap();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["artifacts"][0]["status"], "completed");

    let out = ctx
        .execute(&Commands::Approve { id: hero.id.short() })
        .await
        .unwrap();
    assert!(out.ends_with("is approved"), "{}", out);

    let shown = ctx
        .execute(&Commands::Show {
            id: hero.id.to_string(),
            format: "text".to_string(),
        })
        .await
        .unwrap();
    assert!(shown.contains("Approval: approved"));
    assert!(shown.contains("https://images.example/hero.png"));

    let out = ctx
        .execute(&Commands::Delete { id: hero.id.to_string() })
        .await
        .unwrap();
    assert_eq!(out, format!("Deleted artifact {}", hero.id));

    let listed = ctx.execute(&list("text")).await.unwrap();
    assert!(listed.contains("No artifacts found"));
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_reject_of_failed_artifact_is_refused() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();
    let _env = EnvGuard::set(&[(
        "XDG_CONFIG_HOME",
        Some(temp_dir.path().join("xdg").to_str().unwrap()),
    )]);

    // A record saved mid-generation comes back failed.
    let stale = Artifact::new_primary("hero", GenerationSpec::new("lamp"), 1_700_000_000_000);
    seed(&workspace, &[stale.clone()]);

    let ctx = RunContext::new(workspace.clone(), None).unwrap();
    let failed = ctx
        .execute(&Commands::List {
            format: "json".to_string(),
            status: Some("failed".to_string()),
        })
        .await
        .unwrap();
    let failed: serde_json::Value = serde_json::from_str(&failed).unwrap();
    assert_eq!(failed["total"], 1);

    let err = ctx
        .execute(&Commands::Reject { id: stale.id.to_string() })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::InvalidTransition {
            from: ArtifactStatus::Failed,
            ..
        }
    ));
    ctx.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("easel.toml");
    std::fs::write(
        &config_path,
        "[backend]\nbase_url = \"ftp://nope\"\nmodel = \"m\"\n\n[storage]\nephemeral = true\n",
    )
    .unwrap();

    let err = RunContext::new(temp_dir.path().to_path_buf(), Some(config_path))
        .err()
        .unwrap();
    match err {
        ApiError::ConfigError(message) => assert!(message.contains("base_url"), "{}", message),
        other => panic!("unexpected error: {}", other),
    }
}
