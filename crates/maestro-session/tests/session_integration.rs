//! Integration tests over the file-backed session store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use maestro_core::{ExecutionPlan, Task, TaskResult};
use maestro_session::{
    FileSessionStore, RetentionSweeper, Session, SessionPhase, SessionStatus, SessionStore,
};
use std::sync::Arc;
use uuid::Uuid;

/// Helper: create a FileSessionStore in a temp directory.
async fn temp_store() -> (FileSessionStore, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(tmp.path().join("sessions"))
        .await
        .unwrap();
    (store, tmp)
}

#[tokio::test]
async fn test_create_and_get_session() {
    let (store, _tmp) = temp_store().await;
    let session = Session::new("Summarize the report", "user-1", false);
    let id = session.id;

    store.create(&session).await.unwrap();

    let loaded = store.get(id).await.unwrap().unwrap();
    assert_eq!(loaded.id, id);
    assert_eq!(loaded.request, "Summarize the report");
    assert_eq!(loaded.status, SessionStatus::Active);
}

#[tokio::test]
async fn test_get_nonexistent_returns_none() {
    let (store, _tmp) = temp_store().await;
    let result = store.get(Uuid::new_v4()).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_roundtrip_preserves_plan_and_approval_state() {
    let (store, _tmp) = temp_store().await;
    let mut session = Session::new("Summarize the report", "user-1", true);
    let id = session.id;

    let mut t1 = Task::new("Collect figures", "analysis");
    t1.mark_running();
    t1.mark_completed(TaskResult::text("Figures collected from all regions."));
    let t1_id = t1.id;
    let t2 = Task::new("Draft summary", "generation").with_dependencies(vec![t1_id]);
    session.plan = Some(ExecutionPlan::new("Summarize the report", "user-1", vec![t1, t2]));
    session.enter_phase(SessionPhase::Approval);
    session.status = SessionStatus::AwaitingApproval;
    session.preview = Some("2 task outputs".to_string());

    store.create(&session).await.unwrap();
    let loaded = store.get(id).await.unwrap().unwrap();

    assert_eq!(loaded.id, id);
    assert_eq!(loaded.phase, SessionPhase::Approval);
    assert_eq!(loaded.status, SessionStatus::AwaitingApproval);
    assert_eq!(loaded.preview.as_deref(), Some("2 task outputs"));
    let plan = loaded.plan.unwrap();
    assert_eq!(plan.tasks.len(), 2);
    assert_eq!(plan.tasks[1].dependencies, vec![t1_id]);
    assert_eq!(plan.completed_count(), 1);
}

#[tokio::test]
async fn test_update_persists_mutations() {
    let (store, _tmp) = temp_store().await;
    let mut session = Session::new("req", "user-1", false);
    let id = session.id;
    store.create(&session).await.unwrap();

    session.record("execution started");
    session.stats.tasks_completed = 3;
    store.update(&session).await.unwrap();

    let loaded = store.get(id).await.unwrap().unwrap();
    assert_eq!(loaded.stats.tasks_completed, 3);
    assert!(loaded.history.iter().any(|e| e.message.contains("execution")));
}

#[tokio::test]
async fn test_delete_session() {
    let (store, _tmp) = temp_store().await;
    let session = Session::new("req", "user-1", false);
    let id = session.id;

    store.create(&session).await.unwrap();
    store.delete(id).await.unwrap();
    assert!(store.get(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_nonexistent_is_ok() {
    let (store, _tmp) = temp_store().await;
    store.delete(Uuid::new_v4()).await.unwrap();
}

#[tokio::test]
async fn test_list_for_user_only_returns_own_sessions() {
    let (store, _tmp) = temp_store().await;
    store
        .create(&Session::new("a", "alice", false))
        .await
        .unwrap();
    store
        .create(&Session::new("b", "alice", false))
        .await
        .unwrap();
    store.create(&Session::new("c", "bob", false)).await.unwrap();

    let alice = store.list_for_user("alice").await.unwrap();
    assert_eq!(alice.len(), 2);
    assert!(alice.iter().all(|s| s.user_id == "alice"));
}

#[tokio::test]
async fn test_sweeper_over_file_store() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(
        FileSessionStore::new(tmp.path().join("sessions"))
            .await
            .unwrap(),
    );

    let mut done = Session::new("done long ago", "user-1", false);
    done.status = SessionStatus::Completed;
    done.updated_at = chrono::Utc::now() - chrono::Duration::hours(30);
    store.create(&done).await.unwrap();

    let active = Session::new("in flight", "user-1", false);
    store.create(&active).await.unwrap();

    let sweeper = RetentionSweeper::new(store.clone()).with_max_age_hours(24);
    let removed = sweeper.sweep().await.unwrap();

    assert_eq!(removed, 1);
    assert!(store.get(done.id).await.unwrap().is_none());
    assert!(store.get(active.id).await.unwrap().is_some());
}
