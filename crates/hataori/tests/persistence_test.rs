use hataori::config::TaskOptions;
use hataori::prelude::*;
use hataori::store::JsonFileStateStore;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_test::assert_ok;

fn pausing_workflow(store: Arc<JsonFileStateStore>, runs: Arc<AtomicU32>, pause: bool) -> Workflow {
    let controller = WorkflowController::new();
    let pauser = controller.clone();
    let counter = Arc::clone(&runs);
    let tail = Arc::clone(&runs);

    Workflow::builder()
        .name("export")
        .controller(controller)
        .state_store(store)
        .step_fn("extract", move |_ctx| {
            let counter = Arc::clone(&counter);
            let pauser = pauser.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if pause {
                    pauser.pause();
                }
                Ok(json!([1, 2, 3]))
            }
        })
        .step_fn("load", move |_ctx| {
            let tail = Arc::clone(&tail);
            async move {
                tail.fetch_add(1, Ordering::SeqCst);
                Ok(json!("loaded"))
            }
        })
        .build()
        .expect("valid workflow")
}

#[tokio::test]
async fn test_checkpoint_survives_on_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(JsonFileStateStore::new(dir.path()));

    let runs = Arc::new(AtomicU32::new(0));
    let first = pausing_workflow(Arc::clone(&store), Arc::clone(&runs), true);
    assert_ok!(first.execute(Value::Null).await);
    assert_eq!(first.status(), WorkflowStatus::Paused);
    drop(first);

    let raw = std::fs::read_to_string(dir.path().join("workflows").join("export.json"))
        .expect("checkpoint file");
    let checkpoint: Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(checkpoint, json!({ "status": "paused", "currentTaskIndex": 1 }));

    let task_state = assert_ok!(store.get_task_state("extract").await);
    assert_eq!(task_state.map(|s| s.status), Some(TaskStatus::Completed));

    let second = pausing_workflow(Arc::clone(&store), Arc::clone(&runs), false);
    assert!(assert_ok!(second.restore_from_store().await));
    let output = assert_ok!(second.resume().await);

    assert_eq!(output, json!({ "load": "loaded" }));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    let state = assert_ok!(store.get_workflow_state("export").await);
    assert_eq!(
        state,
        Some(WorkflowState {
            status: WorkflowStatus::Completed,
            current_task_index: 2,
        })
    );
}

#[tokio::test]
async fn test_restore_without_checkpoint_is_a_noop() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(JsonFileStateStore::new(dir.path()));
    let workflow = pausing_workflow(store, Arc::default(), false);

    assert!(!assert_ok!(workflow.restore_from_store().await));
    assert_eq!(workflow.status(), WorkflowStatus::Pending);
}

#[tokio::test]
async fn test_options_from_json_drive_retries() {
    let options = assert_ok!(TaskOptions::from_json(
        r#"{ "retry_count": 2, "backoff": { "strategy": "fixed", "initial_delay_ms": 5 } }"#
    ));

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let workflow = Workflow::builder()
        .name("configured")
        .options(options)
        .step_fn("always_fails", move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("still broken".into())
            }
        })
        .build()
        .expect("valid workflow");

    let result = workflow.execute(Value::Null).await;

    assert!(matches!(result, Err(WorkflowError::Execution { .. })));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(workflow.tasks_status()[0].1, TaskStatus::Failed);
}
