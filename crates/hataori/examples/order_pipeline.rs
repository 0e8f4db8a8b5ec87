//! Order Fulfilment Pipeline.
//!
//! This example demonstrates:
//! 1. Sequential steps sharing outputs through the context
//! 2. A parallel group for independent checks
//! 3. A conditional group for high-value orders
//! 4. Pausing from inside a task and resuming from the checkpoint
//!
//! Run with `cargo run --example order_pipeline`.

use hataori::logging::{LogLevel, Logger};
use hataori::prelude::*;
use hataori::store::MemoryStateStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn check(name: &'static str, verdict: &'static str) -> Arc<dyn Runnable> {
    Arc::new(Task::from_fn(name, move |_ctx| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(json!(verdict))
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logger = Logger::install(LogLevel::Info)?;
    let store = Arc::new(MemoryStateStore::new());
    let controller = WorkflowController::new();
    let approval = controller.clone();

    let review: Arc<dyn Runnable> = Arc::new(Task::from_fn("manual_review", move |_ctx| {
        let approval = approval.clone();
        async move {
            // Wait for a person to approve before shipping.
            approval.pause();
            Ok(json!("queued"))
        }
    }));

    let workflow = Workflow::builder()
        .name("order_fulfilment")
        .controller(controller)
        .state_store(store.clone())
        .retry(RetryPolicy::new(
            2,
            BackoffStrategy::exponential(Duration::from_millis(50), Duration::from_secs(1))?,
        ))
        .timeout(Duration::from_secs(5))
        .middleware(TracingMiddleware)
        .validator(|input| {
            let mut errors = Vec::new();
            if input.get("items").and_then(Value::as_array).map_or(true, Vec::is_empty) {
                errors.push("order must contain at least one item".to_string());
            }
            if input.get("total").and_then(Value::as_f64).unwrap_or(0.0) <= 0.0 {
                errors.push("order total must be positive".to_string());
            }
            errors
        })
        .step_fn("price", |ctx| async move {
            let total = ctx.input()["total"].as_f64().ok_or("total is not a number")?;
            Ok(json!({ "total": total, "tax": (total * 0.1 * 100.0).round() / 100.0 }))
        })
        .parallel(
            "checks",
            vec![check("inventory", "in_stock"), check("fraud", "clear")],
        )
        .conditional(
            "review",
            |ctx| ctx.input()["total"].as_f64().unwrap_or(0.0) > 500.0,
            vec![review],
        )
        .step_fn("ship", |ctx| async move {
            let priced = ctx.task_output("price").unwrap_or(Value::Null);
            Ok(json!({ "carrier": "post", "charged": priced["total"] }))
        })
        .on(HookType::OnWorkflowFinish, |event| {
            tracing::info!("order done after {:?}", event.context().elapsed());
            Ok(())
        })
        .build()?;

    let order = json!({ "items": ["tea", "kettle"], "total": 640.0 });
    let partial = workflow.execute(order).await?;
    logger.info(&format!(
        "Paused at task {} with status {}",
        workflow.current_task_index(),
        workflow.status()
    ));
    logger.info(&format!("Partial output: {}", partial));

    if let Some(state) = store.get_workflow_state(workflow.name()).await? {
        logger.info(&format!("Checkpoint: {:?}", state));
    }

    let output = workflow.resume().await?;
    logger.info(&format!("Final output: {}", serde_json::to_string_pretty(&output)?));

    match workflow.execute(json!({ "items": [], "total": 0 })).await {
        Err(WorkflowError::Validation { violations }) => {
            logger.warn(&format!("Rejected order: {}", violations.join("; ")))
        }
        other => logger.error(&format!("Unexpected result: {:?}", other)),
    }

    Ok(())
}
