//! Integration tests for PostgresWorkflowStore
//!
//! Run with: cargo test -p everruns-workflow --test postgres_store_test -- --test-threads=1
//!
//! Requirements:
//! - PostgreSQL running with DATABASE_URL set
//! - Tests return early when DATABASE_URL is unset
//!
//! Tables are created by `initialize(false)`; rows are removed per workflow.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use everruns_workflow::prelude::*;

/// Connect and bootstrap the schema, or `None` without DATABASE_URL
async fn create_test_store() -> Option<PostgresWorkflowStore> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to PostgreSQL. Check DATABASE_URL.");
    let store = PostgresWorkflowStore::new(pool);
    store
        .initialize(false)
        .await
        .expect("Failed to initialize workflow tables");
    Some(store)
}

/// Clean up test data for a specific workflow
async fn cleanup_workflow(store: &PostgresWorkflowStore, workflow_id: Uuid) {
    sqlx::query("DELETE FROM workflow_sync_states WHERE workflow_id = $1")
        .bind(workflow_id)
        .execute(store.pool())
        .await
        .ok();
    sqlx::query("DELETE FROM workflow_sync_events WHERE workflow_id = $1")
        .bind(workflow_id)
        .execute(store.pool())
        .await
        .ok();
}

fn sample_state() -> StoreState {
    let mut state = StoreState {
        state: serde_json::json!("Assigned"),
        ..Default::default()
    };
    state
        .arguments
        .insert("AssignedTo".to_string(), Value::from("a@test.com"));
    state
}

// ============================================
// Event Tests
// ============================================

#[test_log::test(tokio::test)]
async fn test_store_event_is_deduplicated() {
    let Some(store) = create_test_store().await else {
        return;
    };
    let workflow_id = Uuid::now_v7();

    let event = StoredEvent {
        workflow_id,
        parent_id: None,
        workflow_type: "Approval".to_string(),
        event: StoreEvent::Start,
        state: sample_state(),
        created_at: Utc::now(),
    };

    assert!(store.store_event(&event).await.unwrap());
    assert!(!store.store_event(&event).await.unwrap());

    let loaded: Vec<_> = store
        .load_events()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.workflow_id == workflow_id)
        .collect();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].event, StoreEvent::Start);
    assert_eq!(loaded[0].workflow_type, "Approval");
    assert_eq!(loaded[0].state, sample_state());

    cleanup_workflow(&store, workflow_id).await;
}

#[tokio::test]
async fn test_events_keep_insertion_order() {
    let Some(store) = create_test_store().await else {
        return;
    };
    let workflow_id = Uuid::now_v7();
    let parent_id = Uuid::now_v7();

    for event in [StoreEvent::Create, StoreEvent::Start, StoreEvent::Complete] {
        let stored = StoredEvent {
            workflow_id,
            parent_id: Some(parent_id),
            workflow_type: "Approval".to_string(),
            event,
            state: StoreState::default(),
            created_at: Utc::now(),
        };
        store.store_event(&stored).await.unwrap();
    }

    let loaded: Vec<_> = store
        .load_events()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.workflow_id == workflow_id)
        .collect();
    let kinds: Vec<_> = loaded.iter().map(|e| e.event).collect();
    assert_eq!(
        kinds,
        vec![StoreEvent::Create, StoreEvent::Start, StoreEvent::Complete]
    );
    assert!(loaded.iter().all(|e| e.parent_id == Some(parent_id)));

    cleanup_workflow(&store, workflow_id).await;
}

// ============================================
// Sync Tests
// ============================================

#[tokio::test]
async fn test_insert_and_load_sync() {
    let Some(store) = create_test_store().await else {
        return;
    };
    let workflow_id = Uuid::now_v7();

    assert!(store
        .load_sync("assigned", workflow_id)
        .await
        .unwrap()
        .is_none());

    assert!(store
        .insert_sync("assigned", workflow_id, None, "Approval", &sample_state())
        .await
        .unwrap());
    assert!(!store
        .insert_sync("assigned", workflow_id, None, "Approval", &StoreState::default())
        .await
        .unwrap());

    let loaded = store
        .load_sync("assigned", workflow_id)
        .await
        .unwrap()
        .expect("sync record");
    assert_eq!(loaded, sample_state());

    cleanup_workflow(&store, workflow_id).await;
}

// ============================================
// Engine Tests
// ============================================

#[tokio::test]
async fn test_engine_records_lifecycle_and_sync() {
    let Some(store) = create_test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let engine = WorkflowEngine::with_store(EngineConfig::default(), store.clone());

    let instance = engine.create_workflow(ApprovalWorkflow);
    let workflow_id = instance.id();
    instance
        .start(vec![Argument::new("Requester", "dana")])
        .await
        .unwrap();

    let sync = instance.store_sync().unwrap();
    assert!(sync.create_sync("requested", false).await.unwrap());
    instance.set_argument("Requester", "erin");
    assert!(sync.sync_state("requested").await.unwrap());
    assert_eq!(
        instance.argument_value::<String>("Requester").unwrap(),
        "dana"
    );

    instance
        .action(ActionRequest::new("Assign").argument(Argument::new("AssignTo", "a@test.com")))
        .await
        .unwrap();
    instance.action("Approve").await.unwrap();
    instance.action("Accept").await.unwrap();
    instance.wait().await.unwrap();

    let kinds: Vec<_> = store
        .load_events()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.workflow_id == workflow_id)
        .map(|e| e.event)
        .collect();
    assert_eq!(
        kinds,
        vec![StoreEvent::Create, StoreEvent::Start, StoreEvent::Complete]
    );

    cleanup_workflow(&store, workflow_id).await;
}
