//! PostgreSQL implementation of WorkflowStore
//!
//! Durable persistence using PostgreSQL with:
//! - One row per (workflow, lifecycle event), enforced by a unique key
//! - Sync records keyed by (sync id, workflow) for idempotent checkpoints
//! - Schema bootstrap in `initialize`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::store::*;

const CREATE_EVENTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS workflow_sync_events (
        seq BIGSERIAL PRIMARY KEY,
        workflow_id UUID NOT NULL,
        store_event TEXT NOT NULL,
        parent_id UUID,
        workflow_type TEXT NOT NULL,
        state JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (workflow_id, store_event)
    )
"#;

const CREATE_SYNC_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS workflow_sync_states (
        sync_id VARCHAR(255) NOT NULL,
        workflow_id UUID NOT NULL,
        parent_id UUID,
        workflow_type TEXT NOT NULL,
        state JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (sync_id, workflow_id)
    )
"#;

/// PostgreSQL implementation of WorkflowStore
///
/// # Example
///
/// ```ignore
/// use everruns_workflow::PostgresWorkflowStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/mydb").await?;
/// let store = PostgresWorkflowStore::new(pool);
/// store.initialize(false).await?;
/// ```
#[derive(Clone)]
pub struct PostgresWorkflowStore {
    pool: PgPool,
}

impl PostgresWorkflowStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute(&self, statement: &str, context: &str) -> Result<(), StoreError> {
        sqlx::query(statement)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to {}: {}", context, e);
                StoreError::Database(e.to_string())
            })?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for PostgresWorkflowStore {
    #[instrument(skip(self))]
    async fn initialize(&self, reset: bool) -> Result<(), StoreError> {
        if reset {
            self.execute("DROP TABLE IF EXISTS workflow_sync_events", "drop events table")
                .await?;
            self.execute("DROP TABLE IF EXISTS workflow_sync_states", "drop sync table")
                .await?;
        }
        self.execute(CREATE_EVENTS_TABLE, "create events table").await?;
        self.execute(CREATE_SYNC_TABLE, "create sync table").await?;

        info!(reset, "workflow store initialized");
        Ok(())
    }

    #[instrument(skip(self, event), fields(workflow_id = %event.workflow_id, event = %event.event))]
    async fn store_event(&self, event: &StoredEvent) -> Result<bool, StoreError> {
        let state = serde_json::to_value(&event.state)?;

        let result = sqlx::query(
            r#"
            INSERT INTO workflow_sync_events
                (workflow_id, store_event, parent_id, workflow_type, state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (workflow_id, store_event) DO NOTHING
            "#,
        )
        .bind(event.workflow_id)
        .bind(event.event.as_str())
        .bind(event.parent_id)
        .bind(&event.workflow_type)
        .bind(&state)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to store workflow event: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let inserted = result.rows_affected() > 0;
        debug!(inserted, "stored workflow event");
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn load_events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT workflow_id, store_event, parent_id, workflow_type, state, created_at
            FROM workflow_sync_events
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load workflow events: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.get("store_event");
            let event = StoreEvent::parse(&kind)
                .ok_or_else(|| StoreError::Serialization(format!("unknown store event: {kind}")))?;
            let state: serde_json::Value = row.get("state");
            let created_at: DateTime<Utc> = row.get("created_at");

            events.push(StoredEvent {
                workflow_id: row.get("workflow_id"),
                parent_id: row.get("parent_id"),
                workflow_type: row.get("workflow_type"),
                event,
                state: serde_json::from_value(state)?,
                created_at,
            });
        }

        Ok(events)
    }

    #[instrument(skip(self))]
    async fn load_sync(
        &self,
        sync_id: &str,
        workflow_id: Uuid,
    ) -> Result<Option<StoreState>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT state FROM workflow_sync_states
            WHERE sync_id = $1 AND workflow_id = $2
            "#,
        )
        .bind(sync_id)
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load sync state: {}", e);
            StoreError::Database(e.to_string())
        })?;

        match row {
            Some(row) => {
                let state: serde_json::Value = row.get("state");
                Ok(Some(serde_json::from_value(state)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, state))]
    async fn insert_sync(
        &self,
        sync_id: &str,
        workflow_id: Uuid,
        parent_id: Option<Uuid>,
        workflow_type: &str,
        state: &StoreState,
    ) -> Result<bool, StoreError> {
        let state = serde_json::to_value(state)?;

        let result = sqlx::query(
            r#"
            INSERT INTO workflow_sync_states
                (sync_id, workflow_id, parent_id, workflow_type, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (sync_id, workflow_id) DO NOTHING
            "#,
        )
        .bind(sync_id)
        .bind(workflow_id)
        .bind(parent_id)
        .bind(workflow_type)
        .bind(&state)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert sync state: {}", e);
            StoreError::Database(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }
}
