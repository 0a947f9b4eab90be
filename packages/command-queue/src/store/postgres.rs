//! PostgreSQL-backed command store.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CommandStore, ensure_finish_target};
use crate::error::{CommandError, Result};
use crate::record::{CommandId, CommandRecord, CommandStatus, NewCommandRecord};

/// Store backed by the `commands` table.
///
/// Claiming uses `FOR UPDATE SKIP LOCKED`, so several processes can share one
/// database without handing the same record to two workers.
#[derive(Clone)]
pub struct PostgresCommandStore {
    pool: PgPool,
}

impl PostgresCommandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations for the `commands` table.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run command queue migrations")?;
        Ok(())
    }
}

#[async_trait]
impl CommandStore for PostgresCommandStore {
    async fn insert(&self, new: NewCommandRecord) -> Result<CommandRecord> {
        let record = sqlx::query_as::<_, CommandRecord>(
            r#"
            INSERT INTO commands (name, body, priority, trigger, send_updates_to_client, last_execution_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, body, priority, status, trigger, send_updates_to_client,
                      last_execution_time, queued_at, started_at, ended_at, exception
            "#,
        )
        .bind(&new.name)
        .bind(&new.body)
        .bind(new.priority)
        .bind(new.trigger)
        .bind(new.send_updates_to_client)
        .bind(new.last_execution_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get(&self, id: CommandId) -> Result<CommandRecord> {
        sqlx::query_as::<_, CommandRecord>(
            r#"
            SELECT id, name, body, priority, status, trigger, send_updates_to_client,
                   last_execution_time, queued_at, started_at, ended_at, exception
            FROM commands
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CommandError::RecordNotFound(id))
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<CommandRecord>> {
        let records = sqlx::query_as::<_, CommandRecord>(
            r#"
            SELECT id, name, body, priority, status, trigger, send_updates_to_client,
                   last_execution_time, queued_at, started_at, ended_at, exception
            FROM commands
            WHERE name = $1
            ORDER BY id
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn find_queued_or_started(&self, name: &str) -> Result<Vec<CommandRecord>> {
        let records = sqlx::query_as::<_, CommandRecord>(
            r#"
            SELECT id, name, body, priority, status, trigger, send_updates_to_client,
                   last_execution_time, queued_at, started_at, ended_at, exception
            FROM commands
            WHERE name = $1
              AND status IN ('queued', 'started')
            ORDER BY id
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn find_by_status(&self, status: CommandStatus) -> Result<Vec<CommandRecord>> {
        let records = sqlx::query_as::<_, CommandRecord>(
            r#"
            SELECT id, name, body, priority, status, trigger, send_updates_to_client,
                   last_execution_time, queued_at, started_at, ended_at, exception
            FROM commands
            WHERE status = $1
            ORDER BY id
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn claim_next(&self) -> Result<Option<CommandRecord>> {
        let record = sqlx::query_as::<_, CommandRecord>(
            r#"
            WITH next_command AS (
                SELECT id
                FROM commands
                WHERE status = 'queued'
                ORDER BY priority DESC, queued_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE commands
            SET status = 'started',
                started_at = NOW()
            WHERE id IN (SELECT id FROM next_command)
            RETURNING id, name, body, priority, status, trigger, send_updates_to_client,
                      last_execution_time, queued_at, started_at, ended_at, exception
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn finish(
        &self,
        id: CommandId,
        status: CommandStatus,
        exception: Option<String>,
    ) -> Result<CommandRecord> {
        ensure_finish_target(id, status)?;

        let updated = sqlx::query_as::<_, CommandRecord>(
            r#"
            UPDATE commands
            SET status = $2,
                ended_at = NOW(),
                exception = $3
            WHERE id = $1 AND status = 'started'
            RETURNING id, name, body, priority, status, trigger, send_updates_to_client,
                      last_execution_time, queued_at, started_at, ended_at, exception
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(exception)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(record) => Ok(record),
            None => {
                let current = self.get(id).await?;
                Err(CommandError::InvalidTransition {
                    id,
                    from: current.status,
                    to: status,
                })
            }
        }
    }

    async fn cancel_queued(&self, id: CommandId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET status = 'cancelled'
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Distinguish "not queued" from "no such record".
        self.get(id).await?;
        Ok(false)
    }

    async fn mark_orphaned(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET status = 'orphaned'
            WHERE status = 'started'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM commands
            WHERE status NOT IN ('queued', 'started')
              AND COALESCE(ended_at, started_at, queued_at) < $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
